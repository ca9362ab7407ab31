//! Stewardship automation: rules, queued executions, and their
//! terminal bookkeeping.
//!
//! Executions are pre-materialized at trigger time. Disabling a rule stops
//! new executions from being queued but does NOT cancel executions already
//! queued for it — they remain claimable and completable.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::{
    AutomationExecution, AutomationRule, EmailTemplate, ExecutionStatus, NewRule, RenderedEmail,
    RuleUpdate, TriggerType,
};
use crate::error::{Error, Result};
use crate::store::Store;

/// Pluggable predicate deciding whether a rule's trigger conditions match a
/// trigger payload.
pub type ConditionMatcher = Box<dyn Fn(Option<&Value>, &Value) -> bool + Send + Sync>;

/// Default condition semantics: absent/empty conditions always match;
/// `min_amount`/`max_amount` compare against a numeric `amount` in the
/// payload; any other key must be present and exactly equal in the payload.
pub fn default_conditions_match(conditions: Option<&Value>, data: &Value) -> bool {
    let Some(map) = conditions.and_then(|c| c.as_object()) else {
        return true;
    };
    if map.is_empty() {
        return true;
    }

    for (key, expected) in map {
        match key.as_str() {
            "min_amount" => {
                let amount = data.get("amount").and_then(Value::as_f64);
                let min = expected.as_f64();
                match (amount, min) {
                    (Some(amount), Some(min)) if amount >= min => {}
                    _ => return false,
                }
            }
            "max_amount" => {
                let amount = data.get("amount").and_then(Value::as_f64);
                let max = expected.as_f64();
                match (amount, max) {
                    (Some(amount), Some(max)) if amount <= max => {}
                    _ => return false,
                }
            }
            other => {
                if data.get(other) != Some(expected) {
                    return false;
                }
            }
        }
    }
    true
}

/// Per-status execution counts.
#[derive(Debug, Clone, Default)]
pub struct ExecutionStats {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl ExecutionStats {
    pub fn total(&self) -> usize {
        self.pending + self.processing + self.completed + self.failed
    }
}

/// The automation rule engine.
pub struct Automation {
    store: Arc<Store>,
    matcher: ConditionMatcher,
}

impl Automation {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            matcher: Box::new(|conditions, data| default_conditions_match(conditions, data)),
        }
    }

    /// Swap in a different condition matcher.
    pub fn with_matcher(mut self, matcher: ConditionMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    // --- rules ---

    pub async fn create_rule(&self, new: NewRule) -> Result<AutomationRule> {
        let now = Utc::now();
        let rule = AutomationRule {
            id: Uuid::new_v4(),
            name: new.name,
            description: new.description,
            trigger_type: new.trigger_type,
            trigger_conditions: new.trigger_conditions,
            action_type: new.action_type,
            action_config: new.action_config,
            delay_minutes: new.delay_minutes,
            template_id: new.template_id,
            assign_to_user_id: new.assign_to_user_id,
            is_active: true,
            priority: new.priority,
            execution_count: 0,
            last_executed_at: None,
            created_at: now,
            updated_at: now,
        };
        let rule = self.store.insert_rule(rule).await?;
        info!(rule_id = %rule.id, name = %rule.name, "automation rule created");
        Ok(rule)
    }

    pub async fn get_rule(&self, id: Uuid) -> Result<AutomationRule> {
        self.store.get_rule(id).await
    }

    pub async fn list_rules(&self) -> Vec<AutomationRule> {
        self.store.list_rules().await
    }

    pub async fn update_rule(&self, id: Uuid, update: RuleUpdate) -> Result<AutomationRule> {
        self.store
            .with_rule_mut(id, |r| {
                if let Some(v) = update.name {
                    r.name = v;
                }
                if let Some(v) = update.description {
                    r.description = Some(v);
                }
                if let Some(v) = update.trigger_conditions {
                    r.trigger_conditions = Some(v);
                }
                if let Some(v) = update.action_config {
                    r.action_config = v;
                }
                if let Some(v) = update.delay_minutes {
                    r.delay_minutes = v;
                }
                if let Some(v) = update.template_id {
                    r.template_id = Some(v);
                }
                if let Some(v) = update.assign_to_user_id {
                    r.assign_to_user_id = Some(v);
                }
                if let Some(v) = update.priority {
                    r.priority = v;
                }
                r.updated_at = Utc::now();
                Ok(r.clone())
            })
            .await
    }

    /// Enable or disable a rule. Already-queued pending executions for a
    /// disabled rule still fire; `is_active` is only consulted at queue time.
    #[instrument(skip(self))]
    pub async fn set_rule_active(&self, id: Uuid, active: bool) -> Result<AutomationRule> {
        self.store
            .with_rule_mut(id, |r| {
                if r.is_active != active {
                    r.is_active = active;
                    r.updated_at = Utc::now();
                }
                Ok(r.clone())
            })
            .await
    }

    pub async fn delete_rule(&self, id: Uuid) -> Result<()> {
        self.store.delete_rule(id).await
    }

    // --- queueing ---

    /// Queue executions for every active rule matching the trigger.
    /// Returns the number queued.
    pub async fn queue_automation(
        &self,
        trigger: TriggerType,
        client_id: Uuid,
        trigger_data: Value,
        trigger_entity_id: Option<Uuid>,
    ) -> Result<usize> {
        self.queue_automation_at(Utc::now(), trigger, client_id, trigger_data, trigger_entity_id)
            .await
    }

    /// `queue_automation` against an explicit trigger time.
    ///
    /// Rules are evaluated in ascending priority order (lower number first)
    /// and executions are created in that order, so the execution log
    /// reflects rule precedence.
    #[instrument(skip(self, trigger_data), fields(trigger = ?trigger, client = %client_id))]
    pub async fn queue_automation_at(
        &self,
        now: DateTime<Utc>,
        trigger: TriggerType,
        client_id: Uuid,
        trigger_data: Value,
        trigger_entity_id: Option<Uuid>,
    ) -> Result<usize> {
        let rules = self.store.active_rules_for_trigger(trigger).await;

        let mut queued = 0;
        for rule in rules {
            if !(self.matcher)(rule.trigger_conditions.as_ref(), &trigger_data) {
                continue;
            }

            let execution = AutomationExecution {
                id: Uuid::new_v4(),
                rule_id: rule.id,
                client_id,
                trigger_type: trigger,
                trigger_data: trigger_data.clone(),
                trigger_entity_id,
                scheduled_for: now + Duration::minutes(i64::from(rule.delay_minutes)),
                status: ExecutionStatus::Pending,
                executed_at: None,
                result_data: None,
                error_message: None,
                retry_count: 0,
                created_at: now,
                updated_at: now,
            };
            self.store.insert_execution(execution).await?;
            queued += 1;
        }

        info!(queued, "automations queued");
        Ok(queued)
    }

    // --- claiming and completion ---

    /// Claim up to `limit` due pending executions for processing.
    pub async fn claim_due(&self, limit: usize) -> Result<Vec<AutomationExecution>> {
        self.claim_due_at(Utc::now(), limit).await
    }

    /// `claim_due` against an explicit "now". Claiming flips each row from
    /// `pending` to `processing` atomically for the whole batch; rows
    /// another worker already claimed are simply not returned.
    pub async fn claim_due_at(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<AutomationExecution>> {
        self.store.claim_due(now, limit).await
    }

    pub async fn get_execution(&self, id: Uuid) -> Result<AutomationExecution> {
        self.store.get_execution(id).await
    }

    /// All executions in creation order.
    pub async fn list_executions(&self) -> Vec<AutomationExecution> {
        self.store.list_executions().await
    }

    /// Record a successful execution. Only legal from `processing`. The
    /// owning rule's `execution_count`/`last_executed_at` advance here and
    /// nowhere else, so the counter stays "successful executions".
    #[instrument(skip(self, result_data))]
    pub async fn complete_execution(
        &self,
        id: Uuid,
        result_data: Value,
    ) -> Result<AutomationExecution> {
        let now = Utc::now();
        let execution = self
            .store
            .with_execution_mut(id, |e| {
                require_processing(e)?;
                e.status = ExecutionStatus::Completed;
                e.executed_at = Some(now);
                e.result_data = Some(result_data);
                e.updated_at = now;
                Ok(e.clone())
            })
            .await?;

        // The rule may have been deleted since the execution was queued;
        // its stats simply stop advancing.
        match self
            .store
            .with_rule_mut(execution.rule_id, |r| {
                r.execution_count += 1;
                r.last_executed_at = Some(now);
                r.updated_at = now;
                Ok(())
            })
            .await
        {
            Ok(()) => {}
            Err(Error::NotFound { .. }) => {
                warn!(rule_id = %execution.rule_id, "completed execution for deleted rule");
            }
            Err(e) => return Err(e),
        }

        Ok(execution)
    }

    /// Record a failed execution. Only legal from `processing`. This is a
    /// deliberate semantic outcome — infrastructure errors should bubble up
    /// instead of being recorded here.
    #[instrument(skip(self, error_message))]
    pub async fn fail_execution(
        &self,
        id: Uuid,
        error_message: impl Into<String>,
    ) -> Result<AutomationExecution> {
        let now = Utc::now();
        let message = error_message.into();
        self.store
            .with_execution_mut(id, |e| {
                require_processing(e)?;
                e.status = ExecutionStatus::Failed;
                e.executed_at = Some(now);
                e.error_message = Some(message);
                e.updated_at = now;
                Ok(e.clone())
            })
            .await
    }

    /// Manually re-queue a failed execution. The only place `retry_count`
    /// increments. `scheduled_for` is fixed at creation and stays put, so a
    /// requeued execution is immediately due.
    #[instrument(skip(self))]
    pub async fn requeue_execution(&self, id: Uuid) -> Result<AutomationExecution> {
        self.store
            .with_execution_mut(id, |e| {
                if e.status != ExecutionStatus::Failed {
                    return Err(Error::conflict(format!(
                        "execution {} is {:?}, only failed executions can be requeued",
                        e.id, e.status
                    )));
                }
                e.status = ExecutionStatus::Pending;
                e.retry_count += 1;
                e.error_message = None;
                e.executed_at = None;
                e.updated_at = Utc::now();
                Ok(e.clone())
            })
            .await
    }

    /// Revert executions stuck in `processing` longer than `older_than`
    /// back to `pending`. `retry_count` is untouched; this is recovery from
    /// a crashed claimer, not a retry.
    pub async fn release_stuck(&self, older_than: Duration) -> Result<usize> {
        self.release_stuck_at(Utc::now(), older_than).await
    }

    /// `release_stuck` against an explicit "now".
    pub async fn release_stuck_at(
        &self,
        now: DateTime<Utc>,
        older_than: Duration,
    ) -> Result<usize> {
        let released = self.store.release_stuck(now, older_than).await?;
        if released > 0 {
            warn!(released, "released stuck processing executions");
        }
        Ok(released)
    }

    /// Per-status counts over all executions.
    pub async fn execution_stats(&self) -> ExecutionStats {
        let mut stats = ExecutionStats::default();
        for e in self.store.list_executions().await {
            match e.status {
                ExecutionStatus::Pending => stats.pending += 1,
                ExecutionStatus::Processing => stats.processing += 1,
                ExecutionStatus::Completed => stats.completed += 1,
                ExecutionStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    // --- email templates ---

    pub async fn upsert_template(&self, template: EmailTemplate) -> Result<EmailTemplate> {
        self.store.upsert_template(template).await
    }

    pub async fn get_template(&self, id: Uuid) -> Result<EmailTemplate> {
        self.store.get_template(id).await
    }

    /// Fetch a template and apply merge fields.
    pub async fn render_template(&self, id: Uuid, vars: &Value) -> Result<RenderedEmail> {
        let template = self.store.get_template(id).await?;
        Ok(template.render(vars))
    }
}

fn require_processing(e: &AutomationExecution) -> Result<()> {
    if e.status != ExecutionStatus::Processing {
        return Err(Error::conflict(format!(
            "execution {} is {:?}, expected processing",
            e.id, e.status
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_conditions_always_match() {
        assert!(default_conditions_match(None, &json!({"amount": 10})));
        assert!(default_conditions_match(Some(&json!({})), &json!({})));
        assert!(default_conditions_match(Some(&Value::Null), &json!({})));
    }

    #[test]
    fn test_min_amount_condition() {
        let cond = json!({"min_amount": 1000});
        assert!(default_conditions_match(Some(&cond), &json!({"amount": 1000})));
        assert!(default_conditions_match(Some(&cond), &json!({"amount": 5000})));
        assert!(!default_conditions_match(Some(&cond), &json!({"amount": 999})));
        assert!(!default_conditions_match(Some(&cond), &json!({})));
    }

    #[test]
    fn test_max_amount_condition() {
        let cond = json!({"max_amount": 100});
        assert!(default_conditions_match(Some(&cond), &json!({"amount": 50})));
        assert!(!default_conditions_match(Some(&cond), &json!({"amount": 150})));
    }

    #[test]
    fn test_equality_condition() {
        let cond = json!({"donationType": "recurring"});
        assert!(default_conditions_match(
            Some(&cond),
            &json!({"donationType": "recurring"})
        ));
        assert!(!default_conditions_match(
            Some(&cond),
            &json!({"donationType": "one-time"})
        ));
        assert!(!default_conditions_match(Some(&cond), &json!({})));
    }

    #[test]
    fn test_combined_conditions_and_semantics() {
        let cond = json!({"min_amount": 500, "donationType": "major"});
        assert!(default_conditions_match(
            Some(&cond),
            &json!({"amount": 600, "donationType": "major"})
        ));
        assert!(!default_conditions_match(
            Some(&cond),
            &json!({"amount": 600, "donationType": "minor"})
        ));
        assert!(!default_conditions_match(
            Some(&cond),
            &json!({"amount": 400, "donationType": "major"})
        ));
    }
}
