//! Periodic automation executor.
//!
//! The executor claims due executions and hands each to a pluggable
//! [`ActionDispatcher`]. A dispatch error is a semantic action failure and
//! marks the execution failed; store errors abort the tick and mark
//! nothing, so an infrastructure hiccup never shows up as a failed
//! execution.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::Duration;
use serde_json::{json, Value};
use tracing::{debug, error, info, instrument, warn};

use crate::domain::{ActionType, AutomationExecution, AutomationRule, EmailTemplate};
use crate::engine::automation::Automation;
use crate::error::{Error, Result};

/// Everything a dispatcher needs to perform one action.
#[derive(Debug, Clone)]
pub struct ActionRequest {
    pub execution: AutomationExecution,
    pub rule: AutomationRule,
    /// Resolved from the rule's `template_id`, when present.
    pub template: Option<EmailTemplate>,
}

/// The side-effect seam. Implementations actually send the email, create
/// the task, and so on; the executor only records their outcome.
#[async_trait]
pub trait ActionDispatcher: Send + Sync {
    /// Human-readable dispatcher name.
    fn name(&self) -> &str;

    /// Perform the action. The returned value is stored as the execution's
    /// result data.
    async fn dispatch(&self, request: &ActionRequest) -> anyhow::Result<Value>;
}

/// Dispatcher that only logs what it would do. Useful as a default and in
/// dry-run deployments.
pub struct LogDispatcher;

#[async_trait]
impl ActionDispatcher for LogDispatcher {
    fn name(&self) -> &str {
        "log"
    }

    async fn dispatch(&self, request: &ActionRequest) -> anyhow::Result<Value> {
        let action = &request.rule.action_type;
        match action {
            ActionType::SendEmail => {
                if let Some(template) = &request.template {
                    let rendered = template.render(&request.execution.trigger_data);
                    info!(
                        client = %request.execution.client_id,
                        subject = %rendered.subject,
                        "would send email"
                    );
                } else {
                    info!(client = %request.execution.client_id, "would send email (no template)");
                }
            }
            ActionType::CreateTask => {
                info!(client = %request.execution.client_id, "would create task");
            }
            ActionType::SendSms => {
                info!(client = %request.execution.client_id, "would send sms");
            }
            ActionType::LogCommunication => {
                info!(client = %request.execution.client_id, "would log communication");
            }
            ActionType::UpdateEngagement => {
                info!(client = %request.execution.client_id, "would update engagement");
            }
        }

        Ok(json!({
            "dispatcher": self.name(),
            "action": action,
        }))
    }
}

/// Executor tuning.
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    /// How often to poll for due executions.
    pub poll_interval: StdDuration,

    /// Maximum executions claimed per tick.
    pub batch_size: usize,

    /// How long a row may sit in `processing` before the reaper returns it
    /// to `pending`.
    pub stuck_timeout: Duration,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            poll_interval: StdDuration::from_secs(60),
            batch_size: 25,
            stuck_timeout: Duration::minutes(30),
        }
    }
}

/// Claims due executions on an interval and records their outcomes.
pub struct Executor {
    automation: Arc<Automation>,
    dispatcher: Arc<dyn ActionDispatcher>,
    settings: ExecutorSettings,
}

impl Executor {
    pub fn new(
        automation: Arc<Automation>,
        dispatcher: Arc<dyn ActionDispatcher>,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            automation,
            dispatcher,
            settings,
        }
    }

    /// One tick: reap stuck rows, claim a batch, dispatch each claimed
    /// execution and record its terminal outcome. Returns the number of
    /// executions processed.
    #[instrument(skip(self))]
    pub async fn run_once(&self) -> Result<usize> {
        self.automation
            .release_stuck(self.settings.stuck_timeout)
            .await?;

        let claimed = self.automation.claim_due(self.settings.batch_size).await?;
        let mut processed = 0;
        for execution in claimed {
            self.process(execution).await?;
            processed += 1;
        }
        Ok(processed)
    }

    async fn process(&self, execution: AutomationExecution) -> Result<()> {
        let rule = match self.automation.get_rule(execution.rule_id).await {
            Ok(rule) => rule,
            Err(Error::NotFound { .. }) => {
                // The rule was deleted after this execution was queued.
                warn!(execution_id = %execution.id, rule_id = %execution.rule_id,
                      "claimed execution references a deleted rule");
                self.automation
                    .fail_execution(execution.id, "automation rule no longer exists")
                    .await?;
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let template = match rule.template_id {
            Some(template_id) => match self.automation.get_template(template_id).await {
                Ok(template) => Some(template),
                Err(Error::NotFound { .. }) => {
                    warn!(rule_id = %rule.id, %template_id, "rule references a missing template");
                    None
                }
                Err(e) => return Err(e),
            },
            None => None,
        };

        let request = ActionRequest {
            execution: execution.clone(),
            rule,
            template,
        };

        match self.dispatcher.dispatch(&request).await {
            Ok(result) => {
                self.automation
                    .complete_execution(execution.id, result)
                    .await?;
                debug!(execution_id = %execution.id, "execution completed");
            }
            Err(e) => {
                warn!(execution_id = %execution.id, error = %e, "action dispatch failed");
                self.automation
                    .fail_execution(execution.id, e.to_string())
                    .await?;
            }
        }

        Ok(())
    }

    /// Poll forever. Tick errors are logged and the loop keeps going.
    pub async fn run(&self) {
        info!(
            dispatcher = self.dispatcher.name(),
            poll_secs = self.settings.poll_interval.as_secs(),
            batch = self.settings.batch_size,
            "automation executor started"
        );

        let mut interval = tokio::time::interval(self.settings.poll_interval);
        loop {
            interval.tick().await;
            match self.run_once().await {
                Ok(0) => debug!("no due executions"),
                Ok(n) => info!(processed = n, "executor tick"),
                Err(e) => error!(error = %e, "executor tick failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewRule, TriggerType};
    use crate::store::Store;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_run_once_completes_due_execution() {
        let store = Arc::new(Store::in_memory());
        let automation = Arc::new(Automation::new(store));

        automation
            .create_rule(NewRule::new(
                "thank donor",
                TriggerType::DonationCreated,
                ActionType::SendEmail,
            ))
            .await
            .unwrap();
        automation
            .queue_automation(
                TriggerType::DonationCreated,
                Uuid::new_v4(),
                json!({"amount": 50}),
                None,
            )
            .await
            .unwrap();

        let executor = Executor::new(
            automation.clone(),
            Arc::new(LogDispatcher),
            ExecutorSettings::default(),
        );

        let processed = executor.run_once().await.unwrap();
        assert_eq!(processed, 1);

        let stats = automation.execution_stats().await;
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.pending, 0);
    }

    #[tokio::test]
    async fn test_deleted_rule_fails_execution() {
        let store = Arc::new(Store::in_memory());
        let automation = Arc::new(Automation::new(store));

        let rule = automation
            .create_rule(NewRule::new(
                "orphaned",
                TriggerType::Manual,
                ActionType::CreateTask,
            ))
            .await
            .unwrap();
        automation
            .queue_automation(TriggerType::Manual, Uuid::new_v4(), json!({}), None)
            .await
            .unwrap();
        automation.delete_rule(rule.id).await.unwrap();

        let executor = Executor::new(
            automation.clone(),
            Arc::new(LogDispatcher),
            ExecutorSettings::default(),
        );
        executor.run_once().await.unwrap();

        let stats = automation.execution_stats().await;
        assert_eq!(stats.failed, 1);
    }
}
