//! Automation rules, executions, and email templates.
//!
//! A rule binds a trigger to a delayed action. Each firing of a rule is
//! materialized as an `AutomationExecution` at trigger time and consumed
//! later by the executor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Domain triggers that can queue automations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    DonationCreated,
    PledgeCreated,
    PledgePaymentDue,
    LargeDonation,
    EngagementDropped,
    Birthday,
    Anniversary,
    Manual,
}

/// What the rule does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    SendEmail,
    CreateTask,
    SendSms,
    LogCommunication,
    UpdateEngagement,
}

/// A trigger→action binding.
///
/// `priority` orders evaluation among rules matching the same trigger
/// (lower number first). Disabling a rule stops new executions from being
/// queued but does not cancel executions already queued for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationRule {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub trigger_type: TriggerType,
    /// Structured predicate evaluated against the trigger payload;
    /// absent or empty means "always match".
    pub trigger_conditions: Option<serde_json::Value>,
    pub action_type: ActionType,
    pub action_config: serde_json::Value,
    pub delay_minutes: u32,
    pub template_id: Option<Uuid>,
    pub assign_to_user_id: Option<String>,
    pub is_active: bool,
    pub priority: i32,
    /// Successful executions only; never decreases.
    pub execution_count: u64,
    pub last_executed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRule {
    pub name: String,
    pub description: Option<String>,
    pub trigger_type: TriggerType,
    pub trigger_conditions: Option<serde_json::Value>,
    pub action_type: ActionType,
    #[serde(default)]
    pub action_config: serde_json::Value,
    #[serde(default)]
    pub delay_minutes: u32,
    pub template_id: Option<Uuid>,
    pub assign_to_user_id: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: i32,
}

fn default_priority() -> i32 {
    100
}

impl NewRule {
    pub fn new(name: impl Into<String>, trigger_type: TriggerType, action_type: ActionType) -> Self {
        Self {
            name: name.into(),
            description: None,
            trigger_type,
            trigger_conditions: None,
            action_type,
            action_config: serde_json::Value::Null,
            delay_minutes: 0,
            template_id: None,
            assign_to_user_id: None,
            priority: default_priority(),
        }
    }

    pub fn with_delay_minutes(mut self, minutes: u32) -> Self {
        self.delay_minutes = minutes;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_conditions(mut self, conditions: serde_json::Value) -> Self {
        self.trigger_conditions = Some(conditions);
        self
    }

    pub fn with_template(mut self, template_id: Uuid) -> Self {
        self.template_id = Some(template_id);
        self
    }
}

/// Partial update for a rule. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct RuleUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub trigger_conditions: Option<serde_json::Value>,
    pub action_config: Option<serde_json::Value>,
    pub delay_minutes: Option<u32>,
    pub template_id: Option<Uuid>,
    pub assign_to_user_id: Option<String>,
    pub priority: Option<i32>,
}

/// Execution lifecycle: `pending → processing → completed | failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }
}

/// One scheduled, tracked firing of a rule for a specific trigger occurrence.
///
/// `scheduled_for` is fixed at creation and never changed. `retry_count`
/// increments only on a manual failed→pending requeue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationExecution {
    pub id: Uuid,
    pub rule_id: Uuid,
    pub client_id: Uuid,
    pub trigger_type: TriggerType,
    /// Payload captured at trigger time.
    pub trigger_data: serde_json::Value,
    pub trigger_entity_id: Option<Uuid>,
    pub scheduled_for: DateTime<Utc>,
    pub status: ExecutionStatus,
    pub executed_at: Option<DateTime<Utc>>,
    pub result_data: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Static email content with `{{field}}` merge placeholders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailTemplate {
    pub id: Uuid,
    pub name: String,
    pub subject: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EmailTemplate {
    /// Substitute `{{key}}` placeholders from a flat JSON object. Keys
    /// absent from `vars` are left in place.
    pub fn render(&self, vars: &serde_json::Value) -> RenderedEmail {
        RenderedEmail {
            subject: substitute(&self.subject, vars),
            body: substitute(&self.body, vars),
        }
    }
}

/// A template with merge fields applied.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedEmail {
    pub subject: String,
    pub body: String,
}

fn substitute(text: &str, vars: &serde_json::Value) -> String {
    let mut out = text.to_string();
    if let Some(map) = vars.as_object() {
        for (key, value) in map {
            let placeholder = format!("{{{{{}}}}}", key);
            let replacement = match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            out = out.replace(&placeholder, &replacement);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_trigger_wire_values() {
        assert_eq!(
            serde_json::to_string(&TriggerType::DonationCreated).unwrap(),
            "\"donation_created\""
        );
        assert_eq!(
            serde_json::to_string(&TriggerType::PledgePaymentDue).unwrap(),
            "\"pledge_payment_due\""
        );
        assert_eq!(
            serde_json::to_string(&ActionType::SendEmail).unwrap(),
            "\"send_email\""
        );
    }

    #[test]
    fn test_execution_status_terminal() {
        assert!(!ExecutionStatus::Pending.is_terminal());
        assert!(!ExecutionStatus::Processing.is_terminal());
        assert!(ExecutionStatus::Completed.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
    }

    #[test]
    fn test_template_render() {
        let template = EmailTemplate {
            id: Uuid::new_v4(),
            name: "thank-you".to_string(),
            subject: "Thank you, {{firstName}}!".to_string(),
            body: "Dear {{firstName}}, your gift of ${{amount}} means a lot.".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let rendered = template.render(&json!({"firstName": "Ada", "amount": 250}));
        assert_eq!(rendered.subject, "Thank you, Ada!");
        assert_eq!(rendered.body, "Dear Ada, your gift of $250 means a lot.");
    }

    #[test]
    fn test_template_render_missing_key_left_in_place() {
        let template = EmailTemplate {
            id: Uuid::new_v4(),
            name: "t".to_string(),
            subject: "Hi {{firstName}}".to_string(),
            body: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let rendered = template.render(&json!({}));
        assert_eq!(rendered.subject, "Hi {{firstName}}");
    }
}
