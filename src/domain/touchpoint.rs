//! Touchpoints: immutable records of donor interactions.
//!
//! Touchpoints are append-only. Once recorded, the core interaction facts
//! (type, date, direction) are never mutated.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TouchpointType {
    Call,
    Email,
    Meeting,
    Event,
    Tour,
    GiftSent,
    Letter,
    SocialMedia,
    Visit,
    ThankYou,
    Proposal,
    Other,
}

impl TouchpointType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TouchpointType::Call => "call",
            TouchpointType::Email => "email",
            TouchpointType::Meeting => "meeting",
            TouchpointType::Event => "event",
            TouchpointType::Tour => "tour",
            TouchpointType::GiftSent => "gift-sent",
            TouchpointType::Letter => "letter",
            TouchpointType::SocialMedia => "social-media",
            TouchpointType::Visit => "visit",
            TouchpointType::ThankYou => "thank-you",
            TouchpointType::Proposal => "proposal",
            TouchpointType::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngagementLevel {
    High,
    Medium,
    Low,
    None,
}

/// One recorded interaction with a donor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Touchpoint {
    pub id: Uuid,
    pub client_id: Uuid,
    /// Resolved from the client's active donor move at write time; a
    /// touchpoint may exist for a client with no active pipeline entry.
    pub donor_move_id: Option<Uuid>,
    pub cultivation_plan_id: Option<Uuid>,
    pub cultivation_task_id: Option<Uuid>,
    pub touchpoint_type: TouchpointType,
    pub touchpoint_date: DateTime<Utc>,
    pub direction: Direction,
    pub subject: Option<String>,
    pub description: Option<String>,
    pub outcome: Option<String>,
    pub sentiment: Option<Sentiment>,
    pub engagement_level: Option<EngagementLevel>,
    pub follow_up_required: bool,
    pub follow_up_date: Option<NaiveDate>,
    pub follow_up_notes: Option<String>,
    pub recorded_by: Option<String>,
    pub related_donation_id: Option<Uuid>,
    pub related_activity_id: Option<Uuid>,
    pub attachments: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for recording a touchpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTouchpoint {
    pub client_id: Uuid,
    pub touchpoint_type: TouchpointType,
    /// Defaults to now when absent.
    pub touchpoint_date: Option<DateTime<Utc>>,
    pub direction: Direction,
    pub subject: Option<String>,
    pub description: Option<String>,
    pub outcome: Option<String>,
    pub sentiment: Option<Sentiment>,
    pub engagement_level: Option<EngagementLevel>,
    #[serde(default)]
    pub follow_up_required: bool,
    pub follow_up_date: Option<NaiveDate>,
    pub follow_up_notes: Option<String>,
    pub recorded_by: Option<String>,
    pub cultivation_plan_id: Option<Uuid>,
    pub cultivation_task_id: Option<Uuid>,
    pub related_donation_id: Option<Uuid>,
    pub related_activity_id: Option<Uuid>,
    #[serde(default)]
    pub attachments: Vec<String>,
}

impl NewTouchpoint {
    pub fn new(client_id: Uuid, touchpoint_type: TouchpointType, direction: Direction) -> Self {
        Self {
            client_id,
            touchpoint_type,
            touchpoint_date: None,
            direction,
            subject: None,
            description: None,
            outcome: None,
            sentiment: None,
            engagement_level: None,
            follow_up_required: false,
            follow_up_date: None,
            follow_up_notes: None,
            recorded_by: None,
            cultivation_plan_id: None,
            cultivation_task_id: None,
            related_donation_id: None,
            related_activity_id: None,
            attachments: Vec::new(),
        }
    }

    pub fn with_sentiment(mut self, sentiment: Sentiment) -> Self {
        self.sentiment = Some(sentiment);
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_date(mut self, date: DateTime<Utc>) -> Self {
        self.touchpoint_date = Some(date);
        self
    }

    pub fn with_follow_up(mut self, date: NaiveDate) -> Self {
        self.follow_up_required = true;
        self.follow_up_date = Some(date);
        self
    }

    pub fn with_plan(mut self, plan_id: Uuid) -> Self {
        self.cultivation_plan_id = Some(plan_id);
        self
    }

    pub fn with_task(mut self, task_id: Uuid) -> Self {
        self.cultivation_task_id = Some(task_id);
        self
    }
}

/// Exact-match filter over touchpoints, AND-combined.
#[derive(Debug, Clone, Default)]
pub struct TouchpointFilter {
    pub touchpoint_type: Option<TouchpointType>,
    pub client_id: Option<Uuid>,
}

impl TouchpointFilter {
    pub fn matches(&self, t: &Touchpoint) -> bool {
        if let Some(tp_type) = self.touchpoint_type {
            if t.touchpoint_type != tp_type {
                return false;
            }
        }
        if let Some(client_id) = self.client_id {
            if t.client_id != client_id {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_wire_values() {
        assert_eq!(
            serde_json::to_string(&TouchpointType::GiftSent).unwrap(),
            "\"gift-sent\""
        );
        assert_eq!(
            serde_json::to_string(&TouchpointType::ThankYou).unwrap(),
            "\"thank-you\""
        );
        assert_eq!(
            serde_json::to_string(&TouchpointType::SocialMedia).unwrap(),
            "\"social-media\""
        );
        assert_eq!(TouchpointType::GiftSent.as_str(), "gift-sent");
    }

    #[test]
    fn test_engagement_none_is_a_value() {
        // `none` is a real engagement level, distinct from an absent one.
        assert_eq!(
            serde_json::to_string(&EngagementLevel::None).unwrap(),
            "\"none\""
        );
    }
}
