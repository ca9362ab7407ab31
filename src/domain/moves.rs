//! Donor moves and the cultivation pipeline stages.
//!
//! A `DonorMove` tracks one donor's position in the moves-management
//! pipeline. Stage transitions are applied by the pipeline engine; the
//! types here are plain data.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The six pipeline buckets a donor can occupy.
///
/// `Lapsed` is not part of the five-stage kanban; consumers render it as a
/// separate bucket. Any stage is reachable from any other stage — the
/// pipeline deliberately enforces no ordering between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStage {
    Identification,
    Qualification,
    Cultivation,
    Solicitation,
    Stewardship,
    Lapsed,
}

impl PipelineStage {
    /// All stages in kanban order, `Lapsed` last.
    pub const ALL: [PipelineStage; 6] = [
        PipelineStage::Identification,
        PipelineStage::Qualification,
        PipelineStage::Cultivation,
        PipelineStage::Solicitation,
        PipelineStage::Stewardship,
        PipelineStage::Lapsed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Identification => "identification",
            PipelineStage::Qualification => "qualification",
            PipelineStage::Cultivation => "cultivation",
            PipelineStage::Solicitation => "solicitation",
            PipelineStage::Stewardship => "stewardship",
            PipelineStage::Lapsed => "lapsed",
        }
    }
}

impl Default for PipelineStage {
    fn default() -> Self {
        Self::Identification
    }
}

/// Priority shared by donor moves and cultivation tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Default for Priority {
    fn default() -> Self {
        Self::Medium
    }
}

/// A donor's tracked position and metadata within the cultivation pipeline.
///
/// At most one move per client is active at a time; retired moves keep
/// their history with `is_active = false` (moves are never hard-deleted).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonorMove {
    pub id: Uuid,
    pub client_id: Uuid,
    pub current_stage: PipelineStage,
    pub previous_stage: Option<PipelineStage>,
    pub donor_type: Option<String>,
    pub giving_capacity: Option<String>,
    /// 0–100, validated at create/update.
    pub affinity_score: u8,
    pub target_gift_amount: Option<f64>,
    pub target_gift_date: Option<NaiveDate>,
    pub target_gift_type: Option<String>,
    pub priority: Priority,
    pub is_active: bool,
    pub notes: Option<String>,
    /// Reset on every stage change.
    pub stage_entered_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a donor move.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDonorMove {
    pub client_id: Uuid,
    #[serde(default)]
    pub stage: PipelineStage,
    pub donor_type: Option<String>,
    pub giving_capacity: Option<String>,
    #[serde(default)]
    pub affinity_score: u8,
    pub target_gift_amount: Option<f64>,
    pub target_gift_date: Option<NaiveDate>,
    pub target_gift_type: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    pub notes: Option<String>,
}

impl NewDonorMove {
    pub fn new(client_id: Uuid) -> Self {
        Self {
            client_id,
            ..Default::default()
        }
    }

    pub fn with_stage(mut self, stage: PipelineStage) -> Self {
        self.stage = stage;
        self
    }

    pub fn with_target_gift(mut self, amount: f64) -> Self {
        self.target_gift_amount = Some(amount);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_donor_type(mut self, donor_type: impl Into<String>) -> Self {
        self.donor_type = Some(donor_type.into());
        self
    }

    pub fn with_giving_capacity(mut self, capacity: impl Into<String>) -> Self {
        self.giving_capacity = Some(capacity.into());
        self
    }

    pub fn with_affinity_score(mut self, score: u8) -> Self {
        self.affinity_score = score;
        self
    }
}

/// Partial update for a donor move. `None` leaves the field unchanged.
///
/// Stage fields are deliberately absent: stage changes go through
/// `Pipeline::advance_stage` so that `previous_stage`/`stage_entered_at`
/// stay consistent.
#[derive(Debug, Clone, Default)]
pub struct MoveUpdate {
    pub donor_type: Option<String>,
    pub giving_capacity: Option<String>,
    pub affinity_score: Option<u8>,
    pub target_gift_amount: Option<f64>,
    pub target_gift_date: Option<NaiveDate>,
    pub target_gift_type: Option<String>,
    pub priority: Option<Priority>,
    pub notes: Option<String>,
}

/// Exact-match filter over donor moves, AND-combined.
#[derive(Debug, Clone, Default)]
pub struct MoveFilter {
    pub donor_type: Option<String>,
    pub giving_capacity: Option<String>,
}

impl MoveFilter {
    pub fn matches(&self, m: &DonorMove) -> bool {
        if let Some(ref donor_type) = self.donor_type {
            if m.donor_type.as_deref() != Some(donor_type.as_str()) {
                return false;
            }
        }
        if let Some(ref capacity) = self.giving_capacity {
            if m.giving_capacity.as_deref() != Some(capacity.as_str()) {
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
    fn test_stage_serialization() {
        let json = serde_json::to_string(&PipelineStage::Identification).unwrap();
        assert_eq!(json, "\"identification\"");

        let parsed: PipelineStage = serde_json::from_str("\"lapsed\"").unwrap();
        assert_eq!(parsed, PipelineStage::Lapsed);
    }

    #[test]
    fn test_move_serializes_camel_case() {
        let m = DonorMove {
            id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            current_stage: PipelineStage::Cultivation,
            previous_stage: Some(PipelineStage::Qualification),
            donor_type: None,
            giving_capacity: None,
            affinity_score: 60,
            target_gift_amount: Some(5000.0),
            target_gift_date: None,
            target_gift_type: None,
            priority: Priority::High,
            is_active: true,
            notes: None,
            stage_entered_at: Utc::now(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let value = serde_json::to_value(&m).unwrap();
        assert_eq!(value["currentStage"], "cultivation");
        assert_eq!(value["previousStage"], "qualification");
        assert_eq!(value["targetGiftAmount"], 5000.0);
        assert_eq!(value["isActive"], true);
    }

    #[test]
    fn test_filter_matches() {
        let mut m = DonorMove {
            id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            current_stage: PipelineStage::Identification,
            previous_stage: None,
            donor_type: Some("individual".to_string()),
            giving_capacity: Some("major".to_string()),
            affinity_score: 0,
            target_gift_amount: None,
            target_gift_date: None,
            target_gift_type: None,
            priority: Priority::Medium,
            is_active: true,
            notes: None,
            stage_entered_at: Utc::now(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert!(MoveFilter::default().matches(&m));

        let filter = MoveFilter {
            donor_type: Some("individual".to_string()),
            giving_capacity: Some("major".to_string()),
        };
        assert!(filter.matches(&m));

        m.donor_type = Some("foundation".to_string());
        assert!(!filter.matches(&m));
    }
}
