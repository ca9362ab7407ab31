//! Cultivation plans and their ordered tasks.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::moves::Priority;

/// Plan lifecycle status.
///
/// Transitions are mostly unguarded; the planner only refuses to leave
/// `Completed`/`Cancelled` outside of an explicit reopen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    Draft,
    Active,
    Paused,
    Completed,
    Cancelled,
}

impl PlanStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlanStatus::Completed | PlanStatus::Cancelled)
    }
}

impl Default for PlanStatus {
    fn default() -> Self {
        Self::Draft
    }
}

/// What kind of gift the plan is working toward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GoalType {
    FirstGift,
    Upgrade,
    MajorGift,
    Recurring,
    PlannedGift,
    Retention,
}

/// A goal-directed plan of action tied to exactly one donor move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CultivationPlan {
    pub id: Uuid,
    pub donor_move_id: Uuid,
    pub client_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub strategy: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub target_completion_date: Option<NaiveDate>,
    pub actual_completion_date: Option<DateTime<Utc>>,
    pub goal_description: Option<String>,
    pub goal_amount: Option<f64>,
    pub goal_type: Option<GoalType>,
    pub status: PlanStatus,
    pub success_criteria: Option<String>,
    pub outcome_notes: Option<String>,
    pub was_successful: Option<bool>,
    pub created_by: Option<String>,
    pub assigned_to: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a plan. The backing donor move is resolved from
/// `client_id` at creation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPlan {
    pub client_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub strategy: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub target_completion_date: Option<NaiveDate>,
    pub goal_description: Option<String>,
    pub goal_amount: Option<f64>,
    pub goal_type: Option<GoalType>,
    #[serde(default)]
    pub status: PlanStatus,
    pub success_criteria: Option<String>,
    pub created_by: Option<String>,
    pub assigned_to: Option<String>,
}

impl NewPlan {
    pub fn new(client_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            client_id,
            name: name.into(),
            description: None,
            strategy: None,
            start_date: None,
            target_completion_date: None,
            goal_description: None,
            goal_amount: None,
            goal_type: None,
            status: PlanStatus::default(),
            success_criteria: None,
            created_by: None,
            assigned_to: None,
        }
    }

    pub fn with_goal(mut self, goal_type: GoalType, amount: f64) -> Self {
        self.goal_type = Some(goal_type);
        self.goal_amount = Some(amount);
        self
    }

    pub fn with_status(mut self, status: PlanStatus) -> Self {
        self.status = status;
        self
    }
}

/// Partial update for a plan. `None` leaves the field unchanged; status
/// changes go through `Planner::update_plan_status`.
#[derive(Debug, Clone, Default)]
pub struct PlanUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub strategy: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub target_completion_date: Option<NaiveDate>,
    pub goal_description: Option<String>,
    pub goal_amount: Option<f64>,
    pub goal_type: Option<GoalType>,
    pub success_criteria: Option<String>,
    pub outcome_notes: Option<String>,
    pub was_successful: Option<bool>,
    pub assigned_to: Option<String>,
}

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Pending,
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
    Deferred,
}

/// An ordered, schedulable unit of work within a plan.
///
/// `sequence_order` is assigned as the number of task rows under the plan
/// at creation time. Ordinals are never renumbered, so deleting a task and
/// adding a new one reuses the removed ordinal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CultivationTask {
    pub id: Uuid,
    pub cultivation_plan_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub task_type: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub scheduled_date: Option<NaiveDate>,
    pub completed_date: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub assigned_to: Option<String>,
    pub sequence_order: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a task under a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub task_type: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub scheduled_date: Option<NaiveDate>,
    #[serde(default)]
    pub priority: Priority,
    pub assigned_to: Option<String>,
}

impl NewTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            task_type: None,
            due_date: None,
            scheduled_date: None,
            priority: Priority::default(),
            assigned_to: None,
        }
    }

    pub fn with_due_date(mut self, due: NaiveDate) -> Self {
        self.due_date = Some(due);
        self
    }

    pub fn with_scheduled_date(mut self, scheduled: NaiveDate) -> Self {
        self.scheduled_date = Some(scheduled);
        self
    }

    pub fn with_task_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = Some(task_type.into());
        self
    }
}

/// Partial update for a task. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub task_type: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub scheduled_date: Option<NaiveDate>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub assigned_to: Option<String>,
}
