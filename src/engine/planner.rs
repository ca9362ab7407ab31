//! Cultivation planner: plan lifecycle and ordered task execution.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::{
    CultivationPlan, CultivationTask, NewPlan, NewTask, PlanStatus, PlanUpdate, TaskStatus,
    TaskUpdate,
};
use crate::error::{Error, Result};
use crate::store::Store;

/// Optional validator consulted on plan status changes, after the built-in
/// terminal-status check. Returning an error message rejects the change.
pub type PlanStatusGuard =
    Box<dyn Fn(PlanStatus, PlanStatus) -> std::result::Result<(), String> + Send + Sync>;

/// Plans and their ordered tasks.
pub struct Planner {
    store: Arc<Store>,
    status_guard: Option<PlanStatusGuard>,
}

impl Planner {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            status_guard: None,
        }
    }

    /// Install a status-transition validator. The default (none) allows any
    /// change except leaving a terminal status, which always requires
    /// [`Planner::reopen_plan`].
    pub fn with_status_guard(mut self, guard: PlanStatusGuard) -> Self {
        self.status_guard = Some(guard);
        self
    }

    /// Create a plan for a client. The backing donor move is resolved from
    /// the client's active move; a plan cannot exist without one.
    #[instrument(skip(self, new), fields(client = %new.client_id))]
    pub async fn create_plan(&self, new: NewPlan) -> Result<CultivationPlan> {
        let donor_move = self
            .store
            .active_move_for_client(new.client_id)
            .await
            .ok_or_else(|| {
                Error::validation(format!(
                    "client {} has no active donor move to attach a plan to",
                    new.client_id
                ))
            })?;

        let now = Utc::now();
        let plan = CultivationPlan {
            id: Uuid::new_v4(),
            donor_move_id: donor_move.id,
            client_id: new.client_id,
            name: new.name,
            description: new.description,
            strategy: new.strategy,
            start_date: new.start_date,
            target_completion_date: new.target_completion_date,
            actual_completion_date: None,
            goal_description: new.goal_description,
            goal_amount: new.goal_amount,
            goal_type: new.goal_type,
            status: new.status,
            success_criteria: new.success_criteria,
            outcome_notes: None,
            was_successful: None,
            created_by: new.created_by,
            assigned_to: new.assigned_to,
            created_at: now,
            updated_at: now,
        };

        let plan = self.store.insert_plan(plan).await?;
        info!(plan_id = %plan.id, donor_move_id = %plan.donor_move_id, "cultivation plan created");
        Ok(plan)
    }

    pub async fn get_plan(&self, id: Uuid) -> Result<CultivationPlan> {
        self.store.get_plan(id).await
    }

    pub async fn plans_for_move(&self, donor_move_id: Uuid) -> Vec<CultivationPlan> {
        self.store.plans_for_move(donor_move_id).await
    }

    /// Apply a partial update. Status changes go through
    /// [`Planner::update_plan_status`].
    pub async fn update_plan(&self, id: Uuid, update: PlanUpdate) -> Result<CultivationPlan> {
        self.store
            .with_plan_mut(id, |p| {
                if let Some(v) = update.name {
                    p.name = v;
                }
                if let Some(v) = update.description {
                    p.description = Some(v);
                }
                if let Some(v) = update.strategy {
                    p.strategy = Some(v);
                }
                if let Some(v) = update.start_date {
                    p.start_date = Some(v);
                }
                if let Some(v) = update.target_completion_date {
                    p.target_completion_date = Some(v);
                }
                if let Some(v) = update.goal_description {
                    p.goal_description = Some(v);
                }
                if let Some(v) = update.goal_amount {
                    p.goal_amount = Some(v);
                }
                if let Some(v) = update.goal_type {
                    p.goal_type = Some(v);
                }
                if let Some(v) = update.success_criteria {
                    p.success_criteria = Some(v);
                }
                if let Some(v) = update.outcome_notes {
                    p.outcome_notes = Some(v);
                }
                if let Some(v) = update.was_successful {
                    p.was_successful = Some(v);
                }
                if let Some(v) = update.assigned_to {
                    p.assigned_to = Some(v);
                }
                p.updated_at = Utc::now();
                Ok(p.clone())
            })
            .await
    }

    /// Set a plan's status. Leaving `completed`/`cancelled` is rejected;
    /// use [`Planner::reopen_plan`] for that. Completing a plan stamps
    /// `actual_completion_date`.
    #[instrument(skip(self))]
    pub async fn update_plan_status(
        &self,
        id: Uuid,
        status: PlanStatus,
    ) -> Result<CultivationPlan> {
        let guard = self.status_guard.as_ref();
        self.store
            .with_plan_mut(id, |p| {
                if p.status == status {
                    return Ok(p.clone());
                }
                if p.status.is_terminal() {
                    return Err(Error::validation(format!(
                        "plan is {:?}; reopen it before changing status",
                        p.status
                    )));
                }
                if let Some(guard) = guard {
                    guard(p.status, status).map_err(Error::Validation)?;
                }
                p.status = status;
                if status == PlanStatus::Completed && p.actual_completion_date.is_none() {
                    p.actual_completion_date = Some(Utc::now());
                }
                p.updated_at = Utc::now();
                Ok(p.clone())
            })
            .await
    }

    /// Explicitly bring a completed/cancelled plan back to `active`.
    pub async fn reopen_plan(&self, id: Uuid) -> Result<CultivationPlan> {
        self.store
            .with_plan_mut(id, |p| {
                if !p.status.is_terminal() {
                    return Err(Error::validation(format!(
                        "plan is {:?}, not a terminal status",
                        p.status
                    )));
                }
                p.status = PlanStatus::Active;
                p.updated_at = Utc::now();
                Ok(p.clone())
            })
            .await
    }

    pub async fn delete_plan(&self, id: Uuid) -> Result<()> {
        self.store.delete_plan(id).await
    }

    /// Create a task under a plan. `sequence_order` is assigned as the
    /// current task count for the plan, so ordinals removed by deletion get
    /// reused rather than renumbered.
    #[instrument(skip(self, new), fields(plan = %plan_id))]
    pub async fn create_task(&self, plan_id: Uuid, new: NewTask) -> Result<CultivationTask> {
        let now = Utc::now();
        let status = if new.scheduled_date.is_some() {
            TaskStatus::Scheduled
        } else {
            TaskStatus::Pending
        };

        let task = self
            .store
            .insert_task_at_next_ordinal(plan_id, |sequence_order| CultivationTask {
                id: Uuid::new_v4(),
                cultivation_plan_id: plan_id,
                title: new.title,
                description: new.description,
                task_type: new.task_type,
                due_date: new.due_date,
                scheduled_date: new.scheduled_date,
                completed_date: None,
                status,
                priority: new.priority,
                assigned_to: new.assigned_to,
                sequence_order,
                created_at: now,
                updated_at: now,
            })
            .await?;

        info!(task_id = %task.id, sequence_order = task.sequence_order, "task created");
        Ok(task)
    }

    pub async fn get_task(&self, id: Uuid) -> Result<CultivationTask> {
        self.store.get_task(id).await
    }

    /// Tasks for a plan, ordered by `sequence_order` then creation time
    /// (duplicated ordinals from delete-and-recreate sort by age).
    pub async fn tasks(&self, plan_id: Uuid) -> Vec<CultivationTask> {
        self.store.tasks_for_plan(plan_id).await
    }

    /// Apply a partial update to a task.
    pub async fn update_task(&self, id: Uuid, update: TaskUpdate) -> Result<CultivationTask> {
        self.store
            .with_task_mut(id, |t| {
                if let Some(v) = update.title {
                    t.title = v;
                }
                if let Some(v) = update.description {
                    t.description = Some(v);
                }
                if let Some(v) = update.task_type {
                    t.task_type = Some(v);
                }
                if let Some(v) = update.due_date {
                    t.due_date = Some(v);
                }
                if let Some(v) = update.scheduled_date {
                    t.scheduled_date = Some(v);
                }
                if let Some(v) = update.status {
                    t.status = v;
                }
                if let Some(v) = update.priority {
                    t.priority = v;
                }
                if let Some(v) = update.assigned_to {
                    t.assigned_to = Some(v);
                }
                t.updated_at = Utc::now();
                Ok(t.clone())
            })
            .await
    }

    /// Mark a task completed. Idempotent: re-completing an already-completed
    /// task returns it unchanged — same `completed_date`, no new write, and
    /// no downstream effects fire twice.
    #[instrument(skip(self))]
    pub async fn complete_task(&self, id: Uuid) -> Result<CultivationTask> {
        self.store
            .with_task_mut(id, |t| {
                if t.status == TaskStatus::Completed {
                    return Ok(t.clone());
                }
                let now = Utc::now();
                t.status = TaskStatus::Completed;
                t.completed_date = Some(now);
                t.updated_at = now;
                Ok(t.clone())
            })
            .await
    }

    /// Remove a task row. CRM screens cancel tasks via status instead of
    /// deleting them; this exists for administrative cleanup and is where
    /// ordinal reuse comes from.
    pub async fn delete_task(&self, id: Uuid) -> Result<()> {
        self.store.delete_task(id).await
    }
}
