//! Entity store: in-memory state with an append-only change journal.
//!
//! All collections live behind a single `tokio::sync::Mutex`, so every
//! write is atomic per row and the pending→processing claim in
//! `claim_due` is an atomic compare-and-set for the whole batch. Mutations
//! are applied to a clone, journaled, then committed, so a journal failure
//! never leaves half-written state behind.
//!
//! Touchpoints and executions additionally keep insertion order; consumers
//! depend on stable, creation-ordered iteration for both.

pub mod journal;

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{
    AutomationExecution, AutomationRule, CultivationPlan, CultivationTask, DonorMove,
    EmailTemplate, ExecutionStatus, Touchpoint, TriggerType,
};
use crate::error::{Error, Result};

pub use journal::{Change, ChangeEvent, Journal};

#[derive(Default)]
struct State {
    moves: HashMap<Uuid, DonorMove>,
    plans: HashMap<Uuid, CultivationPlan>,
    tasks: HashMap<Uuid, CultivationTask>,
    touchpoints: HashMap<Uuid, Touchpoint>,
    touchpoint_order: Vec<Uuid>,
    rules: HashMap<Uuid, AutomationRule>,
    executions: HashMap<Uuid, AutomationExecution>,
    execution_order: Vec<Uuid>,
    templates: HashMap<Uuid, EmailTemplate>,
}

impl State {
    fn apply(&mut self, change: Change) {
        match change {
            Change::MoveUpserted(m) => {
                self.moves.insert(m.id, m);
            }
            Change::PlanUpserted(p) => {
                self.plans.insert(p.id, p);
            }
            Change::PlanDeleted(id) => {
                self.plans.remove(&id);
            }
            Change::TaskUpserted(t) => {
                self.tasks.insert(t.id, t);
            }
            Change::TaskDeleted(id) => {
                self.tasks.remove(&id);
            }
            Change::TouchpointAppended(t) => {
                if !self.touchpoints.contains_key(&t.id) {
                    self.touchpoint_order.push(t.id);
                }
                self.touchpoints.insert(t.id, t);
            }
            Change::RuleUpserted(r) => {
                self.rules.insert(r.id, r);
            }
            Change::RuleDeleted(id) => {
                self.rules.remove(&id);
            }
            Change::ExecutionUpserted(e) => {
                if !self.executions.contains_key(&e.id) {
                    self.execution_order.push(e.id);
                }
                self.executions.insert(e.id, e);
            }
            Change::TemplateUpserted(t) => {
                self.templates.insert(t.id, t);
            }
        }
    }
}

/// The entity store.
pub struct Store {
    state: Mutex<State>,
    journal: Option<Journal>,
}

impl Store {
    /// Open a journal-backed store, replaying any existing changes.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let journal = Journal::new(path.into());
        let mut state = State::default();
        for event in journal.replay().await? {
            state.apply(event.change);
        }
        Ok(Self {
            state: Mutex::new(state),
            journal: Some(journal),
        })
    }

    /// An ephemeral store with no journal.
    pub fn in_memory() -> Self {
        Self {
            state: Mutex::new(State::default()),
            journal: None,
        }
    }

    async fn log(&self, change: &Change) -> Result<()> {
        if let Some(journal) = &self.journal {
            journal.append(change).await?;
        }
        Ok(())
    }

    // --- donor moves ---

    /// Insert a new move. Rejects a second active move for the same client.
    pub async fn insert_move(&self, m: DonorMove) -> Result<DonorMove> {
        let mut state = self.state.lock().await;
        if m.is_active {
            if let Some(existing) = state
                .moves
                .values()
                .find(|x| x.client_id == m.client_id && x.is_active)
            {
                return Err(Error::conflict(format!(
                    "client {} already has an active donor move ({})",
                    m.client_id, existing.id
                )));
            }
        }
        self.log(&Change::MoveUpserted(m.clone())).await?;
        state.moves.insert(m.id, m.clone());
        Ok(m)
    }

    pub async fn get_move(&self, id: Uuid) -> Result<DonorMove> {
        let state = self.state.lock().await;
        state
            .moves
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found("donor move", id))
    }

    pub async fn list_moves(&self) -> Vec<DonorMove> {
        let state = self.state.lock().await;
        let mut moves: Vec<DonorMove> = state.moves.values().cloned().collect();
        moves.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        moves
    }

    pub async fn active_move_for_client(&self, client_id: Uuid) -> Option<DonorMove> {
        let state = self.state.lock().await;
        state
            .moves
            .values()
            .find(|m| m.client_id == client_id && m.is_active)
            .cloned()
    }

    /// Read-modify-write a move under the store lock. No journal entry is
    /// written (and `updated_at` is left to the caller) when `f` makes no
    /// change.
    pub async fn with_move_mut<R>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut DonorMove) -> Result<R>,
    ) -> Result<R> {
        let mut state = self.state.lock().await;
        let original = state
            .moves
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found("donor move", id))?;
        let mut row = original.clone();
        let out = f(&mut row)?;
        if row != original {
            self.log(&Change::MoveUpserted(row.clone())).await?;
            state.moves.insert(id, row);
        }
        Ok(out)
    }

    // --- cultivation plans ---

    pub async fn insert_plan(&self, p: CultivationPlan) -> Result<CultivationPlan> {
        let mut state = self.state.lock().await;
        self.log(&Change::PlanUpserted(p.clone())).await?;
        state.plans.insert(p.id, p.clone());
        Ok(p)
    }

    pub async fn get_plan(&self, id: Uuid) -> Result<CultivationPlan> {
        let state = self.state.lock().await;
        state
            .plans
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found("cultivation plan", id))
    }

    pub async fn list_plans(&self) -> Vec<CultivationPlan> {
        let state = self.state.lock().await;
        let mut plans: Vec<CultivationPlan> = state.plans.values().cloned().collect();
        plans.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        plans
    }

    pub async fn plans_for_move(&self, donor_move_id: Uuid) -> Vec<CultivationPlan> {
        let state = self.state.lock().await;
        let mut plans: Vec<CultivationPlan> = state
            .plans
            .values()
            .filter(|p| p.donor_move_id == donor_move_id)
            .cloned()
            .collect();
        plans.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        plans
    }

    pub async fn with_plan_mut<R>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut CultivationPlan) -> Result<R>,
    ) -> Result<R> {
        let mut state = self.state.lock().await;
        let original = state
            .plans
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found("cultivation plan", id))?;
        let mut row = original.clone();
        let out = f(&mut row)?;
        if row != original {
            self.log(&Change::PlanUpserted(row.clone())).await?;
            state.plans.insert(id, row);
        }
        Ok(out)
    }

    /// Delete a plan and all tasks under it.
    pub async fn delete_plan(&self, id: Uuid) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.plans.contains_key(&id) {
            return Err(Error::not_found("cultivation plan", id));
        }
        let task_ids: Vec<Uuid> = state
            .tasks
            .values()
            .filter(|t| t.cultivation_plan_id == id)
            .map(|t| t.id)
            .collect();
        self.log(&Change::PlanDeleted(id)).await?;
        for task_id in &task_ids {
            self.log(&Change::TaskDeleted(*task_id)).await?;
        }
        state.plans.remove(&id);
        for task_id in task_ids {
            state.tasks.remove(&task_id);
        }
        Ok(())
    }

    // --- cultivation tasks ---

    /// Insert a task built from the next ordinal for its plan, all under one
    /// lock acquisition. The ordinal is the current task-row count for the
    /// plan, so removed ordinals get reused.
    pub async fn insert_task_at_next_ordinal(
        &self,
        plan_id: Uuid,
        build: impl FnOnce(u32) -> CultivationTask,
    ) -> Result<CultivationTask> {
        let mut state = self.state.lock().await;
        if !state.plans.contains_key(&plan_id) {
            return Err(Error::not_found("cultivation plan", plan_id));
        }
        let count = state
            .tasks
            .values()
            .filter(|t| t.cultivation_plan_id == plan_id)
            .count() as u32;
        let task = build(count);
        self.log(&Change::TaskUpserted(task.clone())).await?;
        state.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    pub async fn get_task(&self, id: Uuid) -> Result<CultivationTask> {
        let state = self.state.lock().await;
        state
            .tasks
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found("cultivation task", id))
    }

    pub async fn tasks_for_plan(&self, plan_id: Uuid) -> Vec<CultivationTask> {
        let state = self.state.lock().await;
        let mut tasks: Vec<CultivationTask> = state
            .tasks
            .values()
            .filter(|t| t.cultivation_plan_id == plan_id)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| {
            a.sequence_order
                .cmp(&b.sequence_order)
                .then(a.created_at.cmp(&b.created_at))
        });
        tasks
    }

    pub async fn with_task_mut<R>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut CultivationTask) -> Result<R>,
    ) -> Result<R> {
        let mut state = self.state.lock().await;
        let original = state
            .tasks
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found("cultivation task", id))?;
        let mut row = original.clone();
        let out = f(&mut row)?;
        if row != original {
            self.log(&Change::TaskUpserted(row.clone())).await?;
            state.tasks.insert(id, row);
        }
        Ok(out)
    }

    pub async fn delete_task(&self, id: Uuid) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.tasks.contains_key(&id) {
            return Err(Error::not_found("cultivation task", id));
        }
        self.log(&Change::TaskDeleted(id)).await?;
        state.tasks.remove(&id);
        Ok(())
    }

    // --- touchpoints ---

    pub async fn append_touchpoint(&self, t: Touchpoint) -> Result<Touchpoint> {
        let mut state = self.state.lock().await;
        self.log(&Change::TouchpointAppended(t.clone())).await?;
        state.touchpoint_order.push(t.id);
        state.touchpoints.insert(t.id, t.clone());
        Ok(t)
    }

    pub async fn get_touchpoint(&self, id: Uuid) -> Result<Touchpoint> {
        let state = self.state.lock().await;
        state
            .touchpoints
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found("touchpoint", id))
    }

    /// All touchpoints in insertion order.
    pub async fn list_touchpoints(&self) -> Vec<Touchpoint> {
        let state = self.state.lock().await;
        state
            .touchpoint_order
            .iter()
            .filter_map(|id| state.touchpoints.get(id))
            .cloned()
            .collect()
    }

    // --- automation rules ---

    pub async fn insert_rule(&self, r: AutomationRule) -> Result<AutomationRule> {
        let mut state = self.state.lock().await;
        self.log(&Change::RuleUpserted(r.clone())).await?;
        state.rules.insert(r.id, r.clone());
        Ok(r)
    }

    pub async fn get_rule(&self, id: Uuid) -> Result<AutomationRule> {
        let state = self.state.lock().await;
        state
            .rules
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found("automation rule", id))
    }

    /// All rules, ascending priority (lower number first).
    pub async fn list_rules(&self) -> Vec<AutomationRule> {
        let state = self.state.lock().await;
        let mut rules: Vec<AutomationRule> = state.rules.values().cloned().collect();
        rules.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.created_at.cmp(&b.created_at)));
        rules
    }

    /// Active rules for a trigger, ascending priority.
    pub async fn active_rules_for_trigger(&self, trigger: TriggerType) -> Vec<AutomationRule> {
        let state = self.state.lock().await;
        let mut rules: Vec<AutomationRule> = state
            .rules
            .values()
            .filter(|r| r.is_active && r.trigger_type == trigger)
            .cloned()
            .collect();
        rules.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.created_at.cmp(&b.created_at)));
        rules
    }

    pub async fn with_rule_mut<R>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut AutomationRule) -> Result<R>,
    ) -> Result<R> {
        let mut state = self.state.lock().await;
        let original = state
            .rules
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found("automation rule", id))?;
        let mut row = original.clone();
        let out = f(&mut row)?;
        if row != original {
            self.log(&Change::RuleUpserted(row.clone())).await?;
            state.rules.insert(id, row);
        }
        Ok(out)
    }

    pub async fn delete_rule(&self, id: Uuid) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.rules.contains_key(&id) {
            return Err(Error::not_found("automation rule", id));
        }
        self.log(&Change::RuleDeleted(id)).await?;
        state.rules.remove(&id);
        Ok(())
    }

    // --- automation executions ---

    pub async fn insert_execution(&self, e: AutomationExecution) -> Result<AutomationExecution> {
        let mut state = self.state.lock().await;
        self.log(&Change::ExecutionUpserted(e.clone())).await?;
        if !state.executions.contains_key(&e.id) {
            state.execution_order.push(e.id);
        }
        state.executions.insert(e.id, e.clone());
        Ok(e)
    }

    pub async fn get_execution(&self, id: Uuid) -> Result<AutomationExecution> {
        let state = self.state.lock().await;
        state
            .executions
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found("automation execution", id))
    }

    /// All executions in creation order.
    pub async fn list_executions(&self) -> Vec<AutomationExecution> {
        let state = self.state.lock().await;
        state
            .execution_order
            .iter()
            .filter_map(|id| state.executions.get(id))
            .cloned()
            .collect()
    }

    pub async fn with_execution_mut<R>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut AutomationExecution) -> Result<R>,
    ) -> Result<R> {
        let mut state = self.state.lock().await;
        let original = state
            .executions
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found("automation execution", id))?;
        let mut row = original.clone();
        let out = f(&mut row)?;
        if row != original {
            self.log(&Change::ExecutionUpserted(row.clone())).await?;
            state.executions.insert(id, row);
        }
        Ok(out)
    }

    /// Claim up to `limit` pending executions whose `scheduled_for` is due,
    /// flipping them to `processing`. The whole batch is claimed under one
    /// lock acquisition, so concurrent workers never claim the same row; a
    /// row another worker already took is simply absent from this batch.
    pub async fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<AutomationExecution>> {
        let mut state = self.state.lock().await;

        let due: Vec<Uuid> = state
            .execution_order
            .iter()
            .filter(|id| {
                state
                    .executions
                    .get(*id)
                    .map(|e| e.status == ExecutionStatus::Pending && e.scheduled_for <= now)
                    .unwrap_or(false)
            })
            .take(limit)
            .cloned()
            .collect();

        let mut claimed = Vec::with_capacity(due.len());
        for id in due {
            let mut row = state.executions[&id].clone();
            row.status = ExecutionStatus::Processing;
            row.updated_at = now;
            self.log(&Change::ExecutionUpserted(row.clone())).await?;
            state.executions.insert(id, row.clone());
            claimed.push(row);
        }

        Ok(claimed)
    }

    /// Revert `processing` rows whose last update is older than `older_than`
    /// back to `pending`. Returns the number of rows released.
    pub async fn release_stuck(&self, now: DateTime<Utc>, older_than: Duration) -> Result<usize> {
        let mut state = self.state.lock().await;

        let stuck: Vec<Uuid> = state
            .executions
            .values()
            .filter(|e| e.status == ExecutionStatus::Processing && e.updated_at + older_than <= now)
            .map(|e| e.id)
            .collect();

        for id in &stuck {
            let mut row = state.executions[id].clone();
            row.status = ExecutionStatus::Pending;
            row.updated_at = now;
            self.log(&Change::ExecutionUpserted(row.clone())).await?;
            state.executions.insert(*id, row);
        }

        Ok(stuck.len())
    }

    // --- email templates ---

    pub async fn upsert_template(&self, t: EmailTemplate) -> Result<EmailTemplate> {
        let mut state = self.state.lock().await;
        self.log(&Change::TemplateUpserted(t.clone())).await?;
        state.templates.insert(t.id, t.clone());
        Ok(t)
    }

    pub async fn get_template(&self, id: Uuid) -> Result<EmailTemplate> {
        let state = self.state.lock().await;
        state
            .templates
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found("email template", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewDonorMove, PipelineStage, Priority};
    use tempfile::TempDir;

    fn build_move(client_id: Uuid) -> DonorMove {
        let now = Utc::now();
        DonorMove {
            id: Uuid::new_v4(),
            client_id,
            current_stage: PipelineStage::Identification,
            previous_stage: None,
            donor_type: None,
            giving_capacity: None,
            affinity_score: 40,
            target_gift_amount: None,
            target_gift_date: None,
            target_gift_type: None,
            priority: Priority::Medium,
            is_active: true,
            notes: None,
            stage_entered_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_second_active_move_rejected() {
        let store = Store::in_memory();
        let client_id = Uuid::new_v4();

        store.insert_move(build_move(client_id)).await.unwrap();
        let err = store.insert_move(build_move(client_id)).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        // A different client is fine.
        store.insert_move(build_move(Uuid::new_v4())).await.unwrap();
    }

    #[tokio::test]
    async fn test_unchanged_rmw_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("changes.jsonl");
        let store = Store::open(&path).await.unwrap();

        let m = store.insert_move(build_move(Uuid::new_v4())).await.unwrap();
        store.with_move_mut(m.id, |_| Ok(())).await.unwrap();

        let journal = Journal::new(path);
        let events = journal.replay().await.unwrap();
        assert_eq!(events.len(), 1, "no-op mutation must not journal");
    }

    #[tokio::test]
    async fn test_reopen_replays_state() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("changes.jsonl");

        let m = {
            let store = Store::open(&path).await.unwrap();
            let m = store.insert_move(build_move(Uuid::new_v4())).await.unwrap();
            store
                .with_move_mut(m.id, |row| {
                    row.affinity_score = 90;
                    Ok(())
                })
                .await
                .unwrap();
            m
        };

        let reopened = Store::open(&path).await.unwrap();
        let replayed = reopened.get_move(m.id).await.unwrap();
        assert_eq!(replayed.affinity_score, 90);
    }

    #[tokio::test]
    async fn test_new_donor_move_builder_defaults() {
        let new = NewDonorMove::new(Uuid::new_v4());
        assert_eq!(new.stage, PipelineStage::Identification);
        assert_eq!(new.priority, Priority::Medium);
    }
}
