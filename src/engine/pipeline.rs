//! Pipeline state machine for donor moves.
//!
//! Stage transitions are deliberately unconstrained: any stage is reachable
//! from any other, including regressions. A donor jumping from
//! identification straight to stewardship is legal. Deployments that want a
//! stricter graph install a [`StageGuard`] without touching call sites.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::{DonorMove, MoveFilter, MoveUpdate, NewDonorMove, PipelineStage};
use crate::error::{Error, Result};
use crate::store::Store;

/// Optional validator consulted before a stage change. Returning an error
/// message rejects the transition as a validation failure.
pub type StageGuard =
    Box<dyn Fn(PipelineStage, PipelineStage) -> std::result::Result<(), String> + Send + Sync>;

/// One kanban column of active moves.
#[derive(Debug, Clone)]
pub struct StageColumn {
    pub stage: PipelineStage,
    pub moves: Vec<DonorMove>,
}

/// Active moves grouped into the fixed six stage buckets.
#[derive(Debug, Clone)]
pub struct StageBoard {
    pub columns: Vec<StageColumn>,
}

impl StageBoard {
    pub fn column(&self, stage: PipelineStage) -> &StageColumn {
        // Columns are always built in PipelineStage::ALL order.
        self.columns
            .iter()
            .find(|c| c.stage == stage)
            .expect("board always has all six columns")
    }
}

/// Per-stage count and value rollup.
#[derive(Debug, Clone)]
pub struct StageMetrics {
    pub stage: PipelineStage,
    pub count: usize,
    pub value: f64,
}

/// Pipeline-wide rollup over active moves.
///
/// Moves without a target gift amount count toward `total_active` and the
/// per-stage counts but contribute zero to the value sums.
#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    pub total_active: usize,
    pub total_value: f64,
    pub stages: Vec<StageMetrics>,
}

/// Donor-move lifecycle and stage transitions.
pub struct Pipeline {
    store: Arc<Store>,
    stage_guard: Option<StageGuard>,
}

impl Pipeline {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            stage_guard: None,
        }
    }

    /// Install a transition validator. The default (none) allows any
    /// stage-to-stage transition.
    pub fn with_stage_guard(mut self, guard: StageGuard) -> Self {
        self.stage_guard = Some(guard);
        self
    }

    /// Enter a contact into the pipeline. Fails with a conflict if the
    /// client already has an active move; retire it first.
    #[instrument(skip(self, new), fields(client = %new.client_id))]
    pub async fn create_move(&self, new: NewDonorMove) -> Result<DonorMove> {
        validate_affinity(new.affinity_score)?;

        let now = Utc::now();
        let m = DonorMove {
            id: Uuid::new_v4(),
            client_id: new.client_id,
            current_stage: new.stage,
            previous_stage: None,
            donor_type: new.donor_type,
            giving_capacity: new.giving_capacity,
            affinity_score: new.affinity_score,
            target_gift_amount: new.target_gift_amount,
            target_gift_date: new.target_gift_date,
            target_gift_type: new.target_gift_type,
            priority: new.priority,
            is_active: true,
            notes: new.notes,
            stage_entered_at: now,
            created_at: now,
            updated_at: now,
        };

        let m = self.store.insert_move(m).await?;
        info!(move_id = %m.id, stage = m.current_stage.as_str(), "donor move created");
        Ok(m)
    }

    pub async fn get_move(&self, id: Uuid) -> Result<DonorMove> {
        self.store.get_move(id).await
    }

    pub async fn active_move_for_client(&self, client_id: Uuid) -> Option<DonorMove> {
        self.store.active_move_for_client(client_id).await
    }

    /// Apply a partial update. Stage fields are not touchable here.
    pub async fn update_move(&self, id: Uuid, update: MoveUpdate) -> Result<DonorMove> {
        if let Some(score) = update.affinity_score {
            validate_affinity(score)?;
        }
        self.store
            .with_move_mut(id, |m| {
                if let Some(v) = update.donor_type {
                    m.donor_type = Some(v);
                }
                if let Some(v) = update.giving_capacity {
                    m.giving_capacity = Some(v);
                }
                if let Some(v) = update.affinity_score {
                    m.affinity_score = v;
                }
                if let Some(v) = update.target_gift_amount {
                    m.target_gift_amount = Some(v);
                }
                if let Some(v) = update.target_gift_date {
                    m.target_gift_date = Some(v);
                }
                if let Some(v) = update.target_gift_type {
                    m.target_gift_type = Some(v);
                }
                if let Some(v) = update.priority {
                    m.priority = v;
                }
                if let Some(v) = update.notes {
                    m.notes = Some(v);
                }
                m.updated_at = Utc::now();
                Ok(m.clone())
            })
            .await
    }

    /// Soft-retire a move. Moves are never hard-deleted.
    #[instrument(skip(self))]
    pub async fn retire_move(&self, id: Uuid) -> Result<DonorMove> {
        self.store
            .with_move_mut(id, |m| {
                if m.is_active {
                    m.is_active = false;
                    m.updated_at = Utc::now();
                }
                Ok(m.clone())
            })
            .await
    }

    /// Move a donor to `target`. A self-transition is a pure no-op: nothing
    /// changes, not even `stage_entered_at` or `updated_at`.
    #[instrument(skip(self), fields(target = target.as_str()))]
    pub async fn advance_stage(&self, id: Uuid, target: PipelineStage) -> Result<DonorMove> {
        let guard = self.stage_guard.as_ref();
        self.store
            .with_move_mut(id, |m| {
                if m.current_stage == target {
                    return Ok(m.clone());
                }
                if let Some(guard) = guard {
                    guard(m.current_stage, target).map_err(Error::Validation)?;
                }
                let now = Utc::now();
                m.previous_stage = Some(m.current_stage);
                m.current_stage = target;
                m.stage_entered_at = now;
                m.updated_at = now;
                Ok(m.clone())
            })
            .await
    }

    /// Group active moves into the six stage buckets, optionally filtered
    /// by donor type and giving capacity (exact match, AND-combined).
    pub async fn list_by_stage(&self, filter: &MoveFilter) -> StageBoard {
        let moves = self.store.list_moves().await;
        let mut columns: Vec<StageColumn> = PipelineStage::ALL
            .iter()
            .map(|&stage| StageColumn {
                stage,
                moves: Vec::new(),
            })
            .collect();

        for m in moves {
            if !m.is_active || !filter.matches(&m) {
                continue;
            }
            let idx = PipelineStage::ALL
                .iter()
                .position(|&s| s == m.current_stage)
                .unwrap_or(0);
            columns[idx].moves.push(m);
        }

        StageBoard { columns }
    }

    /// Count and value rollup over all active moves.
    pub async fn metrics(&self) -> PipelineMetrics {
        let moves = self.store.list_moves().await;
        let mut stages: Vec<StageMetrics> = PipelineStage::ALL
            .iter()
            .map(|&stage| StageMetrics {
                stage,
                count: 0,
                value: 0.0,
            })
            .collect();

        let mut total_active = 0;
        let mut total_value = 0.0;
        for m in moves.iter().filter(|m| m.is_active) {
            total_active += 1;
            let value = m.target_gift_amount.unwrap_or(0.0);
            total_value += value;
            let idx = PipelineStage::ALL
                .iter()
                .position(|&s| s == m.current_stage)
                .unwrap_or(0);
            stages[idx].count += 1;
            stages[idx].value += value;
        }

        PipelineMetrics {
            total_active,
            total_value,
            stages,
        }
    }
}

fn validate_affinity(score: u8) -> Result<()> {
    if score > 100 {
        return Err(Error::validation(format!(
            "affinity score must be 0-100, got {}",
            score
        )));
    }
    Ok(())
}
