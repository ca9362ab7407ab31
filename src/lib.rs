//! donorflow - Donor pipeline and stewardship automation core
//!
//! The domain logic of a nonprofit CRM's moves-management pipeline:
//! - Donor moves through a six-stage cultivation pipeline with
//!   unconstrained stage-to-stage transitions
//! - Cultivation plans with append-only ordered task lists
//! - An append-only touchpoint ledger with rollup statistics
//! - A trigger→delayed-action automation engine whose executions move
//!   through `pending → processing → completed | failed`
//!
//! # Architecture
//!
//! State lives in an in-memory entity store backed by an append-only JSONL
//! change journal; opening a store replays the journal. Every write is
//! atomic per row, and claiming due automation executions is an atomic
//! batch compare-and-set, so concurrent executor workers never double-claim.
//!
//! # Modules
//!
//! - `domain`: Entity types (DonorMove, CultivationPlan, Touchpoint, ...)
//! - `store`: Entity store and change journal
//! - `engine`: Pipeline, Planner, Ledger, Automation, Executor
//! - `cli`: Worker binary commands
//!
//! # Usage
//!
//! ```bash
//! # Run the automation worker
//! donorflow worker
//!
//! # Show the pipeline summary
//! donorflow pipeline
//!
//! # List automation rules
//! donorflow rules list
//! ```

pub mod cli;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod store;

// Re-export main types at crate root for convenience
pub use domain::{
    AutomationExecution, AutomationRule, CultivationPlan, CultivationTask, DonorMove,
    EmailTemplate, ExecutionStatus, NewDonorMove, NewPlan, NewRule, NewTask, NewTouchpoint,
    PipelineStage, PlanStatus, TaskStatus, Touchpoint, TouchpointType, TriggerType,
};
pub use engine::{Automation, Executor, Ledger, LogDispatcher, Pipeline, Planner};
pub use error::{Error, Result};
pub use store::Store;
