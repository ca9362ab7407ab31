//! Domain engines: pipeline state machine, cultivation planner,
//! touchpoint ledger, and the automation rule engine with its executor.

pub mod automation;
pub mod executor;
pub mod pipeline;
pub mod planner;
pub mod touchpoints;

pub use automation::{
    default_conditions_match, Automation, ConditionMatcher, ExecutionStats,
};
pub use executor::{
    ActionDispatcher, ActionRequest, Executor, ExecutorSettings, LogDispatcher,
};
pub use pipeline::{Pipeline, PipelineMetrics, StageBoard, StageColumn, StageGuard, StageMetrics};
pub use planner::{Planner, PlanStatusGuard};
pub use touchpoints::{stats, timeline, DayGroup, Ledger, TouchpointStats};
