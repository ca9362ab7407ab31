//! Data structures for the donor pipeline and stewardship automation.

pub mod automation;
pub mod moves;
pub mod plan;
pub mod touchpoint;

pub use automation::{
    ActionType, AutomationExecution, AutomationRule, EmailTemplate, ExecutionStatus, NewRule,
    RenderedEmail, RuleUpdate, TriggerType,
};
pub use moves::{DonorMove, MoveFilter, MoveUpdate, NewDonorMove, PipelineStage, Priority};
pub use plan::{
    CultivationPlan, CultivationTask, GoalType, NewPlan, NewTask, PlanStatus, PlanUpdate,
    TaskStatus, TaskUpdate,
};
pub use touchpoint::{
    Direction, EngagementLevel, NewTouchpoint, Sentiment, Touchpoint, TouchpointFilter,
    TouchpointType,
};
