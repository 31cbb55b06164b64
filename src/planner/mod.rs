//! Planning module for deployment operations.
//!
//! Compares the declared configuration with the state file, turns the
//! differences into an ordered plan and executes it through the
//! reconciliation engine.

mod diff;
mod executor;
mod plan;

pub use diff::{DiffEngine, DiffResult, DiffType, ResourceDiff};
pub use executor::{ActionResult, ExecutionResult, PlanExecutor};
pub use plan::{ActionType, DeploymentPlan, PlannedAction};
