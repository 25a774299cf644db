//! Workflow engine: the pure decision policy and the step executor.

pub mod decision;
pub mod executor;

pub use decision::{decide, AutonomySettings, Decision, DecisionOutcome};
pub use executor::WorkflowExecutor;
