pub mod anomaly_store;
pub mod execution_store;
pub mod workflow_store;

pub use anomaly_store::{AnomalyFilter, AnomalyStore};
pub use execution_store::{ExecutionFilter, ExecutionStore};
pub use workflow_store::WorkflowStore;
