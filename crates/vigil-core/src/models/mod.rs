pub mod anomaly;
pub mod execution;
pub mod workflow;

pub use anomaly::*;
pub use execution::*;
pub use workflow::*;
