//! # `forge-exec`
//!
//! Parallel, priority-ordered execution of an [`OperationGraph`](forge_core::operation::OperationGraph):
//! critical-path analysis, the demand-driven ready queue, the worker-pool manager, and the
//! watch-mode loop built on top of it.

pub mod analyzer;
pub mod manager;
pub mod priority;
pub mod ready_queue;
pub mod summary;
pub mod watch;

pub use analyzer::CriticalPathAnalyzer;
pub use manager::{AggregateStatus, ExecutionManager, ExecutionResult, ALL_AVAILABLE};
pub use priority::Comparator;
pub use ready_queue::ReadyQueue;
pub use watch::{ChangeSignal, WatchLoop};
