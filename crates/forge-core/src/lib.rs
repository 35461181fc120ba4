//! # `forge-core`
//!
//! Shared data model for the forge operation execution engine: stable operation identities,
//! the static dependency graph a planner hands in, per-run execution records, the runner
//! contract external collaborators implement, and the ambient logging/error stack the rest
//! of the engine builds on.

#![deny(rustdoc::broken_intra_doc_links)]

#[macro_use]
extern crate static_assertions;

#[macro_use]
extern crate log;

pub mod error;
pub mod identifier;
pub mod logging;
pub mod operation;
pub mod record;
pub mod runner;

pub mod prelude {
    //! Commonly used types re-exported for convenience.

    pub use crate::error::{EngineError, EngineResult, PayloadError};
    pub use crate::identifier::OperationId;
    pub use crate::logging::{LogSink, LoggingArgs, RecordingLogSink, StdLogSink};
    pub use crate::operation::{Operation, OperationGraph, OperationGraphBuilder};
    pub use crate::record::{ExecutionRecord, Status};
    pub use crate::runner::{
        AlreadyReported, CancellationToken, RequestRerun, Runner, RunnerContext, TerminalStatus,
    };
}
