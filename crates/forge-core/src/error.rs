//! Payload errors and the structural error kinds raised before any operation runs.

use crate::identifier::OperationId;
use std::backtrace::Backtrace;
use std::error::Error;
use std::fmt::{Display, Formatter};
use thiserror::Error;

/// An error paired with a captured backtrace, taken at the point the error was produced
/// rather than where it's eventually reported.
#[derive(Debug)]
pub struct PayloadError<E> {
    kind: E,
    bt: Backtrace,
}

impl<E> PayloadError<E> {
    /// Create a new payloaded error.
    #[inline]
    pub fn new<E2>(error: E2) -> Self
    where
        E2: Into<E>,
    {
        Self::with_backtrace(error, Backtrace::capture())
    }

    /// Create a new payload error with an explicit backtrace.
    pub fn with_backtrace<E2>(kind: E2, bt: Backtrace) -> Self
    where
        E2: Into<E>,
    {
        Self {
            kind: kind.into(),
            bt,
        }
    }

    /// Gets the error kind.
    pub fn kind(&self) -> &E {
        &self.kind
    }

    /// Gets the captured backtrace.
    pub fn backtrace(&self) -> &Backtrace {
        &self.bt
    }

    /// Converts the error kind, preserving the backtrace.
    pub fn into_kind<T>(self) -> PayloadError<T>
    where
        E: Into<T>,
    {
        PayloadError {
            kind: self.kind.into(),
            bt: self.bt,
        }
    }

    /// Unwraps the payloaded error into its kind.
    pub fn into_inner(self) -> E {
        self.kind
    }
}

impl<E> From<E> for PayloadError<E> {
    fn from(e: E) -> Self {
        Self::new(e)
    }
}

impl<E: Display> Display for PayloadError<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl<E: Error> Error for PayloadError<E> {}

impl<E> AsRef<E> for PayloadError<E> {
    fn as_ref(&self) -> &E {
        &self.kind
    }
}

/// A result with a payloaded error.
pub type Result<T, E> = std::result::Result<T, PayloadError<E>>;

/// Errors that abort a run before any worker lane starts, i.e. while the graph itself is
/// being validated. Per-operation failures are not represented here; they live on the
/// [`ExecutionRecord`](crate::record::ExecutionRecord) of the offending operation instead.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The dependency graph contains a cycle. `cycle` is the shortest cycle found, rendered
    /// as the chain of names that leads back to the first repeated operation.
    #[error("cycle detected: {}", render_cycle(cycle))]
    CycleDetected { cycle: Vec<OperationId> },

    /// An edge referenced an operation that was never registered with the manager.
    #[error("operation {0} is referenced by an edge but was never added to the run")]
    DanglingEdge(OperationId),

    /// Parallelism width was invalid (zero workers requested).
    #[error("parallelism width must be at least 1")]
    InvalidParallelism,
}

fn render_cycle(cycle: &[OperationId]) -> String {
    let mut rendered = cycle
        .iter()
        .map(|id| id.name().to_string())
        .collect::<Vec<_>>()
        .join(" -> ");
    if let Some(first) = cycle.first() {
        rendered.push_str(" -> ");
        rendered.push_str(first.name());
    }
    rendered
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_message_points_back_at_start() {
        let a = OperationId::new("a").unwrap();
        let b = OperationId::new("b").unwrap();
        let c = OperationId::new("c").unwrap();
        let err = EngineError::CycleDetected {
            cycle: vec![a, b, c],
        };
        assert_eq!(err.to_string(), "cycle detected: a -> b -> c -> a");
    }

    #[test]
    fn payload_error_carries_backtrace() {
        let err: PayloadError<EngineError> = PayloadError::new(EngineError::InvalidParallelism);
        let _ = err.backtrace();
        assert!(matches!(err.kind(), EngineError::InvalidParallelism));
    }
}
