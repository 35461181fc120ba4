//! The external collaborator contract (§6): whatever actually performs the work of one
//! operation implements [`Runner`]. The engine only ever calls through this trait; shell
//! commands, plugin dispatch, and anything else that does real work live outside this crate.

use crate::identifier::OperationId;
use static_assertions::assert_obj_safe;
use std::error::Error;
use std::fmt::{self, Debug, Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The outcome a runner reports for one execution attempt.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TerminalStatus {
    Success,
    SuccessWithWarning,
    FromCache,
    Skipped,
    NoOp,
    Failure,
    Cancelled,
}

impl TerminalStatus {
    /// Whether this outcome represents forward progress a downstream consumer can build on.
    pub fn satisfies_dependency(self) -> bool {
        !matches!(self, TerminalStatus::Failure | TerminalStatus::Cancelled)
    }
}

impl Display for TerminalStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            TerminalStatus::Success => "success",
            TerminalStatus::SuccessWithWarning => "success (warnings)",
            TerminalStatus::FromCache => "from cache",
            TerminalStatus::Skipped => "skipped",
            TerminalStatus::NoOp => "no-op",
            TerminalStatus::Failure => "failure",
            TerminalStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// A marker a runner can attach to its error to say "I already printed a meaningful error;
/// don't repeat it in the summary." The engine still transitions the operation to `Failure`.
#[derive(Debug)]
pub struct AlreadyReported;

impl Display for AlreadyReported {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "(error already reported)")
    }
}

impl Error for AlreadyReported {}

/// Checks whether a boxed runner error is an [`AlreadyReported`] marker.
pub fn is_already_reported(err: &(dyn Error + Send + Sync)) -> bool {
    err.downcast_ref::<AlreadyReported>().is_some()
}

/// A single broadcast flag shared by every worker lane and the ready queue. Setting it is
/// cooperative: runners are expected to observe it and wind down promptly, but the manager
/// will in any case reclassify non-terminal operations as `Cancelled` once all lanes exit.
#[derive(Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

impl Debug for CancellationToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Forwarded unchanged to the runner; meaningful only in watch mode, where invoking it tells
/// the watch loop to schedule another pass once the current one settles. The engine itself
/// never calls it.
#[derive(Clone)]
pub struct RequestRerun {
    callback: Arc<dyn Fn() + Send + Sync>,
}

impl RequestRerun {
    pub fn new(callback: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            callback: Arc::new(callback),
        }
    }

    /// A callback that does nothing, for runs outside watch mode.
    pub fn noop() -> Self {
        Self::new(|| {})
    }

    pub fn request(&self) {
        (self.callback)()
    }
}

impl Debug for RequestRerun {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestRerun").finish()
    }
}

/// Everything a runner needs to execute cooperatively: the shared cancellation token, a
/// place to write captured output, and the watch-mode rerun callback.
pub struct RunnerContext<'a> {
    pub id: &'a OperationId,
    pub cancellation: CancellationToken,
    pub request_rerun: RequestRerun,
    sink: &'a mut dyn OutputSink,
}

impl<'a> RunnerContext<'a> {
    pub fn new(
        id: &'a OperationId,
        cancellation: CancellationToken,
        request_rerun: RequestRerun,
        sink: &'a mut dyn OutputSink,
    ) -> Self {
        Self {
            id,
            cancellation,
            request_rerun,
            sink,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn write_stdout(&mut self, chunk: &str) {
        self.sink.write_stdout(chunk);
    }

    pub fn write_stderr(&mut self, chunk: &str) {
        self.sink.write_stderr(chunk);
    }
}

/// Where a runner's captured stdout/stderr lands during execution; backed by
/// [`crate::record::CapturedOutput`] in practice.
pub trait OutputSink {
    fn write_stdout(&mut self, chunk: &str);
    fn write_stderr(&mut self, chunk: &str);
}

/// The capability that actually performs the work of one operation (§6).
pub trait Runner: Send + Sync {
    /// Stable, human-readable label used in banners.
    fn name(&self) -> &str;

    /// If true, suppress this operation's per-op status line in the summary (still counted
    /// in the aggregate).
    fn silent(&self) -> bool {
        false
    }

    /// If true, a `SuccessWithWarning` outcome from this runner does not degrade the
    /// aggregate run status.
    fn warnings_are_allowed(&self) -> bool {
        false
    }

    /// Perform the work. Implementations should observe `context.is_cancelled()` promptly
    /// when feasible and return `Ok(TerminalStatus::Cancelled)` rather than running to
    /// completion.
    fn execute(
        &mut self,
        context: &mut RunnerContext<'_>,
    ) -> Result<TerminalStatus, Box<dyn Error + Send + Sync>>;
}

assert_obj_safe!(Runner);

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysSucceeds;
    impl Runner for AlwaysSucceeds {
        fn name(&self) -> &str {
            "always-succeeds"
        }

        fn execute(
            &mut self,
            _context: &mut RunnerContext<'_>,
        ) -> Result<TerminalStatus, Box<dyn Error + Send + Sync>> {
            Ok(TerminalStatus::Success)
        }
    }

    #[test]
    fn cancellation_token_is_shared_across_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn already_reported_is_detected_through_the_error_trait_object() {
        let boxed: Box<dyn Error + Send + Sync> = Box::new(AlreadyReported);
        assert!(is_already_reported(boxed.as_ref()));
        let other: Box<dyn Error + Send + Sync> = Box::new(AlreadyReported);
        assert!(is_already_reported(&*other));
    }

    #[test]
    fn object_safety_holds_for_a_trivial_runner() {
        let mut runner: Box<dyn Runner> = Box::new(AlwaysSucceeds);
        assert_eq!(runner.name(), "always-succeeds");
    }
}
