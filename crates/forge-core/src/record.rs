//! Per-run, per-operation state: where an operation currently sits in its lifecycle, how
//! long it took, what it printed, and (once analyzed) how long the longest remaining chain
//! through it is.

use crate::runner::TerminalStatus;
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::time::{Duration, Instant};

/// Where an operation sits in its lifecycle during one run (§3, §4.4).
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Status {
    /// Every dependency has terminated in a way that satisfies it; eligible for dispatch.
    Ready,
    /// Currently running on a worker lane.
    Executing,
    Success,
    SuccessWithWarning,
    FromCache,
    Skipped,
    NoOp,
    /// A dependency terminated in a way that does not satisfy it (`Failure` or `Cancelled`);
    /// this operation will never run.
    Blocked,
    Cancelled,
    Failure,
}

impl Status {
    /// Statuses from which an operation cannot transition further.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Status::Ready | Status::Executing)
    }

    /// Whether this status satisfies a downstream consumer's dependency on this operation.
    pub fn satisfies_dependency(self) -> bool {
        matches!(
            self,
            Status::Success
                | Status::SuccessWithWarning
                | Status::FromCache
                | Status::Skipped
                | Status::NoOp
        )
    }

    pub fn from_terminal(terminal: TerminalStatus) -> Self {
        match terminal {
            TerminalStatus::Success => Status::Success,
            TerminalStatus::SuccessWithWarning => Status::SuccessWithWarning,
            TerminalStatus::FromCache => Status::FromCache,
            TerminalStatus::Skipped => Status::Skipped,
            TerminalStatus::NoOp => Status::NoOp,
            TerminalStatus::Failure => Status::Failure,
            TerminalStatus::Cancelled => Status::Cancelled,
        }
    }
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Ready => "ready",
            Status::Executing => "executing",
            Status::Success => "success",
            Status::SuccessWithWarning => "success (warnings)",
            Status::FromCache => "from cache",
            Status::Skipped => "skipped",
            Status::NoOp => "no-op",
            Status::Blocked => "blocked",
            Status::Cancelled => "cancelled",
            Status::Failure => "failure",
        };
        write!(f, "{s}")
    }
}

/// Captured stdout/stderr for one execution attempt. Kept separate from [`Status`] so a
/// runner can stream output while still `Executing`.
#[derive(Debug, Clone, Default)]
pub struct CapturedOutput {
    stdout: String,
    stderr: String,
}

impl CapturedOutput {
    pub fn push_stdout(&mut self, chunk: &str) {
        self.stdout.push_str(chunk);
    }

    pub fn push_stderr(&mut self, chunk: &str) {
        self.stderr.push_str(chunk);
    }

    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    pub fn is_empty(&self) -> bool {
        self.stdout.is_empty() && self.stderr.is_empty()
    }
}

impl crate::runner::OutputSink for CapturedOutput {
    fn write_stdout(&mut self, chunk: &str) {
        self.push_stdout(chunk);
    }

    fn write_stderr(&mut self, chunk: &str) {
        self.push_stderr(chunk);
    }
}

/// Measures wall-clock time from `start` to `stop`. A fresh stopwatch has not yet been
/// started; `elapsed()` before `start()` is zero.
#[derive(Debug, Clone, Default)]
pub struct Stopwatch {
    started: Option<Instant>,
    elapsed: Duration,
}

impl Stopwatch {
    pub fn start(&mut self) {
        self.started = Some(Instant::now());
    }

    pub fn stop(&mut self) {
        if let Some(started) = self.started.take() {
            self.elapsed += started.elapsed();
        }
    }

    pub fn elapsed(&self) -> Duration {
        match self.started {
            Some(started) => self.elapsed + started.elapsed(),
            None => self.elapsed,
        }
    }
}

/// One operation's state for the duration of a single run.
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    status: Status,
    error: Option<RecordError>,
    critical_path_length: Option<f64>,
    stopwatch: Stopwatch,
    output: CapturedOutput,
}

impl ExecutionRecord {
    pub fn new() -> Self {
        Self {
            status: Status::Ready,
            error: None,
            critical_path_length: None,
            stopwatch: Stopwatch::default(),
            output: CapturedOutput::default(),
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn set_status(&mut self, status: Status) {
        self.status = status;
    }

    pub fn error(&self) -> Option<&RecordError> {
        self.error.as_ref()
    }

    pub fn set_error(&mut self, error: RecordError) {
        self.error = Some(error);
    }

    pub fn critical_path_length(&self) -> Option<f64> {
        self.critical_path_length
    }

    pub fn set_critical_path_length(&mut self, cpl: f64) {
        self.critical_path_length = Some(cpl);
    }

    pub fn stopwatch(&self) -> &Stopwatch {
        &self.stopwatch
    }

    pub fn stopwatch_mut(&mut self) -> &mut Stopwatch {
        &mut self.stopwatch
    }

    pub fn output(&self) -> &CapturedOutput {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut CapturedOutput {
        &mut self.output
    }
}

impl Default for ExecutionRecord {
    fn default() -> Self {
        Self::new()
    }
}

/// A runner's error, stripped to a displayable message. The `already_reported` flag mirrors
/// [`crate::runner::AlreadyReported`] so the summary renderer knows whether to print it again.
#[derive(Debug, Clone)]
pub struct RecordError {
    message: String,
    already_reported: bool,
}

impl RecordError {
    pub fn from_runner_error(err: &(dyn Error + Send + Sync)) -> Self {
        Self {
            already_reported: crate::runner::is_already_reported(err),
            message: err.to_string(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn already_reported(&self) -> bool {
        self.already_reported
    }
}

impl Display for RecordError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_record_starts_ready_with_no_critical_path() {
        let record = ExecutionRecord::new();
        assert_eq!(record.status(), Status::Ready);
        assert!(record.critical_path_length().is_none());
        assert!(!record.status().is_terminal());
    }

    #[test]
    fn blocked_and_cancelled_do_not_satisfy_dependencies() {
        assert!(!Status::Blocked.satisfies_dependency());
        assert!(!Status::Cancelled.satisfies_dependency());
        assert!(!Status::Failure.satisfies_dependency());
        assert!(Status::SuccessWithWarning.satisfies_dependency());
        assert!(Status::NoOp.satisfies_dependency());
    }

    #[test]
    fn stopwatch_accumulates_across_start_stop_cycles() {
        let mut sw = Stopwatch::default();
        sw.start();
        std::thread::sleep(Duration::from_millis(5));
        sw.stop();
        let first = sw.elapsed();
        assert!(first >= Duration::from_millis(5));
        sw.start();
        std::thread::sleep(Duration::from_millis(5));
        sw.stop();
        assert!(sw.elapsed() > first);
    }
}
