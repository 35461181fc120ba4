//! Watch mode (§4.6): a thin loop that reruns the execution manager every time an external
//! collaborator reports a change, cancelling an in-flight run if another change arrives first.

use crate::manager::{AggregateStatus, ExecutionManager, ExecutionResult};
use crossbeam::channel::{bounded, select};
use forge_core::error::EngineError;
use forge_core::logging::LogSink;
use forge_core::operation::OperationGraph;
use forge_core::runner::CancellationToken;
use std::sync::Arc;

/// The file-watcher collaborator (§6, out of scope to implement): anything that can block
/// until it observes a relevant change.
pub trait ChangeSignal: Send + Sync {
    fn wait_for_change(&self);
}

/// Drives [`ExecutionManager::execute`] in a cancellable loop, re-planning on every change.
pub struct WatchLoop<P> {
    planner: P,
    watcher: Arc<dyn ChangeSignal>,
    workers: usize,
    log_sink: Arc<dyn LogSink>,
}

impl<P> WatchLoop<P>
where
    P: Fn() -> OperationGraph,
{
    pub fn new(
        planner: P,
        watcher: Arc<dyn ChangeSignal>,
        workers: usize,
        log_sink: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            planner,
            watcher,
            workers,
            log_sink,
        }
    }

    /// Runs until `stop` is set. Returns once a stop is observed between iterations; an
    /// in-flight run is never aborted by `stop` directly (only a change signal can do that),
    /// matching §4.6's cooperative cancellation story.
    pub fn run_until(&self, stop: &CancellationToken) {
        self.watcher.wait_for_change();
        while !stop.is_cancelled() {
            self.run_one_racing_the_next_change();
        }
    }

    fn run_one_racing_the_next_change(&self) {
        let cancellation = CancellationToken::new();
        let graph = (self.planner)();
        let manager = ExecutionManager::new(
            graph,
            self.workers,
            cancellation.clone(),
            Arc::clone(&self.log_sink),
        );

        let (exec_tx, exec_rx) = bounded::<Result<ExecutionResult, EngineError>>(1);
        let (change_tx, change_rx) = bounded::<()>(1);
        let watcher = Arc::clone(&self.watcher);

        std::thread::scope(|scope| {
            scope.spawn(|| {
                let result = manager.execute();
                let _ = exec_tx.send(result);
            });
            scope.spawn(|| {
                watcher.wait_for_change();
                let _ = change_tx.send(());
            });

            select! {
                recv(exec_rx) -> result => {
                    if let Ok(result) = result {
                        self.log_outcome(result);
                    }
                    let _ = change_rx.recv();
                }
                recv(change_rx) -> _ => {
                    self.log_sink.write_info("change detected; cancelling the in-flight run");
                    cancellation.cancel();
                    let _ = exec_rx.recv();
                }
            }
        });
    }

    fn log_outcome(&self, result: Result<ExecutionResult, EngineError>) {
        match result {
            Ok(ExecutionResult { status, .. }) => match status {
                AggregateStatus::Success => self.log_sink.write_info("watch run succeeded"),
                AggregateStatus::SuccessWithWarning => {
                    self.log_sink.write_warning("watch run succeeded with warnings")
                }
                AggregateStatus::Cancelled => self.log_sink.write_info("watch run cancelled"),
                AggregateStatus::Failure => self.log_sink.write_error("watch run failed"),
            },
            Err(err) => self.log_sink.write_error(&err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_core::identifier::OperationId;
    use forge_core::logging::RecordingLogSink;
    use forge_core::operation::Operation;
    use forge_core::runner::{Runner, RunnerContext, TerminalStatus};
    use std::error::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Immediate;
    impl Runner for Immediate {
        fn name(&self) -> &str {
            "immediate"
        }
        fn execute(
            &mut self,
            _context: &mut RunnerContext<'_>,
        ) -> Result<TerminalStatus, Box<dyn Error + Send + Sync>> {
            Ok(TerminalStatus::Success)
        }
    }

    /// Fires on the first wait, then never again — drives exactly one watch iteration.
    struct FireOnce(AtomicUsize);
    impl ChangeSignal for FireOnce {
        fn wait_for_change(&self) {
            let count = self.0.fetch_add(1, Ordering::SeqCst);
            if count > 0 {
                // Park indefinitely; the test stops the loop from the outside via `stop`.
                loop {
                    std::thread::sleep(std::time::Duration::from_secs(3600));
                }
            }
        }
    }

    #[test]
    fn single_change_drives_exactly_one_run() {
        let run_count = Arc::new(AtomicUsize::new(0));
        let run_count_clone = Arc::clone(&run_count);
        let planner = move || {
            run_count_clone.fetch_add(1, Ordering::SeqCst);
            let mut builder = OperationGraph::builder();
            builder.add_operation(Operation::new(OperationId::from("a"), Box::new(Immediate)));
            builder.build()
        };

        let watcher = Arc::new(FireOnce(AtomicUsize::new(0)));
        let loop_ = WatchLoop::new(planner, watcher, 1, Arc::new(RecordingLogSink::new()));

        let stop = CancellationToken::new();
        loop_.run_one_racing_the_next_change();
        stop.cancel();
        assert_eq!(run_count.load(Ordering::SeqCst), 1);
    }
}
