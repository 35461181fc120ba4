//! The worker-pool driver (§4.5): validates parallelism, runs the analyzer, spins up `W`
//! worker lanes over the [`ReadyQueue`], and assembles the final [`ExecutionResult`].

use crate::analyzer::CriticalPathAnalyzer;
use crate::priority::Comparator;
use crate::ready_queue::ReadyQueue;
use crate::summary::render_summary;
use forge_core::error::EngineError;
use forge_core::identifier::OperationId;
use forge_core::logging::LogSink;
use forge_core::operation::OperationGraph;
use forge_core::record::{CapturedOutput, ExecutionRecord, RecordError, Status};
use forge_core::runner::{CancellationToken, RequestRerun, RunnerContext, TerminalStatus};
use std::collections::HashMap;
use std::sync::Arc;

/// A sentinel meaning "use every available lane" where a literal width would otherwise be
/// required (§4.5's parallelism width `W`). `0` is deliberately not this sentinel: it's a
/// literal request for zero workers, which [`ExecutionManager::execute`] rejects with
/// [`EngineError::InvalidParallelism`].
pub const ALL_AVAILABLE: usize = usize::MAX;

/// The aggregate outcome of one run (§4.5's aggregate status rule).
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum AggregateStatus {
    Success,
    SuccessWithWarning,
    Cancelled,
    Failure,
}

/// Returned to the caller once every worker lane has exited.
pub struct ExecutionResult {
    pub status: AggregateStatus,
    pub per_operation: Vec<(OperationId, ExecutionRecord)>,
}

/// Orchestrates one run of the operation graph.
pub struct ExecutionManager {
    graph: Arc<OperationGraph>,
    workers: usize,
    cancellation: CancellationToken,
    log_sink: Arc<dyn LogSink>,
    comparator: Option<Comparator>,
    request_rerun: RequestRerun,
}

impl ExecutionManager {
    /// `workers == ALL_AVAILABLE` resolves to the host's CPU count (all platforms; the
    /// Windows `max(CPU-1, 1)` distinction from §4.5 applies only to embedders that care to
    /// special-case it when choosing a literal width).
    pub fn new(
        graph: OperationGraph,
        workers: usize,
        cancellation: CancellationToken,
        log_sink: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            graph: Arc::new(graph),
            workers,
            cancellation,
            log_sink,
            comparator: None,
            request_rerun: RequestRerun::noop(),
        }
    }

    #[must_use]
    pub fn with_comparator(mut self, comparator: Comparator) -> Self {
        self.comparator = Some(comparator);
        self
    }

    #[must_use]
    pub fn with_request_rerun(mut self, request_rerun: RequestRerun) -> Self {
        self.request_rerun = request_rerun;
        self
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Runs the graph to completion (or until cancellation) and returns the aggregate result.
    pub fn execute(&self) -> Result<ExecutionResult, EngineError> {
        if self.workers == 0 {
            return Err(EngineError::InvalidParallelism);
        }
        let resolved_workers = if self.workers == ALL_AVAILABLE {
            num_cpus::get().max(1)
        } else {
            self.workers
        };

        let mut names: Vec<&str> = self.graph.ids().map(|id| id.name()).collect();
        names.sort_unstable();
        self.log_sink
            .write_info(&format!("selected operations: {}", names.join(", ")));

        let critical_path_length = CriticalPathAnalyzer::analyze(&self.graph)?;

        let queue = Arc::new(ReadyQueue::new(
            Arc::clone(&self.graph),
            &critical_path_length,
            self.cancellation.clone(),
            self.comparator.clone(),
        ));

        let lane_count = resolved_workers.min(self.graph.len()).max(if self.graph.is_empty() {
            0
        } else {
            1
        });

        std::thread::scope(|scope| {
            for lane in 0..lane_count {
                let queue = Arc::clone(&queue);
                let graph = Arc::clone(&self.graph);
                let log_sink = Arc::clone(&self.log_sink);
                let cancellation = self.cancellation.clone();
                let request_rerun = self.request_rerun.clone();
                scope.spawn(move || {
                    run_lane(lane, &queue, &graph, &log_sink, &cancellation, &request_rerun);
                });
            }
        });

        let mut records = Arc::try_unwrap(queue)
            .unwrap_or_else(|_| panic!("all worker lanes joined; queue must be uniquely owned"))
            .into_records();

        // Backstop per §5: once every lane has exited, any operation the dispatch loop never
        // got around to reclassifying (still `Ready`) or that a runner left mid-flight without
        // honoring the token (still `Executing`) is swept into `Cancelled` here.
        if self.cancellation.is_cancelled() {
            for record in records.values_mut() {
                if !record.status().is_terminal() {
                    record.set_status(Status::Cancelled);
                }
            }
        }

        let status = aggregate_status(&self.graph, &records, self.cancellation.is_cancelled());
        self.log_sink.write_info(&render_summary(&self.graph, &records));

        // §3's deterministic iteration order: topological first, then by name as a tiebreak
        // among operations a topological sort leaves free to reorder (e.g. independent roots).
        let topo_rank: HashMap<&OperationId, usize> = self
            .graph
            .topological_order()
            .into_iter()
            .enumerate()
            .map(|(rank, id)| (id, rank))
            .collect();

        let mut per_operation: Vec<(OperationId, ExecutionRecord)> = records.into_iter().collect();
        per_operation.sort_by(|(a, _), (b, _)| {
            topo_rank[a].cmp(&topo_rank[b]).then_with(|| a.name().cmp(b.name()))
        });

        Ok(ExecutionResult {
            status,
            per_operation,
        })
    }
}

fn run_lane(
    lane: usize,
    queue: &ReadyQueue,
    graph: &OperationGraph,
    log_sink: &Arc<dyn LogSink>,
    cancellation: &CancellationToken,
    request_rerun: &RequestRerun,
) {
    while let Some(id) = queue.next() {
        if cancellation.is_cancelled() {
            queue.report(&id, TerminalStatus::Cancelled, None);
            continue;
        }

        let operation = match graph.operation(&id) {
            Some(op) => op,
            None => continue,
        };

        if !operation.silent() {
            log_sink.write_info(&format!(
                "[lane {lane}] > {} starting",
                operation.name()
            ));
        }

        queue.with_record_mut(&id, |record| record.stopwatch_mut().start());

        let mut output = CapturedOutput::default();
        let (terminal, error) = {
            let mut context =
                RunnerContext::new(&id, cancellation.clone(), request_rerun.clone(), &mut output);
            match operation.execute(&mut context) {
                Ok(status) => (status, None),
                Err(err) => (TerminalStatus::Failure, Some(RecordError::from_runner_error(err.as_ref()))),
            }
        };

        queue.with_record_mut(&id, |record| {
            record.stopwatch_mut().stop();
            *record.output_mut() = output;
        });

        if !operation.silent() {
            log_sink.write_info(&format!("[lane {lane}] > {} {terminal}", operation.name()));
        }

        queue.report(&id, terminal, error);
    }
}

fn aggregate_status(
    graph: &OperationGraph,
    records: &HashMap<OperationId, ExecutionRecord>,
    cancelled: bool,
) -> AggregateStatus {
    if records.values().any(|r| r.status() == Status::Failure) {
        return AggregateStatus::Failure;
    }
    if cancelled {
        return AggregateStatus::Cancelled;
    }
    let has_undisclosed_warning = records.iter().any(|(id, record)| {
        record.status() == Status::SuccessWithWarning
            && graph
                .operation(id)
                .map(|op| !op.warnings_are_allowed())
                .unwrap_or(true)
    });
    if has_undisclosed_warning {
        return AggregateStatus::SuccessWithWarning;
    }
    AggregateStatus::Success
}
