//! The demand-driven, priority-ordered dispatcher (§4.3): N worker lanes pull from this
//! queue; it hands each one the highest-priority operation whose dependencies have all
//! terminated favorably, and closes out every waiter once nothing remains.

use crate::priority::{default_comparator, Comparator};
use crossbeam::channel::{bounded, Sender};
use forge_core::identifier::OperationId;
use forge_core::operation::OperationGraph;
use forge_core::record::{ExecutionRecord, RecordError, Status};
use forge_core::runner::{CancellationToken, TerminalStatus};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// Effect a terminal status has on the operations that depend on it (§4.5).
#[derive(Debug, Eq, PartialEq, Clone, Copy)]
enum Propagation {
    /// The dependency is satisfied; remove it from each consumer's remaining set.
    Satisfy,
    /// Satisfied, but cache writes are forbidden for this operation and every descendant.
    SatisfyNoCacheWrite,
    /// Every `Ready` descendant reachable through consumer edges is blocked.
    BlockDescendants,
    /// Same as failure, but descendants are cancelled rather than blocked.
    CancelDescendants,
}

fn propagation_for(status: Status) -> Propagation {
    match status {
        Status::Success | Status::SuccessWithWarning | Status::FromCache | Status::NoOp => {
            Propagation::Satisfy
        }
        Status::Skipped => Propagation::SatisfyNoCacheWrite,
        Status::Failure => Propagation::BlockDescendants,
        Status::Cancelled => Propagation::CancelDescendants,
        Status::Ready | Status::Executing | Status::Blocked => {
            unreachable!("not a terminal status: {status:?}")
        }
    }
}

struct QueueState {
    pending: Vec<OperationId>,
    records: HashMap<OperationId, ExecutionRecord>,
    remaining_dependencies: HashMap<OperationId, HashSet<OperationId>>,
    cache_write_forbidden: HashSet<OperationId>,
    waiters: VecDeque<Sender<Option<OperationId>>>,
    cancelled: bool,
}

/// Shared by every worker lane and the coordinator; internally a single mutex, matching the
/// "route updates through a single scheduling point" rationale in §4.5.
pub struct ReadyQueue {
    graph: Arc<OperationGraph>,
    comparator: Comparator,
    cancellation: CancellationToken,
    state: Mutex<QueueState>,
}

impl ReadyQueue {
    pub fn new(
        graph: Arc<OperationGraph>,
        critical_path_length: &HashMap<OperationId, f64>,
        cancellation: CancellationToken,
        comparator: Option<Comparator>,
    ) -> Self {
        let mut records = HashMap::new();
        let mut remaining_dependencies = HashMap::new();
        for id in graph.ids() {
            let mut record = ExecutionRecord::new();
            if let Some(&cpl) = critical_path_length.get(id) {
                record.set_critical_path_length(cpl);
            }
            records.insert(id.clone(), record);
            let deps = graph
                .dependencies(id)
                .into_iter()
                .cloned()
                .collect::<HashSet<_>>();
            remaining_dependencies.insert(id.clone(), deps);
        }

        let comparator = comparator.unwrap_or_else(|| {
            let consumer_counts: HashMap<OperationId, usize> = graph
                .ids()
                .map(|id| (id.clone(), graph.consumers(id).len()))
                .collect();
            default_comparator(critical_path_length.clone(), consumer_counts)
        });

        // Every operation starts in `pending`, not just the ones already dependency-free:
        // `try_take_one` skips past entries whose dependencies haven't cleared yet rather than
        // removing them, so an operation that starts blocked must still be sitting in the list
        // for the scan to find once its dependencies are satisfied (§4.3's scan discipline).
        let mut pending: Vec<OperationId> = graph.ids().cloned().collect();
        sort_pending(&mut pending, &comparator);

        Self {
            graph,
            comparator,
            cancellation,
            state: Mutex::new(QueueState {
                pending,
                records,
                remaining_dependencies,
                cache_write_forbidden: HashSet::new(),
                waiters: VecDeque::new(),
                cancelled: false,
            }),
        }
    }

    /// Reserves the next operation for the calling lane. Blocks until one becomes eligible or
    /// the stream closes (`None`).
    pub fn next(&self) -> Option<OperationId> {
        let rx = {
            let mut state = self.state.lock();
            if let Some(id) = self.try_take_one(&mut state) {
                return Some(id);
            }
            if state.pending.is_empty() || state.cancelled {
                return None;
            }
            let (tx, rx) = bounded(1);
            state.waiters.push_back(tx);
            rx
        };
        rx.recv().unwrap_or(None)
    }

    fn try_take_one(&self, state: &mut QueueState) -> Option<OperationId> {
        if state.cancelled {
            return None;
        }
        // The shared token may have been set by something outside this queue (the manager's
        // own cancellation token, or a watch-loop racing a file change against this run). Any
        // dispatch attempt that observes it must act before handing out another operation,
        // otherwise an op could be marked `Executing` after cancellation already fired.
        if self.cancellation.is_cancelled() {
            self.cancel_locked(state);
            return None;
        }
        for idx in (0..state.pending.len()).rev() {
            let id = &state.pending[idx];
            if state.records[id].status() != Status::Ready {
                state.pending.remove(idx);
                continue;
            }
            if !state.remaining_dependencies[id].is_empty() {
                continue;
            }
            let id = state.pending.remove(idx);
            state.records.get_mut(&id).unwrap().set_status(Status::Executing);
            return Some(id);
        }
        None
    }

    /// Reports that `id` finished with `terminal`, applies the post-execution graph update
    /// (§4.5), and wakes the queue to re-evaluate eligibility.
    pub fn report(&self, id: &OperationId, terminal: TerminalStatus, error: Option<RecordError>) {
        {
            let mut state = self.state.lock();
            let status = Status::from_terminal(terminal);
            if let Some(record) = state.records.get_mut(id) {
                record.set_status(status);
                if let Some(error) = error {
                    record.set_error(error);
                }
            }
            self.propagate(&mut state, id, status);
        }
        self.recheck();
    }

    fn propagate(&self, state: &mut QueueState, id: &OperationId, status: Status) {
        match propagation_for(status) {
            Propagation::Satisfy => {
                for consumer in self.graph.consumers(id) {
                    if let Some(deps) = state.remaining_dependencies.get_mut(consumer) {
                        deps.remove(id);
                    }
                }
            }
            Propagation::SatisfyNoCacheWrite => {
                for consumer in self.graph.consumers(id) {
                    if let Some(deps) = state.remaining_dependencies.get_mut(consumer) {
                        deps.remove(id);
                    }
                }
                self.forbid_cache_writes_transitively(state, id);
            }
            Propagation::BlockDescendants => {
                self.terminate_descendants(state, id, Status::Blocked);
            }
            Propagation::CancelDescendants => {
                self.terminate_descendants(state, id, Status::Cancelled);
            }
        }
    }

    fn forbid_cache_writes_transitively(&self, state: &mut QueueState, id: &OperationId) {
        let mut stack = vec![id.clone()];
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            state.cache_write_forbidden.insert(current.clone());
            for consumer in self.graph.consumers(&current) {
                stack.push(consumer.clone());
            }
        }
    }

    fn terminate_descendants(&self, state: &mut QueueState, id: &OperationId, terminal: Status) {
        let mut stack: Vec<OperationId> = self.graph.consumers(id).into_iter().cloned().collect();
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            let still_ready = state
                .records
                .get(&current)
                .map(|r| r.status() == Status::Ready)
                .unwrap_or(false);
            if !still_ready {
                continue;
            }
            state.records.get_mut(&current).unwrap().set_status(terminal);
            state.pending.retain(|pending_id| pending_id != &current);
            for consumer in self.graph.consumers(&current) {
                stack.push(consumer.clone());
            }
        }
    }

    /// Whether cache writes are forbidden for `id` (set transitively after a `Skipped`
    /// upstream operation; see §4.5 and §9's pinned "all transitive descendants" reading).
    pub fn cache_write_forbidden(&self, id: &OperationId) -> bool {
        self.state.lock().cache_write_forbidden.contains(id)
    }

    /// Idempotent kick: re-evaluate eligibility and satisfy any outstanding waiters. Safe to
    /// call even when nothing changed.
    pub fn recheck(&self) {
        let mut state = self.state.lock();
        loop {
            if state.waiters.is_empty() {
                break;
            }
            match self.try_take_one(&mut state) {
                Some(id) => {
                    let waiter = state.waiters.pop_front().unwrap();
                    let _ = waiter.send(Some(id));
                }
                None => break,
            }
        }
        if state.pending.is_empty() || state.cancelled {
            while let Some(waiter) = state.waiters.pop_front() {
                let _ = waiter.send(None);
            }
        }
    }

    /// Stops handing out new work, completes every outstanding reservation with
    /// end-of-stream, and marks every still-`Ready` operation `Cancelled`. Also fires the
    /// shared token, so runners mid-execution observe it through their own `RunnerContext`.
    pub fn cancel(&self) {
        self.cancellation.cancel();
        let mut state = self.state.lock();
        self.cancel_locked(&mut state);
    }

    /// The guts of [`Self::cancel`], usable from call sites that already hold `state` (e.g.
    /// a dispatch attempt that notices the shared token fired since the previous check).
    /// Idempotent: does nothing beyond re-flushing waiters once `state.cancelled` is set.
    fn cancel_locked(&self, state: &mut QueueState) {
        state.cancelled = true;
        let ready_ids: Vec<OperationId> = state
            .records
            .iter()
            .filter(|(_, record)| record.status() == Status::Ready)
            .map(|(id, _)| id.clone())
            .collect();
        for id in ready_ids {
            state.records.get_mut(&id).unwrap().set_status(Status::Cancelled);
        }
        state.pending.clear();
        while let Some(waiter) = state.waiters.pop_front() {
            let _ = waiter.send(None);
        }
    }

    /// Snapshot of every record, for final result assembly once all lanes have exited.
    pub fn into_records(self) -> HashMap<OperationId, ExecutionRecord> {
        self.state.into_inner().records
    }

    pub fn with_record<R>(&self, id: &OperationId, f: impl FnOnce(&ExecutionRecord) -> R) -> Option<R> {
        self.state.lock().records.get(id).map(f)
    }

    pub fn with_record_mut<R>(
        &self,
        id: &OperationId,
        f: impl FnOnce(&mut ExecutionRecord) -> R,
    ) -> Option<R> {
        self.state.lock().records.get_mut(id).map(f)
    }
}

fn sort_pending(pending: &mut [OperationId], comparator: &Comparator) {
    pending.sort_by(|a, b| comparator(a, b).reverse());
}
