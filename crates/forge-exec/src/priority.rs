//! The dispatch-order comparator used by the [`ReadyQueue`](crate::ready_queue::ReadyQueue):
//! `comparator(x, y) == Less` means "x must not start later than y" (§4.5, property 3). The
//! default orders by `criticalPathLength` descending, then `consumers.size` descending.

use forge_core::identifier::OperationId;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

pub type Comparator = Arc<dyn Fn(&OperationId, &OperationId) -> Ordering + Send + Sync>;

pub fn default_comparator(
    critical_path_length: HashMap<OperationId, f64>,
    consumer_counts: HashMap<OperationId, usize>,
) -> Comparator {
    Arc::new(move |a, b| {
        let cpl_a = critical_path_length.get(a).copied().unwrap_or(0.0);
        let cpl_b = critical_path_length.get(b).copied().unwrap_or(0.0);
        cpl_b
            .total_cmp(&cpl_a)
            .then_with(|| {
                let ca = consumer_counts.get(a).copied().unwrap_or(0);
                let cb = consumer_counts.get(b).copied().unwrap_or(0);
                cb.cmp(&ca)
            })
    })
}
