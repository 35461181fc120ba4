//! The static operation graph (§3, §4.1): the shape a planner hands to the engine before a
//! run starts. Nodes are [`Operation`]s; an edge `a -> b` means `b` depends on `a`, i.e. `a`
//! is a member of `dependencies(b)` and `b` is a member of `consumers(a)`.

use crate::error::EngineError;
use crate::identifier::OperationId;
use crate::runner::{Runner, RunnerContext, TerminalStatus};
use parking_lot::Mutex;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::HashMap;
use std::error::Error;

/// Default weight assigned to an operation that doesn't specify one.
pub const DEFAULT_WEIGHT: f64 = 1.0;

/// One node of the operation graph: identity, a runner to execute it, a weight used in
/// critical-path analysis, and an optional reporting group.
///
/// The runner sits behind a mutex rather than requiring `&mut Operation`: the graph is shared
/// read-only across worker lanes (§5), and exactly one lane ever touches a given operation's
/// runner at a time, so the lock is uncontended in practice.
pub struct Operation {
    id: OperationId,
    weight: f64,
    group: Option<String>,
    runner: Mutex<Box<dyn Runner>>,
}

impl Operation {
    pub fn new(id: OperationId, runner: Box<dyn Runner>) -> Self {
        Self {
            id,
            weight: DEFAULT_WEIGHT,
            group: None,
            runner: Mutex::new(runner),
        }
    }

    #[must_use]
    pub fn with_weight(mut self, weight: f64) -> Self {
        assert!(weight > 0.0, "operation weight must be a positive number");
        self.weight = weight;
        self
    }

    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn id(&self) -> &OperationId {
        &self.id
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    pub fn name(&self) -> String {
        self.runner.lock().name().to_string()
    }

    pub fn silent(&self) -> bool {
        self.runner.lock().silent()
    }

    pub fn warnings_are_allowed(&self) -> bool {
        self.runner.lock().warnings_are_allowed()
    }

    /// Runs this operation's runner to completion. Blocks the calling worker lane.
    pub fn execute(
        &self,
        context: &mut RunnerContext<'_>,
    ) -> Result<TerminalStatus, Box<dyn Error + Send + Sync>> {
        self.runner.lock().execute(context)
    }
}

impl std::fmt::Debug for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operation")
            .field("id", &self.id)
            .field("weight", &self.weight)
            .field("group", &self.group)
            .finish_non_exhaustive()
    }
}

/// The validated, immutable shape of a run: every operation plus the dependency edges
/// between them. Built once via [`OperationGraphBuilder`]; cycles are not rejected here,
/// since detecting them is the analyzer's job at analysis time (§4.1).
pub struct OperationGraph {
    graph: DiGraph<Operation, ()>,
    index: HashMap<OperationId, NodeIndex>,
}

impl OperationGraph {
    pub fn builder() -> OperationGraphBuilder {
        OperationGraphBuilder::default()
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains(&self, id: &OperationId) -> bool {
        self.index.contains_key(id)
    }

    pub fn operation(&self, id: &OperationId) -> Option<&Operation> {
        self.index.get(id).map(|&idx| &self.graph[idx])
    }

    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.graph.node_weights()
    }

    pub fn ids(&self) -> impl Iterator<Item = &OperationId> {
        self.index.keys()
    }

    /// Operations that must terminate successfully before `id` is eligible to run.
    pub fn dependencies(&self, id: &OperationId) -> Vec<&OperationId> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Operations that depend on `id` and will be unblocked or blocked by its outcome.
    pub fn consumers(&self, id: &OperationId) -> Vec<&OperationId> {
        self.neighbors(id, Direction::Outgoing)
    }

    fn neighbors(&self, id: &OperationId, direction: Direction) -> Vec<&OperationId> {
        match self.index.get(id) {
            Some(&idx) => self
                .graph
                .neighbors_directed(idx, direction)
                .map(|n| self.graph[n].id())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Topological order over the dependency edges: every dependency precedes its consumers.
    ///
    /// Callers are expected to have already established the graph is acyclic (critical-path
    /// analysis runs before any worker lane starts and rejects cycles up front); this panics
    /// on a cycle rather than picking an arbitrary order, since reaching that case here means
    /// a caller skipped the check that's supposed to gate every run.
    pub fn topological_order(&self) -> Vec<&OperationId> {
        petgraph::algo::toposort(&self.graph, None)
            .unwrap_or_else(|cycle| {
                panic!(
                    "topological_order called on a cyclic graph at {:?}",
                    self.graph[cycle.node_id()].id()
                )
            })
            .into_iter()
            .map(|idx| self.graph[idx].id())
            .collect()
    }
}

/// Incrementally assembles an [`OperationGraph`].
#[derive(Default)]
pub struct OperationGraphBuilder {
    graph: DiGraph<Operation, ()>,
    index: HashMap<OperationId, NodeIndex>,
}

impl OperationGraphBuilder {
    pub fn add_operation(&mut self, operation: Operation) -> &mut Self {
        let id = operation.id().clone();
        let idx = self.graph.add_node(operation);
        self.index.insert(id, idx);
        self
    }

    /// Records that `consumer` depends on `dependency`: `dependency` must terminate in a way
    /// that satisfies it before `consumer` becomes eligible.
    pub fn add_dependency(
        &mut self,
        consumer: &OperationId,
        dependency: &OperationId,
    ) -> Result<&mut Self, EngineError> {
        let dependency_idx = *self
            .index
            .get(dependency)
            .ok_or_else(|| EngineError::DanglingEdge(dependency.clone()))?;
        let consumer_idx = *self
            .index
            .get(consumer)
            .ok_or_else(|| EngineError::DanglingEdge(consumer.clone()))?;
        self.graph.add_edge(dependency_idx, consumer_idx, ());
        Ok(self)
    }

    pub fn build(self) -> OperationGraph {
        OperationGraph {
            graph: self.graph,
            index: self.index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{RunnerContext, TerminalStatus};
    use std::error::Error;

    struct NoopRunner(&'static str);
    impl Runner for NoopRunner {
        fn name(&self) -> &str {
            self.0
        }

        fn execute(
            &mut self,
            _context: &mut RunnerContext<'_>,
        ) -> Result<TerminalStatus, Box<dyn Error + Send + Sync>> {
            Ok(TerminalStatus::Success)
        }
    }

    fn op(name: &str) -> Operation {
        Operation::new(OperationId::from(name), Box::new(NoopRunner(Box::leak(name.to_string().into_boxed_str()))))
    }

    #[test]
    fn edges_are_symmetric_between_dependencies_and_consumers() {
        let mut builder = OperationGraph::builder();
        builder.add_operation(op("a"));
        builder.add_operation(op("b"));
        builder.add_dependency(&OperationId::from("b"), &OperationId::from("a")).unwrap();
        let graph = builder.build();

        assert_eq!(graph.dependencies(&OperationId::from("b")), vec![&OperationId::from("a")]);
        assert_eq!(graph.consumers(&OperationId::from("a")), vec![&OperationId::from("b")]);
        assert!(graph.dependencies(&OperationId::from("a")).is_empty());
    }

    #[test]
    fn dangling_edge_is_rejected() {
        let mut builder = OperationGraph::builder();
        builder.add_operation(op("a"));
        let err = builder
            .add_dependency(&OperationId::from("a"), &OperationId::from("missing"))
            .unwrap_err();
        assert!(matches!(err, EngineError::DanglingEdge(_)));
    }

    #[test]
    fn topological_order_respects_dependency_edges_regardless_of_name() {
        // z has no dependencies, b depends on z, a depends on b: alphabetical name order
        // (a, b, z) disagrees with the dependency order (z, b, a) this must produce.
        let mut builder = OperationGraph::builder();
        builder.add_operation(op("z"));
        builder.add_operation(op("b"));
        builder.add_operation(op("a"));
        builder.add_dependency(&OperationId::from("b"), &OperationId::from("z")).unwrap();
        builder.add_dependency(&OperationId::from("a"), &OperationId::from("b")).unwrap();
        let graph = builder.build();

        assert_eq!(
            graph.topological_order(),
            vec![
                &OperationId::from("z"),
                &OperationId::from("b"),
                &OperationId::from("a"),
            ]
        );
    }

    #[test]
    fn default_weight_applies_when_unset() {
        let operation = op("a");
        assert_eq!(operation.weight(), DEFAULT_WEIGHT);
    }
}
