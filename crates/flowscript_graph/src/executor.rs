// SPDX-License-Identifier: MIT OR Apache-2.0
//! Synchronous executor walking the execution-flow chain.
//!
//! A run moves through readiness (clear compiled flags, locate the single
//! entry node, build the chain), whole-chain verification, then node-by-node
//! execution. Execution is fail-fast: the first node error aborts the run
//! and already-applied side effects stay in place.

use std::collections::VecDeque;
use std::time::Instant;

use crate::graph::NodeGraph;
use crate::node::NodeId;

/// Error raised during graph execution.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// The graph has no built, verified execution chain.
    #[error("graph is not ready to be executed")]
    NotReady,

    /// A chain node vanished from the graph mid-run.
    #[error("node {0} was not found during execution")]
    NodeNotFound(NodeId),

    /// A node is missing a usable input value.
    #[error("node '{node}' has no value for input '{port}'")]
    MissingInput {
        /// Display name of the failing node.
        node: String,
        /// Name of the input port.
        port: String,
    },

    /// A value of an unexpected kind reached a node.
    #[error("expected a {expected} value, got {actual}")]
    TypeMismatch {
        /// Expected kind.
        expected: String,
        /// Actual kind.
        actual: String,
    },

    /// A referenced variable does not exist.
    #[error("variable '{0}' was not found")]
    VariableNotFound(String),

    /// A referenced function signature is not registered.
    #[error("function signature '{0}' is not registered")]
    FunctionNotFound(String),

    /// Node-specific failure.
    #[error("node '{node}' failed: {message}")]
    NodeFailed {
        /// Display name of the failing node.
        node: String,
        /// Failure description.
        message: String,
    },
}

/// Runs a single node's execution hook, then forwards its affected port
/// values and flags it as compiled. Control-flow nodes use this to run
/// their nested body chains synchronously.
pub fn execute_node(graph: &mut NodeGraph, node_id: NodeId) -> Result<(), ExecutionError> {
    let template = graph
        .template_of(node_id)
        .ok_or(ExecutionError::NodeNotFound(node_id))?;
    if let Some(node) = graph.node(node_id) {
        tracing::debug!(node = %node.name, "executing");
    }
    if let Err(error) = template.execute(graph, node_id) {
        if let Some(node) = graph.node_mut(node_id) {
            node.is_invalid = true;
        }
        return Err(error);
    }
    graph.update_affected_outputs(node_id);
    if let Some(node) = graph.node_mut(node_id) {
        node.is_compiled = true;
    }
    Ok(())
}

/// Interpreter for the executable chain of a graph.
pub struct GraphExecutor {
    exec_chain: VecDeque<NodeId>,
    ready: bool,
    step_cursor: usize,
}

impl GraphExecutor {
    /// Creates an executor with no built chain.
    pub fn new() -> Self {
        Self {
            exec_chain: VecDeque::new(),
            ready: false,
            step_cursor: 0,
        }
    }

    /// The chain built by the last readiness pass.
    pub fn exec_chain(&self) -> &VecDeque<NodeId> {
        &self.exec_chain
    }

    /// Whether the chain is built and verified.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Builds and verifies the execution chain.
    ///
    /// Clears every node's compiled flag, locates the graph's entry node
    /// and follows its execution outputs. No entry node is a failure; more
    /// than one is tolerated, the first in insertion order wins and the
    /// rest are ignored with a warning.
    pub fn ready_to_execute(&mut self, graph: &mut NodeGraph) -> bool {
        self.ready = false;
        self.exec_chain.clear();

        for node in graph.nodes_mut() {
            node.is_compiled = false;
        }

        let entries: Vec<NodeId> = graph
            .nodes()
            .filter(|node| node.is_entry)
            .map(|node| node.id)
            .collect();
        let Some(entry) = entries.first().copied() else {
            tracing::error!("graph has no input node to execute from");
            return false;
        };
        if entries.len() > 1 {
            tracing::warn!(
                ignored = entries.len() - 1,
                "graph has multiple input nodes, using the first one"
            );
        }

        self.exec_chain = graph.exec_queue(entry);
        if !self.verify_graph(graph) {
            return false;
        }
        self.ready = true;
        true
    }

    /// Verifies every node of the built chain.
    ///
    /// Iteration never stops at the first failure: each failing node is
    /// marked invalid and collected so all problems surface together.
    pub fn verify_graph(&self, graph: &mut NodeGraph) -> bool {
        let mut invalid: Vec<String> = Vec::new();
        for node_id in &self.exec_chain {
            let Some(template) = graph.template_of(*node_id) else {
                continue;
            };
            if !template.verify(graph, *node_id) {
                if let Some(node) = graph.node_mut(*node_id) {
                    node.is_invalid = true;
                    invalid.push(node.name.clone());
                }
            } else if let Some(node) = graph.node_mut(*node_id) {
                node.is_invalid = false;
            }
        }
        if !invalid.is_empty() {
            tracing::error!(nodes = ?invalid, "graph verification failed");
            return false;
        }
        true
    }

    /// Runs the whole chain from the entry node.
    ///
    /// Stepped-execution counters are always reset first and readiness is
    /// rebuilt. The first node to fail aborts the run immediately; side
    /// effects of nodes that already ran are left in place.
    pub fn execute(&mut self, graph: &mut NodeGraph) -> Result<(), ExecutionError> {
        self.reset_stepped_execution();
        if !self.ready_to_execute(graph) {
            tracing::warn!("graph is not ready to be executed");
            return Err(ExecutionError::NotReady);
        }

        graph.set_executing(true);
        let start = Instant::now();
        let chain: Vec<NodeId> = self.exec_chain.iter().copied().collect();
        for node_id in chain {
            if let Err(error) = execute_node(graph, node_id) {
                tracing::error!(%error, "graph execution aborted");
                graph.set_executing(false);
                return Err(error);
            }
        }
        graph.set_executing(false);
        tracing::info!(elapsed = ?start.elapsed(), "graph executed");
        Ok(())
    }

    /// Runs the next node of the chain, building readiness on the first
    /// step. Returns the executed node id, or `None` once the chain is
    /// exhausted.
    pub fn execute_step(&mut self, graph: &mut NodeGraph) -> Result<Option<NodeId>, ExecutionError> {
        if !self.ready {
            if !self.ready_to_execute(graph) {
                return Err(ExecutionError::NotReady);
            }
            self.step_cursor = 0;
        }
        let Some(node_id) = self.exec_chain.get(self.step_cursor).copied() else {
            return Ok(None);
        };
        execute_node(graph, node_id)?;
        self.step_cursor += 1;
        Ok(Some(node_id))
    }

    /// Resets the stepped-execution cursor; the next step rebuilds the
    /// chain from the entry node.
    pub fn reset_stepped_execution(&mut self) {
        self.step_cursor = 0;
        self.ready = false;
    }
}

impl Default for GraphExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::datatypes::{Value, NUMERIC};
    use crate::graph::NodeGraph;
    use crate::node::{Node, NodeTemplate};
    use crate::nodes::input::GraphInputNode;
    use crate::port::{Port, PortRef};
    use crate::registry::{NodeFactory, RegistryError};

    /// Executable test node that adds one to the "counter" graph variable.
    struct CountNode;

    impl NodeTemplate for CountNode {
        fn type_id(&self) -> &'static str {
            "flowscript.tests.CountNode"
        }

        fn default_name(&self) -> &'static str {
            "Count"
        }

        fn is_exec(&self) -> bool {
            true
        }

        fn execute(&self, graph: &mut NodeGraph, _node_id: NodeId) -> Result<(), ExecutionError> {
            let current = graph
                .variable_value("counter")
                .and_then(Value::as_number)
                .unwrap_or(0.0);
            graph
                .set_variable_value("counter", Value::Number(current + 1.0))
                .map_err(|_| ExecutionError::VariableNotFound("counter".to_string()))
        }
    }

    /// Executable test node that always fails.
    struct FailNode;

    impl NodeTemplate for FailNode {
        fn type_id(&self) -> &'static str {
            "flowscript.tests.FailNode"
        }

        fn default_name(&self) -> &'static str {
            "Fail"
        }

        fn is_exec(&self) -> bool {
            true
        }

        fn execute(&self, graph: &mut NodeGraph, node_id: NodeId) -> Result<(), ExecutionError> {
            let node = graph.node(node_id).map(|n| n.name.clone()).unwrap_or_default();
            Err(ExecutionError::NodeFailed {
                node,
                message: "boom".to_string(),
            })
        }
    }

    /// Executable test node with a required input.
    struct NeedsInputNode;

    impl NodeTemplate for NeedsInputNode {
        fn type_id(&self) -> &'static str {
            "flowscript.tests.NeedsInputNode"
        }

        fn default_name(&self) -> &'static str {
            "Needs Input"
        }

        fn is_exec(&self) -> bool {
            true
        }

        fn setup_ports(
            &self,
            node: &mut Node,
            factory: &NodeFactory,
        ) -> Result<(), RegistryError> {
            self.init_exec_ports(node, factory)?;
            node.add_input(Port::input("value", factory.data_type_by_name(NUMERIC)?))?;
            node.mark_input_required("value")?;
            Ok(())
        }
    }

    fn test_factory() -> Arc<NodeFactory> {
        let mut factory = NodeFactory::new();
        factory.register_node(Arc::new(CountNode), None).unwrap();
        factory.register_node(Arc::new(FailNode), None).unwrap();
        factory.register_node(Arc::new(NeedsInputNode), None).unwrap();
        Arc::new(factory)
    }

    fn chain_exec(graph: &mut NodeGraph, from: NodeId, to: NodeId) {
        graph
            .connect_ports(
                &PortRef::output(from, crate::node::EXEC_OUT_PORT),
                &PortRef::input(to, crate::node::EXEC_IN_PORT),
                false,
            )
            .unwrap();
    }

    fn counter_chain(graph: &mut NodeGraph, length: usize) -> NodeId {
        graph.create_variable("counter", None, None, false).unwrap();
        let entry = graph.create_node(GraphInputNode::TYPE_ID).unwrap();
        let mut previous = entry;
        for _ in 0..length {
            let node = graph.create_node("flowscript.tests.CountNode").unwrap();
            chain_exec(graph, previous, node);
            previous = node;
        }
        entry
    }

    #[test]
    fn test_execution_determinism() {
        let mut graph = NodeGraph::new(test_factory());
        counter_chain(&mut graph, 5);

        let mut executor = GraphExecutor::new();
        executor.execute(&mut graph).unwrap();
        assert_eq!(graph.variable_value("counter"), Some(&Value::Number(5.0)));

        executor.execute(&mut graph).unwrap();
        assert_eq!(graph.variable_value("counter"), Some(&Value::Number(10.0)));
    }

    #[test]
    fn test_no_entry_node_fails_readiness() {
        let mut graph = NodeGraph::new(test_factory());
        graph.create_variable("counter", None, None, false).unwrap();
        graph.create_node("flowscript.tests.CountNode").unwrap();

        let mut executor = GraphExecutor::new();
        assert!(!executor.ready_to_execute(&mut graph));
        let err = executor.execute(&mut graph);
        assert!(matches!(err, Err(ExecutionError::NotReady)));
        assert_eq!(graph.variable_value("counter"), Some(&Value::Number(0.0)));
    }

    #[test]
    fn test_multiple_entry_nodes_first_wins() {
        let mut graph = NodeGraph::new(test_factory());
        let entry = counter_chain(&mut graph, 2);
        graph.create_node(GraphInputNode::TYPE_ID).unwrap();

        let mut executor = GraphExecutor::new();
        assert!(executor.ready_to_execute(&mut graph));
        assert_eq!(executor.exec_chain().front(), Some(&entry));
        assert_eq!(executor.exec_chain().len(), 3);
    }

    #[test]
    fn test_fail_fast_aborts_run() {
        let mut graph = NodeGraph::new(test_factory());
        let entry = counter_chain(&mut graph, 1);
        let chain_end = graph.exec_queue(entry).pop_back().unwrap();
        let failing = graph.create_node("flowscript.tests.FailNode").unwrap();
        let tail = graph.create_node("flowscript.tests.CountNode").unwrap();
        chain_exec(&mut graph, chain_end, failing);
        chain_exec(&mut graph, failing, tail);

        let mut executor = GraphExecutor::new();
        let err = executor.execute(&mut graph);
        assert!(matches!(err, Err(ExecutionError::NodeFailed { .. })));
        // The first counter ran, the one behind the failing node did not.
        assert_eq!(graph.variable_value("counter"), Some(&Value::Number(1.0)));
        assert!(!graph.is_executing());
        assert!(graph.node(failing).unwrap().is_invalid);
        assert!(!graph.node(tail).unwrap().is_compiled);
    }

    #[test]
    fn test_verification_collects_all_failures() {
        let mut graph = NodeGraph::new(test_factory());
        let entry = graph.create_node(GraphInputNode::TYPE_ID).unwrap();
        let first = graph.create_node("flowscript.tests.NeedsInputNode").unwrap();
        let second = graph.create_node("flowscript.tests.NeedsInputNode").unwrap();
        chain_exec(&mut graph, entry, first);
        chain_exec(&mut graph, first, second);

        let mut executor = GraphExecutor::new();
        assert!(!executor.ready_to_execute(&mut graph));
        assert!(graph.node(first).unwrap().is_invalid);
        assert!(graph.node(second).unwrap().is_invalid);

        // Satisfying both inputs clears the failure.
        graph.set_port_value(&PortRef::input(first, "value"), Value::Number(2.0));
        graph.set_port_value(&PortRef::input(second, "value"), Value::Number(3.0));
        assert!(executor.ready_to_execute(&mut graph));
        assert!(!graph.node(first).unwrap().is_invalid);
    }

    #[test]
    fn test_stepped_execution_matches_full_run() {
        let mut graph = NodeGraph::new(test_factory());
        counter_chain(&mut graph, 3);

        let mut executor = GraphExecutor::new();
        let mut executed = 0;
        while executor.execute_step(&mut graph).unwrap().is_some() {
            executed += 1;
        }
        // Entry node plus three counters.
        assert_eq!(executed, 4);
        assert_eq!(graph.variable_value("counter"), Some(&Value::Number(3.0)));

        executor.reset_stepped_execution();
        executor.execute_step(&mut graph).unwrap();
        assert_eq!(executor.exec_chain().len(), 4);
    }

    #[test]
    fn test_compiled_flags_track_run() {
        let mut graph = NodeGraph::new(test_factory());
        let entry = counter_chain(&mut graph, 2);

        let mut executor = GraphExecutor::new();
        executor.execute(&mut graph).unwrap();
        for node_id in graph.exec_queue(entry) {
            assert!(graph.node(node_id).unwrap().is_compiled);
        }
        assert!(executor.ready_to_execute(&mut graph));
        assert!(!graph.node(entry).unwrap().is_compiled);
    }
}
