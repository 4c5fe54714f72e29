// SPDX-License-Identifier: MIT OR Apache-2.0
//! Logic and utility nodes: branching and logging.

use std::collections::VecDeque;

use crate::datatypes::{Value, BOOLEAN, EXEC, STRING};
use crate::executor::ExecutionError;
use crate::graph::NodeGraph;
use crate::node::{Node, NodeId, NodeTemplate, EXEC_IN_PORT};
use crate::port::{Port, PortRef};
use crate::registry::{NodeFactory, RegistryError};

/// Name of the branch condition input.
pub const CONDITION_PORT: &str = "condition";
/// Name of the execution output taken when the condition holds.
pub const TRUE_PORT: &str = "true";
/// Name of the execution output taken otherwise.
pub const FALSE_PORT: &str = "false";
/// Name of the logger message input.
pub const MESSAGE_PORT: &str = "message";

/// Routes the execution chain through one of two outputs based on a
/// boolean condition read when the chain is built.
pub struct BranchNode;

impl BranchNode {
    /// Registered type id.
    pub const TYPE_ID: &'static str = "flowscript.nodes.BranchNode";
}

impl NodeTemplate for BranchNode {
    fn type_id(&self) -> &'static str {
        Self::TYPE_ID
    }

    fn default_name(&self) -> &'static str {
        "Branch"
    }

    fn category(&self) -> &'static str {
        "Logic"
    }

    fn is_exec(&self) -> bool {
        true
    }

    fn setup_ports(&self, node: &mut Node, factory: &NodeFactory) -> Result<(), RegistryError> {
        let exec = factory.data_type_by_name(EXEC)?;
        let boolean = factory.data_type_by_name(BOOLEAN)?;
        node.add_input(Port::input(EXEC_IN_PORT, exec))?;
        node.add_input(Port::input(CONDITION_PORT, boolean))?;
        node.add_output(Port::output(TRUE_PORT, exec).with_multi_connection(false))?;
        node.add_output(Port::output(FALSE_PORT, exec).with_multi_connection(false))?;
        Ok(())
    }

    fn exec_queue(&self, graph: &NodeGraph, node_id: NodeId) -> VecDeque<NodeId> {
        let mut queue = VecDeque::from([node_id]);
        let condition = graph
            .port_value(&PortRef::input(node_id, CONDITION_PORT))
            .as_bool()
            .unwrap_or(false);
        let branch = if condition { TRUE_PORT } else { FALSE_PORT };
        if let Some(next) = graph.first_exec_connection(node_id, branch) {
            queue.extend(graph.exec_queue(next));
        }
        queue
    }
}

/// Logs its message input when executed.
pub struct LoggerNode;

impl LoggerNode {
    /// Registered type id.
    pub const TYPE_ID: &'static str = "flowscript.nodes.LoggerNode";
}

impl NodeTemplate for LoggerNode {
    fn type_id(&self) -> &'static str {
        Self::TYPE_ID
    }

    fn default_name(&self) -> &'static str {
        "Logger"
    }

    fn category(&self) -> &'static str {
        "Utils"
    }

    fn is_exec(&self) -> bool {
        true
    }

    fn setup_ports(&self, node: &mut Node, factory: &NodeFactory) -> Result<(), RegistryError> {
        self.init_exec_ports(node, factory)?;
        let string = factory.data_type_by_name(STRING)?;
        node.add_input(Port::input(MESSAGE_PORT, string))?;
        Ok(())
    }

    fn execute(&self, graph: &mut NodeGraph, node_id: NodeId) -> Result<(), ExecutionError> {
        let message = graph.port_value(&PortRef::input(node_id, MESSAGE_PORT));
        match message {
            Value::String(text) => tracing::info!("{text}"),
            other => tracing::info!("{other:?}"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::executor::GraphExecutor;
    use crate::node::EXEC_OUT_PORT;
    use crate::nodes::input::GraphInputNode;
    use crate::registry::NodeFactory;

    /// Counts how often it executed through a graph variable.
    struct MarkNode;

    impl NodeTemplate for MarkNode {
        fn type_id(&self) -> &'static str {
            "flowscript.tests.MarkNode"
        }

        fn default_name(&self) -> &'static str {
            "Mark"
        }

        fn is_exec(&self) -> bool {
            true
        }

        fn execute(&self, graph: &mut NodeGraph, _node_id: NodeId) -> Result<(), ExecutionError> {
            let hits = graph
                .variable_value("hits")
                .and_then(Value::as_number)
                .unwrap_or(0.0);
            graph
                .set_variable_value("hits", Value::Number(hits + 1.0))
                .map_err(|_| ExecutionError::VariableNotFound("hits".to_string()))
        }
    }

    fn factory() -> Arc<NodeFactory> {
        let mut factory = NodeFactory::new();
        factory.register_node(Arc::new(MarkNode), None).unwrap();
        Arc::new(factory)
    }

    #[test]
    fn test_branch_routes_by_condition() {
        let mut graph = NodeGraph::new(factory());
        graph.create_variable("hits", None, None, false).unwrap();
        let entry = graph.create_node(GraphInputNode::TYPE_ID).unwrap();
        let branch = graph.create_node(BranchNode::TYPE_ID).unwrap();
        let taken = graph.create_node("flowscript.tests.MarkNode").unwrap();
        let skipped = graph.create_node("flowscript.tests.MarkNode").unwrap();

        graph
            .connect_ports(
                &PortRef::output(entry, EXEC_OUT_PORT),
                &PortRef::input(branch, EXEC_IN_PORT),
                false,
            )
            .unwrap();
        graph
            .connect_ports(
                &PortRef::output(branch, TRUE_PORT),
                &PortRef::input(taken, EXEC_IN_PORT),
                false,
            )
            .unwrap();
        graph
            .connect_ports(
                &PortRef::output(branch, FALSE_PORT),
                &PortRef::input(skipped, EXEC_IN_PORT),
                false,
            )
            .unwrap();
        graph.set_port_value(&PortRef::input(branch, CONDITION_PORT), Value::Bool(true));

        let chain = graph.exec_queue(entry);
        assert!(chain.contains(&taken));
        assert!(!chain.contains(&skipped));

        let mut executor = GraphExecutor::new();
        executor.execute(&mut graph).unwrap();
        assert_eq!(graph.variable_value("hits"), Some(&Value::Number(1.0)));
    }

    #[test]
    fn test_branch_default_is_false_path() {
        let graph_factory = factory();
        let mut graph = NodeGraph::new(graph_factory);
        let branch = graph.create_node(BranchNode::TYPE_ID).unwrap();
        let next = graph.create_node("flowscript.tests.MarkNode").unwrap();
        graph
            .connect_ports(
                &PortRef::output(branch, FALSE_PORT),
                &PortRef::input(next, EXEC_IN_PORT),
                false,
            )
            .unwrap();

        let chain = graph.exec_queue(branch);
        assert_eq!(chain, VecDeque::from([branch, next]));
    }

    #[test]
    fn test_logger_accepts_missing_connection() {
        let mut graph = NodeGraph::new(factory());
        let logger = graph.create_node(LoggerNode::TYPE_ID).unwrap();
        graph.set_port_value(
            &PortRef::input(logger, MESSAGE_PORT),
            Value::from("hello"),
        );
        LoggerNode.execute(&mut graph, logger).unwrap();
    }
}
