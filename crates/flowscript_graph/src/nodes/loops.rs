// SPDX-License-Identifier: MIT OR Apache-2.0
//! Collection-iterating control-flow node.

use std::collections::VecDeque;

use crate::datatypes::{Value, ANY, EXEC, LIST};
use crate::executor::{execute_node, ExecutionError};
use crate::graph::NodeGraph;
use crate::node::{verify_required_inputs, Node, NodeId, NodeTemplate, EXEC_IN_PORT};
use crate::port::{Port, PortRef};
use crate::registry::{NodeFactory, RegistryError};

/// Name of the list input holding the collection to iterate.
pub const ITEMS_PORT: &str = "items";
/// Name of the output exposing the current element during an iteration.
pub const ITEM_PORT: &str = "item";
/// Name of the execution output running once per element.
pub const BODY_PORT: &str = "body";
/// Name of the execution output taken after the last iteration.
pub const COMPLETED_PORT: &str = "completed";

/// Executes its body chain once per element of a list input, in input
/// order, exposing the current element on the `item` output only while an
/// iteration runs. The body executes synchronously within the outer run's
/// call stack.
pub struct ForEachNode;

impl ForEachNode {
    /// Registered type id.
    pub const TYPE_ID: &'static str = "flowscript.nodes.ForEachNode";
}

impl NodeTemplate for ForEachNode {
    fn type_id(&self) -> &'static str {
        Self::TYPE_ID
    }

    fn default_name(&self) -> &'static str {
        "For Each"
    }

    fn category(&self) -> &'static str {
        "Loops"
    }

    fn is_exec(&self) -> bool {
        true
    }

    fn setup_ports(&self, node: &mut Node, factory: &NodeFactory) -> Result<(), RegistryError> {
        let exec = factory.data_type_by_name(EXEC)?;
        let list = factory.data_type_by_name(LIST)?;
        let any = factory.data_type_by_name(ANY)?;
        node.add_input(Port::input(EXEC_IN_PORT, exec))?;
        node.add_input(Port::input(ITEMS_PORT, list))?;
        node.add_output(Port::output(BODY_PORT, exec).with_multi_connection(false))?;
        node.add_output(Port::output(COMPLETED_PORT, exec).with_multi_connection(false))?;
        node.add_output(Port::output(ITEM_PORT, any))?;
        node.mark_input_required(ITEMS_PORT)?;
        Ok(())
    }

    /// The body chain is executed internally, so the outer chain continues
    /// through the `completed` output only.
    fn exec_queue(&self, graph: &NodeGraph, node_id: NodeId) -> VecDeque<NodeId> {
        let mut queue = VecDeque::from([node_id]);
        if let Some(next) = graph.first_exec_connection(node_id, COMPLETED_PORT) {
            queue.extend(graph.exec_queue(next));
        }
        queue
    }

    /// Verifies the node itself and every node of its nested body chain.
    /// Body failures do not stop the remaining body nodes from being
    /// checked, so all problems surface together.
    fn verify(&self, graph: &NodeGraph, node_id: NodeId) -> bool {
        let mut valid = verify_required_inputs(graph, node_id);
        if let Some(body_start) = graph.first_exec_connection(node_id, BODY_PORT) {
            for body_id in graph.exec_queue(body_start) {
                let Some(template) = graph.template_of(body_id) else {
                    continue;
                };
                if !template.verify(graph, body_id) {
                    valid = false;
                }
            }
        }
        valid
    }

    fn execute(&self, graph: &mut NodeGraph, node_id: NodeId) -> Result<(), ExecutionError> {
        let items = graph.port_value(&PortRef::input(node_id, ITEMS_PORT));
        let Some(items) = items.as_list().map(<[Value]>::to_vec) else {
            return Err(ExecutionError::TypeMismatch {
                expected: "List".to_string(),
                actual: format!("{:?}", items.kind()),
            });
        };
        let item_ref = PortRef::output(node_id, ITEM_PORT);
        let Some(body_start) = graph.first_exec_connection(node_id, BODY_PORT) else {
            return Ok(());
        };
        for item in items {
            graph.set_port_value(&item_ref, item);
            for body_id in graph.exec_queue(body_start) {
                execute_node(graph, body_id)?;
            }
        }
        graph.set_port_value(&item_ref, Value::Null);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex;

    use super::*;
    use crate::executor::GraphExecutor;
    use crate::node::EXEC_OUT_PORT;
    use crate::nodes::input::GraphInputNode;
    use crate::registry::NodeFactory;

    /// Records the loop item value every time it executes.
    struct RecordNode {
        seen: Arc<Mutex<Vec<Value>>>,
    }

    impl NodeTemplate for RecordNode {
        fn type_id(&self) -> &'static str {
            "flowscript.tests.RecordNode"
        }

        fn default_name(&self) -> &'static str {
            "Record"
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
            node.add_input(Port::input("value", factory.data_type_by_name(ANY)?))?;
            Ok(())
        }

        fn execute(&self, graph: &mut NodeGraph, node_id: NodeId) -> Result<(), ExecutionError> {
            let value = graph.port_value(&PortRef::input(node_id, "value"));
            self.seen.lock().expect("poisoned").push(value);
            Ok(())
        }
    }

    fn loop_graph(seen: Arc<Mutex<Vec<Value>>>) -> (NodeGraph, NodeId, NodeId, NodeId) {
        let mut factory = NodeFactory::new();
        factory
            .register_node(Arc::new(RecordNode { seen }), None)
            .unwrap();
        let mut graph = NodeGraph::new(Arc::new(factory));

        let entry = graph.create_node(GraphInputNode::TYPE_ID).unwrap();
        let for_each = graph.create_node(ForEachNode::TYPE_ID).unwrap();
        let record = graph.create_node("flowscript.tests.RecordNode").unwrap();

        graph
            .connect_ports(
                &PortRef::output(entry, EXEC_OUT_PORT),
                &PortRef::input(for_each, EXEC_IN_PORT),
                false,
            )
            .unwrap();
        graph
            .connect_ports(
                &PortRef::output(for_each, BODY_PORT),
                &PortRef::input(record, EXEC_IN_PORT),
                false,
            )
            .unwrap();
        graph
            .connect_ports(
                &PortRef::output(for_each, ITEM_PORT),
                &PortRef::input(record, "value"),
                false,
            )
            .unwrap();

        (graph, entry, for_each, record)
    }

    #[test]
    fn test_three_item_list_runs_body_three_times_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (mut graph, _, for_each, _) = loop_graph(Arc::clone(&seen));
        graph.set_port_value(
            &PortRef::input(for_each, ITEMS_PORT),
            Value::List(vec![Value::Number(1.0), Value::Number(2.0), Value::Number(3.0)]),
        );

        let mut executor = GraphExecutor::new();
        executor.execute(&mut graph).unwrap();

        let recorded = seen.lock().expect("poisoned").clone();
        assert_eq!(
            recorded,
            vec![Value::Number(1.0), Value::Number(2.0), Value::Number(3.0)]
        );
        // The current element is exposed during iterations only.
        assert_eq!(
            graph.port_value(&PortRef::output(for_each, ITEM_PORT)),
            Value::Null
        );
    }

    #[test]
    fn test_body_chain_not_part_of_outer_chain() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (graph, entry, for_each, record) = loop_graph(seen);
        let chain = graph.exec_queue(entry);
        assert!(chain.contains(&for_each));
        assert!(!chain.contains(&record));
    }

    #[test]
    fn test_verify_aggregates_body_failures() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (mut graph, _, for_each, record) = loop_graph(Arc::clone(&seen));
        graph.set_port_value(
            &PortRef::input(for_each, ITEMS_PORT),
            Value::List(vec![Value::Number(1.0)]),
        );
        // Make the body node fail verification.
        graph
            .node_mut(record)
            .unwrap()
            .mark_input_required("value")
            .unwrap();
        graph
            .disconnect_ports(
                &PortRef::output(for_each, ITEM_PORT),
                &PortRef::input(record, "value"),
                false,
            )
            .unwrap();

        assert!(!ForEachNode.verify(&graph, for_each));
    }

    #[test]
    fn test_missing_items_fails_verification() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (graph, _, for_each, _) = loop_graph(seen);
        assert!(!ForEachNode.verify(&graph, for_each));
    }
}
