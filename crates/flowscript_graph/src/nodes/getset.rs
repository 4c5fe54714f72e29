// SPDX-License-Identifier: MIT OR Apache-2.0
//! Variable access nodes.
//!
//! Get/Set nodes reference graph variables by name, never by identity, so
//! renaming a variable rewrites the stored name on every referencing node.

use crate::datatypes::{Value, ANY};
use crate::executor::ExecutionError;
use crate::graph::{GraphError, NodeGraph};
use crate::node::{Node, NodeId, NodeTemplate, PropertyWidget};
use crate::port::{Port, PortRef};
use crate::registry::{NodeFactory, RegistryError};

/// Name of the value port on both Get and Set nodes.
pub const VALUE_PORT: &str = "value";
/// Custom property holding the referenced variable name.
pub const VARIABLE_NAME_PROPERTY: &str = "variable_name";

fn referenced_variable(graph: &NodeGraph, node_id: NodeId) -> Option<String> {
    graph
        .node(node_id)?
        .property(VARIABLE_NAME_PROPERTY)
        .and_then(|value| value.as_str().map(ToString::to_string))
}

/// Binds a Get/Set node to a variable and resizes its value ports to the
/// variable's data type.
pub fn set_variable_name(
    graph: &mut NodeGraph,
    node_id: NodeId,
    name: &str,
) -> Result<(), GraphError> {
    graph.set_node_property(node_id, VARIABLE_NAME_PROPERTY, Value::from(name), false)?;
    refresh_from_variable(graph, node_id);
    Ok(())
}

/// Re-types a Get/Set node's value ports from its referenced variable and
/// mirrors the variable value onto a getter's output.
pub fn refresh_from_variable(graph: &mut NodeGraph, node_id: NodeId) {
    let Some(name) = referenced_variable(graph, node_id) else {
        return;
    };
    let Some(variable) = graph.variable(&name) else {
        return;
    };
    let data_type = variable.data_type.clone();
    let value = variable.value.clone();
    let is_getter = graph
        .node(node_id)
        .is_some_and(|node| node.type_id == GetNode::TYPE_ID);

    if is_getter {
        let out_ref = PortRef::output(node_id, VALUE_PORT);
        if let Err(error) = graph.set_port_data_type(&out_ref, &data_type) {
            tracing::debug!(%error, "failed to retype getter port");
        }
        graph.set_port_value(&out_ref, value);
    } else {
        for port_ref in [
            PortRef::input(node_id, VALUE_PORT),
            PortRef::output(node_id, VALUE_PORT),
        ] {
            if let Err(error) = graph.set_port_data_type(&port_ref, &data_type) {
                tracing::debug!(%error, "failed to retype setter port");
            }
        }
    }
}

fn verify_variable_reference(graph: &NodeGraph, node_id: NodeId) -> bool {
    let Some(name) = referenced_variable(graph, node_id) else {
        return false;
    };
    if name.is_empty() || graph.variable(&name).is_none() {
        if let Some(node) = graph.node(node_id) {
            tracing::debug!(node = %node.name, variable = %name, "unknown variable reference");
        }
        return false;
    }
    true
}

/// Reads a graph variable onto its output port.
pub struct GetNode;

impl GetNode {
    /// Registered type id.
    pub const TYPE_ID: &'static str = "flowscript.nodes.GetNode";
}

impl NodeTemplate for GetNode {
    fn type_id(&self) -> &'static str {
        Self::TYPE_ID
    }

    fn default_name(&self) -> &'static str {
        "Get"
    }

    fn category(&self) -> &'static str {
        "Variables"
    }

    fn setup_ports(&self, node: &mut Node, factory: &NodeFactory) -> Result<(), RegistryError> {
        let any = factory.data_type_by_name(ANY)?;
        node.add_output(Port::output(VALUE_PORT, any))?;
        if let Err(error) = node.add_property(
            VARIABLE_NAME_PROPERTY,
            Value::String(String::new()),
            Some(PropertyWidget::LineEdit),
        ) {
            tracing::debug!(%error, "variable name property already declared");
        }
        Ok(())
    }

    fn verify(&self, graph: &NodeGraph, node_id: NodeId) -> bool {
        verify_variable_reference(graph, node_id)
    }

    fn post_deserialize(&self, graph: &mut NodeGraph, node_id: NodeId) {
        refresh_from_variable(graph, node_id);
    }
}

/// Writes its value input into a graph variable when executed; the value
/// output mirrors the input so downstream nodes can chain off it.
pub struct SetNode;

impl SetNode {
    /// Registered type id.
    pub const TYPE_ID: &'static str = "flowscript.nodes.SetNode";
}

impl NodeTemplate for SetNode {
    fn type_id(&self) -> &'static str {
        Self::TYPE_ID
    }

    fn default_name(&self) -> &'static str {
        "Set"
    }

    fn category(&self) -> &'static str {
        "Variables"
    }

    fn is_exec(&self) -> bool {
        true
    }

    fn setup_ports(&self, node: &mut Node, factory: &NodeFactory) -> Result<(), RegistryError> {
        self.init_exec_ports(node, factory)?;
        let any = factory.data_type_by_name(ANY)?;
        node.add_input(Port::input(VALUE_PORT, any))?;
        node.add_output(Port::output(VALUE_PORT, any))?;
        if let Err(error) = node.add_property(
            VARIABLE_NAME_PROPERTY,
            Value::String(String::new()),
            Some(PropertyWidget::LineEdit),
        ) {
            tracing::debug!(%error, "variable name property already declared");
        }
        // The output mirrors the input whenever the input value changes.
        let mirror = PortRef::output(node.id, VALUE_PORT);
        if let Some(port) = node.inputs.get_mut(VALUE_PORT) {
            port.affected_ports.push(mirror);
        }
        Ok(())
    }

    fn verify(&self, graph: &NodeGraph, node_id: NodeId) -> bool {
        verify_variable_reference(graph, node_id)
    }

    fn execute(&self, graph: &mut NodeGraph, node_id: NodeId) -> Result<(), ExecutionError> {
        let Some(name) = referenced_variable(graph, node_id) else {
            return Err(ExecutionError::VariableNotFound(String::new()));
        };
        let value = graph.port_value(&PortRef::input(node_id, VALUE_PORT));
        graph
            .set_variable_value(&name, value)
            .map_err(|_| ExecutionError::VariableNotFound(name))
    }

    /// A new upstream connection resizes both value ports to the upstream
    /// port's type.
    fn on_input_connected(
        &self,
        graph: &mut NodeGraph,
        node_id: NodeId,
        input: &PortRef,
        output: &PortRef,
    ) {
        if input.name != VALUE_PORT {
            return;
        }
        let Some(upstream) = graph.port(output).map(|port| port.data_type.clone()) else {
            return;
        };
        for port_ref in [
            PortRef::input(node_id, VALUE_PORT),
            PortRef::output(node_id, VALUE_PORT),
        ] {
            if let Err(error) = graph.set_port_data_type(&port_ref, &upstream) {
                tracing::debug!(%error, "failed to retype setter port");
            }
        }
    }

    /// Losing the upstream connection falls back to the variable's type.
    fn on_input_disconnected(
        &self,
        graph: &mut NodeGraph,
        node_id: NodeId,
        input: &PortRef,
        _output: &PortRef,
    ) {
        if input.name != VALUE_PORT {
            return;
        }
        refresh_from_variable(graph, node_id);
    }

    fn post_deserialize(&self, graph: &mut NodeGraph, node_id: NodeId) {
        refresh_from_variable(graph, node_id);
    }
}
