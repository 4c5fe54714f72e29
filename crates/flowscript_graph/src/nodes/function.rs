// SPDX-License-Identifier: MIT OR Apache-2.0
//! Generic node backed by a registered callable.
//!
//! One node class covers every registered function: the instance stores a
//! signature, looks the callable up at execution time and carries whatever
//! ports the function declares. This is how math/string/collection
//! operations become nodes without one class per operation.

use std::sync::Arc;

use crate::datatypes::Value;
use crate::executor::ExecutionError;
use crate::graph::{GraphError, NodeGraph};
use crate::node::{Node, NodeId, NodeTemplate, PropertyWidget};
use crate::port::{Port, PortRef};
use crate::registry::{NodeFactory, RegistryError};

/// Custom property holding the registered function signature.
pub const FUNC_SIGNATURE_PROPERTY: &str = "func_signature";

/// Builds a node's data ports from a registered function definition and
/// stores the signature on the node.
pub(crate) fn apply_signature(
    node: &mut Node,
    factory: &NodeFactory,
    signature: &str,
) -> Result<(), GraphError> {
    let function = factory.function_from_signature(signature).ok_or_else(|| {
        GraphError::Registry(RegistryError::FunctionNotFound(signature.to_string()))
    })?;

    for (index, (name, data_type)) in function.inputs.iter().enumerate() {
        let descriptor = factory.data_type_by_name(data_type)?;
        let mut port = Port::input(name, descriptor);
        if let Some(default) = function.default_values.get(index) {
            port.value = default.clone();
        }
        node.add_input(port)
            .map_err(|error| GraphError::Registry(error.into()))?;
    }
    for (name, data_type) in &function.outputs {
        let descriptor = factory.data_type_by_name(data_type)?;
        node.add_output(Port::output(name, descriptor))
            .map_err(|error| GraphError::Registry(error.into()))?;
    }
    node.set_property(FUNC_SIGNATURE_PROPERTY, Value::from(signature))?;
    Ok(())
}

/// Node whose behavior is a registered callable resolved by signature.
pub struct FunctionNode;

impl FunctionNode {
    /// Registered type id.
    pub const TYPE_ID: &'static str = "flowscript.nodes.FunctionNode";
}

impl NodeTemplate for FunctionNode {
    fn type_id(&self) -> &'static str {
        Self::TYPE_ID
    }

    fn default_name(&self) -> &'static str {
        "Function"
    }

    fn category(&self) -> &'static str {
        "Functions"
    }

    fn is_exec(&self) -> bool {
        true
    }

    fn setup_ports(&self, node: &mut Node, factory: &NodeFactory) -> Result<(), RegistryError> {
        self.init_exec_ports(node, factory)?;
        // The data ports depend on the bound function and are rebuilt from
        // the session, so the full layout is persisted.
        node.port_deletion_allowed = true;
        if let Err(error) = node.add_property(
            FUNC_SIGNATURE_PROPERTY,
            Value::String(String::new()),
            Some(PropertyWidget::Hidden),
        ) {
            tracing::debug!(%error, "function signature property already declared");
        }
        Ok(())
    }

    fn execute(&self, graph: &mut NodeGraph, node_id: NodeId) -> Result<(), ExecutionError> {
        let signature = graph
            .node(node_id)
            .and_then(|node| node.property(FUNC_SIGNATURE_PROPERTY))
            .and_then(|value| value.as_str().map(ToString::to_string))
            .unwrap_or_default();
        let factory = Arc::clone(graph.factory());
        let Some(function) = factory.function_from_signature(&signature) else {
            return Err(ExecutionError::FunctionNotFound(signature));
        };

        let args: Vec<Value> = function
            .inputs
            .iter()
            .map(|(name, _)| graph.port_value(&PortRef::input(node_id, name.clone())))
            .collect();
        let mut results = function.call(&args)?;

        if let [(name, data_type)] = function.outputs.as_slice() {
            // A multi-valued result lands whole on a single runtime-typed
            // output instead of being split.
            let is_runtime = factory
                .data_type_by_name(data_type)
                .map(|descriptor| descriptor.is_runtime)
                .unwrap_or(false);
            let value = if results.len() > 1 && is_runtime {
                Value::List(results)
            } else if results.is_empty() {
                return Ok(());
            } else {
                results.remove(0)
            };
            graph.set_port_value(&PortRef::output(node_id, name.clone()), value);
        } else {
            for ((name, _), value) in function.outputs.iter().zip(results) {
                graph.set_port_value(&PortRef::output(node_id, name.clone()), value);
            }
        }
        Ok(())
    }
}
