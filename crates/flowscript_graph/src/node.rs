// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node model and the behavior interface node kinds implement.

use std::collections::VecDeque;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::datatypes::Value;
use crate::executor::ExecutionError;
use crate::graph::NodeGraph;
use crate::port::{ConstraintRule, Port, PortDirection, PortRef, PortSpec};
use crate::registry::{NodeFactory, RegistryError};
use crate::session::SessionData;

/// Name of the execution-flow input port created for executable nodes.
pub const EXEC_IN_PORT: &str = "input";
/// Name of the execution-flow output port created for executable nodes.
pub const EXEC_OUT_PORT: &str = "output";

/// Unique identifier for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Creates a new random node id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Widget kind hint attached to a property for the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyWidget {
    /// Not shown.
    Hidden,
    /// Read-only label.
    Label,
    /// Single-line text field.
    LineEdit,
    /// Checkbox.
    CheckBox,
    /// Item picker.
    ComboBox,
    /// Numeric slider.
    Slider,
    /// Color picker.
    ColorPicker,
}

/// A node instance owned by a graph.
///
/// Behavior is supplied by the [`NodeTemplate`] registered under
/// `type_id`; the instance itself is plain data so commands can move it in
/// and out of the graph freely.
#[derive(Debug, Clone)]
pub struct Node {
    /// Unique instance id.
    pub id: NodeId,
    /// Registry key of the template that produced this node.
    pub type_id: String,
    /// Display name, unique within the graph.
    pub name: String,
    /// Node body color (RGBA).
    pub color: [u8; 4],
    /// Whether the node is bypassed.
    pub disabled: bool,
    /// Whether the node is selected.
    pub selected: bool,
    /// Whether the node is shown.
    pub visible: bool,
    /// Position in the scene.
    pub xy_pos: [f32; 2],
    /// Input ports in declaration order.
    pub inputs: IndexMap<String, Port>,
    /// Output ports in declaration order.
    pub outputs: IndexMap<String, Port>,
    /// Whether ports may be added and removed after construction; such
    /// nodes persist their port layout in the session.
    pub port_deletion_allowed: bool,
    /// Nested session for group nodes.
    pub subgraph_session: Option<Box<SessionData>>,
    /// Whether the node participates in the executable chain.
    pub is_exec: bool,
    /// Whether the node is the graph's execution entry point.
    pub is_entry: bool,
    /// Whether the last verification pass failed for this node.
    pub is_invalid: bool,
    /// Whether the node ran during the current execution pass.
    pub is_compiled: bool,
    required_inputs: Vec<String>,
    custom_properties: IndexMap<String, Value>,
    widget_types: IndexMap<String, PropertyWidget>,
    accept_constraints: Vec<ConstraintRule>,
    reject_constraints: Vec<ConstraintRule>,
}

impl Node {
    /// Creates a blank node for the given template. Ports are added by the
    /// template's `setup_ports` hook afterwards.
    pub fn new(template: &dyn NodeTemplate) -> Self {
        Self {
            id: NodeId::new(),
            type_id: template.type_id().to_string(),
            name: template.default_name().to_string(),
            color: [13, 18, 23, 255],
            disabled: false,
            selected: false,
            visible: true,
            xy_pos: [0.0, 0.0],
            inputs: IndexMap::new(),
            outputs: IndexMap::new(),
            port_deletion_allowed: false,
            subgraph_session: None,
            is_exec: template.is_exec(),
            is_entry: template.is_entry(),
            is_invalid: false,
            is_compiled: false,
            required_inputs: Vec::new(),
            custom_properties: IndexMap::new(),
            widget_types: IndexMap::new(),
            accept_constraints: Vec::new(),
            reject_constraints: Vec::new(),
        }
    }

    /// Adds an input port.
    pub fn add_input(&mut self, port: Port) -> Result<(), NodeError> {
        debug_assert_eq!(port.direction, PortDirection::Input);
        if self.inputs.contains_key(&port.name) {
            return Err(NodeError::PortAlreadyExists(port.name));
        }
        self.inputs.insert(port.name.clone(), port);
        Ok(())
    }

    /// Adds an output port.
    pub fn add_output(&mut self, port: Port) -> Result<(), NodeError> {
        debug_assert_eq!(port.direction, PortDirection::Output);
        if self.outputs.contains_key(&port.name) {
            return Err(NodeError::PortAlreadyExists(port.name));
        }
        self.outputs.insert(port.name.clone(), port);
        Ok(())
    }

    /// Returns an input port by name.
    pub fn input(&self, name: &str) -> Option<&Port> {
        self.inputs.get(name)
    }

    /// Returns an output port by name.
    pub fn output(&self, name: &str) -> Option<&Port> {
        self.outputs.get(name)
    }

    /// Returns the port a handle points to, if it belongs to this node.
    pub fn port(&self, port_ref: &PortRef) -> Option<&Port> {
        match port_ref.direction {
            PortDirection::Input => self.inputs.get(&port_ref.name),
            PortDirection::Output => self.outputs.get(&port_ref.name),
        }
    }

    pub(crate) fn port_mut(&mut self, port_ref: &PortRef) -> Option<&mut Port> {
        match port_ref.direction {
            PortDirection::Input => self.inputs.get_mut(&port_ref.name),
            PortDirection::Output => self.outputs.get_mut(&port_ref.name),
        }
    }

    /// Marks an input port as required for verification.
    pub fn mark_input_required(&mut self, name: &str) -> Result<(), NodeError> {
        if !self.inputs.contains_key(name) {
            return Err(NodeError::PortNotFound(name.to_string()));
        }
        if !self.required_inputs.iter().any(|n| n == name) {
            self.required_inputs.push(name.to_string());
        }
        Ok(())
    }

    /// Names of the input ports that must be connected or carry a value.
    pub fn required_inputs(&self) -> &[String] {
        &self.required_inputs
    }

    /// Declares that only the given target may connect to one of this
    /// node type's ports. Merged into the graph-wide table on insertion.
    pub fn add_accept_constraint(
        &mut self,
        port_name: &str,
        direction: PortDirection,
        target: PortSpec,
    ) {
        self.accept_constraints.push(ConstraintRule {
            port: PortSpec::new(self.type_id.clone(), direction, port_name),
            target,
        });
    }

    /// Declares that the given target may never connect to one of this
    /// node type's ports. Merged into the graph-wide table on insertion.
    pub fn add_reject_constraint(
        &mut self,
        port_name: &str,
        direction: PortDirection,
        target: PortSpec,
    ) {
        self.reject_constraints.push(ConstraintRule {
            port: PortSpec::new(self.type_id.clone(), direction, port_name),
            target,
        });
    }

    pub(crate) fn accept_constraints(&self) -> &[ConstraintRule] {
        &self.accept_constraints
    }

    pub(crate) fn reject_constraints(&self) -> &[ConstraintRule] {
        &self.reject_constraints
    }

    /// Adds a custom property with an optional widget hint.
    pub fn add_property(
        &mut self,
        name: &str,
        value: Value,
        widget: Option<PropertyWidget>,
    ) -> Result<(), PropertyError> {
        if RESERVED_PROPERTIES.contains(&name) {
            return Err(PropertyError::Reserved(name.to_string()));
        }
        if self.custom_properties.contains_key(name) {
            return Err(PropertyError::AlreadyExists {
                node_type: self.type_id.clone(),
                name: name.to_string(),
            });
        }
        self.custom_properties.insert(name.to_string(), value);
        self.widget_types
            .insert(name.to_string(), widget.unwrap_or(PropertyWidget::Hidden));
        Ok(())
    }

    /// Returns whether a property name refers to a custom property.
    pub fn is_custom_property(&self, name: &str) -> bool {
        self.custom_properties.contains_key(name)
    }

    /// Returns the widget hint for a property, if one was declared.
    pub fn widget_type(&self, name: &str) -> Option<PropertyWidget> {
        self.widget_types.get(name).copied()
    }

    /// Returns a property value, builtin or custom.
    pub fn property(&self, name: &str) -> Option<Value> {
        match name {
            "name" => Some(Value::String(self.name.clone())),
            "color" => Some(color_value(self.color)),
            "disabled" => Some(Value::Bool(self.disabled)),
            "selected" => Some(Value::Bool(self.selected)),
            "visible" => Some(Value::Bool(self.visible)),
            "xy_pos" => Some(Value::List(vec![
                Value::Number(f64::from(self.xy_pos[0])),
                Value::Number(f64::from(self.xy_pos[1])),
            ])),
            _ => self.custom_properties.get(name).cloned(),
        }
    }

    /// Sets a property value, builtin or custom.
    ///
    /// This is the raw model mutation; go through the graph's
    /// `set_node_property` to make the change undoable.
    pub fn set_property(&mut self, name: &str, value: Value) -> Result<(), PropertyError> {
        match name {
            "name" => {
                if let Some(text) = value.as_str() {
                    self.name = text.to_string();
                }
            }
            "color" => {
                if let Some(color) = value_color(&value) {
                    self.color = color;
                }
            }
            "disabled" => self.disabled = value.as_bool().unwrap_or(self.disabled),
            "selected" => self.selected = value.as_bool().unwrap_or(self.selected),
            "visible" => self.visible = value.as_bool().unwrap_or(self.visible),
            "xy_pos" => {
                if let Some(items) = value.as_list() {
                    if let [Value::Number(x), Value::Number(y)] = items {
                        self.xy_pos = [*x as f32, *y as f32];
                    }
                }
            }
            _ => {
                let Some(slot) = self.custom_properties.get_mut(name) else {
                    return Err(PropertyError::NotFound {
                        node_type: self.type_id.clone(),
                        name: name.to_string(),
                    });
                };
                *slot = value;
            }
        }
        Ok(())
    }

    /// All custom properties in declaration order.
    pub fn custom_properties(&self) -> &IndexMap<String, Value> {
        &self.custom_properties
    }
}

/// Property names backed by builtin node fields.
const RESERVED_PROPERTIES: &[&str] = &[
    "id", "type", "name", "color", "disabled", "selected", "visible", "xy_pos", "inputs",
    "outputs",
];

fn color_value(color: [u8; 4]) -> Value {
    Value::List(color.iter().map(|c| Value::Number(f64::from(*c))).collect())
}

fn value_color(value: &Value) -> Option<[u8; 4]> {
    let items = value.as_list()?;
    if items.len() != 4 {
        return None;
    }
    let mut color = [0u8; 4];
    for (slot, item) in color.iter_mut().zip(items) {
        *slot = item.as_number()? as u8;
    }
    Some(color)
}

/// Behavior interface implemented once per node kind.
///
/// Templates are stateless and shared behind `Arc`; all per-node state
/// lives on the [`Node`] instance (ports and properties). The factory
/// constructs nodes by calling `setup_ports` and `setup_widgets` on a
/// blank instance.
pub trait NodeTemplate: Send + Sync {
    /// Registry key, a dotted identifier such as
    /// `"flowscript.nodes.BranchNode"`.
    fn type_id(&self) -> &'static str;

    /// Default display name for new instances.
    fn default_name(&self) -> &'static str;

    /// Palette category.
    fn category(&self) -> &'static str {
        "General"
    }

    /// Whether instances participate in the executable chain.
    fn is_exec(&self) -> bool {
        false
    }

    /// Whether instances mark the graph's execution entry point.
    fn is_entry(&self) -> bool {
        false
    }

    /// Declares the node's ports. Implementations overriding this for an
    /// executable node create the execution ports first via
    /// [`NodeTemplate::init_exec_ports`], then add their own.
    fn setup_ports(&self, node: &mut Node, factory: &NodeFactory) -> Result<(), RegistryError> {
        self.init_exec_ports(node, factory)
    }

    /// Creates the execution-flow port pair on executable nodes. The
    /// execution output is restricted to a single connection so the chain
    /// stays linear.
    fn init_exec_ports(&self, node: &mut Node, factory: &NodeFactory) -> Result<(), RegistryError> {
        if !self.is_exec() {
            return Ok(());
        }
        let exec = factory.data_type_by_name(crate::datatypes::EXEC)?;
        node.add_input(Port::input(EXEC_IN_PORT, exec))?;
        node.add_output(Port::output(EXEC_OUT_PORT, exec).with_multi_connection(false))?;
        Ok(())
    }

    /// Declares widget hints for the node's properties.
    fn setup_widgets(&self, _node: &mut Node) {}

    /// Returns whether the node is ready to execute. The default checks
    /// that every required input is connected or carries a value; failures
    /// are reported together, never one at a time.
    fn verify(&self, graph: &NodeGraph, node_id: NodeId) -> bool {
        verify_required_inputs(graph, node_id)
    }

    /// Runs the node's side effect. The default does nothing.
    fn execute(&self, _graph: &mut NodeGraph, _node_id: NodeId) -> Result<(), ExecutionError> {
        Ok(())
    }

    /// Returns the downstream execution chain starting at this node. The
    /// default follows the first connection of every execution output in
    /// declaration order.
    fn exec_queue(&self, graph: &NodeGraph, node_id: NodeId) -> VecDeque<NodeId> {
        let mut queue = VecDeque::from([node_id]);
        let Some(node) = graph.node(node_id) else {
            return queue;
        };
        for port in node.outputs.values().filter(|port| port.is_exec()) {
            let connections = port.connections();
            let Some(next) = connections.first() else {
                continue;
            };
            queue.extend(graph.exec_queue(next.node_id));
        }
        queue
    }

    /// Called after one of the node's input ports gained a connection.
    fn on_input_connected(
        &self,
        _graph: &mut NodeGraph,
        _node_id: NodeId,
        _input: &PortRef,
        _output: &PortRef,
    ) {
    }

    /// Called after one of the node's input ports lost a connection.
    fn on_input_disconnected(
        &self,
        _graph: &mut NodeGraph,
        _node_id: NodeId,
        _input: &PortRef,
        _output: &PortRef,
    ) {
    }

    /// Called after a node was restored from a session.
    fn post_deserialize(&self, _graph: &mut NodeGraph, _node_id: NodeId) {}
}

/// Checks that every required input of a node is connected or carries a
/// value. Problems are logged together, never one at a time.
pub fn verify_required_inputs(graph: &NodeGraph, node_id: NodeId) -> bool {
    let Some(node) = graph.node(node_id) else {
        return false;
    };
    let mut valid = true;
    for name in node.required_inputs() {
        let port_ref = PortRef::input(node_id, name.clone());
        let connected = node.input(name).is_some_and(Port::is_connected);
        if !connected && graph.port_value(&port_ref).is_empty() {
            tracing::debug!(node = %node.name, port = %name, "required input is missing");
            valid = false;
        }
    }
    valid
}

/// Error raised by node port mutations.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// A port with the same name already exists.
    #[error("port '{0}' already exists on the node")]
    PortAlreadyExists(String),

    /// No port with the given name exists.
    #[error("port '{0}' was not found on the node")]
    PortNotFound(String),
}

/// Error raised by the node property system.
#[derive(Debug, thiserror::Error)]
pub enum PropertyError {
    /// The name is backed by a builtin field and cannot be redeclared.
    #[error("property '{0}' is reserved")]
    Reserved(String),

    /// A custom property with the same name already exists.
    #[error("property '{name}' already exists on node type '{node_type}'")]
    AlreadyExists {
        /// Node type id.
        node_type: String,
        /// Property name.
        name: String,
    },

    /// No property with the given name exists.
    #[error("property '{name}' was not found on node type '{node_type}'")]
    NotFound {
        /// Node type id.
        node_type: String,
        /// Property name.
        name: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::DataType;

    struct Dummy;

    impl NodeTemplate for Dummy {
        fn type_id(&self) -> &'static str {
            "flowscript.tests.DummyNode"
        }

        fn default_name(&self) -> &'static str {
            "Dummy"
        }
    }

    #[test]
    fn test_duplicate_port_rejected() {
        let mut node = Node::new(&Dummy);
        node.add_input(Port::input("value", &DataType::numeric())).unwrap();
        let err = node.add_input(Port::input("value", &DataType::numeric()));
        assert!(matches!(err, Err(NodeError::PortAlreadyExists(_))));
    }

    #[test]
    fn test_reserved_property() {
        let mut node = Node::new(&Dummy);
        let err = node.add_property("name", Value::Null, None);
        assert!(matches!(err, Err(PropertyError::Reserved(_))));
    }

    #[test]
    fn test_duplicate_property() {
        let mut node = Node::new(&Dummy);
        node.add_property("count", Value::Number(1.0), None).unwrap();
        let err = node.add_property("count", Value::Number(2.0), None);
        assert!(matches!(err, Err(PropertyError::AlreadyExists { .. })));
    }

    #[test]
    fn test_unknown_property() {
        let mut node = Node::new(&Dummy);
        let err = node.set_property("missing", Value::Null);
        assert!(matches!(err, Err(PropertyError::NotFound { .. })));
    }

    #[test]
    fn test_builtin_property_round_trip() {
        let mut node = Node::new(&Dummy);
        node.set_property("name", Value::from("Renamed")).unwrap();
        assert_eq!(node.property("name"), Some(Value::from("Renamed")));

        node.set_property("disabled", Value::Bool(true)).unwrap();
        assert!(node.disabled);
    }

    #[test]
    fn test_required_input_bookkeeping() {
        let mut node = Node::new(&Dummy);
        node.add_input(Port::input("value", &DataType::any())).unwrap();
        node.mark_input_required("value").unwrap();
        node.mark_input_required("value").unwrap();
        assert_eq!(node.required_inputs(), ["value".to_string()]);
        assert!(matches!(
            node.mark_input_required("missing"),
            Err(NodeError::PortNotFound(_))
        ));
    }
}
