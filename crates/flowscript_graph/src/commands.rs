// SPDX-License-Identifier: MIT OR Apache-2.0
//! Reversible commands for every graph mutation.
//!
//! A command is created already bound to the entities it mutates, via
//! stable ids and port handles rather than references, so it can sit on
//! the undo stack indefinitely. `redo` moves the command from Unapplied to
//! Applied and `undo` back; the pair must restore graph state exactly.

use crate::datatypes::Value;
use crate::graph::{NodeGraph, Variable};
use crate::node::{Node, NodeId, PropertyError};
use crate::port::{PortDirection, PortRef};
use crate::registry::RegistryError;

/// Error raised when a command no longer binds to live graph state.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The bound node is no longer in the graph.
    #[error("node {0} is no longer in the graph")]
    NodeNotFound(NodeId),

    /// The bound port is no longer in the graph.
    #[error("port {0} is no longer in the graph")]
    PortNotFound(String),

    /// The bound variable is no longer in the graph.
    #[error("variable '{0}' is no longer in the graph")]
    VariableNotFound(String),

    /// Property mutation failed.
    #[error(transparent)]
    Property(#[from] PropertyError),

    /// Registry lookup failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// A reversible graph mutation.
pub trait GraphCommand: Send + Sync {
    /// Human-readable label shown in undo history.
    fn label(&self) -> &str;

    /// Applies the mutation.
    fn redo(&mut self, graph: &mut NodeGraph) -> Result<(), CommandError>;

    /// Reverts the mutation, restoring the state present before `redo`.
    fn undo(&mut self, graph: &mut NodeGraph) -> Result<(), CommandError>;
}

/// Ordered group of commands applied and reverted as one atomic unit.
pub struct MacroCommand {
    label: String,
    commands: Vec<Box<dyn GraphCommand>>,
}

impl MacroCommand {
    /// Creates an empty macro.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            commands: Vec::new(),
        }
    }

    /// Appends an already-executed command.
    pub fn push(&mut self, command: Box<dyn GraphCommand>) {
        self.commands.push(command);
    }

    /// Returns whether the macro holds no commands.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Number of grouped commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }
}

impl GraphCommand for MacroCommand {
    fn label(&self) -> &str {
        &self.label
    }

    fn redo(&mut self, graph: &mut NodeGraph) -> Result<(), CommandError> {
        for command in &mut self.commands {
            command.redo(graph)?;
        }
        Ok(())
    }

    fn undo(&mut self, graph: &mut NodeGraph) -> Result<(), CommandError> {
        for command in self.commands.iter_mut().rev() {
            command.undo(graph)?;
        }
        Ok(())
    }
}

/// Inserts a node into the graph.
pub struct AddNodeCommand {
    node_id: NodeId,
    node: Option<Node>,
}

impl AddNodeCommand {
    /// Creates the command owning the node to insert.
    pub fn new(node: Node) -> Self {
        Self {
            node_id: node.id,
            node: Some(node),
        }
    }
}

impl GraphCommand for AddNodeCommand {
    fn label(&self) -> &str {
        "Added Node"
    }

    fn redo(&mut self, graph: &mut NodeGraph) -> Result<(), CommandError> {
        let node = self
            .node
            .take()
            .ok_or(CommandError::NodeNotFound(self.node_id))?;
        graph.insert_node(node);
        Ok(())
    }

    fn undo(&mut self, graph: &mut NodeGraph) -> Result<(), CommandError> {
        let node = graph
            .take_node(self.node_id)
            .ok_or(CommandError::NodeNotFound(self.node_id))?;
        self.node = Some(node);
        Ok(())
    }
}

/// Removes nodes from the graph. Their ports must already be disconnected;
/// the disconnection commands are queued ahead of this one.
pub struct RemoveNodesCommand {
    label: String,
    node_ids: Vec<NodeId>,
    removed: Vec<Node>,
}

impl RemoveNodesCommand {
    /// Creates the command bound to the nodes to remove.
    pub fn new(node_ids: Vec<NodeId>) -> Self {
        let label = if node_ids.len() == 1 {
            "Removed Node"
        } else {
            "Removed Nodes"
        };
        Self {
            label: label.to_string(),
            node_ids,
            removed: Vec::new(),
        }
    }
}

impl GraphCommand for RemoveNodesCommand {
    fn label(&self) -> &str {
        &self.label
    }

    fn redo(&mut self, graph: &mut NodeGraph) -> Result<(), CommandError> {
        for node_id in &self.node_ids {
            let node = graph
                .take_node(*node_id)
                .ok_or(CommandError::NodeNotFound(*node_id))?;
            self.removed.push(node);
        }
        Ok(())
    }

    fn undo(&mut self, graph: &mut NodeGraph) -> Result<(), CommandError> {
        for node in self.removed.drain(..) {
            graph.insert_node(node);
        }
        Ok(())
    }
}

/// Moves a node to a new scene position.
pub struct NodeMovedCommand {
    label: String,
    node_id: NodeId,
    old_pos: [f32; 2],
    new_pos: [f32; 2],
}

impl NodeMovedCommand {
    /// Creates the command from the previous position; the new position is
    /// the one the node currently holds.
    pub fn new(node: &Node, old_pos: [f32; 2]) -> Self {
        Self {
            label: format!("Moved \"{}\".", node.name),
            node_id: node.id,
            old_pos,
            new_pos: node.xy_pos,
        }
    }
}

impl GraphCommand for NodeMovedCommand {
    fn label(&self) -> &str {
        &self.label
    }

    fn redo(&mut self, graph: &mut NodeGraph) -> Result<(), CommandError> {
        if self.new_pos == self.old_pos {
            return Ok(());
        }
        let node = graph
            .node_mut(self.node_id)
            .ok_or(CommandError::NodeNotFound(self.node_id))?;
        node.xy_pos = self.new_pos;
        Ok(())
    }

    fn undo(&mut self, graph: &mut NodeGraph) -> Result<(), CommandError> {
        let node = graph
            .node_mut(self.node_id)
            .ok_or(CommandError::NodeNotFound(self.node_id))?;
        node.xy_pos = self.old_pos;
        Ok(())
    }
}

/// Changes a node property, builtin or custom.
pub struct PropertyChangedCommand {
    label: String,
    node_id: NodeId,
    name: String,
    old_value: Value,
    new_value: Value,
}

impl PropertyChangedCommand {
    /// Creates the command, capturing the current value for undo.
    pub fn new(node: &Node, name: &str, old_value: Value, new_value: Value) -> Self {
        let label = if name == "name" {
            format!(
                "Renamed \"{}\" to \"{}\".",
                node.name,
                new_value.as_str().unwrap_or_default()
            )
        } else {
            format!("Property \"{}:{}\" changed.", node.name, name)
        };
        Self {
            label,
            node_id: node.id,
            name: name.to_string(),
            old_value,
            new_value,
        }
    }

    fn apply(&self, graph: &mut NodeGraph, value: &Value) -> Result<(), CommandError> {
        let node = graph
            .node_mut(self.node_id)
            .ok_or(CommandError::NodeNotFound(self.node_id))?;
        node.set_property(&self.name, value.clone())?;
        Ok(())
    }
}

impl GraphCommand for PropertyChangedCommand {
    fn label(&self) -> &str {
        &self.label
    }

    fn redo(&mut self, graph: &mut NodeGraph) -> Result<(), CommandError> {
        if self.old_value == self.new_value {
            return Ok(());
        }
        let value = self.new_value.clone();
        self.apply(graph, &value)
    }

    fn undo(&mut self, graph: &mut NodeGraph) -> Result<(), CommandError> {
        if self.old_value == self.new_value {
            return Ok(());
        }
        let value = self.old_value.clone();
        self.apply(graph, &value)
    }
}

fn record_connection(graph: &mut NodeGraph, a: &PortRef, b: &PortRef) -> Result<(), CommandError> {
    for (port, remote) in [(a, b), (b, a)] {
        let slot = graph
            .port_mut(port)
            .ok_or_else(|| CommandError::PortNotFound(port.to_string()))?;
        slot.connected_ports
            .entry(remote.node_id)
            .or_default()
            .push(remote.name.clone());
    }
    Ok(())
}

fn erase_connection(graph: &mut NodeGraph, a: &PortRef, b: &PortRef) -> Result<(), CommandError> {
    for (port, remote) in [(a, b), (b, a)] {
        let slot = graph
            .port_mut(port)
            .ok_or_else(|| CommandError::PortNotFound(port.to_string()))?;
        if let Some(names) = slot.connected_ports.get_mut(&remote.node_id) {
            if let Some(index) = names.iter().position(|name| name == &remote.name) {
                names.remove(index);
            }
            if names.is_empty() {
                slot.connected_ports.shift_remove(&remote.node_id);
            }
        }
    }
    Ok(())
}

/// Records a connection symmetrically on both endpoint ports.
pub struct PortConnectedCommand {
    source: PortRef,
    target: PortRef,
}

impl PortConnectedCommand {
    /// Creates the command bound to both endpoints.
    pub fn new(source: PortRef, target: PortRef) -> Self {
        Self { source, target }
    }
}

impl GraphCommand for PortConnectedCommand {
    fn label(&self) -> &str {
        "Connected Port"
    }

    fn redo(&mut self, graph: &mut NodeGraph) -> Result<(), CommandError> {
        record_connection(graph, &self.source, &self.target)
    }

    fn undo(&mut self, graph: &mut NodeGraph) -> Result<(), CommandError> {
        erase_connection(graph, &self.source, &self.target)
    }
}

/// Erases a connection symmetrically from both endpoint ports.
pub struct PortDisconnectedCommand {
    source: PortRef,
    target: PortRef,
}

impl PortDisconnectedCommand {
    /// Creates the command bound to both endpoints.
    pub fn new(source: PortRef, target: PortRef) -> Self {
        Self { source, target }
    }
}

impl GraphCommand for PortDisconnectedCommand {
    fn label(&self) -> &str {
        "Disconnected Port"
    }

    fn redo(&mut self, graph: &mut NodeGraph) -> Result<(), CommandError> {
        erase_connection(graph, &self.source, &self.target)
    }

    fn undo(&mut self, graph: &mut NodeGraph) -> Result<(), CommandError> {
        record_connection(graph, &self.source, &self.target)
    }
}

fn normalize_endpoints(a: PortRef, b: PortRef) -> (PortRef, PortRef) {
    if a.direction == PortDirection::Input {
        (a, b)
    } else {
        (b, a)
    }
}

fn notify_connected(graph: &mut NodeGraph, input: &PortRef, output: &PortRef) {
    if let Some(template) = graph.template_of(input.node_id) {
        template.on_input_connected(graph, input.node_id, input, output);
    }
}

fn notify_disconnected(graph: &mut NodeGraph, input: &PortRef, output: &PortRef) {
    if let Some(template) = graph.template_of(input.node_id) {
        template.on_input_disconnected(graph, input.node_id, input, output);
    }
}

/// Delivers the "input connected" notification to the input's node, letting
/// it recompute derived state; undo delivers the inverse notification.
pub struct NodeInputConnectedCommand {
    input: PortRef,
    output: PortRef,
}

impl NodeInputConnectedCommand {
    /// Creates the command; either endpoint order is accepted.
    pub fn new(a: PortRef, b: PortRef) -> Self {
        let (input, output) = normalize_endpoints(a, b);
        Self { input, output }
    }
}

impl GraphCommand for NodeInputConnectedCommand {
    fn label(&self) -> &str {
        "Input Connected"
    }

    fn redo(&mut self, graph: &mut NodeGraph) -> Result<(), CommandError> {
        notify_connected(graph, &self.input, &self.output);
        Ok(())
    }

    fn undo(&mut self, graph: &mut NodeGraph) -> Result<(), CommandError> {
        notify_disconnected(graph, &self.input, &self.output);
        Ok(())
    }
}

/// Delivers the "input disconnected" notification; undo delivers the
/// inverse.
pub struct NodeInputDisconnectedCommand {
    input: PortRef,
    output: PortRef,
}

impl NodeInputDisconnectedCommand {
    /// Creates the command; either endpoint order is accepted.
    pub fn new(a: PortRef, b: PortRef) -> Self {
        let (input, output) = normalize_endpoints(a, b);
        Self { input, output }
    }
}

impl GraphCommand for NodeInputDisconnectedCommand {
    fn label(&self) -> &str {
        "Input Disconnected"
    }

    fn redo(&mut self, graph: &mut NodeGraph) -> Result<(), CommandError> {
        notify_disconnected(graph, &self.input, &self.output);
        Ok(())
    }

    fn undo(&mut self, graph: &mut NodeGraph) -> Result<(), CommandError> {
        notify_connected(graph, &self.input, &self.output);
        Ok(())
    }
}

fn set_port_locked(graph: &mut NodeGraph, port: &PortRef, flag: bool) -> Result<(), CommandError> {
    let slot = graph
        .port_mut(port)
        .ok_or_else(|| CommandError::PortNotFound(port.to_string()))?;
    slot.locked = flag;
    Ok(())
}

/// Locks a port.
pub struct PortLockedCommand {
    label: String,
    port: PortRef,
}

impl PortLockedCommand {
    /// Creates the command bound to the port.
    pub fn new(port: PortRef) -> Self {
        Self {
            label: format!("Lock Port \"{}\"", port.name),
            port,
        }
    }
}

impl GraphCommand for PortLockedCommand {
    fn label(&self) -> &str {
        &self.label
    }

    fn redo(&mut self, graph: &mut NodeGraph) -> Result<(), CommandError> {
        set_port_locked(graph, &self.port, true)
    }

    fn undo(&mut self, graph: &mut NodeGraph) -> Result<(), CommandError> {
        set_port_locked(graph, &self.port, false)
    }
}

/// Unlocks a port.
pub struct PortUnlockedCommand {
    label: String,
    port: PortRef,
}

impl PortUnlockedCommand {
    /// Creates the command bound to the port.
    pub fn new(port: PortRef) -> Self {
        Self {
            label: format!("Unlock Port \"{}\"", port.name),
            port,
        }
    }
}

impl GraphCommand for PortUnlockedCommand {
    fn label(&self) -> &str {
        &self.label
    }

    fn redo(&mut self, graph: &mut NodeGraph) -> Result<(), CommandError> {
        set_port_locked(graph, &self.port, false)
    }

    fn undo(&mut self, graph: &mut NodeGraph) -> Result<(), CommandError> {
        set_port_locked(graph, &self.port, true)
    }
}

/// Shows or hides a port.
pub struct PortVisibleCommand {
    label: String,
    port: PortRef,
    visible: bool,
}

impl PortVisibleCommand {
    /// Creates the command bound to the port.
    pub fn new(port: PortRef, visible: bool) -> Self {
        let label = if visible {
            format!("Show Port \"{}\"", port.name)
        } else {
            format!("Hide Port \"{}\"", port.name)
        };
        Self {
            label,
            port,
            visible,
        }
    }

    fn apply(&self, graph: &mut NodeGraph, flag: bool) -> Result<(), CommandError> {
        let slot = graph
            .port_mut(&self.port)
            .ok_or_else(|| CommandError::PortNotFound(self.port.to_string()))?;
        slot.visible = flag;
        Ok(())
    }
}

impl GraphCommand for PortVisibleCommand {
    fn label(&self) -> &str {
        &self.label
    }

    fn redo(&mut self, graph: &mut NodeGraph) -> Result<(), CommandError> {
        self.apply(graph, self.visible)
    }

    fn undo(&mut self, graph: &mut NodeGraph) -> Result<(), CommandError> {
        self.apply(graph, !self.visible)
    }
}

/// Adds a variable to the graph.
pub struct AddVariableCommand {
    name: String,
    variable: Option<Variable>,
}

impl AddVariableCommand {
    /// Creates the command owning the variable to add.
    pub fn new(variable: Variable) -> Self {
        Self {
            name: variable.name.clone(),
            variable: Some(variable),
        }
    }
}

impl GraphCommand for AddVariableCommand {
    fn label(&self) -> &str {
        "Added Variable"
    }

    fn redo(&mut self, graph: &mut NodeGraph) -> Result<(), CommandError> {
        let variable = self
            .variable
            .take()
            .ok_or_else(|| CommandError::VariableNotFound(self.name.clone()))?;
        graph.insert_variable(variable);
        Ok(())
    }

    fn undo(&mut self, graph: &mut NodeGraph) -> Result<(), CommandError> {
        let variable = graph
            .take_variable(&self.name)
            .ok_or_else(|| CommandError::VariableNotFound(self.name.clone()))?;
        self.variable = Some(variable);
        Ok(())
    }
}

/// Removes variables from the graph.
pub struct RemoveVariablesCommand {
    label: String,
    names: Vec<String>,
    removed: Vec<Variable>,
}

impl RemoveVariablesCommand {
    /// Creates the command bound to the variables to remove.
    pub fn new(names: Vec<String>) -> Self {
        let label = if names.len() == 1 {
            "Removed Variable"
        } else {
            "Removed Variables"
        };
        Self {
            label: label.to_string(),
            names,
            removed: Vec::new(),
        }
    }
}

impl GraphCommand for RemoveVariablesCommand {
    fn label(&self) -> &str {
        &self.label
    }

    fn redo(&mut self, graph: &mut NodeGraph) -> Result<(), CommandError> {
        for name in &self.names {
            let variable = graph
                .take_variable(name)
                .ok_or_else(|| CommandError::VariableNotFound(name.clone()))?;
            self.removed.push(variable);
        }
        Ok(())
    }

    fn undo(&mut self, graph: &mut NodeGraph) -> Result<(), CommandError> {
        for variable in self.removed.drain(..) {
            graph.insert_variable(variable);
        }
        Ok(())
    }
}

/// Renames a variable and every Get/Set node referencing it by name.
pub struct RenameVariableCommand {
    label: String,
    old_name: String,
    new_name: String,
}

impl RenameVariableCommand {
    /// Creates the command; the new name is re-uniquified on redo.
    pub fn new(old_name: &str, new_name: &str) -> Self {
        Self {
            label: format!("Renamed Variable \"{old_name}\" to \"{new_name}\""),
            old_name: old_name.to_string(),
            new_name: new_name.to_string(),
        }
    }
}

impl GraphCommand for RenameVariableCommand {
    fn label(&self) -> &str {
        &self.label
    }

    fn redo(&mut self, graph: &mut NodeGraph) -> Result<(), CommandError> {
        self.new_name = graph.unique_variable_name(&self.new_name);
        let variable = graph
            .variable_mut(&self.old_name)
            .ok_or_else(|| CommandError::VariableNotFound(self.old_name.clone()))?;
        variable.name = self.new_name.clone();
        graph.rename_variable_references(&self.old_name, &self.new_name);
        Ok(())
    }

    fn undo(&mut self, graph: &mut NodeGraph) -> Result<(), CommandError> {
        let variable = graph
            .variable_mut(&self.new_name)
            .ok_or_else(|| CommandError::VariableNotFound(self.new_name.clone()))?;
        variable.name = self.old_name.clone();
        graph.rename_variable_references(&self.new_name, &self.old_name);
        Ok(())
    }
}

/// Changes a variable's data type, resetting its value to the new type's
/// default; undo restores the previous type and value.
pub struct VariableDataTypeChangedCommand {
    label: String,
    name: String,
    old_data_type: String,
    new_data_type: String,
    old_value: Value,
}

impl VariableDataTypeChangedCommand {
    /// Creates the command, capturing the variable's current state.
    pub fn new(variable: &Variable, new_data_type: &str) -> Self {
        Self {
            label: format!(
                "Changed data type of variable from \"{}\" to \"{}\".",
                variable.data_type, new_data_type
            ),
            name: variable.name.clone(),
            old_data_type: variable.data_type.clone(),
            new_data_type: new_data_type.to_string(),
            old_value: variable.value.clone(),
        }
    }
}

impl GraphCommand for VariableDataTypeChangedCommand {
    fn label(&self) -> &str {
        &self.label
    }

    fn redo(&mut self, graph: &mut NodeGraph) -> Result<(), CommandError> {
        if self.old_data_type == self.new_data_type {
            return Ok(());
        }
        let default = graph
            .factory()
            .data_type_by_name(&self.new_data_type)?
            .default
            .clone();
        let variable = graph
            .variable_mut(&self.name)
            .ok_or_else(|| CommandError::VariableNotFound(self.name.clone()))?;
        variable.data_type = self.new_data_type.clone();
        variable.value = default;
        graph.refresh_variable_nodes(&self.name);
        Ok(())
    }

    fn undo(&mut self, graph: &mut NodeGraph) -> Result<(), CommandError> {
        if self.old_data_type == self.new_data_type {
            return Ok(());
        }
        let variable = graph
            .variable_mut(&self.name)
            .ok_or_else(|| CommandError::VariableNotFound(self.name.clone()))?;
        variable.data_type = self.old_data_type.clone();
        variable.value = self.old_value.clone();
        graph.refresh_variable_nodes(&self.name);
        Ok(())
    }
}
