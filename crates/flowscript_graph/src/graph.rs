// SPDX-License-Identifier: MIT OR Apache-2.0
//! The node graph: node arena, variables, connection protocol and undo
//! orchestration.
//!
//! Every public mutation goes through a command pushed onto the graph's
//! undo stack (or executed immediately when `push_undo` is false). Direct
//! model access stays crate-private so the command layer remains the only
//! mutation path.

use std::collections::VecDeque;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::commands::{
    AddNodeCommand, AddVariableCommand, CommandError, GraphCommand, NodeInputConnectedCommand,
    NodeInputDisconnectedCommand, PortConnectedCommand, PortDisconnectedCommand,
    PortLockedCommand, PortUnlockedCommand, PortVisibleCommand, PropertyChangedCommand,
    RemoveNodesCommand, RemoveVariablesCommand, RenameVariableCommand,
    VariableDataTypeChangedCommand,
};
use crate::datatypes::{Value, NUMERIC};
use crate::history::{HistoryError, UndoStack};
use crate::node::{Node, NodeId, NodeTemplate, PropertyError};
use crate::nodes::function;
use crate::nodes::getset::{GetNode, SetNode, VALUE_PORT, VARIABLE_NAME_PROPERTY};
use crate::port::{ConstraintRule, ConstraintTable, Port, PortDirection, PortError, PortRef, PortSpec};
use crate::registry::{NodeFactory, RegistryError};

/// Error raised by graph operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// The factory could not produce a node for the given type id.
    #[error("could not create node for type '{0}'")]
    NodeCreation(String),

    /// No node with the given id exists in the graph.
    #[error("node {0} was not found in the graph")]
    NodeNotFound(NodeId),

    /// No variable with the given name exists in the graph.
    #[error("variable '{0}' was not found in the graph")]
    VariableNotFound(String),

    /// Port level failure.
    #[error(transparent)]
    Port(#[from] PortError),

    /// Undo stack failure.
    #[error(transparent)]
    History(#[from] HistoryError),

    /// Command failure.
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Property failure.
    #[error(transparent)]
    Property(#[from] PropertyError),

    /// Registry failure.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Session file i/o failure.
    #[error("session i/o failed: {0}")]
    Io(#[from] std::io::Error),

    /// Session data failure.
    #[error("invalid session data: {0}")]
    Json(#[from] serde_json::Error),
}

/// A graph-wide named value referenced by Get/Set nodes by name.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    /// Variable name, unique within the graph.
    pub name: String,
    /// Name of the registered data type.
    pub data_type: String,
    /// Current value.
    pub value: Value,
}

/// Options for [`NodeGraph::create_node_with_options`].
pub struct CreateNodeOptions {
    /// Display name; uniquified against existing nodes. Defaults to the
    /// template's name.
    pub name: Option<String>,
    /// Initial scene position.
    pub position: Option<[f32; 2]>,
    /// Whether the new node is selected, deselecting everything else.
    pub selected: bool,
    /// Function signature applied to function nodes.
    pub func_signature: Option<String>,
    /// Whether to push the creation onto the undo stack.
    pub push_undo: bool,
}

impl Default for CreateNodeOptions {
    fn default() -> Self {
        Self {
            name: None,
            position: None,
            selected: true,
            func_signature: None,
            push_undo: true,
        }
    }
}

/// The node graph.
///
/// Owns all nodes, the graph variables, the undo stack and the shared
/// per-node-type connection constraint tables. The factory handle is shared
/// so subgraphs resolve the same registries.
pub struct NodeGraph {
    factory: Arc<NodeFactory>,
    nodes: IndexMap<NodeId, Node>,
    variables: Vec<Variable>,
    undo_stack: UndoStack,
    accept_constraints: ConstraintTable,
    reject_constraints: ConstraintTable,
    acyclic: bool,
    session: String,
    is_executing: bool,
    sub_graphs: IndexMap<NodeId, NodeGraph>,
}

impl NodeGraph {
    /// Creates an empty graph backed by the given factory.
    pub fn new(factory: Arc<NodeFactory>) -> Self {
        Self {
            factory,
            nodes: IndexMap::new(),
            variables: Vec::new(),
            undo_stack: UndoStack::new(),
            accept_constraints: ConstraintTable::new(),
            reject_constraints: ConstraintTable::new(),
            acyclic: true,
            session: String::new(),
            is_executing: false,
            sub_graphs: IndexMap::new(),
        }
    }

    /// The shared factory.
    pub fn factory(&self) -> &Arc<NodeFactory> {
        &self.factory
    }

    /// Whether an execution pass is currently running.
    pub fn is_executing(&self) -> bool {
        self.is_executing
    }

    pub(crate) fn set_executing(&mut self, flag: bool) {
        self.is_executing = flag;
    }

    /// Whether the graph is meant to stay acyclic. Carried as data; the
    /// presentation layer enforces it while connections are dragged.
    pub fn acyclic(&self) -> bool {
        self.acyclic
    }

    /// Sets the acyclic flag.
    pub fn set_acyclic(&mut self, flag: bool) {
        self.acyclic = flag;
    }

    /// Path of the currently loaded session file, if any.
    pub fn session(&self) -> &str {
        &self.session
    }

    pub(crate) fn set_session(&mut self, session: impl Into<String>) {
        self.session = session.into();
    }

    // --- nodes

    /// Returns a node by id.
    pub fn node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    pub(crate) fn node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&node_id)
    }

    /// Returns the first node with the given display name.
    pub fn node_by_name(&self, name: &str) -> Option<&Node> {
        self.nodes.values().find(|node| node.name == name)
    }

    /// All nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// All node ids in insertion order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// Number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Ids of every node of the given type.
    pub fn nodes_by_type(&self, type_id: &str) -> Vec<NodeId> {
        self.nodes
            .values()
            .filter(|node| node.type_id == type_id)
            .map(|node| node.id)
            .collect()
    }

    pub(crate) fn insert_node(&mut self, node: Node) {
        self.nodes.insert(node.id, node);
    }

    pub(crate) fn take_node(&mut self, node_id: NodeId) -> Option<Node> {
        self.nodes.shift_remove(&node_id)
    }

    pub(crate) fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.values_mut()
    }

    /// Returns the behavior template registered for a node.
    pub fn template_of(&self, node_id: NodeId) -> Option<Arc<dyn NodeTemplate>> {
        let node = self.node(node_id)?;
        self.factory.template(&node.type_id)
    }

    /// Returns a graph-unique display name derived from the candidate.
    ///
    /// Internal whitespace is collapsed; on collision the smallest free
    /// positive integer suffix for the candidate's base name is appended,
    /// filling gaps before growing.
    pub fn unique_node_name(&self, name: &str) -> String {
        let name = name.split_whitespace().collect::<Vec<_>>().join(" ");
        let taken: Vec<&str> = self.nodes.values().map(|node| node.name.as_str()).collect();
        if !taken.contains(&name.as_str()) {
            return name;
        }

        let base = match name.rsplit_once(' ') {
            Some((head, tail))
                if !tail.is_empty() && tail.chars().all(|c| c.is_ascii_digit()) =>
            {
                head.to_string()
            }
            _ => name.clone(),
        };
        for index in 1..=taken.len() + 1 {
            let candidate = format!("{base} {index}");
            if !taken.contains(&candidate.as_str()) {
                return candidate;
            }
        }
        name
    }

    /// Creates a node from a registered type id or alias with default
    /// options, pushing the creation onto the undo stack.
    pub fn create_node(&mut self, type_id: &str) -> Result<NodeId, GraphError> {
        self.create_node_with_options(type_id, CreateNodeOptions::default())
    }

    /// Creates a node from a registered type id or alias.
    ///
    /// On factory failure nothing is inserted and the error carries the
    /// offending id.
    pub fn create_node_with_options(
        &mut self,
        type_id: &str,
        options: CreateNodeOptions,
    ) -> Result<NodeId, GraphError> {
        let mut node = self.factory.create_node(type_id).map_err(|error| {
            tracing::error!(%error, "node creation failed");
            GraphError::NodeCreation(type_id.to_string())
        })?;

        for rule in node.accept_constraints() {
            self.accept_constraints.add(rule.clone());
        }
        for rule in node.reject_constraints() {
            self.reject_constraints.add(rule.clone());
        }

        let requested = options.name.as_deref().unwrap_or(&node.name).to_string();
        node.name = self.unique_node_name(&requested);
        node.selected = options.selected;
        if let Some(position) = options.position {
            node.xy_pos = position;
        }
        if let Some(signature) = &options.func_signature {
            function::apply_signature(&mut node, &self.factory, signature)?;
        }

        let node_id = node.id;
        let label = format!("Create Node: \"{}\"", node.name);
        let selected_nodes: Vec<NodeId> = if options.selected {
            self.nodes
                .values()
                .filter(|other| other.selected)
                .map(|other| other.id)
                .collect()
        } else {
            Vec::new()
        };

        let command = Box::new(AddNodeCommand::new(node));
        if options.push_undo {
            self.begin_undo(&label);
            let mut result = Ok(());
            for other in selected_nodes {
                if result.is_ok() {
                    result = self.set_node_property(other, "selected", Value::Bool(false), true);
                }
            }
            if result.is_ok() {
                result = self.push_command(command);
            }
            self.end_undo();
            result?;
        } else {
            for other in selected_nodes {
                self.set_node_property(other, "selected", Value::Bool(false), false)?;
            }
            self.run_command(command)?;
        }
        Ok(node_id)
    }

    /// Deletes a node, disconnecting and unlocking its ports first. The
    /// whole teardown is one undo unit.
    pub fn delete_node(&mut self, node_id: NodeId, push_undo: bool) -> Result<(), GraphError> {
        let node = self
            .node(node_id)
            .ok_or(GraphError::NodeNotFound(node_id))?;
        let label = format!("Delete Node: \"{}\"", node.name);
        if push_undo {
            self.begin_undo(&label);
        }
        let result = self.teardown_nodes(&[node_id], push_undo);
        if push_undo {
            self.end_undo();
        }
        result
    }

    /// Deletes several nodes as one undo unit.
    pub fn delete_nodes(&mut self, node_ids: &[NodeId], push_undo: bool) -> Result<(), GraphError> {
        if node_ids.is_empty() {
            return Ok(());
        }
        if node_ids.len() == 1 {
            return self.delete_node(node_ids[0], push_undo);
        }
        if push_undo {
            self.begin_undo(&format!("Delete \"{}\" Node(s)", node_ids.len()));
        }
        let result = self.teardown_nodes(node_ids, push_undo);
        if push_undo {
            self.end_undo();
        }
        result
    }

    fn teardown_nodes(&mut self, node_ids: &[NodeId], push_undo: bool) -> Result<(), GraphError> {
        for node_id in node_ids {
            let Some(node) = self.node(*node_id) else {
                return Err(GraphError::NodeNotFound(*node_id));
            };
            let port_refs: Vec<PortRef> = node
                .inputs
                .keys()
                .map(|name| PortRef::input(*node_id, name.clone()))
                .chain(
                    node.outputs
                        .keys()
                        .map(|name| PortRef::output(*node_id, name.clone())),
                )
                .collect();
            for port_ref in port_refs {
                if self.port(&port_ref).is_some_and(|port| port.locked) {
                    self.set_port_locked(&port_ref, false, false, push_undo)?;
                }
                self.clear_port_connections(&port_ref, push_undo)?;
            }
        }
        let command = Box::new(RemoveNodesCommand::new(node_ids.to_vec()));
        if push_undo {
            self.push_command(command)
        } else {
            self.run_command(command)
        }
    }

    // --- properties

    /// Changes a node property through the command layer.
    pub fn set_node_property(
        &mut self,
        node_id: NodeId,
        name: &str,
        value: Value,
        push_undo: bool,
    ) -> Result<(), GraphError> {
        let node = self
            .node(node_id)
            .ok_or(GraphError::NodeNotFound(node_id))?;
        let old_value = node.property(name).ok_or_else(|| PropertyError::NotFound {
            node_type: node.type_id.clone(),
            name: name.to_string(),
        })?;
        if old_value == value {
            return Ok(());
        }
        let command = Box::new(PropertyChangedCommand::new(node, name, old_value, value));
        if push_undo {
            self.push_command(command)
        } else {
            self.run_command(command)
        }
    }

    // --- ports

    /// Resolves a port handle.
    pub fn port(&self, port_ref: &PortRef) -> Option<&Port> {
        self.nodes.get(&port_ref.node_id)?.port(port_ref)
    }

    pub(crate) fn port_mut(&mut self, port_ref: &PortRef) -> Option<&mut Port> {
        self.nodes.get_mut(&port_ref.node_id)?.port_mut(port_ref)
    }

    /// Handles of every port connected to the given one.
    pub fn connected_ports(&self, port_ref: &PortRef) -> Vec<PortRef> {
        self.port(port_ref)
            .map(Port::connections)
            .unwrap_or_default()
    }

    /// Reads a port value. An input pulls through its first connection
    /// lazily, one hop per level, without memoization; otherwise the stored
    /// value is returned.
    pub fn port_value(&self, port_ref: &PortRef) -> Value {
        let Some(port) = self.port(port_ref) else {
            return Value::Null;
        };
        if port.direction == PortDirection::Input {
            if let Some(source) = port.connections().first() {
                return self.port_value(source);
            }
        }
        port.value.clone()
    }

    /// Stores a value on a port. Execution-flow ports carry no value and
    /// writes of an equal value are dropped.
    pub fn set_port_value(&mut self, port_ref: &PortRef, value: Value) {
        let Some(port) = self.port_mut(port_ref) else {
            return;
        };
        if port.is_exec() || port.value == value {
            return;
        }
        port.value = value;
    }

    /// Re-types a port, resetting its stored value to the new type default.
    pub fn set_port_data_type(
        &mut self,
        port_ref: &PortRef,
        data_type: &str,
    ) -> Result<(), GraphError> {
        let descriptor = self.factory.data_type_by_name(data_type)?;
        let name = descriptor.name.clone();
        let default = descriptor.default.clone();
        let port = self
            .port_mut(port_ref)
            .ok_or_else(|| PortError::NotFound(port_ref.to_string()))?;
        if port.data_type != name {
            port.data_type = name;
            port.value = default;
        }
        Ok(())
    }

    /// Registers a push-style dependency: whenever `source` changes, its
    /// value is forwarded to `affected` by [`NodeGraph::update_affected`].
    pub fn set_port_affects(&mut self, source: &PortRef, affected: PortRef) {
        if let Some(port) = self.port_mut(source) {
            port.affected_ports.push(affected);
        }
    }

    /// Pushes a port's current value to all ports it affects.
    pub fn update_affected(&mut self, source: &PortRef) {
        let Some(port) = self.port(source) else {
            return;
        };
        if port.affected_ports.is_empty() {
            return;
        }
        let targets = port.affected_ports.clone();
        let value = self.port_value(source);
        for target in targets {
            self.set_port_value(&target, value.clone());
        }
    }

    pub(crate) fn update_affected_outputs(&mut self, node_id: NodeId) {
        let Some(node) = self.nodes.get(&node_id) else {
            return;
        };
        let inputs: Vec<PortRef> = node
            .inputs
            .keys()
            .map(|name| PortRef::input(node_id, name.clone()))
            .collect();
        for port_ref in inputs {
            self.update_affected(&port_ref);
        }
    }

    /// Locks or unlocks a port through the command layer, optionally
    /// spreading the state to its connected ports.
    pub fn set_port_locked(
        &mut self,
        port_ref: &PortRef,
        flag: bool,
        connected_ports: bool,
        push_undo: bool,
    ) -> Result<(), GraphError> {
        let port = self
            .port(port_ref)
            .ok_or_else(|| PortError::NotFound(port_ref.to_string()))?;
        if port.locked == flag {
            return Ok(());
        }
        let command: Box<dyn GraphCommand> = if flag {
            Box::new(PortLockedCommand::new(port_ref.clone()))
        } else {
            Box::new(PortUnlockedCommand::new(port_ref.clone()))
        };
        if push_undo {
            self.push_command(command)?;
        } else {
            self.run_command(command)?;
        }
        if connected_ports {
            for other in self.connected_ports(port_ref) {
                self.set_port_locked(&other, flag, false, push_undo)?;
            }
        }
        Ok(())
    }

    /// Shows or hides a port through the command layer.
    pub fn set_port_visible(
        &mut self,
        port_ref: &PortRef,
        visible: bool,
        push_undo: bool,
    ) -> Result<(), GraphError> {
        let port = self
            .port(port_ref)
            .ok_or_else(|| PortError::NotFound(port_ref.to_string()))?;
        if port.visible == visible {
            return Ok(());
        }
        let command = Box::new(PortVisibleCommand::new(port_ref.clone(), visible));
        if push_undo {
            self.push_command(command)
        } else {
            self.run_command(command)
        }
    }

    fn port_spec(&self, port_ref: &PortRef) -> Option<PortSpec> {
        let node = self.node(port_ref.node_id)?;
        Some(PortSpec::new(
            node.type_id.clone(),
            port_ref.direction,
            port_ref.name.clone(),
        ))
    }

    fn validate_accept_connection(&self, source: &PortRef, target: &PortRef) -> bool {
        for (own, other) in [(source, target), (target, source)] {
            let (Some(own_spec), Some(other_spec)) = (self.port_spec(own), self.port_spec(other))
            else {
                return false;
            };
            if self.accept_constraints.constrains(&own_spec)
                && !self.accept_constraints.matches(&own_spec, &other_spec)
            {
                return false;
            }
        }
        true
    }

    fn validate_reject_connection(&self, source: &PortRef, target: &PortRef) -> bool {
        for (own, other) in [(source, target), (target, source)] {
            let (Some(own_spec), Some(other_spec)) = (self.port_spec(own), self.port_spec(other))
            else {
                return false;
            };
            if self.reject_constraints.matches(&own_spec, &other_spec) {
                return false;
            }
        }
        true
    }

    /// Connects two ports.
    ///
    /// No-op when the pair is already connected or joins two ports of the
    /// same direction. Fails when either endpoint is locked; the error names
    /// the locked port. A connection falling outside the accept/reject
    /// constraint tables is rejected silently, like an invalid drag. On
    /// success the symmetric map update and the input-connected
    /// notification form one `"Connect Port"` undo unit.
    pub fn connect_ports(
        &mut self,
        source: &PortRef,
        target: &PortRef,
        push_undo: bool,
    ) -> Result<(), GraphError> {
        let source_port = self
            .port(source)
            .ok_or_else(|| PortError::NotFound(source.to_string()))?;
        let target_port = self
            .port(target)
            .ok_or_else(|| PortError::NotFound(target.to_string()))?;

        if source_port.is_connected_to(target) {
            return Ok(());
        }
        let locked_port = if source_port.locked {
            Some(source.name.clone())
        } else if target_port.locked {
            Some(target.name.clone())
        } else {
            None
        };
        if let Some(port) = locked_port {
            let node_type = self
                .node(source.node_id)
                .map(|node| node.type_id.clone())
                .unwrap_or_default();
            return Err(PortError::Locked { port, node_type }.into());
        }
        if source.direction == target.direction {
            return Ok(());
        }
        if !self.validate_accept_connection(source, target) {
            return Ok(());
        }
        if !self.validate_reject_connection(source, target) {
            return Ok(());
        }

        if push_undo {
            self.begin_undo("Connect Port");
            let result = self
                .push_command(Box::new(PortConnectedCommand::new(
                    source.clone(),
                    target.clone(),
                )))
                .and_then(|()| {
                    self.push_command(Box::new(NodeInputConnectedCommand::new(
                        source.clone(),
                        target.clone(),
                    )))
                });
            self.end_undo();
            result
        } else {
            self.run_command(Box::new(PortConnectedCommand::new(
                source.clone(),
                target.clone(),
            )))?;
            self.run_command(Box::new(NodeInputConnectedCommand::new(
                source.clone(),
                target.clone(),
            )))
        }
    }

    /// Disconnects two ports with the inverse macro of
    /// [`NodeGraph::connect_ports`].
    pub fn disconnect_ports(
        &mut self,
        source: &PortRef,
        target: &PortRef,
        push_undo: bool,
    ) -> Result<(), GraphError> {
        let source_port = self
            .port(source)
            .ok_or_else(|| PortError::NotFound(source.to_string()))?;
        let target_port = self
            .port(target)
            .ok_or_else(|| PortError::NotFound(target.to_string()))?;
        let locked_port = if source_port.locked {
            Some(source.name.clone())
        } else if target_port.locked {
            Some(target.name.clone())
        } else {
            None
        };
        if let Some(port) = locked_port {
            let node_type = self
                .node(source.node_id)
                .map(|node| node.type_id.clone())
                .unwrap_or_default();
            return Err(PortError::Locked { port, node_type }.into());
        }

        if push_undo {
            self.begin_undo("Disconnect Port");
            let result = self
                .push_command(Box::new(PortDisconnectedCommand::new(
                    source.clone(),
                    target.clone(),
                )))
                .and_then(|()| {
                    self.push_command(Box::new(NodeInputDisconnectedCommand::new(
                        source.clone(),
                        target.clone(),
                    )))
                });
            self.end_undo();
            result
        } else {
            self.run_command(Box::new(PortDisconnectedCommand::new(
                source.clone(),
                target.clone(),
            )))?;
            self.run_command(Box::new(NodeInputDisconnectedCommand::new(
                source.clone(),
                target.clone(),
            )))
        }
    }

    /// Disconnects a port from everything it is connected to, as one undo
    /// unit.
    pub fn clear_port_connections(
        &mut self,
        port_ref: &PortRef,
        push_undo: bool,
    ) -> Result<(), GraphError> {
        let port = self
            .port(port_ref)
            .ok_or_else(|| PortError::NotFound(port_ref.to_string()))?;
        if port.locked {
            let node_type = self
                .node(port_ref.node_id)
                .map(|node| node.type_id.clone())
                .unwrap_or_default();
            return Err(PortError::Locked {
                port: port_ref.name.clone(),
                node_type,
            }
            .into());
        }
        let connected = port.connections();
        if connected.is_empty() {
            return Ok(());
        }

        if push_undo {
            self.begin_undo(&format!("\"{}\" Clear Connections", port_ref.name));
            let mut result = Ok(());
            for other in connected {
                if result.is_ok() {
                    result = self.disconnect_ports(port_ref, &other, true);
                }
            }
            self.end_undo();
            result
        } else {
            for other in connected {
                self.disconnect_ports(port_ref, &other, false)?;
            }
            Ok(())
        }
    }

    // --- connection constraints

    /// Adds a shared accept rule: once a port is constrained, only listed
    /// targets may connect to it.
    pub fn add_accept_constraint(&mut self, rule: ConstraintRule) {
        self.accept_constraints.add(rule);
    }

    /// Adds a shared reject rule.
    pub fn add_reject_constraint(&mut self, rule: ConstraintRule) {
        self.reject_constraints.add(rule);
    }

    /// The shared accept table.
    pub fn accept_constraints(&self) -> &ConstraintTable {
        &self.accept_constraints
    }

    /// The shared reject table.
    pub fn reject_constraints(&self) -> &ConstraintTable {
        &self.reject_constraints
    }

    pub(crate) fn merge_constraint_tables(
        &mut self,
        accept: &ConstraintTable,
        reject: &ConstraintTable,
    ) {
        self.accept_constraints.merge(accept);
        self.reject_constraints.merge(reject);
    }

    // --- execution helpers

    /// Returns the execution chain reachable from the given node by
    /// following its execution outputs.
    pub fn exec_queue(&self, node_id: NodeId) -> VecDeque<NodeId> {
        match self.template_of(node_id) {
            Some(template) => template.exec_queue(self, node_id),
            None => VecDeque::new(),
        }
    }

    /// Id of the node attached to the first connection of the given
    /// execution output, if any.
    pub fn first_exec_connection(&self, node_id: NodeId, port_name: &str) -> Option<NodeId> {
        let port_ref = PortRef::output(node_id, port_name);
        self.connected_ports(&port_ref)
            .first()
            .map(|other| other.node_id)
    }

    // --- variables

    /// All graph variables in creation order.
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Returns a variable by name.
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|variable| variable.name == name)
    }

    pub(crate) fn variable_mut(&mut self, name: &str) -> Option<&mut Variable> {
        self.variables
            .iter_mut()
            .find(|variable| variable.name == name)
    }

    pub(crate) fn insert_variable(&mut self, variable: Variable) {
        self.variables.push(variable);
    }

    pub(crate) fn take_variable(&mut self, name: &str) -> Option<Variable> {
        let index = self
            .variables
            .iter()
            .position(|variable| variable.name == name)?;
        Some(self.variables.remove(index))
    }

    /// Returns a graph-unique variable name derived from the candidate.
    pub fn unique_variable_name(&self, name: &str) -> String {
        let taken: Vec<&str> = self
            .variables
            .iter()
            .map(|variable| variable.name.as_str())
            .collect();
        if !taken.contains(&name) {
            return name.to_string();
        }
        let mut index = 1;
        loop {
            let candidate = format!("{name}{index}");
            if !taken.contains(&candidate.as_str()) {
                return candidate;
            }
            index += 1;
        }
    }

    /// Creates a variable, defaulting to the numeric data type and the
    /// type's default value.
    pub fn create_variable(
        &mut self,
        name: &str,
        value: Option<Value>,
        data_type: Option<&str>,
        push_undo: bool,
    ) -> Result<String, GraphError> {
        let descriptor = self
            .factory
            .data_type_by_name(data_type.unwrap_or(NUMERIC))?;
        let data_type = descriptor.name.clone();
        let default = descriptor.default.clone();
        let name = self.unique_variable_name(name);
        let variable = Variable {
            name: name.clone(),
            data_type,
            value: value.unwrap_or(default),
        };
        let command = Box::new(AddVariableCommand::new(variable));
        if push_undo {
            self.begin_undo(&format!("Create Variable: \"{name}\""));
            let result = self.push_command(command);
            self.end_undo();
            result?;
        } else {
            self.run_command(command)?;
        }
        Ok(name)
    }

    /// Reads a variable value.
    pub fn variable_value(&self, name: &str) -> Option<&Value> {
        self.variable(name).map(|variable| &variable.value)
    }

    /// Writes a variable value and pushes it to every Get node referencing
    /// the variable.
    pub fn set_variable_value(&mut self, name: &str, value: Value) -> Result<(), GraphError> {
        let variable = self
            .variable_mut(name)
            .ok_or_else(|| GraphError::VariableNotFound(name.to_string()))?;
        variable.value = value.clone();
        for node_id in self.getter_nodes(name) {
            self.set_port_value(&PortRef::output(node_id, VALUE_PORT), value.clone());
        }
        Ok(())
    }

    /// Name of a variable's data type.
    pub fn variable_data_type(&self, name: &str) -> Option<&str> {
        self.variable(name).map(|variable| variable.data_type.as_str())
    }

    /// Changes a variable's data type through the command layer, resetting
    /// its value to the new type default.
    pub fn set_variable_data_type(
        &mut self,
        name: &str,
        data_type: &str,
        push_undo: bool,
    ) -> Result<(), GraphError> {
        let variable = self.variable(name).ok_or_else(|| {
            tracing::error!(variable = name, "cannot set data type for missing variable");
            GraphError::VariableNotFound(name.to_string())
        })?;
        let command = Box::new(VariableDataTypeChangedCommand::new(variable, data_type));
        if push_undo {
            self.push_command(command)
        } else {
            self.run_command(command)
        }
    }

    /// Renames a variable; the change propagates to every Get/Set node
    /// referencing it by name, on both redo and undo.
    pub fn rename_variable(
        &mut self,
        old_name: &str,
        new_name: &str,
        push_undo: bool,
    ) -> Result<(), GraphError> {
        if self.variable(old_name).is_none() {
            tracing::error!(variable = old_name, "cannot rename missing variable");
            return Err(GraphError::VariableNotFound(old_name.to_string()));
        }
        let command = Box::new(RenameVariableCommand::new(old_name, new_name));
        if push_undo {
            self.push_command(command)
        } else {
            self.run_command(command)
        }
    }

    /// Deletes a variable, marking every referencing Get/Set node invalid.
    pub fn delete_variable(&mut self, name: &str, push_undo: bool) -> Result<(), GraphError> {
        if self.variable(name).is_none() {
            tracing::error!(variable = name, "cannot delete missing variable");
            return Err(GraphError::VariableNotFound(name.to_string()));
        }
        if push_undo {
            self.begin_undo(&format!("Delete Variable: \"{name}\""));
        }
        let referents: Vec<NodeId> = self
            .getter_nodes(name)
            .into_iter()
            .chain(self.setter_nodes(name))
            .collect();
        for node_id in referents {
            if let Some(node) = self.node_mut(node_id) {
                node.is_invalid = true;
            }
        }
        let command = Box::new(RemoveVariablesCommand::new(vec![name.to_string()]));
        if push_undo {
            let result = self.push_command(command);
            self.end_undo();
            result
        } else {
            self.run_command(command)
        }
    }

    fn variable_reference_nodes(&self, type_id: &str, name: &str) -> Vec<NodeId> {
        self.nodes
            .values()
            .filter(|node| {
                node.type_id == type_id
                    && node
                        .property(VARIABLE_NAME_PROPERTY)
                        .and_then(|value| value.as_str().map(ToString::to_string))
                        .as_deref()
                        == Some(name)
            })
            .map(|node| node.id)
            .collect()
    }

    /// Ids of every Get node reading the given variable.
    pub fn getter_nodes(&self, name: &str) -> Vec<NodeId> {
        self.variable_reference_nodes(GetNode::TYPE_ID, name)
    }

    /// Ids of every Set node writing the given variable.
    pub fn setter_nodes(&self, name: &str) -> Vec<NodeId> {
        self.variable_reference_nodes(SetNode::TYPE_ID, name)
    }

    pub(crate) fn rename_variable_references(&mut self, old_name: &str, new_name: &str) {
        let referents: Vec<NodeId> = self
            .getter_nodes(old_name)
            .into_iter()
            .chain(self.setter_nodes(old_name))
            .collect();
        for node_id in referents {
            if let Some(node) = self.node_mut(node_id) {
                if let Err(error) =
                    node.set_property(VARIABLE_NAME_PROPERTY, Value::from(new_name))
                {
                    tracing::debug!(%error, "failed to update variable reference");
                }
            }
        }
    }

    pub(crate) fn refresh_variable_nodes(&mut self, name: &str) {
        let Some(variable) = self.variable(name) else {
            return;
        };
        let data_type = variable.data_type.clone();
        let value = variable.value.clone();
        for node_id in self.getter_nodes(name) {
            let out_ref = PortRef::output(node_id, VALUE_PORT);
            if let Err(error) = self.set_port_data_type(&out_ref, &data_type) {
                tracing::debug!(%error, "failed to retype getter port");
            }
            self.set_port_value(&out_ref, value.clone());
        }
        for node_id in self.setter_nodes(name) {
            for port_ref in [
                PortRef::input(node_id, VALUE_PORT),
                PortRef::output(node_id, VALUE_PORT),
            ] {
                if let Err(error) = self.set_port_data_type(&port_ref, &data_type) {
                    tracing::debug!(%error, "failed to retype setter port");
                }
            }
        }
    }

    // --- undo

    /// Opens an undo macro; everything pushed until [`NodeGraph::end_undo`]
    /// forms one atomic unit.
    pub fn begin_undo(&mut self, label: &str) {
        self.undo_stack.begin_macro(label);
    }

    /// Closes the innermost undo macro.
    pub fn end_undo(&mut self) {
        self.undo_stack.end_macro();
    }

    /// Executes a command and records it on the undo stack (inside the
    /// open macro, when one exists). This is the entry point a
    /// presentation layer uses for commands it constructs itself, such as
    /// a node move at the end of a drag.
    pub fn push_command(&mut self, mut command: Box<dyn GraphCommand>) -> Result<(), GraphError> {
        command.redo(self)?;
        self.undo_stack.add(command);
        Ok(())
    }

    pub(crate) fn run_command(
        &mut self,
        mut command: Box<dyn GraphCommand>,
    ) -> Result<(), GraphError> {
        command.redo(self)?;
        Ok(())
    }

    /// Reverts the most recent undo entry.
    pub fn undo(&mut self) -> Result<(), GraphError> {
        let mut command = self.undo_stack.take_undo()?;
        match command.undo(self) {
            Ok(()) => {
                self.undo_stack.store_redo(command);
                Ok(())
            }
            Err(error) => {
                self.undo_stack.store_undo(command);
                Err(error.into())
            }
        }
    }

    /// Re-applies the most recently undone entry.
    pub fn redo(&mut self) -> Result<(), GraphError> {
        let mut command = self.undo_stack.take_redo()?;
        match command.redo(self) {
            Ok(()) => {
                self.undo_stack.store_undo(command);
                Ok(())
            }
            Err(error) => {
                self.undo_stack.store_redo(command);
                Err(error.into())
            }
        }
    }

    /// Whether undo is available.
    pub fn can_undo(&self) -> bool {
        self.undo_stack.can_undo()
    }

    /// Whether redo is available.
    pub fn can_redo(&self) -> bool {
        self.undo_stack.can_redo()
    }

    /// Label of the next undo entry.
    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack.undo_description()
    }

    /// Label of the next redo entry.
    pub fn redo_description(&self) -> Option<&str> {
        self.undo_stack.redo_description()
    }

    /// Drops all undo history.
    pub fn clear_undo_stack(&mut self) {
        self.undo_stack.clear();
    }

    // --- subgraphs

    /// Materializes the nested session of a group node into a child graph
    /// sharing this graph's factory. Re-entrant: an already expanded group
    /// returns its live child.
    pub fn expand_group_node(&mut self, node_id: NodeId) -> Result<&mut NodeGraph, GraphError> {
        if !self.sub_graphs.contains_key(&node_id) {
            let session = self
                .node(node_id)
                .ok_or(GraphError::NodeNotFound(node_id))?
                .subgraph_session
                .clone();
            let mut child = NodeGraph::new(Arc::clone(&self.factory));
            if let Some(session) = session {
                child.deserialize_session(&session, false, true)?;
            }
            self.sub_graphs.insert(node_id, child);
        }
        self.sub_graphs
            .get_mut(&node_id)
            .ok_or(GraphError::NodeNotFound(node_id))
    }

    /// Serializes an expanded group node's child graph back into the node
    /// and drops the child.
    pub fn collapse_group_node(&mut self, node_id: NodeId) -> Result<(), GraphError> {
        let Some(child) = self.sub_graphs.shift_remove(&node_id) else {
            return Ok(());
        };
        let session = child.serialize_session();
        let node = self
            .node_mut(node_id)
            .ok_or(GraphError::NodeNotFound(node_id))?;
        node.subgraph_session = Some(Box::new(session));
        Ok(())
    }

    /// Returns the live child graph of an expanded group node.
    pub fn sub_graph(&self, node_id: NodeId) -> Option<&NodeGraph> {
        self.sub_graphs.get(&node_id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::commands::NodeMovedCommand;
    use crate::datatypes::ANY;

    struct SourceNode;

    impl NodeTemplate for SourceNode {
        fn type_id(&self) -> &'static str {
            "flowscript.tests.SourceNode"
        }

        fn default_name(&self) -> &'static str {
            "Source"
        }

        fn setup_ports(
            &self,
            node: &mut Node,
            factory: &NodeFactory,
        ) -> Result<(), RegistryError> {
            node.add_output(Port::output("out", factory.data_type_by_name(NUMERIC)?))?;
            Ok(())
        }
    }

    struct SinkNode;

    impl NodeTemplate for SinkNode {
        fn type_id(&self) -> &'static str {
            "flowscript.tests.SinkNode"
        }

        fn default_name(&self) -> &'static str {
            "Sink"
        }

        fn setup_ports(
            &self,
            node: &mut Node,
            factory: &NodeFactory,
        ) -> Result<(), RegistryError> {
            let any = factory.data_type_by_name(ANY)?;
            node.add_input(Port::input("in", any))?;
            node.add_input(Port::input("in2", any))?;
            node.add_output(Port::output("echo", any))?;
            Ok(())
        }
    }

    /// Declares an allow-list: its input only accepts a Source node's
    /// "out" port.
    struct PickyNode;

    impl NodeTemplate for PickyNode {
        fn type_id(&self) -> &'static str {
            "flowscript.tests.PickyNode"
        }

        fn default_name(&self) -> &'static str {
            "Picky"
        }

        fn setup_ports(
            &self,
            node: &mut Node,
            factory: &NodeFactory,
        ) -> Result<(), RegistryError> {
            node.add_input(Port::input("in", factory.data_type_by_name(ANY)?))?;
            node.add_accept_constraint(
                "in",
                PortDirection::Input,
                PortSpec::new("flowscript.tests.SourceNode", PortDirection::Output, "out"),
            );
            Ok(())
        }
    }

    fn test_graph() -> NodeGraph {
        let mut factory = NodeFactory::new();
        factory.register_node(Arc::new(SourceNode), None).unwrap();
        factory.register_node(Arc::new(SinkNode), None).unwrap();
        factory.register_node(Arc::new(PickyNode), None).unwrap();
        NodeGraph::new(Arc::new(factory))
    }

    fn named_nodes(graph: &mut NodeGraph, names: &[&str]) {
        for name in names {
            let node_id = graph.create_node("flowscript.tests.SourceNode").unwrap();
            graph.node_mut(node_id).unwrap().name = (*name).to_string();
        }
    }

    #[test]
    fn test_unique_node_name_fills_gaps() {
        let mut graph = test_graph();
        named_nodes(&mut graph, &["Node 1", "Node 2", "Node 3"]);
        assert_eq!(graph.unique_node_name("Node 2"), "Node 4");
    }

    #[test]
    fn test_unique_node_name_normalizes_whitespace() {
        let graph = test_graph();
        assert_eq!(graph.unique_node_name("   Node  3  "), "Node 3");
    }

    #[test]
    fn test_unique_node_name_without_suffix() {
        let mut graph = test_graph();
        named_nodes(&mut graph, &["Render", "Render 1"]);
        assert_eq!(graph.unique_node_name("Render"), "Render 2");
    }

    #[test]
    fn test_connect_then_disconnect_restores_state() {
        let mut graph = test_graph();
        let source = graph.create_node("flowscript.tests.SourceNode").unwrap();
        let sink = graph.create_node("flowscript.tests.SinkNode").unwrap();
        let out_ref = PortRef::output(source, "out");
        let in_ref = PortRef::input(sink, "in");

        let before_out = graph.port(&out_ref).unwrap().connected_ports.clone();
        let before_in = graph.port(&in_ref).unwrap().connected_ports.clone();

        graph.connect_ports(&out_ref, &in_ref, true).unwrap();
        assert!(graph.port(&out_ref).unwrap().is_connected_to(&in_ref));
        assert!(graph.port(&in_ref).unwrap().is_connected_to(&out_ref));

        graph.disconnect_ports(&out_ref, &in_ref, true).unwrap();
        assert_eq!(graph.port(&out_ref).unwrap().connected_ports, before_out);
        assert_eq!(graph.port(&in_ref).unwrap().connected_ports, before_in);
    }

    #[test]
    fn test_connect_twice_does_not_duplicate() {
        let mut graph = test_graph();
        let source = graph.create_node("flowscript.tests.SourceNode").unwrap();
        let sink = graph.create_node("flowscript.tests.SinkNode").unwrap();
        let out_ref = PortRef::output(source, "out");
        let in_ref = PortRef::input(sink, "in");

        graph.connect_ports(&out_ref, &in_ref, true).unwrap();
        graph.connect_ports(&out_ref, &in_ref, true).unwrap();
        graph.connect_ports(&in_ref, &out_ref, true).unwrap();
        assert_eq!(graph.connected_ports(&out_ref).len(), 1);
        assert_eq!(graph.connected_ports(&in_ref).len(), 1);
    }

    #[test]
    fn test_locked_port_refuses_connection() {
        let mut graph = test_graph();
        let source = graph.create_node("flowscript.tests.SourceNode").unwrap();
        let sink = graph.create_node("flowscript.tests.SinkNode").unwrap();
        let out_ref = PortRef::output(source, "out");
        let in_ref = PortRef::input(sink, "in");

        graph.set_port_locked(&in_ref, true, false, true).unwrap();
        let err = graph.connect_ports(&out_ref, &in_ref, true);
        assert!(matches!(
            err,
            Err(GraphError::Port(PortError::Locked { .. }))
        ));
        assert!(graph.connected_ports(&in_ref).is_empty());
        assert!(graph.connected_ports(&out_ref).is_empty());
    }

    #[test]
    fn test_locked_port_refuses_disconnection() {
        let mut graph = test_graph();
        let source = graph.create_node("flowscript.tests.SourceNode").unwrap();
        let sink = graph.create_node("flowscript.tests.SinkNode").unwrap();
        let out_ref = PortRef::output(source, "out");
        let in_ref = PortRef::input(sink, "in");

        graph.connect_ports(&out_ref, &in_ref, true).unwrap();
        graph.set_port_locked(&in_ref, true, false, true).unwrap();
        let err = graph.disconnect_ports(&out_ref, &in_ref, true);
        assert!(matches!(
            err,
            Err(GraphError::Port(PortError::Locked { .. }))
        ));
        assert_eq!(graph.connected_ports(&in_ref).len(), 1);
    }

    #[test]
    fn test_accept_constraint_rejects_silently() {
        let mut graph = test_graph();
        let source = graph.create_node("flowscript.tests.SourceNode").unwrap();
        let sink = graph.create_node("flowscript.tests.SinkNode").unwrap();
        let picky = graph.create_node("flowscript.tests.PickyNode").unwrap();
        let picky_in = PortRef::input(picky, "in");

        // A sink node's output is not on the allow-list: silently ignored.
        let sink_echo = PortRef::output(sink, "echo");
        graph.connect_ports(&sink_echo, &picky_in, true).unwrap();
        assert!(graph.connected_ports(&picky_in).is_empty());

        // The allowed source connects normally.
        let out_ref = PortRef::output(source, "out");
        graph.connect_ports(&out_ref, &picky_in, true).unwrap();
        assert_eq!(graph.connected_ports(&picky_in).len(), 1);
    }

    #[test]
    fn test_reject_constraint_rejects_silently() {
        let mut graph = test_graph();
        let source = graph.create_node("flowscript.tests.SourceNode").unwrap();
        let sink = graph.create_node("flowscript.tests.SinkNode").unwrap();
        graph.add_reject_constraint(ConstraintRule {
            port: PortSpec::new("flowscript.tests.SinkNode", PortDirection::Input, "in"),
            target: PortSpec::new("flowscript.tests.SourceNode", PortDirection::Output, "out"),
        });

        let out_ref = PortRef::output(source, "out");
        let in_ref = PortRef::input(sink, "in");
        graph.connect_ports(&out_ref, &in_ref, true).unwrap();
        assert!(graph.connected_ports(&in_ref).is_empty());
    }

    #[test]
    fn test_add_node_undo_symmetry() {
        let mut graph = test_graph();
        let node_id = graph.create_node("flowscript.tests.SourceNode").unwrap();
        assert_eq!(graph.node_count(), 1);

        graph.undo().unwrap();
        assert_eq!(graph.node_count(), 0);

        graph.redo().unwrap();
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.node(node_id).unwrap().name, "Source");
    }

    #[test]
    fn test_remove_node_undo_restores_connections() {
        let mut graph = test_graph();
        let source = graph.create_node("flowscript.tests.SourceNode").unwrap();
        let sink = graph.create_node("flowscript.tests.SinkNode").unwrap();
        let out_ref = PortRef::output(source, "out");
        let in_ref = PortRef::input(sink, "in");
        graph.connect_ports(&out_ref, &in_ref, true).unwrap();

        graph.delete_node(sink, true).unwrap();
        assert!(graph.node(sink).is_none());
        assert!(graph.connected_ports(&out_ref).is_empty());

        graph.undo().unwrap();
        assert!(graph.node(sink).is_some());
        assert_eq!(graph.connected_ports(&out_ref), vec![in_ref.clone()]);
        assert_eq!(graph.connected_ports(&in_ref), vec![out_ref.clone()]);
    }

    #[test]
    fn test_lazy_value_pull_reflects_upstream() {
        let mut graph = test_graph();
        let source = graph.create_node("flowscript.tests.SourceNode").unwrap();
        let sink = graph.create_node("flowscript.tests.SinkNode").unwrap();
        let out_ref = PortRef::output(source, "out");
        let in_ref = PortRef::input(sink, "in");

        graph.set_port_value(&in_ref, Value::Number(1.0));
        assert_eq!(graph.port_value(&in_ref), Value::Number(1.0));

        graph.connect_ports(&out_ref, &in_ref, true).unwrap();
        graph.set_port_value(&out_ref, Value::Number(7.0));
        assert_eq!(graph.port_value(&in_ref), Value::Number(7.0));

        // Not memoized: a later upstream write is seen immediately.
        graph.set_port_value(&out_ref, Value::Number(9.0));
        assert_eq!(graph.port_value(&in_ref), Value::Number(9.0));
    }

    #[test]
    fn test_affects_pushes_values_forward() {
        let mut graph = test_graph();
        let sink = graph.create_node("flowscript.tests.SinkNode").unwrap();
        let first = PortRef::input(sink, "in");
        let second = PortRef::input(sink, "in2");

        graph.set_port_affects(&first, second.clone());
        graph.set_port_value(&first, Value::Number(4.0));
        graph.update_affected(&first);
        assert_eq!(graph.port_value(&second), Value::Number(4.0));
    }

    #[test]
    fn test_property_command_cycles() {
        let mut graph = test_graph();
        let node_id = graph.create_node("flowscript.tests.SourceNode").unwrap();
        graph
            .set_node_property(node_id, "name", Value::from("Renamed"), true)
            .unwrap();
        assert_eq!(graph.node(node_id).unwrap().name, "Renamed");

        for _ in 0..3 {
            graph.undo().unwrap();
            assert_eq!(graph.node(node_id).unwrap().name, "Source");
            graph.redo().unwrap();
            assert_eq!(graph.node(node_id).unwrap().name, "Renamed");
        }
    }

    #[test]
    fn test_macro_groups_mutations_into_one_undo() {
        let mut graph = test_graph();
        let node_id = graph.create_node("flowscript.tests.SourceNode").unwrap();

        graph.begin_undo("Edit Node");
        graph
            .set_node_property(node_id, "name", Value::from("A"), true)
            .unwrap();
        graph
            .set_node_property(node_id, "disabled", Value::Bool(true), true)
            .unwrap();
        graph.end_undo();

        graph.undo().unwrap();
        let node = graph.node(node_id).unwrap();
        assert_eq!(node.name, "Source");
        assert!(!node.disabled);
    }

    #[test]
    fn test_connect_macro_is_atomic() {
        let mut graph = test_graph();
        let source = graph.create_node("flowscript.tests.SourceNode").unwrap();
        let sink = graph.create_node("flowscript.tests.SinkNode").unwrap();
        let out_ref = PortRef::output(source, "out");
        let in_ref = PortRef::input(sink, "in");

        graph.connect_ports(&out_ref, &in_ref, true).unwrap();
        assert_eq!(graph.undo_description(), Some("Connect Port"));
        graph.undo().unwrap();
        assert!(graph.connected_ports(&out_ref).is_empty());
        graph.redo().unwrap();
        assert_eq!(graph.connected_ports(&out_ref).len(), 1);
    }

    #[test]
    fn test_same_direction_connection_is_ignored() {
        let mut graph = test_graph();
        let sink = graph.create_node("flowscript.tests.SinkNode").unwrap();
        let first = PortRef::input(sink, "in");
        let second = PortRef::input(sink, "in2");
        graph.connect_ports(&first, &second, true).unwrap();
        assert!(graph.connected_ports(&first).is_empty());
    }

    #[test]
    fn test_variable_lifecycle_with_undo() {
        let mut graph = test_graph();
        let name = graph.create_variable("speed", None, None, true).unwrap();
        assert_eq!(name, "speed");
        assert_eq!(graph.variable_value("speed"), Some(&Value::Number(0.0)));

        // Colliding names grow a numeric suffix.
        let second = graph.create_variable("speed", None, None, true).unwrap();
        assert_eq!(second, "speed1");

        graph.undo().unwrap();
        assert!(graph.variable("speed1").is_none());
        graph.redo().unwrap();
        assert!(graph.variable("speed1").is_some());
    }

    #[test]
    fn test_variable_data_type_change_round_trips_value() {
        let mut graph = test_graph();
        graph.create_variable("flag", None, None, false).unwrap();
        graph
            .set_variable_value("flag", Value::Number(5.0))
            .unwrap();

        graph
            .set_variable_data_type("flag", crate::datatypes::BOOLEAN, true)
            .unwrap();
        assert_eq!(graph.variable_data_type("flag"), Some("Boolean"));
        assert_eq!(graph.variable_value("flag"), Some(&Value::Bool(false)));

        graph.undo().unwrap();
        assert_eq!(graph.variable_data_type("flag"), Some("Numeric"));
        assert_eq!(graph.variable_value("flag"), Some(&Value::Number(5.0)));
    }

    #[test]
    fn test_port_visibility_and_lock_commands() {
        let mut graph = test_graph();
        let source = graph.create_node("flowscript.tests.SourceNode").unwrap();
        let sink = graph.create_node("flowscript.tests.SinkNode").unwrap();
        let out_ref = PortRef::output(source, "out");
        let in_ref = PortRef::input(sink, "in");

        graph.set_port_visible(&in_ref, false, true).unwrap();
        assert!(!graph.port(&in_ref).unwrap().visible);
        graph.undo().unwrap();
        assert!(graph.port(&in_ref).unwrap().visible);

        // Locking with propagation spreads to connected ports.
        graph.connect_ports(&out_ref, &in_ref, true).unwrap();
        graph.set_port_locked(&in_ref, true, true, true).unwrap();
        assert!(graph.port(&in_ref).unwrap().locked);
        assert!(graph.port(&out_ref).unwrap().locked);
    }

    #[test]
    fn test_node_moved_command_round_trip() {
        let mut graph = test_graph();
        let node_id = graph.create_node("flowscript.tests.SourceNode").unwrap();
        let old_pos = graph.node(node_id).unwrap().xy_pos;

        graph.node_mut(node_id).unwrap().xy_pos = [120.0, 40.0];
        let command = Box::new(NodeMovedCommand::new(graph.node(node_id).unwrap(), old_pos));
        graph.push_command(command).unwrap();

        graph.undo().unwrap();
        assert_eq!(graph.node(node_id).unwrap().xy_pos, old_pos);
        graph.redo().unwrap();
        assert_eq!(graph.node(node_id).unwrap().xy_pos, [120.0, 40.0]);
    }

    #[test]
    fn test_create_node_unknown_type_fails_cleanly() {
        let mut graph = test_graph();
        let err = graph.create_node("flowscript.tests.Missing");
        assert!(matches!(err, Err(GraphError::NodeCreation(_))));
        assert_eq!(graph.node_count(), 0);
        assert!(!graph.can_undo());
    }
}
