// SPDX-License-Identifier: MIT OR Apache-2.0
//! Session persistence: the JSON-compatible serialized form of a graph.
//!
//! Only ports with at least one connection are emitted per node record;
//! nodes allowing dynamic port deletion additionally persist their full
//! port layout so it can be rebuilt before connections are restored.

use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::datatypes::Value;
use crate::graph::{CreateNodeOptions, GraphError, NodeGraph};
use crate::node::NodeId;
use crate::nodes::function::FUNC_SIGNATURE_PROPERTY;
use crate::port::{ConstraintTable, Port, PortDirection, PortRef};

/// Serialized session of a whole graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    /// Graph-wide settings.
    #[serde(default)]
    pub graph: GraphRecord,
    /// Node records keyed by serialized node id.
    #[serde(default)]
    pub nodes: IndexMap<String, NodeRecord>,
    /// Flattened connection list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connections: Vec<ConnectionRecord>,
    /// Variable records keyed by name.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub variables: IndexMap<String, VariableRecord>,
}

/// Graph-wide settings carried by a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphRecord {
    /// Whether the graph is meant to stay acyclic.
    pub acyclic: bool,
    /// Shared accept constraint table.
    #[serde(default, skip_serializing_if = "ConstraintTable::is_empty")]
    pub accept_connection_types: ConstraintTable,
    /// Shared reject constraint table.
    #[serde(default, skip_serializing_if = "ConstraintTable::is_empty")]
    pub reject_connection_types: ConstraintTable,
}

impl Default for GraphRecord {
    fn default() -> Self {
        Self {
            acyclic: true,
            accept_connection_types: ConstraintTable::new(),
            reject_connection_types: ConstraintTable::new(),
        }
    }
}

/// One endpoint pair of a serialized connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    /// Input endpoint as (node id, port name).
    #[serde(rename = "in")]
    pub input: (String, String),
    /// Output endpoint as (node id, port name).
    #[serde(rename = "out")]
    pub output: (String, String),
}

/// Serialized form of a single node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Display name.
    pub name: String,
    /// Registered node type id.
    #[serde(rename = "type")]
    pub type_id: String,
    /// Node body color.
    #[serde(default = "default_color")]
    pub color: [u8; 4],
    /// Whether the node is bypassed.
    #[serde(default)]
    pub disabled: bool,
    /// Whether the node is shown.
    #[serde(default = "default_visible")]
    pub visible: bool,
    /// Scene position.
    #[serde(default)]
    pub xy_pos: [f32; 2],
    /// Custom properties.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub custom: IndexMap<String, Value>,
    /// Connected input ports: port name to (target node id -> target port
    /// names).
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub inputs: IndexMap<String, IndexMap<String, Vec<String>>>,
    /// Connected output ports, same layout as `inputs`.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub outputs: IndexMap<String, IndexMap<String, Vec<String>>>,
    /// Full input port layout, present only for nodes allowing dynamic
    /// port deletion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_ports: Option<Vec<PortRecord>>,
    /// Full output port layout, present only for nodes allowing dynamic
    /// port deletion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_ports: Option<Vec<PortRecord>>,
    /// Nested session for group nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subgraph_session: Option<Box<SessionData>>,
}

fn default_color() -> [u8; 4] {
    [13, 18, 23, 255]
}

fn default_visible() -> bool {
    true
}

/// Serialized port descriptor for dynamic-port nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRecord {
    /// Port name.
    pub name: String,
    /// Registered data type name.
    pub data_type: String,
    /// Whether multiple connections are allowed.
    pub multi_connection: bool,
    /// Whether the port label is shown.
    pub display_name: bool,
}

/// Serialized form of a graph variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableRecord {
    /// Registered data type name.
    pub data_type: String,
    /// Stored value.
    pub value: Value,
}

fn connected_map(port: &Port) -> IndexMap<String, Vec<String>> {
    port.connected_ports
        .iter()
        .filter(|(_, names)| !names.is_empty())
        .map(|(node_id, names)| (node_id.to_string(), names.clone()))
        .collect()
}

fn port_records(ports: &IndexMap<String, Port>) -> Vec<PortRecord> {
    ports
        .values()
        .map(|port| PortRecord {
            name: port.name.clone(),
            data_type: port.data_type.clone(),
            multi_connection: port.multi_connection,
            display_name: port.display_name,
        })
        .collect()
}

impl NodeGraph {
    /// Serializes the whole graph into a session.
    pub fn serialize_session(&self) -> SessionData {
        let mut data = SessionData {
            graph: GraphRecord {
                acyclic: self.acyclic(),
                accept_connection_types: self.accept_constraints().clone(),
                reject_connection_types: self.reject_constraints().clone(),
            },
            ..SessionData::default()
        };

        for node in self.nodes() {
            let mut record = NodeRecord {
                name: node.name.clone(),
                type_id: node.type_id.clone(),
                color: node.color,
                disabled: node.disabled,
                visible: node.visible,
                xy_pos: node.xy_pos,
                custom: node.custom_properties().clone(),
                inputs: IndexMap::new(),
                outputs: IndexMap::new(),
                input_ports: None,
                output_ports: None,
                subgraph_session: node.subgraph_session.clone(),
            };
            for (name, port) in &node.inputs {
                let connected = connected_map(port);
                if !connected.is_empty() {
                    record.inputs.insert(name.clone(), connected);
                }
            }
            for (name, port) in &node.outputs {
                let connected = connected_map(port);
                if !connected.is_empty() {
                    record.outputs.insert(name.clone(), connected);
                }
            }
            if node.port_deletion_allowed {
                record.input_ports = Some(port_records(&node.inputs));
                record.output_ports = Some(port_records(&node.outputs));
            }

            let node_key = node.id.to_string();
            for (port_name, connected) in &record.inputs {
                for (target_key, target_ports) in connected {
                    for target_port in target_ports {
                        let connection = ConnectionRecord {
                            input: (node_key.clone(), port_name.clone()),
                            output: (target_key.clone(), target_port.clone()),
                        };
                        if !data.connections.contains(&connection) {
                            data.connections.push(connection);
                        }
                    }
                }
            }
            for (port_name, connected) in &record.outputs {
                for (target_key, target_ports) in connected {
                    for target_port in target_ports {
                        let connection = ConnectionRecord {
                            input: (target_key.clone(), target_port.clone()),
                            output: (node_key.clone(), port_name.clone()),
                        };
                        if !data.connections.contains(&connection) {
                            data.connections.push(connection);
                        }
                    }
                }
            }
            data.nodes.insert(node_key, record);
        }

        for variable in self.variables() {
            data.variables.insert(
                variable.name.clone(),
                VariableRecord {
                    data_type: variable.data_type.clone(),
                    value: variable.value.clone(),
                },
            );
        }

        data
    }

    /// Restores a session into this graph.
    ///
    /// Variables are restored before nodes so Get/Set nodes resolve them,
    /// then connections, honoring single-connection inputs, and finally the
    /// input-connected notifications fire. Returns the created node ids.
    pub fn deserialize_session(
        &mut self,
        data: &SessionData,
        clear_session: bool,
        clear_undo_stack: bool,
    ) -> Result<Vec<NodeId>, GraphError> {
        if clear_session {
            self.clear_session()?;
        }
        let created = self.restore_session(data)?;
        if clear_undo_stack {
            self.clear_undo_stack();
        }
        Ok(created)
    }

    fn restore_session(&mut self, data: &SessionData) -> Result<Vec<NodeId>, GraphError> {
        self.set_acyclic(data.graph.acyclic);
        self.merge_constraint_tables(
            &data.graph.accept_connection_types,
            &data.graph.reject_connection_types,
        );

        for (name, record) in &data.variables {
            self.create_variable(
                name,
                Some(record.value.clone()),
                Some(&record.data_type),
                true,
            )?;
        }

        let mut created: IndexMap<String, NodeId> = IndexMap::new();
        for (node_key, record) in &data.nodes {
            let func_signature = record
                .custom
                .get(FUNC_SIGNATURE_PROPERTY)
                .and_then(|value| value.as_str().map(ToString::to_string))
                .filter(|signature| !signature.is_empty());
            let node_id = self.create_node_with_options(
                &record.type_id,
                CreateNodeOptions {
                    name: Some(record.name.clone()),
                    position: Some(record.xy_pos),
                    selected: false,
                    func_signature,
                    push_undo: true,
                },
            )?;
            self.restore_node_record(node_id, record)?;
            if let Some(template) = self.template_of(node_id) {
                template.post_deserialize(self, node_id);
            }
            created.insert(node_key.clone(), node_id);
        }

        for connection in &data.connections {
            let (input_key, input_port) = &connection.input;
            let (output_key, output_port) = &connection.output;
            let Some(input_node) = created.get(input_key).copied() else {
                continue;
            };
            let Some(output_node) = created.get(output_key).copied() else {
                continue;
            };
            let input_ref = PortRef::input(input_node, input_port.clone());
            let output_ref = PortRef::output(output_node, output_port.clone());
            let Some(port) = self.port(&input_ref) else {
                continue;
            };
            if self.port(&output_ref).is_none() {
                continue;
            }
            let allow_connection = !port.is_connected() || port.multi_connection;
            if allow_connection {
                self.connect_ports(&output_ref, &input_ref, true)?;
            }
        }

        Ok(created.into_values().collect())
    }

    fn restore_node_record(
        &mut self,
        node_id: NodeId,
        record: &NodeRecord,
    ) -> Result<(), GraphError> {
        // Dynamic-port nodes rebuild their layout before anything else so
        // connections find their ports.
        if record.input_ports.is_some() || record.output_ports.is_some() {
            self.restore_dynamic_ports(node_id, record)?;
        }

        let node = self
            .node_mut(node_id)
            .ok_or(GraphError::NodeNotFound(node_id))?;
        node.color = record.color;
        node.disabled = record.disabled;
        node.visible = record.visible;
        if let Some(session) = &record.subgraph_session {
            node.subgraph_session = Some(session.clone());
        }
        for (name, value) in &record.custom {
            if name == FUNC_SIGNATURE_PROPERTY {
                continue;
            }
            if node.is_custom_property(name) {
                node.set_property(name, value.clone())?;
            } else {
                node.add_property(name, value.clone(), None)?;
            }
        }
        Ok(())
    }

    fn restore_dynamic_ports(
        &mut self,
        node_id: NodeId,
        record: &NodeRecord,
    ) -> Result<(), GraphError> {
        let mut missing: Vec<(PortDirection, PortRecord)> = Vec::new();
        {
            let node = self
                .node(node_id)
                .ok_or(GraphError::NodeNotFound(node_id))?;
            for port in record.input_ports.iter().flatten() {
                if !node.inputs.contains_key(&port.name) {
                    missing.push((PortDirection::Input, port.clone()));
                }
            }
            for port in record.output_ports.iter().flatten() {
                if !node.outputs.contains_key(&port.name) {
                    missing.push((PortDirection::Output, port.clone()));
                }
            }
        }
        for (direction, port_record) in missing {
            let descriptor = self.factory().data_type_by_name(&port_record.data_type)?;
            let mut port = match direction {
                PortDirection::Input => Port::input(&port_record.name, descriptor),
                PortDirection::Output => Port::output(&port_record.name, descriptor),
            };
            port.multi_connection = port_record.multi_connection;
            port.display_name = port_record.display_name;
            let node = self
                .node_mut(node_id)
                .ok_or(GraphError::NodeNotFound(node_id))?;
            let added = match direction {
                PortDirection::Input => node.add_input(port),
                PortDirection::Output => node.add_output(port),
            };
            added.map_err(|error| GraphError::Registry(error.into()))?;
        }
        Ok(())
    }

    /// Saves the current session to a JSON file and remembers the path.
    pub fn save_session(&mut self, path: impl AsRef<Path>) -> Result<(), GraphError> {
        let data = self.serialize_session();
        let text = serde_json::to_string_pretty(&data)?;
        fs::write(path.as_ref(), text)?;
        self.set_session(path.as_ref().to_string_lossy().into_owned());
        Ok(())
    }

    /// Imports a session file into the current graph without clearing it.
    pub fn import_session(
        &mut self,
        path: impl AsRef<Path>,
        clear_undo_stack: bool,
    ) -> Result<Vec<NodeId>, GraphError> {
        let text = fs::read_to_string(path.as_ref())?;
        let data: SessionData = serde_json::from_str(&text)?;
        let created = self.deserialize_session(&data, false, clear_undo_stack)?;
        self.set_session(path.as_ref().to_string_lossy().into_owned());
        Ok(created)
    }

    /// Clears the current session and loads a session file.
    pub fn load_session(&mut self, path: impl AsRef<Path>) -> Result<Vec<NodeId>, GraphError> {
        self.clear_session()?;
        self.import_session(path, true)
    }

    /// Removes every node from the graph and drops the undo history.
    pub fn clear_session(&mut self) -> Result<(), GraphError> {
        let node_ids: Vec<NodeId> = self.node_ids().collect();
        if !node_ids.is_empty() {
            self.delete_nodes(&node_ids, true)?;
        }
        let variable_names: Vec<String> = self
            .variables()
            .iter()
            .map(|variable| variable.name.clone())
            .collect();
        for name in variable_names {
            self.delete_variable(&name, true)?;
        }
        self.clear_undo_stack();
        self.set_session("");
        Ok(())
    }
}
