// SPDX-License-Identifier: MIT OR Apache-2.0
//! Port model: typed connection points owned by nodes.
//!
//! Connections are not first-class objects; a connection is the symmetric
//! pair of entries in the two endpoint ports' `connected_ports` maps. The
//! connection protocol itself lives on [`crate::graph::NodeGraph`], which
//! owns both endpoints.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::datatypes::{DataType, Value, EXEC};
use crate::node::NodeId;

/// Direction of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortDirection {
    /// Input port.
    Input,
    /// Output port.
    Output,
}

impl PortDirection {
    /// Returns the opposite direction.
    pub fn opposite(self) -> Self {
        match self {
            Self::Input => Self::Output,
            Self::Output => Self::Input,
        }
    }
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Output => write!(f, "output"),
        }
    }
}

/// Stable handle to a port inside a graph.
///
/// Commands and observer wiring store handles instead of references, so they
/// can live in the undo stack without borrowing the graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRef {
    /// Id of the owning node.
    pub node_id: NodeId,
    /// Direction of the port.
    pub direction: PortDirection,
    /// Name of the port.
    pub name: String,
}

impl PortRef {
    /// Creates a handle to an input port.
    pub fn input(node_id: NodeId, name: impl Into<String>) -> Self {
        Self {
            node_id,
            direction: PortDirection::Input,
            name: name.into(),
        }
    }

    /// Creates a handle to an output port.
    pub fn output(node_id: NodeId, name: impl Into<String>) -> Self {
        Self {
            node_id,
            direction: PortDirection::Output,
            name: name.into(),
        }
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} '{}'", self.node_id, self.direction, self.name)
    }
}

/// A connection point owned by a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Port {
    /// Port name, unique per node and direction.
    pub name: String,
    /// Direction of the port.
    pub direction: PortDirection,
    /// Name of the registered data type this port carries.
    pub data_type: String,
    /// Whether the port is shown by the presentation layer.
    pub visible: bool,
    /// Whether the port label is shown by the presentation layer.
    pub display_name: bool,
    /// A locked port accepts no new connection and no disconnection.
    pub locked: bool,
    /// Whether more than one simultaneous connection is allowed.
    pub multi_connection: bool,
    /// Stored value, used when no connection provides one.
    pub value: Value,
    /// Symmetric connection record: target node id to ordered target port
    /// names. Always mirrors the entries on the ports it targets.
    pub connected_ports: IndexMap<NodeId, Vec<String>>,
    /// Ports receiving this port's value whenever it changes.
    pub affected_ports: Vec<PortRef>,
}

impl Port {
    /// Creates an input port. Inputs default to a single connection.
    pub fn input(name: impl Into<String>, data_type: &DataType) -> Self {
        Self {
            name: name.into(),
            direction: PortDirection::Input,
            data_type: data_type.name.clone(),
            visible: true,
            display_name: true,
            locked: false,
            multi_connection: false,
            value: data_type.default.clone(),
            connected_ports: IndexMap::new(),
            affected_ports: Vec::new(),
        }
    }

    /// Creates an output port. Outputs default to multiple connections.
    pub fn output(name: impl Into<String>, data_type: &DataType) -> Self {
        Self {
            multi_connection: true,
            direction: PortDirection::Output,
            ..Self::input(name, data_type)
        }
    }

    /// Overrides the multi-connection flag.
    pub fn with_multi_connection(mut self, flag: bool) -> Self {
        self.multi_connection = flag;
        self
    }

    /// Returns whether the port carries the execution-flow data type.
    pub fn is_exec(&self) -> bool {
        self.data_type == EXEC
    }

    /// Returns whether the port has at least one connection.
    pub fn is_connected(&self) -> bool {
        self.connected_ports.values().any(|names| !names.is_empty())
    }

    /// Returns handles to every port this port is connected to, in
    /// recording order.
    pub fn connections(&self) -> Vec<PortRef> {
        let remote = self.direction.opposite();
        self.connected_ports
            .iter()
            .flat_map(|(node_id, names)| {
                names.iter().map(move |name| PortRef {
                    node_id: *node_id,
                    direction: remote,
                    name: name.clone(),
                })
            })
            .collect()
    }

    /// Returns whether this port records a connection to the given target.
    pub fn is_connected_to(&self, target: &PortRef) -> bool {
        self.connected_ports
            .get(&target.node_id)
            .is_some_and(|names| names.contains(&target.name))
    }
}

/// Error raised by port mutations.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    /// Mutation attempted on a locked port.
    #[error("port '{port}' on node type '{node_type}' is locked")]
    Locked {
        /// Name of the locked port.
        port: String,
        /// Type id of the node owning the mutated port.
        node_type: String,
    },

    /// Port handle does not resolve to a port in the graph.
    #[error("port {0} was not found in the graph")]
    NotFound(String),
}

/// Identifies a port by node type rather than node instance.
///
/// Connection constraints are shared per node type; the tables key and
/// target ports this way.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortSpec {
    /// Node type id owning the port.
    pub node_type: String,
    /// Direction of the port.
    pub direction: PortDirection,
    /// Name of the port.
    pub port_name: String,
}

impl PortSpec {
    /// Creates a port spec.
    pub fn new(
        node_type: impl Into<String>,
        direction: PortDirection,
        port_name: impl Into<String>,
    ) -> Self {
        Self {
            node_type: node_type.into(),
            direction,
            port_name: port_name.into(),
        }
    }
}

/// A single accept or reject rule between two port specs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintRule {
    /// The constrained port.
    pub port: PortSpec,
    /// The port the rule allows or denies.
    pub target: PortSpec,
}

/// Per-node-type connection constraint table.
///
/// An accept table is an allow-list: once any rule exists for a port, only
/// listed targets may connect to it. A reject table is a deny-list.
/// Mismatches are rejected silently by the connection protocol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstraintTable {
    rules: Vec<ConstraintRule>,
}

impl ConstraintTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rule, ignoring exact duplicates.
    pub fn add(&mut self, rule: ConstraintRule) {
        if !self.rules.contains(&rule) {
            self.rules.push(rule);
        }
    }

    /// Returns whether any rule constrains the given port.
    pub fn constrains(&self, port: &PortSpec) -> bool {
        self.rules.iter().any(|rule| &rule.port == port)
    }

    /// Returns whether a rule lists the given target for the given port.
    pub fn matches(&self, port: &PortSpec, target: &PortSpec) -> bool {
        self.rules
            .iter()
            .any(|rule| &rule.port == port && &rule.target == target)
    }

    /// Iterates over all rules.
    pub fn rules(&self) -> impl Iterator<Item = &ConstraintRule> {
        self.rules.iter()
    }

    /// Merges another table into this one.
    pub fn merge(&mut self, other: &ConstraintTable) {
        for rule in &other.rules {
            self.add(rule.clone());
        }
    }

    /// Returns whether the table holds no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
