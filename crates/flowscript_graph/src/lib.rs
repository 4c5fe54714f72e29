// SPDX-License-Identifier: MIT OR Apache-2.0
//! Dataflow node graph core for `FlowScript`.
//!
//! This crate provides the model and engine behind a visual-scripting
//! editor:
//! - Typed input/output ports connected under per-node-type constraints
//! - A reversible command layer with one linear undo stack and macro
//!   grouping
//! - A factory registering node templates, data types and callable
//!   functions promotable to nodes
//! - A synchronous executor interpreting the execution-flow chain
//!
//! ## Architecture
//!
//! The graph owns all nodes and the undo stack; node behavior lives in
//! stateless [`node::NodeTemplate`] objects resolved through the shared
//! [`registry::NodeFactory`]. Commands bind to stable ids and port
//! handles, never references, so they can replay from the stack at any
//! time. The presentation layer is an external collaborator driving the
//! same command/port API; the core only calls back through the template
//! notification hooks.
//!
//! Everything is single-threaded and synchronous. Mutating the graph
//! while an execution pass is iterating its chain is unsupported and
//! undefined.

pub mod commands;
pub mod datatypes;
pub mod executor;
pub mod graph;
pub mod history;
pub mod node;
pub mod nodes;
pub mod port;
pub mod registry;
pub mod session;

pub use datatypes::{DataType, Value, ValueKind};
pub use executor::{ExecutionError, GraphExecutor};
pub use graph::{CreateNodeOptions, GraphError, NodeGraph, Variable};
pub use node::{Node, NodeId, NodeTemplate};
pub use port::{Port, PortDirection, PortRef};
pub use registry::{NodeFactory, Plugin, RegistryError};
pub use session::SessionData;
