// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph entry point node.

use crate::datatypes::EXEC;
use crate::node::{Node, NodeTemplate, EXEC_OUT_PORT};
use crate::port::Port;
use crate::registry::{NodeFactory, RegistryError};

/// Entry point of the executable chain. The executor starts every run from
/// the single node of this type; it only carries an execution output.
pub struct GraphInputNode;

impl GraphInputNode {
    /// Registered type id.
    pub const TYPE_ID: &'static str = "flowscript.nodes.GraphInputNode";
}

impl NodeTemplate for GraphInputNode {
    fn type_id(&self) -> &'static str {
        Self::TYPE_ID
    }

    fn default_name(&self) -> &'static str {
        "Input"
    }

    fn category(&self) -> &'static str {
        "Utils"
    }

    fn is_exec(&self) -> bool {
        true
    }

    fn is_entry(&self) -> bool {
        true
    }

    fn setup_ports(&self, node: &mut Node, factory: &NodeFactory) -> Result<(), RegistryError> {
        let exec = factory.data_type_by_name(EXEC)?;
        node.add_output(Port::output(EXEC_OUT_PORT, exec).with_multi_connection(false))?;
        Ok(())
    }
}
