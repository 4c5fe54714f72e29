// SPDX-License-Identifier: MIT OR Apache-2.0
//! Group node owning a nested graph session.

use crate::node::NodeTemplate;

/// Executable node carrying a nested serialized session.
///
/// Expanding a group materializes its session into a child graph sharing
/// the parent's factory; collapsing serializes the child back onto the
/// node. See [`crate::graph::NodeGraph::expand_group_node`].
pub struct GroupNode;

impl GroupNode {
    /// Registered type id.
    pub const TYPE_ID: &'static str = "flowscript.nodes.GroupNode";
}

impl NodeTemplate for GroupNode {
    fn type_id(&self) -> &'static str {
        Self::TYPE_ID
    }

    fn default_name(&self) -> &'static str {
        "Group"
    }

    fn category(&self) -> &'static str {
        "Utils"
    }

    fn is_exec(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::graph::NodeGraph;
    use crate::nodes::logic::LoggerNode;
    use crate::registry::NodeFactory;

    #[test]
    fn test_expand_and_collapse_round_trip() {
        let factory = Arc::new(NodeFactory::new());
        let mut graph = NodeGraph::new(Arc::clone(&factory));
        let group = graph.create_node(GroupNode::TYPE_ID).unwrap();

        {
            let child = graph.expand_group_node(group).unwrap();
            child.create_node(LoggerNode::TYPE_ID).unwrap();
            assert_eq!(child.node_count(), 1);
        }
        assert!(graph.sub_graph(group).is_some());

        graph.collapse_group_node(group).unwrap();
        assert!(graph.sub_graph(group).is_none());
        let session = graph.node(group).unwrap().subgraph_session.as_ref().unwrap();
        assert_eq!(session.nodes.len(), 1);

        // Re-expanding restores the nested content.
        let child = graph.expand_group_node(group).unwrap();
        assert_eq!(child.node_count(), 1);
        assert!(child.node_by_name("Logger").is_some());
    }

    #[test]
    fn test_expand_is_reentrant() {
        let factory = Arc::new(NodeFactory::new());
        let mut graph = NodeGraph::new(factory);
        let group = graph.create_node(GroupNode::TYPE_ID).unwrap();
        graph.expand_group_node(group).unwrap();
        let child = graph.expand_group_node(group).unwrap();
        assert_eq!(child.node_count(), 0);
    }
}
