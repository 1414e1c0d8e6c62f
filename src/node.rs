//! Tree nodes and their handles.
//!
//! A [Node] is stored in the arena of its [crate::document::Document] and addressed by a
//! [NodeId]. Structural fields (position, parent, children, enhanced edges, coreference index)
//! are read-only here; they change only through `Document` methods so that every derived index is
//! updated in the same call. Linguistic annotations are plain public fields.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::{
    coref::MentionId,
    misc::Misc,
    mwt::MwtId,
    ord::NodeOrd,
    tree::TreeId,
};

/// Stable handle of a node. Handles are never reused within a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// What happens to the children of a removed node.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChildPolicy {
    /// Reattach the children to the parent of the removed node.
    #[default]
    Rehang,
    /// Remove the whole subtree.
    Cascade,
}

/// Where a new empty node goes relative to the node that creates it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InsertPosition {
    Before,
    #[default]
    After,
}

/// A secondary (enhanced) dependency: `parent` governs the owning node with relation `label`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EnhancedEdge {
    pub parent: NodeId,
    pub label: String,
}

impl EnhancedEdge {
    pub fn new(parent: NodeId, label: impl Into<String>) -> Self {
        EnhancedEdge {
            parent,
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Node {
    pub(crate) tree: TreeId,
    pub(crate) ord: NodeOrd,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) deps: Vec<EnhancedEdge>,
    pub(crate) mentions: Vec<MentionId>,
    pub(crate) mwt: Option<MwtId>,
    pub form: String,
    pub lemma: String,
    pub upos: String,
    pub xpos: String,
    pub feats: String,
    pub deprel: String,
    pub misc: Misc,
}

impl Node {
    pub(crate) fn new(tree: TreeId, ord: NodeOrd) -> Self {
        Node {
            tree,
            ord,
            ..Default::default()
        }
    }

    pub fn tree(&self) -> TreeId {
        self.tree
    }

    pub fn ord(&self) -> NodeOrd {
        self.ord
    }

    /// Primary parent. `None` for the root and for empty nodes.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Primary children, sorted by position.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn deps(&self) -> &[EnhancedEdge] {
        &self.deps
    }

    /// Mentions containing this node, in mention order.
    pub fn coref_mentions(&self) -> &[MentionId] {
        &self.mentions
    }

    pub fn mwt(&self) -> Option<MwtId> {
        self.mwt
    }

    pub fn is_empty(&self) -> bool {
        self.ord.is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.ord.is_root()
    }
}
