//! Sentence trees and the ordered-node operations.
//!
//! Each [Tree] has an artificial root (ord `0`) and keeps `order`, the list of all its other
//! nodes (regular and empty) sorted by [NodeOrd]. Every structural operation below leaves the
//! tree satisfying:
//!
//! 1. the primary parent graph is acyclic;
//! 2. every children list is sorted by position;
//! 3. regular nodes are numbered `1..=N` without gaps, in `order`;
//! 4. an empty node `w.k` sits after regular node `w` (or the root when `w == 0`) and before
//!    `w + 1`, with slots strictly increasing inside a group.
//!
//! Empty nodes are not part of the primary tree: they have no primary parent or children and are
//! attached to the rest of the sentence through enhanced edges, as in CoNLL-U.

use serde::{Deserialize, Serialize};
use std::{
    cmp::Ordering,
    collections::{BTreeMap, BTreeSet},
    fmt::{self, Display, Formatter},
};

use crate::{
    coref::MentionId,
    diagnostic::ConsistencyWarning,
    document::{BundleId, Document},
    error::TreebankError,
    node::{ChildPolicy, EnhancedEdge, InsertPosition, Node, NodeId},
    ord::NodeOrd,
};

#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TreeId(pub(crate) u32);

impl TreeId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl Display for TreeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "tree#{}", self.0)
    }
}

/// Document-wide position of a node: bundle order, then zone order inside the bundle, then ord.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodePosition {
    pub bundle: usize,
    pub zone: usize,
    pub ord: NodeOrd,
}

impl Display for NodePosition {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.bundle, self.zone, self.ord)
    }
}

#[derive(Debug, Clone)]
pub struct Tree {
    pub(crate) bundle: BundleId,
    pub(crate) zone: String,
    pub(crate) zone_rank: usize,
    pub(crate) root: NodeId,
    pub(crate) order: Vec<NodeId>,
    pub sent_id: String,
    pub text: Option<String>,
    pub comment: String,
}

impl Tree {
    pub fn bundle(&self) -> BundleId {
        self.bundle
    }

    pub fn zone(&self) -> &str {
        &self.zone
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// All nodes except the root, sorted by position (empty nodes included).
    pub fn nodes(&self) -> &[NodeId] {
        &self.order
    }
}

impl Document {
    /// Create a tree for `zone` inside `bundle`. Zones are unique per bundle.
    pub fn create_tree(
        &mut self,
        bundle: BundleId,
        zone: impl Into<String>,
    ) -> Result<TreeId, TreebankError> {
        let zone = zone.into();
        let zone_rank = {
            let bundle_data = self
                .bundles
                .get(bundle.index())
                .ok_or_else(|| TreebankError::NotFound(format!("{bundle} does not exist")))?;
            for existing in bundle_data.trees.iter() {
                if self.tree_ref(*existing)?.zone == zone {
                    return Err(TreebankError::Structure(format!(
                        "{bundle} already has a tree for zone '{zone}'"
                    )));
                }
            }
            bundle_data.trees.len()
        };
        let tree_id = TreeId(self.trees.len() as u32);
        let root = self.alloc_node(Node::new(tree_id, NodeOrd::ROOT));
        let bundle_name = &self.bundles[bundle.index()].id;
        let sent_id = if zone.is_empty() {
            bundle_name.clone()
        } else {
            format!("{bundle_name}/{zone}")
        };
        self.trees.push(Some(Tree {
            bundle,
            zone,
            zone_rank,
            root,
            order: Vec::new(),
            sent_id,
            text: None,
            comment: String::new(),
        }));
        self.bundles[bundle.index()].trees.push(tree_id);
        Ok(tree_id)
    }

    pub fn tree(&self, id: TreeId) -> Option<&Tree> {
        self.trees.get(id.index()).and_then(Option::as_ref)
    }

    pub fn tree_mut(&mut self, id: TreeId) -> Option<&mut Tree> {
        self.trees.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// Live trees in document order.
    pub fn trees(&self) -> Vec<TreeId> {
        self.bundles
            .iter()
            .flat_map(|bundle| bundle.trees.iter().copied())
            .filter(|tree| self.tree(*tree).is_some())
            .collect()
    }

    pub fn root(&self, tree: TreeId) -> Result<NodeId, TreebankError> {
        Ok(self.tree_ref(tree)?.root)
    }

    pub fn position(&self, node: NodeId) -> Result<NodePosition, TreebankError> {
        let data = self.node_ref(node)?;
        let tree = self.tree_ref(data.tree)?;
        Ok(NodePosition {
            bundle: tree.bundle.index(),
            zone: tree.zone_rank,
            ord: data.ord,
        })
    }

    /// True when `a` comes before `b` in document order.
    pub fn precedes(&self, a: NodeId, b: NodeId) -> Result<bool, TreebankError> {
        Ok(self.position(a)? < self.position(b)?)
    }

    /// Regular (non-empty) nodes of the tree in position order.
    pub fn words(&self, tree: TreeId) -> Result<Vec<NodeId>, TreebankError> {
        let tree = self.tree_ref(tree)?;
        Ok(tree
            .order
            .iter()
            .copied()
            .filter(|id| self.node(*id).is_some_and(|n| !n.is_empty()))
            .collect())
    }

    pub fn empty_nodes(&self, tree: TreeId) -> Result<Vec<NodeId>, TreebankError> {
        let tree = self.tree_ref(tree)?;
        Ok(tree
            .order
            .iter()
            .copied()
            .filter(|id| self.node(*id).is_some_and(Node::is_empty))
            .collect())
    }

    /// Look a node up by position key.
    pub fn node_at(&self, tree: TreeId, ord: NodeOrd) -> Option<NodeId> {
        let tree = self.tree(tree)?;
        if ord.is_root() {
            return Some(tree.root);
        }
        let idx = tree
            .order
            .binary_search_by(|id| self.ord_of(*id).cmp(&ord))
            .ok()?;
        tree.order.get(idx).copied()
    }

    pub(crate) fn ord_of(&self, id: NodeId) -> NodeOrd {
        self.node(id).map(|n| n.ord).unwrap_or_default()
    }

    /// Index of a live non-root node inside its tree's `order` list.
    pub(crate) fn order_index(&self, node: NodeId) -> Result<usize, TreebankError> {
        let data = self.node_ref(node)?;
        let ord = data.ord;
        self.tree_ref(data.tree)?
            .order
            .binary_search_by(|id| self.ord_of(*id).cmp(&ord))
            .map_err(|_| TreebankError::NotFound(format!("{node} is not in its tree order")))
    }

    pub fn next_node(&self, node: NodeId) -> Result<Option<NodeId>, TreebankError> {
        let data = self.node_ref(node)?;
        let tree = self.tree_ref(data.tree)?;
        if data.is_root() {
            return Ok(tree.order.first().copied());
        }
        let idx = self.order_index(node)?;
        Ok(tree.order.get(idx + 1).copied())
    }

    pub fn prev_node(&self, node: NodeId) -> Result<Option<NodeId>, TreebankError> {
        let data = self.node_ref(node)?;
        if data.is_root() {
            return Ok(None);
        }
        let tree = self.tree_ref(data.tree)?;
        let idx = self.order_index(node)?;
        Ok(if idx == 0 {
            None
        } else {
            tree.order.get(idx - 1).copied()
        })
    }

    /// Primary descendants of `node`, sorted by position, excluding `node` itself.
    pub fn descendants(&self, node: NodeId) -> Result<Vec<NodeId>, TreebankError> {
        let mut result = Vec::new();
        let mut stack = self.node_ref(node)?.children.clone();
        while let Some(current) = stack.pop() {
            result.push(current);
            stack.extend(self.node_ref(current)?.children.iter().copied());
        }
        result.sort_by_key(|id| self.ord_of(*id));
        Ok(result)
    }

    pub fn is_descendant_of(&self, node: NodeId, ancestor: NodeId) -> Result<bool, TreebankError> {
        let mut current = self.node_ref(node)?.parent;
        while let Some(parent) = current {
            if parent == ancestor {
                return Ok(true);
            }
            current = self.node_ref(parent)?.parent;
        }
        Ok(false)
    }

    /// Number of primary edges between `node` and the root.
    pub fn depth(&self, node: NodeId) -> Result<usize, TreebankError> {
        let mut depth = 0;
        let mut current = self.node_ref(node)?.parent;
        while let Some(parent) = current {
            depth += 1;
            current = self.node_ref(parent)?.parent;
        }
        Ok(depth)
    }

    /// Append a new regular node at the end of the sentence and attach it under `parent`.
    pub fn create_child(&mut self, parent: NodeId) -> Result<NodeId, TreebankError> {
        let parent_data = self.node_ref(parent)?;
        if parent_data.is_empty() {
            return Err(TreebankError::Structure(format!(
                "{parent} is an empty node and cannot have primary children"
            )));
        }
        let tree_id = parent_data.tree;
        let last_word = self
            .tree_ref(tree_id)?
            .order
            .iter()
            .rev()
            .map(|id| self.ord_of(*id))
            .find(|ord| !ord.is_empty())
            .map(|ord| ord.word)
            .unwrap_or(0);
        let ord = NodeOrd::word(last_word + 1);
        let mut node = Node::new(tree_id, ord);
        node.parent = Some(parent);
        let id = self.alloc_node(node);
        self.tree_data_mut(tree_id)?.order.push(id);
        self.insert_child_sorted(parent, id)?;
        tracing::debug!("[Document::create_child] created {id} at {ord} under {parent}");
        Ok(id)
    }

    /// Create an empty node directly before or after `node`, attached to it through an enhanced
    /// edge labelled `deprel`. Existing empty slots are renumbered only when no free slot is left
    /// between the two neighbours.
    pub fn create_empty_child(
        &mut self,
        node: NodeId,
        deprel: impl Into<String>,
        position: InsertPosition,
    ) -> Result<NodeId, TreebankError> {
        let data = self.node_ref(node)?;
        let tree_id = data.tree;
        let insert_at = match (data.is_root(), position) {
            (true, InsertPosition::Before) => {
                return Err(TreebankError::Structure(
                    "cannot insert a node before the root".to_string(),
                ))
            }
            (true, InsertPosition::After) => 0,
            (false, InsertPosition::Before) => self.order_index(node)?,
            (false, InsertPosition::After) => self.order_index(node)? + 1,
        };
        let (prev, next) = {
            let tree = self.tree_ref(tree_id)?;
            let prev = if insert_at == 0 {
                NodeOrd::ROOT
            } else {
                self.ord_of(tree.order[insert_at - 1])
            };
            let next = tree.order.get(insert_at).map(|id| self.ord_of(*id));
            (prev, next)
        };
        let slot = prev.empty + 1;
        let saturated = matches!(next, Some(n) if n.word == prev.word && n.empty <= slot);
        if saturated {
            self.shift_empty_slots(tree_id, insert_at, prev.word, slot + 1)?;
        }
        let ord = NodeOrd::empty(prev.word, slot);
        let mut empty = Node::new(tree_id, ord);
        empty.deps.push(EnhancedEdge::new(node, deprel));
        let id = self.alloc_node(empty);
        self.tree_data_mut(tree_id)?.order.insert(insert_at, id);
        tracing::debug!(
            "[Document::create_empty_child] created {id} at {ord} next to {node} (renumbered: {saturated})"
        );
        Ok(id)
    }

    /// Push the empty nodes of group `word` starting at `from` up so that the first one gets at
    /// least `min_slot` and the rest stay strictly increasing.
    fn shift_empty_slots(
        &mut self,
        tree_id: TreeId,
        from: usize,
        word: u32,
        mut min_slot: u32,
    ) -> Result<(), TreebankError> {
        let ids: Vec<NodeId> = self.tree_ref(tree_id)?.order[from..].to_vec();
        for id in ids {
            let data = self.node_data_mut(id)?;
            if data.ord.word != word || !data.ord.is_empty() {
                break;
            }
            if data.ord.empty >= min_slot {
                break;
            }
            data.ord.empty = min_slot;
            min_slot += 1;
        }
        Ok(())
    }

    /// Attach `node` under `new_parent`. Rejected without any change when `new_parent` is `node`
    /// itself or one of its descendants.
    pub fn set_parent(&mut self, node: NodeId, new_parent: NodeId) -> Result<(), TreebankError> {
        let data = self.node_ref(node)?;
        let parent_data = self.node_ref(new_parent)?;
        if data.tree != parent_data.tree {
            return Err(TreebankError::Structure(format!(
                "{node} and {new_parent} belong to different trees"
            )));
        }
        if data.is_root() {
            return Err(TreebankError::Structure(
                "the root cannot be reparented".to_string(),
            ));
        }
        if data.is_empty() || parent_data.is_empty() {
            return Err(TreebankError::Structure(format!(
                "empty nodes are outside the primary tree ({node} -> {new_parent}); use enhanced edges"
            )));
        }
        if node == new_parent || self.is_descendant_of(new_parent, node)? {
            return Err(TreebankError::Cycle {
                node: format!("{node} ({})", data.ord),
                parent: format!("{new_parent} ({})", parent_data.ord),
            });
        }
        let old_parent = data.parent;
        if old_parent == Some(new_parent) {
            return Ok(());
        }
        if let Some(old) = old_parent {
            self.node_data_mut(old)?.children.retain(|c| *c != node);
        }
        self.node_data_mut(node)?.parent = Some(new_parent);
        self.insert_child_sorted(new_parent, node)?;
        tracing::debug!("[Document::set_parent] {node}: {old_parent:?} -> {new_parent}");
        Ok(())
    }

    fn insert_child_sorted(&mut self, parent: NodeId, child: NodeId) -> Result<(), TreebankError> {
        let ord = self.node_ref(child)?.ord;
        let pos = {
            let children = &self.node_ref(parent)?.children;
            children.partition_point(|c| self.ord_of(*c) < ord)
        };
        self.node_data_mut(parent)?.children.insert(pos, child);
        Ok(())
    }

    /// Remove `node`. Its primary children are reattached to its parent (`Rehang`) or removed
    /// with it (`Cascade`). Returns the removed nodes. Enhanced edges pointing at removed nodes
    /// are left dangling.
    pub fn remove(
        &mut self,
        node: NodeId,
        policy: ChildPolicy,
    ) -> Result<Vec<NodeId>, TreebankError> {
        let data = self.node_ref(node)?;
        if data.is_root() {
            return Err(TreebankError::Structure(
                "the root cannot be removed".to_string(),
            ));
        }
        let tree_id = data.tree;
        let parent = data.parent;
        let children = data.children.clone();

        let mut removed = vec![node];
        if policy == ChildPolicy::Cascade {
            removed.extend(self.descendants(node)?);
        }
        let mut touched_mentions: BTreeMap<MentionId, String> = BTreeMap::new();
        for id in removed.iter() {
            for mention in self.node_ref(*id)?.mentions.iter() {
                if !touched_mentions.contains_key(mention) {
                    touched_mentions.insert(*mention, self.span(*mention)?);
                }
            }
        }

        if let Some(parent) = parent {
            if policy == ChildPolicy::Rehang {
                for child in children {
                    self.node_data_mut(child)?.parent = Some(parent);
                    self.insert_child_sorted(parent, child)?;
                }
            }
            self.node_data_mut(parent)?.children.retain(|c| *c != node);
        }
        let removed_set: BTreeSet<NodeId> = removed.iter().copied().collect();
        self.tree_data_mut(tree_id)?
            .order
            .retain(|id| !removed_set.contains(id));

        for id in removed.iter() {
            self.detach_from_mwt(*id)?;
            self.nodes[id.index()] = None;
        }
        self.renumber(tree_id)?;
        self.drop_removed_words(touched_mentions)?;
        tracing::debug!(
            "[Document::remove] removed {} node(s) starting at {node} ({policy:?})",
            removed.len()
        );
        Ok(removed)
    }

    /// Renumber the regular nodes of a tree to `1..=N` in `order`. Empty nodes keep their slot
    /// while it still fits the group they now follow; otherwise they take the next free slot.
    pub(crate) fn renumber(&mut self, tree_id: TreeId) -> Result<(), TreebankError> {
        let ids = self.tree_ref(tree_id)?.order.clone();
        let mut word = 0u32;
        let mut prev_slot = 0u32;
        for id in ids {
            let data = self.node_data_mut(id)?;
            if data.ord.is_empty() {
                let mut slot = if data.ord.word == word {
                    data.ord.empty
                } else {
                    prev_slot + 1
                };
                if slot <= prev_slot {
                    slot = prev_slot + 1;
                }
                data.ord = NodeOrd::empty(word, slot);
                prev_slot = slot;
            } else {
                word += 1;
                data.ord = NodeOrd::word(word);
                prev_slot = 0;
            }
        }
        Ok(())
    }

    /// Move `node` alone right after `reference`.
    pub fn shift_after_node(
        &mut self,
        node: NodeId,
        reference: NodeId,
    ) -> Result<(), TreebankError> {
        self.shift(node, reference, InsertPosition::After, false)
    }

    /// Move `node` alone right before `reference`.
    pub fn shift_before_node(
        &mut self,
        node: NodeId,
        reference: NodeId,
    ) -> Result<(), TreebankError> {
        self.shift(node, reference, InsertPosition::Before, false)
    }

    /// Move `node` together with its primary subtree right after `reference`.
    pub fn shift_after_subtree(
        &mut self,
        node: NodeId,
        reference: NodeId,
    ) -> Result<(), TreebankError> {
        self.shift(node, reference, InsertPosition::After, true)
    }

    /// Move `node` together with its primary subtree right before `reference`.
    pub fn shift_before_subtree(
        &mut self,
        node: NodeId,
        reference: NodeId,
    ) -> Result<(), TreebankError> {
        self.shift(node, reference, InsertPosition::Before, true)
    }

    fn shift(
        &mut self,
        node: NodeId,
        reference: NodeId,
        placement: InsertPosition,
        with_subtree: bool,
    ) -> Result<(), TreebankError> {
        let data = self.node_ref(node)?;
        let ref_data = self.node_ref(reference)?;
        if data.tree != ref_data.tree {
            return Err(TreebankError::Structure(format!(
                "{node} and {reference} belong to different trees"
            )));
        }
        if data.is_root() || ref_data.is_root() {
            return Err(TreebankError::Structure(
                "the root has a fixed position".to_string(),
            ));
        }
        if node == reference {
            return Err(TreebankError::Structure(format!(
                "{node} cannot be shifted relative to itself"
            )));
        }
        let tree_id = data.tree;
        let mut moving = vec![node];
        if with_subtree {
            moving.extend(self.descendants(node)?);
            moving.sort_by_key(|id| self.ord_of(*id));
            if moving.contains(&reference) {
                return Err(TreebankError::Structure(format!(
                    "{reference} lies inside the subtree of {node} being moved"
                )));
            }
        }
        let moving_set: BTreeSet<NodeId> = moving.iter().copied().collect();
        {
            let tree = self.tree_data_mut(tree_id)?;
            tree.order.retain(|id| !moving_set.contains(id));
            let ref_idx = tree
                .order
                .iter()
                .position(|id| *id == reference)
                .ok_or_else(|| {
                    TreebankError::NotFound(format!("{reference} is not in its tree order"))
                })?;
            let insert_at = match placement {
                InsertPosition::Before => ref_idx,
                InsertPosition::After => ref_idx + 1,
            };
            tree.order.splice(insert_at..insert_at, moving.iter().copied());
        }
        self.renumber(tree_id)?;
        self.resort_children(tree_id)?;
        self.validate_mwts(tree_id)?;
        self.resort_tree_mentions(tree_id)?;
        tracing::debug!(
            "[Document::shift] moved {} node(s) of {node} {placement:?} {reference}",
            moving.len()
        );
        Ok(())
    }

    fn resort_children(&mut self, tree_id: TreeId) -> Result<(), TreebankError> {
        let tree = self.tree_ref(tree_id)?;
        let mut all = vec![tree.root];
        all.extend(tree.order.iter().copied());
        for id in all {
            let mut children = std::mem::take(&mut self.node_data_mut(id)?.children);
            children.sort_by_key(|c| self.ord_of(*c));
            self.node_data_mut(id)?.children = children;
        }
        Ok(())
    }

    pub(crate) fn check_tree_invariants(&self, tree_id: TreeId, errors: &mut Vec<String>) {
        let Ok(tree) = self.tree_ref(tree_id) else {
            errors.push(format!("[tree] {tree_id} is listed in a bundle but not live"));
            return;
        };
        match self.node(tree.root) {
            Some(root) if root.ord.is_root() && root.parent.is_none() => {}
            _ => errors.push(format!("[tree] {tree_id}: root {} is malformed", tree.root)),
        }
        let mut prev: Option<NodeOrd> = None;
        let mut word = 0u32;
        for id in tree.order.iter() {
            let Some(node) = self.node(*id) else {
                errors.push(format!("[tree] {tree_id}: order lists dead {id}"));
                continue;
            };
            if node.tree != tree_id {
                errors.push(format!("[tree] {tree_id}: {id} belongs to {}", node.tree));
            }
            if let Some(p) = prev {
                if p.cmp(&node.ord) != Ordering::Less {
                    errors.push(format!(
                        "[tree] {tree_id}: ords not increasing at {id} ({p} then {})",
                        node.ord
                    ));
                }
            }
            prev = Some(node.ord);
            if node.is_empty() {
                if node.ord.word != word {
                    errors.push(format!(
                        "[tree] {tree_id}: empty node {id} at {} should follow word {word}",
                        node.ord
                    ));
                }
                if node.parent.is_some() || !node.children.is_empty() {
                    errors.push(format!(
                        "[tree] {tree_id}: empty node {id} is part of the primary tree"
                    ));
                }
            } else {
                word += 1;
                if node.ord.word != word {
                    errors.push(format!(
                        "[tree] {tree_id}: expected word {word}, found {} at {id}",
                        node.ord
                    ));
                }
                match node.parent.and_then(|p| self.node(p).map(|pd| (p, pd))) {
                    Some((p, pd)) => {
                        if !pd.children.contains(id) {
                            errors.push(format!(
                                "[tree] {tree_id}: {p} does not list child {id}"
                            ));
                        }
                    }
                    None => errors.push(format!("[tree] {tree_id}: {id} has no live parent")),
                }
                let mut steps = 0;
                let mut current = node.parent;
                while let Some(p) = current {
                    steps += 1;
                    if p == *id || steps > tree.order.len() + 1 {
                        errors.push(format!("[tree] {tree_id}: cycle through {id}"));
                        break;
                    }
                    current = self.node(p).and_then(|pd| pd.parent);
                }
            }
        }
        let mut all = vec![tree.root];
        all.extend(tree.order.iter().copied());
        for id in all {
            let Some(node) = self.node(id) else { continue };
            let ords: Vec<NodeOrd> = node.children.iter().map(|c| self.ord_of(*c)).collect();
            if ords.windows(2).any(|w| w[0] >= w[1]) {
                errors.push(format!("[tree] {tree_id}: children of {id} are not sorted"));
            }
            for child in node.children.iter() {
                if self.node(*child).and_then(|c| c.parent) != Some(id) {
                    errors.push(format!(
                        "[tree] {tree_id}: {id} lists {child} which has another parent"
                    ));
                }
            }
        }
    }

    /// Report a multiword token that no longer covers consecutive words.
    pub(crate) fn warn_mwt_dissolved(&mut self, form: String, reason: &str) {
        self.warn(ConsistencyWarning::MultiwordTokenDissolved {
            form,
            reason: reason.to_string(),
        });
    }
}
