//! Enhanced (secondary) dependencies.
//!
//! Every node carries a list of [EnhancedEdge]s independent of its primary parent. The list is a
//! plain multiset: identical edges are allowed unless the caller goes through
//! [Document::add_dep_unique]. Nothing here checks for cycles, and removing a node leaves edges
//! pointing at it in place; [Document::dangling_deps] finds them.

use petgraph::algo::kosaraju_scc;
use std::collections::BTreeMap;

use crate::{
    document::Document,
    error::TreebankError,
    node::{EnhancedEdge, NodeId},
    ord::NodeOrd,
    tree::TreeId,
};

/// Enhanced edges of one tree as a graph, oriented parent → child.
#[derive(Debug, Clone, Default)]
pub struct DepsGraph(pub petgraph::Graph<NodeId, String>);

impl DepsGraph {
    pub fn as_graph(&self) -> &petgraph::Graph<NodeId, String> {
        &self.0
    }

    pub fn node_count(&self) -> usize {
        self.0.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.0.edge_count()
    }
}

impl Document {
    pub fn deps(&self, node: NodeId) -> Result<&[EnhancedEdge], TreebankError> {
        Ok(self.node_ref(node)?.deps.as_slice())
    }

    fn check_dep_endpoints(&self, node: NodeId, parent: NodeId) -> Result<(), TreebankError> {
        let data = self.node_ref(node)?;
        if data.is_root() {
            return Err(TreebankError::Structure(
                "the root cannot have enhanced parents".to_string(),
            ));
        }
        if self.node_ref(parent)?.tree != data.tree {
            return Err(TreebankError::Structure(format!(
                "enhanced edge {parent} -> {node} crosses trees"
            )));
        }
        Ok(())
    }

    /// Append an edge, duplicates included.
    pub fn add_dep(
        &mut self,
        node: NodeId,
        parent: NodeId,
        label: impl Into<String>,
    ) -> Result<(), TreebankError> {
        self.check_dep_endpoints(node, parent)?;
        self.node_data_mut(node)?
            .deps
            .push(EnhancedEdge::new(parent, label));
        Ok(())
    }

    /// Append an edge unless an identical one is already present. Returns whether it was added.
    pub fn add_dep_unique(
        &mut self,
        node: NodeId,
        parent: NodeId,
        label: impl Into<String>,
    ) -> Result<bool, TreebankError> {
        self.check_dep_endpoints(node, parent)?;
        let edge = EnhancedEdge::new(parent, label);
        let deps = &mut self.node_data_mut(node)?.deps;
        if deps.contains(&edge) {
            return Ok(false);
        }
        deps.push(edge);
        Ok(true)
    }

    /// Drop every edge of `node` whose parent is `parent`. Returns the number removed.
    pub fn remove_deps_to(&mut self, node: NodeId, parent: NodeId) -> Result<usize, TreebankError> {
        let deps = &mut self.node_data_mut(node)?.deps;
        let before = deps.len();
        deps.retain(|edge| edge.parent != parent);
        Ok(before - deps.len())
    }

    pub fn set_deps(&mut self, node: NodeId, deps: Vec<EnhancedEdge>) -> Result<(), TreebankError> {
        for edge in deps.iter() {
            self.check_dep_endpoints(node, edge.parent)?;
        }
        self.node_data_mut(node)?.deps = deps;
        Ok(())
    }

    /// Point every edge of `node` that leaves `old_parent` at `new_parent`, keeping labels.
    pub fn redirect_edges(
        &mut self,
        node: NodeId,
        old_parent: NodeId,
        new_parent: NodeId,
    ) -> Result<usize, TreebankError> {
        self.check_dep_endpoints(node, new_parent)?;
        let mut redirected = 0;
        for edge in self.node_data_mut(node)?.deps.iter_mut() {
            if edge.parent == old_parent {
                edge.parent = new_parent;
                redirected += 1;
            }
        }
        tracing::debug!(
            "[Document::redirect_edges] {node}: {redirected} edge(s) {old_parent} -> {new_parent}"
        );
        Ok(redirected)
    }

    /// Nodes of the same tree that list `node` as an enhanced parent, with the edge label.
    pub fn enhanced_children(
        &self,
        node: NodeId,
    ) -> Result<Vec<(NodeId, String)>, TreebankError> {
        let tree = self.node_ref(node)?.tree;
        let mut result = Vec::new();
        for candidate in self.tree_ref(tree)?.order.iter() {
            let Some(data) = self.node(*candidate) else { continue };
            for edge in data.deps.iter().filter(|e| e.parent == node) {
                result.push((*candidate, edge.label.clone()));
            }
        }
        Ok(result)
    }

    /// DEPS column text, e.g. `2:nsubj|4.1:obj`. Edges to removed nodes are skipped.
    pub fn format_deps(&self, node: NodeId) -> Result<String, TreebankError> {
        let mut items: Vec<(NodeOrd, &str)> = self
            .node_ref(node)?
            .deps
            .iter()
            .filter_map(|edge| self.node(edge.parent).map(|p| (p.ord, edge.label.as_str())))
            .collect();
        if items.is_empty() {
            return Ok("_".to_string());
        }
        items.sort();
        Ok(items
            .iter()
            .map(|(ord, label)| format!("{ord}:{label}"))
            .collect::<Vec<_>>()
            .join("|"))
    }

    /// Replace the edges of `node` with the ones described by DEPS column text. Nothing changes
    /// when any item fails to parse or resolve.
    pub fn parse_deps(&mut self, node: NodeId, raw: &str) -> Result<(), TreebankError> {
        let tree = self.node_ref(node)?.tree;
        let raw = raw.trim();
        let mut deps = Vec::new();
        if !raw.is_empty() && raw != "_" {
            for item in raw.split('|') {
                let (ord, label) = item.split_once(':').ok_or_else(|| {
                    TreebankError::Serialization(format!("enhanced dependency '{item}' lacks ':'"))
                })?;
                let ord: NodeOrd = ord.parse()?;
                let parent = self.node_at(tree, ord).ok_or_else(|| {
                    TreebankError::NotFound(format!("no node at {ord} in {tree}"))
                })?;
                deps.push(EnhancedEdge::new(parent, label));
            }
        }
        self.set_deps(node, deps)
    }

    pub fn enhanced_graph(&self, tree: TreeId) -> Result<DepsGraph, TreebankError> {
        let tree_data = self.tree_ref(tree)?;
        let mut graph = petgraph::Graph::new();
        let mut index = BTreeMap::new();
        for id in std::iter::once(tree_data.root).chain(tree_data.order.iter().copied()) {
            index.insert(id, graph.add_node(id));
        }
        for id in tree_data.order.iter() {
            let Some(data) = self.node(*id) else { continue };
            for edge in data.deps.iter() {
                if let (Some(parent_idx), Some(child_idx)) = (index.get(&edge.parent), index.get(id))
                {
                    graph.add_edge(*parent_idx, *child_idx, edge.label.clone());
                }
            }
        }
        Ok(DepsGraph(graph))
    }

    /// Strongly connected components of more than one node in the enhanced graph of `tree`.
    pub fn enhanced_cycles(&self, tree: TreeId) -> Vec<Vec<NodeId>> {
        let Ok(graph) = self.enhanced_graph(tree) else {
            return Vec::new();
        };
        kosaraju_scc(graph.as_graph())
            .into_iter()
            .filter(|scc| scc.len() > 1)
            .map(|scc| {
                let mut nodes: Vec<NodeId> = scc.iter().map(|idx| graph.0[*idx]).collect();
                nodes.sort_by_key(|id| self.ord_of(*id));
                nodes
            })
            .collect()
    }

    /// Edges in `tree` whose parent no longer exists, as `(child, edge)` pairs.
    pub fn dangling_deps(&self, tree: TreeId) -> Result<Vec<(NodeId, EnhancedEdge)>, TreebankError> {
        let mut result = Vec::new();
        for id in self.tree_ref(tree)?.order.iter() {
            let Some(data) = self.node(*id) else { continue };
            for edge in data.deps.iter().filter(|e| !self.is_alive(e.parent)) {
                result.push((*id, edge.clone()));
            }
        }
        Ok(result)
    }
}
