//! Span strings: the compact textual form of a node set, e.g. `"3-5,7,7.1-7.2"`.
//!
//! Encoding walks the tree's ordered node list, so a run continues through empty nodes and
//! `decode(encode(s)) == s` holds for every node set of one tree, gaps included.

use std::collections::BTreeSet;

use crate::{document::Document, error::TreebankError, node::NodeId, ord::NodeOrd, tree::TreeId};

/// Parse a span string into inclusive `(lo, hi)` ranges. The empty string yields no ranges.
pub fn parse_span(span: &str) -> Result<Vec<(NodeOrd, NodeOrd)>, TreebankError> {
    let trimmed = span.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let mut ranges = Vec::new();
    for token in trimmed.split(',') {
        let token = token.trim();
        if token.is_empty() {
            return Err(TreebankError::malformed_span(span, "empty range"));
        }
        let (lo, hi) = match token.split_once('-') {
            Some((lo, hi)) => (lo, hi),
            None => (token, token),
        };
        let lo: NodeOrd = lo
            .parse()
            .map_err(|_| TreebankError::malformed_span(span, format!("bad bound '{lo}'")))?;
        let hi: NodeOrd = hi
            .parse()
            .map_err(|_| TreebankError::malformed_span(span, format!("bad bound '{hi}'")))?;
        if lo > hi {
            return Err(TreebankError::malformed_span(
                span,
                format!("range {lo}-{hi} is decreasing"),
            ));
        }
        ranges.push((lo, hi));
    }
    Ok(ranges)
}

impl Document {
    /// Nodes of `tree` whose ord falls inside any range of `span`, in position order.
    pub fn span_decode(&self, tree: TreeId, span: &str) -> Result<Vec<NodeId>, TreebankError> {
        let ranges = parse_span(span)?;
        let tree = self.tree_ref(tree)?;
        Ok(tree
            .order
            .iter()
            .copied()
            .filter(|id| {
                let ord = self.ord_of(*id);
                ranges.iter().any(|(lo, hi)| *lo <= ord && ord <= *hi)
            })
            .collect())
    }

    /// Render `nodes` (any order, duplicates ignored) as a span string. All nodes must belong to
    /// one tree; the root cannot be part of a span.
    pub fn span_encode(&self, nodes: &[NodeId]) -> Result<String, TreebankError> {
        let Some(first) = nodes.first() else {
            return Ok(String::new());
        };
        let tree = self.node_ref(*first)?.tree;
        let mut indices = BTreeSet::new();
        for node in nodes {
            let data = self.node_ref(*node)?;
            if data.tree != tree {
                return Err(TreebankError::Structure(format!(
                    "span nodes belong to different trees ({} and {})",
                    tree, data.tree
                )));
            }
            if data.is_root() {
                return Err(TreebankError::Structure(
                    "the root cannot be part of a span".to_string(),
                ));
            }
            indices.insert(self.order_index(*node)?);
        }
        let order = &self.tree_ref(tree)?.order;
        let mut runs: Vec<(usize, usize)> = Vec::new();
        for idx in indices {
            match runs.last_mut() {
                Some((_, end)) if *end + 1 == idx => *end = idx,
                _ => runs.push((idx, idx)),
            }
        }
        Ok(runs
            .into_iter()
            .map(|(start, end)| {
                let lo = self.ord_of(order[start]);
                if start == end {
                    lo.to_string()
                } else {
                    format!("{lo}-{}", self.ord_of(order[end]))
                }
            })
            .collect::<Vec<_>>()
            .join(","))
    }
}
