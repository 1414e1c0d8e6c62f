//! Multiword tokens: surface tokens that cover two or more consecutive words.
//!
//! A token does not own its words. Each word points back at its token through
//! [crate::node::Node::mwt]; structural operations that break the consecutive range dissolve
//! the token and record a [crate::diagnostic::ConsistencyWarning::MultiwordTokenDissolved].

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

use crate::{
    document::Document, error::TreebankError, misc::Misc, node::NodeId, tree::TreeId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MwtId(pub(crate) u32);

impl MwtId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl Display for MwtId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "mwt#{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct MultiwordToken {
    pub(crate) tree: TreeId,
    pub(crate) words: Vec<NodeId>,
    pub form: String,
    pub misc: Misc,
}

impl MultiwordToken {
    pub fn tree(&self) -> TreeId {
        self.tree
    }

    /// Covered words, sorted by position.
    pub fn words(&self) -> &[NodeId] {
        &self.words
    }
}

impl Document {
    pub fn create_mwt(
        &mut self,
        words: &[NodeId],
        form: impl Into<String>,
    ) -> Result<MwtId, TreebankError> {
        let form = form.into();
        if words.len() < 2 {
            return Err(TreebankError::Structure(format!(
                "multiword token '{form}' needs at least two words"
            )));
        }
        let tree = self.node_ref(words[0])?.tree;
        let mut sorted = Vec::with_capacity(words.len());
        for word in words.iter() {
            let data = self.node_ref(*word)?;
            if data.tree != tree {
                return Err(TreebankError::Structure(format!(
                    "multiword token '{form}' spans several trees"
                )));
            }
            if data.is_empty() || data.is_root() {
                return Err(TreebankError::Structure(format!(
                    "multiword token '{form}' may only contain regular words, got {}",
                    data.ord
                )));
            }
            if let Some(existing) = data.mwt {
                return Err(TreebankError::Structure(format!(
                    "{word} already belongs to {existing}"
                )));
            }
            sorted.push((data.ord.word, *word));
        }
        sorted.sort();
        sorted.dedup();
        if sorted.len() != words.len() {
            return Err(TreebankError::Structure(format!(
                "multiword token '{form}' lists a word twice"
            )));
        }
        if sorted.windows(2).any(|w| w[1].0 != w[0].0 + 1) {
            return Err(TreebankError::Structure(format!(
                "multiword token '{form}' words are not consecutive"
            )));
        }
        let id = MwtId(self.mwts.len() as u32);
        let words: Vec<NodeId> = sorted.into_iter().map(|(_, id)| id).collect();
        for word in words.iter() {
            self.node_data_mut(*word)?.mwt = Some(id);
        }
        tracing::debug!("[Document::create_mwt] {id} '{form}' over {} words", words.len());
        self.mwts.push(Some(MultiwordToken {
            tree,
            words,
            form,
            misc: Misc::new(),
        }));
        Ok(id)
    }

    pub fn remove_mwt(&mut self, id: MwtId) -> Result<MultiwordToken, TreebankError> {
        self.mwt_ref(id)?;
        let token = self
            .mwts
            .get_mut(id.index())
            .and_then(Option::take)
            .ok_or_else(|| TreebankError::NotFound(format!("{id} is not a live multiword token")))?;
        for word in token.words.iter() {
            if let Some(node) = self.node_mut(*word) {
                node.mwt = None;
            }
        }
        Ok(token)
    }

    pub fn mwt(&self, id: MwtId) -> Option<&MultiwordToken> {
        self.mwts.get(id.index()).and_then(Option::as_ref)
    }

    pub fn mwt_mut(&mut self, id: MwtId) -> Option<&mut MultiwordToken> {
        self.mwts.get_mut(id.index()).and_then(Option::as_mut)
    }

    pub fn mwt_of(&self, node: NodeId) -> Option<MwtId> {
        self.node(node).and_then(|n| n.mwt)
    }

    /// CoNLL-U range of the token, e.g. `"3-4"`, computed from the live ords.
    pub fn mwt_range(&self, id: MwtId) -> Result<String, TreebankError> {
        let token = self.mwt_ref(id)?;
        let (first, last) = match (token.words.first(), token.words.last()) {
            (Some(first), Some(last)) => (self.node_ref(*first)?.ord, self.node_ref(*last)?.ord),
            _ => return Err(TreebankError::Structure(format!("{id} has no words"))),
        };
        Ok(format!("{first}-{last}"))
    }

    /// Live tokens of a tree ordered by their first word.
    pub fn mwts(&self, tree: TreeId) -> Vec<MwtId> {
        let mut tokens: Vec<(u32, MwtId)> = self
            .mwts
            .iter()
            .enumerate()
            .filter_map(|(idx, token)| token.as_ref().map(|t| (idx, t)))
            .filter(|(_, token)| token.tree == tree)
            .map(|(idx, token)| {
                let first = token
                    .words
                    .first()
                    .map(|w| self.ord_of(*w).word)
                    .unwrap_or_default();
                (first, MwtId(idx as u32))
            })
            .collect();
        tokens.sort();
        tokens.into_iter().map(|(_, id)| id).collect()
    }

    /// Drop `node` from its token, dissolving the token if fewer than two words remain.
    pub(crate) fn detach_from_mwt(&mut self, node: NodeId) -> Result<(), TreebankError> {
        let Some(id) = self.node(node).and_then(|n| n.mwt) else {
            return Ok(());
        };
        self.node_data_mut(node)?.mwt = None;
        let remaining = match self.mwts.get_mut(id.index()).and_then(Option::as_mut) {
            Some(token) => {
                token.words.retain(|w| *w != node);
                token.words.len()
            }
            None => return Ok(()),
        };
        if remaining < 2 {
            let token = self.remove_mwt(id)?;
            self.warn_mwt_dissolved(token.form, "fewer than two words remain");
        }
        Ok(())
    }

    /// Dissolve every token of `tree` whose words stopped being consecutive.
    pub(crate) fn validate_mwts(&mut self, tree: TreeId) -> Result<(), TreebankError> {
        for id in self.mwts(tree) {
            let broken = {
                let token = self.mwt_ref(id)?;
                let mut words: Vec<u32> =
                    token.words.iter().map(|w| self.ord_of(*w).word).collect();
                words.sort_unstable();
                words.windows(2).any(|w| w[1] != w[0] + 1)
            };
            if broken {
                let token = self.remove_mwt(id)?;
                self.warn_mwt_dissolved(token.form, "words are no longer consecutive");
            } else if let Some(token) = self.mwts.get_mut(id.index()).and_then(Option::as_mut) {
                let mut words = std::mem::take(&mut token.words);
                words.sort_by_key(|w| self.ord_of(*w));
                if let Some(token) = self.mwts.get_mut(id.index()).and_then(Option::as_mut) {
                    token.words = words;
                }
            }
        }
        Ok(())
    }

    pub(crate) fn check_mwt_invariants(&self, errors: &mut Vec<String>) {
        for (idx, token) in self.mwts.iter().enumerate() {
            let Some(token) = token else { continue };
            let id = MwtId(idx as u32);
            if token.words.len() < 2 {
                errors.push(format!("[mwt] {id} '{}' has fewer than two words", token.form));
            }
            let mut prev: Option<u32> = None;
            for word in token.words.iter() {
                let Some(node) = self.node(*word) else {
                    errors.push(format!("[mwt] {id} lists dead {word}"));
                    continue;
                };
                if node.mwt != Some(id) {
                    errors.push(format!("[mwt] {word} does not point back at {id}"));
                }
                if node.tree != token.tree || node.is_empty() {
                    errors.push(format!("[mwt] {id} contains foreign or empty {word}"));
                }
                if let Some(p) = prev {
                    if node.ord.word != p + 1 {
                        errors.push(format!("[mwt] {id} '{}' is not consecutive", token.form));
                    }
                }
                prev = Some(node.ord.word);
            }
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            let Some(node) = node else { continue };
            if let Some(id) = node.mwt {
                let listed = self
                    .mwt(id)
                    .is_some_and(|t| t.words.iter().any(|w| w.index() == idx));
                if !listed {
                    errors.push(format!("[mwt] node#{idx} points at {id} which does not list it"));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{diagnostic::ConsistencyWarning, node::ChildPolicy};
    use test_log::test;

    fn sentence(n: usize) -> (Document, TreeId, Vec<NodeId>) {
        let mut doc = Document::new("doc");
        let bundle = doc.create_bundle("s1");
        let tree = doc.create_tree(bundle, "").unwrap();
        let root = doc.root(tree).unwrap();
        let nodes = (0..n).map(|_| doc.create_child(root).unwrap()).collect();
        (doc, tree, nodes)
    }

    #[test]
    fn test_create_mwt() {
        let (mut doc, tree, n) = sentence(4);
        let id = doc.create_mwt(&[n[2], n[1]], "del").unwrap();
        assert_eq!(doc.mwt(id).unwrap().words(), &[n[1], n[2]]);
        assert_eq!(doc.mwt_range(id).unwrap(), "2-3");
        assert_eq!(doc.mwt_of(n[1]), Some(id));
        assert_eq!(doc.mwts(tree), vec![id]);
        assert!(doc.built_in_test(false).is_empty());
    }

    #[test]
    fn test_create_mwt_rejects_bad_ranges() {
        let (mut doc, _tree, n) = sentence(4);
        assert!(doc.create_mwt(&[n[0]], "x").is_err());
        assert!(doc.create_mwt(&[n[0], n[2]], "x").is_err());
        doc.create_mwt(&[n[0], n[1]], "x").unwrap();
        assert!(matches!(
            doc.create_mwt(&[n[1], n[2]], "y"),
            Err(TreebankError::Structure(_))
        ));
    }

    #[test]
    fn test_removed_word_dissolves_token() {
        let (mut doc, _tree, n) = sentence(3);
        let id = doc.create_mwt(&[n[0], n[1]], "au").unwrap();
        doc.remove(n[1], ChildPolicy::Rehang).unwrap();
        assert!(doc.mwt(id).is_none());
        assert_eq!(doc.mwt_of(n[0]), None);
        assert!(matches!(
            doc.warnings(),
            [ConsistencyWarning::MultiwordTokenDissolved { .. }]
        ));
        assert!(doc.built_in_test(false).is_empty());
    }

    #[test]
    fn test_shift_breaks_token() {
        let (mut doc, _tree, n) = sentence(4);
        let kept = doc.create_mwt(&[n[2], n[3]], "zum").unwrap();
        let broken = doc.create_mwt(&[n[0], n[1]], "au").unwrap();
        doc.shift_after_node(n[0], n[3]).unwrap();
        assert!(doc.mwt(broken).is_none());
        assert_eq!(doc.mwt_range(kept).unwrap(), "2-3");
        assert_eq!(doc.take_warnings().len(), 1);
        assert!(doc.built_in_test(false).is_empty());
    }
}
