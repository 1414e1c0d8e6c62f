use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::{self, Display, Formatter},
};

use super::EntityId;
use crate::{
    diagnostic::ConsistencyWarning, document::Document, error::TreebankError, node::NodeId,
    tree::TreeId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MentionId(pub(crate) u32);

impl MentionId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl Display for MentionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "mention#{}", self.0)
    }
}

/// Labelled relation from a mention to another entity (e.g. part-of).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BridgingLink {
    pub target: EntityId,
    pub relation: String,
}

#[derive(Debug, Clone)]
pub struct Mention {
    pub(crate) entity: EntityId,
    pub(crate) head: NodeId,
    pub(crate) words: Vec<NodeId>,
    pub(crate) bridging: Vec<BridgingLink>,
    pub(crate) misc: Option<String>,
}

impl Mention {
    pub fn entity(&self) -> EntityId {
        self.entity
    }

    pub fn head(&self) -> NodeId {
        self.head
    }

    /// Words sorted by position. Always contains the head.
    pub fn words(&self) -> &[NodeId] {
        &self.words
    }

    pub fn bridging(&self) -> &[BridgingLink] {
        &self.bridging
    }

    pub fn misc(&self) -> Option<&str> {
        self.misc.as_deref()
    }
}

impl Document {
    /// Check a candidate word set for a mention headed by `head` and return it sorted and
    /// de-duplicated.
    fn validated_words(
        &self,
        head: NodeId,
        words: &[NodeId],
    ) -> Result<Vec<NodeId>, TreebankError> {
        let tree = self.node_ref(head)?.tree;
        let mut sorted = Vec::with_capacity(words.len());
        for word in words {
            let data = self.node_ref(*word)?;
            if data.is_root() {
                return Err(TreebankError::InvalidMention(
                    "the root cannot be part of a mention".to_string(),
                ));
            }
            if data.tree != tree {
                return Err(TreebankError::Structure(format!(
                    "mention words must belong to one tree ({tree} and {})",
                    data.tree
                )));
            }
            sorted.push((data.ord, *word));
        }
        sorted.sort();
        sorted.dedup();
        if !sorted.iter().any(|(_, w)| *w == head) {
            return Err(TreebankError::InvalidMention(format!(
                "head {head} is not one of the mention words"
            )));
        }
        Ok(sorted.into_iter().map(|(_, w)| w).collect())
    }

    /// Add a mention of `entity`. Without `words` the mention covers its head only.
    pub fn create_mention(
        &mut self,
        entity: EntityId,
        head: NodeId,
        words: Option<&[NodeId]>,
    ) -> Result<MentionId, TreebankError> {
        self.entity_ref(entity)?;
        let words = self.validated_words(head, words.unwrap_or(&[head]))?;
        let id = MentionId(self.mentions.len() as u32);
        for word in words.iter() {
            self.node_data_mut(*word)?.mentions.push(id);
        }
        self.mentions.push(Some(Mention {
            entity,
            head,
            words,
            bridging: Vec::new(),
            misc: None,
        }));
        self.entity_data_mut(entity)?.mentions.push(id);
        self.resort_coref_for([id]);
        Ok(id)
    }

    pub fn mention(&self, id: MentionId) -> Option<&Mention> {
        self.mentions.get(id.index()).and_then(Option::as_ref)
    }

    /// Every live mention in mention order.
    pub fn mentions(&self) -> Vec<MentionId> {
        let mut ids: Vec<MentionId> = self
            .mentions
            .iter()
            .enumerate()
            .filter(|(_, m)| m.is_some())
            .map(|(idx, _)| MentionId(idx as u32))
            .collect();
        self.sort_mention_ids(&mut ids);
        ids
    }

    /// Replace the word set. The current head must stay part of it.
    pub fn set_words(&mut self, mention: MentionId, words: &[NodeId]) -> Result<(), TreebankError> {
        let head = self.mention_ref(mention)?.head;
        let words = self.validated_words(head, words)?;
        let old: BTreeSet<NodeId> = self.mention_ref(mention)?.words.iter().copied().collect();
        let new: BTreeSet<NodeId> = words.iter().copied().collect();
        for gone in old.difference(&new) {
            if let Some(node) = self.node_mut(*gone) {
                node.mentions.retain(|m| *m != mention);
            }
        }
        for added in new.difference(&old) {
            self.node_data_mut(*added)?.mentions.push(mention);
        }
        self.mention_data_mut(mention)?.words = words;
        self.resort_coref_for([mention]);
        Ok(())
    }

    pub fn set_head(&mut self, mention: MentionId, head: NodeId) -> Result<(), TreebankError> {
        let data = self.mention_ref(mention)?;
        if !data.words.contains(&head) {
            return Err(TreebankError::InvalidMention(format!(
                "new head {head} is not one of the words of {mention}"
            )));
        }
        self.mention_data_mut(mention)?.head = head;
        Ok(())
    }

    /// Opaque `MentionMisc` payload. It is stored inside a MISC value, so it may not contain `|`.
    pub fn set_mention_misc(
        &mut self,
        mention: MentionId,
        misc: Option<String>,
    ) -> Result<(), TreebankError> {
        let misc = misc.filter(|m| !m.is_empty());
        if misc.as_ref().is_some_and(|m| m.contains('|')) {
            return Err(TreebankError::Structure(
                "MentionMisc may not contain '|'".to_string(),
            ));
        }
        self.mention_data_mut(mention)?.misc = misc;
        Ok(())
    }

    pub fn add_bridging(
        &mut self,
        mention: MentionId,
        target: EntityId,
        relation: impl Into<String>,
    ) -> Result<(), TreebankError> {
        let relation = relation.into();
        let owner = self.mention_ref(mention)?.entity;
        let target_eid = &self.entity_ref(target)?.eid;
        if target == owner {
            return Err(TreebankError::SelfReference(format!(
                "{mention} cannot bridge to its own entity {target_eid}"
            )));
        }
        if relation.contains(',') || relation.contains('|') {
            return Err(TreebankError::Structure(format!(
                "bridging relation '{relation}' may not contain ',' or '|'"
            )));
        }
        self.mention_data_mut(mention)?
            .bridging
            .push(BridgingLink { target, relation });
        Ok(())
    }

    /// Drop the bridging links of `mention` that point at `target`. Returns how many were removed.
    pub fn remove_bridging(
        &mut self,
        mention: MentionId,
        target: EntityId,
    ) -> Result<usize, TreebankError> {
        let bridging = &mut self.mention_data_mut(mention)?.bridging;
        let before = bridging.len();
        bridging.retain(|link| link.target != target);
        Ok(before - bridging.len())
    }

    /// Remove a mention. Its entity is destroyed when this was its last mention.
    pub fn remove_mention(&mut self, mention: MentionId) -> Result<(), TreebankError> {
        let entity = self.detach_mention(mention)?;
        if self.entity_ref(entity)?.mentions.is_empty() {
            self.destroy_entity(entity)?;
        }
        Ok(())
    }

    /// Tombstone a mention and unlink it from its words and entity. Returns the entity.
    pub(crate) fn detach_mention(&mut self, mention: MentionId) -> Result<EntityId, TreebankError> {
        self.mention_ref(mention)?;
        let data = self
            .mentions
            .get_mut(mention.index())
            .and_then(Option::take)
            .ok_or_else(|| TreebankError::NotFound(format!("{mention} is not a live mention")))?;
        for word in data.words.iter() {
            if let Some(node) = self.node_mut(*word) {
                node.mentions.retain(|m| *m != mention);
            }
        }
        if let Some(entity) = self.entities.get_mut(data.entity.index()).and_then(Option::as_mut) {
            entity.mentions.retain(|m| *m != mention);
        }
        Ok(data.entity)
    }

    /// Span string of the mention's words.
    pub fn span(&self, mention: MentionId) -> Result<String, TreebankError> {
        self.span_encode(&self.mention_ref(mention)?.words)
    }

    pub fn mention_tree(&self, mention: MentionId) -> Result<TreeId, TreebankError> {
        Ok(self.node_ref(self.mention_ref(mention)?.head)?.tree)
    }

    /// Mentions containing `node`, in mention order.
    pub fn coref_mentions(&self, node: NodeId) -> Result<Vec<MentionId>, TreebankError> {
        Ok(self.node_ref(node)?.mentions.clone())
    }

    /// Entities with a mention containing `node`, in the order of those mentions.
    pub fn coref_entities(&self, node: NodeId) -> Result<Vec<EntityId>, TreebankError> {
        let mut entities = Vec::new();
        for mention in self.node_ref(node)?.mentions.iter() {
            let entity = self.mention_ref(*mention)?.entity;
            if !entities.contains(&entity) {
                entities.push(entity);
            }
        }
        Ok(entities)
    }

    /// Remove mentions covering exactly the same words as another mention.
    ///
    /// Within one entity the earliest created mention survives. Mentions of different entities
    /// always produce a [ConsistencyWarning::SameSpanAcrossEntities]; unless `same_entity_only` is
    /// set, only the mention of the entity with the smallest id is kept. Returns the number of
    /// removed mentions.
    pub fn remove_duplicate_same_span_mentions(
        &mut self,
        same_entity_only: bool,
    ) -> Result<usize, TreebankError> {
        let mut groups: BTreeMap<Vec<NodeId>, Vec<MentionId>> = BTreeMap::new();
        for (idx, slot) in self.mentions.iter().enumerate() {
            if let Some(mention) = slot {
                groups
                    .entry(mention.words.clone())
                    .or_default()
                    .push(MentionId(idx as u32));
            }
        }
        let mut removed = 0;
        for (words, group) in groups.into_iter().filter(|(_, g)| g.len() > 1) {
            let span = self.span_encode(&words)?;
            let mut survivors: BTreeMap<String, MentionId> = BTreeMap::new();
            for mention in group {
                let eid = self.entity_ref(self.mention_ref(mention)?.entity)?.eid.clone();
                if survivors.contains_key(&eid) {
                    self.remove_mention(mention)?;
                    removed += 1;
                } else {
                    survivors.insert(eid, mention);
                }
            }
            let mut survivors = survivors.into_iter();
            let Some((kept_eid, _)) = survivors.next() else { continue };
            for (other_eid, other) in survivors {
                self.warn(ConsistencyWarning::SameSpanAcrossEntities {
                    span: span.clone(),
                    kept: kept_eid.clone(),
                    other: other_eid,
                    removed: !same_entity_only,
                });
                if !same_entity_only {
                    self.remove_mention(other)?;
                    removed += 1;
                }
            }
        }
        if removed > 0 {
            tracing::debug!(
                "[Document::remove_duplicate_same_span_mentions] removed {removed} mention(s)"
            );
        }
        Ok(removed)
    }

    /// Bring the mentions in `touched` back in line after some of their words were removed:
    /// drop dead words, pick a new head when the old one died (the remaining regular word
    /// closest to the root, then the leftmost; empty nodes only when nothing else is left), and
    /// remove mentions left without words.
    pub(crate) fn drop_removed_words(
        &mut self,
        touched: BTreeMap<MentionId, String>,
    ) -> Result<(), TreebankError> {
        let mut resort = Vec::new();
        for (mention, old_span) in touched {
            let Some(data) = self.mention(mention) else { continue };
            let words: Vec<NodeId> = data
                .words
                .iter()
                .copied()
                .filter(|w| self.is_alive(*w))
                .collect();
            if words.is_empty() {
                let entity = self.detach_mention(mention)?;
                let eid = self.entity_ref(entity)?.eid.clone();
                self.warn(ConsistencyWarning::MentionRemoved { eid, span: old_span });
                if self.entity_ref(entity)?.mentions.is_empty() {
                    self.destroy_entity(entity)?;
                }
                continue;
            }
            let head = if self.is_alive(data.head) {
                data.head
            } else {
                let mut best = None;
                for word in words.iter() {
                    let ord = self.ord_of(*word);
                    let key = (ord.is_empty(), self.depth(*word)?, ord);
                    if best.as_ref().is_none_or(|(k, _)| key < *k) {
                        best = Some((key, *word));
                    }
                }
                best.map(|(_, w)| w).unwrap_or(words[0])
            };
            let data = self.mention_data_mut(mention)?;
            data.words = words;
            data.head = head;
            resort.push(mention);
        }
        self.resort_coref_for(resort);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{ChildPolicy, InsertPosition};
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
    fn test_create_mention_requires_head() {
        let (mut doc, _tree, n) = sentence(4);
        let e = doc.create_entity(None).unwrap();
        assert!(matches!(
            doc.create_mention(e, n[0], Some(&[n[1], n[2]])),
            Err(TreebankError::InvalidMention(_))
        ));
        assert!(doc.mentions().is_empty());
        let m = doc.create_mention(e, n[2], Some(&[n[2], n[1]])).unwrap();
        assert_eq!(doc.mention(m).unwrap().words(), &[n[1], n[2]]);
        assert_eq!(doc.span(m).unwrap(), "2-3");
        assert_eq!(doc.coref_mentions(n[1]).unwrap(), vec![m]);
        assert_eq!(doc.coref_entities(n[2]).unwrap(), vec![e]);
    }

    #[test]
    fn test_bridging_self_reference() {
        let (mut doc, _tree, n) = sentence(2);
        let e = doc.create_entity(None).unwrap();
        let other = doc.create_entity(None).unwrap();
        let m = doc.create_mention(e, n[0], None).unwrap();
        assert!(matches!(
            doc.add_bridging(m, e, "Part"),
            Err(TreebankError::SelfReference(_))
        ));
        assert!(doc.mention(m).unwrap().bridging().is_empty());
        doc.add_bridging(m, other, "Part").unwrap();
        assert_eq!(doc.remove_bridging(m, other).unwrap(), 1);
    }

    #[test]
    fn test_set_words_updates_index_and_order() {
        let (mut doc, _tree, n) = sentence(4);
        let e = doc.create_entity(None).unwrap();
        let inner = doc.create_mention(e, n[1], Some(&[n[1], n[2]])).unwrap();
        let outer = doc.create_mention(e, n[1], Some(&[n[1], n[2], n[3]])).unwrap();
        assert_eq!(doc.entity(e).unwrap().mentions(), &[inner, outer]);
        doc.set_words(inner, &[n[0], n[1], n[2], n[3]]).unwrap();
        assert_eq!(doc.entity(e).unwrap().mentions(), &[inner, outer]);
        doc.set_words(inner, &[n[1]]).unwrap();
        assert_eq!(doc.entity(e).unwrap().mentions(), &[inner, outer]);
        assert!(doc.coref_mentions(n[0]).unwrap().is_empty());
        assert_eq!(doc.coref_mentions(n[1]).unwrap(), vec![inner, outer]);
        assert!(matches!(
            doc.set_words(inner, &[n[2]]),
            Err(TreebankError::InvalidMention(_))
        ));
        doc.set_head(outer, n[3]).unwrap();
        assert!(doc.set_head(outer, n[0]).is_err());
        assert!(doc.built_in_test(false).is_empty());
    }

    #[test]
    fn test_mention_with_empty_node() {
        let (mut doc, _tree, n) = sentence(3);
        let empty = doc
            .create_empty_child(n[1], "nsubj", InsertPosition::After)
            .unwrap();
        let e = doc.create_entity(None).unwrap();
        let m = doc.create_mention(e, empty, Some(&[n[1], empty, n[2]])).unwrap();
        assert_eq!(doc.span(m).unwrap(), "2-3");
        assert!(doc.built_in_test(false).is_empty());
    }

    #[test]
    fn test_node_removal_updates_mentions() {
        let (mut doc, _tree, n) = sentence(4);
        doc.set_parent(n[2], n[1]).unwrap();
        doc.set_parent(n[3], n[1]).unwrap();
        let e = doc.create_entity(None).unwrap();
        let other = doc.create_entity(None).unwrap();
        let m = doc.create_mention(e, n[1], Some(&[n[1], n[2], n[3]])).unwrap();
        let single = doc.create_mention(other, n[0], None).unwrap();
        doc.add_bridging(m, other, "part").unwrap();

        doc.remove(n[1], ChildPolicy::Rehang).unwrap();
        assert_eq!(doc.mention(m).unwrap().head(), n[2]);
        assert_eq!(doc.span(m).unwrap(), "2-3");

        doc.remove(n[0], ChildPolicy::Rehang).unwrap();
        assert!(doc.mention(single).is_none());
        assert!(doc.entity(other).is_none());
        assert!(doc.mention(m).unwrap().bridging().is_empty());
        let warnings = doc.take_warnings();
        assert!(warnings
            .iter()
            .any(|w| matches!(w, ConsistencyWarning::MentionRemoved { span, .. } if span == "1")));
        assert!(warnings
            .iter()
            .any(|w| matches!(w, ConsistencyWarning::DanglingEntityReference { .. })));
        assert!(doc.built_in_test(false).is_empty());
    }

    #[test]
    fn test_new_head_prefers_regular_words() {
        let (mut doc, _tree, n) = sentence(3);
        doc.set_parent(n[2], n[1]).unwrap();
        let empty = doc
            .create_empty_child(n[1], "nsubj", InsertPosition::After)
            .unwrap();
        let e = doc.create_entity(None).unwrap();
        let m = doc
            .create_mention(e, n[1], Some(&[n[1], empty, n[2]]))
            .unwrap();

        doc.remove(n[1], ChildPolicy::Rehang).unwrap();
        assert_eq!(doc.mention(m).unwrap().head(), n[2]);
        assert_eq!(doc.mention(m).unwrap().words(), &[empty, n[2]]);

        // Only the empty node is left: it has to take over.
        doc.remove(n[2], ChildPolicy::Rehang).unwrap();
        assert_eq!(doc.mention(m).unwrap().head(), empty);
        assert!(doc.built_in_test(false).is_empty());
    }

    #[test]
    fn test_remove_duplicate_same_span_mentions() {
        let (mut doc, _tree, n) = sentence(3);
        let a = doc.create_entity(Some("a")).unwrap();
        let b = doc.create_entity(Some("b")).unwrap();
        let a1 = doc.create_mention(a, n[0], Some(&[n[0], n[1]])).unwrap();
        let a2 = doc.create_mention(a, n[1], Some(&[n[0], n[1]])).unwrap();
        let b1 = doc.create_mention(b, n[0], Some(&[n[0], n[1]])).unwrap();
        let b2 = doc.create_mention(b, n[2], None).unwrap();

        assert_eq!(doc.remove_duplicate_same_span_mentions(true).unwrap(), 1);
        assert!(doc.mention(a1).is_some());
        assert!(doc.mention(a2).is_none());
        assert!(doc.mention(b1).is_some());
        assert!(matches!(
            doc.take_warnings().as_slice(),
            [ConsistencyWarning::SameSpanAcrossEntities { removed: false, .. }]
        ));

        assert_eq!(doc.remove_duplicate_same_span_mentions(false).unwrap(), 1);
        assert!(doc.mention(b1).is_none());
        assert_eq!(doc.entity(b).unwrap().mentions(), &[b2]);
        assert!(doc.built_in_test(false).is_empty());
    }
}
