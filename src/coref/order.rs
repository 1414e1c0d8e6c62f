//! The total order over mentions and entities.
//!
//! Mentions compare by the document positions of their words, element-wise, so a mention whose
//! words are a prefix of another's comes first (shorter before longer). Remaining ties, which
//! only exist between mentions over the same words, fall back to creation order.
//!
//! Entities without mentions come first, ordered by id; the others follow the order of their
//! first mention.

use std::{cmp::Ordering, collections::BTreeSet};

use super::{EntityId, MentionId};
use crate::{document::Document, node::NodeId, tree::NodePosition, tree::TreeId};

pub type MentionKey = (Vec<NodePosition>, MentionId);
pub type EntityKey = (Option<MentionKey>, String);

impl Document {
    pub fn mention_key(&self, mention: MentionId) -> MentionKey {
        let positions = self
            .mention(mention)
            .map(|m| {
                m.words
                    .iter()
                    .filter_map(|w| self.position(*w).ok())
                    .collect()
            })
            .unwrap_or_default();
        (positions, mention)
    }

    pub fn entity_key(&self, entity: EntityId) -> EntityKey {
        match self.entity(entity) {
            Some(data) => (
                data.mentions.first().map(|m| self.mention_key(*m)),
                data.eid.clone(),
            ),
            None => (None, String::new()),
        }
    }

    pub fn cmp_mentions(&self, a: MentionId, b: MentionId) -> Ordering {
        self.mention_key(a).cmp(&self.mention_key(b))
    }

    pub fn cmp_entities(&self, a: EntityId, b: EntityId) -> Ordering {
        self.entity_key(a).cmp(&self.entity_key(b))
    }

    pub(crate) fn sort_mention_ids(&self, ids: &mut [MentionId]) {
        ids.sort_by_cached_key(|m| self.mention_key(*m));
    }

    pub(crate) fn sort_entity_ids(&self, ids: &mut [EntityId]) {
        ids.sort_by_cached_key(|e| self.entity_key(*e));
    }

    fn resort_entity_mentions(&mut self, entity: EntityId) {
        let Some(data) = self.entities.get_mut(entity.index()).and_then(Option::as_mut) else {
            return;
        };
        let mut mentions = std::mem::take(&mut data.mentions);
        self.sort_mention_ids(&mut mentions);
        if let Some(data) = self.entities.get_mut(entity.index()).and_then(Option::as_mut) {
            data.mentions = mentions;
        }
    }

    fn resort_node_mentions(&mut self, node: NodeId) {
        let Some(data) = self.node_mut(node) else {
            return;
        };
        let mut mentions = std::mem::take(&mut data.mentions);
        self.sort_mention_ids(&mut mentions);
        if let Some(data) = self.node_mut(node) {
            data.mentions = mentions;
        }
    }

    fn resort_mention_words(&mut self, mention: MentionId) {
        let Some(data) = self.mentions.get_mut(mention.index()).and_then(Option::as_mut) else {
            return;
        };
        let mut words = std::mem::take(&mut data.words);
        words.sort_by_key(|w| self.ord_of(*w));
        if let Some(data) = self.mentions.get_mut(mention.index()).and_then(Option::as_mut) {
            data.words = words;
        }
    }

    /// Restore the order of everything that depends on the keys of `mentions`: their word
    /// lists, the mention index of their words and the mention lists of their entities.
    pub(crate) fn resort_coref_for<I>(&mut self, mentions: I)
    where
        I: IntoIterator<Item = MentionId>,
    {
        let mut nodes = BTreeSet::new();
        let mut entities = BTreeSet::new();
        for mention in mentions {
            self.resort_mention_words(mention);
            if let Some(data) = self.mention(mention) {
                nodes.extend(data.words.iter().copied());
                entities.insert(data.entity);
            }
        }
        for node in nodes {
            self.resort_node_mentions(node);
        }
        for entity in entities {
            self.resort_entity_mentions(entity);
        }
    }

    /// Re-sort the coreference data touching `tree` after its nodes moved.
    pub(crate) fn resort_tree_mentions(
        &mut self,
        tree: TreeId,
    ) -> Result<(), crate::error::TreebankError> {
        let mut mentions = BTreeSet::new();
        for node in self.tree_ref(tree)?.order.iter() {
            if let Some(data) = self.node(*node) {
                mentions.extend(data.mentions.iter().copied());
            }
        }
        self.resort_coref_for(mentions);
        Ok(())
    }
}
