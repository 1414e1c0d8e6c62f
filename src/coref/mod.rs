//! Coreference layer: entities (clusters), their mentions, bridging links and split antecedents.
//!
//! Coreference is document-scoped. Entities and mentions live in arenas of the
//! [crate::document::Document]; a mention refers to its words by [crate::node::NodeId] and every
//! word keeps the inverse index ([crate::node::Node::coref_mentions]). Mentions and entities are
//! kept in one deterministic total order (see [order]) so that [serialize] output is reproducible.

mod entity;
mod mention;
pub mod order;
pub mod serialize;

pub use entity::{Entity, EntityId};
pub use mention::{BridgingLink, Mention, MentionId};
pub use serialize::{CorefSnapshot, EntitySnapshot, MentionSnapshot};

use std::cmp::Ordering;

use crate::document::Document;

impl Document {
    pub(crate) fn check_coref_invariants(&self, errors: &mut Vec<String>) {
        for (idx, mention) in self.mentions.iter().enumerate() {
            let Some(mention) = mention else { continue };
            let id = MentionId(idx as u32);
            match self.entity(mention.entity) {
                Some(entity) if entity.mentions.contains(&id) => {}
                _ => errors.push(format!(
                    "[coref] {id} is not listed by its entity {}",
                    mention.entity
                )),
            }
            if mention.words.is_empty() {
                errors.push(format!("[coref] {id} has no words"));
            }
            if !mention.words.contains(&mention.head) {
                errors.push(format!("[coref] head of {id} is not one of its words"));
            }
            let tree = self.node(mention.head).map(|n| n.tree());
            let mut prev = None;
            for word in mention.words.iter() {
                let Some(node) = self.node(*word) else {
                    errors.push(format!("[coref] {id} lists dead {word}"));
                    continue;
                };
                if Some(node.tree()) != tree {
                    errors.push(format!("[coref] {id} spans several trees"));
                }
                if !node.mentions.contains(&id) {
                    errors.push(format!("[coref] {word} does not index {id}"));
                }
                if prev.is_some_and(|p| p >= node.ord()) {
                    errors.push(format!("[coref] words of {id} are not sorted"));
                }
                prev = Some(node.ord());
            }
            for link in mention.bridging.iter() {
                if link.target == mention.entity {
                    errors.push(format!("[coref] {id} bridges to its own entity"));
                }
                if self.entity(link.target).is_none() {
                    errors.push(format!("[coref] {id} bridges to dead {}", link.target));
                }
            }
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            let Some(node) = node else { continue };
            for mention in node.mentions.iter() {
                let listed = self
                    .mention(*mention)
                    .is_some_and(|m| m.words.iter().any(|w| w.index() == idx));
                if !listed {
                    errors.push(format!(
                        "[coref] node#{idx} indexes {mention} which does not contain it"
                    ));
                }
            }
            if node
                .mentions
                .windows(2)
                .any(|w| self.cmp_mentions(w[0], w[1]) != Ordering::Less)
            {
                errors.push(format!("[coref] mention index of node#{idx} is not sorted"));
            }
        }
        for (idx, entity) in self.entities.iter().enumerate() {
            let Some(entity) = entity else { continue };
            let id = EntityId(idx as u32);
            if self.eid_index.get(&entity.eid) != Some(&id) {
                errors.push(format!("[coref] eid '{}' is not indexed to {id}", entity.eid));
            }
            for mention in entity.mentions.iter() {
                if self.mention(*mention).map(|m| m.entity) != Some(id) {
                    errors.push(format!("[coref] {id} lists foreign {mention}"));
                }
            }
            if entity
                .mentions
                .windows(2)
                .any(|w| self.cmp_mentions(w[0], w[1]) != Ordering::Less)
            {
                errors.push(format!("[coref] mentions of {} are not sorted", entity.eid));
            }
            for ante in entity.split_ante.iter() {
                if *ante == id {
                    errors.push(format!("[coref] {} is its own split antecedent", entity.eid));
                }
                if self.entity(*ante).is_none() {
                    errors.push(format!("[coref] {} has dead split antecedent {ante}", entity.eid));
                }
            }
        }
        for (eid, id) in self.eid_index.iter() {
            if self.entity(*id).map(|e| e.eid.as_str()) != Some(eid.as_str()) {
                errors.push(format!("[coref] eid index entry '{eid}' points at {id}"));
            }
        }
    }
}
