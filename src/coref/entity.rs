use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

use super::MentionId;
use crate::{
    config::is_valid_eid, diagnostic::ConsistencyWarning, document::Document,
    error::TreebankError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub(crate) u32);

impl EntityId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl Display for EntityId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "entity#{}", self.0)
    }
}

/// A coreference cluster.
#[derive(Debug, Clone, Default)]
pub struct Entity {
    pub(crate) eid: String,
    pub(crate) etype: Option<String>,
    pub(crate) mentions: Vec<MentionId>,
    pub(crate) split_ante: Vec<EntityId>,
}

impl Entity {
    pub fn eid(&self) -> &str {
        &self.eid
    }

    pub fn etype(&self) -> Option<&str> {
        self.etype.as_deref()
    }

    /// Mentions in mention order.
    pub fn mentions(&self) -> &[MentionId] {
        &self.mentions
    }

    pub fn split_ante(&self) -> &[EntityId] {
        &self.split_ante
    }
}

impl Document {
    /// Create an entity with the given id, or with the next free generated id when `eid` is
    /// `None`.
    pub fn create_entity(&mut self, eid: Option<&str>) -> Result<EntityId, TreebankError> {
        let eid = match eid {
            Some(eid) => {
                if !is_valid_eid(eid) {
                    return Err(TreebankError::Structure(format!(
                        "'{eid}' is not a valid entity id"
                    )));
                }
                if self.eid_index.contains_key(eid) {
                    return Err(TreebankError::Structure(format!(
                        "entity id '{eid}' is already in use"
                    )));
                }
                eid.to_string()
            }
            None => {
                let index = &self.eid_index;
                self.id_generator.next_id(|candidate| index.contains_key(candidate))
            }
        };
        let id = EntityId(self.entities.len() as u32);
        self.eid_index.insert(eid.clone(), id);
        self.entities.push(Some(Entity {
            eid,
            ..Default::default()
        }));
        Ok(id)
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id.index()).and_then(Option::as_ref)
    }

    pub fn entity_by_eid(&self, eid: &str) -> Option<EntityId> {
        self.eid_index.get(eid).copied()
    }

    /// Live entities in entity order.
    pub fn entities(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self
            .entities
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_some())
            .map(|(idx, _)| EntityId(idx as u32))
            .collect();
        self.sort_entity_ids(&mut ids);
        ids
    }

    pub fn set_etype(
        &mut self,
        entity: EntityId,
        etype: Option<String>,
    ) -> Result<(), TreebankError> {
        let etype = etype.filter(|t| !t.is_empty());
        if let Some(t) = etype.as_ref() {
            if t.contains('|') {
                return Err(TreebankError::Structure(format!(
                    "entity type '{t}' may not contain '|'"
                )));
            }
        }
        self.entity_data_mut(entity)?.etype = etype;
        Ok(())
    }

    /// Replace the split antecedents of `entity`. Duplicates are dropped, order is kept.
    pub fn set_split_ante(
        &mut self,
        entity: EntityId,
        antecedents: &[EntityId],
    ) -> Result<(), TreebankError> {
        let eid = self.entity_ref(entity)?.eid.clone();
        let mut split_ante = Vec::with_capacity(antecedents.len());
        for ante in antecedents {
            self.entity_ref(*ante)?;
            if *ante == entity {
                return Err(TreebankError::SelfReference(format!(
                    "entity {eid} cannot be its own split antecedent"
                )));
            }
            if !split_ante.contains(ante) {
                split_ante.push(*ante);
            }
        }
        self.entity_data_mut(entity)?.split_ante = split_ante;
        Ok(())
    }

    /// Move every mention of `source` into `destination` and destroy `source`.
    ///
    /// References to `source` (bridging targets and split antecedents) are redirected to
    /// `destination`; those that would become self references are dropped with a warning.
    /// Merging an entity into itself does nothing.
    pub fn merge_entities(
        &mut self,
        source: EntityId,
        destination: EntityId,
    ) -> Result<(), TreebankError> {
        if source == destination {
            return Ok(());
        }
        let src = self.entity_ref(source)?.clone();
        let dst_eid = self.entity_ref(destination)?.eid.clone();
        tracing::debug!(
            "[Document::merge_entities] {} ({} mentions) into {dst_eid}",
            src.eid,
            src.mentions.len()
        );

        for mention in src.mentions.iter() {
            self.mention_data_mut(*mention)?.entity = destination;
        }
        self.entity_data_mut(destination)?
            .mentions
            .extend(src.mentions.iter().copied());

        // Redirect bridging links. Links of the moved mentions that targeted the destination
        // become self references as well.
        let mut dropped_bridging = 0;
        for slot in self.mentions.iter_mut() {
            let Some(mention) = slot else { continue };
            for link in mention.bridging.iter_mut() {
                if link.target == source {
                    link.target = destination;
                }
            }
            let owner = mention.entity;
            let before = mention.bridging.len();
            mention.bridging.retain(|link| link.target != owner);
            dropped_bridging += before - mention.bridging.len();
        }
        for _ in 0..dropped_bridging {
            self.warn(ConsistencyWarning::DroppedSelfReference {
                eid: dst_eid.clone(),
                relation: "Bridging".to_string(),
            });
        }

        // Redirect split antecedents, then fold the source's own list into the destination's.
        let mut dropped_split = 0;
        for (idx, slot) in self.entities.iter_mut().enumerate() {
            let Some(entity) = slot else { continue };
            if !entity.split_ante.contains(&source) {
                continue;
            }
            let mut redirected = Vec::with_capacity(entity.split_ante.len());
            for ante in entity.split_ante.iter() {
                let ante = if *ante == source { destination } else { *ante };
                if ante.index() == idx {
                    dropped_split += 1;
                } else if !redirected.contains(&ante) {
                    redirected.push(ante);
                }
            }
            entity.split_ante = redirected;
        }
        for ante in src.split_ante.iter() {
            let ante = if *ante == source { destination } else { *ante };
            if ante == destination {
                dropped_split += 1;
                continue;
            }
            let dst = self.entity_data_mut(destination)?;
            if !dst.split_ante.contains(&ante) {
                dst.split_ante.push(ante);
            }
        }
        for _ in 0..dropped_split {
            self.warn(ConsistencyWarning::DroppedSelfReference {
                eid: dst_eid.clone(),
                relation: "SplitAnte".to_string(),
            });
        }

        match (self.entity_ref(destination)?.etype.clone(), src.etype) {
            (None, Some(src_type)) => self.entity_data_mut(destination)?.etype = Some(src_type),
            (Some(kept), Some(ignored)) if kept != ignored => {
                self.warn(ConsistencyWarning::ConflictingEntityType {
                    eid: dst_eid.clone(),
                    kept,
                    ignored,
                })
            }
            _ => {}
        }

        self.entities[source.index()] = None;
        self.eid_index.remove(&src.eid);
        self.resort_coref_for(src.mentions);
        Ok(())
    }

    /// Reassign one mention to `entity`. Does nothing when it already belongs there; destroys
    /// the previous entity when it is left without mentions.
    pub fn move_mention(
        &mut self,
        mention: MentionId,
        entity: EntityId,
    ) -> Result<(), TreebankError> {
        let old = self.mention_ref(mention)?.entity;
        self.entity_ref(entity)?;
        if old == entity {
            return Ok(());
        }
        let eid = self.entity_ref(entity)?.eid.clone();
        self.entity_data_mut(old)?.mentions.retain(|m| *m != mention);
        self.entity_data_mut(entity)?.mentions.push(mention);
        let data = self.mention_data_mut(mention)?;
        data.entity = entity;
        let before = data.bridging.len();
        data.bridging.retain(|link| link.target != entity);
        let dropped = before - data.bridging.len();
        for _ in 0..dropped {
            self.warn(ConsistencyWarning::DroppedSelfReference {
                eid: eid.clone(),
                relation: "Bridging".to_string(),
            });
        }
        self.resort_coref_for([mention]);
        if self.entity_ref(old)?.mentions.is_empty() {
            self.destroy_entity(old)?;
        }
        Ok(())
    }

    /// Remove `entity` together with all its mentions.
    pub fn remove_entity(&mut self, entity: EntityId) -> Result<(), TreebankError> {
        let mentions = self.entity_ref(entity)?.mentions.clone();
        for mention in mentions.iter() {
            self.detach_mention(*mention)?;
        }
        self.destroy_entity(entity)
    }

    /// Tombstone an entity and drop every reference to it, warning once per dropped reference.
    pub(crate) fn destroy_entity(&mut self, entity: EntityId) -> Result<(), TreebankError> {
        let eid = self.entity_ref(entity)?.eid.clone();
        self.entities[entity.index()] = None;
        self.eid_index.remove(&eid);

        let mut dangling = Vec::new();
        for slot in self.entities.iter_mut() {
            let Some(other) = slot else { continue };
            if other.split_ante.contains(&entity) {
                other.split_ante.retain(|e| *e != entity);
                dangling.push(other.eid.clone());
            }
        }
        let mut bridging_owners = Vec::new();
        for slot in self.mentions.iter_mut() {
            let Some(mention) = slot else { continue };
            let before = mention.bridging.len();
            mention.bridging.retain(|link| link.target != entity);
            for _ in mention.bridging.len()..before {
                bridging_owners.push(mention.entity);
            }
        }
        for owner in bridging_owners {
            if let Some(owner) = self.entity(owner) {
                dangling.push(owner.eid.clone());
            }
        }
        for referenced_by in dangling {
            self.warn(ConsistencyWarning::DanglingEntityReference {
                eid: eid.clone(),
                referenced_by,
            });
        }
        tracing::debug!("[Document::destroy_entity] destroyed {eid}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{node::NodeId, tree::TreeId};
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
    fn test_entity_ids() {
        let (mut doc, _tree, _n) = sentence(1);
        let fixed = doc.create_entity(Some("e2")).unwrap();
        let first = doc.create_entity(None).unwrap();
        let second = doc.create_entity(None).unwrap();
        assert_eq!(doc.entity(fixed).unwrap().eid(), "e2");
        assert_eq!(doc.entity(first).unwrap().eid(), "e1");
        assert_eq!(doc.entity(second).unwrap().eid(), "e3");
        assert!(doc.create_entity(Some("e1")).is_err());
        assert!(doc.create_entity(Some("a:b")).is_err());
        assert_eq!(doc.entity_by_eid("e3"), Some(second));
    }

    #[test]
    fn test_merge_example() {
        let (mut doc, _tree, n) = sentence(5);
        let e1 = doc.create_entity(Some("e1")).unwrap();
        let e2 = doc.create_entity(Some("e2")).unwrap();
        let m1 = doc.create_mention(e1, n[1], None).unwrap();
        let m2 = doc
            .create_mention(e2, n[4], Some(&[n[1], n[2], n[3], n[4]]))
            .unwrap();
        doc.merge_entities(e1, e2).unwrap();
        assert!(doc.entity(e1).is_none());
        assert_eq!(doc.entity(e2).unwrap().mentions(), &[m1, m2]);
        assert_eq!(doc.mention(m1).unwrap().entity(), e2);
        // Merging again is a no-op.
        doc.move_mention(m1, e2).unwrap();
        doc.merge_entities(e2, e2).unwrap();
        assert_eq!(doc.entity(e2).unwrap().mentions(), &[m1, m2]);
        assert!(doc.warnings().is_empty());
        assert!(doc.built_in_test(false).is_empty());
    }

    #[test]
    fn test_merge_redirects_references() {
        let (mut doc, _tree, n) = sentence(4);
        let a = doc.create_entity(Some("a")).unwrap();
        let b = doc.create_entity(Some("b")).unwrap();
        let c = doc.create_entity(Some("c")).unwrap();
        let ma = doc.create_mention(a, n[0], None).unwrap();
        let mb = doc.create_mention(b, n[1], None).unwrap();
        let mc = doc.create_mention(c, n[2], None).unwrap();
        doc.add_bridging(mc, a, "part").unwrap();
        doc.add_bridging(mb, a, "whole").unwrap();
        doc.set_split_ante(c, &[a, b]).unwrap();
        doc.set_etype(a, Some("person".to_string())).unwrap();
        doc.set_etype(b, Some("object".to_string())).unwrap();

        doc.merge_entities(a, b).unwrap();
        assert_eq!(doc.mention(mc).unwrap().bridging()[0].target, b);
        assert!(doc.mention(mb).unwrap().bridging().is_empty());
        assert_eq!(doc.entity(c).unwrap().split_ante(), &[b]);
        assert_eq!(doc.entity(b).unwrap().etype(), Some("object"));
        assert_eq!(doc.entity(b).unwrap().mentions(), &[ma, mb]);
        let warnings = doc.take_warnings();
        assert!(warnings
            .iter()
            .any(|w| matches!(w, ConsistencyWarning::DroppedSelfReference { .. })));
        assert!(warnings
            .iter()
            .any(|w| matches!(w, ConsistencyWarning::ConflictingEntityType { .. })));
        assert!(doc.built_in_test(false).is_empty());
    }

    #[test]
    fn test_split_ante_self_reference() {
        let (mut doc, _tree, _n) = sentence(1);
        let a = doc.create_entity(None).unwrap();
        let b = doc.create_entity(None).unwrap();
        assert!(matches!(
            doc.set_split_ante(a, &[b, a]),
            Err(TreebankError::SelfReference(_))
        ));
        assert!(doc.entity(a).unwrap().split_ante().is_empty());
        doc.set_split_ante(a, &[b, b]).unwrap();
        assert_eq!(doc.entity(a).unwrap().split_ante(), &[b]);
    }

    #[test]
    fn test_removing_last_mention_drops_references() {
        let (mut doc, _tree, n) = sentence(3);
        let a = doc.create_entity(None).unwrap();
        let b = doc.create_entity(None).unwrap();
        let ma = doc.create_mention(a, n[0], None).unwrap();
        let mb = doc.create_mention(b, n[1], None).unwrap();
        doc.add_bridging(mb, a, "part").unwrap();
        doc.set_split_ante(b, &[a]).unwrap();
        doc.remove_mention(ma).unwrap();
        assert!(doc.entity(a).is_none());
        assert!(doc.mention(mb).unwrap().bridging().is_empty());
        assert!(doc.entity(b).unwrap().split_ante().is_empty());
        assert_eq!(doc.take_warnings().len(), 2);
        assert!(doc.built_in_test(false).is_empty());
    }

    #[test]
    fn test_entity_order() {
        let (mut doc, _tree, n) = sentence(3);
        let late = doc.create_entity(Some("a")).unwrap();
        let early = doc.create_entity(Some("b")).unwrap();
        let empty = doc.create_entity(Some("z")).unwrap();
        doc.create_mention(late, n[2], None).unwrap();
        doc.create_mention(early, n[0], None).unwrap();
        assert_eq!(doc.entities(), vec![empty, early, late]);
    }
}
