//! Round trip of the coreference model through the node MISC bags.
//!
//! Every mention is written on its head node under the keys `ClusterId`, `MentionSpan`,
//! `ClusterType`, `Bridging`, `SplitAnte` and `MentionMisc`. The first mention headed by a node
//! uses the bare keys, the next ones add an index suffix (`ClusterId[1]`, `ClusterId[2]`, …).
//!
//! ```text
//! ClusterId=e1|MentionSpan=1-3|ClusterType=person|ClusterId[1]=e2|MentionSpan[1]=2|Bridging[1]=e1:part
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::{BridgingLink, EntityId};
use crate::{
    config::is_valid_eid, diagnostic::ConsistencyWarning, document::Document,
    error::TreebankError, node::NodeId, tree::NodePosition,
};

pub const CLUSTER_ID: &str = "ClusterId";
pub const MENTION_SPAN: &str = "MentionSpan";
pub const CLUSTER_TYPE: &str = "ClusterType";
pub const BRIDGING: &str = "Bridging";
pub const SPLIT_ANTE: &str = "SplitAnte";
pub const MENTION_MISC: &str = "MentionMisc";

static COREF_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(ClusterId|MentionSpan|ClusterType|Bridging|SplitAnte|MentionMisc)(\[\d+\])?$")
        .expect("valid coref key regex")
});

/// True for MISC keys owned by the coreference layer.
pub fn is_coref_key(key: &str) -> bool {
    COREF_KEY.is_match(key)
}

fn indexed(key: &str, idx: usize) -> String {
    if idx == 0 {
        key.to_string()
    } else {
        format!("{key}[{idx}]")
    }
}

/// One mention as read from the MISC bag of its head, before any entity exists.
#[derive(Debug)]
struct RawMention {
    head: NodeId,
    words: Vec<NodeId>,
    eid: String,
    etype: Option<String>,
    bridging: Vec<(String, String)>,
    split_ante: Vec<String>,
    misc: Option<String>,
}

impl Document {
    /// Write the live coreference model into the MISC bags, replacing whatever coreference keys
    /// were there before.
    #[tracing::instrument(skip_all, fields(document = %self.id))]
    pub fn store(&mut self) -> Result<(), TreebankError> {
        let mut writes: Vec<(NodeId, String, String)> = Vec::new();
        let mut next_idx: BTreeMap<NodeId, usize> = BTreeMap::new();
        let mentions = self.mentions();
        for mention in mentions.iter() {
            let data = self.mention_ref(*mention)?;
            let entity = self.entity_ref(data.entity)?;
            let first_of_entity = entity.mentions.first() == Some(mention);
            let slot = next_idx.entry(data.head).or_default();
            let idx = *slot;
            *slot += 1;

            let mut put = |key: &str, value: String| {
                writes.push((data.head, indexed(key, idx), value));
            };
            put(CLUSTER_ID, entity.eid.clone());
            put(MENTION_SPAN, self.span(*mention)?);
            if let Some(etype) = entity.etype.as_ref() {
                if self.config.type_on_every_mention || first_of_entity {
                    put(CLUSTER_TYPE, etype.clone());
                }
            }
            if !data.bridging.is_empty() {
                let mut items = Vec::with_capacity(data.bridging.len());
                for link in data.bridging.iter() {
                    let target = self.entity_ref(link.target)?;
                    items.push(format!("{}:{}", target.eid, link.relation));
                }
                put(BRIDGING, items.join(","));
            }
            if first_of_entity && !entity.split_ante.is_empty() {
                let mut antes = entity.split_ante.clone();
                self.sort_entity_ids(&mut antes);
                let mut eids = Vec::with_capacity(antes.len());
                for ante in antes {
                    eids.push(self.entity_ref(ante)?.eid.clone());
                }
                put(SPLIT_ANTE, eids.join(","));
            }
            if let Some(misc) = data.misc.as_ref() {
                put(MENTION_MISC, misc.clone());
            }
        }

        for id in self.entities() {
            let entity = self.entity_ref(id)?;
            if entity.mentions.is_empty()
                && (entity.etype.is_some() || !entity.split_ante.is_empty())
            {
                tracing::debug!(
                    "[Document::store] {} has no mention; its type and split antecedents are not stored",
                    entity.eid
                );
            }
        }
        for node in self.nodes.iter_mut().flatten() {
            node.misc.retain(|key, _| !is_coref_key(key));
        }
        for (node, key, value) in writes {
            self.node_data_mut(node)?.misc.insert(key, value);
        }
        tracing::debug!("stored {} mentions", mentions.len());
        Ok(())
    }

    /// Rebuild the coreference model from the MISC bags. Every attribute is parsed and checked
    /// before the current model is dropped, so a failed load leaves the document untouched.
    ///
    /// A successful load invalidates every [EntityId] and [super::MentionId] taken before it;
    /// look entities up again with [Document::entity_by_eid].
    #[tracing::instrument(skip_all, fields(document = %self.id))]
    pub fn load(&mut self) -> Result<(), TreebankError> {
        let raw = self.read_raw_mentions()?;

        // The model is rebuilt from scratch; entity and mention handles start over at zero.
        self.mentions.clear();
        self.entities.clear();
        for node in self.nodes.iter_mut().flatten() {
            node.mentions.clear();
        }
        self.eid_index.clear();

        let mut created = Vec::with_capacity(raw.len());
        for mention in raw.iter() {
            let entity = self.entity_for_eid(&mention.eid)?;
            match (self.entity_ref(entity)?.etype.clone(), mention.etype.clone()) {
                (None, Some(etype)) => self.entity_data_mut(entity)?.etype = Some(etype),
                (Some(kept), Some(ignored)) if kept != ignored => {
                    self.warn(ConsistencyWarning::ConflictingEntityType {
                        eid: mention.eid.clone(),
                        kept,
                        ignored,
                    })
                }
                _ => {}
            }
            let id = self.create_mention(entity, mention.head, Some(mention.words.as_slice()))?;
            self.mention_data_mut(id)?.misc = mention.misc.clone();
            created.push((id, entity));
        }

        let mut referenced_by: BTreeMap<EntityId, String> = BTreeMap::new();
        for (mention, (id, entity)) in raw.iter().zip(created) {
            for (target_eid, relation) in mention.bridging.iter() {
                let target = self.entity_for_eid(target_eid)?;
                if target == entity {
                    self.warn(ConsistencyWarning::DroppedSelfReference {
                        eid: mention.eid.clone(),
                        relation: BRIDGING.to_string(),
                    });
                    continue;
                }
                referenced_by
                    .entry(target)
                    .or_insert_with(|| mention.eid.clone());
                self.mention_data_mut(id)?.bridging.push(BridgingLink {
                    target,
                    relation: relation.clone(),
                });
            }
            for ante_eid in mention.split_ante.iter() {
                let ante = self.entity_for_eid(ante_eid)?;
                if ante == entity {
                    self.warn(ConsistencyWarning::DroppedSelfReference {
                        eid: mention.eid.clone(),
                        relation: SPLIT_ANTE.to_string(),
                    });
                    continue;
                }
                referenced_by
                    .entry(ante)
                    .or_insert_with(|| mention.eid.clone());
                let data = self.entity_data_mut(entity)?;
                if !data.split_ante.contains(&ante) {
                    data.split_ante.push(ante);
                }
            }
        }

        for (entity, referencing_eid) in referenced_by {
            let data = self.entity_ref(entity)?;
            if data.mentions.is_empty() {
                let eid = data.eid.clone();
                self.warn(ConsistencyWarning::UndefinedEntity {
                    eid,
                    referenced_by: referencing_eid,
                });
            }
        }
        tracing::debug!("loaded {} mentions", raw.len());
        Ok(())
    }

    fn entity_for_eid(&mut self, eid: &str) -> Result<EntityId, TreebankError> {
        match self.entity_by_eid(eid) {
            Some(id) => Ok(id),
            None => self.create_entity(Some(eid)),
        }
    }

    fn read_raw_mentions(&self) -> Result<Vec<RawMention>, TreebankError> {
        let mut raw = Vec::new();
        for node in self.all_nodes() {
            let data = self.node_ref(node)?;
            for idx in 0.. {
                let Some(eid) = data.misc.get(&indexed(CLUSTER_ID, idx)) else {
                    break;
                };
                let eid = eid.trim();
                if !is_valid_eid(eid) {
                    return Err(TreebankError::Structure(format!(
                        "{node} ({}): '{eid}' is not a valid entity id",
                        data.ord()
                    )));
                }
                let words = match data.misc.get(&indexed(MENTION_SPAN, idx)) {
                    Some(span) => {
                        let words = self.span_decode(data.tree(), span)?;
                        if !words.contains(&node) {
                            return Err(TreebankError::InvalidMention(format!(
                                "head {} of entity {eid} lies outside its span '{span}'",
                                data.ord()
                            )));
                        }
                        words
                    }
                    None => vec![node],
                };
                let bridging = match data.misc.get(&indexed(BRIDGING, idx)) {
                    Some(value) => parse_bridging(value)?,
                    None => Vec::new(),
                };
                let split_ante = data
                    .misc
                    .get(&indexed(SPLIT_ANTE, idx))
                    .map(|value| {
                        value
                            .split(',')
                            .map(str::trim)
                            .filter(|e| !e.is_empty())
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                raw.push(RawMention {
                    head: node,
                    words,
                    eid: eid.to_string(),
                    etype: data
                        .misc
                        .get(&indexed(CLUSTER_TYPE, idx))
                        .filter(|t| !t.is_empty())
                        .map(str::to_string),
                    bridging,
                    split_ante,
                    misc: data
                        .misc
                        .get(&indexed(MENTION_MISC, idx))
                        .filter(|m| !m.is_empty())
                        .map(str::to_string),
                });
            }
        }
        for mention in raw.iter() {
            let referenced = mention
                .bridging
                .iter()
                .map(|(eid, _)| eid)
                .chain(mention.split_ante.iter());
            for eid in referenced {
                if !is_valid_eid(eid) {
                    return Err(TreebankError::Structure(format!(
                        "'{eid}' referenced by entity {} is not a valid entity id",
                        mention.eid
                    )));
                }
            }
        }
        Ok(raw)
    }

    /// Normalized view of the coreference model, independent of handles and entity ids. Only
    /// what [Document::store] can express is included: entities with mentions, and entities
    /// without mentions that are still referenced by a bridging link or split antecedent.
    ///
    /// Attributes are written on mention heads, so a mentionless entity survives a store/load
    /// cycle as a bare id: its type and split antecedents are left out of the snapshot.
    pub fn coref_snapshot(&self) -> Result<CorefSnapshot, TreebankError> {
        let mut referenced = BTreeSet::new();
        for id in self.entities() {
            let entity = self.entity_ref(id)?;
            if entity.mentions.is_empty() {
                continue;
            }
            referenced.extend(entity.split_ante.iter().copied());
            for mention in entity.mentions.iter() {
                referenced.extend(self.mention_ref(*mention)?.bridging.iter().map(|l| l.target));
            }
        }
        let entities: Vec<EntityId> = self
            .entities()
            .into_iter()
            .filter(|id| {
                referenced.contains(id)
                    || self.entity(*id).is_some_and(|e| !e.mentions.is_empty())
            })
            .collect();
        let rank: BTreeMap<EntityId, usize> = entities
            .iter()
            .enumerate()
            .map(|(rank, id)| (*id, rank))
            .collect();
        let mut snapshot = CorefSnapshot::default();
        for id in entities.iter() {
            let entity = self.entity_ref(*id)?;
            let storable = !entity.mentions.is_empty();
            let mut split_ante: Vec<usize> = if storable {
                entity.split_ante.iter().filter_map(|e| rank.get(e).copied()).collect()
            } else {
                Vec::new()
            };
            split_ante.sort_unstable();
            let mut mentions = Vec::with_capacity(entity.mentions.len());
            for mention in entity.mentions.iter() {
                let data = self.mention_ref(*mention)?;
                let mut words = Vec::with_capacity(data.words.len());
                for word in data.words.iter() {
                    words.push(self.position(*word)?);
                }
                mentions.push(MentionSnapshot {
                    head: self.position(data.head)?,
                    words,
                    bridging: data
                        .bridging
                        .iter()
                        .filter_map(|l| rank.get(&l.target).map(|r| (*r, l.relation.clone())))
                        .collect(),
                    misc: data.misc.clone(),
                });
            }
            snapshot.entities.push(EntitySnapshot {
                etype: entity.etype.clone().filter(|_| storable),
                mentions,
                split_ante,
            });
        }
        Ok(snapshot)
    }
}

/// `eid:relation,eid:relation`. The relation is everything after the first `:`, kept verbatim.
fn parse_bridging(value: &str) -> Result<Vec<(String, String)>, TreebankError> {
    let mut links = Vec::new();
    for item in value.split(',').filter(|i| !i.trim().is_empty()) {
        let (eid, relation) = item.split_once(':').ok_or_else(|| {
            TreebankError::Structure(format!("bridging entry '{item}' lacks ':'"))
        })?;
        links.push((eid.trim().to_string(), relation.to_string()));
    }
    Ok(links)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorefSnapshot {
    pub entities: Vec<EntitySnapshot>,
}

/// Entities refer to each other by their rank in entity order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub etype: Option<String>,
    pub mentions: Vec<MentionSnapshot>,
    pub split_ante: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentionSnapshot {
    pub head: NodePosition,
    pub words: Vec<NodePosition>,
    pub bridging: Vec<(usize, String)>,
    pub misc: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{node::InsertPosition, tree::TreeId};
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
    fn test_store_layout() {
        let (mut doc, _tree, n) = sentence(4);
        let a = doc.create_entity(None).unwrap();
        let b = doc.create_entity(None).unwrap();
        doc.set_etype(a, Some("person".to_string())).unwrap();
        doc.create_mention(a, n[1], Some(&[n[0], n[1], n[2]])).unwrap();
        let mb = doc.create_mention(b, n[1], None).unwrap();
        doc.add_bridging(mb, a, "part").unwrap();
        doc.node_mut(n[3])
            .unwrap()
            .misc
            .insert("ClusterId[3]", "stale");
        doc.node_mut(n[3]).unwrap().misc.insert("SpaceAfter", "No");

        doc.store().unwrap();
        assert_eq!(
            doc.node(n[1]).unwrap().misc.to_string(),
            "ClusterId=e1|MentionSpan=1-3|ClusterType=person|ClusterId[1]=e2|MentionSpan[1]=2|Bridging[1]=e1:part"
        );
        assert_eq!(doc.node(n[3]).unwrap().misc.to_string(), "SpaceAfter=No");
    }

    #[test]
    fn test_load_roundtrip() {
        let (mut doc, _tree, n) = sentence(5);
        let e = doc
            .create_empty_child(n[2], "nsubj", InsertPosition::After)
            .unwrap();
        let a = doc.create_entity(None).unwrap();
        let b = doc.create_entity(None).unwrap();
        let c = doc.create_entity(None).unwrap();
        doc.create_mention(a, n[0], None).unwrap();
        doc.create_mention(b, n[4], None).unwrap();
        let mc = doc.create_mention(c, e, Some(&[n[2], e, n[3]])).unwrap();
        doc.set_split_ante(c, &[b, a]).unwrap();
        doc.set_mention_misc(mc, Some("Gap:none".to_string())).unwrap();
        let before = doc.coref_snapshot().unwrap();

        doc.store().unwrap();
        assert_eq!(doc.node(e).unwrap().misc.get("SplitAnte"), Some("e1,e2"));
        doc.load().unwrap();
        assert_eq!(doc.coref_snapshot().unwrap(), before);
        assert!(doc.warnings().is_empty());
        assert!(doc.built_in_test(false).is_empty());
    }

    #[test]
    fn test_load_rejects_head_outside_span() {
        let (mut doc, _tree, n) = sentence(3);
        let e = doc.create_entity(None).unwrap();
        doc.create_mention(e, n[0], None).unwrap();
        doc.node_mut(n[2]).unwrap().misc.insert("ClusterId", "e9");
        doc.node_mut(n[2]).unwrap().misc.insert("MentionSpan", "1-2");
        assert!(matches!(doc.load(), Err(TreebankError::InvalidMention(_))));
        // A failed load leaves the model alone.
        assert_eq!(doc.mentions().len(), 1);

        doc.node_mut(n[2]).unwrap().misc.insert("MentionSpan", "3-x");
        assert!(matches!(
            doc.load(),
            Err(TreebankError::MalformedSpan { .. })
        ));
        doc.node_mut(n[2]).unwrap().misc.insert("MentionSpan", "3");
        doc.node_mut(n[2]).unwrap().misc.insert("Bridging", "e1");
        assert!(matches!(doc.load(), Err(TreebankError::Structure(_))));
    }

    #[test]
    fn test_load_recovers_oddities() {
        let (mut doc, _tree, n) = sentence(3);
        let misc = &mut doc.node_mut(n[0]).unwrap().misc;
        misc.insert("ClusterId", "e1");
        misc.insert("ClusterType", "person");
        misc.insert("Bridging", "e1:self,e7:part");
        let misc = &mut doc.node_mut(n[1]).unwrap().misc;
        misc.insert("ClusterId", "e1");
        misc.insert("ClusterType", "place");
        misc.insert("SplitAnte", "e1");

        doc.load().unwrap();
        let e1 = doc.entity_by_eid("e1").unwrap();
        let e7 = doc.entity_by_eid("e7").unwrap();
        assert_eq!(doc.entity(e1).unwrap().etype(), Some("person"));
        assert_eq!(doc.entity(e1).unwrap().mentions().len(), 2);
        assert!(doc.entity(e7).unwrap().mentions().is_empty());
        let warnings = doc.take_warnings();
        assert_eq!(
            warnings
                .iter()
                .filter(|w| matches!(w, ConsistencyWarning::DroppedSelfReference { .. }))
                .count(),
            2
        );
        assert!(warnings
            .iter()
            .any(|w| matches!(w, ConsistencyWarning::ConflictingEntityType { .. })));
        assert!(warnings.iter().any(
            |w| matches!(w, ConsistencyWarning::UndefinedEntity { eid, .. } if eid == "e7")
        ));

        // The placeholder entity survives a store/load cycle.
        doc.store().unwrap();
        assert_eq!(doc.node(n[0]).unwrap().misc.get("Bridging"), Some("e7:part"));
        doc.load().unwrap();
        assert!(doc.entity_by_eid("e7").is_some());
        assert!(doc.built_in_test(false).is_empty());
    }

    #[test]
    fn test_mentionless_entity_roundtrips_as_bare_id() {
        let (mut doc, _tree, n) = sentence(3);
        let a = doc.create_entity(Some("a")).unwrap();
        let b = doc.create_entity(Some("b")).unwrap();
        let c = doc.create_entity(Some("c")).unwrap();
        let ma = doc.create_mention(a, n[0], None).unwrap();
        doc.create_mention(c, n[2], None).unwrap();
        doc.add_bridging(ma, b, "part").unwrap();
        doc.set_etype(b, Some("person".to_string())).unwrap();
        doc.set_split_ante(b, &[c]).unwrap();

        let before = doc.coref_snapshot().unwrap();
        assert_eq!(before.entities.len(), 3);
        assert_eq!(before.entities[0].etype, None);
        assert!(before.entities[0].split_ante.is_empty());

        doc.store().unwrap();
        doc.load().unwrap();
        assert_eq!(doc.coref_snapshot().unwrap(), before);
        let b = doc.entity_by_eid("b").unwrap();
        assert_eq!(doc.entity(b).unwrap().etype(), None);
        assert!(doc.entity(b).unwrap().split_ante().is_empty());
    }

    #[test]
    fn test_bridging_relation_kept_verbatim() {
        let (mut doc, _tree, n) = sentence(2);
        let a = doc.create_entity(None).unwrap();
        let b = doc.create_entity(None).unwrap();
        let ma = doc.create_mention(a, n[0], None).unwrap();
        doc.create_mention(b, n[1], None).unwrap();
        doc.add_bridging(ma, b, " part of ").unwrap();

        let before = doc.coref_snapshot().unwrap();
        doc.store().unwrap();
        doc.load().unwrap();
        assert_eq!(doc.coref_snapshot().unwrap(), before);
        let ma = doc.coref_mentions(n[0]).unwrap()[0];
        assert_eq!(doc.mention(ma).unwrap().bridging()[0].relation, " part of ");
    }

    #[test]
    fn test_repeated_loads_do_not_grow_arenas() {
        let (mut doc, _tree, n) = sentence(3);
        let a = doc.create_entity(None).unwrap();
        let b = doc.create_entity(None).unwrap();
        doc.create_mention(a, n[0], Some(&[n[0], n[1]])).unwrap();
        doc.create_mention(b, n[2], None).unwrap();
        doc.store().unwrap();
        for _ in 0..5 {
            doc.load().unwrap();
            doc.store().unwrap();
        }
        assert_eq!(doc.entities.len(), 2);
        assert_eq!(doc.mentions.len(), 2);
        assert_eq!(doc.entities().len(), 2);
        assert!(doc.built_in_test(false).is_empty());
    }
}
