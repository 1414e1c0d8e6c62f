//! [Document]: the owner of every object in one processed document.
//!
//! A document is an ordered sequence of [Bundle]s; each bundle holds one [crate::tree::Tree] per
//! annotation zone for the same sentence. Nodes, multiword tokens, entities and mentions all live
//! in arenas owned by the document and refer to each other through `Copy` handles. The handles
//! are the single authoritative link; the inverse indices (children lists, the per-tree ordered
//! node list, the per-node mention index) are derived and kept current by the mutating methods.
//!
//! [Document::built_in_test] re-derives those indices and reports every violated invariant. It is
//! meant for tests and debugging, not for the hot path.

use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::{self, Display, Formatter},
};

use crate::{
    config::{CorefConfig, EntityIdGenerator},
    coref::{Entity, EntityId, Mention, MentionId},
    diagnostic::ConsistencyWarning,
    error::TreebankError,
    mwt::{MultiwordToken, MwtId},
    node::{Node, NodeId},
    tree::{Tree, TreeId},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BundleId(pub(crate) u32);

impl BundleId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl Display for BundleId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "bundle#{}", self.0)
    }
}

/// Parallel trees (one per zone) for one sentence.
#[derive(Debug, Clone, Default)]
pub struct Bundle {
    pub id: String,
    pub(crate) trees: Vec<TreeId>,
}

impl Bundle {
    /// Trees in zone order.
    pub fn trees(&self) -> &[TreeId] {
        &self.trees
    }
}

#[derive(Debug, Default)]
pub struct Document {
    pub id: String,
    pub(crate) bundles: Vec<Bundle>,
    pub(crate) trees: Vec<Option<Tree>>,
    pub(crate) nodes: Vec<Option<Node>>,
    pub(crate) mwts: Vec<Option<MultiwordToken>>,
    pub(crate) entities: Vec<Option<Entity>>,
    pub(crate) mentions: Vec<Option<Mention>>,
    pub(crate) eid_index: BTreeMap<String, EntityId>,
    pub(crate) config: CorefConfig,
    pub(crate) id_generator: EntityIdGenerator,
    warnings: Vec<ConsistencyWarning>,
}

impl Display for Document {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Document({} bundles, {} nodes, {} entities, {} mentions)",
            self.bundles.len(),
            self.nodes.iter().flatten().count(),
            self.entities.iter().flatten().count(),
            self.mentions.iter().flatten().count()
        )
    }
}

impl Document {
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_config(id, CorefConfig::default())
    }

    pub fn with_config(id: impl Into<String>, config: CorefConfig) -> Self {
        let id_generator = config.id_generator();
        Document {
            id: id.into(),
            config,
            id_generator,
            ..Default::default()
        }
    }

    /// Continue entity numbering from a generator taken from a previous document.
    pub fn with_id_generator(mut self, id_generator: EntityIdGenerator) -> Self {
        self.id_generator = id_generator;
        self
    }

    /// Hand the entity id generator over to the next document of a run.
    pub fn take_id_generator(&mut self) -> EntityIdGenerator {
        std::mem::replace(&mut self.id_generator, self.config.id_generator())
    }

    pub fn config(&self) -> &CorefConfig {
        &self.config
    }

    pub fn warnings(&self) -> &[ConsistencyWarning] {
        &self.warnings
    }

    pub fn take_warnings(&mut self) -> Vec<ConsistencyWarning> {
        std::mem::take(&mut self.warnings)
    }

    pub(crate) fn warn(&mut self, warning: ConsistencyWarning) {
        tracing::warn!("[Document {}] {}", self.id, warning);
        self.warnings.push(warning);
    }

    pub fn create_bundle(&mut self, id: impl Into<String>) -> BundleId {
        let bundle_id = BundleId(self.bundles.len() as u32);
        self.bundles.push(Bundle {
            id: id.into(),
            trees: Vec::new(),
        });
        bundle_id
    }

    pub fn bundle(&self, id: BundleId) -> Option<&Bundle> {
        self.bundles.get(id.index())
    }

    pub fn bundles(&self) -> impl Iterator<Item = (BundleId, &Bundle)> {
        self.bundles
            .iter()
            .enumerate()
            .map(|(idx, bundle)| (BundleId(idx as u32), bundle))
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }

    /// Mutable access to a node's annotations. Structure is only reachable through `Document`.
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.index()).and_then(Option::as_mut)
    }

    pub fn is_alive(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    /// Every live node of the document, trees in document order, nodes in position order.
    pub fn all_nodes(&self) -> Vec<NodeId> {
        self.trees()
            .into_iter()
            .flat_map(|tree| self.tree_ref(tree).map(|t| t.order.clone()).unwrap_or_default())
            .collect()
    }

    pub(crate) fn node_ref(&self, id: NodeId) -> Result<&Node, TreebankError> {
        self.node(id)
            .ok_or_else(|| TreebankError::NotFound(format!("{id} is not a live node")))
    }

    pub(crate) fn node_data_mut(&mut self, id: NodeId) -> Result<&mut Node, TreebankError> {
        self.node_mut(id)
            .ok_or_else(|| TreebankError::NotFound(format!("{id} is not a live node")))
    }

    pub(crate) fn alloc_node(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Some(node));
        id
    }

    pub(crate) fn tree_ref(&self, id: TreeId) -> Result<&Tree, TreebankError> {
        self.trees
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or_else(|| TreebankError::NotFound(format!("{id} is not a live tree")))
    }

    pub(crate) fn tree_data_mut(&mut self, id: TreeId) -> Result<&mut Tree, TreebankError> {
        self.trees
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or_else(|| TreebankError::NotFound(format!("{id} is not a live tree")))
    }

    pub(crate) fn mwt_ref(&self, id: MwtId) -> Result<&MultiwordToken, TreebankError> {
        self.mwts
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or_else(|| TreebankError::NotFound(format!("{id} is not a live multiword token")))
    }

    pub(crate) fn entity_ref(&self, id: EntityId) -> Result<&Entity, TreebankError> {
        self.entities
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or_else(|| TreebankError::NotFound(format!("{id} is not a live entity")))
    }

    pub(crate) fn entity_data_mut(&mut self, id: EntityId) -> Result<&mut Entity, TreebankError> {
        self.entities
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or_else(|| TreebankError::NotFound(format!("{id} is not a live entity")))
    }

    pub(crate) fn mention_ref(&self, id: MentionId) -> Result<&Mention, TreebankError> {
        self.mentions
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or_else(|| TreebankError::NotFound(format!("{id} is not a live mention")))
    }

    pub(crate) fn mention_data_mut(
        &mut self,
        id: MentionId,
    ) -> Result<&mut Mention, TreebankError> {
        self.mentions
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or_else(|| TreebankError::NotFound(format!("{id} is not a live mention")))
    }

    /// Re-derive every index from the authoritative data and list the violated invariants. An
    /// empty result means the document is consistent. When `full` is set, enhanced-graph cycles
    /// are logged as well (they are permitted, so they never count as errors).
    pub fn built_in_test(&self, full: bool) -> Vec<String> {
        let mut errors = Vec::new();
        for tree in self.trees() {
            self.check_tree_invariants(tree, &mut errors);
            if full {
                let cycles = self.enhanced_cycles(tree);
                if !cycles.is_empty() {
                    tracing::debug!(
                        "[Document::built_in_test] {tree} has enhanced cycles: {cycles:?}"
                    );
                }
            }
        }
        self.check_mwt_invariants(&mut errors);
        self.check_coref_invariants(&mut errors);
        if !errors.is_empty() {
            tracing::debug!(
                "[Document::built_in_test] {} violations:\n- {}",
                errors.len(),
                errors.join("\n- ")
            );
        }
        errors
    }
}
