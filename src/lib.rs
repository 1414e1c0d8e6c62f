//! # deptree-core
//!
//! A mutable in-memory model of dependency-tree corpora with a document-level coreference layer.
//!
//! ## Overview
//!
//! deptree-core holds one document at a time: an ordered sequence of bundles, each bundle holding
//! one dependency tree per annotation zone. Nodes can be inserted, removed, reparented and moved
//! while the model keeps a strict left-to-right ordering. On top of the trees, a coreference layer
//! groups node spans ("mentions") into entities, with bridging and split-antecedent relations
//! between entities.
//!
//! ### Key Features
//!
//! - **Stable ordering**: regular nodes are always numbered `1..N`; empty (elided) nodes get
//!   `w.k` keys that are only renumbered when no free slot is left
//! - **Cycle-safe reparenting**: rejected before any mutation
//! - **Enhanced dependencies**: a secondary labelled graph per tree, exportable to `petgraph`
//! - **Span codec**: `"3-5,7,7.1-7.2"` strings that round-trip every node set, gaps included
//! - **Deterministic coreference**: one total order over mentions and entities drives
//!   serialization, so output diffs are reproducible
//! - **Error tolerance**: semantic oddities are recovered with a default action and reported as
//!   [`diagnostic::ConsistencyWarning`]s instead of aborting a batch
//!
//! ## Architecture
//!
//! - **[`document`]**: the [`Document`] arena that owns every object; all references are `Copy`
//!   handles (`NodeId`, `TreeId`, `EntityId`, `MentionId`, …)
//! - **[`tree`]**: tree creation, reparenting, removal, reordering and navigation
//! - **[`enhanced`]**: enhanced dependency edges
//! - **[`mwt`]**: multiword tokens
//! - **[`span`]**: the span string codec
//! - **[`coref`]**: entities, mentions, their total order and the MISC round trip
//! - **[`config`]**: entity id generation settings, loadable from TOML
//!
//! ## Quick Start
//!
//! ```rust
//! use deptree_core::{ChildPolicy, Document, InsertPosition, TreebankError};
//!
//! fn main() -> Result<(), TreebankError> {
//!     let mut doc = Document::new("doc1");
//!     let bundle = doc.create_bundle("s1");
//!     let tree = doc.create_tree(bundle, "en")?;
//!     let root = doc.root(tree)?;
//!
//!     let words: Vec<_> = (0..5)
//!         .map(|_| doc.create_child(root))
//!         .collect::<Result<_, _>>()?;
//!     doc.set_parent(words[0], words[1])?;
//!     let elided = doc.create_empty_child(words[2], "orphan", InsertPosition::After)?;
//!     assert_eq!(doc.node(elided).map(|n| n.ord().to_string()), Some("3.1".to_string()));
//!
//!     // Reparenting under a descendant is rejected.
//!     assert!(matches!(
//!         doc.set_parent(words[1], words[0]),
//!         Err(TreebankError::Cycle { .. })
//!     ));
//!
//!     let entity = doc.create_entity(None)?;
//!     let mention = doc.create_mention(entity, words[1], Some(&words[0..2]))?;
//!     assert_eq!(doc.span(mention)?, "1-2");
//!
//!     doc.store()?;
//!     assert_eq!(doc.node(words[1]).map(|n| n.misc.to_string()),
//!                Some("ClusterId=e1|MentionSpan=1-2".to_string()));
//!
//!     doc.remove(words[4], ChildPolicy::Rehang)?;
//!     assert!(doc.built_in_test(false).is_empty());
//!     Ok(())
//! }
//! ```
//!
//! ### Diagnostics
//!
//! Recoverable oddities never fail the call that meets them. They are logged through `tracing`
//! and collected on the document:
//!
//! ```rust
//! # use deptree_core::{Document, diagnostic::ConsistencyWarning};
//! # let mut doc = Document::new("doc1");
//! for warning in doc.take_warnings() {
//!     match warning {
//!         ConsistencyWarning::SameSpanAcrossEntities { span, .. } => println!("duplicate {span}"),
//!         other => println!("{other}"),
//!     }
//! }
//! ```

pub mod config;
pub mod coref;
pub mod diagnostic;
pub mod document;
pub mod enhanced;
pub mod error;
pub mod misc;
pub mod mwt;
pub mod node;
pub mod ord;
pub mod span;
pub mod tree;

pub use config::{CorefConfig, EntityIdGenerator};
pub use coref::{BridgingLink, Entity, EntityId, Mention, MentionId};
pub use document::{Bundle, BundleId, Document};
pub use error::*;
pub use misc::Misc;
pub use mwt::{MultiwordToken, MwtId};
pub use node::{ChildPolicy, EnhancedEdge, InsertPosition, Node, NodeId};
pub use ord::NodeOrd;
pub use tree::{NodePosition, Tree, TreeId};
