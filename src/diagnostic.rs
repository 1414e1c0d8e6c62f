//! Non-fatal diagnostics raised while mutating or loading a document.
//!
//! A [ConsistencyWarning] marks a semantic oddity that does not break any structural invariant.
//! The document applies a deterministic default, records the warning (see
//! [crate::document::Document::warnings]) and logs it, so batch processing can continue past a
//! single malformed sentence.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsistencyWarning {
    /// Two mentions of different entities cover exactly the same words.
    SameSpanAcrossEntities {
        span: String,
        kept: String,
        other: String,
        removed: bool,
    },
    /// An entity is referenced by bridging or split antecedents but no mention defines it.
    UndefinedEntity { eid: String, referenced_by: String },
    /// A bridging link or split antecedent would have pointed at its own entity.
    DroppedSelfReference { eid: String, relation: String },
    /// A bridging link or split antecedent pointed at an entity that has been destroyed.
    DanglingEntityReference { eid: String, referenced_by: String },
    /// Mentions of one entity disagree about the entity type.
    ConflictingEntityType {
        eid: String,
        kept: String,
        ignored: String,
    },
    /// A multiword token lost its consecutive word range and was dissolved.
    MultiwordTokenDissolved { form: String, reason: String },
    /// A mention lost all its words because the nodes were removed.
    MentionRemoved { eid: String, span: String },
}

impl Display for ConsistencyWarning {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsistencyWarning::SameSpanAcrossEntities {
                span,
                kept,
                other,
                removed,
            } => {
                if *removed {
                    write!(
                        f,
                        "Same-span mentions '{span}' in entities {kept} and {other}; removed the one in {other}"
                    )
                } else {
                    write!(
                        f,
                        "Same-span mentions '{span}' in entities {kept} and {other}; both kept"
                    )
                }
            }
            ConsistencyWarning::UndefinedEntity { eid, referenced_by } => write!(
                f,
                "Entity {eid} is referenced by {referenced_by} but has no mention"
            ),
            ConsistencyWarning::DroppedSelfReference { eid, relation } => {
                write!(f, "Dropped self-referencing {relation} of entity {eid}")
            }
            ConsistencyWarning::DanglingEntityReference { eid, referenced_by } => write!(
                f,
                "Dropped reference from {referenced_by} to destroyed entity {eid}"
            ),
            ConsistencyWarning::ConflictingEntityType { eid, kept, ignored } => write!(
                f,
                "Entity {eid} has conflicting types; kept '{kept}', ignored '{ignored}'"
            ),
            ConsistencyWarning::MultiwordTokenDissolved { form, reason } => {
                write!(f, "Multiword token '{form}' dissolved: {reason}")
            }
            ConsistencyWarning::MentionRemoved { eid, span } => {
                write!(f, "Mention '{span}' of entity {eid} lost all its words and was removed")
            }
        }
    }
}
