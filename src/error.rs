use std::{io, num::ParseIntError};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Every fallible operation on a [crate::document::Document] reports one of these.
///
/// Structural violations (`Cycle`, `InvalidMention`, `SelfReference`) are raised before any
/// mutation happens, so a caller that catches them sees the document exactly as it was before the
/// call. Non-fatal oddities are not errors; see [crate::diagnostic::ConsistencyWarning].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum TreebankError {
    #[error("Reparenting {node} under {parent} would create a cycle")]
    Cycle { node: String, parent: String },
    #[error("Invalid mention: {0}")]
    InvalidMention(String),
    #[error("Self reference: {0}")]
    SelfReference(String),
    #[error("Malformed span '{span}': {reason}")]
    MalformedSpan { span: String, reason: String },
    #[error("Item Not Found: {0}")]
    NotFound(String),
    #[error("Structural error: {0}")]
    Structure(String),
    #[error("(De)Serialization error: {0}")]
    Serialization(String),
    #[error("File System error: {0}")]
    Io(String),
}

impl TreebankError {
    pub fn malformed_span(span: &str, reason: impl Into<String>) -> Self {
        TreebankError::MalformedSpan {
            span: span.to_string(),
            reason: reason.into(),
        }
    }

    /// True for the errors that guard the structural invariants of the model.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            TreebankError::Cycle { .. }
                | TreebankError::InvalidMention(_)
                | TreebankError::SelfReference(_)
                | TreebankError::Structure(_)
        )
    }
}

impl From<toml::de::Error> for TreebankError {
    fn from(src: toml::de::Error) -> TreebankError {
        TreebankError::Serialization(format!("Toml deserialization error: {src}"))
    }
}

impl From<toml::ser::Error> for TreebankError {
    fn from(src: toml::ser::Error) -> TreebankError {
        TreebankError::Serialization(format!("Toml serialization error: {src}"))
    }
}

impl From<ParseIntError> for TreebankError {
    fn from(src: ParseIntError) -> TreebankError {
        TreebankError::Serialization(format!("Integer parse failed: {src}"))
    }
}

impl From<io::Error> for TreebankError {
    fn from(x: io::Error) -> Self {
        match x.kind() {
            io::ErrorKind::NotFound => TreebankError::NotFound(format!("{x}")),
            _ => TreebankError::Io(format!("IOError: {}", x.kind())),
        }
    }
}
