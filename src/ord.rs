//! Position keys for tree nodes.
//!
//! A [NodeOrd] is the textual position of a node within its sentence. Regular nodes carry an
//! integer key (`3`), empty nodes carry a fractional key anchored after a regular node (`3.1`,
//! `3.2`, …). The fractional part is a slot index, not a decimal fraction: `3.10` is the tenth slot
//! after word 3 and sorts after `3.9`, the same convention CoNLL-U uses for empty nodes.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use crate::error::TreebankError;

static ORD_LITERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)(?:\.(\d+))?$").expect("valid ord literal regex"));

/// Position key of a node. Ordered first by `word`, then by `empty`, so `3 < 3.1 < 3.2 < 4`.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct NodeOrd {
    /// Integer key. `0` is the root (and the anchor of empty nodes preceding the first word).
    pub word: u32,
    /// `0` for regular nodes, `1..` for empty nodes following `word`.
    pub empty: u32,
}

impl NodeOrd {
    pub const ROOT: NodeOrd = NodeOrd { word: 0, empty: 0 };

    pub fn word(word: u32) -> Self {
        NodeOrd { word, empty: 0 }
    }

    pub fn empty(word: u32, empty: u32) -> Self {
        NodeOrd { word, empty }
    }

    pub fn is_empty(&self) -> bool {
        self.empty > 0
    }

    pub fn is_root(&self) -> bool {
        *self == NodeOrd::ROOT
    }
}

impl Display for NodeOrd {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.empty == 0 {
            write!(f, "{}", self.word)
        } else {
            write!(f, "{}.{}", self.word, self.empty)
        }
    }
}

impl FromStr for NodeOrd {
    type Err = TreebankError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let caps = ORD_LITERAL
            .captures(trimmed)
            .ok_or_else(|| TreebankError::malformed_span(s, "not an ord literal"))?;
        let word = caps[1]
            .parse::<u32>()
            .map_err(|e| TreebankError::malformed_span(s, e.to_string()))?;
        let empty = match caps.get(2) {
            Some(sub) => {
                let empty = sub
                    .as_str()
                    .parse::<u32>()
                    .map_err(|e| TreebankError::malformed_span(s, e.to_string()))?;
                if empty == 0 {
                    return Err(TreebankError::malformed_span(
                        s,
                        "empty node slot must be at least 1",
                    ));
                }
                empty
            }
            None => 0,
        };
        Ok(NodeOrd { word, empty })
    }
}

impl From<u32> for NodeOrd {
    fn from(word: u32) -> Self {
        NodeOrd::word(word)
    }
}
