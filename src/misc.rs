//! [Misc] is the free-form annotation bag attached to every node and multiword token.
//!
//! It is an insertion-ordered string-to-string map. Apart from the coreference keys (see
//! [crate::coref::serialize]) nothing in this crate interprets its contents; readers and writers
//! round-trip it through the CoNLL-U MISC column text (`Key=Value|Flag|Other=x`, `_` when empty).
//! A bare flag (`Flag`) and a key with an empty value (`Key=`) are different entries and keep
//! their own spelling.

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use crate::error::TreebankError;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Misc {
    /// `None` marks a bare flag.
    entries: Vec<(String, Option<String>)>,
}

impl Misc {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of `key`. A bare flag reads as the empty string.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_deref().unwrap_or_default())
    }

    pub fn is_flag(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, v)| k == key && v.is_none())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Set `key` to `value`. An existing key keeps its position; a new key is appended.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.set(key.into(), Some(value.into()))
    }

    /// Set `key` as a bare flag, written without `=`.
    pub fn insert_flag(&mut self, key: impl Into<String>) -> Option<String> {
        self.set(key.into(), None)
    }

    fn set(&mut self, key: String, value: Option<String>) -> Option<String> {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => std::mem::replace(existing, value),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1.unwrap_or_default())
    }

    pub fn retain<F: FnMut(&str, &str) -> bool>(&mut self, mut f: F) {
        self.entries
            .retain(|(k, v)| f(k, v.as_deref().unwrap_or_default()));
    }

    /// Entries in insertion order; flags carry `None`.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Display for Misc {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.entries.is_empty() {
            return write!(f, "_");
        }
        let rendered = self
            .entries
            .iter()
            .map(|(k, v)| match v {
                Some(v) => format!("{k}={v}"),
                None => k.clone(),
            })
            .collect::<Vec<String>>()
            .join("|");
        write!(f, "{rendered}")
    }
}

impl FromStr for Misc {
    type Err = TreebankError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut misc = Misc::new();
        let s = s.trim();
        if s.is_empty() || s == "_" {
            return Ok(misc);
        }
        for item in s.split('|') {
            if item.is_empty() {
                return Err(TreebankError::Serialization(format!(
                    "Empty MISC item in '{s}'"
                )));
            }
            match item.split_once('=') {
                Some((k, v)) => misc.insert(k, v),
                None => misc.insert_flag(item),
            };
        }
        Ok(misc)
    }
}
