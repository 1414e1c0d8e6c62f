//! Configuration for the coreference layer.
//!
//! Entity ids are generated from explicit state ([EntityIdGenerator]) rather than a process-wide
//! counter. Two documents processed independently in the same process never share numbering
//! unless the caller hands the generator from one to the other.

use serde::{Deserialize, Serialize};
use std::{
    fs::{read_to_string, write},
    path::Path,
};

use crate::error::TreebankError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorefConfig {
    /// Prefix of generated entity ids (`e` yields `e1`, `e2`, …).
    pub eid_prefix: String,
    /// First number handed out by the generator.
    pub eid_start: u32,
    /// Increment between consecutive generated numbers.
    pub eid_step: u32,
    /// When false, `ClusterType` is only stored on the first mention of each entity.
    pub type_on_every_mention: bool,
}

impl Default for CorefConfig {
    fn default() -> Self {
        CorefConfig {
            eid_prefix: "e".to_string(),
            eid_start: 1,
            eid_step: 1,
            type_on_every_mention: true,
        }
    }
}

impl CorefConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, TreebankError> {
        let config: CorefConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, TreebankError> {
        tracing::debug!("Reading coref config from {:?}", path.as_ref());
        let content = read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String, TreebankError> {
        Ok(toml::to_string(self)?)
    }

    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<(), TreebankError> {
        tracing::debug!("Writing coref config to {:?}", path.as_ref());
        write(path, self.to_toml_string()?)?;
        Ok(())
    }

    fn validate(&self) -> Result<(), TreebankError> {
        if self.eid_step == 0 {
            return Err(TreebankError::Serialization(
                "eid_step must be greater than zero".to_string(),
            ));
        }
        if !is_valid_eid(&self.eid_prefix) {
            return Err(TreebankError::Serialization(format!(
                "eid_prefix '{}' must be non-empty and free of separator characters",
                self.eid_prefix
            )));
        }
        Ok(())
    }

    pub fn id_generator(&self) -> EntityIdGenerator {
        EntityIdGenerator {
            prefix: self.eid_prefix.clone(),
            next: self.eid_start,
            step: self.eid_step,
        }
    }
}

/// Entity ids end up inside `Key=Value|...` annotation text and `eid:relation,...` lists, so they
/// may not contain those separators.
pub(crate) fn is_valid_eid(eid: &str) -> bool {
    !eid.is_empty()
        && !eid
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, ',' | ':' | '|' | '=' | '+'))
}

/// Hands out entity ids `prefix + n` for `n = start, start + step, …`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityIdGenerator {
    prefix: String,
    next: u32,
    step: u32,
}

impl Default for EntityIdGenerator {
    fn default() -> Self {
        CorefConfig::default().id_generator()
    }
}

impl EntityIdGenerator {
    /// Return the next id for which `taken` is false.
    pub fn next_id<F: Fn(&str) -> bool>(&mut self, taken: F) -> String {
        loop {
            let candidate = format!("{}{}", self.prefix, self.next);
            self.next = self.next.saturating_add(self.step);
            if !taken(&candidate) {
                return candidate;
            }
        }
    }

    /// Number the next generated id will carry, ignoring collisions.
    pub fn peek(&self) -> u32 {
        self.next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_config_defaults_from_partial_toml() {
        let config = CorefConfig::from_toml_str("eid_prefix = \"c\"\neid_start = 10").unwrap();
        assert_eq!(config.eid_prefix, "c");
        assert_eq!(config.eid_start, 10);
        assert_eq!(config.eid_step, 1);
        assert!(config.type_on_every_mention);
    }

    #[test]
    fn test_config_rejects_zero_step() {
        let result = CorefConfig::from_toml_str("eid_step = 0");
        assert!(matches!(result, Err(TreebankError::Serialization(_))));
        let result = CorefConfig::from_toml_str("eid_prefix = \"a,b\"");
        assert!(matches!(result, Err(TreebankError::Serialization(_))));
    }

    #[test]
    fn test_config_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coref.toml");
        let config = CorefConfig {
            eid_prefix: "ent".to_string(),
            eid_start: 5,
            eid_step: 5,
            type_on_every_mention: false,
        };
        config.write_to(&path).unwrap();
        assert_eq!(CorefConfig::from_path(&path).unwrap(), config);
        assert!(matches!(
            CorefConfig::from_path(dir.path().join("missing.toml")),
            Err(TreebankError::NotFound(_))
        ));
    }

    #[test]
    fn test_generator_skips_taken_ids() {
        let mut generator = CorefConfig {
            eid_step: 2,
            ..Default::default()
        }
        .id_generator();
        assert_eq!(generator.next_id(|_| false), "e1");
        assert_eq!(generator.next_id(|id| id == "e3"), "e5");
        assert_eq!(generator.peek(), 7);
    }
}
