//! Pipeline configuration
//!
//! Loaded from YAML. Every section has defaults so an empty file (or no
//! file at all) yields a usable configuration. Components receive the
//! section they need at construction time.

use crate::relations::EdgeRule;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid YAML in {path}: {source}")]
    Yaml {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Per-kind sample caps used when building an inference request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleBudget {
    /// Max markup samples (sparser, so more of them)
    pub markup: usize,
    /// Max structured-data samples
    pub structured: usize,
}

impl Default for SampleBudget {
    fn default() -> Self {
        Self {
            markup: 10,
            structured: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Max concurrent inference calls across categories
    pub concurrency: usize,
    /// Upper bound on a single call, enforced by the command client
    pub timeout_secs: u64,
    /// Program and arguments for the command client
    pub command: Vec<String>,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            timeout_secs: 120,
            command: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// category -> keywords signalling that category
    pub keywords: BTreeMap<String, Vec<String>>,
    /// Minimum keyword hits before a heuristic match counts
    pub min_keyword_hits: usize,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            keywords: BTreeMap::new(),
            min_keyword_hits: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub concurrency: usize,
    /// Additional opaque-id regexes scanned for cross-references
    pub extra_id_patterns: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            extra_id_patterns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationshipConfig {
    /// Consulted before the built-in rule table
    pub rules: Vec<EdgeRule>,
}

pub const DEFAULT_INSTRUCTION: &str = "You are analyzing records exported from a world-building tool. \
All records below belong to the '{category}' category. Identify the entity type(s) they describe \
and list every field that appears across the samples. For each field give its type \
(string, number, boolean, identifier, cross_reference, nested_object), mark the field that \
uniquely identifies a record as is_identifier, and mark fields whose values are ids of other \
records as is_cross_reference. Respond with JSON matching the provided schema only.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstructionConfig {
    /// Template with a `{category}` placeholder
    pub default_instruction: String,
    /// Full-text overrides per category
    pub categories: BTreeMap<String, String>,
}

impl Default for InstructionConfig {
    fn default() -> Self {
        Self {
            default_instruction: DEFAULT_INSTRUCTION.to_string(),
            categories: BTreeMap::new(),
        }
    }
}

impl InstructionConfig {
    /// The "what to look for" prompt for a category.
    pub fn instruction_for(&self, category: &str) -> String {
        match self.categories.get(category) {
            Some(text) => text.clone(),
            None => self.default_instruction.replace("{category}", category),
        }
    }
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub sampling: SampleBudget,
    pub inference: InferenceConfig,
    pub routing: RoutingConfig,
    pub ingest: IngestConfig,
    pub instructions: InstructionConfig,
    pub relationships: RelationshipConfig,
}

impl PipelineConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str, origin: &str) -> Result<Self, ConfigError> {
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(yaml).map_err(|source| ConfigError::Yaml {
                path: origin.to_string(),
                source,
            })?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&text, &path.display().to_string())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sampling.markup < self.sampling.structured {
            return Err(ConfigError::Invalid(format!(
                "sampling.markup ({}) must be >= sampling.structured ({})",
                self.sampling.markup, self.sampling.structured
            )));
        }
        if self.inference.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "inference.concurrency must be at least 1".to_string(),
            ));
        }
        if self.ingest.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "ingest.concurrency must be at least 1".to_string(),
            ));
        }
        for pattern in &self.ingest.extra_id_patterns {
            regex_lite::Regex::new(pattern).map_err(|e| {
                ConfigError::Invalid(format!("bad extra_id_pattern '{}': {}", pattern, e))
            })?;
        }
        for rule in &self.relationships.rules {
            rule.compile().map_err(|e| {
                ConfigError::Invalid(format!("bad relationship rule '{}': {}", rule.field_pattern, e))
            })?;
        }
        Ok(())
    }
}
