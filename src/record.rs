//! Ingested record representation
//!
//! A `RawRecord` is created once by the ingestor and never mutated
//! afterwards. Routing produces a copy with `category` filled in.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Opaque record identifier, stable across runs.
///
/// Identifiers are normalized (trimmed, lowercased) so that ids derived
/// from source keys compare equal to cross-references scanned from content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(id.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// How a fragment's content was interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// Parsed as a JSON document
    StructuredData,
    /// Anything that failed strict JSON parsing (HTML, Markdown, prose)
    Markup,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StructuredData => "structured_data",
            Self::Markup => "markup",
        }
    }
}

/// An embedded map coordinate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapCoord {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell_id: Option<String>,
}

/// One ingested fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub id: RecordId,
    pub content_kind: ContentKind,
    pub raw_content: String,
    #[serde(default)]
    pub canonical_name: Option<String>,
    /// Null until routed
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub spatial_key: Option<String>,
    #[serde(default)]
    pub map_coord: Option<MapCoord>,
    /// Referenced ids, deduplicated and sorted
    #[serde(default)]
    pub cross_ref_ids: BTreeSet<RecordId>,
}

impl RawRecord {
    /// A record with only the required fields set.
    pub fn new(id: impl Into<RecordId>, content_kind: ContentKind, raw_content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content_kind,
            raw_content: raw_content.into(),
            canonical_name: None,
            category: None,
            spatial_key: None,
            map_coord: None,
            cross_ref_ids: BTreeSet::new(),
        }
    }

    /// Copy of this record assigned to `category`.
    pub fn routed_to(&self, category: impl Into<String>) -> Self {
        Self {
            category: Some(category.into()),
            ..self.clone()
        }
    }

    pub fn is_routed(&self) -> bool {
        self.category.is_some()
    }

    pub fn is_structured(&self) -> bool {
        self.content_kind == ContentKind::StructuredData
    }
}
