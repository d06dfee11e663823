//! Storage trait definitions

use crate::record::{RawRecord, RecordId};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown artifact phase: {0}")]
    UnknownPhase(String),

    #[error("Store lock poisoned")]
    Poisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// The phase an artifact belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactPhase {
    /// AI-inferred `Inventory` for one category
    Inventory,
    /// `GeneratedModel` for one category (phase 1 output)
    Model,
    /// Phase 2 container set
    SubContainers,
    /// Phase 3 container set
    TopContainers,
    /// Run statistics of the most recent run
    Stats,
}

impl ArtifactPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inventory => "inventory",
            Self::Model => "model",
            Self::SubContainers => "sub_containers",
            Self::TopContainers => "top_containers",
            Self::Stats => "stats",
        }
    }

    pub fn parse(s: &str) -> StorageResult<Self> {
        match s {
            "inventory" => Ok(Self::Inventory),
            "model" => Ok(Self::Model),
            "sub_containers" => Ok(Self::SubContainers),
            "top_containers" => Ok(Self::TopContainers),
            "stats" => Ok(Self::Stats),
            other => Err(StorageError::UnknownPhase(other.to_string())),
        }
    }
}

/// Address of one artifact blob: (scope, phase).
///
/// `scope` is a category name for per-category phases and a fixed
/// name for run-wide artifacts (see [`ArtifactKey::run`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactKey {
    pub scope: String,
    pub phase: ArtifactPhase,
}

impl ArtifactKey {
    /// Scope used for artifacts that aggregate across categories.
    pub const RUN_SCOPE: &'static str = "__run__";

    pub fn new(scope: impl Into<String>, phase: ArtifactPhase) -> Self {
        Self {
            scope: scope.into(),
            phase,
        }
    }

    pub fn inventory(category: &str) -> Self {
        Self::new(category, ArtifactPhase::Inventory)
    }

    pub fn model(category: &str) -> Self {
        Self::new(category, ArtifactPhase::Model)
    }

    pub fn run(phase: ArtifactPhase) -> Self {
        Self::new(Self::RUN_SCOPE, phase)
    }
}

impl std::fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.scope, self.phase.as_str())
    }
}

/// Durable store for staged records and phase artifacts.
///
/// Implementations must be thread-safe (Send + Sync): ingestion workers
/// and per-category inference tasks write concurrently. Writes for
/// distinct keys never conflict; a write for an existing key replaces it.
pub trait ArtifactStore: Send + Sync {
    // === Record staging ===

    /// Insert or replace a record keyed by its id
    fn save_record(&self, record: &RawRecord) -> StorageResult<()>;

    /// Load one staged record
    fn load_record(&self, id: &RecordId) -> StorageResult<Option<RawRecord>>;

    /// All staged records ordered by id
    fn load_records(&self) -> StorageResult<Vec<RawRecord>>;

    /// Number of staged records
    fn record_count(&self) -> StorageResult<usize>;

    // === Artifacts ===

    /// Write a blob (last writer wins)
    fn put_artifact(&self, key: &ArtifactKey, blob: &[u8]) -> StorageResult<()>;

    /// Read a blob, if present
    fn get_artifact(&self, key: &ArtifactKey) -> StorageResult<Option<Vec<u8>>>;

    /// Check presence without reading the blob
    fn has_artifact(&self, key: &ArtifactKey) -> StorageResult<bool>;

    /// Remove a blob; returns whether one existed
    fn delete_artifact(&self, key: &ArtifactKey) -> StorageResult<bool>;

    /// Keys stored for a phase, ordered by scope
    fn list_artifacts(&self, phase: ArtifactPhase) -> StorageResult<Vec<ArtifactKey>>;
}

/// JSON helpers over the blob interface.
pub trait ArtifactStoreExt: ArtifactStore {
    fn put_json<T: Serialize>(&self, key: &ArtifactKey, value: &T) -> StorageResult<()> {
        let blob = serde_json::to_vec_pretty(value)?;
        self.put_artifact(key, &blob)
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, key: &ArtifactKey) -> StorageResult<Option<T>> {
        match self.get_artifact(key)? {
            Some(blob) => Ok(Some(serde_json::from_slice(&blob)?)),
            None => Ok(None),
        }
    }
}

impl<S: ArtifactStore + ?Sized> ArtifactStoreExt for S {}

/// Extension trait for opening stores from paths
pub trait OpenStore: ArtifactStore + Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}
