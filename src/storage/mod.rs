//! Durable artifact store
//!
//! Records are staged here at ingestion and every phase writes its output
//! here, so a later run can skip work whose output already exists.
//! The primary implementation is `SqliteStore`.

mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{
    ArtifactKey, ArtifactPhase, ArtifactStore, ArtifactStoreExt, OpenStore, StorageError,
    StorageResult,
};
