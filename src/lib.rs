//! Loregen: schema inference and model generation for world-building exports
//!
//! Ingests semi-structured fragments (JSON or markup), routes them into
//! per-category clusters, infers a field inventory per category through a
//! schema-constrained AI capability, and deterministically generates typed
//! models plus spatial/relational container indexes from the result.
//!
//! # Pipeline
//!
//! - **Ingest**: raw bytes to `RawRecord`s, staged in the artifact store
//! - **Route**: known-entity names first, keyword heuristics second
//! - **Phase 1**: per category, infer (or reuse) an `Inventory`, generate
//!   the model, classify its references into `ConnectionEdge`s
//! - **Phase 2**: sub-containers grouped by parent reference
//! - **Phase 3**: the `world` container, indexed by spatial key
//!
//! # Example
//!
//! ```no_run
//! use loregen::{
//!     MockClient, DirectorySource, KnownEntityIndex, OpenStore, Orchestrator, PipelineConfig,
//!     SqliteStore,
//! };
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(SqliteStore::open("loregen.db")?);
//! let known = Arc::new(KnownEntityIndex::load("known.yaml")?);
//! let client = Arc::new(MockClient::available());
//! let stats = Orchestrator::new(store, known, client, PipelineConfig::default())
//!     .run(Arc::new(DirectorySource::new("export/")))
//!     .await?;
//! println!("{} categories", stats.succeeded_categories.len());
//! # Ok(())
//! # }
//! ```

pub mod codegen;
pub mod config;
pub mod container;
pub mod export;
pub mod inference;
pub mod ingest;
pub mod orchestrator;
pub mod record;
pub mod relations;
pub mod router;
pub mod storage;

pub use codegen::{GeneratedModel, GenerationError, ModelGenerator};
pub use config::{ConfigError, PipelineConfig};
pub use container::{ContainerSet, SpatialContainer, SCANNED_REFS, WORLD_CONTAINER};
pub use inference::{
    CommandClient, EntitySpec, FieldSpec, FieldType, InferenceClient, InferenceError, Inventory, MockClient,
    SchemaInferenceEngine,
};
pub use ingest::{DirectorySource, FragmentIngestor, FragmentSource, IngestError, MemorySource};
pub use orchestrator::{FailureRecord, Orchestrator, OrchestratorState, PipelineError, RunPhase, RunStats};
pub use record::{ContentKind, MapCoord, RawRecord, RecordId};
pub use relations::{Cardinality, ConnectionEdge, EdgeRule, EdgeType, RelationshipExtractor};
pub use router::{CategoryRouter, Cluster, ClusterSet, KeywordTable, KnownEntityIndex, RouteDecision};
pub use storage::{ArtifactKey, ArtifactPhase, ArtifactStore, ArtifactStoreExt, OpenStore, SqliteStore, StorageError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
