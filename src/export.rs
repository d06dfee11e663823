//! Export of generated artifacts to a directory
//!
//! Layout:
//!
//! ```text
//! out/
//!   models/mod.rs
//!   models/{category}.rs
//!   connections.json
//!   containers/sub.json
//!   containers/top.json
//!   stats.json
//! ```
//!
//! Everything except `stats.json` (which carries the run id and
//! timestamps) is byte-identical for identical inputs.

use crate::codegen::GeneratedModel;
use crate::container::ContainerSet;
use crate::orchestrator::last_run_stats;
use crate::relations::ConnectionEdge;
use crate::storage::{ArtifactKey, ArtifactPhase, ArtifactStore, ArtifactStoreExt, StorageError};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("nothing to export: no generated models in the store")]
    NoModels,
}

/// What was written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub models: usize,
    pub connections: usize,
    pub sub_containers: usize,
    pub files: Vec<PathBuf>,
}

#[derive(Serialize)]
struct LabeledEdge<'a> {
    label: String,
    #[serde(flatten)]
    edge: &'a ConnectionEdge,
}

fn write(path: PathBuf, contents: &[u8], summary: &mut ExportSummary) -> Result<(), ExportError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ExportError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(&path, contents).map_err(|source| ExportError::Io {
        path: path.clone(),
        source,
    })?;
    summary.files.push(path);
    Ok(())
}

fn pretty<T: Serialize>(value: &T) -> Result<Vec<u8>, ExportError> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Models to export: those of the last run's successful categories when
/// stats exist, every stored model otherwise.
fn load_models(store: &dyn ArtifactStore) -> Result<Vec<GeneratedModel>, ExportError> {
    let wanted: Option<BTreeSet<String>> =
        last_run_stats(store)?.map(|s| s.succeeded_categories.into_iter().collect());

    let mut models = Vec::new();
    for key in store.list_artifacts(ArtifactPhase::Model)? {
        if wanted.as_ref().is_some_and(|w| !w.contains(&key.scope)) {
            continue;
        }
        if let Some(model) = store.get_json::<GeneratedModel>(&key)? {
            models.push(model);
        }
    }
    models.sort_by(|a, b| a.category.cmp(&b.category));
    Ok(models)
}

/// Write every exportable artifact under `out_dir`.
pub fn write_all(store: &dyn ArtifactStore, out_dir: impl AsRef<Path>) -> Result<ExportSummary, ExportError> {
    let out = out_dir.as_ref();
    let models = load_models(store)?;
    if models.is_empty() {
        return Err(ExportError::NoModels);
    }

    let mut summary = ExportSummary::default();

    let mut modules = String::from("// Generated by loregen. Do not edit.\n\n");
    for model in &models {
        let module = model.module_name();
        modules.push_str(&format!("pub mod {};\n", module));
        write(
            out.join("models").join(format!("{}.rs", module)),
            model.generated_code.as_bytes(),
            &mut summary,
        )?;
    }
    write(out.join("models").join("mod.rs"), modules.as_bytes(), &mut summary)?;
    summary.models = models.len();

    let edges: Vec<LabeledEdge<'_>> = models
        .iter()
        .flat_map(|m| m.connections.iter())
        .map(|edge| LabeledEdge {
            label: edge.label(),
            edge,
        })
        .collect();
    summary.connections = edges.len();
    write(out.join("connections.json"), &pretty(&edges)?, &mut summary)?;

    if let Some(sub) = store.get_json::<ContainerSet>(&ArtifactKey::run(ArtifactPhase::SubContainers))? {
        summary.sub_containers = sub.containers.len();
        write(out.join("containers").join("sub.json"), &pretty(&sub)?, &mut summary)?;
    }
    if let Some(top) = store.get_json::<ContainerSet>(&ArtifactKey::run(ArtifactPhase::TopContainers))? {
        write(out.join("containers").join("top.json"), &pretty(&top)?, &mut summary)?;
    }
    if let Some(stats) = last_run_stats(store)? {
        write(out.join("stats.json"), &pretty(&stats)?, &mut summary)?;
    }

    info!(
        out = %out.display(),
        models = summary.models,
        files = summary.files.len(),
        "export complete"
    );
    Ok(summary)
}
