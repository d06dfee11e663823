//! Per-cluster schema inference with a durable cache
//!
//! ```text
//! NotStarted -> Sampling -> AwaitingInference -> Cached
//!                                   \-> Failed
//! NotStarted -> Cached               (inventory already stored)
//! ```

use super::client::{InferenceClient, InferenceError, InferenceRequest};
use super::schema::Inventory;
use crate::config::{InstructionConfig, SampleBudget};
use crate::record::{RawRecord, RecordId};
use crate::router::Cluster;
use crate::storage::{ArtifactKey, ArtifactStore, ArtifactStoreExt, StorageError};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where one category is in the inference state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InferenceState {
    NotStarted,
    Sampling,
    AwaitingInference,
    Cached,
    Failed(String),
}

/// Records chosen for one inference call, each list in cluster order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleSet<'a> {
    pub markup: Vec<&'a RawRecord>,
    pub structured: Vec<&'a RawRecord>,
}

impl SampleSet<'_> {
    /// Sample contents, markup first.
    pub fn contents(&self) -> Vec<String> {
        self.markup
            .iter()
            .chain(self.structured.iter())
            .map(|r| r.raw_content.clone())
            .collect()
    }
}

/// Take the first members of each content kind, up to the budget.
///
/// Members missing from `records` are skipped.
pub fn select_samples<'a>(
    cluster: &Cluster,
    records: &'a HashMap<RecordId, RawRecord>,
    budget: SampleBudget,
) -> SampleSet<'a> {
    let mut samples = SampleSet::default();
    for id in &cluster.members {
        if samples.markup.len() >= budget.markup && samples.structured.len() >= budget.structured {
            break;
        }
        let Some(record) = records.get(id) else {
            continue;
        };
        if record.is_structured() {
            if samples.structured.len() < budget.structured {
                samples.structured.push(record);
            }
        } else if samples.markup.len() < budget.markup {
            samples.markup.push(record);
        }
    }
    samples
}

/// Result of inferring one cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceOutcome {
    pub inventory: Inventory,
    /// True when the stored inventory was reused and no call was made
    pub from_cache: bool,
    pub markup_samples: usize,
    pub structured_samples: usize,
}

/// Drives clusters through sampling, inference and caching.
pub struct SchemaInferenceEngine {
    client: Arc<dyn InferenceClient>,
    store: Arc<dyn ArtifactStore>,
    instructions: InstructionConfig,
    states: DashMap<String, InferenceState>,
}

impl SchemaInferenceEngine {
    pub fn new(
        client: Arc<dyn InferenceClient>,
        store: Arc<dyn ArtifactStore>,
        instructions: InstructionConfig,
    ) -> Self {
        Self {
            client,
            store,
            instructions,
            states: DashMap::new(),
        }
    }

    pub fn state(&self, category: &str) -> InferenceState {
        self.states
            .get(category)
            .map(|s| s.value().clone())
            .unwrap_or(InferenceState::NotStarted)
    }

    fn set_state(&self, category: &str, state: InferenceState) {
        self.states.insert(category.to_string(), state);
    }

    fn cached(&self, category: &str) -> Result<Option<Inventory>, InferenceError> {
        match self.store.get_json::<Inventory>(&ArtifactKey::inventory(category)) {
            Ok(Some(inventory)) if inventory.check_conformance().is_ok() => Ok(Some(inventory)),
            Ok(Some(_)) | Err(StorageError::Serialization(_)) => {
                warn!(category, "stored inventory unreadable, inferring again");
                Ok(None)
            }
            Ok(None) => Ok(None),
            Err(e) => Err(InferenceError::Cache(e.to_string())),
        }
    }

    /// Infer (or reuse) the inventory for one cluster.
    ///
    /// With `force` unset, a stored inventory short-circuits sampling and
    /// the capability call entirely.
    pub async fn infer_cluster(
        &self,
        cluster: &Cluster,
        records: &HashMap<RecordId, RawRecord>,
        force: bool,
    ) -> Result<InferenceOutcome, InferenceError> {
        let category = cluster.category_name.as_str();

        if !force {
            match self.cached(category) {
                Ok(Some(inventory)) => {
                    debug!(category, "inventory cache hit");
                    self.set_state(category, InferenceState::Cached);
                    return Ok(InferenceOutcome {
                        inventory,
                        from_cache: true,
                        markup_samples: 0,
                        structured_samples: 0,
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    self.set_state(category, InferenceState::Failed(e.to_string()));
                    return Err(e);
                }
            }
        }

        self.set_state(category, InferenceState::Sampling);
        let samples = select_samples(cluster, records, cluster.sample_budget);
        let request = InferenceRequest {
            category: category.to_string(),
            samples: samples.contents(),
            instruction: self.instructions.instruction_for(category),
            schema: Inventory::json_schema(),
        };

        self.set_state(category, InferenceState::AwaitingInference);
        info!(
            category,
            markup = samples.markup.len(),
            structured = samples.structured.len(),
            "requesting inference"
        );

        let result = self
            .client
            .infer(&request)
            .await
            .and_then(|inventory| inventory.check_conformance().map(|_| inventory))
            .and_then(|inventory| {
                self.store
                    .put_json(&ArtifactKey::inventory(category), &inventory)
                    .map_err(|e| InferenceError::Cache(e.to_string()))?;
                Ok(inventory)
            });

        match result {
            Ok(inventory) => {
                self.set_state(category, InferenceState::Cached);
                Ok(InferenceOutcome {
                    inventory,
                    from_cache: false,
                    markup_samples: samples.markup.len(),
                    structured_samples: samples.structured.len(),
                })
            }
            Err(e) => {
                warn!(category, error = %e, "inference failed");
                self.set_state(category, InferenceState::Failed(e.to_string()));
                Err(e)
            }
        }
    }
}
