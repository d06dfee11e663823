//! Pipeline orchestrator
//!
//! ```text
//! Ingesting -> Phase1PerCategory -> Phase2SubContainers -> Phase3TopContainers -> Done
//!      \______________\___________________________________________________-> Failed
//! ```
//!
//! Per-record and per-category failures are isolated and recorded in
//! `RunStats`; only whole-run-fatal conditions surface as `PipelineError`.
//! Each phase reads its predecessor's output from the artifact store, so
//! a restart skips whatever is already complete.

mod stats;

pub use stats::{FailureRecord, OrchestratorState, PhaseStats, RunPhase, RunStats};

use crate::codegen::{GeneratedModel, ModelGenerator};
use crate::config::PipelineConfig;
use crate::container::{ContainerBuilder, ContainerInputs, ContainerSet};
use crate::inference::{InferenceClient, SchemaInferenceEngine};
use crate::ingest::{FragmentIngestor, FragmentSource, IngestError, IngestReport};
use crate::record::{RawRecord, RecordId};
use crate::relations::{ConnectionEdge, RelationshipExtractor};
use crate::router::{ClusterSet, CategoryRouter, KeywordTable, KnownEntityIndex, RouteDecision, UnroutedReason};
use crate::storage::{ArtifactKey, ArtifactPhase, ArtifactStore, ArtifactStoreExt, StorageError};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::{Id, JoinSet};
use tracing::{debug, info, warn};

/// Whole-run-fatal conditions.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no records were ingested")]
    NoRecordsIngested,
    #[error("no category produced a model (failed: {})", .0.join(", "))]
    NoSuccessfulCategories(Vec<String>),
    #[error("source error: {0}")]
    Source(#[from] IngestError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("configuration error: {0}")]
    Config(String),
}

/// Successful phase 1 output for one category.
struct CategoryOutcome {
    model: GeneratedModel,
    from_cache: bool,
}

/// Failed phase 1 output for one category.
struct CategoryFailure {
    category: String,
    phase: RunPhase,
    reason: String,
}

/// Runs ingestion, routing and the three phases.
///
/// All collaborators are injected; nothing is read from global state.
pub struct Orchestrator {
    store: Arc<dyn ArtifactStore>,
    known: Arc<KnownEntityIndex>,
    client: Arc<dyn InferenceClient>,
    config: PipelineConfig,
    force: bool,
    state: Mutex<OrchestratorState>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        known: Arc<KnownEntityIndex>,
        client: Arc<dyn InferenceClient>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            known,
            client,
            config,
            force: false,
            state: Mutex::new(OrchestratorState::Ingesting),
        }
    }

    /// Regenerate inventories and rebuild every phase regardless of
    /// stored output.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
            .lock()
            .map(|s| s.clone())
            .unwrap_or(OrchestratorState::Failed(Vec::new()))
    }

    fn enter(&self, state: OrchestratorState) {
        info!(?state, "orchestrator state");
        if let Ok(mut current) = self.state.lock() {
            *current = state;
        }
    }

    /// Stage every fragment of `source` without running any phase.
    pub async fn ingest(&self, source: Arc<dyn FragmentSource>) -> Result<IngestReport, PipelineError> {
        let ingestor = Arc::new(FragmentIngestor::new(
            Arc::clone(&self.store),
            Arc::clone(&self.known),
            &self.config.ingest,
        )?);
        Ok(ingestor
            .ingest_source(source, self.config.ingest.concurrency)
            .await?)
    }

    /// Full run. Statistics are stored even when the run fails.
    pub async fn run(&self, source: Arc<dyn FragmentSource>) -> Result<RunStats, PipelineError> {
        let mut stats = RunStats::new();
        info!(run_id = %stats.run_id, force = self.force, "pipeline run starting");

        let result = self.run_phases(source, &mut stats).await;
        let final_state = match &result {
            Ok(()) => OrchestratorState::Done,
            Err(PipelineError::NoSuccessfulCategories(failed)) => OrchestratorState::Failed(failed.clone()),
            Err(_) => OrchestratorState::Failed(Vec::new()),
        };
        self.enter(final_state.clone());
        stats.finish(final_state);

        if !stats.no_silent_drops() {
            warn!(
                accounted = stats.accounted(),
                ingested = stats.total_ingested,
                "record accounting mismatch"
            );
        }
        if let Err(e) = self.store.put_json(&ArtifactKey::run(ArtifactPhase::Stats), &stats) {
            warn!(error = %e, "could not store run statistics");
        }

        match result {
            Ok(()) => {
                info!(
                    categories = stats.succeeded_categories.len(),
                    failures = stats.failures.len(),
                    inference_calls = stats.inference_calls,
                    "pipeline run complete"
                );
                Ok(stats)
            }
            Err(e) => Err(e),
        }
    }

    async fn run_phases(&self, source: Arc<dyn FragmentSource>, stats: &mut RunStats) -> Result<(), PipelineError> {
        self.enter(OrchestratorState::Ingesting);
        let report = self.ingest(source).await?;
        stats.total_ingested = report.records.len();
        stats.duplicate_sources = report.duplicates;
        for failure in &report.failures {
            stats.record_failure(FailureRecord {
                phase: RunPhase::Ingest,
                category: None,
                source_id: Some(failure.source_id.clone()),
                reason: failure.reason.clone(),
            });
        }
        stats.phase_mut(RunPhase::Ingest).succeeded = report.records.len();
        if report.records.is_empty() {
            return Err(PipelineError::NoRecordsIngested);
        }

        let all_ids: HashSet<RecordId> = report.records.iter().map(|r| r.id.clone()).collect();
        let (clusters, routed) = self.route(report.records, stats)?;

        self.enter(OrchestratorState::Phase1PerCategory);
        let models = self.phase1(&clusters, routed.clone(), stats).await?;

        let succeeded: HashSet<&str> = models.iter().map(|m| m.category.as_str()).collect();
        let records: Vec<RawRecord> = routed
            .values()
            .filter(|r| r.category.as_deref().is_some_and(|c| succeeded.contains(c)))
            .cloned()
            .collect();
        let edges: Vec<ConnectionEdge> = models.iter().flat_map(|m| m.connections.clone()).collect();
        let inputs = ContainerInputs {
            models: &models,
            edges: &edges,
            records: &records,
            all_ids: &all_ids,
        };
        let builder = ContainerBuilder::new(&inputs);

        self.enter(OrchestratorState::Phase2SubContainers);
        let sub = self.phase2(&builder, &inputs, stats)?;

        self.enter(OrchestratorState::Phase3TopContainers);
        self.phase3(&builder, &sub, stats)?;
        Ok(())
    }

    /// Route every record and persist the routed copies.
    ///
    /// Routing is pure, so records are split across scoped worker threads
    /// that only append to the sharded cluster set.
    fn route(
        &self,
        records: Vec<RawRecord>,
        stats: &mut RunStats,
    ) -> Result<(ClusterSet, HashMap<RecordId, RawRecord>), PipelineError> {
        let router = CategoryRouter::new(Arc::clone(&self.known), KeywordTable::new(&self.config.routing));
        let clusters = ClusterSet::new(self.config.sampling);
        let workers = self.config.ingest.concurrency.max(1);
        let chunk = records.len().div_ceil(workers).max(1);

        let decisions: Vec<(usize, RouteDecision)> = std::thread::scope(|scope| {
            let handles: Vec<_> = records
                .chunks(chunk)
                .enumerate()
                .map(|(n, slice)| {
                    let router = &router;
                    let clusters = &clusters;
                    scope.spawn(move || {
                        slice
                            .iter()
                            .enumerate()
                            .map(|(i, record)| {
                                let seq = n * chunk + i;
                                let decision = router.route(record);
                                if let Some(category) = decision.category() {
                                    clusters.append(category, seq, record.id.clone());
                                }
                                (seq, decision)
                            })
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap_or_default())
                .collect()
        });

        let mut decided = vec![None; records.len()];
        for (seq, decision) in decisions {
            if let Some(slot) = decided.get_mut(seq) {
                *slot = Some(decision);
            }
        }

        let mut routed = HashMap::new();
        for (record, decision) in records.into_iter().zip(decided) {
            match decision {
                Some(RouteDecision::Routed { category, rule }) => {
                    debug!(id = %record.id, category = %category, ?rule, "routed");
                    *stats.per_category.entry(category.clone()).or_default() += 1;
                    let routed_record = record.routed_to(category);
                    self.store.save_record(&routed_record)?;
                    routed.insert(routed_record.id.clone(), routed_record);
                }
                Some(RouteDecision::Unrouted(reason)) => {
                    debug!(id = %record.id, %reason, "unrouted");
                    stats.unrouted += 1;
                    if matches!(reason, UnroutedReason::Tie(_)) {
                        stats.unrouted_ties += 1;
                    }
                    self.store.save_record(&record)?;
                }
                None => {
                    // A routing worker panicked; count the record as unrouted
                    stats.unrouted += 1;
                    stats.record_failure(FailureRecord {
                        phase: RunPhase::Route,
                        category: None,
                        source_id: Some(record.id.to_string()),
                        reason: "routing worker failed".to_string(),
                    });
                }
            }
        }
        stats.phase_mut(RunPhase::Route).succeeded = routed.len();

        info!(
            clusters = clusters.clusters().len(),
            routed = routed.len(),
            unrouted = stats.unrouted,
            "routing complete"
        );
        Ok((clusters, routed))
    }

    /// Phase 1: inference, generation and relationship extraction per
    /// category, concurrently across categories.
    async fn phase1(
        &self,
        clusters: &ClusterSet,
        routed: HashMap<RecordId, RawRecord>,
        stats: &mut RunStats,
    ) -> Result<Vec<GeneratedModel>, PipelineError> {
        let extractor = Arc::new(
            RelationshipExtractor::with_rules(&self.config.relationships.rules)
                .map_err(|e| PipelineError::Config(e.to_string()))?,
        );
        let engine = Arc::new(SchemaInferenceEngine::new(
            Arc::clone(&self.client),
            Arc::clone(&self.store),
            self.config.instructions.clone(),
        ));
        let cluster_list = clusters.clusters();
        let categories: Arc<BTreeSet<String>> = Arc::new(
            cluster_list
                .iter()
                .map(|c| c.category_name.clone())
                .chain(self.known.categories())
                .collect(),
        );
        let records = Arc::new(routed);
        let semaphore = Arc::new(Semaphore::new(self.config.inference.concurrency.max(1)));
        let calls_before = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let mut tasks = JoinSet::new();
        let mut pending: HashMap<Id, String> = HashMap::new();

        for cluster in cluster_list {
            let engine = Arc::clone(&engine);
            let extractor = Arc::clone(&extractor);
            let categories = Arc::clone(&categories);
            let records = Arc::clone(&records);
            let semaphore = Arc::clone(&semaphore);
            let store = Arc::clone(&self.store);
            let calls = Arc::clone(&calls_before);
            let force = self.force;
            let task_category = cluster.category_name.clone();

            let handle = tasks.spawn(async move {
                let category = cluster.category_name.clone();
                let _permit = semaphore.acquire_owned().await;

                let outcome = match engine.infer_cluster(&cluster, &records, force).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        return Err(CategoryFailure {
                            category,
                            phase: RunPhase::Inference,
                            reason: e.to_string(),
                        })
                    }
                };
                if !outcome.from_cache {
                    calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                }

                let model = ModelGenerator::new()
                    .generate(&category, &outcome.inventory)
                    .map_err(|e| CategoryFailure {
                        category: category.clone(),
                        phase: RunPhase::Generation,
                        reason: e.to_string(),
                    })?;
                let edges = extractor.extract(std::slice::from_ref(&model), &categories);
                let model = model.with_connections(edges);

                store
                    .put_json(&ArtifactKey::model(&category), &model)
                    .map_err(|e| CategoryFailure {
                        category: category.clone(),
                        phase: RunPhase::Generation,
                        reason: e.to_string(),
                    })?;

                Ok(CategoryOutcome {
                    model,
                    from_cache: outcome.from_cache,
                })
            });
            pending.insert(handle.id(), task_category);
        }

        let mut models = Vec::new();
        let mut failed = Vec::new();
        while let Some(joined) = tasks.join_next_with_id().await {
            let result = match joined {
                Ok((id, result)) => {
                    pending.remove(&id);
                    result
                }
                Err(e) => {
                    warn!(error = %e, "category task panicked");
                    match pending.remove(&e.id()) {
                        Some(category) => Err(CategoryFailure {
                            category,
                            phase: RunPhase::Inference,
                            reason: format!("task failed: {}", e),
                        }),
                        None => continue,
                    }
                }
            };
            match result {
                Ok(outcome) => {
                    stats.record_success(RunPhase::Inference);
                    stats.record_success(RunPhase::Generation);
                    if outcome.from_cache {
                        stats.cache_hits += 1;
                    }
                    info!(
                        category = %outcome.model.category,
                        cached = outcome.from_cache,
                        edges = outcome.model.connections.len(),
                        "category complete"
                    );
                    models.push(outcome.model);
                }
                Err(failure) => {
                    warn!(category = %failure.category, phase = failure.phase.as_str(), reason = %failure.reason, "category failed");
                    // Generation failures still consumed a successful inference
                    if failure.phase == RunPhase::Generation {
                        stats.record_success(RunPhase::Inference);
                    }
                    failed.push(failure.category.clone());
                    stats.record_failure(FailureRecord {
                        phase: failure.phase,
                        category: Some(failure.category),
                        source_id: None,
                        reason: failure.reason,
                    });
                }
            }
        }
        stats.inference_calls = calls_before.load(std::sync::atomic::Ordering::SeqCst);

        models.sort_by(|a, b| a.category.cmp(&b.category));
        failed.sort();
        stats.succeeded_categories = models.iter().map(|m| m.category.clone()).collect();

        if models.is_empty() {
            return Err(PipelineError::NoSuccessfulCategories(failed));
        }
        Ok(models)
    }

    fn stored_set(&self, phase: ArtifactPhase) -> Option<ContainerSet> {
        match self.store.get_json::<ContainerSet>(&ArtifactKey::run(phase)) {
            Ok(set) => set,
            Err(e) => {
                warn!(phase = phase.as_str(), error = %e, "stored containers unreadable, rebuilding");
                None
            }
        }
    }

    /// Phase 2: per-group sub-containers.
    fn phase2(
        &self,
        builder: &ContainerBuilder<'_>,
        inputs: &ContainerInputs<'_>,
        stats: &mut RunStats,
    ) -> Result<ContainerSet, PipelineError> {
        let fingerprint = inputs.fingerprint("sub_containers");
        let sub = match self.stored_set(ArtifactPhase::SubContainers) {
            Some(set) if !self.force && set.fingerprint == fingerprint => {
                info!("sub-containers up to date, skipping phase 2");
                stats.phase_mut(RunPhase::SubContainers).skipped = true;
                set
            }
            _ => {
                let set = builder.build_sub_containers();
                self.store.put_json(&ArtifactKey::run(ArtifactPhase::SubContainers), &set)?;
                info!(containers = set.containers.len(), "phase 2 complete");
                set
            }
        };
        stats.sub_containers = sub.containers.len();
        stats.phase_mut(RunPhase::SubContainers).succeeded = sub.containers.len();
        Ok(sub)
    }

    /// Phase 3: the `world` container.
    fn phase3(
        &self,
        builder: &ContainerBuilder<'_>,
        sub: &ContainerSet,
        stats: &mut RunStats,
    ) -> Result<ContainerSet, PipelineError> {
        let fingerprint = builder.top_fingerprint(sub);
        let top = match self.stored_set(ArtifactPhase::TopContainers) {
            Some(set) if !self.force && set.fingerprint == fingerprint => {
                info!("top-level container up to date, skipping phase 3");
                stats.phase_mut(RunPhase::TopContainers).skipped = true;
                set
            }
            _ => {
                let set = builder.build_top_container(sub);
                self.store.put_json(&ArtifactKey::run(ArtifactPhase::TopContainers), &set)?;
                info!("phase 3 complete");
                set
            }
        };
        stats.dangling_members = top
            .containers
            .iter()
            .map(|c| c.dangling_members().len())
            .sum();
        stats.phase_mut(RunPhase::TopContainers).succeeded = top.containers.len();
        Ok(top)
    }
}

/// Statistics of the most recent run, if any.
pub fn last_run_stats(store: &dyn ArtifactStore) -> Result<Option<RunStats>, StorageError> {
    store.get_json(&ArtifactKey::run(ArtifactPhase::Stats))
}
