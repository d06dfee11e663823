//! Run statistics
//!
//! Every failure of a run, fatal or not, lands here with enough detail
//! (phase, category, source, reason) to diagnose it without re-running.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Orchestrator state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "categories", rename_all = "snake_case")]
pub enum OrchestratorState {
    Ingesting,
    Phase1PerCategory,
    Phase2SubContainers,
    Phase3TopContainers,
    Done,
    /// Inputs of a phase were entirely unavailable; carries the categories
    /// that failed (empty when nothing was ingested)
    Failed(Vec<String>),
}

/// Pipeline step a failure or count belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Ingest,
    Route,
    Inference,
    Generation,
    SubContainers,
    TopContainers,
}

impl RunPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::Route => "route",
            Self::Inference => "inference",
            Self::Generation => "generation",
            Self::SubContainers => "sub_containers",
            Self::TopContainers => "top_containers",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub phase: RunPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    pub reason: String,
}

impl std::fmt::Display for FailureRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.category, &self.source_id) {
            (Some(category), _) => write!(f, "category {} failed in {}: {}", category, self.phase.as_str(), self.reason),
            (None, Some(source)) => write!(f, "source {} failed in {}: {}", source, self.phase.as_str(), self.reason),
            (None, None) => write!(f, "{} failed: {}", self.phase.as_str(), self.reason),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseStats {
    pub succeeded: usize,
    pub failed: usize,
    /// Output already existed and matched its inputs
    #[serde(default)]
    pub skipped: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    pub state: OrchestratorState,
    /// Unique records staged this run
    pub total_ingested: usize,
    /// Source entries whose id repeated an earlier entry
    pub duplicate_sources: usize,
    pub per_category: BTreeMap<String, usize>,
    pub unrouted: usize,
    /// Subset of `unrouted` left out because of a keyword tie
    pub unrouted_ties: usize,
    pub phases: BTreeMap<RunPhase, PhaseStats>,
    pub inference_calls: usize,
    pub cache_hits: usize,
    pub succeeded_categories: Vec<String>,
    pub failed_categories: BTreeMap<String, String>,
    pub failures: Vec<FailureRecord>,
    pub sub_containers: usize,
    pub dangling_members: usize,
}

impl RunStats {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            state: OrchestratorState::Ingesting,
            total_ingested: 0,
            duplicate_sources: 0,
            per_category: BTreeMap::new(),
            unrouted: 0,
            unrouted_ties: 0,
            phases: BTreeMap::new(),
            inference_calls: 0,
            cache_hits: 0,
            succeeded_categories: Vec::new(),
            failed_categories: BTreeMap::new(),
            failures: Vec::new(),
            sub_containers: 0,
            dangling_members: 0,
        }
    }

    pub fn phase_mut(&mut self, phase: RunPhase) -> &mut PhaseStats {
        self.phases.entry(phase).or_default()
    }

    pub fn record_success(&mut self, phase: RunPhase) {
        self.phase_mut(phase).succeeded += 1;
    }

    pub fn record_failure(&mut self, failure: FailureRecord) {
        self.phase_mut(failure.phase).failed += 1;
        if let Some(category) = &failure.category {
            self.failed_categories
                .entry(category.clone())
                .or_insert_with(|| failure.reason.clone());
        }
        self.failures.push(failure);
    }

    /// Routed plus unrouted records; equals `total_ingested` unless a
    /// record went missing.
    pub fn accounted(&self) -> usize {
        self.per_category.values().sum::<usize>() + self.unrouted
    }

    pub fn no_silent_drops(&self) -> bool {
        self.accounted() == self.total_ingested
    }

    pub fn has_partial_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// One line per failure, for the end-of-run warning summary.
    pub fn warning_summary(&self) -> Vec<String> {
        self.failures.iter().map(|f| f.to_string()).collect()
    }

    pub fn finish(&mut self, state: OrchestratorState) {
        self.state = state;
        self.finished_at = Some(Utc::now());
    }
}

impl Default for RunStats {
    fn default() -> Self {
        Self::new()
    }
}
