//! Per-category membership lists

use crate::config::SampleBudget;
use crate::record::RecordId;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// A named bucket of records sharing a category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub category_name: String,
    /// Insertion order (source order), used for deterministic sampling
    pub members: Vec<RecordId>,
    pub sample_budget: SampleBudget,
}

impl Cluster {
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Append-only membership shared by concurrent routing workers.
///
/// Sharded by category via `DashMap` so workers routing to different
/// categories never contend. Every append carries the record's source
/// sequence number; `clusters()` orders members by it, which makes the
/// final order independent of worker scheduling. A record can be
/// appended once only.
#[derive(Debug)]
pub struct ClusterSet {
    budget: SampleBudget,
    members: DashMap<String, Vec<(usize, RecordId)>>,
    assigned: DashMap<RecordId, String>,
}

impl ClusterSet {
    pub fn new(budget: SampleBudget) -> Self {
        Self {
            budget,
            members: DashMap::new(),
            assigned: DashMap::new(),
        }
    }

    /// Append `id` to `category`. Returns false (and changes nothing) if
    /// the record already belongs to a cluster.
    pub fn append(&self, category: &str, seq: usize, id: RecordId) -> bool {
        match self.assigned.entry(id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(category.to_string());
                self.members
                    .entry(category.to_string())
                    .or_default()
                    .push((seq, id));
                true
            }
        }
    }

    pub fn category_of(&self, id: &RecordId) -> Option<String> {
        self.assigned.get(id).map(|c| c.value().clone())
    }

    /// Snapshot of all clusters, sorted by category name.
    pub fn clusters(&self) -> Vec<Cluster> {
        let mut clusters: Vec<Cluster> = self
            .members
            .iter()
            .map(|entry| {
                let mut members = entry.value().clone();
                members.sort();
                Cluster {
                    category_name: entry.key().clone(),
                    members: members.into_iter().map(|(_, id)| id).collect(),
                    sample_budget: self.budget,
                }
            })
            .collect();
        clusters.sort_by(|a, b| a.category_name.cmp(&b.category_name));
        clusters
    }

    pub fn get(&self, category: &str) -> Option<Cluster> {
        self.members.get(category).map(|entry| {
            let mut members = entry.value().clone();
            members.sort();
            Cluster {
                category_name: category.to_string(),
                members: members.into_iter().map(|(_, id)| id).collect(),
                sample_budget: self.budget,
            }
        })
    }

    /// Total records across all clusters
    pub fn total_members(&self) -> usize {
        self.assigned.len()
    }
}
