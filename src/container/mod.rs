//! Spatial and relational containers
//!
//! A container is a read-only index with O(1) lookups by spatial key,
//! grouping key and member id. Phase 2 builds one container per parent
//! group (e.g. per dungeon), phase 3 builds the `world` container over
//! every routed record. Containers are always rebuilt whole; there is no
//! incremental update.

mod builder;
mod lookup;

pub use builder::{ContainerBuilder, ContainerInputs};
pub use lookup::{field_values, RecordView};

use crate::record::{MapCoord, RecordId};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Id of the top-level container.
pub const WORLD_CONTAINER: &str = "world";

/// Dangling-marker key for ids found by scanning raw content rather than
/// through a reference field.
pub const SCANNED_REFS: &str = "cross_refs";

/// One record as seen by a container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerMember {
    pub id: RecordId,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spatial_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_coord: Option<MapCoord>,
    /// Referenced ids that match no ingested record, keyed by the field
    /// they were read from (or `SCANNED_REFS`)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dangling: BTreeMap<String, BTreeSet<RecordId>>,
}

impl ContainerMember {
    pub fn is_dangling(&self) -> bool {
        self.dangling.values().any(|ids| !ids.is_empty())
    }

    /// Dangling ids read through `field`.
    pub fn dangling_in(&self, field: &str) -> Option<&BTreeSet<RecordId>> {
        self.dangling.get(field)
    }
}

fn sorted<K, V, S>(map: &HashMap<K, V>, serializer: S) -> Result<S::Ok, S::Error>
where
    K: Serialize + Ord,
    V: Serialize,
    S: Serializer,
{
    let ordered: BTreeMap<&K, &V> = map.iter().collect();
    ordered.serialize(serializer)
}

/// Aggregate index over a set of records.
///
/// Maps are hash-backed for lookups and serialized in key order; every
/// id list is kept sorted, so the serialized form is byte-stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialContainer {
    pub container_id: String,
    #[serde(serialize_with = "sorted")]
    members: HashMap<RecordId, ContainerMember>,
    #[serde(serialize_with = "sorted")]
    by_spatial_key: HashMap<String, Vec<RecordId>>,
    #[serde(serialize_with = "sorted")]
    by_group_key: HashMap<String, Vec<RecordId>>,
    #[serde(serialize_with = "sorted")]
    adjacency: HashMap<RecordId, Vec<RecordId>>,
}

impl SpatialContainer {
    pub fn new(container_id: impl Into<String>) -> Self {
        Self {
            container_id: container_id.into(),
            members: HashMap::new(),
            by_spatial_key: HashMap::new(),
            by_group_key: HashMap::new(),
            adjacency: HashMap::new(),
        }
    }

    /// Add a member, indexing it under its spatial key.
    pub(crate) fn insert_member(&mut self, member: ContainerMember) {
        if let Some(key) = &member.spatial_key {
            insert_sorted(self.by_spatial_key.entry(key.clone()).or_default(), member.id.clone());
        }
        self.members.insert(member.id.clone(), member);
    }

    pub(crate) fn add_to_group(&mut self, group: &str, id: RecordId) {
        insert_sorted(self.by_group_key.entry(group.to_string()).or_default(), id);
    }

    pub(crate) fn add_neighbor(&mut self, from: RecordId, to: RecordId) {
        insert_sorted(self.adjacency.entry(from).or_default(), to);
    }

    /// Every member at a spatial key, across categories.
    pub fn at(&self, spatial_key: &str) -> &[RecordId] {
        self.by_spatial_key
            .get(spatial_key)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn group(&self, group_key: &str) -> &[RecordId] {
        self.by_group_key
            .get(group_key)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn neighbors(&self, id: &RecordId) -> &[RecordId] {
        self.adjacency.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn member(&self, id: &RecordId) -> Option<&ContainerMember> {
        self.members.get(id)
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.members.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Spatial keys in sorted order
    pub fn spatial_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.by_spatial_key.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Group keys in sorted order
    pub fn group_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.by_group_key.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Members carrying at least one dangling reference, sorted by id.
    pub fn dangling_members(&self) -> Vec<&ContainerMember> {
        let mut members: Vec<&ContainerMember> =
            self.members.values().filter(|m| m.is_dangling()).collect();
        members.sort_by(|a, b| a.id.cmp(&b.id));
        members
    }

    /// Adjacency entries, for merging into an enclosing container.
    pub(crate) fn edges(&self) -> impl Iterator<Item = (&RecordId, &Vec<RecordId>)> {
        self.adjacency.iter()
    }

    pub(crate) fn member_ids(&self) -> impl Iterator<Item = &RecordId> {
        self.members.keys()
    }
}

fn insert_sorted(ids: &mut Vec<RecordId>, id: RecordId) {
    if let Err(at) = ids.binary_search(&id) {
        ids.insert(at, id);
    }
}

/// A phase artifact: containers plus the fingerprint of their inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSet {
    pub fingerprint: String,
    /// Sorted by container id
    pub containers: Vec<SpatialContainer>,
}

impl ContainerSet {
    pub fn get(&self, container_id: &str) -> Option<&SpatialContainer> {
        self.containers
            .binary_search_by(|c| c.container_id.as_str().cmp(container_id))
            .ok()
            .map(|at| &self.containers[at])
    }

    pub fn ids(&self) -> Vec<&str> {
        self.containers.iter().map(|c| c.container_id.as_str()).collect()
    }
}
