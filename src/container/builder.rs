//! Phase 2 and phase 3 container builders

use super::lookup::RecordView;
use super::{ContainerMember, ContainerSet, SpatialContainer, SCANNED_REFS, WORLD_CONTAINER};
use crate::codegen::GeneratedModel;
use crate::record::{RawRecord, RecordId};
use crate::relations::{ConnectionEdge, EdgeType};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::debug;
use uuid::Uuid;

/// Category used for a parent whose id matches no ingested record and
/// whose edge has no target guess.
const UNRESOLVED_PARENT: &str = "unresolved";

/// Everything a container build reads. Nothing here is mutated.
pub struct ContainerInputs<'a> {
    /// Phase 1 models of the categories that succeeded
    pub models: &'a [GeneratedModel],
    pub edges: &'a [ConnectionEdge],
    /// Routed records of the categories that succeeded
    pub records: &'a [RawRecord],
    /// Every ingested id, routed or not; anything else is dangling
    pub all_ids: &'a HashSet<RecordId>,
}

impl ContainerInputs<'_> {
    /// Stable digest of the inputs, as a UUIDv5 string.
    pub fn fingerprint(&self, phase: &str) -> String {
        let mut digest = String::new();
        digest.push_str(phase);

        let mut models: Vec<&GeneratedModel> = self.models.iter().collect();
        models.sort_by(|a, b| a.category.cmp(&b.category));
        for model in models {
            digest.push('\u{1}');
            digest.push_str(&model.category);
            digest.push('\u{1}');
            digest.push_str(&model.generated_code);
        }
        for edge in self.edges {
            digest.push('\u{2}');
            digest.push_str(&serde_json::to_string(edge).unwrap_or_default());
        }
        let mut records: Vec<&RawRecord> = self.records.iter().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        for record in records {
            digest.push('\u{3}');
            digest.push_str(&serde_json::to_string(record).unwrap_or_default());
        }
        let mut ids: Vec<&RecordId> = self.all_ids.iter().collect();
        ids.sort();
        for id in ids {
            digest.push('\u{4}');
            digest.push_str(id.as_str());
        }

        Uuid::new_v5(&Uuid::NAMESPACE_OID, digest.as_bytes()).to_string()
    }
}

/// Builds containers from phase 1 output. Holds per-run indexes only.
pub struct ContainerBuilder<'a> {
    inputs: &'a ContainerInputs<'a>,
    views: Vec<RecordView<'a>>,
    by_id: HashMap<&'a RecordId, usize>,
    edges_by_category: HashMap<&'a str, Vec<&'a ConnectionEdge>>,
}

impl<'a> ContainerBuilder<'a> {
    pub fn new(inputs: &'a ContainerInputs<'a>) -> Self {
        let mut records: Vec<&'a RawRecord> = inputs.records.iter().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records.dedup_by(|a, b| a.id == b.id);

        let views: Vec<RecordView<'a>> = records.into_iter().map(RecordView::new).collect();
        let by_id = views
            .iter()
            .enumerate()
            .map(|(i, v)| (&v.record.id, i))
            .collect();

        let mut edges_by_category: HashMap<&'a str, Vec<&'a ConnectionEdge>> = HashMap::new();
        for edge in inputs.edges {
            edges_by_category
                .entry(edge.source_category.as_str())
                .or_default()
                .push(edge);
        }

        Self {
            inputs,
            views,
            by_id,
            edges_by_category,
        }
    }

    fn view(&self, id: &RecordId) -> Option<&RecordView<'a>> {
        self.by_id.get(id).map(|&i| &self.views[i])
    }

    fn edges_of(&self, view: &RecordView<'_>, edge_type: &EdgeType) -> Vec<&'a ConnectionEdge> {
        view.category()
            .and_then(|c| self.edges_by_category.get(c))
            .map(|edges| {
                edges
                    .iter()
                    .copied()
                    .filter(|e| &e.edge_type == edge_type)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Ids a record references through `edge`.
    ///
    /// The field value is authoritative when present. Markup has no
    /// fields, so scanned cross-references whose record belongs to the
    /// edge's target category stand in for it.
    fn references(&self, view: &RecordView<'_>, edge: &ConnectionEdge) -> Vec<RecordId> {
        let from_field = view.field_refs(&edge.field_name);
        if !from_field.is_empty() {
            return from_field;
        }
        let Some(target) = edge.target_category_guess.as_deref() else {
            return Vec::new();
        };
        view.record
            .cross_ref_ids
            .iter()
            .filter(|id| {
                self.view(id)
                    .and_then(|v| v.category())
                    .is_some_and(|c| c == target)
            })
            .cloned()
            .collect()
    }

    fn member(&self, view: &RecordView<'_>) -> ContainerMember {
        let mut dangling: BTreeMap<String, BTreeSet<RecordId>> = BTreeMap::new();
        let mut through_fields = BTreeSet::new();
        if let Some(edges) = view.category().and_then(|c| self.edges_by_category.get(c)) {
            for edge in edges {
                for id in view.field_refs(&edge.field_name) {
                    if !self.inputs.all_ids.contains(&id) {
                        dangling.entry(edge.field_name.clone()).or_default().insert(id.clone());
                    }
                    through_fields.insert(id);
                }
            }
        }
        let scanned: BTreeSet<RecordId> = view
            .record
            .cross_ref_ids
            .iter()
            .filter(|id| !through_fields.contains(*id) && !self.inputs.all_ids.contains(*id))
            .cloned()
            .collect();
        if !scanned.is_empty() {
            dangling.insert(SCANNED_REFS.to_string(), scanned);
        }

        ContainerMember {
            id: view.record.id.clone(),
            category: view.category().unwrap_or_default().to_string(),
            spatial_key: view.record.spatial_key.clone(),
            map_coord: view.record.map_coord.clone(),
            dangling,
        }
    }

    /// Phase 2: one container per parent group.
    ///
    /// A record joins the group of the first id found through its
    /// belongs-to-parent edges. Adjacency comes from connects-to edges
    /// between members of the same group only.
    pub fn build_sub_containers(&self) -> ContainerSet {
        let mut groups: BTreeMap<String, (Option<RecordId>, BTreeSet<RecordId>)> = BTreeMap::new();

        for view in &self.views {
            let parent = self
                .edges_of(view, &EdgeType::BelongsToParent)
                .into_iter()
                .find_map(|edge| {
                    self.references(view, edge)
                        .into_iter()
                        .next()
                        .map(|id| (id, edge))
                });
            let Some((parent_id, edge)) = parent else {
                continue;
            };

            let parent_view = self.view(&parent_id);
            let parent_category = parent_view
                .and_then(|v| v.category())
                .or(edge.target_category_guess.as_deref())
                .unwrap_or(UNRESOLVED_PARENT);
            let container_id = format!("{}:{}", parent_category, parent_id);

            let entry = groups
                .entry(container_id)
                .or_insert_with(|| (parent_view.map(|v| v.id().clone()), BTreeSet::new()));
            entry.1.insert(view.id().clone());
        }

        let containers = groups
            .into_iter()
            .map(|(container_id, (parent, children))| {
                let mut members = children;
                members.extend(parent);
                self.group_container(container_id, &members)
            })
            .collect();

        ContainerSet {
            fingerprint: self.inputs.fingerprint("sub_containers"),
            containers,
        }
    }

    fn group_container(&self, container_id: String, members: &BTreeSet<RecordId>) -> SpatialContainer {
        let mut container = SpatialContainer::new(container_id.clone());

        for id in members {
            let Some(view) = self.view(id) else { continue };
            container.insert_member(self.member(view));
            container.add_to_group(&container_id, id.clone());

            for edge in self.edges_of(view, &EdgeType::ConnectsTo) {
                for target in self.references(view, edge) {
                    if &target != id && members.contains(&target) {
                        container.add_neighbor(id.clone(), target);
                    }
                }
            }
        }
        debug!(container = %container_id, members = container.len(), "built sub-container");
        container
    }

    /// Phase 3: the `world` container over every routed record.
    ///
    /// Groups are `category:{name}` plus one per phase 2 container;
    /// adjacency is the union of the phase 2 adjacency.
    pub fn build_top_container(&self, sub: &ContainerSet) -> ContainerSet {
        let mut world = SpatialContainer::new(WORLD_CONTAINER);

        for view in &self.views {
            world.insert_member(self.member(view));
            if let Some(category) = view.category() {
                world.add_to_group(&format!("category:{}", category), view.id().clone());
            }
        }
        for container in &sub.containers {
            for id in container.member_ids() {
                world.add_to_group(&container.container_id, id.clone());
            }
            for (from, targets) in container.edges() {
                for to in targets {
                    world.add_neighbor(from.clone(), to.clone());
                }
            }
        }
        debug!(members = world.len(), keys = world.spatial_keys().len(), "built world container");

        ContainerSet {
            fingerprint: self.top_fingerprint(sub),
            containers: vec![world],
        }
    }

    /// Fingerprint the phase 3 artifact will carry for this phase 2 set.
    pub fn top_fingerprint(&self, sub: &ContainerSet) -> String {
        let digest = format!("{}\u{5}{}", self.inputs.fingerprint("top_containers"), sub.fingerprint);
        Uuid::new_v5(&Uuid::NAMESPACE_OID, digest.as_bytes()).to_string()
    }
}
