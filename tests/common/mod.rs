//! Shared fixtures for pipeline integration tests
//!
//! A small world: two regions, a faction controlling one of them, and a
//! dungeon with three connected areas.

#![allow(dead_code)]

use loregen::{
    EntitySpec, FieldSpec, FieldType, Inventory, KnownEntityIndex, MemorySource, MockClient, Orchestrator,
    PipelineConfig, SqliteStore,
};
use loregen::OpenStore;
use std::sync::Arc;

pub const DUNGEON_ID: &str = "5b0e9a52-8c43-4d1e-9f60-1a2b3c4d5e01";
pub const AREA_IDS: [&str; 3] = [
    "5b0e9a52-8c43-4d1e-9f60-1a2b3c4d5e11",
    "5b0e9a52-8c43-4d1e-9f60-1a2b3c4d5e12",
    "5b0e9a52-8c43-4d1e-9f60-1a2b3c4d5e13",
];
/// Referenced by a region, never ingested
pub const MISSING_ID: &str = "5b0e9a52-8c43-4d1e-9f60-1a2b3c4d5eff";

pub fn region_inventory() -> Inventory {
    Inventory::new(vec![EntitySpec::new(
        "Region",
        vec![
            FieldSpec::new("name", FieldType::String),
            FieldSpec::new("hex", FieldType::String),
            FieldSpec::new("danger_level", FieldType::Number),
        ],
    )])
}

pub fn faction_inventory() -> Inventory {
    Inventory::new(vec![EntitySpec::new(
        "Faction",
        vec![
            FieldSpec::new("name", FieldType::String),
            FieldSpec::new("controlled_region_id", FieldType::Identifier).cross_reference(),
        ],
    )])
}

pub fn dungeon_inventory() -> Inventory {
    Inventory::new(vec![EntitySpec::new(
        "Dungeon",
        vec![
            FieldSpec::new("id", FieldType::Identifier).identifier(),
            FieldSpec::new("name", FieldType::String),
        ],
    )])
}

pub fn area_inventory() -> Inventory {
    Inventory::new(vec![EntitySpec::new(
        "Area",
        vec![
            FieldSpec::new("id", FieldType::Identifier).identifier(),
            FieldSpec::new("name", FieldType::String),
            FieldSpec::new("dungeon_id", FieldType::Identifier).cross_reference(),
            FieldSpec::new("connected_areas", FieldType::CrossReference).cross_reference(),
        ],
    )])
}

/// Mock capability answering every fixture category.
pub fn world_client() -> MockClient {
    MockClient::available()
        .with_inventory("region", region_inventory())
        .with_inventory("faction", faction_inventory())
        .with_inventory("dungeon", dungeon_inventory())
        .with_inventory("dungeon_area", area_inventory())
}

pub fn known_entities() -> Arc<KnownEntityIndex> {
    Arc::new(KnownEntityIndex::from_pairs([
        ("Aurora Bushes", "region"),
        ("Glass Flats", "region"),
        ("Harbor Guild", "faction"),
        ("Sunken Crypt", "dungeon"),
        ("Entry Hall", "dungeon_area"),
        ("Bone Gallery", "dungeon_area"),
        ("Flooded Vault", "dungeon_area"),
    ]))
}

pub fn config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.routing.keywords.insert("region".into(), vec!["hex".into()]);
    config.routing.keywords.insert("faction".into(), vec!["guild".into()]);
    config
}

/// `(source_id, content)` pairs of the fixture world.
pub fn world_fragments() -> Vec<(String, String)> {
    let area = |id: &str, name: &str, connected: &[&str]| {
        serde_json::json!({
            "id": id,
            "name": name,
            "dungeon_id": DUNGEON_ID,
            "connected_areas": connected,
        })
        .to_string()
    };
    vec![
        (
            "aurora".into(),
            format!(r#"{{"name": "Aurora Bushes", "hex": "W2S51", "notes": "see {}"}}"#, MISSING_ID),
        ),
        ("aurora-notes".into(), "<div>Hex W2S51, thick with thorns</div>".into()),
        ("glass".into(), r#"{"name": "Glass Flats", "hex": "E1N3"}"#.into()),
        (
            "harbor".into(),
            r#"{"name": "Harbor Guild", "controlled_region_id": "glass"}"#.into(),
        ),
        (
            DUNGEON_ID.into(),
            format!(r#"{{"id": "{}", "name": "Sunken Crypt", "hex": "E1N3"}}"#, DUNGEON_ID),
        ),
        (AREA_IDS[0].into(), area(AREA_IDS[0], "Entry Hall", &[AREA_IDS[1]])),
        (
            AREA_IDS[1].into(),
            area(AREA_IDS[1], "Bone Gallery", &[AREA_IDS[0], AREA_IDS[2]]),
        ),
        (AREA_IDS[2].into(), area(AREA_IDS[2], "Flooded Vault", &[AREA_IDS[1]])),
        ("stray".into(), "<p>an unlabeled scrap of prose</p>".into()),
    ]
}

pub fn source_from(fragments: &[(String, String)]) -> Arc<MemorySource> {
    let source = fragments
        .iter()
        .fold(MemorySource::new(), |source, (id, content)| {
            source.with_fragment(id.clone(), content.clone())
        });
    Arc::new(source)
}

pub fn world_source() -> Arc<MemorySource> {
    source_from(&world_fragments())
}

pub struct Harness {
    pub store: Arc<SqliteStore>,
    pub client: Arc<MockClient>,
    pub orchestrator: Orchestrator,
}

/// Orchestrator over a fresh in-memory store.
pub fn harness(client: MockClient) -> Harness {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let client = Arc::new(client);
    let orchestrator = Orchestrator::new(store.clone(), known_entities(), client.clone(), config());
    Harness {
        store,
        client,
        orchestrator,
    }
}
