//! Generated model code compiles and reads real records
//!
//! `fixtures/faction_model.rs` is the generator's output for an inventory
//! full of awkward names. It is checked byte for byte and also compiled in
//! here as a module.

use loregen::{EntitySpec, FieldSpec, FieldType, Inventory, ModelGenerator};

#[allow(dead_code, non_camel_case_types)]
mod faction {
    include!("fixtures/faction_model.rs");
}

fn awkward_inventory() -> Inventory {
    Inventory::new(vec![
        EntitySpec::new(
            "String",
            vec![
                FieldSpec::new("id", FieldType::Identifier)
                    .identifier()
                    .with_description("Faction id\nstable across exports"),
                FieldSpec::new("all", FieldType::CrossReference),
                FieldSpec::new("allies", FieldType::CrossReference),
                FieldSpec::new("controlledRegionId", FieldType::Identifier).cross_reference(),
                FieldSpec::new("type", FieldType::String),
                FieldSpec::new("strength", FieldType::Number),
            ],
        ),
        EntitySpec::new(
            "Guild\nHall",
            vec![
                FieldSpec::new("member\nids", FieldType::CrossReference),
                FieldSpec::new("secret", FieldType::Boolean),
                FieldSpec::new("meta", FieldType::NestedObject),
            ],
        ),
    ])
}

// --- Scenario: the rendered model is valid Rust ---

#[test]
fn generator_output_matches_compiled_fixture() {
    let model = ModelGenerator::new().generate("faction", &awkward_inventory()).unwrap();
    assert_eq!(model.generated_code, include_str!("fixtures/faction_model.rs"));
}

#[test]
fn compiled_model_reads_records() {
    let record: faction::String_ = serde_json::from_str(
        r#"{
            "id": "f1",
            "all": ["a"],
            "allies": ["b", "c"],
            "controlledRegionId": "r1",
            "type": "guild",
            "strength": 3
        }"#,
    )
    .unwrap();

    assert_eq!(faction::CATEGORY, "faction");
    assert_eq!(faction::String_::ENTITY, "String");
    assert_eq!(record.record_id(), Some("f1"));
    assert_eq!(record.all_field_refs(), vec!["a"]);
    assert_eq!(record.all_refs(), vec!["a", "b", "c", "r1"]);
    assert_eq!(record.strength, Some(3.0));

    let value = serde_json::to_value(&record).unwrap();
    assert_eq!(value["type"], "guild");
    assert_eq!(value["controlledRegionId"], "r1");
}

#[test]
fn compiled_model_keeps_sparse_records_sparse() {
    let hall: faction::GuildHall = serde_json::from_str(r#"{"member\nids": ["m1", "m2"]}"#).unwrap();

    assert_eq!(faction::GuildHall::ENTITY, "Guild\nHall");
    assert_eq!(hall.all_refs(), vec!["m1", "m2"]);
    assert_eq!(hall.secret, None);
    assert_eq!(
        serde_json::to_string(&faction::GuildHall::default()).unwrap(),
        "{}"
    );
}
