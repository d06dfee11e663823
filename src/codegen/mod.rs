//! Model code generator
//!
//! Pure and deterministic: the same `Inventory` always renders the same
//! bytes. No inference is involved here, so everything in this module is
//! tested with hand-written inventories.
//!
//! Field type mapping (all fields optional, since records are sparse):
//!
//! | `FieldType`      | Rust type                    |
//! |------------------|------------------------------|
//! | `String`         | `Option<String>`             |
//! | `Number`         | `Option<f64>`                |
//! | `Boolean`        | `Option<bool>`               |
//! | `Identifier`     | `Option<String>`             |
//! | `CrossReference` | `Vec<String>`                |
//! | `NestedObject`   | `Option<serde_json::Value>`  |

mod ident;

pub use ident::{module_name, to_pascal_case, to_snake_case};

use crate::inference::{EntitySpec, FieldSpec, FieldType, Inventory};
use crate::relations::ConnectionEdge;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Write;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("inventory for '{0}' lists no entities")]
    NoEntities(String),
    #[error("entity '{0}' has no fields")]
    NoFields(String),
    #[error("duplicate entity name '{0}'")]
    DuplicateEntity(String),
    #[error("entity '{entity}': fields collide as '{field}'")]
    DuplicateField { entity: String, field: String },
    #[error("name '{0}' yields no usable identifier")]
    InvalidName(String),
    #[error("entity '{entity}': field '{field}' is a cross-reference but typed {field_type}")]
    InvalidCrossReference {
        entity: String,
        field: String,
        field_type: &'static str,
    },
}

/// One generated id accessor: the unit the relationship extractor classifies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessorSpec {
    pub entity_name: String,
    /// Field name as it appears in records
    pub field_name: String,
    pub method_name: String,
    pub field_type: FieldType,
}

/// Phase 1 output for one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedModel {
    pub category: String,
    pub entity_specs: Vec<EntitySpec>,
    pub generated_code: String,
    pub accessors: Vec<AccessorSpec>,
    /// Filled once relationships are extracted
    #[serde(default)]
    pub connections: Vec<ConnectionEdge>,
}

impl GeneratedModel {
    /// Copy carrying the given connection edges.
    pub fn with_connections(&self, connections: Vec<ConnectionEdge>) -> Self {
        Self {
            connections,
            ..self.clone()
        }
    }

    /// Module name this model exports under.
    pub fn module_name(&self) -> String {
        module_name(&self.category)
    }
}

struct RenderedField<'a> {
    spec: &'a FieldSpec,
    ident: String,
    /// Id accessor method, for reference fields
    accessor: Option<String>,
}

/// Renders typed record definitions from inventories.
#[derive(Debug, Clone, Default)]
pub struct ModelGenerator;

impl ModelGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Validate an inventory and render its model.
    pub fn generate(&self, category: &str, inventory: &Inventory) -> Result<GeneratedModel, GenerationError> {
        let entities = self.validate(category, inventory)?;

        let mut code = String::new();
        let _ = writeln!(
            code,
            "// Generated by loregen from the `{}` inventory. Do not edit.",
            ident::one_line(category)
        );
        code.push('\n');
        code.push_str("use serde::{Deserialize, Serialize};\n\n");
        let _ = writeln!(code, "pub const CATEGORY: &str = {:?};", category);

        let mut accessors = Vec::new();
        for (entity, type_name, fields) in &entities {
            code.push('\n');
            render_struct(&mut code, entity, type_name, fields);
            render_impl(&mut code, entity, type_name, fields, &mut accessors);
        }

        Ok(GeneratedModel {
            category: category.to_string(),
            entity_specs: inventory.entities.clone(),
            generated_code: code,
            accessors,
            connections: Vec::new(),
        })
    }

    /// All rejections happen here, before anything is rendered.
    fn validate<'a>(
        &self,
        category: &str,
        inventory: &'a Inventory,
    ) -> Result<Vec<(&'a EntitySpec, String, Vec<RenderedField<'a>>)>, GenerationError> {
        if inventory.entities.is_empty() {
            return Err(GenerationError::NoEntities(category.to_string()));
        }

        let mut names = HashSet::new();
        let mut type_names = HashSet::new();
        let mut validated = Vec::new();

        for entity in &inventory.entities {
            if !names.insert(entity.entity_name.as_str()) {
                return Err(GenerationError::DuplicateEntity(entity.entity_name.clone()));
            }
            if entity.fields.is_empty() {
                return Err(GenerationError::NoFields(entity.entity_name.clone()));
            }
            let pascal = to_pascal_case(&entity.entity_name);
            if pascal.is_empty() {
                return Err(GenerationError::InvalidName(entity.entity_name.clone()));
            }
            let type_name = ident::type_ident(&pascal);
            if !type_names.insert(type_name.clone()) {
                return Err(GenerationError::DuplicateEntity(entity.entity_name.clone()));
            }

            let mut idents = HashSet::new();
            let mut methods: HashSet<String> = ident::RESERVED_METHODS.iter().map(|m| m.to_string()).collect();
            let mut fields = Vec::new();
            for field in &entity.fields {
                let snake = to_snake_case(&field.name);
                if snake.is_empty() {
                    return Err(GenerationError::InvalidName(field.name.clone()));
                }
                let ident = ident::field_ident(&snake);
                if !idents.insert(ident.clone()) {
                    return Err(GenerationError::DuplicateField {
                        entity: entity.entity_name.clone(),
                        field: ident,
                    });
                }
                if field.is_reference()
                    && matches!(field.inferred_type, FieldType::Boolean | FieldType::NestedObject)
                {
                    return Err(GenerationError::InvalidCrossReference {
                        entity: entity.entity_name.clone(),
                        field: field.name.clone(),
                        field_type: field.inferred_type.as_str(),
                    });
                }
                let accessor = if field.is_reference() {
                    let method = accessor_name(&ident, &methods).ok_or_else(|| GenerationError::DuplicateField {
                        entity: entity.entity_name.clone(),
                        field: format!("{}_refs", ident::bare(&ident)),
                    })?;
                    methods.insert(method.clone());
                    Some(method)
                } else {
                    None
                };
                fields.push(RenderedField {
                    spec: field,
                    ident,
                    accessor,
                });
            }
            validated.push((entity, type_name, fields));
        }
        Ok(validated)
    }
}

fn rust_type(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::String | FieldType::Identifier => "Option<String>",
        FieldType::Number => "Option<f64>",
        FieldType::Boolean => "Option<bool>",
        FieldType::CrossReference => "Vec<String>",
        FieldType::NestedObject => "Option<serde_json::Value>",
    }
}

/// `{field}_refs`, or `{field}_field_refs` when that is taken.
fn accessor_name(field_ident: &str, taken: &HashSet<String>) -> Option<String> {
    let bare = ident::bare(field_ident);
    [format!("{}_refs", bare), format!("{}_field_refs", bare)]
        .into_iter()
        .find(|method| !taken.contains(method))
}

fn doc_line(code: &mut String, indent: &str, text: &str) {
    for line in text.split(['\n', '\r']).map(ident::one_line).filter(|l| !l.is_empty()) {
        let _ = writeln!(code, "{}/// {}", indent, line);
    }
}

fn render_struct(code: &mut String, entity: &EntitySpec, type_name: &str, fields: &[RenderedField<'_>]) {
    let _ = writeln!(code, "/// `{}` entity", ident::one_line(&entity.entity_name));
    code.push_str("#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]\n");
    let _ = writeln!(code, "pub struct {} {{", type_name);

    for field in fields {
        doc_line(code, "    ", &field.spec.description);

        let mut attrs = Vec::new();
        if ident::bare(&field.ident) != field.spec.name {
            attrs.push(format!("rename = {:?}", field.spec.name));
        }
        attrs.push("default".to_string());
        if field.spec.inferred_type == FieldType::CrossReference {
            attrs.push("skip_serializing_if = \"Vec::is_empty\"".to_string());
        } else {
            attrs.push("skip_serializing_if = \"Option::is_none\"".to_string());
        }
        let _ = writeln!(code, "    #[serde({})]", attrs.join(", "));
        let _ = writeln!(code, "    pub {}: {},", field.ident, rust_type(field.spec.inferred_type));
    }
    code.push_str("}\n");
}

fn render_impl(
    code: &mut String,
    entity: &EntitySpec,
    type_name: &str,
    fields: &[RenderedField<'_>],
    accessors: &mut Vec<AccessorSpec>,
) {
    let identifier = fields.iter().find(|f| {
        f.spec.is_identifier
            && matches!(f.spec.inferred_type, FieldType::Identifier | FieldType::String)
    });
    let references: Vec<(&RenderedField<'_>, &str)> = fields
        .iter()
        .filter_map(|f| f.accessor.as_deref().map(|method| (f, method)))
        .collect();

    code.push('\n');
    let _ = writeln!(code, "impl {} {{", type_name);
    let _ = writeln!(code, "    pub const ENTITY: &'static str = {:?};", entity.entity_name);

    if let Some(id_field) = identifier {
        code.push('\n');
        code.push_str("    /// This record's own id.\n");
        code.push_str("    pub fn record_id(&self) -> Option<&str> {\n");
        let _ = writeln!(code, "        self.{}.as_deref()", id_field.ident);
        code.push_str("    }\n");
    }

    for (field, method) in &references {
        code.push('\n');
        let _ = writeln!(code, "    /// Ids referenced through `{}`.", ident::one_line(&field.spec.name));
        let _ = writeln!(code, "    pub fn {}(&self) -> Vec<String> {{", method);
        let body = match field.spec.inferred_type {
            FieldType::Number => format!("self.{}.iter().map(|n| n.to_string()).collect()", field.ident),
            _ => format!("self.{}.iter().cloned().collect()", field.ident),
        };
        let _ = writeln!(code, "        {}", body);
        code.push_str("    }\n");

        accessors.push(AccessorSpec {
            entity_name: entity.entity_name.clone(),
            field_name: field.spec.name.clone(),
            method_name: method.to_string(),
            field_type: field.spec.inferred_type,
        });
    }

    if !references.is_empty() {
        code.push('\n');
        code.push_str("    /// Every id this record references.\n");
        code.push_str("    pub fn all_refs(&self) -> Vec<String> {\n");
        code.push_str("        let mut refs = Vec::new();\n");
        for (_, method) in &references {
            let _ = writeln!(code, "        refs.extend(self.{}());", method);
        }
        code.push_str("        refs\n");
        code.push_str("    }\n");
    }
    code.push_str("}\n");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn faction() -> Inventory {
        Inventory::new(vec![EntitySpec::new(
            "Faction",
            vec![
                FieldSpec::new("id", FieldType::Identifier)
                    .identifier()
                    .with_description("Faction id"),
                FieldSpec::new("name", FieldType::String),
                FieldSpec::new("controlledRegionId", FieldType::Identifier).cross_reference(),
                FieldSpec::new("type", FieldType::String),
                FieldSpec::new("allies", FieldType::CrossReference),
            ],
        )])
    }

    #[test]
    fn renders_struct_with_mapped_types() {
        let model = ModelGenerator::new().generate("faction", &faction()).unwrap();
        let code = &model.generated_code;

        assert!(code.contains("pub const CATEGORY: &str = \"faction\";"));
        assert!(code.contains("pub struct Faction {"));
        assert!(code.contains("    /// Faction id\n"));
        assert!(code.contains("pub id: Option<String>,"));
        assert!(code.contains("pub allies: Vec<String>,"));
        assert!(code.contains("#[serde(rename = \"controlledRegionId\", default"));
        assert!(code.contains("pub r#type: Option<String>,"));
        assert!(code.contains("pub fn record_id(&self) -> Option<&str>"));
    }

    #[test]
    fn keyword_field_keeps_original_key_without_rename() {
        let model = ModelGenerator::new().generate("faction", &faction()).unwrap();
        // `type` serializes as "type" already; only revised names get a rename
        assert!(!model.generated_code.contains("rename = \"type\""));
    }

    // --- Scenario: references get accessors ---

    #[test]
    fn cross_reference_fields_get_accessors() {
        let model = ModelGenerator::new().generate("faction", &faction()).unwrap();

        let methods: Vec<&str> = model.accessors.iter().map(|a| a.method_name.as_str()).collect();
        assert_eq!(methods, vec!["controlled_region_id_refs", "allies_refs"]);
        assert_eq!(model.accessors[0].field_name, "controlledRegionId");
        assert!(model.generated_code.contains("pub fn all_refs(&self) -> Vec<String>"));
        assert!(model.generated_code.contains("refs.extend(self.allies_refs());"));
    }

    #[test]
    fn numeric_reference_renders_to_string() {
        let inventory = Inventory::new(vec![EntitySpec::new(
            "Area",
            vec![FieldSpec::new("exit", FieldType::Number).cross_reference()],
        )]);
        let model = ModelGenerator::new().generate("dungeon", &inventory).unwrap();
        assert!(model.generated_code.contains("self.exit.iter().map(|n| n.to_string()).collect()"));
    }

    #[test]
    fn reference_named_all_keeps_combined_accessor_unique() {
        let inventory = Inventory::new(vec![EntitySpec::new(
            "Faction",
            vec![
                FieldSpec::new("all", FieldType::CrossReference),
                FieldSpec::new("allies", FieldType::CrossReference),
            ],
        )]);
        let model = ModelGenerator::new().generate("faction", &inventory).unwrap();

        let methods: Vec<&str> = model.accessors.iter().map(|a| a.method_name.as_str()).collect();
        assert_eq!(methods, vec!["all_field_refs", "allies_refs"]);
        assert_eq!(model.generated_code.matches("pub fn all_refs(").count(), 1);
        assert!(model.generated_code.contains("refs.extend(self.all_field_refs());"));
    }

    #[test]
    fn accessor_with_no_free_name_rejected() {
        // `all_refs` is reserved and `all_field_refs` is already taken
        let inventory = Inventory::new(vec![EntitySpec::new(
            "Room",
            vec![
                FieldSpec::new("all_field", FieldType::CrossReference),
                FieldSpec::new("all", FieldType::CrossReference),
            ],
        )]);
        assert_eq!(
            ModelGenerator::new().generate("x", &inventory),
            Err(GenerationError::DuplicateField {
                entity: "Room".into(),
                field: "all_refs".into(),
            })
        );
    }

    #[test]
    fn prelude_type_names_are_suffixed() {
        let inventory = Inventory::new(vec![
            EntitySpec::new("String", vec![FieldSpec::new("name", FieldType::String)]),
            EntitySpec::new("vec", vec![FieldSpec::new("size", FieldType::Number)]),
        ]);
        let code = ModelGenerator::new().generate("x", &inventory).unwrap().generated_code;

        assert!(code.contains("pub struct String_ {"));
        assert!(code.contains("impl String_ {"));
        assert!(code.contains("pub struct Vec_ {"));
        assert!(code.contains("pub const ENTITY: &'static str = \"String\";"));
        assert!(code.contains("pub name: Option<String>,"));
    }

    #[test]
    fn line_breaks_in_names_stay_inside_comments() {
        let inventory = Inventory::new(vec![EntitySpec::new(
            "Guild\nHall",
            vec![FieldSpec::new("member\r\nids", FieldType::CrossReference)
                .with_description("first\n\nsecond")],
        )]);
        let code = ModelGenerator::new().generate("guild\nhall", &inventory).unwrap().generated_code;

        assert!(code.starts_with("// Generated by loregen from the `guild hall` inventory."));
        assert!(code.contains("/// `Guild Hall` entity\n"));
        assert!(code.contains("    /// first\n    /// second\n"));
        assert!(code.contains("/// Ids referenced through `member ids`.\n"));
        for line in code.lines() {
            let trimmed = line.trim_start();
            assert!(
                trimmed.is_empty()
                    || trimmed.starts_with("//")
                    || trimmed.starts_with("#[")
                    || trimmed.starts_with("pub ")
                    || trimmed.starts_with("impl ")
                    || trimmed.starts_with("use ")
                    || trimmed.starts_with("self.")
                    || trimmed.starts_with("let ")
                    || trimmed.starts_with("refs")
                    || trimmed == "}",
                "stray line {:?}",
                line
            );
        }
    }

    // --- Scenario: regenerating is byte-identical ---

    #[test]
    fn generation_is_deterministic() {
        let generator = ModelGenerator::new();
        let a = generator.generate("faction", &faction()).unwrap();
        let b = generator.generate("faction", &faction()).unwrap();
        assert_eq!(a.generated_code, b.generated_code);
        assert_eq!(a, b);
    }

    #[test]
    fn multiple_entities_render_in_order() {
        let inventory = Inventory::new(vec![
            EntitySpec::new("Region", vec![FieldSpec::new("name", FieldType::String)]),
            EntitySpec::new(
                "hex tile",
                vec![FieldSpec::new("region_id", FieldType::Identifier).cross_reference()],
            ),
        ]);
        let model = ModelGenerator::new().generate("region", &inventory).unwrap();
        let region = model.generated_code.find("pub struct Region").unwrap();
        let tile = model.generated_code.find("pub struct HexTile").unwrap();
        assert!(region < tile);
        assert_eq!(model.accessors[0].entity_name, "hex tile");
    }

    // --- Scenario: invalid inventories are rejected before rendering ---

    #[test]
    fn zero_fields_rejected() {
        let inventory = Inventory::new(vec![EntitySpec::new("Empty", vec![])]);
        assert_eq!(
            ModelGenerator::new().generate("x", &inventory),
            Err(GenerationError::NoFields("Empty".into()))
        );
    }

    #[test]
    fn duplicate_entity_rejected() {
        let field = || vec![FieldSpec::new("a", FieldType::String)];
        let inventory = Inventory::new(vec![
            EntitySpec::new("Room", field()),
            EntitySpec::new("Room", field()),
        ]);
        assert_eq!(
            ModelGenerator::new().generate("x", &inventory),
            Err(GenerationError::DuplicateEntity("Room".into()))
        );
    }

    #[test]
    fn entity_names_colliding_after_sanitizing_rejected() {
        let field = || vec![FieldSpec::new("a", FieldType::String)];
        let inventory = Inventory::new(vec![
            EntitySpec::new("hex tile", field()),
            EntitySpec::new("HexTile", field()),
        ]);
        assert!(matches!(
            ModelGenerator::new().generate("x", &inventory),
            Err(GenerationError::DuplicateEntity(_))
        ));
    }

    #[test]
    fn colliding_field_names_rejected() {
        let inventory = Inventory::new(vec![EntitySpec::new(
            "Room",
            vec![
                FieldSpec::new("exitId", FieldType::String),
                FieldSpec::new("exit_id", FieldType::String),
            ],
        )]);
        assert!(matches!(
            ModelGenerator::new().generate("x", &inventory),
            Err(GenerationError::DuplicateField { .. })
        ));
    }

    #[test]
    fn boolean_cross_reference_rejected() {
        let inventory = Inventory::new(vec![EntitySpec::new(
            "Room",
            vec![FieldSpec::new("lit", FieldType::Boolean).cross_reference()],
        )]);
        assert!(matches!(
            ModelGenerator::new().generate("x", &inventory),
            Err(GenerationError::InvalidCrossReference { .. })
        ));
    }
}
