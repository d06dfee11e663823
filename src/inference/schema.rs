//! Inventory shape: the only thing the inference capability may return
//!
//! The JSON Schema derived from these types is sent with every request,
//! and responses are parsed back with unknown fields denied. A response
//! either deserializes into an `Inventory` or the call failed.

use super::client::InferenceError;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Inferred type of one field.
///
/// Code generation matches on this exhaustively, so a new variant has to
/// be handled there before it compiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    /// Single id of this or another record
    Identifier,
    /// One or more ids of other records
    CrossReference,
    /// Free-form nested structure
    NestedObject,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Identifier => "identifier",
            Self::CrossReference => "cross_reference",
            Self::NestedObject => "nested_object",
        }
    }
}

/// One inferred field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct FieldSpec {
    /// Field name as it appears in the source records
    pub name: String,
    pub inferred_type: FieldType,
    pub is_identifier: bool,
    pub is_cross_reference: bool,
    pub description: String,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, inferred_type: FieldType) -> Self {
        Self {
            name: name.into(),
            inferred_type,
            is_identifier: false,
            is_cross_reference: false,
            description: String::new(),
        }
    }

    pub fn identifier(mut self) -> Self {
        self.is_identifier = true;
        self
    }

    pub fn cross_reference(mut self) -> Self {
        self.is_cross_reference = true;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Gets a generated id accessor: flagged, or typed as cross-reference.
    pub fn is_reference(&self) -> bool {
        self.is_cross_reference || self.inferred_type == FieldType::CrossReference
    }
}

/// Inferred shape of one entity type within a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct EntitySpec {
    pub entity_name: String,
    pub fields: Vec<FieldSpec>,
}

impl EntitySpec {
    pub fn new(entity_name: impl Into<String>, fields: Vec<FieldSpec>) -> Self {
        Self {
            entity_name: entity_name.into(),
            fields,
        }
    }
}

/// Top-level inference response for one category.
///
/// Usually one entity; a category may also describe sub-entities
/// (e.g. a hex tile under a region).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Inventory {
    pub entities: Vec<EntitySpec>,
}

impl Inventory {
    pub fn new(entities: Vec<EntitySpec>) -> Self {
        Self { entities }
    }

    /// JSON Schema sent as the output constraint.
    pub fn json_schema() -> serde_json::Value {
        schemars::schema_for!(Inventory).to_value()
    }

    /// Parse a capability response strictly.
    ///
    /// The whole payload must be one JSON document matching the schema;
    /// no surrounding prose or code fences are tolerated.
    pub fn from_response(text: &str) -> Result<Self, InferenceError> {
        let inventory: Self = serde_json::from_str(text.trim())
            .map_err(|e| InferenceError::NonConforming(e.to_string()))?;
        inventory.check_conformance()?;
        Ok(inventory)
    }

    /// Constraints the schema cannot express on its own.
    pub fn check_conformance(&self) -> Result<(), InferenceError> {
        if self.entities.is_empty() {
            return Err(InferenceError::NonConforming(
                "inventory lists no entities".to_string(),
            ));
        }
        for entity in &self.entities {
            if entity.entity_name.trim().is_empty() {
                return Err(InferenceError::NonConforming(
                    "entity with empty entity_name".to_string(),
                ));
            }
            if let Some(field) = entity.fields.iter().find(|f| f.name.trim().is_empty()) {
                return Err(InferenceError::NonConforming(format!(
                    "entity '{}' has a field with empty name ({})",
                    entity.entity_name,
                    field.inferred_type.as_str()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{
        "entities": [{
            "entity_name": "Faction",
            "fields": [
                {"name": "id", "inferred_type": "identifier", "is_identifier": true,
                 "is_cross_reference": false, "description": "faction id"},
                {"name": "controlled_region_id", "inferred_type": "identifier",
                 "is_identifier": false, "is_cross_reference": true,
                 "description": "region this faction rules"}
            ]
        }]
    }"#;

    #[test]
    fn conforming_response_parses() {
        let inventory = Inventory::from_response(VALID).unwrap();
        assert_eq!(inventory.entities.len(), 1);
        let field = &inventory.entities[0].fields[1];
        assert!(field.is_reference());
        assert_eq!(field.inferred_type, FieldType::Identifier);
    }

    #[test]
    fn prose_wrapped_json_is_rejected() {
        let wrapped = format!("Here is the inventory:\n```json\n{}\n```", VALID);
        assert!(matches!(
            Inventory::from_response(&wrapped),
            Err(InferenceError::NonConforming(_))
        ));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let extra = r#"{"entities": [], "notes": "extra"}"#;
        assert!(Inventory::from_response(extra).is_err());
    }

    #[test]
    fn unknown_field_type_is_rejected() {
        let bad = r#"{"entities": [{"entity_name": "X", "fields": [
            {"name": "a", "inferred_type": "date", "is_identifier": false,
             "is_cross_reference": false, "description": ""}]}]}"#;
        assert!(Inventory::from_response(bad).is_err());
    }

    #[test]
    fn missing_required_flags_are_rejected() {
        let bad = r#"{"entities": [{"entity_name": "X", "fields": [
            {"name": "a", "inferred_type": "string", "description": ""}]}]}"#;
        assert!(Inventory::from_response(bad).is_err());
    }

    #[test]
    fn empty_inventory_is_rejected() {
        assert!(Inventory::from_response(r#"{"entities": []}"#).is_err());
    }

    #[test]
    fn schema_describes_inventory_strictly() {
        let schema = Inventory::json_schema();
        let text = schema.to_string();
        assert!(text.contains("entities"));
        assert!(text.contains("cross_reference"));
        assert!(text.contains("additionalProperties"));
    }
}
