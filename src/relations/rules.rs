//! Edge classification rules

use super::{Cardinality, EdgeType};
use crate::codegen::to_snake_case;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

/// A configurable classification rule.
///
/// `field_pattern` is a regex matched case-insensitively against the
/// snake_case form of the field name, so `controlledRegionId` and
/// `controlled_region_id` match the same rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRule {
    /// Restrict to one source category; any category when absent
    #[serde(default)]
    pub source_category: Option<String>,
    pub field_pattern: String,
    pub edge_type: EdgeType,
    /// Overrides the name-based target guess
    #[serde(default)]
    pub target_category: Option<String>,
    #[serde(default)]
    pub cardinality: Option<Cardinality>,
}

impl EdgeRule {
    pub fn compile(&self) -> Result<CompiledRule, regex_lite::Error> {
        Ok(CompiledRule {
            source_category: self.source_category.as_ref().map(|c| c.to_lowercase()),
            pattern: Regex::new(&format!("(?i){}", self.field_pattern))?,
            edge_type: self.edge_type.clone(),
            target_category: self.target_category.clone(),
            cardinality: self.cardinality,
        })
    }
}

/// A rule ready for matching.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    source_category: Option<String>,
    pattern: Regex,
    pub edge_type: EdgeType,
    pub target_category: Option<String>,
    pub cardinality: Option<Cardinality>,
}

impl CompiledRule {
    pub fn matches(&self, category: &str, field_name: &str) -> bool {
        if let Some(source) = &self.source_category {
            if source != &category.to_lowercase() {
                return false;
            }
        }
        self.pattern.is_match(&to_snake_case(field_name))
    }
}

const BUILTIN: &[(&str, EdgeType)] = &[
    (r"(^|_)(hex|cell|tile|grid|coord|coords|coordinate)(_|$)", EdgeType::LocatedInCell),
    (r"(^|_)(control|controls|controlled|ruled|rules|governs|governed|territory|territories|domain)(_|$)", EdgeType::ControlsRegion),
    (r"(^|_)(connect|connects|connected|connection|connections|exit|exits|door|doors|adjacent|neighbor|neighbors|neighbour|neighbours|link|links|linked|passage|passages)(_|$)", EdgeType::ConnectsTo),
    (r"(^|_)(parent|belongs|owner|container|dungeon|part|within)(_|$)", EdgeType::BelongsToParent),
];

/// Fixed rule table consulted after configured rules.
pub fn builtin_rules() -> Vec<CompiledRule> {
    BUILTIN
        .iter()
        .filter_map(|(pattern, edge_type)| {
            EdgeRule {
                source_category: None,
                field_pattern: (*pattern).to_string(),
                edge_type: edge_type.clone(),
                target_category: None,
                cardinality: None,
            }
            .compile()
            .ok()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_patterns_compile() {
        assert_eq!(builtin_rules().len(), BUILTIN.len());
    }

    #[test]
    fn camel_case_fields_match_snake_patterns() {
        let rules = builtin_rules();
        let first = |field: &str| {
            rules
                .iter()
                .find(|r| r.matches("any", field))
                .map(|r| r.edge_type.clone())
        };

        assert_eq!(first("hexId"), Some(EdgeType::LocatedInCell));
        assert_eq!(first("controlledRegionId"), Some(EdgeType::ControlsRegion));
        assert_eq!(first("exits"), Some(EdgeType::ConnectsTo));
        assert_eq!(first("parentId"), Some(EdgeType::BelongsToParent));
        // "hexagon" is not a cell reference
        assert_eq!(first("hexagon_ids"), None);
    }

    #[test]
    fn source_category_restricts_rule() {
        let rule = EdgeRule {
            source_category: Some("Faction".into()),
            field_pattern: "leader".into(),
            edge_type: EdgeType::Custom("led-by".into()),
            target_category: None,
            cardinality: None,
        }
        .compile()
        .unwrap();

        assert!(rule.matches("faction", "leader_id"));
        assert!(!rule.matches("settlement", "leader_id"));
    }

    #[test]
    fn rules_deserialize_from_yaml() {
        let yaml = r#"
- source_category: faction
  field_pattern: "^ally"
  edge_type: references
- field_pattern: guard
  edge_type:
    custom: guarded-by
  cardinality: one_to_one
"#;
        let rules: Vec<EdgeRule> = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(rules[0].edge_type, EdgeType::References);
        assert_eq!(rules[1].edge_type, EdgeType::Custom("guarded-by".into()));
        assert_eq!(rules[1].cardinality, Some(Cardinality::OneToOne));
    }
}
