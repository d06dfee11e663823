//! Relationship extractor
//!
//! Classifies every generated id accessor into a typed connection edge.
//! Rules match on (source category, field name pattern); the first match
//! wins, configured rules are consulted before the built-in table, and an
//! unmatched accessor becomes a generic `References` edge rather than
//! being dropped.
//!
//! Edges are plain data, so cycles (region -> settlement -> region) need
//! no special handling. Extraction has no cache of its own.

mod rules;

pub use rules::{builtin_rules, CompiledRule, EdgeRule};

use crate::codegen::{AccessorSpec, GeneratedModel};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Edge taxonomy. `Custom` carries configured edge names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    LocatedInCell,
    ControlsRegion,
    ConnectsTo,
    BelongsToParent,
    References,
    Custom(String),
}

impl EdgeType {
    /// Verb used in edge labels.
    pub fn verb(&self) -> &str {
        match self {
            Self::LocatedInCell => "located-in",
            Self::ControlsRegion => "controls",
            Self::ConnectsTo => "connects-to",
            Self::BelongsToParent => "belongs-to",
            Self::References => "references",
            Self::Custom(name) => name,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    OneToOne,
    #[default]
    OneToMany,
}

/// One typed relationship between categories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionEdge {
    pub source_category: String,
    pub field_name: String,
    pub target_category_guess: Option<String>,
    pub edge_type: EdgeType,
    pub cardinality: Cardinality,
}

impl ConnectionEdge {
    /// `faction-controls-region`; an unknown target reads as `entity`.
    pub fn label(&self) -> String {
        format!(
            "{}-{}-{}",
            self.source_category,
            self.edge_type.verb(),
            self.target_category_guess.as_deref().unwrap_or("entity")
        )
    }
}

/// Classifies accessors against a rule table.
pub struct RelationshipExtractor {
    rules: Vec<CompiledRule>,
}

impl RelationshipExtractor {
    /// Built-in rules only.
    pub fn new() -> Self {
        Self {
            rules: builtin_rules(),
        }
    }

    /// Configured rules first, then the built-in table.
    pub fn with_rules(configured: &[EdgeRule]) -> Result<Self, regex_lite::Error> {
        let mut rules = configured
            .iter()
            .map(EdgeRule::compile)
            .collect::<Result<Vec<_>, _>>()?;
        rules.extend(builtin_rules());
        Ok(Self { rules })
    }

    /// Edges for every accessor of every model, in model then accessor order.
    ///
    /// `categories` is the set of category names target guesses are drawn
    /// from; the models' own categories are always included.
    pub fn extract(&self, models: &[GeneratedModel], categories: &BTreeSet<String>) -> Vec<ConnectionEdge> {
        let mut known: BTreeSet<String> = categories.clone();
        known.extend(models.iter().map(|m| m.category.clone()));

        models
            .iter()
            .flat_map(|model| {
                model
                    .accessors
                    .iter()
                    .map(|accessor| self.classify(&model.category, accessor, &known))
            })
            .collect()
    }

    fn classify(&self, category: &str, accessor: &AccessorSpec, known: &BTreeSet<String>) -> ConnectionEdge {
        let matched = self
            .rules
            .iter()
            .find(|rule| rule.matches(category, &accessor.field_name));

        let (edge_type, cardinality, target) = match matched {
            Some(rule) => (
                rule.edge_type.clone(),
                rule.cardinality.unwrap_or_default(),
                rule.target_category.clone(),
            ),
            None => (EdgeType::References, Cardinality::default(), None),
        };

        ConnectionEdge {
            source_category: category.to_string(),
            field_name: accessor.field_name.clone(),
            target_category_guess: target.or_else(|| guess_target(&accessor.field_name, category, known)),
            edge_type,
            cardinality,
        }
    }
}

impl Default for RelationshipExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Guess a target category from the words of a field name.
///
/// `controlled_region_id` -> `region`. A word matches a category by its
/// whole name or its last word (`areas` -> `dungeon_area`), with plural
/// words matching singular names. Another category is preferred over the
/// source's own; the last matching word wins, since names tend to end in
/// the noun.
fn guess_target(field_name: &str, source: &str, known: &BTreeSet<String>) -> Option<String> {
    let snake = crate::codegen::to_snake_case(field_name);
    let mut best: Option<&String> = None;
    let mut self_match = false;

    for word in snake.split('_').filter(|w| !w.is_empty()) {
        for category in known {
            if !word_names_category(word, category) {
                continue;
            }
            if category == source {
                self_match = true;
            } else {
                best = Some(category);
            }
        }
    }
    match best {
        Some(category) => Some(category.clone()),
        None if self_match => Some(source.to_string()),
        None => None,
    }
}

fn word_names_category(word: &str, category: &str) -> bool {
    let name = crate::codegen::to_snake_case(category);
    let last = name.rsplit('_').next().unwrap_or(&name);
    let singular = |w: &str| w.strip_suffix('s').unwrap_or(w).to_string();

    let word = singular(word);
    word == singular(&name) || word == singular(last)
}
