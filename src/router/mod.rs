//! Category router: assigns each record to exactly one cluster
//!
//! Rule priority:
//! 1. Exact (case-insensitive) canonical-name match in the known-entity index
//! 2. Strongest keyword match from the configured keyword table
//!
//! A tie on the strongest keyword score leaves the record unrouted rather
//! than guessing. Routing reads only the record and the injected tables,
//! so the same input always routes the same way.

mod cluster;
mod known;

pub use cluster::{Cluster, ClusterSet};
pub use known::KnownEntityIndex;

use crate::config::RoutingConfig;
use crate::record::RawRecord;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Which rule decided a routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteRule {
    KnownEntity,
    Keyword { hits: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnroutedReason {
    /// No rule matched
    NoMatch,
    /// Several categories share the strongest keyword score
    Tie(Vec<String>),
}

impl std::fmt::Display for UnroutedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoMatch => write!(f, "no routing rule matched"),
            Self::Tie(categories) => write!(f, "keyword tie between {}", categories.join(", ")),
        }
    }
}

/// Outcome of routing one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    Routed { category: String, rule: RouteRule },
    Unrouted(UnroutedReason),
}

impl RouteDecision {
    pub fn category(&self) -> Option<&str> {
        match self {
            Self::Routed { category, .. } => Some(category),
            Self::Unrouted(_) => None,
        }
    }
}

/// Keyword heuristics per category, lowercased at construction.
#[derive(Debug, Clone, Default)]
pub struct KeywordTable {
    keywords: BTreeMap<String, Vec<String>>,
    min_hits: usize,
}

impl KeywordTable {
    pub fn new(config: &RoutingConfig) -> Self {
        let keywords = config
            .keywords
            .iter()
            .map(|(category, words)| {
                let words = words
                    .iter()
                    .map(|w| w.trim().to_lowercase())
                    .filter(|w| !w.is_empty())
                    .collect();
                (category.clone(), words)
            })
            .collect();
        Self {
            keywords,
            min_hits: config.min_keyword_hits.max(1),
        }
    }

    /// Whole-word hit count per category, for categories reaching `min_hits`.
    fn scores(&self, text: &str) -> BTreeMap<&str, usize> {
        let haystack = text.to_lowercase();
        self.keywords
            .iter()
            .map(|(category, words)| {
                let hits = words.iter().map(|w| count_word_hits(&haystack, w)).sum();
                (category.as_str(), hits)
            })
            .filter(|(_, hits)| *hits >= self.min_hits)
            .collect()
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.keywords.keys().map(String::as_str)
    }
}

/// Count occurrences of `needle` in `haystack` not embedded in a longer word.
pub(crate) fn count_word_hits(haystack: &str, needle: &str) -> usize {
    if needle.is_empty() {
        return 0;
    }
    haystack
        .match_indices(needle)
        .filter(|(start, _)| {
            let before = haystack[..*start].chars().next_back();
            let after = haystack[start + needle.len()..].chars().next();
            !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
        })
        .count()
}

/// Assigns records to categories.
pub struct CategoryRouter {
    known: Arc<KnownEntityIndex>,
    keywords: KeywordTable,
}

impl CategoryRouter {
    pub fn new(known: Arc<KnownEntityIndex>, keywords: KeywordTable) -> Self {
        Self { known, keywords }
    }

    pub fn route(&self, record: &RawRecord) -> RouteDecision {
        if let Some(category) = record
            .canonical_name
            .as_deref()
            .and_then(|name| self.known.category_of(name))
        {
            return RouteDecision::Routed {
                category: category.to_string(),
                rule: RouteRule::KnownEntity,
            };
        }

        let scores = self.keywords.scores(&record.raw_content);
        let Some(best) = scores.values().copied().max() else {
            return RouteDecision::Unrouted(UnroutedReason::NoMatch);
        };

        let leaders: Vec<&str> = scores
            .iter()
            .filter(|(_, hits)| **hits == best)
            .map(|(category, _)| *category)
            .collect();

        match leaders.as_slice() {
            [category] => RouteDecision::Routed {
                category: category.to_string(),
                rule: RouteRule::Keyword { hits: best },
            },
            _ => RouteDecision::Unrouted(UnroutedReason::Tie(
                leaders.iter().map(|c| c.to_string()).collect(),
            )),
        }
    }

    /// Every category this router can assign.
    pub fn known_categories(&self) -> Vec<String> {
        let mut categories = self.known.categories();
        categories.extend(self.keywords.categories().map(str::to_string));
        categories.into_iter().collect()
    }
}
