//! Known-entity index: authoritative canonical name -> category table

use super::count_word_hits;
use crate::config::ConfigError;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

#[derive(Debug, Clone)]
struct KnownEntry {
    display_name: String,
    category: String,
    /// Same name listed under more than one category
    ambiguous: bool,
}

/// Read-only lookup of named entities per category.
///
/// Names are matched case-insensitively. A name listed under two
/// different categories is kept for text matching but never used to
/// route, since it would not decide anything.
#[derive(Debug, Clone, Default)]
pub struct KnownEntityIndex {
    by_name: BTreeMap<String, KnownEntry>,
}

impl KnownEntityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, category: impl Into<String>) {
        let display_name = name.into().trim().to_string();
        let category = category.into();
        if display_name.is_empty() {
            return;
        }
        let key = display_name.to_lowercase();

        match self.by_name.get_mut(&key) {
            Some(existing) if existing.category != category => existing.ambiguous = true,
            Some(_) => {}
            None => {
                self.by_name.insert(
                    key,
                    KnownEntry {
                        display_name,
                        category,
                        ambiguous: false,
                    },
                );
            }
        }
    }

    pub fn from_pairs<I, N, C>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (N, C)>,
        N: Into<String>,
        C: Into<String>,
    {
        let mut index = Self::new();
        for (name, category) in pairs {
            index.insert(name, category);
        }
        index
    }

    /// Load a `name: category` map from a YAML or JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;

        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));

        let pairs: BTreeMap<String, String> = if is_json {
            serde_json::from_str(&text).map_err(|source| ConfigError::Json {
                path: path.display().to_string(),
                source,
            })?
        } else {
            serde_yaml::from_str(&text).map_err(|source| ConfigError::Yaml {
                path: path.display().to_string(),
                source,
            })?
        };

        Ok(Self::from_pairs(pairs))
    }

    /// Category for an exact (case-insensitive) unambiguous name match.
    pub fn category_of(&self, name: &str) -> Option<&str> {
        self.by_name
            .get(&name.trim().to_lowercase())
            .filter(|entry| !entry.ambiguous)
            .map(|entry| entry.category.as_str())
    }

    /// Longest known name occurring in `text` as whole words (ties:
    /// alphabetical).
    pub fn find_in_text(&self, text: &str) -> Option<&str> {
        let haystack = text.to_lowercase();
        let mut best: Option<(&str, &KnownEntry)> = None;

        // BTreeMap iteration is alphabetical, so the first of equal-length
        // matches is kept.
        for (key, entry) in &self.by_name {
            if count_word_hits(&haystack, key) == 0 {
                continue;
            }
            let longer = best.map_or(true, |(best_key, _)| key.len() > best_key.len());
            if longer {
                best = Some((key.as_str(), entry));
            }
        }

        best.map(|(_, entry)| entry.display_name.as_str())
    }

    /// Every category named in the index.
    pub fn categories(&self) -> BTreeSet<String> {
        self.by_name.values().map(|e| e.category.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let index = KnownEntityIndex::from_pairs([("Aurora Bushes", "region")]);
        assert_eq!(index.category_of("aurora bushes"), Some("region"));
        assert_eq!(index.category_of("  AURORA BUSHES "), Some("region"));
        assert_eq!(index.category_of("Aurora"), None);
    }

    #[test]
    fn ambiguous_names_do_not_route() {
        let index = KnownEntityIndex::from_pairs([
            ("Redhollow", "settlement"),
            ("Redhollow", "dungeon"),
        ]);
        assert_eq!(index.category_of("Redhollow"), None);
        assert_eq!(index.find_in_text("near redhollow"), Some("Redhollow"));
    }

    #[test]
    fn duplicate_same_category_is_not_ambiguous() {
        let index = KnownEntityIndex::from_pairs([("Keep", "dungeon"), ("keep", "dungeon")]);
        assert_eq!(index.len(), 1);
        assert_eq!(index.category_of("KEEP"), Some("dungeon"));
    }

    #[test]
    fn find_in_text_matches_whole_words_only() {
        let index = KnownEntityIndex::from_pairs([("Ash", "settlement"), ("Glass Flats", "region")]);
        assert_eq!(index.find_in_text("a crash in the ashfields"), None);
        assert_eq!(index.find_in_text("the Ash road, beyond glass flats"), Some("Glass Flats"));
        assert_eq!(index.find_in_text("(Ash)"), Some("Ash"));
        assert_eq!(index.find_in_text("sunglass flatsville"), None);
    }

    #[test]
    fn find_in_text_ties_break_alphabetically() {
        let index = KnownEntityIndex::from_pairs([("Bravo", "faction"), ("Alpha", "faction")]);
        assert_eq!(index.find_in_text("bravo meets alpha"), Some("Alpha"));
    }

    #[test]
    fn load_yaml_and_json_files() {
        let dir = tempfile::tempdir().unwrap();

        let yaml = dir.path().join("known.yaml");
        std::fs::write(&yaml, "Aurora Bushes: region\nHarbor Guild: faction\n").unwrap();
        let index = KnownEntityIndex::load(&yaml).unwrap();
        assert_eq!(index.category_of("Harbor Guild"), Some("faction"));

        let json = dir.path().join("known.json");
        std::fs::write(&json, r#"{"Vaults of Bone": "dungeon"}"#).unwrap();
        let index = KnownEntityIndex::load(&json).unwrap();
        assert_eq!(index.categories().into_iter().collect::<Vec<_>>(), vec!["dungeon"]);
    }
}
