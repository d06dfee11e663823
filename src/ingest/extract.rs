//! Field extraction from raw fragment content
//!
//! Everything here is best-effort: missing or malformed data yields `None`
//! (or an empty set), never an error.

use crate::record::{ContentKind, MapCoord, RecordId};
use crate::router::KnownEntityIndex;
use pulldown_cmark::{Event, Parser, Tag, TagEnd};
use regex_lite::Regex;
use serde_json::Value;
use std::collections::BTreeSet;

const UUID_PATTERN: &str =
    r"\b[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}\b";

/// Letter-number-letter-number cell identifier, e.g. `W2S51`.
const SPATIAL_KEY_PATTERN: &str = r"\b[A-Z][0-9]{1,4}[A-Z][0-9]{1,4}\b";

const NAME_FIELDS: &[&str] = &["name", "title", "label", "display_name", "displayName", "entity_name"];
const NESTED_NAME_CONTAINERS: &[&str] = &["entity", "data", "properties", "attributes", "meta"];
const CELL_FIELDS: &[&str] = &["cell_id", "cell", "hex", "hex_id", "hex_key"];
const MAX_COORD_DEPTH: usize = 4;

/// Compiled patterns used by the ingestor.
///
/// Built once per ingestor; the extra patterns come from configuration.
pub struct Extractor {
    uuid: Regex,
    spatial_key: Regex,
    extra_ids: Vec<Regex>,
    html_heading: Regex,
    html_tag: Regex,
    embedded_coord: Regex,
    data_x: Regex,
    data_y: Regex,
    data_cell: Regex,
}

impl Extractor {
    pub fn new(extra_id_patterns: &[String]) -> Result<Self, regex_lite::Error> {
        let extra_ids = extra_id_patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            uuid: Regex::new(UUID_PATTERN)?,
            spatial_key: Regex::new(SPATIAL_KEY_PATTERN)?,
            extra_ids,
            html_heading: Regex::new(r"(?is)<h[1-6][^>]*>(.*?)</h[1-6]\s*>")?,
            html_tag: Regex::new(r"<[^>]*>")?,
            embedded_coord: Regex::new(r#"\{[^{}]*"x"\s*:\s*-?[0-9][^{}]*\}"#)?,
            data_x: Regex::new(r#"data-x\s*=\s*["']?(-?[0-9]+(?:\.[0-9]+)?)"#)?,
            data_y: Regex::new(r#"data-y\s*=\s*["']?(-?[0-9]+(?:\.[0-9]+)?)"#)?,
            data_cell: Regex::new(r#"data-(?:cell|hex)(?:-id)?\s*=\s*["']([^"']+)["']"#)?,
        })
    }

    /// Strict structured-data parse; only objects and arrays count.
    pub fn detect(&self, text: &str) -> (ContentKind, Option<Value>) {
        match serde_json::from_str::<Value>(text.trim()) {
            Ok(value) if value.is_object() || value.is_array() => {
                (ContentKind::StructuredData, Some(value))
            }
            _ => (ContentKind::Markup, None),
        }
    }

    /// All ids referenced in `text`, excluding the record's own id.
    pub fn cross_refs(&self, text: &str, own_id: &RecordId) -> BTreeSet<RecordId> {
        let mut ids: BTreeSet<RecordId> = self
            .uuid
            .find_iter(text)
            .chain(self.extra_ids.iter().flat_map(|re| re.find_iter(text)))
            .map(|m| RecordId::new(m.as_str()))
            .collect();
        ids.remove(own_id);
        ids
    }

    /// First canonical cell identifier in `text`.
    ///
    /// UUIDs are blanked first so hex segments such as `E4F5` inside an
    /// identifier never match.
    pub fn spatial_key(&self, text: &str) -> Option<String> {
        let scrubbed = self.uuid.replace_all(text, " ");
        self.spatial_key
            .find(&scrubbed)
            .map(|m| m.as_str().to_string())
    }

    pub fn structured_name(&self, value: &Value) -> Option<String> {
        let object = first_object(value)?;

        if let Some(name) = name_field(object) {
            return Some(name);
        }
        NESTED_NAME_CONTAINERS
            .iter()
            .filter_map(|key| object.get(*key).and_then(Value::as_object))
            .find_map(name_field)
    }

    /// Heading text (HTML, then Markdown), else the longest known entity
    /// name occurring in the text.
    pub fn markup_name(&self, text: &str, known: &KnownEntityIndex) -> Option<String> {
        if let Some(heading) = self.html_heading_text(text) {
            return Some(heading);
        }
        if let Some(heading) = markdown_heading_text(text) {
            return Some(heading);
        }
        known.find_in_text(text).map(str::to_string)
    }

    fn html_heading_text(&self, text: &str) -> Option<String> {
        self.html_heading
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .map(|inner| {
                let stripped = self.html_tag.replace_all(inner.as_str(), " ");
                collapse_whitespace(&decode_entities(&stripped))
            })
            .find(|heading| !heading.is_empty())
    }

    pub fn structured_coord(&self, value: &Value) -> Option<MapCoord> {
        find_coord(value, 0)
    }

    pub fn markup_coord(&self, text: &str) -> Option<MapCoord> {
        let decoded = decode_entities(text);

        for candidate in self.embedded_coord.find_iter(&decoded) {
            if let Ok(value) = serde_json::from_str::<Value>(candidate.as_str()) {
                if let Some(coord) = value.as_object().and_then(coord_from_object) {
                    return Some(coord);
                }
            }
        }

        let x = capture_number(&self.data_x, &decoded)?;
        let y = capture_number(&self.data_y, &decoded)?;
        let cell_id = self
            .data_cell
            .captures(&decoded)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string());
        Some(MapCoord { x, y, cell_id })
    }
}

fn first_object(value: &Value) -> Option<&serde_json::Map<String, Value>> {
    match value {
        Value::Object(map) => Some(map),
        Value::Array(items) => items.iter().find_map(Value::as_object),
        _ => None,
    }
}

fn name_field(object: &serde_json::Map<String, Value>) -> Option<String> {
    NAME_FIELDS
        .iter()
        .filter_map(|key| object.get(*key).and_then(Value::as_str))
        .map(collapse_whitespace)
        .find(|name| !name.is_empty())
}

fn find_coord(value: &Value, depth: usize) -> Option<MapCoord> {
    if depth > MAX_COORD_DEPTH {
        return None;
    }
    match value {
        Value::Object(map) => coord_from_object(map)
            .or_else(|| map.values().find_map(|v| find_coord(v, depth + 1))),
        Value::Array(items) => items.iter().find_map(|v| find_coord(v, depth + 1)),
        _ => None,
    }
}

fn coord_from_object(map: &serde_json::Map<String, Value>) -> Option<MapCoord> {
    let x = map.get("x")?.as_f64()?;
    let y = map.get("y")?.as_f64()?;
    let cell_id = CELL_FIELDS
        .iter()
        .filter_map(|key| map.get(*key).and_then(Value::as_str))
        .map(str::to_string)
        .next();
    Some(MapCoord { x, y, cell_id })
}

fn capture_number(re: &Regex, text: &str) -> Option<f64> {
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

fn markdown_heading_text(text: &str) -> Option<String> {
    let mut in_heading = false;
    let mut buffer = String::new();

    for event in Parser::new(text) {
        match event {
            Event::Start(Tag::Heading { .. }) => {
                in_heading = true;
                buffer.clear();
            }
            Event::End(TagEnd::Heading(_)) => {
                let heading = collapse_whitespace(&buffer);
                if !heading.is_empty() {
                    return Some(heading);
                }
                in_heading = false;
            }
            Event::Text(t) | Event::Code(t) if in_heading => buffer.push_str(&t),
            Event::SoftBreak | Event::HardBreak if in_heading => buffer.push(' '),
            _ => {}
        }
    }
    None
}

fn decode_entities(text: &str) -> String {
    text.replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> Extractor {
        Extractor::new(&[]).unwrap()
    }

    #[test]
    fn detect_json_object_as_structured() {
        let (kind, value) = extractor().detect(r#" {"name": "Aurora Bushes"} "#);
        assert_eq!(kind, ContentKind::StructuredData);
        assert!(value.is_some());
    }

    #[test]
    fn detect_scalars_and_html_as_markup() {
        let ex = extractor();
        assert_eq!(ex.detect("42").0, ContentKind::Markup);
        assert_eq!(ex.detect("<div>Hex W2S51</div>").0, ContentKind::Markup);
        assert_eq!(ex.detect("{ broken").0, ContentKind::Markup);
    }

    #[test]
    fn spatial_key_first_match_wins() {
        let ex = extractor();
        assert_eq!(
            ex.spatial_key("Hex W2S51 borders E1N3").as_deref(),
            Some("W2S51")
        );
        assert_eq!(ex.spatial_key("no coordinates here"), None);
    }

    #[test]
    fn spatial_key_ignores_uuid_segments() {
        let text = "ref 0A1B2C3D-E4F5-4A6B-8C7D-000000000001 then W3N7";
        assert_eq!(extractor().spatial_key(text).as_deref(), Some("W3N7"));
    }

    #[test]
    fn cross_refs_deduplicate_and_skip_own_id() {
        let own = RecordId::new("11111111-1111-4111-8111-111111111111");
        let text = "see 22222222-2222-4222-8222-222222222222 and \
                    22222222-2222-4222-8222-222222222222, self \
                    11111111-1111-4111-8111-111111111111";
        let refs = extractor().cross_refs(text, &own);
        assert_eq!(refs.len(), 1);
        assert!(refs.contains(&RecordId::new("22222222-2222-4222-8222-222222222222")));
    }

    #[test]
    fn extra_id_patterns_are_scanned() {
        let ex = Extractor::new(&[r"\bent_[A-Za-z0-9]{6}\b".to_string()]).unwrap();
        let refs = ex.cross_refs("links ent_Ab12Cd", &RecordId::new("x"));
        assert!(refs.contains(&RecordId::new("ent_ab12cd")));
    }

    #[test]
    fn structured_name_checks_conventional_then_nested_fields() {
        let ex = extractor();
        let top: Value = serde_json::json!({"title": "  Vaults  of   Bone "});
        assert_eq!(ex.structured_name(&top).as_deref(), Some("Vaults of Bone"));

        let nested: Value = serde_json::json!({"entity": {"name": "Harbor Guild"}});
        assert_eq!(ex.structured_name(&nested).as_deref(), Some("Harbor Guild"));

        let none: Value = serde_json::json!({"hex": "W2S51"});
        assert_eq!(ex.structured_name(&none), None);
    }

    #[test]
    fn markup_name_prefers_html_heading() {
        let ex = extractor();
        let known = KnownEntityIndex::new();
        let html = "<div><h2 class='t'>The <b>Sunken</b> Keep</h2><p>...</p></div>";
        assert_eq!(ex.markup_name(html, &known).as_deref(), Some("The Sunken Keep"));
    }

    #[test]
    fn markup_name_reads_markdown_heading() {
        let ex = extractor();
        let known = KnownEntityIndex::new();
        let md = "intro line\n\n## Ashen Fields\n\nbody";
        assert_eq!(ex.markup_name(md, &known).as_deref(), Some("Ashen Fields"));
    }

    #[test]
    fn markup_name_falls_back_to_known_names() {
        let ex = extractor();
        let mut known = KnownEntityIndex::new();
        known.insert("Aurora Bushes", "region");
        known.insert("Aurora", "settlement");
        let text = "<p>Travellers avoid the aurora bushes at night.</p>";
        assert_eq!(ex.markup_name(text, &known).as_deref(), Some("Aurora Bushes"));
    }

    #[test]
    fn structured_coord_found_in_nested_object() {
        let value: Value =
            serde_json::json!({"map": {"position": {"x": 12.5, "y": 3, "hex": "W2S51"}}});
        let coord = extractor().structured_coord(&value).unwrap();
        assert_eq!(coord.x, 12.5);
        assert_eq!(coord.y, 3.0);
        assert_eq!(coord.cell_id.as_deref(), Some("W2S51"));
    }

    #[test]
    fn structured_coord_tolerates_non_numeric_values() {
        let value: Value = serde_json::json!({"x": "left", "y": 2});
        assert_eq!(extractor().structured_coord(&value), None);
    }

    #[test]
    fn markup_coord_from_embedded_json_and_data_attributes() {
        let ex = extractor();
        let embedded = r#"<div data-coord='{"x": 4, "y": 9}'></div>"#;
        let coord = ex.markup_coord(embedded).unwrap();
        assert_eq!((coord.x, coord.y), (4.0, 9.0));

        let escaped = "<div data-coord=\"{&quot;x&quot;: 1.5, &quot;y&quot;: 2}\"></div>";
        assert_eq!(ex.markup_coord(escaped).unwrap().x, 1.5);

        let attrs = r#"<span data-x="7" data-y="-3" data-hex="E1N3"></span>"#;
        let coord = ex.markup_coord(attrs).unwrap();
        assert_eq!((coord.x, coord.y), (7.0, -3.0));
        assert_eq!(coord.cell_id.as_deref(), Some("E1N3"));

        assert_eq!(ex.markup_coord("<p>plain</p>"), None);
    }
}
