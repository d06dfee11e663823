//! Reading field values out of staged records

use crate::codegen::to_snake_case;
use crate::record::{RawRecord, RecordId};
use serde_json::Value;

const MAX_DEPTH: usize = 4;

/// A record with its structured content parsed once.
#[derive(Debug)]
pub struct RecordView<'a> {
    pub record: &'a RawRecord,
    json: Option<Value>,
}

impl<'a> RecordView<'a> {
    pub fn new(record: &'a RawRecord) -> Self {
        let json = if record.is_structured() {
            serde_json::from_str(&record.raw_content).ok()
        } else {
            None
        };
        Self { record, json }
    }

    pub fn id(&self) -> &RecordId {
        &self.record.id
    }

    pub fn category(&self) -> Option<&str> {
        self.record.category.as_deref()
    }

    /// Ids held by `field_name`, in document order.
    pub fn field_refs(&self, field_name: &str) -> Vec<RecordId> {
        match &self.json {
            Some(json) => field_values(json, field_name)
                .into_iter()
                .map(RecordId::new)
                .filter(|id| id != self.id())
                .collect(),
            None => Vec::new(),
        }
    }
}

/// Scalar values under the first key matching `field_name`.
///
/// Keys match exactly or by snake_case form (`parentId` == `parent_id`).
/// The search is breadth-first over nested objects, so a top-level key
/// wins over a nested one. Arrays yield every scalar element; an object
/// value yields its `id`.
pub fn field_values(json: &Value, field_name: &str) -> Vec<String> {
    let wanted = to_snake_case(field_name);
    let mut level: Vec<&Value> = vec![json];

    for _ in 0..MAX_DEPTH {
        let mut next = Vec::new();
        for value in level {
            let Value::Object(map) = value else { continue };
            if let Some((_, found)) = map
                .iter()
                .find(|(key, _)| key.as_str() == field_name || to_snake_case(key) == wanted)
            {
                return scalars(found);
            }
            next.extend(map.values().filter(|v| v.is_object()));
        }
        if next.is_empty() {
            break;
        }
        level = next;
    }
    Vec::new()
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => map.get("id").and_then(scalar),
        _ => None,
    }
}

fn scalars(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(scalar).collect(),
        other => scalar(other).into_iter().collect(),
    }
}
