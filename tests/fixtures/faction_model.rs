// Generated by loregen from the `faction` inventory. Do not edit.

use serde::{Deserialize, Serialize};

pub const CATEGORY: &str = "faction";

/// `String` entity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct String_ {
    /// Faction id
    /// stable across exports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub all: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allies: Vec<String>,
    #[serde(rename = "controlledRegionId", default, skip_serializing_if = "Option::is_none")]
    pub controlled_region_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength: Option<f64>,
}

impl String_ {
    pub const ENTITY: &'static str = "String";

    /// This record's own id.
    pub fn record_id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Ids referenced through `all`.
    pub fn all_field_refs(&self) -> Vec<String> {
        self.all.iter().cloned().collect()
    }

    /// Ids referenced through `allies`.
    pub fn allies_refs(&self) -> Vec<String> {
        self.allies.iter().cloned().collect()
    }

    /// Ids referenced through `controlledRegionId`.
    pub fn controlled_region_id_refs(&self) -> Vec<String> {
        self.controlled_region_id.iter().cloned().collect()
    }

    /// Every id this record references.
    pub fn all_refs(&self) -> Vec<String> {
        let mut refs = Vec::new();
        refs.extend(self.all_field_refs());
        refs.extend(self.allies_refs());
        refs.extend(self.controlled_region_id_refs());
        refs
    }
}

/// `Guild Hall` entity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuildHall {
    #[serde(rename = "member\nids", default, skip_serializing_if = "Vec::is_empty")]
    pub member_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
}

impl GuildHall {
    pub const ENTITY: &'static str = "Guild\nHall";

    /// Ids referenced through `member ids`.
    pub fn member_ids_refs(&self) -> Vec<String> {
        self.member_ids.iter().cloned().collect()
    }

    /// Every id this record references.
    pub fn all_refs(&self) -> Vec<String> {
        let mut refs = Vec::new();
        refs.extend(self.member_ids_refs());
        refs
    }
}
