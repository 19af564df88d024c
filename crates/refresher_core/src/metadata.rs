use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

const AUTHOR_SEPARATOR: &str = " & ";

/// Field name to value view of one catalog record, captured at a point in time.
///
/// Only fields with a value are kept; nulls and empty strings are dropped on capture.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataSnapshot {
    fields: BTreeMap<String, Value>,
}

impl MetadataSnapshot {
    pub fn from_fields<I>(fields: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let fields = fields
            .into_iter()
            .filter(|(_, value)| !is_empty_value(value))
            .collect();
        Self { fields }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    pub fn title(&self) -> &str {
        self.fields
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or("Unknown")
    }

    /// Authors as a list; accepts either a JSON array or a `" & "` joined string.
    pub fn authors(&self) -> Vec<String> {
        match self.fields.get("authors") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            Some(Value::String(joined)) => joined
                .split(AUTHOR_SEPARATOR)
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    /// `"Title - Author A, Author B"`, used in log lines.
    pub fn label(&self) -> String {
        format!("{} - {}", self.title(), self.authors().join(", "))
    }

    /// Names of fields whose value differs from `other`, including added or removed ones.
    pub fn changed_fields(&self, other: &MetadataSnapshot) -> Vec<String> {
        let mut names: Vec<String> = self
            .fields
            .keys()
            .chain(other.fields.keys())
            .filter(|name| self.fields.get(*name) != other.fields.get(*name))
            .cloned()
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        _ => false,
    }
}

/// Metadata before and after one successful update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataPair {
    pub old: MetadataSnapshot,
    pub new: MetadataSnapshot,
}

impl MetadataPair {
    pub fn new(old: MetadataSnapshot, new: MetadataSnapshot) -> Self {
        Self { old, new }
    }

    pub fn changed_fields(&self) -> Vec<String> {
        self.old.changed_fields(&self.new)
    }
}
