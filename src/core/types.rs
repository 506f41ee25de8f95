use serde::{Deserialize, Serialize};

/// A single stored record: an ordered list of field/value pairs.
///
/// Field order is preserved exactly as written so that serialization is a
/// round trip, but equality is multiset equality over the fields — two
/// records holding the same fields in a different order are the same record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Record {
    pub fields: Vec<(String, String)>,
}

impl Record {
    pub fn new() -> Self {
        Record { fields: Vec::new() }
    }

    pub fn with_fields(fields: Vec<(String, String)>) -> Self {
        Record { fields }
    }

    pub fn push_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    /// First value stored under `name`, if any.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// The field the primary key is derived from: `id` when present,
    /// otherwise the first field.
    pub fn key_field(&self) -> Option<&str> {
        if self.get("id").is_some() {
            return Some("id");
        }
        self.fields.first().map(|(n, _)| n.as_str())
    }

    /// Primary key: the value of `id` when present, otherwise the value of
    /// the first field. `None` only for an empty record.
    pub fn key(&self) -> Option<&str> {
        self.key_field().and_then(|f| self.get(f))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn sorted_fields(&self) -> Vec<&(String, String)> {
        let mut fields: Vec<&(String, String)> = self.fields.iter().collect();
        fields.sort();
        fields
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.fields.len() == other.fields.len() && self.sorted_fields() == other.sorted_fields()
    }
}

impl Eq for Record {}
