//! Row-keyed JSON projection of a sheet
//!
//! The first row of a sheet is the header; every following row becomes an
//! object of `field -> value` keyed by a hash of its normalised content:
//!
//! ```json
//! {
//!   "0f3c...": { "japanese": "人間", "english": "human", ... }
//! }
//! ```
//!
//! Keys are emitted in row order and values in column order. The document
//! hash is taken over the exact pretty-printed bytes, so re-hashing a
//! projection file on disk yields the hash recorded when it was written.

use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashMap;

use super::sheet::SheetModel;

/// Number of hex characters kept from a blake3 digest
const HASH_LEN: usize = 32;

const FIELD_SEPARATOR: char = '\u{1f}';
const RECORD_SEPARATOR: char = '\u{1e}';

/// Hashes bytes into the short hex form used for keys and manifest entries
pub fn content_hash(bytes: &[u8]) -> String {
    let hash = blake3::hash(bytes);
    hash.to_hex()[..HASH_LEN].to_string()
}

/// One projected row: fields in header order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowObject {
    fields: Vec<(String, String)>,
}

impl RowObject {
    /// Looks up a field value
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value.as_str())
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// Key derived from the field/value pairs, independent of column order
    fn key(&self) -> String {
        let mut sorted: Vec<_> = self.fields.iter().collect();
        sorted.sort();

        let mut normalized = String::new();
        for (field, value) in sorted {
            normalized.push_str(field);
            normalized.push(FIELD_SEPARATOR);
            normalized.push_str(value);
            normalized.push(RECORD_SEPARATOR);
        }

        content_hash(normalized.as_bytes())
    }
}

impl Serialize for RowObject {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (field, value) in &self.fields {
            map.serialize_entry(field, value)?;
        }
        map.end()
    }
}

/// The projection document of one sheet
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Projection {
    entries: Vec<(String, RowObject)>,
}

impl Projection {
    /// Number of keyed rows
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Row keys in emission order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    /// Looks up a row by key
    pub fn get(&self, key: &str) -> Option<&RowObject> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, row)| row)
    }

    pub fn entries(&self) -> &[(String, RowObject)] {
        &self.entries
    }

    /// Pretty-printed JSON bytes, as written to disk
    pub fn to_json_bytes(&self) -> Vec<u8> {
        // Serializing string maps into a Vec cannot fail
        serde_json::to_vec_pretty(self).unwrap_or_default()
    }

    /// Content hash of the serialized document
    pub fn hash(&self) -> String {
        content_hash(&self.to_json_bytes())
    }
}

impl Serialize for Projection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, row) in &self.entries {
            map.serialize_entry(key, row)?;
        }
        map.end()
    }
}

/// Header field names with their column index; empty and repeated names are dropped
fn header_fields(header: &[String]) -> Vec<(usize, String)> {
    let mut fields: Vec<(usize, String)> = Vec::new();
    for (col, cell) in header.iter().enumerate() {
        let name = cell.trim();
        if name.is_empty() || fields.iter().any(|(_, existing)| existing == name) {
            continue;
        }
        fields.push((col, name.to_string()));
    }
    fields
}

/// Builds the projection of a sheet
pub fn project(sheet: &SheetModel) -> Projection {
    let Some(header) = sheet.header() else {
        return Projection::default();
    };
    let fields = header_fields(header);

    let mut entries: Vec<(String, RowObject)> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for row in sheet.rows.iter().skip(1) {
        let object = RowObject {
            fields: fields
                .iter()
                .filter_map(|(col, name)| {
                    let value = row.get(*col)?.trim();
                    (!value.is_empty()).then(|| (name.clone(), value.to_string()))
                })
                .collect(),
        };

        if object.fields.is_empty() {
            continue;
        }

        let key = object.key();
        match positions.get(&key) {
            Some(&index) => entries[index].1 = object,
            None => {
                positions.insert(key.clone(), entries.len());
                entries.push((key, object));
            }
        }
    }

    Projection { entries }
}
