// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Cache records and derived statistics.

use printview_core::ModelFormat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Kind of model a cache entry holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    Stl,
    Obj,
    Unknown,
}

impl ModelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::Stl => "stl",
            ModelType::Obj => "obj",
            ModelType::Unknown => "unknown",
        }
    }

    pub fn format(&self) -> Option<ModelFormat> {
        match self {
            ModelType::Stl => Some(ModelFormat::Stl),
            ModelType::Obj => Some(ModelFormat::Obj),
            ModelType::Unknown => None,
        }
    }
}

impl From<ModelFormat> for ModelType {
    fn from(format: ModelFormat) -> Self {
        match format {
            ModelFormat::Stl => ModelType::Stl,
            ModelFormat::Obj => ModelType::Obj,
        }
    }
}

impl FromStr for ModelType {
    type Err = std::convert::Infallible;

    /// Anything unrecognized is `Unknown`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(s.parse::<ModelFormat>()
            .map(ModelType::from)
            .unwrap_or(ModelType::Unknown))
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cached model bytes: raw binary or text (ASCII STL, OBJ)
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "value")]
pub enum Payload {
    Binary(Vec<u8>),
    Text(String),
}

impl Payload {
    /// Wrap downloaded model bytes; OBJ is kept as text when it is valid UTF-8
    pub fn for_model(format: ModelFormat, bytes: Vec<u8>) -> Self {
        match format {
            ModelFormat::Obj => match String::from_utf8(bytes) {
                Ok(text) => Payload::Text(text),
                Err(e) => Payload::Binary(e.into_bytes()),
            },
            ModelFormat::Stl => Payload::Binary(bytes),
        }
    }

    /// Estimated in-memory footprint: byte length for binary, two bytes per
    /// UTF-16 code unit for text
    pub fn estimated_size(&self) -> u64 {
        match self {
            Payload::Binary(bytes) => bytes.len() as u64,
            Payload::Text(text) => text.encode_utf16().count() as u64 * 2,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Payload::Binary(bytes) => bytes,
            Payload::Text(text) => text.as_bytes(),
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Payload::Text(_))
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Binary(bytes) => write!(f, "Binary({} bytes)", bytes.len()),
            Payload::Text(text) => write!(f, "Text({} chars)", text.len()),
        }
    }
}

/// A cached model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub id: String,
    pub model_type: ModelType,
    pub data: Payload,
    /// Estimated footprint, fixed at construction
    pub size_bytes: u64,
    /// Milliseconds since the Unix epoch
    pub created_at: u64,
    pub last_accessed_at: u64,
}

impl CacheEntry {
    /// New entry stamped at `now_ms` with its size estimated from `data`
    pub fn new(id: impl Into<String>, model_type: ModelType, data: Payload, now_ms: u64) -> Self {
        let size_bytes = data.estimated_size();
        Self {
            id: id.into(),
            model_type,
            data,
            size_bytes,
            created_at: now_ms,
            last_accessed_at: now_ms,
        }
    }

    pub fn metadata(&self) -> EntryMetadata {
        EntryMetadata {
            id: self.id.clone(),
            model_type: self.model_type,
            size_bytes: self.size_bytes,
            created_at: self.created_at,
            last_accessed_at: self.last_accessed_at,
        }
    }

    pub fn from_parts(meta: EntryMetadata, data: Payload) -> Self {
        Self {
            id: meta.id,
            model_type: meta.model_type,
            data,
            size_bytes: meta.size_bytes,
            created_at: meta.created_at,
            last_accessed_at: meta.last_accessed_at,
        }
    }
}

/// Payload-free view of an entry, used for eviction and statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryMetadata {
    pub id: String,
    pub model_type: ModelType,
    pub size_bytes: u64,
    pub created_at: u64,
    pub last_accessed_at: u64,
}

impl EntryMetadata {
    pub fn is_expired(&self, now_ms: u64, window_ms: u64) -> bool {
        now_ms.saturating_sub(self.created_at) > window_ms
    }
}

/// Aggregates over the live entry set; computed on demand
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub count: usize,
    pub size: u64,
    pub oldest_timestamp: Option<u64>,
    pub newest_timestamp: Option<u64>,
    pub model_types: BTreeMap<ModelType, usize>,
}

impl CacheStats {
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a EntryMetadata>) -> Self {
        entries.into_iter().fold(CacheStats::default(), |mut stats, e| {
            stats.count += 1;
            stats.size += e.size_bytes;
            stats.oldest_timestamp = Some(
                stats
                    .oldest_timestamp
                    .map_or(e.created_at, |t| t.min(e.created_at)),
            );
            stats.newest_timestamp = Some(
                stats
                    .newest_timestamp
                    .map_or(e.created_at, |t| t.max(e.created_at)),
            );
            *stats.model_types.entry(e.model_type).or_insert(0) += 1;
            stats
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_estimate() {
        assert_eq!(Payload::Binary(vec![0; 84]).estimated_size(), 84);
        assert_eq!(Payload::Text("v 0 0 0".into()).estimated_size(), 14);
        // Non-BMP characters take two UTF-16 units
        assert_eq!(Payload::Text("\u{1F600}".into()).estimated_size(), 4);
    }

    #[test]
    fn test_payload_for_model() {
        assert!(Payload::for_model(ModelFormat::Obj, b"v 0 0 0\n".to_vec()).is_text());
        assert!(!Payload::for_model(ModelFormat::Stl, b"solid x".to_vec()).is_text());
        // Invalid UTF-8 OBJ stays binary
        let odd = Payload::for_model(ModelFormat::Obj, vec![0xff, 0xfe]);
        assert_eq!(odd, Payload::Binary(vec![0xff, 0xfe]));
    }

    #[test]
    fn test_model_type_parse() {
        assert_eq!("STL".parse::<ModelType>().unwrap(), ModelType::Stl);
        assert_eq!("obj".parse::<ModelType>().unwrap(), ModelType::Obj);
        assert_eq!("3mf".parse::<ModelType>().unwrap(), ModelType::Unknown);
        assert_eq!(ModelType::Unknown.format(), None);
    }

    #[test]
    fn test_stats() {
        let meta = |id: &str, ty, size, created| EntryMetadata {
            id: id.into(),
            model_type: ty,
            size_bytes: size,
            created_at: created,
            last_accessed_at: created,
        };
        let entries = vec![
            meta("a", ModelType::Stl, 10, 300),
            meta("b", ModelType::Stl, 20, 100),
            meta("c", ModelType::Obj, 0, 200),
        ];
        let stats = CacheStats::from_entries(&entries);
        assert_eq!(stats.count, 3);
        assert_eq!(stats.size, 30);
        assert_eq!(stats.oldest_timestamp, Some(100));
        assert_eq!(stats.newest_timestamp, Some(300));
        assert_eq!(stats.model_types[&ModelType::Stl], 2);
        assert_eq!(stats.model_types[&ModelType::Obj], 1);

        assert_eq!(CacheStats::from_entries(Vec::new().iter()), CacheStats::default());
    }

    #[test]
    fn test_expiry() {
        let m = EntryMetadata {
            id: "x".into(),
            model_type: ModelType::Stl,
            size_bytes: 1,
            created_at: 1_000,
            last_accessed_at: 1_000,
        };
        assert!(!m.is_expired(2_000, 1_000));
        assert!(m.is_expired(2_001, 1_000));
    }
}
