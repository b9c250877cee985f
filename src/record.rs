//! Vector records and their opaque metadata payloads.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Stable record identifier, assigned by the owning collection from a
/// monotonic counter. Ids are never reused, even after delete + compaction.
pub type RecordId = u64;

/// Metadata attached to a record. Never interpreted by the index.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// A single metadata scalar. Externally tagged so the binary codec can
/// round-trip it; bincode cannot decode self-describing representations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetadataValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

impl MetadataValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(value) => Some(*value as f64),
            Self::Float(value) => Some(*value),
            Self::String(_) | Self::Bool(_) => None,
        }
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// An immutable vector plus optional metadata; the atomic unit stored in a
/// collection. There is no mutation API: replacing a vector is a delete
/// followed by an insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// The vector embedding. Its length must match the collection dimension,
    /// which the collection validates on insert and bulk build.
    pub vector: Vec<f32>,
    /// Opaque payload associated with the vector.
    #[serde(default)]
    pub metadata: Metadata,
}

impl Record {
    /// Creates a record with an empty metadata payload.
    pub fn new(vector: Vec<f32>) -> Self {
        Self {
            vector,
            metadata: Metadata::new(),
        }
    }

    /// Creates a record carrying a metadata payload.
    pub fn with_metadata(vector: Vec<f32>, metadata: Metadata) -> Self {
        Self { vector, metadata }
    }

    /// Length of the embedded vector.
    pub fn dimension(&self) -> usize {
        self.vector.len()
    }
}
