//! Read-only reference gallery of known identities.

use crate::types::IdentityRecord;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum GalleryError {
    #[error("embedding dimension mismatch for {name}: expected {expected}, got {actual}")]
    DimensionMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
}

/// Ordered, immutable collection of identity records.
///
/// Insertion order is significant: when two records are equally close to a
/// query, the one inserted first wins.
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    records: Vec<IdentityRecord>,
    dim: Option<usize>,
}

impl Gallery {
    /// Build a gallery, rejecting records whose embedding dimension differs
    /// from the first record's.
    pub fn new(records: Vec<IdentityRecord>) -> Result<Self, GalleryError> {
        let dim = records.first().map(|r| r.embedding.dim());

        if let Some(expected) = dim {
            if let Some(bad) = records.iter().find(|r| r.embedding.dim() != expected) {
                return Err(GalleryError::DimensionMismatch {
                    name: bad.name.clone(),
                    expected,
                    actual: bad.embedding.dim(),
                });
            }
        }

        Ok(Self { records, dim })
    }

    /// Embedding dimension shared by every record, or `None` when empty.
    pub fn dim(&self) -> Option<usize> {
        self.dim
    }

    pub fn records(&self) -> &[IdentityRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct identity names in insertion order.
    pub fn names(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for record in &self.records {
            if !seen.contains(&record.name.as_str()) {
                seen.push(&record.name);
            }
        }
        seen
    }
}
