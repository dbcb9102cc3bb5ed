//! Nearest-neighbour identity matching.

use crate::gallery::Gallery;
use crate::types::{Embedding, IdentityRecord};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum MatchError {
    #[error("query embedding has {actual} dimensions, gallery has {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("acceptance threshold must be finite and non-negative, got {0}")]
    InvalidThreshold(f32),
}

/// Distance function used to compare embeddings. Smaller is closer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Euclidean,
    #[default]
    Cosine,
}

impl Metric {
    pub fn distance(self, a: &Embedding, b: &Embedding) -> f32 {
        match self {
            Metric::Euclidean => a.euclidean_distance(b),
            Metric::Cosine => a.cosine_distance(b),
        }
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "euclidean" | "l2" => Ok(Metric::Euclidean),
            "cosine" => Ok(Metric::Cosine),
            other => Err(format!("unknown metric '{other}' (expected euclidean or cosine)")),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Euclidean => f.write_str("euclidean"),
            Metric::Cosine => f.write_str("cosine"),
        }
    }
}

/// Result of matching a query embedding against a gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult<'g> {
    /// The accepted record, or `None` if the query was rejected.
    pub identity: Option<&'g IdentityRecord>,
    /// Distance to the nearest record (`+inf` for an empty gallery).
    pub distance: f32,
}

impl MatchResult<'_> {
    pub fn is_match(&self) -> bool {
        self.identity.is_some()
    }
}

/// Strategy for comparing a query embedding against the gallery.
pub trait Matcher {
    fn compare<'g>(
        &self,
        query: &Embedding,
        gallery: &'g Gallery,
    ) -> Result<MatchResult<'g>, MatchError>;
}

/// Accepts the nearest gallery record when its distance is at most `threshold`.
///
/// This is the only acceptance criterion: there is no separate per-record
/// tolerance check. Ties go to the record inserted first.
#[derive(Debug, Clone, Copy)]
pub struct NearestMatcher {
    metric: Metric,
    threshold: f32,
}

impl NearestMatcher {
    pub fn new(metric: Metric, threshold: f32) -> Result<Self, MatchError> {
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(MatchError::InvalidThreshold(threshold));
        }
        Ok(Self { metric, threshold })
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }
}

impl Matcher for NearestMatcher {
    fn compare<'g>(
        &self,
        query: &Embedding,
        gallery: &'g Gallery,
    ) -> Result<MatchResult<'g>, MatchError> {
        if let Some(expected) = gallery.dim() {
            if query.dim() != expected {
                return Err(MatchError::DimensionMismatch {
                    expected,
                    actual: query.dim(),
                });
            }
        }

        let mut best_dist = f32::INFINITY;
        let mut best_idx: Option<usize> = None;

        // Visit every record; strict `<` keeps the earliest on ties and skips NaN.
        for (i, record) in gallery.records().iter().enumerate() {
            let dist = self.metric.distance(query, &record.embedding);
            if dist < best_dist {
                best_dist = dist;
                best_idx = Some(i);
            }
        }

        let identity = match best_idx {
            Some(idx) if best_dist <= self.threshold => Some(&gallery.records()[idx]),
            _ => None,
        };

        Ok(MatchResult {
            identity,
            distance: best_dist,
        })
    }
}
