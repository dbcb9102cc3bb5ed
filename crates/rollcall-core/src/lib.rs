//! rollcall-core — Identity matching for face-based attendance.
//!
//! Holds the reference gallery, the nearest-neighbour matcher and the
//! per-image recognition pipeline. Face detection and embedding come from
//! any [`FaceEmbedder`] implementation.

pub mod dataset;
pub mod gallery;
pub mod matcher;
pub mod processor;
pub mod types;

pub use dataset::{derive_name, load_gallery, DatasetError};
pub use gallery::{Gallery, GalleryError};
pub use matcher::{MatchError, MatchResult, Matcher, Metric, NearestMatcher};
pub use processor::{BatchOutcome, FaceEmbedder, FrameProcessor, ProcessError};
pub use types::{BoundingBox, Detection, Embedding, IdentityRecord, Recognized};
