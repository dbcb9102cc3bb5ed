//! Per-image recognition and batch aggregation.

use crate::gallery::Gallery;
use crate::matcher::{MatchError, Matcher};
use crate::types::{Detection, Recognized};
use image::RgbImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Boxed error from a face embedding backend.
pub type EmbedderError = Box<dyn std::error::Error + Send + Sync>;

/// Face detection + embedding capability.
///
/// Implementations return one [`Detection`] per face found in the image, in
/// the order the backend ranks them. An image with no face yields an empty
/// vector, not an error.
pub trait FaceEmbedder {
    type Error: std::error::Error + Send + Sync + 'static;

    fn detect_faces(&mut self, image: &RgbImage) -> Result<Vec<Detection>, Self::Error>;
}

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("face embedding failed: {0}")]
    Embedder(#[source] EmbedderError),
    #[error(transparent)]
    Match(#[from] MatchError),
}

impl ProcessError {
    /// Configuration errors abort a batch; everything else only skips one image.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ProcessError::Match(_))
    }
}

/// Turns the faces of one image into a deduplicated identity list.
pub struct FrameProcessor<'g, E, M> {
    gallery: &'g Gallery,
    matcher: M,
    embedder: E,
}

impl<'g, E: FaceEmbedder, M: Matcher> FrameProcessor<'g, E, M> {
    pub fn new(gallery: &'g Gallery, matcher: M, embedder: E) -> Self {
        Self {
            gallery,
            matcher,
            embedder,
        }
    }

    pub fn gallery(&self) -> &'g Gallery {
        self.gallery
    }

    /// Detect, embed and match every face in `image`.
    ///
    /// Output follows detection order; an identity matched more than once in
    /// the same image is reported once, at its first position.
    pub fn process(&mut self, image: &RgbImage) -> Result<Vec<Recognized>, ProcessError> {
        self.scan(image).map(|(_, recognized)| recognized)
    }

    /// Like [`process`](Self::process), also returning the number of faces detected.
    fn scan(&mut self, image: &RgbImage) -> Result<(usize, Vec<Recognized>), ProcessError> {
        let detections = self
            .embedder
            .detect_faces(image)
            .map_err(|e| ProcessError::Embedder(Box::new(e)))?;

        if detections.is_empty() {
            tracing::info!("no face detected");
            return Ok((0, Vec::new()));
        }

        let mut recognized: Vec<Recognized> = Vec::new();
        for (i, detection) in detections.iter().enumerate() {
            let result = self.matcher.compare(&detection.embedding, self.gallery)?;
            match result.identity {
                Some(record) => {
                    tracing::debug!(
                        face = i,
                        name = %record.name,
                        group = %record.group,
                        distance = result.distance,
                        "face matched"
                    );
                    if !recognized.iter().any(|r| r.name == record.name) {
                        recognized.push(Recognized::from(record));
                    }
                }
                None => {
                    tracing::debug!(face = i, distance = result.distance, "face not recognized");
                }
            }
        }

        Ok((detections.len(), recognized))
    }

    /// Load and process every image in `paths`, merging the per-image lists.
    ///
    /// Unreadable images and backend failures skip that image. A dimension
    /// mismatch between the backend and the gallery aborts the batch.
    pub fn recognize_batch<P: AsRef<Path>>(
        &mut self,
        paths: &[P],
    ) -> Result<BatchOutcome, ProcessError> {
        let mut outcome = BatchOutcome::default();

        for path in paths {
            let path = path.as_ref();
            let image = match image::open(path) {
                Ok(img) => img.to_rgb8(),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable image");
                    outcome.skipped.push(path.to_path_buf());
                    continue;
                }
            };

            let (faces, found) = match self.scan(&image) {
                Ok(scanned) => scanned,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping image");
                    outcome.skipped.push(path.to_path_buf());
                    continue;
                }
            };

            outcome.processed += 1;
            if faces == 0 {
                outcome.no_face += 1;
            }
            tracing::info!(path = %path.display(), faces, recognized = found.len(), "image processed");

            for r in found {
                if !outcome.recognized.iter().any(|seen| seen.name == r.name) {
                    outcome.recognized.push(r);
                }
            }
        }

        Ok(outcome)
    }
}

/// Aggregated result of recognising a batch of images.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Distinct identities across the batch, first occurrence wins.
    pub recognized: Vec<Recognized>,
    /// Images that were loaded and run through the embedder.
    pub processed: usize,
    /// Processed images in which no face was detected.
    pub no_face: usize,
    /// Images that could not be loaded or embedded.
    pub skipped: Vec<PathBuf>,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::matcher::{Metric, NearestMatcher};
    use crate::types::{BoundingBox, Embedding, IdentityRecord};
    use std::collections::VecDeque;

    #[derive(Debug, Error)]
    #[error("backend unavailable")]
    pub(crate) struct BackendDown;

    /// Replays a fixed list of per-image results.
    pub(crate) struct ScriptedEmbedder {
        pub(crate) frames: VecDeque<Result<Vec<Vec<f32>>, ()>>,
    }

    impl ScriptedEmbedder {
        pub(crate) fn new(frames: Vec<Result<Vec<Vec<f32>>, ()>>) -> Self {
            Self {
                frames: frames.into(),
            }
        }
    }

    pub(crate) fn detection(values: &[f32]) -> Detection {
        Detection {
            bbox: BoundingBox {
                x: 0.0,
                y: 0.0,
                width: 10.0,
                height: 10.0,
                confidence: 0.9,
                landmarks: None,
            },
            embedding: Embedding::new(values.to_vec()),
        }
    }

    impl FaceEmbedder for ScriptedEmbedder {
        type Error = BackendDown;

        fn detect_faces(&mut self, _image: &RgbImage) -> Result<Vec<Detection>, BackendDown> {
            match self.frames.pop_front() {
                Some(Ok(faces)) => Ok(faces.iter().map(|v| detection(v)).collect()),
                Some(Err(())) => Err(BackendDown),
                None => Ok(Vec::new()),
            }
        }
    }

    fn gallery() -> Gallery {
        let record = |name: &str, group: &str, values: &[f32]| IdentityRecord {
            name: name.into(),
            group: group.into(),
            embedding: Embedding::new(values.to_vec()),
        };
        Gallery::new(vec![
            record("john", "dev", &[0.0, 0.0]),
            record("yasha", "design", &[10.0, 0.0]),
            record("john", "dev", &[0.0, 10.0]),
        ])
        .unwrap()
    }

    fn matcher() -> NearestMatcher {
        NearestMatcher::new(Metric::Euclidean, 1.0).unwrap()
    }

    fn blank() -> RgbImage {
        RgbImage::new(4, 4)
    }

    #[test]
    fn test_duplicate_identity_in_one_image_reported_once() {
        let gallery = gallery();
        // Both faces resolve to john (through different reference records).
        let embedder = ScriptedEmbedder::new(vec![Ok(vec![vec![0.1, 0.0], vec![0.0, 9.9]])]);
        let mut processor = FrameProcessor::new(&gallery, matcher(), embedder);

        let found = processor.process(&blank()).unwrap();
        assert_eq!(found, vec![Recognized::new("john", "dev")]);
    }

    #[test]
    fn test_output_follows_detection_order() {
        let gallery = gallery();
        let embedder = ScriptedEmbedder::new(vec![Ok(vec![
            vec![10.0, 0.5],
            vec![50.0, 50.0],
            vec![0.2, 0.2],
        ])]);
        let mut processor = FrameProcessor::new(&gallery, matcher(), embedder);

        let found = processor.process(&blank()).unwrap();
        assert_eq!(
            found,
            vec![
                Recognized::new("yasha", "design"),
                Recognized::new("john", "dev"),
            ]
        );
    }

    #[test]
    fn test_no_faces_is_empty_not_error() {
        let gallery = gallery();
        let embedder = ScriptedEmbedder::new(vec![Ok(vec![])]);
        let mut processor = FrameProcessor::new(&gallery, matcher(), embedder);
        assert!(processor.process(&blank()).unwrap().is_empty());
    }

    #[test]
    fn test_dimension_mismatch_is_fatal() {
        let gallery = gallery();
        let embedder = ScriptedEmbedder::new(vec![Ok(vec![vec![0.0, 0.0, 0.0]])]);
        let mut processor = FrameProcessor::new(&gallery, matcher(), embedder);

        let err = processor.process(&blank()).unwrap_err();
        assert!(err.is_fatal());
    }

    fn write_images(dir: &Path, count: usize) -> Vec<PathBuf> {
        (0..count)
            .map(|i| {
                let path = dir.join(format!("img{i}.png"));
                blank().save(&path).unwrap();
                path
            })
            .collect()
    }

    #[test]
    fn test_batch_dedups_across_images_and_skips_failures() {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = write_images(dir.path(), 4);
        paths.insert(1, dir.path().join("missing.png"));

        let gallery = gallery();
        let embedder = ScriptedEmbedder::new(vec![
            Ok(vec![vec![0.0, 0.0]]),
            Err(()),
            Ok(vec![vec![10.0, 0.0], vec![0.0, 0.3]]),
            Ok(vec![]),
        ]);
        let mut processor = FrameProcessor::new(&gallery, matcher(), embedder);

        let outcome = processor.recognize_batch(&paths).unwrap();
        assert_eq!(
            outcome.recognized,
            vec![
                Recognized::new("john", "dev"),
                Recognized::new("yasha", "design"),
            ]
        );
        assert_eq!(outcome.processed, 3);
        assert_eq!(outcome.no_face, 1);
        assert_eq!(outcome.skipped.len(), 2);
        assert!(outcome.skipped.contains(&dir.path().join("missing.png")));
    }

    #[test]
    fn test_rejected_face_is_not_counted_as_no_face() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_images(dir.path(), 2);

        let gallery = gallery();
        // First image: one face far from every record. Second: nothing found.
        let embedder = ScriptedEmbedder::new(vec![Ok(vec![vec![50.0, 50.0]]), Ok(vec![])]);
        let mut processor = FrameProcessor::new(&gallery, matcher(), embedder);

        let outcome = processor.recognize_batch(&paths).unwrap();
        assert!(outcome.recognized.is_empty());
        assert_eq!(outcome.processed, 2);
        assert_eq!(outcome.no_face, 1);
    }

    #[test]
    fn test_batch_aborts_on_dimension_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_images(dir.path(), 2);

        let gallery = gallery();
        let embedder = ScriptedEmbedder::new(vec![Ok(vec![vec![0.0]]), Ok(vec![vec![0.0, 0.0]])]);
        let mut processor = FrameProcessor::new(&gallery, matcher(), embedder);

        assert!(processor.recognize_batch(&paths).is_err());
    }
}
