//! rollcall-vision — ONNX face embedding backend.
//!
//! Uses SCRFD for face detection and ArcFace for recognition, both running
//! via ONNX Runtime on the CPU.

pub mod alignment;
pub mod detector;
pub mod recognizer;

pub use detector::{DetectorError, FaceDetector};
pub use recognizer::{FaceRecognizer, RecognizerError};

use image::RgbImage;
use rollcall_core::{Detection, FaceEmbedder};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name of the SCRFD detection model inside the model directory.
pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";
/// File name of the ArcFace recognition model inside the model directory.
pub const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum VisionError {
    #[error(transparent)]
    Detector(#[from] DetectorError),
    #[error(transparent)]
    Recognizer(#[from] RecognizerError),
}

/// `$XDG_DATA_HOME/rollcall/models`, falling back to `~/.local/share`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall/models")
}

/// SCRFD + ArcFace pipeline implementing [`FaceEmbedder`].
pub struct OnnxEmbedder {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxEmbedder {
    /// Load both models from `model_dir`. Fails fast if either is missing.
    pub fn load(model_dir: &Path) -> Result<Self, VisionError> {
        let detector = FaceDetector::load(&model_dir.join(SCRFD_MODEL_FILE))?;
        let recognizer = FaceRecognizer::load(&model_dir.join(ARCFACE_MODEL_FILE))?;
        Ok(Self {
            detector,
            recognizer,
        })
    }
}

impl FaceEmbedder for OnnxEmbedder {
    type Error = VisionError;

    fn detect_faces(&mut self, image: &RgbImage) -> Result<Vec<Detection>, VisionError> {
        let faces = self.detector.detect(image)?;

        let mut detections = Vec::with_capacity(faces.len());
        for face in faces {
            let embedding = self.recognizer.extract(image, &face)?;
            detections.push(Detection {
                bbox: face,
                embedding,
            });
        }
        Ok(detections)
    }
}
