use anyhow::{Context, Result};
use rollcall_core::Metric;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Runtime configuration.
///
/// Layered, later wins: defaults, TOML file, `ROLLCALL_*` environment
/// variables, command-line flags.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Reference photos, one sub-directory per group.
    pub dataset_dir: PathBuf,
    /// Directory holding the per-date attendance files.
    pub ledger_dir: PathBuf,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    /// Distance function for matching.
    pub metric: Metric,
    /// Maximum distance at which a face is accepted.
    pub threshold: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dataset_dir: PathBuf::from("known_faces"),
            ledger_dir: PathBuf::from("."),
            model_dir: rollcall_vision::default_model_dir(),
            metric: Metric::Cosine,
            threshold: 0.6,
        }
    }
}

impl Config {
    /// Load from `file` (or `$ROLLCALL_CONFIG`) and apply environment overrides.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let file = file
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("ROLLCALL_CONFIG").map(PathBuf::from));

        let mut config = match file {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Apply `ROLLCALL_*` overrides. Unparseable values are logged and ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("ROLLCALL_DATASET_DIR") {
            self.dataset_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("ROLLCALL_LEDGER_DIR") {
            self.ledger_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("ROLLCALL_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("ROLLCALL_METRIC") {
            match v.parse() {
                Ok(metric) => self.metric = metric,
                Err(e) => tracing::warn!(value = %v, error = %e, "ignoring ROLLCALL_METRIC"),
            }
        }
        if let Some(v) = lookup("ROLLCALL_THRESHOLD") {
            match v.trim().parse() {
                Ok(threshold) => self.threshold = threshold,
                Err(e) => tracing::warn!(value = %v, error = %e, "ignoring ROLLCALL_THRESHOLD"),
            }
        }
    }
}
