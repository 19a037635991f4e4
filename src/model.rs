use std::path::Path;

use serde_json::Map;
use thiserror::Error;

use crate::artifact::{ModelLoadError, PipelineModel};
use crate::normalize::{normalize, FeatureRow};

/// Why a single prediction failed. Every variant ends up as a 500 with the
/// display string as `detail`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InferenceError {
    #[error("invalid value for {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("feature row has {found} columns, model expects {expected}")]
    ShapeMismatch { expected: usize, found: usize },

    #[error("unknown category {value:?} for {field}")]
    UnknownCategory { field: String, value: String },

    #[error("model failure: {0}")]
    Internal(String),
}

impl InferenceError {
    /// True when the row itself was at fault rather than the model.
    pub fn is_input_error(&self) -> bool {
        !matches!(self, InferenceError::Internal(_))
    }
}

/// A loaded, immutable regression model.
///
/// Implementations must be deterministic and must not mutate themselves, the
/// same instance serves every in-flight request.
pub trait ModelArtifact: Send + Sync {
    fn name(&self) -> &str;

    /// Number of cells a row must have.
    fn input_width(&self) -> usize;

    fn predict_row(&self, row: &FeatureRow) -> Result<f64, InferenceError>;
}

pub struct InferenceEngine {
    artifact: Box<dyn ModelArtifact>,
}

impl InferenceEngine {
    pub fn new(artifact: impl ModelArtifact + 'static) -> Self {
        Self {
            artifact: Box::new(artifact),
        }
    }

    /// Loads the exported pipeline at `path`. Any failure here is fatal for
    /// the process.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelLoadError> {
        Ok(Self::new(PipelineModel::load(path)?))
    }

    pub fn model_name(&self) -> &str {
        self.artifact.name()
    }

    /// Raw, unrounded price estimate for one normalized row.
    pub fn predict(&self, row: &FeatureRow) -> Result<f64, InferenceError> {
        let expected = self.artifact.input_width();
        if row.len() != expected {
            return Err(InferenceError::ShapeMismatch {
                expected,
                found: row.len(),
            });
        }

        let estimate = self.artifact.predict_row(row)?;
        if !estimate.is_finite() {
            return Err(InferenceError::Internal(format!(
                "non-finite estimate {estimate}"
            )));
        }
        Ok(estimate)
    }

    /// Runs the all-default row (an empty request) through the model.
    pub fn warm_up(&self) -> Result<f64, InferenceError> {
        self.predict(&normalize(&Map::new()))
    }
}
