//! Exported preprocessing + regression pipeline.
//!
//! The training side writes a single JSON document: per-column standard
//! scaling for numeric features, one-hot encoding for categorical ones, and
//! either a linear model or a boosted tree ensemble over the encoded vector.
//! Numeric columns are encoded first, then each categorical block in schema
//! order.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::model::{InferenceError, ModelArtifact};
use crate::normalize::FeatureRow;
use crate::schema::{CATEGORICAL_FEATURES, NUMERIC_FEATURES};

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("failed to read model artifact {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("model artifact is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unsupported artifact format_version {0} (expected {FORMAT_VERSION})")]
    UnsupportedVersion(u32),

    #[error("{group} features {found:?} do not match the schema {expected:?}")]
    SchemaMismatch {
        group: &'static str,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("corrupt model artifact: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize)]
struct ArtifactFile {
    format_version: u32,
    model_name: String,
    numeric_features: Vec<NumericColumn>,
    categorical_features: Vec<CategoricalColumn>,
    regressor: Regressor,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NumericColumn {
    pub name: String,
    pub mean: f64,
    pub scale: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoricalColumn {
    pub name: String,
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Regressor {
    Linear {
        intercept: f64,
        coefficients: Vec<f64>,
    },
    TreeEnsemble {
        base_score: f64,
        learning_rate: f64,
        trees: Vec<Tree>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    /// Goes `left` when `x[feature] <= threshold`.
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone)]
pub struct PipelineModel {
    name: String,
    numeric: Vec<NumericColumn>,
    categorical: Vec<CategoricalColumn>,
    regressor: Regressor,
    encoded_width: usize,
}

impl PipelineModel {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelLoadError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|source| ModelLoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_slice(&bytes)
    }

    pub fn from_json(text: &str) -> Result<Self, ModelLoadError> {
        Self::from_slice(text.as_bytes())
    }

    /// Non-UTF-8 or otherwise non-JSON bytes are a `Parse` error, not a read error.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ModelLoadError> {
        let file: ArtifactFile = serde_json::from_slice(bytes)?;
        if file.format_version != FORMAT_VERSION {
            return Err(ModelLoadError::UnsupportedVersion(file.format_version));
        }

        check_names(
            "numeric",
            &NUMERIC_FEATURES,
            file.numeric_features.iter().map(|c| c.name.as_str()),
        )?;
        check_names(
            "categorical",
            &CATEGORICAL_FEATURES,
            file.categorical_features.iter().map(|c| c.name.as_str()),
        )?;

        for col in &file.numeric_features {
            if !col.mean.is_finite() || !col.scale.is_finite() || col.scale == 0.0 {
                return Err(ModelLoadError::Invalid(format!(
                    "{}: scaler needs a finite mean and a finite non-zero scale",
                    col.name
                )));
            }
        }
        for col in &file.categorical_features {
            if col.categories.is_empty() {
                return Err(ModelLoadError::Invalid(format!(
                    "{}: no categories",
                    col.name
                )));
            }
            let mut seen = HashSet::new();
            if let Some(dup) = col.categories.iter().find(|c| !seen.insert(c.as_str())) {
                return Err(ModelLoadError::Invalid(format!(
                    "{}: category {dup:?} listed twice",
                    col.name
                )));
            }
        }

        let encoded_width = file.numeric_features.len()
            + file
                .categorical_features
                .iter()
                .map(|c| c.categories.len())
                .sum::<usize>();
        validate_regressor(&file.regressor, encoded_width)?;

        Ok(Self {
            name: file.model_name,
            numeric: file.numeric_features,
            categorical: file.categorical_features,
            regressor: file.regressor,
            encoded_width,
        })
    }

    /// Width of the vector the regressor sees after scaling and one-hot.
    pub fn encoded_width(&self) -> usize {
        self.encoded_width
    }

    fn encode(&self, row: &FeatureRow) -> Result<Vec<f64>, InferenceError> {
        let mut x = Vec::with_capacity(self.encoded_width);

        for (col, cell) in self.numeric.iter().zip(row.numeric_cells()) {
            let v = cell.as_f64().ok_or_else(|| InferenceError::InvalidInput {
                field: col.name.clone(),
                reason: format!("expected a number, got {}", describe(cell)),
            })?;
            x.push((v - col.mean) / col.scale);
        }

        for (col, cell) in self.categorical.iter().zip(row.categorical_cells()) {
            let level = cell.as_str().ok_or_else(|| InferenceError::InvalidInput {
                field: col.name.clone(),
                reason: format!("expected a string, got {}", describe(cell)),
            })?;
            let hot = col
                .categories
                .iter()
                .position(|c| c == level)
                .ok_or_else(|| InferenceError::UnknownCategory {
                    field: col.name.clone(),
                    value: level.to_string(),
                })?;
            x.extend((0..col.categories.len()).map(|i| if i == hot { 1.0 } else { 0.0 }));
        }

        if x.len() != self.encoded_width {
            return Err(InferenceError::Internal(format!(
                "encoded {} values, regressor expects {}",
                x.len(),
                self.encoded_width
            )));
        }
        Ok(x)
    }
}

impl ModelArtifact for PipelineModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_width(&self) -> usize {
        self.numeric.len() + self.categorical.len()
    }

    fn predict_row(&self, row: &FeatureRow) -> Result<f64, InferenceError> {
        let x = self.encode(row)?;
        match &self.regressor {
            Regressor::Linear {
                intercept,
                coefficients,
            } => Ok(intercept + coefficients.iter().zip(&x).map(|(w, v)| w * v).sum::<f64>()),
            Regressor::TreeEnsemble {
                base_score,
                learning_rate,
                trees,
            } => {
                let mut total = 0.0;
                for (i, tree) in trees.iter().enumerate() {
                    total += walk(tree, &x).map_err(|e| {
                        InferenceError::Internal(format!("tree {i}: {e}"))
                    })?;
                }
                Ok(base_score + learning_rate * total)
            }
        }
    }
}

fn walk(tree: &Tree, x: &[f64]) -> Result<f64, String> {
    let mut i = 0;
    loop {
        match tree.nodes.get(i) {
            Some(Node::Leaf { value }) => return Ok(*value),
            Some(Node::Split {
                feature,
                threshold,
                left,
                right,
            }) => {
                let v = x
                    .get(*feature)
                    .ok_or_else(|| format!("split on missing feature {feature}"))?;
                i = if v <= threshold { *left } else { *right };
            }
            None => return Err(format!("dangling node index {i}")),
        }
    }
}

fn check_names<'a>(
    group: &'static str,
    expected: &[&str],
    found: impl Iterator<Item = &'a str>,
) -> Result<(), ModelLoadError> {
    let found: Vec<String> = found.map(str::to_string).collect();
    if found.iter().map(String::as_str).eq(expected.iter().copied()) {
        Ok(())
    } else {
        Err(ModelLoadError::SchemaMismatch {
            group,
            expected: expected.iter().map(|s| s.to_string()).collect(),
            found,
        })
    }
}

fn validate_regressor(regressor: &Regressor, width: usize) -> Result<(), ModelLoadError> {
    match regressor {
        Regressor::Linear {
            intercept,
            coefficients,
        } => {
            if coefficients.len() != width {
                return Err(ModelLoadError::Invalid(format!(
                    "linear model has {} coefficients for {width} encoded features",
                    coefficients.len()
                )));
            }
            if !intercept.is_finite() || coefficients.iter().any(|w| !w.is_finite()) {
                return Err(ModelLoadError::Invalid("non-finite linear weights".into()));
            }
        }
        Regressor::TreeEnsemble { trees, .. } => {
            if trees.is_empty() {
                return Err(ModelLoadError::Invalid("tree ensemble has no trees".into()));
            }
            for (t, tree) in trees.iter().enumerate() {
                if tree.nodes.is_empty() {
                    return Err(ModelLoadError::Invalid(format!("tree {t} is empty")));
                }
                for (i, node) in tree.nodes.iter().enumerate() {
                    if let Node::Split {
                        feature,
                        left,
                        right,
                        ..
                    } = node
                    {
                        // Children strictly after the parent keeps every walk finite.
                        let n = tree.nodes.len();
                        if *feature >= width || *left <= i || *right <= i || *left >= n || *right >= n
                        {
                            return Err(ModelLoadError::Invalid(format!(
                                "tree {t} node {i} has out-of-range links"
                            )));
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

fn describe(cell: &Value) -> String {
    match cell {
        Value::Null => "null".to_string(),
        Value::Bool(b) => format!("boolean {b}"),
        Value::Number(n) => format!("number {n}"),
        Value::String(s) => format!("string {s:?}"),
        Value::Array(_) => "an array".to_string(),
        Value::Object(_) => "an object".to_string(),
    }
}
