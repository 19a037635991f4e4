//! Canonical model-input fields.
//!
//! The artifact under `models/` is exported against exactly these lists, in
//! this order. Renaming, adding or dropping a field means re-exporting the
//! artifact at the same time; `artifact::PipelineModel` refuses to load a
//! file whose feature names disagree with this module.

use serde::Serialize;
use serde_json::{json, Map, Value};

pub const NUMERIC_FEATURES: [&str; 5] = [
    "Trip_Distance_km",
    "Base_Fare",
    "Per_Km_Rate",
    "Per_Minute_Rate",
    "Trip_Duration_Minutes",
];

pub const CATEGORICAL_FEATURES: [&str; 4] = [
    "Time_of_Day",
    "Day_of_Week",
    "Weather",
    "Traffic_Conditions",
];

pub const FEATURE_COUNT: usize = NUMERIC_FEATURES.len() + CATEGORICAL_FEATURES.len();

/// Substituted for an absent or null numeric field.
pub const NUMERIC_FILL: f64 = 0.0;

/// Substituted for an absent or null categorical field.
pub const CATEGORICAL_FILL: &str = "Unknown";

// Documentation-only values shown to clients. Never used to fill input.
const NUMERIC_EXAMPLES: [f64; 5] = [5.2, 35.0, 12.0, 2.5, 18.0];
const CATEGORICAL_EXAMPLES: [&str; 4] = ["Evening", "Friday", "Clear", "Moderate"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    Numeric,
    Categorical,
}

/// One entry of the published schema (`GET /schema`).
#[derive(Debug, Clone, Serialize)]
pub struct FieldDescriptor {
    pub name: &'static str,
    pub kind: FeatureKind,
    pub fill: Value,
    pub example: Value,
}

/// All nine field names, numeric group first.
pub fn feature_names() -> impl Iterator<Item = &'static str> {
    NUMERIC_FEATURES
        .iter()
        .chain(CATEGORICAL_FEATURES.iter())
        .copied()
}

pub fn describe() -> Vec<FieldDescriptor> {
    let numeric = NUMERIC_FEATURES
        .into_iter()
        .zip(NUMERIC_EXAMPLES)
        .map(|(name, example)| FieldDescriptor {
            name,
            kind: FeatureKind::Numeric,
            fill: json!(NUMERIC_FILL),
            example: json!(example),
        });
    let categorical = CATEGORICAL_FEATURES
        .into_iter()
        .zip(CATEGORICAL_EXAMPLES)
        .map(|(name, example)| FieldDescriptor {
            name,
            kind: FeatureKind::Categorical,
            fill: json!(CATEGORICAL_FILL),
            example: json!(example),
        });
    numeric.chain(categorical).collect()
}

/// The documented example request: an evening trip on a clear Friday.
pub fn example_request() -> Map<String, Value> {
    describe()
        .into_iter()
        .map(|f| (f.name.to_string(), f.example))
        .collect()
}
