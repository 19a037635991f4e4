use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::schema::FieldDescriptor;

/// Body of `POST /predict`: any JSON object. Fields are picked out by the
/// normalizer, everything else is ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct PredictRequest {
    pub fields: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub predicted_price: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Message {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

#[derive(Debug, Serialize)]
pub struct SchemaResponse {
    pub model: String,
    pub fields: Vec<FieldDescriptor>,
}

/// Two decimals, halves to even. Values too large to scale have no
/// fractional part and come back unchanged.
pub fn round_price(raw: f64) -> f64 {
    let cents = raw * 100.0;
    if !cents.is_finite() {
        return raw;
    }
    cents.round_ties_even() / 100.0
}
