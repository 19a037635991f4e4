//! HTTP surface: health, prediction, schema and the reference dataset.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{Map, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::dataset::{DatasetSummary, TaxiData};
use crate::model::InferenceEngine;
use crate::normalize::{missing_fields, normalize, FeatureRow};
use crate::schema;
use crate::types::{
    round_price, ErrorBody, Message, PredictRequest, PredictResponse, SchemaResponse,
};

// ---------- Server state ----------

#[derive(Clone)]
pub struct AppState {
    engine: Arc<InferenceEngine>,
    dataset: Arc<TaxiData>,
    log_predictions: bool,
}

impl AppState {
    pub fn new(engine: InferenceEngine, dataset: TaxiData) -> Self {
        Self {
            engine: Arc::new(engine),
            dataset: Arc::new(dataset),
            log_predictions: false,
        }
    }

    /// Log every normalized row and raw estimate at info level.
    pub fn with_prediction_logging(mut self, enabled: bool) -> Self {
        self.log_predictions = enabled;
        self
    }
}

// ---------- Errors ----------

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    pub fn internal(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: detail.into(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: rejection.status(),
            detail: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { detail: self.detail })).into_response()
    }
}

// ---------- Router ----------

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/predict", post(predict))
        .route("/schema", get(feature_schema))
        .route("/taxi", get(list_trips))
        .route("/summary", get(summary))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

// ---------- Handlers ----------

async fn root() -> Json<Message> {
    Json(Message {
        message: "Taxi price prediction API is up".to_string(),
    })
}

async fn predict(
    State(state): State<AppState>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let Json(payload) = payload.map_err(|rejection| {
        tracing::debug!(error = %rejection, "rejected predict body");
        ApiError::from(rejection)
    })?;

    let row = normalize(&payload.fields);
    let estimate = state.engine.predict(&row).map_err(|e| {
        tracing::warn!(error = %e, input_error = e.is_input_error(), "inference failed");
        ApiError::internal(e.to_string())
    })?;

    if state.log_predictions {
        log_prediction(&row, &payload.fields, estimate);
    }

    Ok(Json(PredictResponse {
        predicted_price: round_price(estimate),
    }))
}

fn log_prediction(row: &FeatureRow, fields: &Map<String, Value>, estimate: f64) {
    let nonzero = row
        .numeric_cells()
        .iter()
        .filter(|c| c.as_f64().is_some_and(|v| v != 0.0))
        .count();
    let filled = missing_fields(fields);
    tracing::info!(
        "predict nonzero_numeric={} filled=[{}] estimate={:.4}",
        nonzero,
        filled.join(", "),
        estimate
    );
}

async fn feature_schema(State(state): State<AppState>) -> Json<SchemaResponse> {
    Json(SchemaResponse {
        model: state.engine.model_name().to_string(),
        fields: schema::describe(),
    })
}

async fn list_trips(State(state): State<AppState>) -> Json<Vec<Map<String, Value>>> {
    Json(state.dataset.records().to_vec())
}

async fn summary(State(state): State<AppState>) -> Json<DatasetSummary> {
    Json(state.dataset.summary())
}
