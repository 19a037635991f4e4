use std::net::SocketAddr;

use anyhow::Context;
use axum::Router;

use crate::api::{self, AppState};
use crate::config::ServiceConfig;
use crate::dataset::TaxiData;
use crate::model::InferenceEngine;

/// Loads the model and dataset named by `cfg` and wires the router.
///
/// Every error here is a startup failure: the process must not serve.
pub fn build(cfg: &ServiceConfig) -> anyhow::Result<(SocketAddr, Router)> {
    let addr = cfg.socket_addr().context("invalid server.host")?;

    let engine = InferenceEngine::load(&cfg.model.path)?;
    // The empty request is the documented default, so the model has to accept it.
    let warm = engine
        .warm_up()
        .context("model rejected the all-default feature row")?;
    tracing::info!(
        "loaded model {} from {}; warmup forward ok (estimate={:.2})",
        engine.model_name(),
        cfg.model.path.display(),
        warm
    );

    let dataset = TaxiData::load(&cfg.dataset.path)?;
    tracing::info!(
        "loaded dataset {} ({} rows)",
        cfg.dataset.path.display(),
        dataset.len()
    );

    let state = AppState::new(engine, dataset).with_prediction_logging(cfg.logging.log_predictions);
    Ok((addr, api::router(state)))
}
