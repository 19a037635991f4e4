//! Taxi trip price prediction service.
//!
//! A request is completed against the feature schema ([`normalize`]), scored
//! by the loaded pipeline ([`model::InferenceEngine`]) and rounded to cents
//! by the HTTP layer ([`api`]).

pub mod api;
pub mod artifact;
pub mod config;
pub mod dataset;
pub mod model;
pub mod normalize;
pub mod schema;
pub mod server;
pub mod telemetry;
pub mod types;
