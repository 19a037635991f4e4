use std::net::{AddrParseError, IpAddr, SocketAddr};
use std::path::PathBuf;

use config::{builder::DefaultState, Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;

/// Service configuration.
///
/// Sources, later ones winning: built-in defaults, `config/taxipred.*`
/// (optional), then `TAXIPRED__SECTION__KEY` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub dataset: DatasetConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatasetConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub log_predictions: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl ServiceConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_builder(
            defaults()?
                .add_source(File::with_name("config/taxipred").required(false))
                .add_source(
                    Environment::with_prefix("TAXIPRED")
                        .separator("__")
                        .try_parsing(true),
                ),
        )
    }

    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        builder.build()?.try_deserialize()
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        Ok(SocketAddr::new(
            self.server.host.parse::<IpAddr>()?,
            self.server.port,
        ))
    }
}

/// Builder preloaded with every default; add sources on top of it.
pub fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 8000)?
        .set_default("model.path", "models/taxi_price_model.json")?
        .set_default("dataset.path", "data/taxi_trip_pricing.csv")?
        .set_default("logging.level", "info")?
        .set_default("logging.format", "pretty")?
        .set_default("logging.log_predictions", false)
}
