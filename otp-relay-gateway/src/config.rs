use anyhow::{Context, Result};
use otp_relay_connector::config::ConnectorConfig;
use otp_relay_logger::LogConfig;
use serde::Deserialize;

/// Prefix of the environment variables that override file settings,
/// e.g. `OTP_RELAY_GATEWAY__DB_PATH` or `OTP_RELAY_CONNECTOR__RECONNECT__DEFAULT_DELAY_MS`.
pub const ENV_PREFIX: &str = "OTP_RELAY";

/// The top-level configuration for the OTP relay gateway.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct GatewayConfig {
    #[serde(default)]
    pub connector: ConnectorConfig,
    #[serde(default)]
    pub gateway: GatewaySpecificConfig,
}

/// Contains settings that are unique to the gateway binary.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct GatewaySpecificConfig {
    /// Location of the SQLite auth database. Parent directories are created on open.
    pub db_path: String,
    /// Logging configuration.
    pub log: LogConfig,
}

impl Default for GatewaySpecificConfig {
    fn default() -> Self {
        Self {
            db_path: "data/auth.db".to_string(),
            log: LogConfig::default(),
        }
    }
}

/// Loads the gateway configuration.
///
/// Settings are read from the TOML file at `path` (when given) and then overridden by
/// `OTP_RELAY_*` environment variables; anything left unset keeps its default.
pub fn load_config(path: Option<&str>) -> Result<GatewayConfig> {
    let mut builder = config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(config::File::with_name(path));
    }
    builder = builder.add_source(
        config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .convert_case(config::Case::Kebab),
    );

    let settings: GatewayConfig = builder
        .build()
        .context(format!("Failed to build configuration from '{}'", path.unwrap_or("<defaults>")))?
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    Ok(settings)
}
