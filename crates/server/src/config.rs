//! # Application Configuration
//!
//! This module defines the configuration structure for the `ingestflow-server`
//! and the logic for loading it from an optional `config.yml` file and
//! environment variables.

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use ingestflow::SimulationConfig;
use regex::Regex;
use serde::Deserialize;
use std::env;
use std::fs;
use std::time::Duration;
use tracing::info;

/// A custom error type for configuration issues.
#[derive(Debug)]
pub enum ConfigError {
    /// Indicates an error from the underlying `config` crate.
    General(String),
    /// Indicates a required configuration file was not found.
    NotFound(String),
    /// The settings loaded but are not usable together.
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::General(msg) => write!(f, "Configuration error: {msg}"),
            ConfigError::NotFound(msg) => write!(f, "{msg}"),
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::General(err.to_string())
    }
}

/// Which backend holds ingestion process records.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStoreKind {
    #[default]
    Sqlite,
    Memory,
}

/// Timings of the simulated ingestion worker, in milliseconds.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SimulationSettings {
    pub initial_delay_ms: u64,
    pub tick_interval_ms: u64,
    pub min_duration_ms: u64,
    pub max_duration_ms: u64,
    pub max_step: u32,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        let defaults = SimulationConfig::default();
        Self {
            initial_delay_ms: defaults.initial_delay.as_millis() as u64,
            tick_interval_ms: defaults.tick_interval.as_millis() as u64,
            min_duration_ms: defaults.min_duration.as_millis() as u64,
            max_duration_ms: defaults.max_duration.as_millis() as u64,
            max_step: defaults.max_step,
        }
    }
}

impl SimulationSettings {
    pub fn to_simulation_config(&self) -> SimulationConfig {
        SimulationConfig {
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            min_duration: Duration::from_millis(self.min_duration_ms),
            max_duration: Duration::from_millis(self.max_duration_ms),
            max_step: self.max_step,
        }
    }
}

/// The root configuration structure, mapping directly to `config.yml`.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// The port for the server to listen on. Loaded from `PORT` env var.
    #[serde(default = "default_port")]
    pub port: u16,
    /// The path to the SQLite database file. Loaded from `DB_URL` env var.
    #[serde(default = "default_db_url")]
    pub db_url: String,
    /// Where process records live. Users are always kept in `db_url`.
    #[serde(default)]
    pub process_store: ProcessStoreKind,
    /// HS256 secret for bearer tokens. Loaded from `JWT_SECRET` env var.
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    /// Reported by the health endpoints. Loaded from `ENVIRONMENT` env var.
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default)]
    pub simulation: SimulationSettings,
}

/// Provides a default value for the `port` field if not set in the environment.
fn default_port() -> u16 {
    9090
}

/// Provides a default value for the `db_url` field if not set in the environment.
fn default_db_url() -> String {
    "db/ingestflow.db".to_string()
}

fn default_jwt_secret() -> String {
    "a-secure-secret-key".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

impl AppConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let sim = &self.simulation;
        if sim.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "simulation.tick_interval_ms must be greater than 0".to_string(),
            ));
        }
        if sim.min_duration_ms > sim.max_duration_ms {
            return Err(ConfigError::Invalid(format!(
                "simulation.min_duration_ms ({}) exceeds simulation.max_duration_ms ({})",
                sim.min_duration_ms, sim.max_duration_ms
            )));
        }
        Ok(())
    }
}

// Helper to read a file, substitute env vars, and return its content.
// Returns Ok(None) if the file does not exist, or an error if it fails to read.
fn read_and_substitute(path: &str) -> Result<Option<String>, ConfigError> {
    if !std::path::Path::new(path).exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path)
        .map_err(|e| ConfigError::General(format!("Failed to read config file '{path}': {e}")))?;

    let re = Regex::new(r"\$\{(?P<var>[A-Z0-9_]+)\}")
        .map_err(|e| ConfigError::General(format!("Invalid substitution pattern: {e}")))?;
    let expanded_content = re.replace_all(&content, |caps: &regex::Captures| {
        let var_name = &caps["var"];
        env::var(var_name).unwrap_or_default()
    });

    Ok(Some(expanded_content.to_string()))
}

/// Loads the application configuration from a file and environment variables.
///
/// Layers, lowest precedence first:
/// - Defaults on [`AppConfig`].
/// - The YAML file at `config_path_override`, or `config.yml` next to this
///   crate's manifest when present. `${VAR}` references are substituted.
/// - Top-level keys from plain env vars (`PORT`, `DB_URL`, `JWT_SECRET`, ...).
/// - Nested keys from `INGESTFLOW_...` variables (e.g.
///   `INGESTFLOW_SIMULATION__TICK_INTERVAL_MS`).
pub fn get_config(config_path_override: Option<&str>) -> Result<AppConfig, ConfigError> {
    let base_path = env!("CARGO_MANIFEST_DIR");
    let mut builder = ConfigBuilder::builder();

    match config_path_override {
        Some(path) => {
            let content = read_and_substitute(path)?.ok_or_else(|| {
                ConfigError::NotFound(format!("Config file not found at '{path}'."))
            })?;
            info!("Loading configuration from '{path}'.");
            builder = builder.add_source(File::from_str(&content, FileFormat::Yaml));
        }
        None => {
            let default_path = format!("{base_path}/config.yml");
            if let Some(content) = read_and_substitute(&default_path)? {
                info!("Loading user-defined configuration from '{default_path}'.");
                builder = builder.add_source(File::from_str(&content, FileFormat::Yaml));
            }
        }
    }

    let settings = builder
        .add_source(Environment::default())
        .add_source(
            Environment::with_prefix("INGESTFLOW")
                .prefix_separator("_")
                .try_parsing(true)
                .separator("__"),
        )
        .build()?;

    let config: AppConfig = settings.try_deserialize()?;
    config.validate()?;
    Ok(config)
}
