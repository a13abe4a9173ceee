//! Configuration management for the stock ledger server
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (development.toml, production.toml)
//! 3. Environment variable overrides with STK_ prefix

use config::{ConfigError, Environment, File};
use serde::Deserialize;
use shared::types::{EngineLimits, DEFAULT_MAX_DEPTH, DEFAULT_MAX_PRODUCTIONS, RUPTURA_WINDOW_DAYS};

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// BOM traversal and cascade limits
    pub engine: EngineConfig,

    /// Background projection refresh
    pub reconciliation: ReconciliationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EngineConfig {
    /// Deepest BOM level walked before a branch fails
    pub max_depth: u32,

    /// Auto-productions allowed under one root production
    pub max_productions_per_operation: u32,

    /// Default horizon for projection queries, in days
    pub projection_days: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReconciliationConfig {
    pub enabled: bool,

    /// Seconds between passes
    pub interval_secs: u64,

    /// Stale balances refreshed per pass
    pub batch_size: i64,
}

impl EngineConfig {
    pub fn limits(&self) -> EngineLimits {
        EngineLimits {
            max_depth: self.max_depth,
            max_productions: self.max_productions_per_operation,
        }
    }
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("STK_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            .set_default("environment", environment.clone())?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("engine.max_depth", i64::from(DEFAULT_MAX_DEPTH))?
            .set_default("engine.max_productions_per_operation", i64::from(DEFAULT_MAX_PRODUCTIONS))?
            .set_default("engine.projection_days", i64::from(RUPTURA_WINDOW_DAYS))?
            .set_default("reconciliation.enabled", true)?
            .set_default("reconciliation.interval_secs", 300)?
            .set_default("reconciliation.batch_size", 100)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (STK_ prefix)
            .add_source(
                Environment::with_prefix("STK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_productions_per_operation: DEFAULT_MAX_PRODUCTIONS,
            projection_days: RUPTURA_WINDOW_DAYS,
        }
    }
}
