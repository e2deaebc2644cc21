//! Configuration management for the Storefront Platform
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (development.toml, production.toml)
//! 3. Environment variable overrides with SHOP_ prefix

use config::{ConfigError, Environment, File};
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Stock and reservation behavior
    pub stock: StockConfig,

    /// Low-stock alert delivery
    pub alerts: AlertConfig,
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

/// Knobs for the stock adjustment and reservation engines. Injected into the
/// services at construction; nothing reads ambient global state.
#[derive(Debug, Deserialize, Clone)]
pub struct StockConfig {
    /// Reservation time-to-live in minutes
    pub reservation_ttl_minutes: i64,

    /// Global override allowing on-hand quantity to go negative
    pub allow_negative_stock: bool,

    /// Threshold used when a stockable does not set its own
    pub default_low_stock_threshold: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlertConfig {
    /// Whether low-stock alerts are dispatched at all
    pub enabled: bool,

    /// Webhook endpoint notified on low stock (optional)
    pub webhook_url: Option<String>,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment =
            std::env::var("SHOP_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("stock.reservation_ttl_minutes", 30)?
            .set_default("stock.allow_negative_stock", false)?
            .set_default("stock.default_low_stock_threshold", 5)?
            .set_default("alerts.enabled", true)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (SHOP_ prefix)
            .add_source(
                Environment::with_prefix("SHOP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

impl Default for StockConfig {
    fn default() -> Self {
        Self {
            reservation_ttl_minutes: 30,
            allow_negative_stock: false,
            default_low_stock_threshold: 5,
        }
    }
}
