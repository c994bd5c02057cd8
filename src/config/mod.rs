//! Configuration for the proxy.
//!
//! Environment variables drive scalar settings; routes live in a JSON file
//! named by `ROUTES_FILE`.
//!
//! # Example
//!
//! ```rust,ignore
//! use sluice::config::Config;
//!
//! let config = Config::from_env()?;
//! println!("Listen address: {}", config.server.listen_addr);
//! ```

mod error;
mod logging;
mod parse;
mod routes;
mod server;

pub use error::ConfigError;
pub use logging::LoggingConfig;
pub use parse::{env_bool, env_duration, env_opt, env_or, parse_duration};
pub use routes::{load_routes, FilterDef, RouteDef};
pub use server::ServerConfig;

/// Complete application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            server: ServerConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
        })
    }

    /// Print configuration summary to log.
    pub fn log_summary(&self) {
        use tracing::info;

        info!("Configuration loaded:");
        info!("  Listen: {}", self.server.listen_addr);

        match &self.server.routes_file {
            Some(path) => info!("  Routes file: {}", path.display()),
            None => info!("  Routes file: none (empty route table)"),
        }

        match self.server.default_backend_timeout {
            Some(d) => info!("  Default backend timeout: {:?}", d),
            None => info!("  Default backend timeout: disabled"),
        }

        info!("  Shutdown grace: {:?}", self.server.shutdown_grace);

        if self.server.access_log {
            info!("  Access log: enabled");
        }
    }
}
