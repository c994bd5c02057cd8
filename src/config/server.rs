//! Server configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use super::parse::{env_bool, env_duration, env_opt, env_or};
use super::ConfigError;

/// Server configuration loaded from environment.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Address the proxy listens on.
    pub listen_addr: SocketAddr,
    /// Path to the JSON routes file. None starts the server with an
    /// empty route table (every request 404s), useful in tests.
    pub routes_file: Option<PathBuf>,
    /// Default bound for the backend round trip when no backendTimeout
    /// filter set one. None means unbounded.
    pub default_backend_timeout: Option<Duration>,
    /// How long to wait for in-flight connections on shutdown.
    pub shutdown_grace: Duration,
    /// Emit one access log line per request.
    pub access_log: bool,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let listen_raw = env_or("LISTEN_ADDR", "0.0.0.0:8080");
        let listen_addr: SocketAddr = listen_raw.parse().map_err(|e| ConfigError::Parse {
            key: "LISTEN_ADDR".into(),
            value: listen_raw.clone(),
            error: format!("{}", e),
        })?;

        Ok(Self {
            listen_addr,
            routes_file: env_opt("ROUTES_FILE").map(PathBuf::from),
            default_backend_timeout: env_duration("BACKEND_TIMEOUT", "30s")?,
            shutdown_grace: env_duration("SHUTDOWN_GRACE", "10s")?
                .unwrap_or(Duration::from_secs(10)),
            access_log: env_bool("ACCESS_LOG", true),
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".parse().expect("static addr"),
            routes_file: None,
            default_backend_timeout: Some(Duration::from_secs(30)),
            shutdown_grace: Duration::from_secs(10),
            access_log: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.listen_addr.port(), 8080);
        assert!(config.routes_file.is_none());
        assert_eq!(
            config.default_backend_timeout,
            Some(Duration::from_secs(30))
        );
        assert!(config.access_log);
    }
}
