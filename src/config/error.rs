//! Configuration error types.

use std::fmt;

use crate::filters::FilterError;

/// Error type for configuration and route loading.
///
/// All variants are load-time failures: the process (or the offending
/// route set) is refused before it serves traffic.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to parse an environment variable.
    Parse {
        key: String,
        value: String,
        error: String,
    },
    /// Missing required environment variable.
    Missing { key: String },
    /// Invalid value for a configuration item.
    Invalid { key: String, message: String },
    /// IO error (e.g. reading the routes file).
    Io { path: String, error: std::io::Error },
    /// Routes file did not parse as JSON.
    Json {
        path: String,
        error: serde_json::Error,
    },
    /// A route definition could not be constructed.
    Route { route: String, source: FilterError },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Parse { key, value, error } => {
                write!(f, "failed to parse {}='{}': {}", key, value, error)
            }
            ConfigError::Missing { key } => {
                write!(f, "missing required environment variable: {}", key)
            }
            ConfigError::Invalid { key, message } => {
                write!(f, "invalid value for {}: {}", key, message)
            }
            ConfigError::Io { path, error } => {
                write!(f, "IO error for '{}': {}", path, error)
            }
            ConfigError::Json { path, error } => {
                write!(f, "invalid routes file '{}': {}", path, error)
            }
            ConfigError::Route { route, source } => {
                write!(f, "route '{}' rejected: {}", route, source)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { error, .. } => Some(error),
            ConfigError::Json { error, .. } => Some(error),
            ConfigError::Route { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = ConfigError::Parse {
            key: "LISTEN_ADDR".into(),
            value: "nonsense".into(),
            error: "invalid socket address".into(),
        };
        assert_eq!(
            err.to_string(),
            "failed to parse LISTEN_ADDR='nonsense': invalid socket address"
        );

        let err = ConfigError::Route {
            route: "api".into(),
            source: FilterError::UnknownFilter("gzip".into()),
        };
        assert_eq!(err.to_string(), "route 'api' rejected: unknown filter: gzip");
    }
}
