//! Route definitions loaded from a JSON file.
//!
//! Format:
//!
//! ```json
//! [
//!   {
//!     "name": "api",
//!     "path_prefix": "/api",
//!     "backend": "http://127.0.0.1:9000",
//!     "filters": [
//!       { "name": "backendTimeout", "args": ["2s"] },
//!       { "name": "readTimeout", "args": ["10s"] }
//!     ]
//!   }
//! ]
//! ```

use std::path::Path;

use serde::Deserialize;

use crate::filters::FilterArg;

use super::ConfigError;

/// One route as written in the routes file.
#[derive(Clone, Debug, Deserialize)]
pub struct RouteDef {
    /// Route name, used in logs and error messages.
    pub name: String,
    /// Path prefix the route matches; longest prefix wins.
    pub path_prefix: String,
    /// Backend base URI (scheme + authority).
    pub backend: String,
    /// Filters in chain order.
    #[serde(default)]
    pub filters: Vec<FilterDef>,
}

/// One filter occurrence inside a route.
#[derive(Clone, Debug, Deserialize)]
pub struct FilterDef {
    /// Filter spec name (e.g. `backendTimeout`).
    pub name: String,
    /// Positional arguments.
    #[serde(default)]
    pub args: Vec<serde_json::Value>,
}

impl FilterDef {
    /// Convert the JSON arguments into typed [`FilterArg`]s.
    ///
    /// JSON has no duration type, so durations arrive as strings; numbers
    /// and booleans are passed through typed and it is up to each filter
    /// spec to accept or reject them.
    pub fn filter_args(&self) -> Result<Vec<FilterArg>, ConfigError> {
        self.args
            .iter()
            .map(|v| match v {
                serde_json::Value::String(s) => Ok(FilterArg::Str(s.clone())),
                serde_json::Value::Bool(b) => Ok(FilterArg::Bool(*b)),
                serde_json::Value::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        Ok(FilterArg::Int(i))
                    } else if let Some(f) = n.as_f64() {
                        Ok(FilterArg::Float(f))
                    } else {
                        Err(self.bad_arg(v))
                    }
                }
                _ => Err(self.bad_arg(v)),
            })
            .collect()
    }

    fn bad_arg(&self, value: &serde_json::Value) -> ConfigError {
        ConfigError::Invalid {
            key: format!("filters.{}.args", self.name),
            message: format!("unsupported argument: {}", value),
        }
    }
}

/// Load route definitions from a JSON file.
pub fn load_routes(path: &Path) -> Result<Vec<RouteDef>, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
        path: path.display().to_string(),
        error,
    })?;
    serde_json::from_str(&raw).map_err(|error| ConfigError::Json {
        path: path.display().to_string(),
        error,
    })
}
