//! Route filters: per-route request/response hooks.
//!
//! A filter is configured on a route, constructed once at route load time
//! by its [`FilterSpec`], and then invoked concurrently by every request
//! matching the route. Filters must therefore be immutable values; all
//! per-request effects go through the [`Context`].
//!
//! # Lifecycle
//!
//! ```text
//! Request → F1.on_request → F2.on_request → backend round trip
//!                                                ↓
//! Response ← F1.on_response ← F2.on_response ←──┘
//! ```

mod chain;
mod registry;

pub mod timeout;

pub use chain::FilterChain;
pub use registry::FilterRegistry;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::core::{Context, Request, Response};

/// Result of filter request processing.
#[derive(Debug)]
pub enum FilterResult {
    /// Continue to the next filter with the (possibly modified) request.
    Next(Request),
    /// Stop the chain and return this response immediately.
    Stop(Response),
}

impl FilterResult {
    /// Check if this result continues the chain.
    pub fn is_next(&self) -> bool {
        matches!(self, FilterResult::Next(_))
    }

    /// Check if this result stops the chain.
    pub fn is_stop(&self) -> bool {
        matches!(self, FilterResult::Stop(_))
    }

    /// Unwrap the request if this is a Next result.
    pub fn into_request(self) -> Option<Request> {
        match self {
            FilterResult::Next(req) => Some(req),
            FilterResult::Stop(_) => None,
        }
    }
}

/// Trait for route filters.
///
/// `on_request` runs before the backend round trip, `on_response` after,
/// in reverse chain order. Both hooks are synchronous and must not block:
/// anything slow belongs in the proxy executor or the transport.
pub trait Filter: fmt::Debug + Send + Sync {
    /// Canonical name of this filter (matches its spec).
    fn name(&self) -> &'static str;

    /// Process the request before the round trip.
    fn on_request(&self, req: Request, _ctx: &mut Context) -> FilterResult {
        FilterResult::Next(req)
    }

    /// Process the response after the round trip.
    fn on_response(&self, res: Response, _ctx: &mut Context) -> Response {
        res
    }
}

/// A single filter argument from route configuration.
///
/// Route files produce `Str`, `Int`, `Float` and `Bool`; `Duration` is for
/// programmatic route construction where the value is already typed.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterArg {
    Str(String),
    Duration(Duration),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl FilterArg {
    /// Human-readable type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            FilterArg::Str(_) => "string",
            FilterArg::Duration(_) => "duration",
            FilterArg::Int(_) => "integer",
            FilterArg::Float(_) => "float",
            FilterArg::Bool(_) => "boolean",
        }
    }
}

/// Factory for one kind of filter.
///
/// A spec is registered once in the [`FilterRegistry`] and consulted at
/// route load time. `create` runs per configured filter occurrence, never
/// per request; its errors must reject the owning route.
pub trait FilterSpec: Send + Sync {
    /// Canonical identifier used in route configuration.
    fn name(&self) -> &'static str;

    /// Construct an immutable filter instance from configured arguments.
    fn create(&self, args: &[FilterArg]) -> Result<Arc<dyn Filter>, FilterError>;
}

/// Errors raised while constructing filters from route configuration.
///
/// These are load-time errors only: a route carrying an invalid filter is
/// refused before it can serve traffic.
#[derive(Debug)]
pub enum FilterError {
    /// Wrong number of arguments for the filter.
    InvalidArgCount {
        filter: &'static str,
        expected: usize,
        got: usize,
    },

    /// An argument had an unsupported type or invalid value.
    InvalidArgType {
        filter: &'static str,
        reason: String,
    },

    /// A duration string did not parse.
    DurationParse {
        filter: &'static str,
        value: String,
        source: humantime::DurationError,
    },

    /// No spec registered under the requested name.
    UnknownFilter(String),
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterError::InvalidArgCount {
                filter,
                expected,
                got,
            } => write!(
                f,
                "{}: expected {} argument(s), got {}",
                filter, expected, got
            ),
            FilterError::InvalidArgType { filter, reason } => {
                write!(f, "{}: invalid argument: {}", filter, reason)
            }
            FilterError::DurationParse {
                filter,
                value,
                source,
            } => write!(f, "{}: cannot parse duration '{}': {}", filter, value, source),
            FilterError::UnknownFilter(name) => write!(f, "unknown filter: {}", name),
        }
    }
}

impl std::error::Error for FilterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FilterError::DurationParse { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DeadlineHandle;
    use bytes::Bytes;
    use std::net::{IpAddr, Ipv4Addr};

    #[derive(Debug)]
    struct PassThrough;

    impl Filter for PassThrough {
        fn name(&self) -> &'static str {
            "passthrough"
        }
    }

    #[test]
    fn test_default_hooks_pass_through() {
        let f = PassThrough;
        let req = Request::new(
            http::Method::GET,
            "/".parse().unwrap(),
            http::HeaderMap::new(),
            Bytes::new(),
        );
        let mut ctx = Context::new(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            DeadlineHandle::new(),
        );

        assert!(f.on_request(req, &mut ctx).is_next());

        let res = Response::ok("ok");
        let res = f.on_response(res, &mut ctx);
        assert_eq!(res.status(), http::StatusCode::OK);
    }

    #[test]
    fn test_filter_arg_type_names() {
        assert_eq!(FilterArg::Str("2s".into()).type_name(), "string");
        assert_eq!(
            FilterArg::Duration(Duration::from_secs(2)).type_name(),
            "duration"
        );
        assert_eq!(FilterArg::Int(2).type_name(), "integer");
        assert_eq!(FilterArg::Float(2.0).type_name(), "float");
        assert_eq!(FilterArg::Bool(true).type_name(), "boolean");
    }

    #[test]
    fn test_filter_error_display() {
        let err = FilterError::InvalidArgCount {
            filter: "backendTimeout",
            expected: 1,
            got: 3,
        };
        assert_eq!(err.to_string(), "backendTimeout: expected 1 argument(s), got 3");

        let err = FilterError::UnknownFilter("gzip".into());
        assert_eq!(err.to_string(), "unknown filter: gzip");
    }
}
