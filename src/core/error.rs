//! Request-time error types.

use std::fmt;
use std::time::Duration;

use crate::core::Response;

/// Errors produced while serving a proxied request.
///
/// Configuration-time failures live in [`crate::filters::FilterError`] and
/// [`crate::config::ConfigError`]; this enum only covers conditions that
/// arise once traffic is flowing.
#[derive(Debug)]
pub enum Error {
    /// Malformed inbound HTTP request.
    InvalidRequest(String),

    /// The backend round trip exceeded its configured bound.
    BackendTimeout { limit: Duration },

    /// The backend could not be reached or failed mid-exchange.
    BackendUnreachable(String),

    /// The client was too slow sending the request; the installed read
    /// deadline elapsed.
    ClientReadTimeout,

    /// The installed write deadline elapsed while sending the response.
    /// Bytes may already have been flushed; the connection is aborted.
    WriteTimeout,

    /// I/O error on the client connection.
    Io(std::io::Error),

    /// HTTP protocol error.
    Http(http::Error),
}

impl Error {
    /// Map this error to the response sent downstream, where one is still
    /// possible. `WriteTimeout` and `Io` yield no response: the connection
    /// is no longer usable.
    pub fn to_response(&self) -> Option<Response> {
        match self {
            Error::InvalidRequest(_) => Some(Response::bad_request()),
            Error::BackendTimeout { .. } => Some(Response::gateway_timeout()),
            Error::BackendUnreachable(_) => Some(Response::bad_gateway()),
            Error::ClientReadTimeout => Some(Response::client_timeout()),
            Error::WriteTimeout | Error::Io(_) | Error::Http(_) => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidRequest(msg) => write!(f, "invalid request: {}", msg),
            Error::BackendTimeout { limit } => {
                write!(f, "backend round trip exceeded {:?}", limit)
            }
            Error::BackendUnreachable(msg) => write!(f, "backend unreachable: {}", msg),
            Error::ClientReadTimeout => write!(f, "read deadline elapsed receiving request"),
            Error::WriteTimeout => write!(f, "write deadline elapsed sending response"),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Http(e) => write!(f, "HTTP error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Http(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<http::Error> for Error {
    fn from(e: http::Error) -> Self {
        Error::Http(e)
    }
}

/// Result type alias for request-time operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidRequest("missing host".to_string());
        assert_eq!(err.to_string(), "invalid request: missing host");

        let err = Error::BackendTimeout {
            limit: Duration::from_millis(10),
        };
        assert!(err.to_string().contains("10ms"));
    }

    #[test]
    fn test_status_classification() {
        let res = Error::BackendTimeout {
            limit: Duration::from_secs(1),
        }
        .to_response()
        .unwrap();
        assert_eq!(res.status(), http::StatusCode::GATEWAY_TIMEOUT);

        let res = Error::BackendUnreachable("refused".into())
            .to_response()
            .unwrap();
        assert_eq!(res.status(), http::StatusCode::BAD_GATEWAY);

        // client slowness is classified apart from server errors
        let res = Error::ClientReadTimeout.to_response().unwrap();
        assert_eq!(res.status().as_u16(), 499);

        // nothing useful can be sent once a write deadline fired
        assert!(Error::WriteTimeout.to_response().is_none());
    }
}
