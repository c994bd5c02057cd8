//! HTTP response abstraction for the filter chain and proxy executor.

use bytes::Bytes;
use http::header::{self, HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};

/// Pre-allocated static bodies for common responses.
mod static_bodies {
    use super::*;
    pub static NOT_FOUND: Bytes = Bytes::from_static(b"Not Found");
    pub static BAD_REQUEST: Bytes = Bytes::from_static(b"Bad Request");
    pub static BAD_GATEWAY: Bytes = Bytes::from_static(b"Bad Gateway");
    pub static GATEWAY_TIMEOUT: Bytes = Bytes::from_static(b"Gateway Timeout");
    pub static CLIENT_TIMEOUT: Bytes = Bytes::from_static(b"Client Timeout");
}

/// Non-standard status used when the client was too slow sending the
/// request. Distinct from 5xx so operators can tell client-caused
/// timeouts from backend ones.
pub(crate) const CLIENT_CLOSED_REQUEST: u16 = 499;

/// HTTP response.
///
/// Note: Clone is intentionally not derived to prevent expensive copies.
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Response {
    /// Create a new response builder.
    #[inline]
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder::new()
    }

    /// Create a response from parts (used by the proxy executor).
    #[inline]
    pub fn from_parts(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Create a 200 OK response with body.
    #[inline]
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Create a 404 Not Found response.
    #[inline]
    pub fn not_found() -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            headers: HeaderMap::new(),
            body: static_bodies::NOT_FOUND.clone(),
        }
    }

    /// Create a 400 Bad Request response.
    #[inline]
    pub fn bad_request() -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            headers: HeaderMap::new(),
            body: static_bodies::BAD_REQUEST.clone(),
        }
    }

    /// Create a 502 Bad Gateway response.
    #[inline]
    pub fn bad_gateway() -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            headers: HeaderMap::new(),
            body: static_bodies::BAD_GATEWAY.clone(),
        }
    }

    /// Create a 504 Gateway Timeout response.
    #[inline]
    pub fn gateway_timeout() -> Self {
        Self {
            status: StatusCode::GATEWAY_TIMEOUT,
            headers: HeaderMap::new(),
            body: static_bodies::GATEWAY_TIMEOUT.clone(),
        }
    }

    /// Create a 499 response for a client that was too slow sending its
    /// request (nonstandard, nginx-style).
    #[inline]
    pub fn client_timeout() -> Self {
        Self {
            // 499 is in the valid range, from_u16 cannot fail here
            status: StatusCode::from_u16(CLIENT_CLOSED_REQUEST)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            headers: HeaderMap::new(),
            body: static_bodies::CLIENT_TIMEOUT.clone(),
        }
    }

    /// Get the status code.
    #[inline]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Get the response headers.
    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get a mutable reference to the response headers.
    #[inline]
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Get a header value as a string, if present and valid UTF-8.
    #[inline]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Get the response body.
    #[inline]
    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

/// Builder for responses.
pub struct ResponseBuilder {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl ResponseBuilder {
    /// Create a new builder with a 200 status and empty body.
    #[inline]
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Set the status code.
    #[inline]
    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Add a header. Invalid names or values are silently skipped.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            name.parse::<HeaderName>(),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Set the body.
    #[inline]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Build the response. Sets `Content-Type: text/plain` if none was given.
    pub fn build(mut self) -> Response {
        if !self.headers.contains_key(header::CONTENT_TYPE) && !self.body.is_empty() {
            self.headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            );
        }
        Response {
            status: self.status,
            headers: self.headers,
            body: self.body,
        }
    }
}

impl Default for ResponseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canned_responses() {
        assert_eq!(Response::ok("hi").status(), StatusCode::OK);
        assert_eq!(Response::not_found().status(), StatusCode::NOT_FOUND);
        assert_eq!(Response::bad_gateway().status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            Response::gateway_timeout().status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(Response::client_timeout().status().as_u16(), 499);
    }

    #[test]
    fn test_builder() {
        let res = Response::builder()
            .status(StatusCode::ACCEPTED)
            .header("x-route", "api")
            .body("queued")
            .build();

        assert_eq!(res.status(), StatusCode::ACCEPTED);
        assert_eq!(res.header("x-route"), Some("api"));
        assert_eq!(res.body().as_ref(), b"queued");
        // default content type applied
        assert_eq!(
            res.header("content-type"),
            Some("text/plain; charset=utf-8")
        );
    }

    #[test]
    fn test_builder_skips_invalid_header() {
        let res = Response::builder().header("bad header name", "v").build();
        assert!(res.headers().is_empty());
    }
}
