//! HTTP request abstraction for the filter chain and proxy executor.

use bytes::Bytes;
use http::header::{self, HeaderName};
use http::{HeaderMap, Method, Uri};

/// HTTP request flowing through the filter chain.
///
/// The body starts out empty: the connection layer parses the request head,
/// runs the request filters, and only then receives the body (so a read
/// deadline installed by a filter governs body receipt).
///
/// Note: Clone is intentionally not derived to prevent expensive copies.
#[derive(Debug)]
pub struct Request {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    version: http::Version,
}

impl Request {
    /// Create a new request.
    #[inline]
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            method,
            uri,
            headers,
            body,
            version: http::Version::HTTP_11,
        }
    }

    /// Get the HTTP method.
    #[inline]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Get the request URI.
    #[inline]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Get the request path.
    #[inline]
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Get the query string, if any.
    #[inline]
    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    /// Get path and query as a single string (e.g. `/api/users?page=2`).
    #[inline]
    pub fn path_and_query(&self) -> &str {
        self.uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
    }

    /// Get the request headers.
    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get a mutable reference to the request headers.
    #[inline]
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Get a header value as a string, if present and valid UTF-8.
    #[inline]
    pub fn header(&self, name: &HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Declared `Content-Length`, if present and well-formed.
    pub fn content_length(&self) -> Option<u64> {
        self.header(&header::CONTENT_LENGTH)
            .and_then(|v| v.parse().ok())
    }

    /// Whether the client asked to close the connection after this exchange.
    pub fn wants_close(&self) -> bool {
        match self.header(&header::CONNECTION) {
            Some(v) => v.eq_ignore_ascii_case("close"),
            None => self.version == http::Version::HTTP_10,
        }
    }

    /// Get the request body.
    #[inline]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Consume the request, returning the body.
    #[inline]
    pub fn into_body(self) -> Bytes {
        self.body
    }

    /// Replace the body (used by the connection layer once the body has
    /// been received).
    #[inline]
    pub fn set_body(&mut self, body: Bytes) {
        self.body = body;
    }

    /// Get the HTTP version.
    #[inline]
    pub fn version(&self) -> http::Version {
        self.version
    }

    /// Set the HTTP version.
    #[inline]
    pub fn set_version(&mut self, version: http::Version) {
        self.version = version;
    }
}
