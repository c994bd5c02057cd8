//! Backend round-trip executor.
//!
//! Forwards the (filtered) request to the route's backend and collects the
//! response. The round trip is bounded by the duration a `backendTimeout`
//! filter stored in the request's state bag, falling back to the
//! configured default; expiry aborts the call and surfaces as
//! [`Error::BackendTimeout`], which the server maps to 504.

use std::time::Duration;

use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::Uri;
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::core::{Context, Error, Request, Response, Result};
use crate::filters::timeout::BACKEND_TIMEOUT_KEY;
use crate::routing::Route;

/// Hop-by-hop headers that must not be forwarded in either direction.
const HOP_BY_HOP: [&str; 7] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "transfer-encoding",
    "upgrade",
];

static X_FORWARDED_FOR: std::sync::LazyLock<HeaderName> =
    std::sync::LazyLock::new(|| HeaderName::from_static("x-forwarded-for"));

/// HTTP client for backend round trips.
pub struct ProxyClient {
    client: Client<HttpConnector, Full<Bytes>>,
    default_timeout: Option<Duration>,
}

impl ProxyClient {
    /// Create a client. `default_timeout` bounds round trips for requests
    /// where no `backendTimeout` filter ran; `None` leaves them unbounded.
    pub fn new(default_timeout: Option<Duration>) -> Self {
        Self {
            client: Client::builder(TokioExecutor::new()).build(HttpConnector::new()),
            default_timeout,
        }
    }

    /// Execute the backend round trip for a request.
    ///
    /// Reads [`BACKEND_TIMEOUT_KEY`] from the state bag before starting
    /// the call; the bound covers the full exchange including response
    /// body collection.
    pub async fn execute(&self, route: &Route, req: Request, ctx: &Context) -> Result<Response> {
        let limit = ctx
            .get::<Duration>(BACKEND_TIMEOUT_KEY)
            .copied()
            .or(self.default_timeout);

        let upstream = self.build_upstream_request(route, req, ctx)?;

        let round_trip = async {
            let res = self
                .client
                .request(upstream)
                .await
                .map_err(|e| Error::BackendUnreachable(e.to_string()))?;

            let (parts, body) = res.into_parts();
            let body = body
                .collect()
                .await
                .map_err(|e| Error::BackendUnreachable(e.to_string()))?
                .to_bytes();

            let mut headers = parts.headers;
            strip_hop_by_hop(&mut headers);
            // the server serializer writes its own framing
            headers.remove(header::CONTENT_LENGTH);

            Ok(Response::from_parts(parts.status, headers, body))
        };

        match limit {
            Some(limit) => tokio::time::timeout(limit, round_trip)
                .await
                .map_err(|_| Error::BackendTimeout { limit })?,
            None => round_trip.await,
        }
    }

    fn build_upstream_request(
        &self,
        route: &Route,
        req: Request,
        ctx: &Context,
    ) -> Result<http::Request<Full<Bytes>>> {
        let uri = join_backend_uri(&route.backend, req.path_and_query())?;

        let mut headers = req.headers().clone();
        strip_hop_by_hop(&mut headers);
        headers.remove(header::HOST);
        append_forwarded_for(&mut headers, ctx);

        let mut builder = http::Request::builder().method(req.method().clone()).uri(uri);
        if let Some(map) = builder.headers_mut() {
            *map = headers;
        }

        Ok(builder.body(Full::new(req.into_body()))?)
    }
}

/// Replace scheme and authority with the backend's, keep the request's
/// path and query.
fn join_backend_uri(backend: &Uri, path_and_query: &str) -> Result<Uri> {
    let mut parts = backend.clone().into_parts();
    parts.path_and_query = Some(
        path_and_query
            .parse()
            .map_err(|_| Error::InvalidRequest(format!("bad path: {}", path_and_query)))?,
    );
    Uri::from_parts(parts).map_err(|e| Error::InvalidRequest(e.to_string()))
}

/// Remove hop-by-hop headers plus anything listed in `Connection`.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| name.trim().parse().ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Append the client address to `X-Forwarded-For`.
fn append_forwarded_for(headers: &mut HeaderMap, ctx: &Context) {
    let client = ctx.client_ip.to_string();
    let value = match headers.get(&*X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(existing) => format!("{}, {}", existing, client),
        None => client,
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR.clone(), value);
    }
}
