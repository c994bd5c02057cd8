//! Per-connection HTTP/1.1 handling.
//!
//! The driver enforces the deadline contract: before every read and write
//! it re-checks the connection's [`DeadlineHandle`] and wraps the I/O call
//! in `tokio::time::timeout_at`. Filters run between head parse and body
//! read, so a read deadline installed by `readTimeout` governs body
//! receipt and a write deadline installed by `writeTimeout` governs
//! response delivery.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode, Uri};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, error, warn};

use crate::core::{Context, DeadlineHandle, Error, Request, Response, Result};
use crate::filters::FilterResult;
use crate::logging;

use super::ServerState;

/// Upper bound on the request head (request line + headers).
const MAX_HEAD_BYTES: usize = 64 * 1024;

/// Upper bound on an inbound request body.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Serve one client connection until close.
pub async fn handle(stream: TcpStream, peer: SocketAddr, state: Arc<ServerState>) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(error = %e, "set_nodelay failed");
    }

    let (mut reader, mut writer) = stream.into_split();
    let deadline = DeadlineHandle::new();
    let mut buf = BytesMut::with_capacity(8 * 1024);

    loop {
        let head = match read_head(&mut reader, &mut buf, &deadline).await {
            Ok(Some(req)) => req,
            // clean close between requests
            Ok(None) => break,
            Err(Error::ClientReadTimeout) => {
                // idle keep-alive expiry closes quietly; a half-sent
                // request gets the client-timeout classification
                if !buf.is_empty() {
                    let _ = write_response(
                        &mut writer,
                        &deadline,
                        Response::client_timeout(),
                        true,
                    )
                    .await;
                }
                break;
            }
            Err(e) => {
                debug!(peer = %peer, error = %e, "failed to read request");
                let _ = write_response(&mut writer, &deadline, Response::bad_request(), true).await;
                break;
            }
        };

        let mut ctx = Context::new(peer.ip(), deadline.clone());
        let method = head.method().to_string();
        let path = head.path().to_string();
        let mut close = head.wants_close();
        let declared_body = head.content_length().unwrap_or(0) as usize;

        let route = match state.routes.match_route(head.path()) {
            Some(route) => route,
            None => {
                // body was never read, the connection is not reusable
                close = close || declared_body > 0;
                if finish(&mut writer, &deadline, &state, &ctx, &method, &path, None, Response::not_found(), close)
                    .await
                    .is_err()
                {
                    break;
                }
                if close {
                    break;
                }
                continue;
            }
        };

        if head.headers().contains_key(http::header::TRANSFER_ENCODING) {
            let res = Response::builder()
                .status(StatusCode::LENGTH_REQUIRED)
                .body("Length Required")
                .build();
            let _ = finish(&mut writer, &deadline, &state, &ctx, &method, &path, Some(&route.name), res, true).await;
            break;
        }

        // request filters run before the body is received
        let mut req = match route.chain.run_request(head, &mut ctx) {
            FilterResult::Next(req) => req,
            FilterResult::Stop(res) => {
                close = close || declared_body > 0;
                let res = route.chain.run_response(res, &mut ctx);
                if finish(&mut writer, &deadline, &state, &ctx, &method, &path, Some(&route.name), res, close)
                    .await
                    .is_err()
                    || close
                {
                    break;
                }
                continue;
            }
        };

        if declared_body > MAX_BODY_BYTES {
            let res = Response::builder()
                .status(StatusCode::PAYLOAD_TOO_LARGE)
                .body("Payload Too Large")
                .build();
            let _ = finish(&mut writer, &deadline, &state, &ctx, &method, &path, Some(&route.name), res, true).await;
            break;
        }

        match read_body(&mut reader, &mut buf, declared_body, &deadline).await {
            Ok(body) => req.set_body(body),
            Err(e) => {
                warn!(peer = %peer, route = %route.name, error = %e, "failed to read request body");
                if let Some(res) = e.to_response() {
                    let _ = finish(&mut writer, &deadline, &state, &ctx, &method, &path, Some(&route.name), res, true).await;
                }
                break;
            }
        }

        let res = match state.proxy.execute(route, req, &ctx).await {
            Ok(res) => res,
            Err(e) => {
                warn!(route = %route.name, request_id = %ctx.request_id, error = %e, "round trip failed");
                match e.to_response() {
                    Some(res) => res,
                    None => break,
                }
            }
        };

        let res = route.chain.run_response(res, &mut ctx);

        if finish(&mut writer, &deadline, &state, &ctx, &method, &path, Some(&route.name), res, close)
            .await
            .is_err()
            || close
        {
            break;
        }
    }

    deadline.close();
}

/// Write the response, emit the access log line. Errors mean the
/// connection is unusable and must be dropped.
#[allow(clippy::too_many_arguments)]
async fn finish(
    writer: &mut OwnedWriteHalf,
    deadline: &DeadlineHandle,
    state: &ServerState,
    ctx: &Context,
    method: &str,
    path: &str,
    route: Option<&str>,
    res: Response,
    close: bool,
) -> Result<()> {
    let status = res.status().as_u16();
    let written = match write_response(writer, deadline, res, close).await {
        Ok(n) => n,
        Err(e) => {
            match e {
                Error::WriteTimeout => {
                    warn!(request_id = %ctx.request_id, "write deadline elapsed, aborting connection")
                }
                ref other => error!(request_id = %ctx.request_id, error = %other, "response write failed"),
            }
            return Err(e);
        }
    };

    if state.access_log {
        logging::log_access(
            &ctx.request_id,
            &ctx.client_ip.to_string(),
            method,
            path,
            route,
            status,
            written,
            ctx.elapsed_ms(),
        );
    }
    Ok(())
}

/// Read one complete request head, parse it into a [`Request`] with an
/// empty body. `Ok(None)` means the client closed cleanly between
/// requests. Leftover bytes past the head stay in `buf`.
async fn read_head(
    reader: &mut OwnedReadHalf,
    buf: &mut BytesMut,
    deadline: &DeadlineHandle,
) -> Result<Option<Request>> {
    loop {
        if let Some(end) = find_head_end(buf) {
            let head = buf.split_to(end + 4);
            return parse_head(&head).map(Some);
        }
        if buf.len() > MAX_HEAD_BYTES {
            return Err(Error::InvalidRequest("header section too large".into()));
        }

        let n = read_some(reader, buf, deadline).await?;
        if n == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            return Err(Error::InvalidRequest(
                "connection closed mid-request".into(),
            ));
        }
    }
}

/// Read exactly `len` body bytes, honoring the current read deadline.
async fn read_body(
    reader: &mut OwnedReadHalf,
    buf: &mut BytesMut,
    len: usize,
    deadline: &DeadlineHandle,
) -> Result<Bytes> {
    while buf.len() < len {
        let n = read_some(reader, buf, deadline).await?;
        if n == 0 {
            return Err(Error::InvalidRequest("connection closed mid-body".into()));
        }
    }
    Ok(buf.split_to(len).freeze())
}

/// One read, bounded by the currently installed read deadline. The
/// deadline is re-fetched on every call so a filter's (re)install takes
/// effect on the next read.
async fn read_some(
    reader: &mut OwnedReadHalf,
    buf: &mut BytesMut,
    deadline: &DeadlineHandle,
) -> Result<usize> {
    match deadline.read_deadline() {
        Some(at) => {
            // the deadline is absolute: once elapsed, even a ready read
            // must fail
            if tokio::time::Instant::now() >= at {
                return Err(Error::ClientReadTimeout);
            }
            match tokio::time::timeout_at(at, reader.read_buf(buf)).await {
                Ok(result) => result.map_err(Error::Io),
                Err(_) => Err(Error::ClientReadTimeout),
            }
        }
        None => reader.read_buf(buf).await.map_err(Error::Io),
    }
}

/// Serialize and send a response, bounded by the currently installed
/// write deadline. Returns bytes written.
async fn write_response(
    writer: &mut OwnedWriteHalf,
    deadline: &DeadlineHandle,
    res: Response,
    close: bool,
) -> Result<u64> {
    let wire = serialize_response(&res, close);

    let io = async {
        writer.write_all(&wire).await?;
        writer.flush().await
    };

    match deadline.write_deadline() {
        Some(at) => {
            // the deadline is absolute: a write attempted after expiry
            // fails even if the socket would accept it
            if tokio::time::Instant::now() >= at {
                return Err(Error::WriteTimeout);
            }
            match tokio::time::timeout_at(at, io).await {
                Ok(result) => result.map_err(Error::Io)?,
                Err(_) => return Err(Error::WriteTimeout),
            }
        }
        None => io.await.map_err(Error::Io)?,
    }

    Ok(wire.len() as u64)
}

/// Serialize status line, headers and body. Framing headers are always
/// regenerated from the actual body.
fn serialize_response(res: &Response, close: bool) -> Vec<u8> {
    let body = res.body();
    let mut wire = Vec::with_capacity(256 + body.len());

    wire.extend_from_slice(b"HTTP/1.1 ");
    wire.extend_from_slice(res.status().as_str().as_bytes());
    wire.push(b' ');
    wire.extend_from_slice(res.status().canonical_reason().unwrap_or("").as_bytes());
    wire.extend_from_slice(b"\r\n");

    for (name, value) in res.headers() {
        if name == http::header::CONTENT_LENGTH
            || name == http::header::TRANSFER_ENCODING
            || name == http::header::CONNECTION
        {
            continue;
        }
        wire.extend_from_slice(name.as_str().as_bytes());
        wire.extend_from_slice(b": ");
        wire.extend_from_slice(value.as_bytes());
        wire.extend_from_slice(b"\r\n");
    }

    wire.extend_from_slice(b"content-length: ");
    wire.extend_from_slice(body.len().to_string().as_bytes());
    wire.extend_from_slice(b"\r\n");
    wire.extend_from_slice(if close {
        b"connection: close\r\n"
    } else {
        b"connection: keep-alive\r\n"
    });
    wire.extend_from_slice(b"\r\n");
    wire.extend_from_slice(body);

    wire
}

/// Locate the `\r\n\r\n` terminating the head.
fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Parse a complete request head into a [`Request`] with an empty body.
fn parse_head(head: &[u8]) -> Result<Request> {
    let text = std::str::from_utf8(head)
        .map_err(|_| Error::InvalidRequest("head is not valid UTF-8".into()))?;

    let mut lines = text.split("\r\n");
    let request_line = lines
        .next()
        .ok_or_else(|| Error::InvalidRequest("empty request".into()))?;

    let mut parts = request_line.split_whitespace();
    let (method, target, version) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(m), Some(t), Some(v), None) => (m, t, v),
        _ => {
            return Err(Error::InvalidRequest(format!(
                "malformed request line: {}",
                request_line
            )))
        }
    };

    let method = Method::from_bytes(method.as_bytes())
        .map_err(|_| Error::InvalidRequest(format!("bad method: {}", method)))?;
    let uri: Uri = target
        .parse()
        .map_err(|_| Error::InvalidRequest(format!("bad request target: {}", target)))?;
    let version = match version {
        "HTTP/1.1" => http::Version::HTTP_11,
        "HTTP/1.0" => http::Version::HTTP_10,
        other => {
            return Err(Error::InvalidRequest(format!(
                "unsupported version: {}",
                other
            )))
        }
    };

    let mut headers = HeaderMap::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| Error::InvalidRequest(format!("malformed header: {}", line)))?;
        let name: HeaderName = name
            .trim()
            .parse()
            .map_err(|_| Error::InvalidRequest(format!("bad header name: {}", name)))?;
        let value: HeaderValue = value
            .trim()
            .parse()
            .map_err(|_| Error::InvalidRequest(format!("bad header value for {}", name)))?;
        headers.append(name, value);
    }

    let mut req = Request::new(method, uri, headers, Bytes::new());
    req.set_version(version);
    Ok(req)
}
