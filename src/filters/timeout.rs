//! Per-phase timeout filters.
//!
//! Three filters bound the three phases of a proxied exchange:
//!
//! - `backendTimeout` caps the backend round trip. The filter only stores
//!   the duration in the request's state bag under [`BACKEND_TIMEOUT_KEY`];
//!   the round-trip executor reads it before calling the backend and maps
//!   expiry to 504.
//! - `readTimeout` installs an absolute read deadline on the connection.
//!   Reads of the inbound request (body included) fail once it elapses,
//!   which the server classifies as client-caused (499).
//! - `writeTimeout` installs an absolute write deadline. Writes of the
//!   outbound response fail once it elapses; bytes may already be on the
//!   wire, so the client just sees a broken response.
//!
//! A filter instance is an immutable `(kind, duration)` pair built once at
//! route load and invoked concurrently by every matching request.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::core::{Context, Request};

use super::{Filter, FilterArg, FilterError, FilterResult, FilterSpec};

/// State bag key under which `backendTimeout` stores its
/// [`Duration`]. Part of the contract with the round-trip executor in
/// [`crate::proxy`]: the executor reads exactly this key, typed as
/// `Duration`, before starting the backend call. Changing the key or the
/// value type is a breaking change for both sides.
pub const BACKEND_TIMEOUT_KEY: &str = "sluice.filter.backend_timeout";

/// Which phase a timeout filter bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    /// Backend round-trip duration (enforced by the proxy executor).
    Backend,
    /// Inbound request read deadline (enforced by the transport).
    Read,
    /// Outbound response write deadline (enforced by the transport).
    Write,
}

impl TimeoutKind {
    /// Canonical filter identifier for this kind.
    pub fn filter_name(self) -> &'static str {
        match self {
            TimeoutKind::Backend => "backendTimeout",
            TimeoutKind::Read => "readTimeout",
            TimeoutKind::Write => "writeTimeout",
        }
    }
}

/// Factory for one timeout kind. One instance per kind is registered in
/// the filter registry; it is stateless beyond the kind.
pub struct TimeoutSpec {
    kind: TimeoutKind,
}

impl TimeoutSpec {
    /// Spec for `backendTimeout`.
    pub fn backend() -> Self {
        Self {
            kind: TimeoutKind::Backend,
        }
    }

    /// Spec for `readTimeout`.
    pub fn read() -> Self {
        Self {
            kind: TimeoutKind::Read,
        }
    }

    /// Spec for `writeTimeout`.
    pub fn write() -> Self {
        Self {
            kind: TimeoutKind::Write,
        }
    }
}

impl FilterSpec for TimeoutSpec {
    fn name(&self) -> &'static str {
        self.kind.filter_name()
    }

    fn create(&self, args: &[FilterArg]) -> Result<Arc<dyn Filter>, FilterError> {
        if args.len() != 1 {
            return Err(FilterError::InvalidArgCount {
                filter: self.name(),
                expected: 1,
                got: args.len(),
            });
        }

        let duration = match &args[0] {
            FilterArg::Str(s) => {
                humantime::parse_duration(s).map_err(|source| FilterError::DurationParse {
                    filter: self.name(),
                    value: s.clone(),
                    source,
                })?
            }
            FilterArg::Duration(d) => *d,
            other => {
                return Err(FilterError::InvalidArgType {
                    filter: self.name(),
                    reason: format!("expected duration string, got {}", other.type_name()),
                })
            }
        };

        if duration.is_zero() {
            return Err(FilterError::InvalidArgType {
                filter: self.name(),
                reason: "timeout must be positive".to_string(),
            });
        }

        Ok(Arc::new(TimeoutFilter {
            kind: self.kind,
            duration,
        }))
    }
}

/// Immutable timeout filter: kind and duration, fixed at construction.
#[derive(Debug)]
pub struct TimeoutFilter {
    kind: TimeoutKind,
    duration: Duration,
}

impl TimeoutFilter {
    /// The phase this filter bounds.
    pub fn kind(&self) -> TimeoutKind {
        self.kind
    }

    /// The configured bound.
    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl Filter for TimeoutFilter {
    fn name(&self) -> &'static str {
        self.kind.filter_name()
    }

    fn on_request(&self, req: Request, ctx: &mut Context) -> FilterResult {
        match self.kind {
            TimeoutKind::Backend => {
                // Last filter in the chain wins: plain overwrite.
                ctx.set(BACKEND_TIMEOUT_KEY, self.duration);
            }
            TimeoutKind::Read => {
                let deadline = Instant::now() + self.duration;
                if let Err(e) = ctx.deadline().set_read_deadline(deadline) {
                    // Best effort: the request proceeds without this
                    // protection rather than failing.
                    tracing::error!(
                        request_id = %ctx.request_id,
                        error = %e,
                        "failed to set read deadline"
                    );
                }
            }
            TimeoutKind::Write => {
                let deadline = Instant::now() + self.duration;
                if let Err(e) = ctx.deadline().set_write_deadline(deadline) {
                    tracing::error!(
                        request_id = %ctx.request_id,
                        error = %e,
                        "failed to set write deadline"
                    );
                }
            }
        }
        FilterResult::Next(req)
    }

    // Backend timeout is consumed before the response phase; read/write
    // deadlines are enforced by the transport. Nothing to do here.
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DeadlineHandle;
    use bytes::Bytes;
    use std::net::{IpAddr, Ipv4Addr};

    fn test_request() -> Request {
        Request::new(
            http::Method::GET,
            "/".parse().unwrap(),
            http::HeaderMap::new(),
            Bytes::new(),
        )
    }

    fn context_with(handle: DeadlineHandle) -> Context {
        Context::new(IpAddr::V4(Ipv4Addr::LOCALHOST), handle)
    }

    #[test]
    fn test_spec_names() {
        assert_eq!(TimeoutSpec::backend().name(), "backendTimeout");
        assert_eq!(TimeoutSpec::read().name(), "readTimeout");
        assert_eq!(TimeoutSpec::write().name(), "writeTimeout");
    }

    #[test]
    fn test_create_from_string() {
        let spec = TimeoutSpec::backend();
        let filter = spec.create(&[FilterArg::Str("2s".into())]).unwrap();
        assert_eq!(filter.name(), "backendTimeout");

        let spec = TimeoutSpec::read();
        assert!(spec.create(&[FilterArg::Str("150ms".into())]).is_ok());
        assert!(spec.create(&[FilterArg::Str("1h".into())]).is_ok());
    }

    #[test]
    fn test_create_from_typed_duration() {
        let spec = TimeoutSpec::write();
        let filter = spec
            .create(&[FilterArg::Duration(Duration::from_millis(25))])
            .unwrap();
        assert_eq!(filter.name(), "writeTimeout");
    }

    #[test]
    fn test_create_rejects_wrong_arg_count() {
        let spec = TimeoutSpec::backend();

        let err = spec.create(&[]).unwrap_err();
        assert!(matches!(
            err,
            FilterError::InvalidArgCount {
                expected: 1,
                got: 0,
                ..
            }
        ));

        let err = spec
            .create(&[
                FilterArg::Str("1s".into()),
                FilterArg::Str("2s".into()),
            ])
            .unwrap_err();
        assert!(matches!(err, FilterError::InvalidArgCount { got: 2, .. }));
    }

    #[test]
    fn test_create_rejects_wrong_arg_type() {
        let spec = TimeoutSpec::backend();

        let err = spec.create(&[FilterArg::Int(2)]).unwrap_err();
        assert!(matches!(err, FilterError::InvalidArgType { .. }));

        let err = spec.create(&[FilterArg::Float(2.0)]).unwrap_err();
        assert!(matches!(err, FilterError::InvalidArgType { .. }));

        let err = spec.create(&[FilterArg::Bool(true)]).unwrap_err();
        assert!(matches!(err, FilterError::InvalidArgType { .. }));
    }

    #[test]
    fn test_create_rejects_malformed_string() {
        let spec = TimeoutSpec::backend();
        let err = spec.create(&[FilterArg::Str("abc".into())]).unwrap_err();
        match err {
            FilterError::DurationParse { value, .. } => assert_eq!(value, "abc"),
            other => panic!("expected DurationParse, got {:?}", other),
        }
    }

    #[test]
    fn test_create_rejects_zero_duration() {
        let spec = TimeoutSpec::backend();
        let err = spec.create(&[FilterArg::Str("0s".into())]).unwrap_err();
        assert!(matches!(err, FilterError::InvalidArgType { .. }));

        let err = spec
            .create(&[FilterArg::Duration(Duration::ZERO)])
            .unwrap_err();
        assert!(matches!(err, FilterError::InvalidArgType { .. }));
    }

    #[test]
    fn test_backend_timeout_fills_state_bag() {
        let spec = TimeoutSpec::backend();
        let filter = spec.create(&[FilterArg::Str("2s".into())]).unwrap();

        let mut ctx = context_with(DeadlineHandle::new());
        assert!(filter.on_request(test_request(), &mut ctx).is_next());

        // exact key identity and value type are part of the contract
        assert_eq!(
            ctx.get::<Duration>(BACKEND_TIMEOUT_KEY),
            Some(&Duration::from_secs(2))
        );
    }

    #[test]
    fn test_second_backend_timeout_overwrites() {
        let spec = TimeoutSpec::backend();
        let first = spec.create(&[FilterArg::Str("2s".into())]).unwrap();
        let second = spec.create(&[FilterArg::Str("5s".into())]).unwrap();

        let mut ctx = context_with(DeadlineHandle::new());
        let req = test_request();
        let req = first.on_request(req, &mut ctx).into_request().unwrap();
        second.on_request(req, &mut ctx);

        assert_eq!(
            ctx.get::<Duration>(BACKEND_TIMEOUT_KEY),
            Some(&Duration::from_secs(5))
        );
    }

    #[tokio::test]
    async fn test_read_timeout_installs_deadline() {
        let spec = TimeoutSpec::read();
        let filter = spec.create(&[FilterArg::Str("1s".into())]).unwrap();

        let handle = DeadlineHandle::new();
        let mut ctx = context_with(handle.clone());
        let before = Instant::now();
        filter.on_request(test_request(), &mut ctx);

        let deadline = handle.read_deadline().expect("deadline installed");
        assert!(deadline >= before + Duration::from_secs(1));
        assert!(deadline <= Instant::now() + Duration::from_secs(1));
        // write side untouched
        assert!(handle.write_deadline().is_none());
    }

    #[tokio::test]
    async fn test_write_timeout_installs_deadline() {
        let spec = TimeoutSpec::write();
        let filter = spec.create(&[FilterArg::Str("25ms".into())]).unwrap();

        let handle = DeadlineHandle::new();
        let mut ctx = context_with(handle.clone());
        filter.on_request(test_request(), &mut ctx);

        assert!(handle.write_deadline().is_some());
        assert!(handle.read_deadline().is_none());
    }

    #[tokio::test]
    async fn test_deadline_failure_degrades_gracefully() {
        let spec = TimeoutSpec::read();
        let filter = spec.create(&[FilterArg::Str("1s".into())]).unwrap();

        let handle = DeadlineHandle::new();
        handle.close();
        let mut ctx = context_with(handle.clone());

        // install fails, but the request still proceeds
        let result = filter.on_request(test_request(), &mut ctx);
        assert!(result.is_next());
        assert!(handle.read_deadline().is_none());
    }

    #[tokio::test]
    async fn test_repeated_invocation_is_idempotent() {
        let spec = TimeoutSpec::read();
        let filter = spec.create(&[FilterArg::Str("1s".into())]).unwrap();

        let handle = DeadlineHandle::new();
        let mut ctx = context_with(handle.clone());
        let req = test_request();
        let req = filter.on_request(req, &mut ctx).into_request().unwrap();
        let first = handle.read_deadline().unwrap();
        filter.on_request(req, &mut ctx);
        let second = handle.read_deadline().unwrap();
        assert!(second >= first);
    }

    #[test]
    fn test_filter_is_debuggable() {
        // trait objects must format in assertion failures
        let spec = TimeoutSpec::backend();
        let filter = spec.create(&[FilterArg::Str("2s".into())]).unwrap();
        let repr = format!("{:?}", filter);
        assert!(repr.contains("TimeoutFilter"));
        assert!(repr.contains("2s"));
    }

    #[test]
    fn test_response_hook_is_noop() {
        let spec = TimeoutSpec::backend();
        let filter = spec.create(&[FilterArg::Str("1s".into())]).unwrap();

        let mut ctx = context_with(DeadlineHandle::new());
        let res = crate::core::Response::ok("body");
        let res = filter.on_response(res, &mut ctx);
        assert_eq!(res.status(), http::StatusCode::OK);
        assert_eq!(res.body().as_ref(), b"body");
    }
}
