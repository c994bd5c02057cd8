//! Filter chain for composing the filters of one route.

use std::sync::Arc;

use super::{Filter, FilterResult};
use crate::core::{Context, Request, Response};

/// The filters of a route, in configured order.
///
/// Request hooks run first-to-last, response hooks last-to-first. Order is
/// positional: it matters for overwrite semantics (a later backendTimeout
/// wins over an earlier one), so the chain never reorders filters.
///
/// A chain is built once at route load time and then shared read-only by
/// every request matching the route.
#[derive(Debug, Default)]
pub struct FilterChain {
    filters: Vec<Arc<dyn Filter>>,
}

impl FilterChain {
    /// Create a new empty chain.
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
        }
    }

    /// Append a filter to the chain.
    pub fn add(mut self, filter: Arc<dyn Filter>) -> Self {
        self.filters.push(filter);
        self
    }

    /// Number of filters in the chain.
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Check if the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Filter names in execution order.
    pub fn names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    /// Run all request hooks.
    ///
    /// Returns `FilterResult::Next(req)` if every filter passed, or
    /// `FilterResult::Stop(res)` if one short-circuited.
    pub fn run_request(&self, mut req: Request, ctx: &mut Context) -> FilterResult {
        for filter in &self.filters {
            match filter.on_request(req, ctx) {
                FilterResult::Next(r) => req = r,
                FilterResult::Stop(res) => {
                    tracing::debug!(
                        filter = filter.name(),
                        status = %res.status(),
                        "filter short-circuited request"
                    );
                    return FilterResult::Stop(res);
                }
            }
        }
        FilterResult::Next(req)
    }

    /// Run all response hooks, in reverse order.
    pub fn run_response(&self, mut res: Response, ctx: &mut Context) -> Response {
        for filter in self.filters.iter().rev() {
            res = filter.on_response(res, ctx);
        }
        res
    }
}

impl Clone for FilterChain {
    fn clone(&self) -> Self {
        Self {
            filters: self.filters.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DeadlineHandle;
    use bytes::Bytes;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct Recorder {
        name: &'static str,
        requests: AtomicU32,
        responses: AtomicU32,
    }

    impl Recorder {
        fn new(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                requests: AtomicU32::new(0),
                responses: AtomicU32::new(0),
            })
        }
    }

    impl Filter for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        fn on_request(&self, req: Request, _ctx: &mut Context) -> FilterResult {
            self.requests.fetch_add(1, Ordering::SeqCst);
            FilterResult::Next(req)
        }

        fn on_response(&self, res: Response, _ctx: &mut Context) -> Response {
            self.responses.fetch_add(1, Ordering::SeqCst);
            res
        }
    }

    #[derive(Debug)]
    struct Blocker;

    impl Filter for Blocker {
        fn name(&self) -> &'static str {
            "blocker"
        }

        fn on_request(&self, _req: Request, _ctx: &mut Context) -> FilterResult {
            FilterResult::Stop(Response::not_found())
        }
    }

    fn test_request() -> Request {
        Request::new(
            http::Method::GET,
            "/test".parse().unwrap(),
            http::HeaderMap::new(),
            Bytes::new(),
        )
    }

    fn test_context() -> Context {
        Context::new(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            DeadlineHandle::new(),
        )
    }

    #[test]
    fn test_empty_chain_passes() {
        let chain = FilterChain::new();
        assert!(chain.is_empty());
        let mut ctx = test_context();
        assert!(chain.run_request(test_request(), &mut ctx).is_next());
    }

    #[test]
    fn test_configured_order_preserved() {
        let chain = FilterChain::new()
            .add(Recorder::new("first"))
            .add(Recorder::new("second"))
            .add(Recorder::new("third"));
        assert_eq!(chain.names(), vec!["first", "second", "third"]);
        assert_eq!(chain.len(), 3);
    }

    #[test]
    fn test_all_hooks_run() {
        let a = Recorder::new("a");
        let b = Recorder::new("b");
        let chain = FilterChain::new().add(a.clone()).add(b.clone());

        let mut ctx = test_context();
        let result = chain.run_request(test_request(), &mut ctx);
        assert!(result.is_next());
        chain.run_response(Response::ok(""), &mut ctx);

        assert_eq!(a.requests.load(Ordering::SeqCst), 1);
        assert_eq!(b.requests.load(Ordering::SeqCst), 1);
        assert_eq!(a.responses.load(Ordering::SeqCst), 1);
        assert_eq!(b.responses.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_short_circuit_skips_later_filters() {
        let late = Recorder::new("late");
        let chain = FilterChain::new().add(Arc::new(Blocker)).add(late.clone());

        let mut ctx = test_context();
        let result = chain.run_request(test_request(), &mut ctx);
        assert!(result.is_stop());
        assert_eq!(late.requests.load(Ordering::SeqCst), 0);
    }
}
