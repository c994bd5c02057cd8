//! Per-request context for the filter chain.

use std::any::Any;
use std::cell::Cell;
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Instant;

use crate::core::DeadlineHandle;

/// Request context shared across filters and the proxy executor.
///
/// The context carries request-scoped data through the chain:
///
/// - the state bag, a typed key/value store filters use to pass values to
///   later stages of the same request (e.g. the backend timeout consumed
///   by the round-trip executor)
/// - the [`DeadlineHandle`] bound to the live connection
/// - identity and timing for logging
///
/// A context lives exactly as long as one request and is owned by that
/// request's task; filters themselves stay immutable and shared.
pub struct Context {
    /// Client IP address.
    pub client_ip: IpAddr,

    /// Short request ID for log correlation.
    pub request_id: String,

    /// Request start time.
    pub started_at: Instant,

    /// Deadline capability for the connection serving this request.
    deadline: DeadlineHandle,

    /// State bag: typed key/value storage scoped to this request.
    state: HashMap<&'static str, Box<dyn Any + Send + Sync>>,
}

impl Context {
    /// Create a new context for one request.
    pub fn new(client_ip: IpAddr, deadline: DeadlineHandle) -> Self {
        Self {
            client_ip,
            request_id: generate_request_id(),
            started_at: Instant::now(),
            deadline,
            state: HashMap::new(),
        }
    }

    /// The deadline capability for this request's connection.
    #[inline]
    pub fn deadline(&self) -> &DeadlineHandle {
        &self.deadline
    }

    /// Store a value in the state bag, overwriting any existing value
    /// under the same key.
    #[inline]
    pub fn set<T: Send + Sync + 'static>(&mut self, key: &'static str, value: T) {
        self.state.insert(key, Box::new(value));
    }

    /// Get a value from the state bag.
    #[inline]
    pub fn get<T: 'static>(&self, key: &str) -> Option<&T> {
        self.state.get(key).and_then(|v| v.downcast_ref())
    }

    /// Remove and return a value from the state bag.
    #[inline]
    pub fn remove<T: 'static>(&mut self, key: &str) -> Option<T> {
        self.state
            .remove(key)
            .and_then(|v| v.downcast().ok())
            .map(|b| *b)
    }

    /// Elapsed time since the request started.
    #[inline]
    pub fn elapsed(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }

    /// Elapsed time in milliseconds.
    #[inline]
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed().as_secs_f64() * 1000.0
    }
}

// ============================================================================
// Fast random ID generation with thread-local state
// ============================================================================

thread_local! {
    static RNG_STATE: Cell<u64> = Cell::new(init_rng_seed());
}

/// Initialize RNG seed from system entropy.
fn init_rng_seed() -> u64 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};
    use std::time::{SystemTime, UNIX_EPOCH};

    let state = RandomState::new();
    let mut hasher = state.build_hasher();
    hasher.write_u64(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64,
    );
    hasher.finish()
}

/// Fast random u64 using thread-local xorshift64.
#[inline]
fn rand_u64() -> u64 {
    RNG_STATE.with(|state| {
        let mut x = state.get();
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        state.set(x);
        x
    })
}

/// Generate a random request ID (16 hex chars).
pub fn generate_request_id() -> String {
    use std::fmt::Write;

    let mut id = String::with_capacity(16);
    let _ = write!(id, "{:016x}", rand_u64());
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    fn test_context() -> Context {
        Context::new(
            IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            DeadlineHandle::new(),
        )
    }

    #[test]
    fn test_context_new() {
        let ctx = test_context();
        assert_eq!(ctx.client_ip.to_string(), "127.0.0.1");
        assert_eq!(ctx.request_id.len(), 16);
    }

    #[test]
    fn test_state_bag() {
        let mut ctx = test_context();

        ctx.set("counter", 42u32);
        ctx.set("name", "api".to_string());

        assert_eq!(ctx.get::<u32>("counter"), Some(&42));
        assert_eq!(ctx.get::<String>("name"), Some(&"api".to_string()));
        assert_eq!(ctx.get::<u32>("missing"), None);

        // wrong type under a present key yields None, not a panic
        assert_eq!(ctx.get::<String>("counter"), None);

        let removed = ctx.remove::<u32>("counter");
        assert_eq!(removed, Some(42));
        assert_eq!(ctx.get::<u32>("counter"), None);
    }

    #[test]
    fn test_state_bag_overwrite() {
        let mut ctx = test_context();
        ctx.set("limit", Duration::from_secs(2));
        ctx.set("limit", Duration::from_secs(5));
        assert_eq!(ctx.get::<Duration>("limit"), Some(&Duration::from_secs(5)));
    }

    #[test]
    fn test_deadline_capability() {
        let handle = DeadlineHandle::new();
        let ctx = Context::new(IpAddr::V4(Ipv4Addr::LOCALHOST), handle.clone());

        let at = tokio::time::Instant::now() + Duration::from_secs(1);
        ctx.deadline().set_read_deadline(at).unwrap();
        // the connection-side handle observes the installed deadline
        assert_eq!(handle.read_deadline(), Some(at));
    }

    #[test]
    fn test_request_ids_differ() {
        assert_ne!(generate_request_id(), generate_request_id());
    }
}
