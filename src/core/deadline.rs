//! Read/write deadline control for a live connection.
//!
//! A [`DeadlineHandle`] is the capability handed to filters through the
//! request [`Context`](crate::core::Context). Setting a deadline stores an
//! absolute instant and returns immediately; nothing is scheduled. The
//! connection driver re-reads the current deadline before each I/O call and
//! wraps the call in `tokio::time::timeout_at`, so the timeout manifests
//! later as an ordinary failed read or write.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::time::Instant;

/// Failure to install a deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineError {
    /// The transport has detached (connection closed or handed off);
    /// deadlines can no longer be honored.
    ConnectionClosed,
}

impl fmt::Display for DeadlineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeadlineError::ConnectionClosed => {
                write!(f, "connection closed, deadline not installed")
            }
        }
    }
}

impl std::error::Error for DeadlineError {}

#[derive(Debug, Default)]
struct DeadlineState {
    read: Mutex<Option<Instant>>,
    write: Mutex<Option<Instant>>,
    closed: AtomicBool,
}

/// Cheap cloneable handle to a connection's read/write deadlines.
///
/// One handle exists per connection; the request task and the connection
/// driver share it. All operations are non-blocking.
#[derive(Debug, Clone, Default)]
pub struct DeadlineHandle {
    state: Arc<DeadlineState>,
}

impl DeadlineHandle {
    /// Create a handle for a fresh connection with no deadlines installed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install an absolute read deadline. Subsequent reads on the
    /// connection fail once `at` has passed. Overwrites any earlier
    /// read deadline.
    pub fn set_read_deadline(&self, at: Instant) -> Result<(), DeadlineError> {
        self.check_open()?;
        *self.state.read.lock().unwrap_or_else(|e| e.into_inner()) = Some(at);
        Ok(())
    }

    /// Install an absolute write deadline. Subsequent writes on the
    /// connection fail once `at` has passed. Overwrites any earlier
    /// write deadline.
    pub fn set_write_deadline(&self, at: Instant) -> Result<(), DeadlineError> {
        self.check_open()?;
        *self.state.write.lock().unwrap_or_else(|e| e.into_inner()) = Some(at);
        Ok(())
    }

    /// Current read deadline, if one is installed.
    pub fn read_deadline(&self) -> Option<Instant> {
        *self.state.read.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current write deadline, if one is installed.
    pub fn write_deadline(&self) -> Option<Instant> {
        *self.state.write.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Mark the transport as detached. Later install attempts fail with
    /// [`DeadlineError::ConnectionClosed`].
    pub fn close(&self) {
        self.state.closed.store(true, Ordering::Release);
    }

    fn check_open(&self) -> Result<(), DeadlineError> {
        if self.state.closed.load(Ordering::Acquire) {
            Err(DeadlineError::ConnectionClosed)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_install_and_read_back() {
        let handle = DeadlineHandle::new();
        assert_eq!(handle.read_deadline(), None);
        assert_eq!(handle.write_deadline(), None);

        let at = Instant::now() + Duration::from_millis(50);
        handle.set_read_deadline(at).unwrap();
        assert_eq!(handle.read_deadline(), Some(at));
        // write side untouched
        assert_eq!(handle.write_deadline(), None);
    }

    #[test]
    fn test_reinstall_overwrites() {
        let handle = DeadlineHandle::new();
        let first = Instant::now() + Duration::from_millis(10);
        let second = Instant::now() + Duration::from_secs(5);
        handle.set_read_deadline(first).unwrap();
        handle.set_read_deadline(second).unwrap();
        assert_eq!(handle.read_deadline(), Some(second));
    }

    #[test]
    fn test_closed_rejects_install() {
        let handle = DeadlineHandle::new();
        handle.close();
        let at = Instant::now() + Duration::from_secs(1);
        assert_eq!(
            handle.set_read_deadline(at),
            Err(DeadlineError::ConnectionClosed)
        );
        assert_eq!(
            handle.set_write_deadline(at),
            Err(DeadlineError::ConnectionClosed)
        );
    }

    #[test]
    fn test_clones_share_state() {
        let handle = DeadlineHandle::new();
        let other = handle.clone();
        let at = Instant::now() + Duration::from_secs(1);
        handle.set_write_deadline(at).unwrap();
        assert_eq!(other.write_deadline(), Some(at));
    }

    #[tokio::test(start_paused = true)]
    async fn test_install_does_not_block() {
        // the setter returns before the deadline can have any effect
        let handle = DeadlineHandle::new();
        let at = Instant::now() + Duration::from_secs(3600);
        let before = Instant::now();
        handle.set_read_deadline(at).unwrap();
        // no awaits happened, paused time cannot have advanced
        assert_eq!(Instant::now(), before);
    }
}
