//! Core types for request/response handling.
//!
//! This module provides the fundamental types used throughout the filter
//! chain and the proxy executor:
//!
//! - [`Request`] - HTTP request abstraction
//! - [`Response`] - HTTP response abstraction with builder pattern
//! - [`Context`] - Per-request context: state bag and deadline capability
//! - [`DeadlineHandle`] - Read/write deadline control for a live connection
//! - [`Error`] - Request-time error types

mod context;
mod deadline;
mod error;
mod request;
mod response;

pub use context::{generate_request_id, Context};
pub use deadline::{DeadlineError, DeadlineHandle};
pub use error::{Error, Result};
pub use request::Request;
pub use response::{Response, ResponseBuilder};
