//! sluice: a filter-chain HTTP reverse proxy with per-phase request
//! timeouts.
//!
//! Routes match requests by path prefix and forward them to a backend.
//! Each route carries a chain of filters that run between parsing the
//! request head and executing the backend round trip. The built-in
//! timeout filters bound the three phases of a request:
//!
//! - `backendTimeout("2s")` caps the backend round trip (504 on expiry)
//! - `readTimeout("5s")` caps receipt of the client's request body
//!   (499 on expiry)
//! - `writeTimeout("10s")` caps delivery of the response (the connection
//!   is aborted on expiry)
//!
//! Filter arguments use the humantime duration grammar (`150ms`, `2s`,
//! `1h`). A malformed argument rejects the route at load time, never at
//! request time.
//!
//! # Example
//!
//! ```rust,ignore
//! use sluice::config::Config;
//! use sluice::filters::FilterRegistry;
//! use sluice::routing::RouteTable;
//! use sluice::Server;
//!
//! let config = Config::from_env()?;
//! let routes = RouteTable::build(defs, &FilterRegistry::with_builtin())?;
//! Server::new(config.server, routes).run().await?;
//! ```

pub mod config;
pub mod core;
pub mod filters;
pub mod listener;
pub mod logging;
pub mod proxy;
pub mod routing;
pub mod server;

pub use config::Config;
pub use server::Server;

/// Crate version, for startup logs.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");
