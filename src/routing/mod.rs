//! Route table: path-prefix matching to a backend and its filter chain.

use http::Uri;

use crate::config::{ConfigError, RouteDef};
use crate::filters::{FilterChain, FilterError, FilterRegistry};

/// One constructed route.
///
/// Built once at configuration load; afterwards shared read-only by every
/// request, so it carries no mutable state.
#[derive(Debug)]
pub struct Route {
    /// Route name for logs.
    pub name: String,
    /// Matched path prefix.
    pub path_prefix: String,
    /// Backend base URI (scheme + authority).
    pub backend: Uri,
    /// Filters in configured order.
    pub chain: FilterChain,
}

/// All routes, longest prefix first.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// An empty table: every request misses.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Construct every route's chain up front. Any filter error rejects
    /// the whole load so a half-broken route set never serves traffic.
    pub fn build(defs: Vec<RouteDef>, registry: &FilterRegistry) -> Result<Self, ConfigError> {
        let mut routes = Vec::with_capacity(defs.len());

        for def in defs {
            let backend: Uri = def.backend.parse().map_err(|_| ConfigError::Invalid {
                key: format!("routes.{}.backend", def.name),
                message: format!("invalid backend URI: {}", def.backend),
            })?;
            if backend.scheme().is_none() || backend.authority().is_none() {
                return Err(ConfigError::Invalid {
                    key: format!("routes.{}.backend", def.name),
                    message: "backend URI needs scheme and authority".to_string(),
                });
            }

            let mut chain = FilterChain::new();
            for filter_def in &def.filters {
                let args = filter_def.filter_args()?;
                let filter = registry
                    .instantiate(&filter_def.name, &args)
                    .map_err(|source| Self::route_error(&def.name, source))?;
                chain = chain.add(filter);
            }

            tracing::debug!(
                route = %def.name,
                prefix = %def.path_prefix,
                backend = %backend,
                filters = ?chain.names(),
                "route constructed"
            );

            routes.push(Route {
                name: def.name,
                path_prefix: def.path_prefix,
                backend,
                chain,
            });
        }

        // Longest prefix first so lookup can take the first hit.
        routes.sort_by(|a, b| b.path_prefix.len().cmp(&a.path_prefix.len()));

        Ok(Self { routes })
    }

    fn route_error(route: &str, source: FilterError) -> ConfigError {
        ConfigError::Route {
            route: route.to_string(),
            source,
        }
    }

    /// Find the route for a request path.
    pub fn match_route(&self, path: &str) -> Option<&Route> {
        self.routes
            .iter()
            .find(|r| path.starts_with(&r.path_prefix))
    }

    /// Number of routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
