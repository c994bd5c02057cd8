//! Registry of available filter specs.

use std::collections::HashMap;
use std::sync::Arc;

use super::timeout::TimeoutSpec;
use super::{Filter, FilterArg, FilterError, FilterSpec};

/// Name → spec lookup used when routes are constructed.
///
/// Built once at startup and read-only afterwards; route loading consults
/// it for every configured filter occurrence.
pub struct FilterRegistry {
    specs: HashMap<&'static str, Box<dyn FilterSpec>>,
}

impl FilterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            specs: HashMap::new(),
        }
    }

    /// Create a registry with all built-in filters registered.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(TimeoutSpec::backend()));
        registry.register(Box::new(TimeoutSpec::read()));
        registry.register(Box::new(TimeoutSpec::write()));
        registry
    }

    /// Register a spec under its canonical name.
    pub fn register(&mut self, spec: Box<dyn FilterSpec>) {
        tracing::debug!(filter = spec.name(), "registered filter spec");
        self.specs.insert(spec.name(), spec);
    }

    /// Names of all registered specs.
    pub fn names(&self) -> Vec<&'static str> {
        self.specs.keys().copied().collect()
    }

    /// Construct a filter instance by name.
    ///
    /// Runs at route load time; any error here must reject the route.
    pub fn instantiate(
        &self,
        name: &str,
        args: &[FilterArg],
    ) -> Result<Arc<dyn Filter>, FilterError> {
        match self.specs.get(name) {
            Some(spec) => spec.create(args),
            None => Err(FilterError::UnknownFilter(name.to_string())),
        }
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_filters_registered() {
        let registry = FilterRegistry::with_builtin();
        let mut names = registry.names();
        names.sort_unstable();
        assert_eq!(names, vec!["backendTimeout", "readTimeout", "writeTimeout"]);
    }

    #[test]
    fn test_instantiate_by_name() {
        let registry = FilterRegistry::with_builtin();
        let filter = registry
            .instantiate("backendTimeout", &[FilterArg::Str("2s".into())])
            .unwrap();
        assert_eq!(filter.name(), "backendTimeout");
    }

    #[test]
    fn test_unknown_filter() {
        let registry = FilterRegistry::with_builtin();
        let err = registry.instantiate("gzip", &[]).unwrap_err();
        assert!(matches!(err, FilterError::UnknownFilter(name) if name == "gzip"));
    }
}
