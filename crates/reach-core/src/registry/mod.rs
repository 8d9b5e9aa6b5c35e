//! Plugin-based flag source registry
//!
//! The registry allows flag sources to be registered dynamically at
//! runtime, avoiding hardcoded if-else chains.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use reach_core::registry::SourceRegistry;
//! use reach_core::config::SourceConfig;
//!
//! // Create a registry with the built-in manual source
//! let registry = SourceRegistry::with_builtin();
//!
//! // Register platform sources
//! reach_source_netlink::register(&registry);
//!
//! // Create a source from config
//! let source = registry.create_source(&SourceConfig::default())?;
//! ```

use crate::config::SourceConfig;
use crate::error::{Error, Result};
use crate::source::ManualFlagSourceFactory;
use crate::traits::{FlagSource, FlagSourceFactory};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Registry mapping source type names to factories
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct SourceRegistry {
    sources: RwLock<HashMap<String, Box<dyn FlagSourceFactory>>>,
}

impl SourceRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the sources shipped in this crate
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        registry.register_source("manual", Box::new(ManualFlagSourceFactory));
        registry
    }

    /// Register a flag source factory
    ///
    /// Registering an existing name replaces its factory.
    ///
    /// # Parameters
    ///
    /// - `name`: Source type name (e.g., "netlink", "manual")
    /// - `factory`: Factory object for creating source instances
    pub fn register_source(&self, name: impl Into<String>, factory: Box<dyn FlagSourceFactory>) {
        let mut sources = self.sources.write().unwrap_or_else(PoisonError::into_inner);
        sources.insert(name.into(), factory);
    }

    /// Create a flag source from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Arc<dyn FlagSource>)`: Created source instance
    /// - `Err(Error)`: If the source type is not registered or creation fails
    pub fn create_source(&self, config: &SourceConfig) -> Result<Arc<dyn FlagSource>> {
        config.validate()?;

        let source_type = config.type_name();
        let sources = self.sources.read().unwrap_or_else(PoisonError::into_inner);

        let factory = sources
            .get(source_type)
            .ok_or_else(|| Error::config(format!("Unknown flag source type: {}", source_type)))?;

        factory.create(config)
    }

    /// List all registered source types
    pub fn list_sources(&self) -> Vec<String> {
        let sources = self.sources.read().unwrap_or_else(PoisonError::into_inner);
        sources.keys().cloned().collect()
    }

    /// Check if a source type is registered
    pub fn has_source(&self, name: &str) -> bool {
        let sources = self.sources.read().unwrap_or_else(PoisonError::into_inner);
        sources.contains_key(name)
    }
}
