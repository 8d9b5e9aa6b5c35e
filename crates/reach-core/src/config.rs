//! Configuration types for the reachability system
//!
//! This module defines all configuration structures used throughout the crate.

use crate::bus::NotificationBus;
use crate::target::Target;
use serde::{Deserialize, Serialize};

/// Main configuration: one flag source, any number of targets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReachConfig {
    /// Flag source configuration
    #[serde(default)]
    pub source: SourceConfig,

    /// Targets to monitor
    pub targets: Vec<TargetConfig>,

    /// Monitor settings applied to every target
    #[serde(default)]
    pub monitor: MonitorConfig,
}

impl ReachConfig {
    /// Create a new configuration with defaults and no targets
    pub fn new() -> Self {
        Self {
            source: SourceConfig::default(),
            targets: Vec::new(),
            monitor: MonitorConfig::default(),
        }
    }

    /// Decode a configuration from JSON
    pub fn from_json(text: &str) -> Result<Self, crate::Error> {
        Ok(serde_json::from_str(text)?)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if !self.targets.iter().any(|t| t.enabled) {
            return Err(crate::Error::config("No enabled targets configured"));
        }

        for target in &self.targets {
            target.resolve()?;
        }

        self.source.validate()?;
        self.monitor.validate()?;

        Ok(())
    }

    /// Resolve every enabled target
    pub fn enabled_targets(&self) -> Result<Vec<Target>, crate::Error> {
        self.targets
            .iter()
            .filter(|t| t.enabled)
            .map(TargetConfig::resolve)
            .collect()
    }
}

impl Default for ReachConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-monitor delivery settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Deliver every flag-change event, even when the derived status is
    /// unchanged
    #[serde(default)]
    pub always_deliver: bool,

    /// Also publish on the bus when a direct handler is registered
    #[serde(default)]
    pub broadcast_with_handler: bool,

    /// Per-subscriber queue length of the notification bus
    ///
    /// Subscribers that fall further behind lose the oldest notifications.
    ///
    /// Default: 64 notifications
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,
}

impl MonitorConfig {
    /// Validate the monitor configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.bus_capacity == 0 {
            return Err(crate::Error::config("Bus capacity must be > 0"));
        }
        Ok(())
    }

    /// Enable or disable always-deliver
    pub fn with_always_deliver(mut self, always_deliver: bool) -> Self {
        self.always_deliver = always_deliver;
        self
    }

    /// Enable or disable bus publication alongside a direct handler
    pub fn with_broadcast_with_handler(mut self, enabled: bool) -> Self {
        self.broadcast_with_handler = enabled;
        self
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            always_deliver: false,
            broadcast_with_handler: false,
            bus_capacity: default_bus_capacity(),
        }
    }
}

fn default_bus_capacity() -> usize {
    NotificationBus::DEFAULT_CAPACITY
}

/// Flag source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    /// Linux rtnetlink source
    Netlink {
        /// Interval at which watched targets are re-evaluated even without a
        /// routing event (host name targets can change without one), in
        /// milliseconds
        #[serde(default = "default_refresh_interval_ms")]
        refresh_interval_ms: u64,
    },

    /// In-process source reporting fixed flags until changed
    Manual {
        /// Initial raw flag word
        #[serde(default)]
        flags: u32,
    },

    /// Custom flag source
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl SourceConfig {
    /// Validate the source configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            SourceConfig::Netlink { refresh_interval_ms } => {
                if *refresh_interval_ms == 0 {
                    return Err(crate::Error::config("Netlink refresh interval must be > 0"));
                }
                Ok(())
            }
            SourceConfig::Custom { factory, config } => {
                if factory.is_empty() {
                    return Err(crate::Error::config("Custom source factory cannot be empty"));
                }
                if config.is_null() {
                    return Err(crate::Error::config("Custom source config cannot be null"));
                }
                Ok(())
            }
            SourceConfig::Manual { .. } => Ok(()),
        }
    }

    /// Get the source type name
    pub fn type_name(&self) -> &str {
        match self {
            SourceConfig::Netlink { .. } => "netlink",
            SourceConfig::Manual { .. } => "manual",
            SourceConfig::Custom { factory, .. } => factory,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Netlink {
            refresh_interval_ms: default_refresh_interval_ms(),
        }
    }
}

fn default_refresh_interval_ms() -> u64 {
    30_000
}

/// One monitored target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Target string: `any`, `local`, a textual address, or a host name
    pub target: String,

    /// Whether this target is enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl TargetConfig {
    /// Create a new target configuration
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            enabled: true,
        }
    }

    /// Enable or disable the target
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Turn the target string into a [`Target`]
    pub fn resolve(&self) -> Result<Target, crate::Error> {
        Target::from_config(&self.target)
    }
}

fn default_enabled() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_json_defaults() {
        let config = ReachConfig::from_json(
            r#"{ "targets": [ { "target": "any" }, { "target": "8.8.8.8", "enabled": false } ] }"#,
        )
        .unwrap();

        assert!(matches!(config.source, SourceConfig::Netlink { refresh_interval_ms: 30_000 }));
        assert_eq!(config.monitor, MonitorConfig::default());
        assert_eq!(config.enabled_targets().unwrap(), vec![Target::AnyHost]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_empty_targets() {
        let mut config = ReachConfig::new();
        assert!(config.validate().is_err());

        config.targets.push(TargetConfig::new("local").with_enabled(false));
        assert!(config.validate().is_err());

        config.targets.push(TargetConfig::new("example.test"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        let mut config = ReachConfig::new();
        config.targets.push(TargetConfig::new("any"));

        config.monitor.bus_capacity = 0;
        assert!(config.validate().is_err());

        config.monitor.bus_capacity = 8;
        config.source = SourceConfig::Netlink { refresh_interval_ms: 0 };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_source_type_names() {
        let manual: SourceConfig = serde_json::from_str(r#"{ "type": "manual", "flags": 2 }"#).unwrap();
        assert_eq!(manual.type_name(), "manual");

        let custom = SourceConfig::Custom {
            factory: "scutil".to_string(),
            config: serde_json::json!({ "verbose": true }),
        };
        assert_eq!(custom.type_name(), "scutil");
        assert!(custom.validate().is_ok());
    }
}
