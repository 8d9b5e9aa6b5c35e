// # reach-core
//
// Core library for event-driven network reachability monitoring.
//
// ## Architecture Overview
//
// This library turns low-level, platform-reported reachability flags into a
// small application-level status and keeps that status fresh:
// - **FlagSet**: Bitset of platform-reported reachability attributes
// - **classify**: Pure mapping from a FlagSet to a ReachabilityStatus
// - **Target**: What is being watched (host name, address, or sentinel)
// - **FlagSource**: Trait for the platform collaborator (fetch + subscribe)
// - **ReachabilityMonitor**: Watch lifecycle and change dispatch
// - **NotificationBus**: Typed publish point keyed by monitor identity
// - **SourceRegistry**: Plugin-based registry for flag sources
//
// ## Design Principles
//
// 1. **Pure core**: Classification has no state and performs no I/O
// 2. **Plugin-Based**: Platform flag acquisition lives behind `FlagSource`
// 3. **Serialized lifecycle**: Each monitor serializes its own transitions
// 4. **No stale delivery**: Nothing reaches a handler after `stop` returns
// 5. **No retry policy**: Failures are reported once; callers decide

pub mod bus;
pub mod config;
pub mod error;
pub mod flags;
pub mod monitor;
pub mod registry;
pub mod source;
pub mod status;
pub mod target;
pub mod traits;

// Re-export core types for convenience
pub use bus::{NotificationBus, StatusNotification};
pub use config::{MonitorConfig, ReachConfig, SourceConfig, TargetConfig};
pub use error::{Error, Result};
pub use flags::FlagSet;
pub use monitor::{MonitorBuilder, MonitorId, ReachabilityMonitor, StatusHandler};
pub use registry::SourceRegistry;
pub use source::ManualFlagSource;
pub use status::{ReachabilityStatus, classify};
pub use target::Target;
pub use traits::{FlagCallback, FlagSource, FlagSourceFactory, SubscriptionHandle};
