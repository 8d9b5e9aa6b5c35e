// # Flag Source Trait
//
// Defines the interface to the platform collaborator that reads and watches
// low-level reachability flags.
//
// ## Implementations
//
// - Linux rtnetlink: `reach-source-netlink` crate
// - In-process, scriptable: `reach_core::source::ManualFlagSource`
//
// ## Usage
//
// ```rust,ignore
// use reach_core::{FlagSource, Target};
// use std::sync::Arc;
//
// let source = /* FlagSource implementation */;
// let target = Target::any_host();
//
// // Read current flags
// let flags = source.fetch_flags(&target)?;
//
// // Watch for changes
// let handle = source.subscribe(&target, Arc::new(|flags| {
//     println!("flags changed: {}", flags);
// }))?;
//
// source.unsubscribe(handle);
// ```

use crate::config::SourceConfig;
use crate::error::Result;
use crate::flags::FlagSet;
use crate::target::Target;
use std::sync::Arc;

/// Callback invoked by a flag source with the new flags of a watched target
pub type FlagCallback = Arc<dyn Fn(FlagSet) + Send + Sync + 'static>;

/// Opaque token identifying one subscription within a flag source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionHandle(u64);

impl SubscriptionHandle {
    /// Create a handle from a source-chosen id
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The source-chosen id
    pub const fn id(self) -> u64 {
        self.0
    }
}

/// Trait for platform flag source implementations
///
/// This trait defines two core capabilities:
/// 1. **fetch_flags()**: Synchronously read the current flags for a target
/// 2. **subscribe()**: Deliver flag-change events for a target
///
/// # Thread Safety
///
/// Implementations must be thread-safe; monitors call them from whichever
/// thread invokes `start`/`stop`, and change events may be delivered on any
/// thread the source chooses.
///
/// # Delivery Rules
///
/// - `on_change` must never be invoked from within `subscribe` itself
/// - `unsubscribe` may be called from inside `on_change` and must not block
///   waiting for an in-progress callback to return
/// - After `unsubscribe` returns, the source should stop invoking the
///   callback; monitors discard late events regardless
/// - Sources must not retry failed fetches or subscriptions; report once
pub trait FlagSource: Send + Sync {
    /// Read the current flags for `target`
    ///
    /// This may block for a platform-defined, bounded time (e.g. host name
    /// resolution).
    ///
    /// # Returns
    ///
    /// - `Ok(FlagSet)`: The target's current flags
    /// - `Err(Error)`: If the flags could not be determined
    fn fetch_flags(&self, target: &Target) -> Result<FlagSet>;

    /// Start delivering flag-change events for `target` to `on_change`
    ///
    /// # Returns
    ///
    /// - `Ok(SubscriptionHandle)`: Handle to pass to `unsubscribe`
    /// - `Err(Error)`: If the watch could not be established
    fn subscribe(&self, target: &Target, on_change: FlagCallback) -> Result<SubscriptionHandle>;

    /// Stop a subscription
    ///
    /// Unknown or already-cancelled handles are ignored.
    fn unsubscribe(&self, handle: SubscriptionHandle);

    /// Whether this source can tell cellular from local transports
    ///
    /// Sources on platforms without a cellular radio concept return `false`;
    /// `IS_WWAN` is then never reported.
    fn supports_wwan_classification(&self) -> bool {
        true
    }

    /// Get the source name (for logging/debugging)
    fn source_name(&self) -> &'static str;
}

/// Helper trait for constructing flag sources from configuration
pub trait FlagSourceFactory: Send + Sync {
    /// Create a FlagSource instance from configuration
    ///
    /// Sources are shared between all monitors built from the same
    /// configuration, hence the `Arc`.
    fn create(&self, config: &SourceConfig) -> Result<Arc<dyn FlagSource>>;
}
