//! Reachability monitor
//!
//! The ReachabilityMonitor is responsible for:
//! - Answering synchronous status queries for its target
//! - Subscribing to flag changes via a FlagSource
//! - Classifying every captured FlagSet
//! - Delivering status changes to a handler and/or the NotificationBus
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐
//! │ FlagSource  │─── FlagSet ───┐
//! └─────────────┘               │
//!                               ▼
//!                  ┌──────────────────────┐
//!                  │ ReachabilityMonitor  │── classify()
//!                  └──────────────────────┘
//!                               │
//!               ┌───────────────┴───────────────┐
//!               ▼                               ▼
//!       ┌──────────────┐              ┌──────────────────┐
//!       │   Handler    │              │ NotificationBus  │
//!       │  (callback)  │              │   (broadcast)    │
//!       └──────────────┘              └──────────────────┘
//! ```
//!
//! ## Lifecycle
//!
//! `Idle` → `start_*` → `Watching` → `stop_monitoring` (or drop) → `Idle`.
//! Starting a watching monitor fails with `Error::AlreadyWatching`; stopping
//! an idle one is a no-op.
//!
//! ## Ordering and Cancellation
//!
//! - The initial status is delivered from within `start_*`, before it
//!   returns and before any change-driven delivery.
//! - Every subscription carries a generation number. Events from an older
//!   generation, or arriving while idle, are discarded.
//! - `stop_monitoring` waits for an in-flight delivery on another thread to
//!   finish, so no handler runs after it returns. Calling it (or `start_*`)
//!   from inside a handler is allowed.

use crate::bus::{NotificationBus, StatusNotification};
use crate::config::MonitorConfig;
use crate::error::{Error, Result};
use crate::flags::FlagSet;
use crate::status::{ReachabilityStatus, classify};
use crate::target::Target;
use crate::traits::{FlagCallback, FlagSource, SubscriptionHandle};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, ThreadId};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};

static NEXT_MONITOR_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MonitorId(u64);

impl MonitorId {
    pub(crate) fn next() -> Self {
        Self(NEXT_MONITOR_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for MonitorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "monitor-{}", self.0)
    }
}

/// Callback receiving every delivered status
pub type StatusHandler = Arc<dyn Fn(ReachabilityStatus) + Send + Sync + 'static>;

/// Watches one target and reports its reachability
///
/// # Example
///
/// ```rust,no_run
/// use reach_core::{FlagSet, ManualFlagSource, ReachabilityMonitor};
/// use std::sync::Arc;
///
/// let source = ManualFlagSource::new(FlagSet::REACHABLE | FlagSet::IS_DIRECT);
/// let monitor = ReachabilityMonitor::for_address("8.8.8.8", Arc::new(source.clone()))?;
///
/// monitor.start_monitoring(|status| println!("8.8.8.8 is {}", status))?;
/// source.set_flags(FlagSet::empty()); // prints "8.8.8.8 is not reachable"
/// monitor.stop_monitoring();
/// # Ok::<(), reach_core::Error>(())
/// ```
pub struct ReachabilityMonitor {
    /// Platform collaborator
    source: Arc<dyn FlagSource>,

    /// State shared with subscription callbacks
    inner: Arc<Inner>,
}

struct Inner {
    id: MonitorId,
    target: Target,
    source_name: &'static str,
    bus: NotificationBus,
    config: MonitorConfig,

    /// Small state block; never held while calling out
    state: Mutex<MonitorState>,

    /// Serializes lifecycle transitions and deliveries
    dispatch: Mutex<()>,
}

#[derive(Default)]
struct MonitorState {
    watching: bool,
    generation: u64,
    last_flags: Option<FlagSet>,
    last_status: Option<ReachabilityStatus>,
    handler: Option<StatusHandler>,
    broadcast: bool,
    subscription: Option<SubscriptionHandle>,

    /// Thread currently running a delivery while holding `dispatch`
    dispatch_thread: Option<ThreadId>,
}

/// Builder for monitors with a shared bus or non-default settings
pub struct MonitorBuilder {
    target: Target,
    source: Arc<dyn FlagSource>,
    bus: Option<NotificationBus>,
    config: MonitorConfig,
}

impl MonitorBuilder {
    /// Publish on `bus` instead of a private bus
    pub fn bus(mut self, bus: NotificationBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Use `config` for delivery settings
    pub fn config(mut self, config: MonitorConfig) -> Self {
        self.config = config;
        self
    }

    /// Deliver every flag change even when the status is unchanged
    pub fn always_deliver(mut self, always_deliver: bool) -> Self {
        self.config.always_deliver = always_deliver;
        self
    }

    /// Build the monitor (idle)
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the monitor configuration is invalid.
    pub fn build(self) -> Result<ReachabilityMonitor> {
        self.config.validate()?;

        let bus = self
            .bus
            .unwrap_or_else(|| NotificationBus::new(self.config.bus_capacity));

        Ok(ReachabilityMonitor::assemble(self.target, self.source, bus, self.config))
    }
}

impl ReachabilityMonitor {
    /// Create an idle monitor with default settings and a private bus
    pub fn new(target: Target, source: Arc<dyn FlagSource>) -> Self {
        let config = MonitorConfig::default();
        let bus = NotificationBus::new(config.bus_capacity);
        Self::assemble(target, source, bus, config)
    }

    fn assemble(
        target: Target,
        source: Arc<dyn FlagSource>,
        bus: NotificationBus,
        config: MonitorConfig,
    ) -> Self {
        let inner = Inner {
            id: MonitorId::next(),
            target,
            source_name: source.source_name(),
            bus,
            config,
            state: Mutex::new(MonitorState::default()),
            dispatch: Mutex::new(()),
        };

        debug!(monitor = %inner.id, target = %inner.target, source = inner.source_name, "Monitor created");

        Self {
            source,
            inner: Arc::new(inner),
        }
    }

    /// Start building a monitor
    pub fn builder(target: Target, source: Arc<dyn FlagSource>) -> MonitorBuilder {
        MonitorBuilder {
            target,
            source,
            bus: None,
            config: MonitorConfig::default(),
        }
    }

    /// Monitor a host name
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHostName` for an empty name.
    pub fn for_host_name(name: &str, source: Arc<dyn FlagSource>) -> Result<Self> {
        Ok(Self::new(Target::host_name(name)?, source))
    }

    /// Monitor an IPv4 address
    pub fn for_ipv4(addr: impl Into<Ipv4Addr>, source: Arc<dyn FlagSource>) -> Self {
        Self::new(Target::ipv4(addr), source)
    }

    /// Monitor an IPv6 address
    pub fn for_ipv6(addr: impl Into<Ipv6Addr>, source: Arc<dyn FlagSource>) -> Self {
        Self::new(Target::ipv6(addr), source)
    }

    /// Monitor a textual IPv4 or IPv6 address
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidAddress` if `text` is not an address; no
    /// monitor is created.
    pub fn for_address(text: &str, source: Arc<dyn FlagSource>) -> Result<Self> {
        Ok(Self::new(Target::parse(text)?, source))
    }

    /// Monitor general internet reachability
    pub fn for_internet_connection(source: Arc<dyn FlagSource>) -> Self {
        Self::new(Target::any_host(), source)
    }

    /// Monitor local WiFi/LAN reachability
    pub fn for_local_wifi(source: Arc<dyn FlagSource>) -> Self {
        Self::new(Target::local_wifi(), source)
    }

    /// This monitor's identity (the bus key)
    pub fn id(&self) -> MonitorId {
        self.inner.id
    }

    /// The watched target
    pub fn target(&self) -> &Target {
        &self.inner.target
    }

    /// The bus this monitor publishes on
    pub fn bus(&self) -> &NotificationBus {
        &self.inner.bus
    }

    /// Receive this monitor's bus notifications
    pub fn subscribe(&self) -> broadcast::Receiver<StatusNotification> {
        self.inner.bus.subscribe(self.inner.id)
    }

    /// [`subscribe`](Self::subscribe) as a `Stream`
    pub fn stream(&self) -> BroadcastStream<StatusNotification> {
        self.inner.bus.stream(self.inner.id)
    }

    /// Whether the monitor is watching
    pub fn is_watching(&self) -> bool {
        self.inner.state().watching
    }

    /// Whether WWAN and WiFi can be told apart on this platform
    pub fn supports_wwan_classification(&self) -> bool {
        self.source.supports_wwan_classification()
    }

    /// Begin watching, delivering the current status and every change to
    /// `handler`
    ///
    /// The initial status is delivered before this returns. With
    /// `broadcast_with_handler` configured, deliveries are also published
    /// on the bus.
    ///
    /// # Errors
    ///
    /// - `Error::AlreadyWatching` if the monitor is already watching
    /// - `Error::SubscriptionFailed` if the source cannot watch the target;
    ///   the monitor stays idle and `handler` is never called
    pub fn start_monitoring<F>(&self, handler: F) -> Result<ReachabilityStatus>
    where
        F: Fn(ReachabilityStatus) + Send + Sync + 'static,
    {
        let broadcast = self.inner.config.broadcast_with_handler;
        self.start(Some(Arc::new(handler)), broadcast)
    }

    /// Begin watching, publishing the current status and every change on
    /// the bus under this monitor's id
    ///
    /// # Errors
    ///
    /// Same as [`start_monitoring`](Self::start_monitoring).
    pub fn start_monitoring_with_broadcast(&self) -> Result<ReachabilityStatus> {
        self.start(None, true)
    }

    fn start(&self, handler: Option<StatusHandler>, broadcast: bool) -> Result<ReachabilityStatus> {
        let inner = &self.inner;
        let _dispatch = inner.enter_dispatch();

        let generation = {
            let mut state = inner.state();
            if state.watching {
                return Err(Error::AlreadyWatching(inner.id));
            }
            state.generation += 1;
            state.generation
        };

        let weak: Weak<Inner> = Arc::downgrade(inner);
        let on_change: FlagCallback = Arc::new(move |flags| {
            if let Some(inner) = weak.upgrade() {
                inner.on_flags_changed(generation, flags);
            }
        });

        let subscription = self
            .source
            .subscribe(&inner.target, on_change)
            .map_err(|e| e.into_subscription_failed(inner.source_name))?;

        let flags = match self.source.fetch_flags(&inner.target) {
            Ok(flags) => Some(flags),
            Err(e) => {
                warn!(monitor = %inner.id, target = %inner.target, "Initial flag fetch failed: {}", e);
                None
            }
        };
        let status = flags.map_or(ReachabilityStatus::NotReachable, |f| inner.classify(f));

        {
            let mut state = inner.state();
            state.watching = true;
            state.handler = handler.clone();
            state.broadcast = broadcast;
            state.subscription = Some(subscription);
            state.last_flags = flags;
            state.last_status = Some(status);
        }

        info!(
            monitor = %inner.id,
            target = %inner.target,
            %status,
            broadcast,
            "Started monitoring"
        );

        inner.deliver(generation, handler, broadcast, status, flags);
        Ok(status)
    }

    /// Stop watching
    ///
    /// Idempotent. After this returns no handler invocation or bus
    /// publication happens for the stopped watch, even for events that
    /// were already in flight.
    pub fn stop_monitoring(&self) {
        let inner = &self.inner;

        let subscription = {
            let _dispatch = inner.enter_dispatch();
            let mut state = inner.state();
            if !state.watching {
                return;
            }
            state.watching = false;
            state.generation += 1;
            state.handler = None;
            state.broadcast = false;
            state.subscription.take()
        };

        if let Some(handle) = subscription {
            self.source.unsubscribe(handle);
        }

        info!(monitor = %inner.id, target = %inner.target, "Stopped monitoring");
    }

    /// Current status of the target
    ///
    /// While watching this classifies the last captured flags; otherwise it
    /// performs a one-shot fetch. A failed fetch yields `NotReachable`.
    pub fn current_status(&self) -> ReachabilityStatus {
        self.try_current_status().unwrap_or_else(|e| {
            debug!(monitor = %self.inner.id, "Status query failed, reporting not reachable: {}", e);
            ReachabilityStatus::NotReachable
        })
    }

    /// [`current_status`](Self::current_status), surfacing fetch failures
    ///
    /// # Errors
    ///
    /// Returns `Error::FetchFailed` if a one-shot fetch was needed and
    /// failed.
    pub fn try_current_status(&self) -> Result<ReachabilityStatus> {
        Ok(self.inner.classify(self.try_raw_flags()?))
    }

    /// Whether the target is reachable at all
    pub fn is_reachable(&self) -> bool {
        self.current_status().is_reachable()
    }

    /// Whether the target is reachable over WiFi/LAN
    pub fn is_reachable_via_wifi(&self) -> bool {
        self.current_status().is_reachable_via_wifi()
    }

    /// Whether the target is reachable over WWAN
    ///
    /// Always `false` when the source cannot classify WWAN transports.
    pub fn is_reachable_via_wwan(&self) -> bool {
        self.supports_wwan_classification() && self.current_status().is_reachable_via_wwan()
    }

    /// Raw flags, for diagnostics
    ///
    /// The empty set if the flags cannot be read.
    pub fn raw_flags(&self) -> FlagSet {
        self.try_raw_flags().unwrap_or_default()
    }

    /// [`raw_flags`](Self::raw_flags), surfacing fetch failures
    ///
    /// # Errors
    ///
    /// Returns `Error::FetchFailed` if a one-shot fetch was needed and
    /// failed.
    pub fn try_raw_flags(&self) -> Result<FlagSet> {
        let captured = {
            let state = self.inner.state();
            if state.watching { state.last_flags } else { None }
        };

        match captured {
            Some(flags) => Ok(flags),
            None => self
                .source
                .fetch_flags(&self.inner.target)
                .map_err(|e| e.into_fetch_failed(self.inner.source_name)),
        }
    }
}

impl Drop for ReachabilityMonitor {
    fn drop(&mut self) {
        self.stop_monitoring();
        self.inner.bus.remove(self.inner.id);
    }
}

impl fmt::Debug for ReachabilityMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReachabilityMonitor")
            .field("id", &self.inner.id)
            .field("target", &self.inner.target)
            .field("source", &self.inner.source_name)
            .field("watching", &self.is_watching())
            .finish()
    }
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn classify(&self, flags: FlagSet) -> ReachabilityStatus {
        classify(flags, self.target.is_local_wifi())
    }

    /// Take the dispatch lock unless this thread already holds it
    /// (re-entry from a handler)
    fn enter_dispatch(&self) -> Option<MutexGuard<'_, ()>> {
        let current = thread::current().id();
        if self.state().dispatch_thread == Some(current) {
            return None;
        }
        Some(self.dispatch.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn on_flags_changed(&self, generation: u64, flags: FlagSet) {
        let _dispatch = self.enter_dispatch();

        let (handler, broadcast, status) = {
            let mut state = self.state();
            if !state.watching || state.generation != generation {
                debug!(monitor = %self.id, %flags, "Discarding stale flag change");
                return;
            }

            let status = self.classify(flags);
            let previous = state.last_status.replace(status);
            state.last_flags = Some(flags);

            if previous == Some(status) && !self.config.always_deliver {
                debug!(monitor = %self.id, %flags, %status, "Flags changed, status unchanged");
                return;
            }

            (state.handler.clone(), state.broadcast, status)
        };

        debug!(monitor = %self.id, target = %self.target, %flags, %status, "Reachability changed");
        self.deliver(generation, handler, broadcast, status, Some(flags));
    }

    /// Run delivery with the dispatch lock held by the caller
    fn deliver(
        &self,
        generation: u64,
        handler: Option<StatusHandler>,
        broadcast: bool,
        status: ReachabilityStatus,
        flags: Option<FlagSet>,
    ) {
        let _scope = DispatchScope::enter(self);

        if let Some(handler) = handler {
            handler(status);
        }

        // The handler may have stopped the monitor.
        if broadcast && self.state().generation == generation {
            let notification =
                StatusNotification::new(self.id, self.target.clone(), status, flags);
            if self.bus.publish(notification) == 0 {
                debug!(monitor = %self.id, %status, "No bus subscribers");
            }
        }
    }
}

/// Marks the current thread as the dispatching one for the scope's lifetime
struct DispatchScope<'a> {
    inner: &'a Inner,
    previous: Option<ThreadId>,
}

impl<'a> DispatchScope<'a> {
    fn enter(inner: &'a Inner) -> Self {
        let previous = inner.state().dispatch_thread.replace(thread::current().id());
        Self { inner, previous }
    }
}

impl Drop for DispatchScope<'_> {
    fn drop(&mut self) {
        self.inner.state().dispatch_thread = self.previous;
    }
}
