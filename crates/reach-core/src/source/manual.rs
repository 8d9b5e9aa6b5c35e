// # Manual Flag Source
//
// In-process implementation of FlagSource.
//
// ## Purpose
//
// Reports whatever flags the embedding application sets, and delivers a
// change event to every matching subscriber when they change. Useful for
// testing, for applications that learn about connectivity through their own
// channels, and for running the daemon without platform support.
//
// ## Failure Injection
//
// `fail_fetches` and `fail_subscriptions` make the next calls fail until
// cleared, so callers can exercise their error paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::Error;
use crate::config::SourceConfig;
use crate::flags::FlagSet;
use crate::target::Target;
use crate::traits::{FlagCallback, FlagSource, FlagSourceFactory, SubscriptionHandle};

/// In-memory, scriptable flag source
///
/// Flags are kept per target, falling back to a default for targets without
/// an override. Change events are delivered synchronously on the thread that
/// changes the flags.
///
/// # Example
///
/// ```rust,no_run
/// use reach_core::{FlagSet, ManualFlagSource, ReachabilityMonitor, ReachabilityStatus};
/// use std::sync::Arc;
///
/// let source = ManualFlagSource::new(FlagSet::REACHABLE);
/// let monitor = ReachabilityMonitor::for_internet_connection(Arc::new(source.clone()));
///
/// assert_eq!(monitor.current_status(), ReachabilityStatus::ReachableViaWifi);
///
/// source.set_flags(FlagSet::empty());
/// assert_eq!(monitor.current_status(), ReachabilityStatus::NotReachable);
/// ```
#[derive(Clone, Default)]
pub struct ManualFlagSource {
    inner: Arc<ManualInner>,
}

#[derive(Default)]
struct ManualInner {
    state: Mutex<ManualState>,
    next_handle: AtomicU64,
    fetch_calls: AtomicUsize,
    subscribe_calls: AtomicUsize,
    unsubscribe_calls: AtomicUsize,
}

struct ManualState {
    default_flags: FlagSet,
    overrides: HashMap<Target, FlagSet>,
    subscribers: HashMap<SubscriptionHandle, (Target, FlagCallback)>,
    fetch_failure: Option<String>,
    subscribe_failure: Option<String>,
    supports_wwan: bool,
}

impl Default for ManualState {
    fn default() -> Self {
        Self {
            default_flags: FlagSet::empty(),
            overrides: HashMap::new(),
            subscribers: HashMap::new(),
            fetch_failure: None,
            subscribe_failure: None,
            supports_wwan: true,
        }
    }
}

impl ManualFlagSource {
    /// Create a source reporting `flags` for every target
    pub fn new(flags: FlagSet) -> Self {
        let source = Self::default();
        source.state().default_flags = flags;
        source
    }

    /// Set the default flags and notify subscribers of targets without an
    /// override
    pub fn set_flags(&self, flags: FlagSet) {
        let callbacks = {
            let mut state = self.state();
            state.default_flags = flags;
            let overrides = &state.overrides;
            state
                .subscribers
                .values()
                .filter(|(target, _)| !overrides.contains_key(target))
                .map(|(_, callback)| Arc::clone(callback))
                .collect::<Vec<_>>()
        };
        Self::notify(callbacks, flags);
    }

    /// Set the flags of one target and notify its subscribers
    pub fn set_target_flags(&self, target: &Target, flags: FlagSet) {
        let callbacks = {
            let mut state = self.state();
            state.overrides.insert(target.clone(), flags);
            Self::callbacks_for(&state, target)
        };
        Self::notify(callbacks, flags);
    }

    /// Deliver a change event for `target` without storing the flags
    ///
    /// Simulates an event that was already in flight when the stored state
    /// moved on.
    pub fn emit(&self, target: &Target, flags: FlagSet) {
        let callbacks = Self::callbacks_for(&self.state(), target);
        Self::notify(callbacks, flags);
    }

    /// Make fetches fail with `reason` until called again with `None`
    pub fn fail_fetches(&self, reason: Option<&str>) {
        self.state().fetch_failure = reason.map(str::to_string);
    }

    /// Make subscriptions fail with `reason` until called again with `None`
    pub fn fail_subscriptions(&self, reason: Option<&str>) {
        self.state().subscribe_failure = reason.map(str::to_string);
    }

    /// Declare whether the source distinguishes cellular transports
    pub fn set_wwan_support(&self, supported: bool) {
        self.state().supports_wwan = supported;
    }

    /// Number of live subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.state().subscribers.len()
    }

    /// Number of `fetch_flags` calls so far
    pub fn fetch_calls(&self) -> usize {
        self.inner.fetch_calls.load(Ordering::SeqCst)
    }

    /// Number of `subscribe` calls so far, failed ones included
    pub fn subscribe_calls(&self) -> usize {
        self.inner.subscribe_calls.load(Ordering::SeqCst)
    }

    /// Number of `unsubscribe` calls that removed a live subscription
    pub fn unsubscribe_calls(&self) -> usize {
        self.inner.unsubscribe_calls.load(Ordering::SeqCst)
    }

    fn state(&self) -> MutexGuard<'_, ManualState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn callbacks_for(state: &ManualState, target: &Target) -> Vec<FlagCallback> {
        state
            .subscribers
            .values()
            .filter(|(watched, _)| watched == target)
            .map(|(_, callback)| Arc::clone(callback))
            .collect()
    }

    // Callbacks run with the state lock released so they may call back in.
    fn notify(callbacks: Vec<FlagCallback>, flags: FlagSet) {
        for callback in callbacks {
            callback(flags);
        }
    }
}

impl FlagSource for ManualFlagSource {
    fn fetch_flags(&self, target: &Target) -> Result<FlagSet, Error> {
        self.inner.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state();

        if let Some(reason) = &state.fetch_failure {
            return Err(Error::fetch_failed(self.source_name(), reason.clone()));
        }

        Ok(state
            .overrides
            .get(target)
            .copied()
            .unwrap_or(state.default_flags))
    }

    fn subscribe(&self, target: &Target, on_change: FlagCallback) -> Result<SubscriptionHandle, Error> {
        self.inner.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state();

        if let Some(reason) = &state.subscribe_failure {
            return Err(Error::subscription_failed(self.source_name(), reason.clone()));
        }

        let handle = SubscriptionHandle::new(self.inner.next_handle.fetch_add(1, Ordering::SeqCst));
        state.subscribers.insert(handle, (target.clone(), on_change));
        debug!(handle = handle.id(), %target, "Manual subscription added");

        Ok(handle)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        if self.state().subscribers.remove(&handle).is_some() {
            self.inner.unsubscribe_calls.fetch_add(1, Ordering::SeqCst);
            debug!(handle = handle.id(), "Manual subscription removed");
        }
    }

    fn supports_wwan_classification(&self) -> bool {
        self.state().supports_wwan
    }

    fn source_name(&self) -> &'static str {
        "manual"
    }
}

/// Factory for creating manual flag sources
pub struct ManualFlagSourceFactory;

impl FlagSourceFactory for ManualFlagSourceFactory {
    fn create(&self, config: &SourceConfig) -> Result<Arc<dyn FlagSource>, Error> {
        match config {
            SourceConfig::Manual { flags } => {
                Ok(Arc::new(ManualFlagSource::new(FlagSet::from_bits(*flags))))
            }
            _ => Err(Error::config("Invalid config for manual flag source")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn recording_callback() -> (FlagCallback, Arc<AtomicU32>) {
        let seen = Arc::new(AtomicU32::new(u32::MAX));
        let sink = Arc::clone(&seen);
        let callback: FlagCallback = Arc::new(move |flags: FlagSet| {
            sink.store(flags.bits(), Ordering::SeqCst);
        });
        (callback, seen)
    }

    #[test]
    fn test_fetch_uses_override_then_default() {
        let source = ManualFlagSource::new(FlagSet::REACHABLE);
        let host = Target::host_name("example.test").unwrap();

        source.set_target_flags(&host, FlagSet::empty());

        assert_eq!(source.fetch_flags(&Target::AnyHost).unwrap(), FlagSet::REACHABLE);
        assert_eq!(source.fetch_flags(&host).unwrap(), FlagSet::empty());
        assert_eq!(source.fetch_calls(), 2);
    }

    #[test]
    fn test_set_flags_notifies_matching_subscribers() {
        let source = ManualFlagSource::new(FlagSet::empty());
        let host = Target::host_name("example.test").unwrap();

        let (any_cb, any_seen) = recording_callback();
        let (host_cb, host_seen) = recording_callback();
        source.subscribe(&Target::AnyHost, any_cb).unwrap();
        source.subscribe(&host, host_cb).unwrap();

        source.set_target_flags(&host, FlagSet::IS_DIRECT);
        source.set_flags(FlagSet::REACHABLE);

        assert_eq!(any_seen.load(Ordering::SeqCst), FlagSet::REACHABLE.bits());
        assert_eq!(host_seen.load(Ordering::SeqCst), FlagSet::IS_DIRECT.bits());
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let source = ManualFlagSource::default();
        let (callback, seen) = recording_callback();
        let handle = source.subscribe(&Target::AnyHost, callback).unwrap();

        source.unsubscribe(handle);
        source.unsubscribe(handle);
        source.set_flags(FlagSet::REACHABLE);

        assert_eq!(source.unsubscribe_calls(), 1);
        assert_eq!(source.subscriber_count(), 0);
        assert_eq!(seen.load(Ordering::SeqCst), u32::MAX);
    }

    #[test]
    fn test_failure_injection() {
        let source = ManualFlagSource::default();
        let (callback, _) = recording_callback();

        source.fail_fetches(Some("radio off"));
        source.fail_subscriptions(Some("no watcher"));

        assert!(matches!(source.fetch_flags(&Target::AnyHost), Err(Error::FetchFailed { .. })));
        assert!(matches!(
            source.subscribe(&Target::AnyHost, callback),
            Err(Error::SubscriptionFailed { .. })
        ));
        assert_eq!(source.subscriber_count(), 0);

        source.fail_fetches(None);
        assert!(source.fetch_flags(&Target::AnyHost).is_ok());
    }

    #[test]
    fn test_factory() {
        let source = ManualFlagSourceFactory
            .create(&SourceConfig::Manual { flags: FlagSet::REACHABLE.bits() })
            .unwrap();
        assert_eq!(source.fetch_flags(&Target::AnyHost).unwrap(), FlagSet::REACHABLE);

        assert!(ManualFlagSourceFactory.create(&SourceConfig::default()).is_err());
    }
}
