//! Test doubles and common utilities for contract tests
//!
//! The doubles wrap or replace `ManualFlagSource` so tests can observe how
//! a monitor drives its flag source and what it delivers.

#![allow(dead_code)]

use reach_core::error::Result;
use reach_core::traits::{FlagCallback, FlagSource, SubscriptionHandle};
use reach_core::{FlagSet, ManualFlagSource, ReachabilityStatus, Target};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// Records every status a handler receives
#[derive(Clone, Default)]
pub struct RecordingHandler {
    seen: Arc<Mutex<Vec<ReachabilityStatus>>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handler closure feeding this recorder
    pub fn handler(&self) -> impl Fn(ReachabilityStatus) + Send + Sync + 'static {
        let seen = Arc::clone(&self.seen);
        move |status| seen.lock().unwrap().push(status)
    }

    /// Everything delivered so far
    pub fn seen(&self) -> Vec<ReachabilityStatus> {
        self.seen.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

/// A manual source and the same source as a shared trait object
pub fn manual_source(flags: FlagSet) -> (ManualFlagSource, Arc<dyn FlagSource>) {
    let source = ManualFlagSource::new(flags);
    let shared: Arc<dyn FlagSource> = Arc::new(source.clone());
    (source, shared)
}

/// A source whose subscriptions are rejected with a non-subscription error
///
/// Checks that the monitor re-tags arbitrary source errors.
pub struct RejectingSource {
    subscribe_calls: AtomicUsize,
}

impl RejectingSource {
    pub fn new() -> Self {
        Self {
            subscribe_calls: AtomicUsize::new(0),
        }
    }

    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }
}

impl FlagSource for RejectingSource {
    fn fetch_flags(&self, _target: &Target) -> Result<FlagSet> {
        Ok(FlagSet::REACHABLE)
    }

    fn subscribe(&self, _target: &Target, _on_change: FlagCallback) -> Result<SubscriptionHandle> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "routing socket denied").into())
    }

    fn unsubscribe(&self, _handle: SubscriptionHandle) {}

    fn source_name(&self) -> &'static str {
        "rejecting"
    }
}

/// A source that hands the test the monitor's callback
///
/// Lets a test fire change events from any thread, including events for a
/// subscription that has already been cancelled.
#[derive(Default)]
pub struct CapturingSource {
    flags: Mutex<FlagSet>,
    callbacks: Mutex<Vec<FlagCallback>>,
    unsubscribe_calls: AtomicUsize,
}

impl CapturingSource {
    pub fn new(flags: FlagSet) -> Arc<Self> {
        Arc::new(Self {
            flags: Mutex::new(flags),
            ..Self::default()
        })
    }

    /// Callback registered by the `n`th subscribe call
    pub fn callback(&self, n: usize) -> FlagCallback {
        Arc::clone(&self.callbacks.lock().unwrap()[n])
    }

    pub fn set_flags(&self, flags: FlagSet) {
        *self.flags.lock().unwrap() = flags;
    }

    pub fn unsubscribe_calls(&self) -> usize {
        self.unsubscribe_calls.load(Ordering::SeqCst)
    }
}

impl FlagSource for CapturingSource {
    fn fetch_flags(&self, _target: &Target) -> Result<FlagSet> {
        Ok(*self.flags.lock().unwrap())
    }

    fn subscribe(&self, _target: &Target, on_change: FlagCallback) -> Result<SubscriptionHandle> {
        let mut callbacks = self.callbacks.lock().unwrap();
        callbacks.push(on_change);
        Ok(SubscriptionHandle::new(callbacks.len() as u64))
    }

    fn unsubscribe(&self, _handle: SubscriptionHandle) {
        self.unsubscribe_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn source_name(&self) -> &'static str {
        "capturing"
    }
}

/// A source that reports a change the moment `subscribe` returns
///
/// Each subscribe spawns a thread that immediately fires the callback with
/// the `changed` flags, racing the monitor's initial delivery.
pub struct EagerSource {
    initial: FlagSet,
    changed: FlagSet,
    firing: Mutex<Vec<JoinHandle<()>>>,
}

impl EagerSource {
    pub fn new(initial: FlagSet, changed: FlagSet) -> Arc<Self> {
        Arc::new(Self {
            initial,
            changed,
            firing: Mutex::new(Vec::new()),
        })
    }

    /// Wait for every change fired so far
    pub fn join(&self) {
        for handle in self.firing.lock().unwrap().drain(..) {
            handle.join().unwrap();
        }
    }
}

impl FlagSource for EagerSource {
    fn fetch_flags(&self, _target: &Target) -> Result<FlagSet> {
        Ok(self.initial)
    }

    fn subscribe(&self, _target: &Target, on_change: FlagCallback) -> Result<SubscriptionHandle> {
        let changed = self.changed;
        let mut firing = self.firing.lock().unwrap();
        firing.push(thread::spawn(move || on_change(changed)));
        Ok(SubscriptionHandle::new(firing.len() as u64))
    }

    fn unsubscribe(&self, _handle: SubscriptionHandle) {}

    fn source_name(&self) -> &'static str {
        "eager"
    }
}
