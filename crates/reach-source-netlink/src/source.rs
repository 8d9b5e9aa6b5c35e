//! Route-table flag source
//!
//! One-shot fetches ask a [`RouteProvider`] for the routes of the target's
//! address family. Each subscription gets a watcher thread owning its own
//! [`ChangeFeed`]: the target is re-evaluated on every routing event and
//! every refresh interval, and the callback fires only when the flags differ
//! from the previous evaluation. A failed evaluation counts as empty flags.

use crate::SOURCE_NAME;
use crate::routes::{Route, flags_for};
use reach_core::traits::{FlagCallback, FlagSource, SubscriptionHandle};
use reach_core::{Error, FlagSet, Result, Target};
use std::collections::HashMap;
use std::net::{IpAddr, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Upper bound on how long a watcher takes to notice `unsubscribe`
const STOP_CHECK: Duration = Duration::from_millis(250);

/// Where routes and change events come from
pub trait RouteProvider: Send + Sync {
    /// Usable routes of `addr`'s address family
    fn routes(&self, addr: IpAddr) -> Result<Vec<Route>>;

    /// Open a feed of routing changes for one watcher
    fn watch(&self) -> Result<Box<dyn ChangeFeed>>;
}

/// Blocking feed of routing-change signals
pub trait ChangeFeed: Send {
    /// Wait up to `timeout` for a change
    ///
    /// # Returns
    ///
    /// - `Ok(true)`: Routes or links changed
    /// - `Ok(false)`: The timeout elapsed first
    /// - `Err(Error)`: The feed is broken
    fn wait(&mut self, timeout: Duration) -> Result<bool>;
}

/// Flag source evaluating targets against the kernel routing table
pub struct NetlinkFlagSource {
    provider: Arc<dyn RouteProvider>,
    refresh_interval: Duration,
    next_handle: AtomicU64,
    watchers: Mutex<HashMap<SubscriptionHandle, Arc<AtomicBool>>>,
}

impl NetlinkFlagSource {
    /// Source backed by the live rtnetlink socket
    #[cfg(target_os = "linux")]
    pub fn new(refresh_interval: Duration) -> Self {
        Self::with_provider(Arc::new(crate::netlink::NetlinkRoutes), refresh_interval)
    }

    /// Source backed by an arbitrary route provider
    pub fn with_provider(provider: Arc<dyn RouteProvider>, refresh_interval: Duration) -> Self {
        Self {
            provider,
            refresh_interval,
            next_handle: AtomicU64::new(1),
            watchers: Mutex::new(HashMap::new()),
        }
    }

    /// Number of live watcher threads
    pub fn watcher_count(&self) -> usize {
        self.watchers().len()
    }

    fn watchers(&self) -> MutexGuard<'_, HashMap<SubscriptionHandle, Arc<AtomicBool>>> {
        self.watchers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Flags for `target` from `provider`
fn read_flags(provider: &dyn RouteProvider, target: &Target) -> Result<FlagSet> {
    match target.host() {
        Some(host) => flags_for_any(provider, resolve(host)?),
        None => {
            let addr = target
                .lookup_address()
                .ok_or_else(|| Error::fetch_failed(SOURCE_NAME, format!("no address for {}", target)))?;
            flags_at(provider, addr)
        }
    }
}

fn flags_at(provider: &dyn RouteProvider, addr: IpAddr) -> Result<FlagSet> {
    if addr.is_loopback() {
        return Ok(flags_for(&[], addr));
    }
    Ok(flags_for(&provider.routes(addr)?, addr))
}

/// Flags for the first of `addrs` that is reachable
///
/// Falls back to the first successful but unreachable answer, then to the
/// last error.
fn flags_for_any(provider: &dyn RouteProvider, addrs: impl IntoIterator<Item = IpAddr>) -> Result<FlagSet> {
    let mut outcome: Option<Result<FlagSet>> = None;

    for addr in addrs {
        match flags_at(provider, addr) {
            Ok(flags) if flags.contains(FlagSet::REACHABLE) => return Ok(flags),
            Ok(flags) => {
                if !matches!(outcome, Some(Ok(_))) {
                    outcome = Some(Ok(flags));
                }
            }
            Err(e) => {
                debug!(%addr, "Address lookup failed: {}", e);
                if !matches!(outcome, Some(Ok(_))) {
                    outcome = Some(Err(e));
                }
            }
        }
    }

    outcome.unwrap_or_else(|| Err(Error::fetch_failed(SOURCE_NAME, "host has no addresses")))
}

fn resolve(host: &str) -> Result<Vec<IpAddr>> {
    let addrs = (host, 0)
        .to_socket_addrs()
        .map_err(|e| Error::fetch_failed(SOURCE_NAME, format!("cannot resolve {}: {}", host, e)))?;
    Ok(addrs.map(|addr| addr.ip()).collect())
}

impl FlagSource for NetlinkFlagSource {
    fn fetch_flags(&self, target: &Target) -> Result<FlagSet> {
        read_flags(self.provider.as_ref(), target)
    }

    fn subscribe(&self, target: &Target, on_change: FlagCallback) -> Result<SubscriptionHandle> {
        let handle = SubscriptionHandle::new(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let stopped = Arc::new(AtomicBool::new(false));

        let feed = self.provider.watch()?;
        let watcher = Watcher {
            handle,
            provider: Arc::clone(&self.provider),
            target: target.clone(),
            refresh_interval: self.refresh_interval,
            stopped: Arc::clone(&stopped),
            feed,
            last: read_flags(self.provider.as_ref(), target).ok(),
            on_change,
        };

        thread::Builder::new()
            .name(format!("reach-netlink-{}", handle.id()))
            .spawn(move || watcher.run())
            .map_err(|e| Error::subscription_failed(SOURCE_NAME, format!("cannot spawn watcher: {}", e)))?;

        self.watchers().insert(handle, stopped);
        debug!(
            handle = handle.id(),
            %target,
            refresh_ms = self.refresh_interval.as_millis() as u64,
            "Watcher started"
        );

        Ok(handle)
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        if let Some(stopped) = self.watchers().remove(&handle) {
            stopped.store(true, Ordering::Release);
            debug!(handle = handle.id(), "Watcher stopped");
        }
    }

    fn source_name(&self) -> &'static str {
        SOURCE_NAME
    }
}

impl Drop for NetlinkFlagSource {
    fn drop(&mut self) {
        for (_, stopped) in self.watchers().drain() {
            stopped.store(true, Ordering::Release);
        }
    }
}

struct Watcher {
    handle: SubscriptionHandle,
    provider: Arc<dyn RouteProvider>,
    target: Target,
    refresh_interval: Duration,
    stopped: Arc<AtomicBool>,
    feed: Box<dyn ChangeFeed>,
    last: Option<FlagSet>,
    on_change: FlagCallback,
}

impl Watcher {
    fn run(mut self) {
        let slice = STOP_CHECK.min(self.refresh_interval);
        let mut evaluated_at = Instant::now();

        while !self.stopped.load(Ordering::Acquire) {
            let changed = match self.feed.wait(slice) {
                Ok(changed) => changed,
                Err(e) => {
                    warn!(handle = self.handle.id(), "Change feed failed: {}", e);
                    thread::sleep(slice);
                    true
                }
            };

            if self.stopped.load(Ordering::Acquire) {
                break;
            }
            if !changed && evaluated_at.elapsed() < self.refresh_interval {
                continue;
            }

            evaluated_at = Instant::now();
            self.evaluate();
        }

        trace!(handle = self.handle.id(), "Watcher exited");
    }

    fn evaluate(&mut self) {
        let flags = read_flags(self.provider.as_ref(), &self.target).unwrap_or_else(|e| {
            warn!(handle = self.handle.id(), target = %self.target, "Route re-evaluation failed: {}", e);
            FlagSet::empty()
        });

        if self.last == Some(flags) {
            trace!(handle = self.handle.id(), %flags, "Flags unchanged");
            return;
        }

        self.last = Some(flags);
        (self.on_change)(flags);
    }
}
