//! Typed notification bus
//!
//! The bus is the publish point for monitors started with broadcast
//! delivery. Subscribers ask for one monitor's notifications by
//! [`MonitorId`], or for every monitor's via [`NotificationBus::subscribe_all`].
//!
//! ## Delivery Semantics
//!
//! Publishing never blocks. Each channel is a bounded
//! `tokio::sync::broadcast` queue: a subscriber that falls more than
//! `capacity` notifications behind loses the oldest ones and observes
//! `RecvError::Lagged` on its next receive. Publishing to a monitor nobody
//! listens to is a silent no-op.
//!
//! The bus is cheap to clone; clones share the same channels. It works with
//! or without a tokio runtime (`Receiver::blocking_recv` outside one).

use crate::flags::FlagSet;
use crate::monitor::MonitorId;
use crate::status::ReachabilityStatus;
use crate::target::Target;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// Payload published for each delivered status
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusNotification {
    /// Publishing monitor
    pub monitor: MonitorId,
    /// The monitor's target
    pub target: Target,
    /// Derived status
    pub status: ReachabilityStatus,
    /// Flags the status was derived from (`None` if the read failed)
    pub flags: Option<FlagSet>,
    /// When the status was derived
    pub at: DateTime<Utc>,
}

impl StatusNotification {
    /// Create a notification stamped with the current time
    pub fn new(
        monitor: MonitorId,
        target: Target,
        status: ReachabilityStatus,
        flags: Option<FlagSet>,
    ) -> Self {
        Self {
            monitor,
            target,
            status,
            flags,
            at: Utc::now(),
        }
    }
}

/// Publish/subscribe point keyed by monitor identity
#[derive(Clone)]
pub struct NotificationBus {
    inner: Arc<BusInner>,
}

struct BusInner {
    capacity: usize,
    channels: Mutex<HashMap<MonitorId, broadcast::Sender<StatusNotification>>>,
    all: broadcast::Sender<StatusNotification>,
}

impl NotificationBus {
    /// Default per-subscriber queue length
    pub const DEFAULT_CAPACITY: usize = 64;

    /// Create a bus whose subscriber queues hold `capacity` notifications
    ///
    /// A capacity of 0 is raised to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (all, _) = broadcast::channel(capacity);

        Self {
            inner: Arc::new(BusInner {
                capacity,
                channels: Mutex::new(HashMap::new()),
                all,
            }),
        }
    }

    /// Per-subscriber queue length
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Receive notifications published by `monitor`
    pub fn subscribe(&self, monitor: MonitorId) -> broadcast::Receiver<StatusNotification> {
        let mut channels = self.channels();
        channels
            .entry(monitor)
            .or_insert_with(|| broadcast::channel(self.inner.capacity).0)
            .subscribe()
    }

    /// Receive notifications published by every monitor on this bus
    pub fn subscribe_all(&self) -> broadcast::Receiver<StatusNotification> {
        self.inner.all.subscribe()
    }

    /// [`subscribe`](Self::subscribe) as a `Stream`
    pub fn stream(&self, monitor: MonitorId) -> BroadcastStream<StatusNotification> {
        BroadcastStream::new(self.subscribe(monitor))
    }

    /// [`subscribe_all`](Self::subscribe_all) as a `Stream`
    pub fn stream_all(&self) -> BroadcastStream<StatusNotification> {
        BroadcastStream::new(self.subscribe_all())
    }

    /// Publish a notification without blocking
    ///
    /// # Returns
    ///
    /// The number of subscribers (per-monitor and wildcard) it was queued for
    pub fn publish(&self, notification: StatusNotification) -> usize {
        let sender = self.channels().get(&notification.monitor).cloned();

        let mut reached = 0;
        if let Some(sender) = sender {
            reached += sender.send(notification.clone()).unwrap_or(0);
        }
        reached + self.inner.all.send(notification).unwrap_or(0)
    }

    /// Drop the channel of `monitor`
    ///
    /// Its subscribers drain what is queued and then see the channel closed.
    pub fn remove(&self, monitor: MonitorId) {
        self.channels().remove(&monitor);
    }

    /// Number of live per-monitor subscribers for `monitor`
    pub fn subscriber_count(&self, monitor: MonitorId) -> usize {
        self.channels()
            .get(&monitor)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    fn channels(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<MonitorId, broadcast::Sender<StatusNotification>>> {
        self.inner
            .channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

impl fmt::Debug for NotificationBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationBus")
            .field("capacity", &self.inner.capacity)
            .field("channels", &self.channels().len())
            .finish()
    }
}
