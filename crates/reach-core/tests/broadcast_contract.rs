//! Contract Test: Bus Delivery
//!
//! Verifies that broadcast monitors publish on the notification bus keyed
//! by their identity.
//!
//! Constraints verified:
//! - The initial status is published before start returns
//! - Per-monitor subscribers only see their monitor
//! - Wildcard subscribers see every monitor on a shared bus
//! - Direct-handler monitors publish only when configured to
//! - Dropping a monitor closes its channel

mod common;

use common::*;
use reach_core::{
    FlagSet, MonitorConfig, NotificationBus, ReachabilityMonitor, ReachabilityStatus, Target,
};
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio_stream::StreamExt;

#[tokio::test]
async fn broadcast_start_publishes_initial_and_changes() {
    let (manual, source) = manual_source(FlagSet::REACHABLE | FlagSet::IS_WWAN);
    let monitor = ReachabilityMonitor::for_internet_connection(source);
    let mut stream = monitor.stream();

    let initial = monitor.start_monitoring_with_broadcast().unwrap();
    assert_eq!(initial, ReachabilityStatus::ReachableViaWwan);

    manual.set_flags(FlagSet::empty());

    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.monitor, monitor.id());
    assert_eq!(first.target, Target::AnyHost);
    assert_eq!(first.status, ReachabilityStatus::ReachableViaWwan);
    assert_eq!(first.flags, Some(FlagSet::REACHABLE | FlagSet::IS_WWAN));

    let second = stream.next().await.unwrap().unwrap();
    assert_eq!(second.status, ReachabilityStatus::NotReachable);
    assert!(second.at >= first.at);
}

#[tokio::test]
async fn shared_bus_fans_out_by_identity() {
    let bus = NotificationBus::default();
    let (_, source) = manual_source(FlagSet::REACHABLE | FlagSet::IS_DIRECT);

    let internet = ReachabilityMonitor::builder(Target::AnyHost, source.clone())
        .bus(bus.clone())
        .build()
        .unwrap();
    let wifi = ReachabilityMonitor::builder(Target::LocalWifi, source)
        .bus(bus.clone())
        .build()
        .unwrap();

    let mut only_wifi = wifi.subscribe();
    let mut everything = bus.stream_all();

    internet.start_monitoring_with_broadcast().unwrap();
    wifi.start_monitoring_with_broadcast().unwrap();

    let a = everything.next().await.unwrap().unwrap();
    let b = everything.next().await.unwrap().unwrap();
    assert_eq!(a.monitor, internet.id());
    assert_eq!(b.monitor, wifi.id());

    assert_eq!(only_wifi.recv().await.unwrap().monitor, wifi.id());
    assert_eq!(only_wifi.try_recv().unwrap_err(), TryRecvError::Empty);
}

#[tokio::test]
async fn handler_monitor_publishes_only_when_configured() {
    let (manual, source) = manual_source(FlagSet::REACHABLE);

    let quiet = ReachabilityMonitor::new(Target::AnyHost, source.clone());
    let mut quiet_rx = quiet.subscribe();
    quiet.start_monitoring(|_| {}).unwrap();

    let loud = ReachabilityMonitor::builder(Target::AnyHost, source)
        .config(MonitorConfig::default().with_broadcast_with_handler(true))
        .build()
        .unwrap();
    let mut loud_rx = loud.subscribe();
    let recorder = RecordingHandler::new();
    loud.start_monitoring(recorder.handler()).unwrap();

    manual.set_flags(FlagSet::empty());

    assert_eq!(quiet_rx.try_recv().unwrap_err(), TryRecvError::Empty);
    assert_eq!(loud_rx.recv().await.unwrap().status, ReachabilityStatus::ReachableViaWifi);
    assert_eq!(loud_rx.recv().await.unwrap().status, ReachabilityStatus::NotReachable);
    assert_eq!(recorder.count(), 2);
}

#[tokio::test]
async fn stopped_monitor_publishes_nothing_more() {
    let (manual, source) = manual_source(FlagSet::REACHABLE);
    let monitor = ReachabilityMonitor::for_internet_connection(source);
    let mut rx = monitor.subscribe();

    monitor.start_monitoring_with_broadcast().unwrap();
    monitor.stop_monitoring();
    manual.set_flags(FlagSet::empty());

    tokio_test::assert_ok!(rx.try_recv());
    assert_eq!(rx.try_recv().unwrap_err(), TryRecvError::Empty);
}

#[tokio::test]
async fn dropping_monitor_closes_its_channel() {
    let bus = NotificationBus::new(4);
    let (_, source) = manual_source(FlagSet::REACHABLE);
    let monitor = ReachabilityMonitor::builder(Target::AnyHost, source)
        .bus(bus.clone())
        .build()
        .unwrap();
    let mut rx = monitor.subscribe();

    monitor.start_monitoring_with_broadcast().unwrap();
    drop(monitor);

    assert!(rx.recv().await.is_ok());
    assert!(matches!(rx.recv().await, Err(RecvError::Closed)));
}
