// # Netlink Flag Source
//
// This crate provides an rtnetlink-based flag source for Linux systems.
//
// ## How Flags Are Derived
//
// The target is mapped to an address (host names through the system
// resolver, trying every answer; sentinels to their fixed address) and
// looked up in the kernel's main routing table, dumped with `RTM_GETROUTE`:
// - A matching unicast route sets `REACHABLE`
// - A route without a gateway sets `IS_DIRECT`
// - Cellular interfaces (`wwan*`, `wwp*`, `rmnet*`, `ppp*`) set `IS_WWAN`
// - Loopback addresses are local and direct
//
// ## Change Detection
//
// Each subscription joins the `RTMGRP_LINK`, `RTMGRP_IPV4_ROUTE` and
// `RTMGRP_IPV6_ROUTE` multicast groups on its own socket and re-evaluates
// its target on every event. A slow refresh interval covers changes that
// produce no routing event, such as a host name resolving differently.
// When re-evaluation fails the target is reported with empty flags.
//
// ## Platform Support
//
// Route selection and the watcher build everywhere and run against any
// `RouteProvider`. The netlink provider, and with it the factory, is Linux
// only.

mod routes;
mod source;

#[cfg(target_os = "linux")]
mod netlink;

pub use routes::{Route, best_route, flags_for, is_cellular_interface};
pub use source::{ChangeFeed, NetlinkFlagSource, RouteProvider};

#[cfg(target_os = "linux")]
pub use netlink::{NetlinkEvents, NetlinkRoutes};

use reach_core::config::SourceConfig;
use reach_core::traits::{FlagSource, FlagSourceFactory};
use reach_core::{Error, Result, SourceRegistry};
use std::sync::Arc;

#[cfg(target_os = "linux")]
use std::time::Duration;

pub(crate) const SOURCE_NAME: &str = "netlink";

/// Factory for creating netlink flag sources
pub struct NetlinkFactory;

#[cfg(target_os = "linux")]
impl FlagSourceFactory for NetlinkFactory {
    fn create(&self, config: &SourceConfig) -> Result<Arc<dyn FlagSource>> {
        match config {
            SourceConfig::Netlink { refresh_interval_ms } => Ok(Arc::new(NetlinkFlagSource::new(
                Duration::from_millis(*refresh_interval_ms),
            ))),
            _ => Err(Error::config("Invalid config for netlink flag source")),
        }
    }
}

#[cfg(not(target_os = "linux"))]
impl FlagSourceFactory for NetlinkFactory {
    fn create(&self, _config: &SourceConfig) -> Result<Arc<dyn FlagSource>> {
        Err(Error::config("Netlink flag source is only supported on Linux"))
    }
}

/// Register the netlink flag source with a registry
pub fn register(registry: &SourceRegistry) {
    registry.register_source("netlink", Box::new(NetlinkFactory));
}
