//! Route selection and flag mapping
//!
//! Everything here is pure: routes come in already decoded (see the
//! `netlink` module) and lookups answer for a single address.

use reach_core::FlagSet;
use std::net::IpAddr;

/// Interface name prefixes of cellular modems and point-to-point links
const CELLULAR_PREFIXES: [&str; 4] = ["wwan", "wwp", "rmnet", "ppp"];

/// One usable unicast route from the main table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub iface: String,
    pub destination: IpAddr,
    pub prefix_len: u8,
    /// `None` for on-link routes
    pub gateway: Option<IpAddr>,
    pub metric: u32,
}

impl Route {
    /// Whether `addr` falls inside this route's network
    pub fn contains(&self, addr: IpAddr) -> bool {
        match (self.destination, addr) {
            (IpAddr::V4(net), IpAddr::V4(addr)) => {
                let mask = prefix_mask_v4(self.prefix_len);
                u32::from(net) & mask == u32::from(addr) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(addr)) => {
                let mask = prefix_mask_v6(self.prefix_len);
                u128::from(net) & mask == u128::from(addr) & mask
            }
            _ => false,
        }
    }

    /// Flags describing a path over this route
    pub fn flags(&self) -> FlagSet {
        let mut flags = FlagSet::REACHABLE;
        if self.gateway.is_none() {
            flags.insert(FlagSet::IS_DIRECT);
        }
        if self.iface == "lo" {
            flags.insert(FlagSet::IS_LOCAL_ADDRESS | FlagSet::IS_DIRECT);
        }
        if is_cellular_interface(&self.iface) {
            flags.insert(FlagSet::IS_WWAN);
        }
        flags
    }
}

fn prefix_mask_v4(len: u8) -> u32 {
    match len {
        0 => 0,
        len => u32::MAX << (32 - u32::from(len.min(32))),
    }
}

fn prefix_mask_v6(len: u8) -> u128 {
    match len {
        0 => 0,
        len => u128::MAX << (128 - u32::from(len.min(128))),
    }
}

/// Whether `iface` names a cellular or point-to-point interface
pub fn is_cellular_interface(iface: &str) -> bool {
    CELLULAR_PREFIXES.iter().any(|prefix| iface.starts_with(prefix))
}

/// Pick the route the kernel would use for `addr`
///
/// Longest prefix wins; ties go to the lowest metric.
pub fn best_route(routes: &[Route], addr: IpAddr) -> Option<&Route> {
    routes
        .iter()
        .filter(|route| route.contains(addr))
        .max_by(|a, b| a.prefix_len.cmp(&b.prefix_len).then(b.metric.cmp(&a.metric)))
}

/// Flags for a path to `addr` over `routes`
///
/// Loopback addresses are always local and direct. Without a matching
/// route the set is empty.
pub fn flags_for(routes: &[Route], addr: IpAddr) -> FlagSet {
    if addr.is_loopback() {
        return FlagSet::REACHABLE | FlagSet::IS_DIRECT | FlagSet::IS_LOCAL_ADDRESS;
    }
    best_route(routes, addr).map_or(FlagSet::empty(), Route::flags)
}
