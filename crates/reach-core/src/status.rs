//! Reachability status and the flag classifier
//!
//! [`classify`] is the only place where platform flags are interpreted.
//! It is pure and total: the same inputs always yield the same status.

use crate::flags::FlagSet;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Application-level reachability of a target
///
/// Ordered by "reachable-ness": `NotReachable` is below both reachable
/// values, which are incomparable to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReachabilityStatus {
    /// No usable path to the target
    NotReachable,
    /// Reachable over a cellular/wide-area radio
    ReachableViaWwan,
    /// Reachable over a local WiFi/LAN-class interface
    ReachableViaWifi,
}

impl ReachabilityStatus {
    /// Whether any path to the target exists
    pub const fn is_reachable(self) -> bool {
        !matches!(self, Self::NotReachable)
    }

    /// Whether the target is reachable over WiFi/LAN
    pub const fn is_reachable_via_wifi(self) -> bool {
        matches!(self, Self::ReachableViaWifi)
    }

    /// Whether the target is reachable over WWAN
    pub const fn is_reachable_via_wwan(self) -> bool {
        matches!(self, Self::ReachableViaWwan)
    }
}

impl PartialOrd for ReachabilityStatus {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self == other {
            return Some(Ordering::Equal);
        }
        match (self.is_reachable(), other.is_reachable()) {
            (false, true) => Some(Ordering::Less),
            (true, false) => Some(Ordering::Greater),
            _ => None,
        }
    }
}

impl fmt::Display for ReachabilityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::NotReachable => "not reachable",
            Self::ReachableViaWwan => "reachable via WWAN",
            Self::ReachableViaWifi => "reachable via WiFi",
        };
        f.write_str(text)
    }
}

/// Map platform flags to a reachability status
///
/// `is_local_wifi_target` must be `true` for the local-network sentinel,
/// which is only reachable over a direct (gateway-less) path.
///
/// A required connection counts as reachable only when the platform will
/// bring it up by itself (on traffic or on demand) without user
/// intervention.
pub fn classify(flags: FlagSet, is_local_wifi_target: bool) -> ReachabilityStatus {
    if !flags.contains(FlagSet::REACHABLE) {
        return ReachabilityStatus::NotReachable;
    }

    if is_local_wifi_target && !flags.contains(FlagSet::IS_DIRECT) {
        return ReachabilityStatus::NotReachable;
    }

    if flags.contains(FlagSet::CONNECTION_REQUIRED) {
        let automatic =
            flags.intersects(FlagSet::CONNECTION_ON_TRAFFIC | FlagSet::CONNECTION_ON_DEMAND);
        if !automatic || flags.contains(FlagSet::INTERVENTION_REQUIRED) {
            return ReachabilityStatus::NotReachable;
        }
    }

    if flags.contains(FlagSet::IS_WWAN) {
        ReachabilityStatus::ReachableViaWwan
    } else {
        ReachabilityStatus::ReachableViaWifi
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAMED: [FlagSet; 9] = [
        FlagSet::TRANSIENT_CONNECTION,
        FlagSet::REACHABLE,
        FlagSet::CONNECTION_REQUIRED,
        FlagSet::CONNECTION_ON_TRAFFIC,
        FlagSet::INTERVENTION_REQUIRED,
        FlagSet::CONNECTION_ON_DEMAND,
        FlagSet::IS_LOCAL_ADDRESS,
        FlagSet::IS_DIRECT,
        FlagSet::IS_WWAN,
    ];

    /// Every combination of the named flags
    fn all_combinations() -> impl Iterator<Item = FlagSet> {
        (0u32..1 << NAMED.len()).map(|mask| {
            NAMED
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .fold(FlagSet::empty(), |acc, (_, flag)| acc | *flag)
        })
    }

    #[test]
    fn test_unreachable_bit_dominates() {
        for flags in all_combinations().filter(|f| !f.contains(FlagSet::REACHABLE)) {
            assert_eq!(classify(flags, false), ReachabilityStatus::NotReachable, "{}", flags);
            assert_eq!(classify(flags, true), ReachabilityStatus::NotReachable, "{}", flags);
        }
    }

    #[test]
    fn test_no_connection_required_uses_transport_hint() {
        let candidates = all_combinations().filter(|f| {
            f.contains(FlagSet::REACHABLE) && !f.contains(FlagSet::CONNECTION_REQUIRED)
        });

        for flags in candidates {
            let expected = if flags.contains(FlagSet::IS_WWAN) {
                ReachabilityStatus::ReachableViaWwan
            } else {
                ReachabilityStatus::ReachableViaWifi
            };
            assert_eq!(classify(flags, false), expected, "{}", flags);
        }
    }

    #[test]
    fn test_local_wifi_requires_direct() {
        for flags in all_combinations().filter(|f| !f.contains(FlagSet::IS_DIRECT)) {
            assert_eq!(classify(flags, true), ReachabilityStatus::NotReachable, "{}", flags);
        }

        let direct = FlagSet::REACHABLE | FlagSet::IS_DIRECT;
        assert_eq!(classify(direct, true), ReachabilityStatus::ReachableViaWifi);
    }

    #[test]
    fn test_connection_required_needs_automatic_bring_up() {
        let required = FlagSet::REACHABLE | FlagSet::CONNECTION_REQUIRED;
        assert_eq!(classify(required, false), ReachabilityStatus::NotReachable);

        let on_traffic = required | FlagSet::CONNECTION_ON_TRAFFIC;
        assert_eq!(classify(on_traffic, false), ReachabilityStatus::ReachableViaWifi);

        let on_demand_wwan = required | FlagSet::CONNECTION_ON_DEMAND | FlagSet::IS_WWAN;
        assert_eq!(classify(on_demand_wwan, false), ReachabilityStatus::ReachableViaWwan);
    }

    #[test]
    fn test_intervention_required_is_not_reachable() {
        let flags = FlagSet::REACHABLE
            | FlagSet::CONNECTION_REQUIRED
            | FlagSet::CONNECTION_ON_DEMAND
            | FlagSet::INTERVENTION_REQUIRED;
        assert_eq!(classify(flags, false), ReachabilityStatus::NotReachable);
    }

    #[test]
    fn test_informational_bits_never_downgrade() {
        let base = FlagSet::REACHABLE | FlagSet::IS_DIRECT;
        let noisy = base | FlagSet::TRANSIENT_CONNECTION | FlagSet::IS_LOCAL_ADDRESS;

        assert_eq!(classify(noisy, false), classify(base, false));
        assert_eq!(classify(noisy, true), classify(base, true));
    }

    #[test]
    fn test_unknown_bits_ignored() {
        let flags = FlagSet::REACHABLE | FlagSet::from_bits(0xFF00_0000);
        assert_eq!(classify(flags, false), ReachabilityStatus::ReachableViaWifi);
    }

    #[test]
    fn test_status_predicates_and_order() {
        use ReachabilityStatus::*;

        assert!(!NotReachable.is_reachable());
        assert!(ReachableViaWwan.is_reachable());
        assert!(ReachableViaWifi.is_reachable_via_wifi());
        assert!(!ReachableViaWifi.is_reachable_via_wwan());

        assert!(NotReachable < ReachableViaWifi);
        assert!(NotReachable < ReachableViaWwan);
        assert_eq!(ReachableViaWifi.partial_cmp(&ReachableViaWwan), None);
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&ReachabilityStatus::ReachableViaWwan).unwrap();
        assert_eq!(json, "\"reachable_via_wwan\"");
    }
}
