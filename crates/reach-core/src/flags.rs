//! Platform-reported reachability attributes
//!
//! A [`FlagSet`] is what a [`FlagSource`](crate::traits::FlagSource) reports
//! for a target. Bit positions follow the common platform reachability flag
//! layout so sources wrapping such an API can pass the raw word through
//! [`FlagSet::from_bits`]. Unknown bits are preserved and ignored by the
//! classifier.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// Bitset of low-level reachability attributes for one target
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlagSet(u32);

impl FlagSet {
    /// The address is reachable through a transient connection (e.g. PPP)
    pub const TRANSIENT_CONNECTION: Self = Self(1 << 0);
    /// A path to the target currently exists
    pub const REACHABLE: Self = Self(1 << 1);
    /// A connection must be established before the target is reachable
    pub const CONNECTION_REQUIRED: Self = Self(1 << 2);
    /// The connection will be brought up by outgoing traffic
    pub const CONNECTION_ON_TRAFFIC: Self = Self(1 << 3);
    /// Bringing the connection up needs user action
    pub const INTERVENTION_REQUIRED: Self = Self(1 << 4);
    /// The connection will be brought up on demand by the platform
    pub const CONNECTION_ON_DEMAND: Self = Self(1 << 5);
    /// The target is an address assigned to this host
    pub const IS_LOCAL_ADDRESS: Self = Self(1 << 16);
    /// The path does not traverse a gateway
    pub const IS_DIRECT: Self = Self(1 << 17);
    /// The active transport is a cellular/wide-area radio
    pub const IS_WWAN: Self = Self(1 << 18);

    /// Named flags with their diagnostic character, in display order
    const NAMED: [(FlagSet, char); 9] = [
        (Self::IS_WWAN, 'W'),
        (Self::REACHABLE, 'R'),
        (Self::TRANSIENT_CONNECTION, 't'),
        (Self::CONNECTION_REQUIRED, 'c'),
        (Self::CONNECTION_ON_TRAFFIC, 'C'),
        (Self::INTERVENTION_REQUIRED, 'i'),
        (Self::CONNECTION_ON_DEMAND, 'D'),
        (Self::IS_LOCAL_ADDRESS, 'l'),
        (Self::IS_DIRECT, 'd'),
    ];

    /// The empty set
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Wrap a raw flag word, keeping unknown bits
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// The raw flag word
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether no bit is set
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether every bit of `other` is set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether any bit of `other` is set
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Union of two sets, usable in const context
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Set every bit of `other`
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Clear every bit of `other`
    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl BitOr for FlagSet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for FlagSet {
    fn bitor_assign(&mut self, rhs: Self) {
        self.insert(rhs);
    }
}

impl BitAnd for FlagSet {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl From<u32> for FlagSet {
    fn from(bits: u32) -> Self {
        Self::from_bits(bits)
    }
}

/// Renders one character per named flag, `-` when unset (e.g. `-R------d`)
impl fmt::Display for FlagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (flag, symbol) in Self::NAMED {
            let c = if self.contains(flag) { symbol } else { '-' };
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

impl fmt::Debug for FlagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FlagSet({} {:#010x})", self, self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_and_intersects() {
        let flags = FlagSet::REACHABLE | FlagSet::IS_DIRECT;

        assert!(flags.contains(FlagSet::REACHABLE));
        assert!(flags.contains(FlagSet::REACHABLE | FlagSet::IS_DIRECT));
        assert!(!flags.contains(FlagSet::REACHABLE | FlagSet::IS_WWAN));
        assert!(flags.intersects(FlagSet::IS_WWAN | FlagSet::IS_DIRECT));
        assert!(!flags.intersects(FlagSet::IS_WWAN));
    }

    #[test]
    fn test_insert_remove() {
        let mut flags = FlagSet::empty();
        assert!(flags.is_empty());

        flags.insert(FlagSet::REACHABLE);
        flags |= FlagSet::IS_WWAN;
        assert_eq!(flags.bits(), (1 << 1) | (1 << 18));

        flags.remove(FlagSet::IS_WWAN);
        assert_eq!(flags, FlagSet::REACHABLE);
    }

    #[test]
    fn test_unknown_bits_are_preserved() {
        let flags = FlagSet::from_bits((1 << 30) | (1 << 1));
        assert!(flags.contains(FlagSet::REACHABLE));
        assert_eq!(flags.bits() & (1 << 30), 1 << 30);
    }

    #[test]
    fn test_display_flag_string() {
        assert_eq!(FlagSet::empty().to_string(), "---------");

        let flags = FlagSet::REACHABLE | FlagSet::IS_DIRECT | FlagSet::IS_WWAN;
        assert_eq!(flags.to_string(), "WR------d");
        assert_eq!(flags.to_string().len(), 9);
    }
}
