//! Monitoring targets
//!
//! A [`Target`] names what is being watched. Construction validates syntax
//! only; no resolution or other network I/O happens here. Targets compare by
//! their resolved representation, so `"1.2.3.4"` parsed from text equals the
//! same address built from bytes.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// Address handed to flag sources for the any-host sentinel
pub const ANY_HOST_ADDRESS: Ipv4Addr = Ipv4Addr::UNSPECIFIED;

/// Address handed to flag sources for the local-network sentinel
///
/// The network address of the IPv4 link-local block (169.254.0.0/16).
pub const LOCAL_WIFI_ADDRESS: Ipv4Addr = Ipv4Addr::new(169, 254, 0, 0);

/// What a monitor watches
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Target {
    /// A host name, resolved by the flag source
    HostName(String),
    /// An IPv4 address
    Ipv4(Ipv4Addr),
    /// An IPv6 address
    Ipv6(Ipv6Addr),
    /// General internet reachability
    AnyHost,
    /// Local-network-only reachability
    LocalWifi,
}

impl Target {
    /// Create a host name target
    ///
    /// The name is trimmed and lowercased. A name that is itself a textual
    /// IP address yields the corresponding address target.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHostName` for an empty or blank name.
    pub fn host_name(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let normalized = name.trim().to_ascii_lowercase();

        if normalized.is_empty() {
            return Err(Error::invalid_host_name(name));
        }

        match normalized.parse::<IpAddr>() {
            Ok(addr) => Ok(Self::from(addr)),
            Err(_) => Ok(Self::HostName(normalized)),
        }
    }

    /// Create an IPv4 target from an address or its four octets
    pub fn ipv4(addr: impl Into<Ipv4Addr>) -> Self {
        Self::Ipv4(addr.into())
    }

    /// Create an IPv6 target from an address or its sixteen octets
    pub fn ipv6(addr: impl Into<Ipv6Addr>) -> Self {
        Self::Ipv6(addr.into())
    }

    /// Parse a dotted IPv4 or colon IPv6 textual address
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidAddress` if `text` is neither.
    pub fn parse(text: &str) -> Result<Self> {
        text.trim()
            .parse::<IpAddr>()
            .map(Self::from)
            .map_err(|_| Error::invalid_address(text))
    }

    /// The any-host sentinel
    pub const fn any_host() -> Self {
        Self::AnyHost
    }

    /// The local WiFi/LAN sentinel
    pub const fn local_wifi() -> Self {
        Self::LocalWifi
    }

    /// Interpret a configuration string
    ///
    /// `any`/`internet` select the any-host sentinel, `local`/`wifi` the
    /// local-network sentinel; textual addresses become address targets and
    /// anything else is treated as a host name.
    pub fn from_config(text: &str) -> Result<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "any" | "internet" => Ok(Self::AnyHost),
            "local" | "wifi" => Ok(Self::LocalWifi),
            _ => Self::host_name(text),
        }
    }

    /// The address a flag source should look up, `None` for host names
    pub fn lookup_address(&self) -> Option<IpAddr> {
        match self {
            Self::HostName(_) => None,
            Self::Ipv4(addr) => Some(IpAddr::V4(*addr)),
            Self::Ipv6(addr) => Some(IpAddr::V6(*addr)),
            Self::AnyHost => Some(IpAddr::V4(ANY_HOST_ADDRESS)),
            Self::LocalWifi => Some(IpAddr::V4(LOCAL_WIFI_ADDRESS)),
        }
    }

    /// The host name, if this is a host name target
    pub fn host(&self) -> Option<&str> {
        match self {
            Self::HostName(name) => Some(name),
            _ => None,
        }
    }

    /// Whether this is the local-network sentinel
    pub const fn is_local_wifi(&self) -> bool {
        matches!(self, Self::LocalWifi)
    }
}

impl From<IpAddr> for Target {
    fn from(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(v4) => Self::Ipv4(v4),
            IpAddr::V6(v6) => Self::Ipv6(v6),
        }
    }
}

impl FromStr for Target {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HostName(name) => f.write_str(name),
            Self::Ipv4(addr) => write!(f, "{}", addr),
            Self::Ipv6(addr) => write!(f, "{}", addr),
            Self::AnyHost => f.write_str("<any host>"),
            Self::LocalWifi => f.write_str("<local wifi>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_textual_and_byte_forms_compare_equal() {
        assert_eq!(Target::parse("1.2.3.4").unwrap(), Target::ipv4([1, 2, 3, 4]));

        let mut octets = [0u8; 16];
        octets[15] = 1;
        assert_eq!(Target::parse("::1").unwrap(), Target::ipv6(octets));
    }

    #[test]
    fn test_invalid_textual_address() {
        let err = Target::parse("not-an-address").unwrap_err();
        assert!(matches!(err, Error::InvalidAddress(ref text) if text == "not-an-address"));

        assert!(Target::parse("256.1.1.1").is_err());
        assert!(Target::parse("").is_err());
    }

    #[test]
    fn test_host_name_normalization() {
        assert_eq!(
            Target::host_name(" Example.TEST ").unwrap(),
            Target::HostName("example.test".to_string())
        );
        assert_eq!(Target::host_name("10.0.0.1").unwrap(), Target::ipv4([10, 0, 0, 1]));
        assert!(matches!(Target::host_name("   "), Err(Error::InvalidHostName(_))));
    }

    #[test]
    fn test_lookup_addresses() {
        assert_eq!(Target::local_wifi().lookup_address(), Some("169.254.0.0".parse().unwrap()));
        assert_eq!(Target::any_host().lookup_address(), Some("0.0.0.0".parse().unwrap()));
        assert_eq!(Target::host_name("example.test").unwrap().lookup_address(), None);
        assert!(Target::local_wifi().is_local_wifi());
        assert!(!Target::any_host().is_local_wifi());
    }

    #[test]
    fn test_from_config_string() {
        assert_eq!(Target::from_config("any").unwrap(), Target::AnyHost);
        assert_eq!(Target::from_config("WiFi").unwrap(), Target::LocalWifi);
        assert_eq!(Target::from_config("8.8.8.8").unwrap(), Target::ipv4([8, 8, 8, 8]));
        assert_eq!(Target::from_config("example.test").unwrap().host(), Some("example.test"));
    }

    #[test]
    fn test_target_serialization() {
        let json = serde_json::to_value(Target::ipv4([8, 8, 8, 8])).unwrap();
        assert_eq!(json, serde_json::json!({ "kind": "ipv4", "value": "8.8.8.8" }));

        let json = serde_json::to_value(Target::AnyHost).unwrap();
        assert_eq!(json, serde_json::json!({ "kind": "any_host" }));
    }
}
