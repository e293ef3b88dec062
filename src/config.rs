//! Control point configuration.

use crate::error::{Error, Result};
use crate::ssdp::{IGD_SEARCH_TARGET, SSDP_PORT};
use serde::{Deserialize, Deserializer};
use std::io;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

/// Settings for discovery, description retrieval and action invocation.
///
/// Durations are written as seconds (fractions allowed) when deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ControlPointConfig {
    /// Local IPv4 address the search socket binds to. When unspecified, the
    /// session learns the address on the route to the gateway.
    pub local_addr: Ipv4Addr,
    /// Known gateway address. Discovery is unicast to it and only its answer counts.
    pub gateway_addr: Option<IpAddr>,
    /// Address used as internal client when a mapping command omits one.
    pub lan_addr: Option<IpAddr>,
    /// Timeout of every HTTP request.
    #[serde(deserialize_with = "seconds")]
    pub timeout: Duration,
    /// MX of the first M-SEARCH; later rounds grow it up to 5.
    pub mx: u8,
    /// Searches sent after the first one finds nothing.
    pub discovery_retries: u32,
    /// Receive window of the first round; `None` waits MX seconds plus a margin.
    #[serde(deserialize_with = "optional_seconds")]
    pub response_window: Option<Duration>,
    pub search_target: String,
    /// Header overrides for the M-SEARCH datagram, emitted in this order.
    pub msearch_headers: Vec<(String, String)>,
    pub ssdp_port: u16,
    /// Maximum number of entries read while enumerating port mappings.
    pub enumeration_limit: u32,
}

impl Default for ControlPointConfig {
    fn default() -> Self {
        ControlPointConfig {
            local_addr: Ipv4Addr::UNSPECIFIED,
            gateway_addr: None,
            lan_addr: None,
            timeout: Duration::from_secs(5),
            mx: 2,
            discovery_retries: 2,
            response_window: None,
            search_target: IGD_SEARCH_TARGET.to_string(),
            msearch_headers: Vec::new(),
            ssdp_port: SSDP_PORT,
            enumeration_limit: 1024,
        }
    }
}

impl ControlPointConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_local_addr(mut self, addr: Ipv4Addr) -> Self {
        self.local_addr = addr;
        self
    }

    /// Bind to the IPv4 address of a named interface.
    pub fn with_interface(mut self, provider: &dyn InterfaceProvider, name: &str) -> Result<Self> {
        self.local_addr = select_interface_address(provider, name)?;
        Ok(self)
    }

    pub fn with_gateway(mut self, addr: impl Into<IpAddr>) -> Self {
        self.gateway_addr = Some(addr.into());
        self
    }

    pub fn with_lan_addr(mut self, addr: impl Into<IpAddr>) -> Self {
        self.lan_addr = Some(addr.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_mx(mut self, mx: u8) -> Self {
        self.mx = mx;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.discovery_retries = retries;
        self
    }

    pub fn with_response_window(mut self, window: Duration) -> Self {
        self.response_window = Some(window);
        self
    }

    pub fn with_search_target(mut self, target: impl Into<String>) -> Self {
        self.search_target = target.into();
        self
    }

    /// Append an M-SEARCH header override.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.msearch_headers.push((name.into(), value.into()));
        self
    }

    pub fn with_ssdp_port(mut self, port: u16) -> Self {
        self.ssdp_port = port;
        self
    }

    pub fn with_enumeration_limit(mut self, limit: u32) -> Self {
        self.enumeration_limit = limit;
        self
    }
}

fn seconds<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Duration, D::Error> {
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}

fn optional_seconds<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<Duration>, D::Error> {
    match Option::<f64>::deserialize(deserializer)? {
        Some(secs) => Duration::try_from_secs_f64(secs)
            .map(Some)
            .map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

/// A network interface and its addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalInterface {
    pub name: String,
    pub addresses: Vec<IpAddr>,
}

/// Source of the host's network interfaces.
pub trait InterfaceProvider {
    fn interfaces(&self) -> io::Result<Vec<LocalInterface>>;
}

/// First IPv4 address of the named interface.
pub fn select_interface_address(provider: &dyn InterfaceProvider, name: &str) -> Result<Ipv4Addr> {
    provider
        .interfaces()?
        .into_iter()
        .filter(|iface| iface.name == name)
        .flat_map(|iface| iface.addresses)
        .find_map(|addr| match addr {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        })
        .ok_or_else(|| Error::InterfaceNotFound(name.to_string()))
}
