//! SSDP discovery of Internet Gateway Devices.
//!
//! A search sends M-SEARCH datagrams in rounds. Each round waits on a hard
//! deadline; a round without answers is repeated with a larger MX until the
//! retry budget is spent.

use crate::config::ControlPointConfig;
use crate::error::{Error, Result};
use crate::quirks::GatewaySignature;
use serde::Serialize;
use socket2::{Domain, Protocol, Socket, Type};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant};

/// SSDP multicast address.
pub const SSDP_MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);

/// SSDP port.
pub const SSDP_PORT: u16 = 1900;

/// Search target of an IGD root device.
pub const IGD_SEARCH_TARGET: &str = "urn:schemas-upnp-org:device:InternetGatewayDevice:1";

const MAX_MX: u32 = 5;
const WINDOW_MARGIN: Duration = Duration::from_millis(500);
const MULTICAST_TTL: u32 = 2;

/// A gateway's answer to M-SEARCH.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Advertisement {
    pub location: String,
    pub usn: String,
    pub st: String,
    pub server: String,
    /// Source address of the response datagram.
    pub from: SocketAddr,
    /// All response headers as received.
    pub headers: Vec<(String, String)>,
}

impl Advertisement {
    pub fn signature(&self) -> GatewaySignature {
        GatewaySignature::from_server(self.server.clone())
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        header(&self.headers, name)
    }
}

/// An M-SEARCH request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub search_target: String,
    pub mx: u32,
    /// Overrides, written first and verbatim in this order.
    pub headers: Vec<(String, String)>,
}

impl SearchRequest {
    pub fn to_datagram(&self) -> String {
        let mut datagram = String::from("M-SEARCH * HTTP/1.1\r\n");
        for (name, value) in &self.headers {
            datagram.push_str(&format!("{name}: {value}\r\n"));
        }

        let defaults = [
            ("HOST", format!("{SSDP_MULTICAST_ADDR}:{SSDP_PORT}")),
            ("MAN", "\"ssdp:discover\"".to_string()),
            ("MX", self.mx.to_string()),
            ("ST", self.search_target.clone()),
        ];
        for (name, value) in defaults {
            if header(&self.headers, name).is_none() {
                datagram.push_str(&format!("{name}: {value}\r\n"));
            }
        }
        datagram.push_str("\r\n");
        datagram
    }
}

fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Parse an M-SEARCH response. Returns `None` for anything that is not a
/// `200` response carrying `LOCATION` and `USN`.
pub fn parse_response(datagram: &str, from: SocketAddr) -> Option<Advertisement> {
    let mut lines = datagram.lines();
    let status = lines.next()?.trim();
    let mut parts = status.split_whitespace();
    if !parts.next()?.starts_with("HTTP/") || parts.next()? != "200" {
        return None;
    }

    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| {
            let value = value.trim().trim_matches('"');
            (name.trim().to_string(), value.to_string())
        })
        .collect();

    let location = header(&headers, "LOCATION").filter(|v| !v.is_empty())?;
    let usn = header(&headers, "USN").filter(|v| !v.is_empty())?;
    Some(Advertisement {
        location: location.to_string(),
        usn: usn.to_string(),
        st: header(&headers, "ST").unwrap_or_default().to_string(),
        server: header(&headers, "SERVER").unwrap_or_default().to_string(),
        from,
        headers,
    })
}

/// Accepted advertisements of one search, deduplicated by USN.
struct Collector {
    filter: Option<IpAddr>,
    seen: HashSet<String>,
    found: Vec<Advertisement>,
}

impl Collector {
    fn new(filter: Option<IpAddr>) -> Self {
        Collector {
            filter,
            seen: HashSet::new(),
            found: Vec::new(),
        }
    }

    fn accept(&mut self, advertisement: Advertisement) -> bool {
        if let Some(expected) = self.filter {
            if advertisement.from.ip() != expected {
                tracing::debug!(from = %advertisement.from, %expected, "ignoring response from other host");
                return false;
            }
        }
        if !self.seen.insert(advertisement.usn.clone()) {
            tracing::debug!(usn = %advertisement.usn, "duplicate advertisement");
            return false;
        }
        self.found.push(advertisement);
        true
    }
}

/// Search for gateways as configured.
///
/// With a gateway address the search is unicast to it, only its answer is
/// accepted and the first answer ends the search. Otherwise the search is
/// multicast and every gateway answering within the window is returned in
/// arrival order.
pub async fn search(config: &ControlPointConfig) -> Result<Vec<Advertisement>> {
    match config.gateway_addr {
        Some(gateway) => {
            let dest = SocketAddr::new(gateway, config.ssdp_port);
            run(config, dest, Some(gateway)).await
        }
        None => {
            let dest = SocketAddr::new(SSDP_MULTICAST_ADDR.into(), config.ssdp_port);
            run(config, dest, None).await
        }
    }
}

/// Search by sending M-SEARCH to an explicit responder, accepting answers
/// from any host.
pub async fn search_to(config: &ControlPointConfig, dest: SocketAddr) -> Result<Vec<Advertisement>> {
    run(config, dest, None).await
}

async fn run(
    config: &ControlPointConfig,
    dest: SocketAddr,
    filter: Option<IpAddr>,
) -> Result<Vec<Advertisement>> {
    let socket = bind_search_socket(config.local_addr, &dest)?;
    let attempts = config.discovery_retries.saturating_add(1);
    let first_mx = u32::from(config.mx).clamp(1, MAX_MX);
    let mut collector = Collector::new(filter);
    let mut buf = [0u8; 2048];

    for round in 0..attempts {
        let mx = first_mx.saturating_add(round).min(MAX_MX);
        let request = SearchRequest {
            search_target: config.search_target.clone(),
            mx,
            headers: config.msearch_headers.clone(),
        }
        .to_datagram();
        tracing::debug!(%dest, round, mx, "sending M-SEARCH");
        socket.send_to(request.as_bytes(), dest).await?;

        let deadline = Instant::now() + response_window(config, first_mx, mx);
        loop {
            match timeout_at(deadline, socket.recv_from(&mut buf)).await {
                Err(_) => break,
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "SSDP receive failed, ending round");
                    break;
                }
                Ok(Ok((len, from))) => {
                    let datagram = String::from_utf8_lossy(&buf[..len]);
                    tracing::debug!(%from, %datagram, "SSDP response");
                    let Some(advertisement) = parse_response(&datagram, from) else {
                        tracing::debug!(%from, "skipping malformed SSDP response");
                        continue;
                    };
                    if collector.accept(advertisement) && filter.is_some() {
                        return Ok(collector.found);
                    }
                }
            }
        }

        if !collector.found.is_empty() {
            return Ok(collector.found);
        }
        tracing::debug!(round, "no answer to M-SEARCH");
    }

    Err(match filter {
        Some(addr) => Error::DiscoveryTargetUnreachable { addr },
        None => Error::DiscoveryTimeout { attempts },
    })
}

fn response_window(config: &ControlPointConfig, first_mx: u32, mx: u32) -> Duration {
    match config.response_window {
        Some(window) => window * mx / first_mx,
        None => Duration::from_secs(u64::from(mx)) + WINDOW_MARGIN,
    }
}

/// Create the UDP socket a search is sent from.
/// Local IPv4 address the host uses to reach `peer`.
///
/// Connecting a UDP socket sends nothing; it only makes the kernel pick the
/// outgoing interface.
pub async fn route_local_addr(peer: SocketAddr) -> Result<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
    socket.connect(peer).await?;
    match socket.local_addr()?.ip() {
        IpAddr::V4(addr) if !addr.is_unspecified() => Ok(addr),
        _ => Err(Error::LocalAddressUnknown { gateway: peer.ip() }),
    }
}

fn bind_search_socket(local: Ipv4Addr, dest: &SocketAddr) -> Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&SocketAddrV4::new(local, 0).into())?;

    if dest.ip().is_multicast() {
        socket.set_multicast_if_v4(&local)?;
        socket.set_multicast_ttl_v4(MULTICAST_TTL)?;
    }
    socket.set_nonblocking(true)?;

    Ok(UdpSocket::from_std(socket.into())?)
}
