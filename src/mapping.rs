//! Port mapping operations on the gateway's WAN connection service.
//!
//! Nothing is cached: every read goes to the gateway.

use crate::error::{Error, Result};
use crate::session::GatewaySession;
use crate::soap::{ActionResponse, Value};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Protocol type for port mappings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Protocol {
    TCP,
    UDP,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::TCP => "TCP",
            Protocol::UDP => "UDP",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "TCP" => Ok(Protocol::TCP),
            "UDP" => Ok(Protocol::UDP),
            other => Err(format!("unknown protocol {other:?}")),
        }
    }
}

/// A NAT rule on the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortMappingEntry {
    pub external_port: u16,
    pub protocol: Protocol,
    /// `None` is the wildcard (any remote host).
    pub remote_host: Option<String>,
    pub internal_client: IpAddr,
    pub internal_port: u16,
    pub enabled: bool,
    pub description: String,
    /// Lease in seconds; 0 means no expiry.
    pub lease_duration: u32,
}

const ADD_PORT_MAPPING: &str = "AddPortMapping";
const DELETE_PORT_MAPPING: &str = "DeletePortMapping";
const GET_EXTERNAL_IP: &str = "GetExternalIPAddress";
const GET_GENERIC_ENTRY: &str = "GetGenericPortMappingEntry";
const GET_SPECIFIC_ENTRY: &str = "GetSpecificPortMappingEntry";

/// Port mapping operations bound to a session.
#[derive(Debug, Clone, Copy)]
pub struct PortMappings<'a> {
    session: &'a GatewaySession,
}

impl<'a> PortMappings<'a> {
    pub(crate) fn new(session: &'a GatewaySession) -> Self {
        PortMappings { session }
    }

    /// The gateway's external address. `None` when the gateway reports none,
    /// e.g. while the WAN link is down.
    pub async fn get_external_ip(&self) -> Result<Option<IpAddr>> {
        let response = self.session.invoke(GET_EXTERNAL_IP, &[]).await?;
        let Some(raw) = response.get("NewExternalIPAddress").map(str::trim) else {
            return Ok(None);
        };
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse()
            .map(Some)
            .map_err(|_| invalid_output(&response, "NewExternalIPAddress", raw))
    }

    pub async fn add_port_mapping(&self, entry: &PortMappingEntry) -> Result<()> {
        self.session
            .invoke(
                ADD_PORT_MAPPING,
                &[
                    ("NewRemoteHost", remote_host_value(entry.remote_host.as_deref())),
                    ("NewExternalPort", entry.external_port.into()),
                    ("NewProtocol", entry.protocol.as_str().into()),
                    ("NewInternalPort", entry.internal_port.into()),
                    ("NewInternalClient", entry.internal_client.to_string().into()),
                    ("NewEnabled", entry.enabled.into()),
                    ("NewPortMappingDescription", entry.description.as_str().into()),
                    ("NewLeaseDuration", entry.lease_duration.into()),
                ],
            )
            .await?;
        tracing::info!(
            external_port = entry.external_port,
            protocol = %entry.protocol,
            internal = %entry.internal_client,
            internal_port = entry.internal_port,
            "added port mapping"
        );
        Ok(())
    }

    pub async fn get_specific_port_mapping(
        &self,
        remote_host: Option<&str>,
        external_port: u16,
        protocol: Protocol,
    ) -> Result<PortMappingEntry> {
        let response = self
            .session
            .invoke(
                GET_SPECIFIC_ENTRY,
                &[
                    ("NewRemoteHost", remote_host_value(remote_host)),
                    ("NewExternalPort", external_port.into()),
                    ("NewProtocol", protocol.as_str().into()),
                ],
            )
            .await?;
        entry_from_response(
            &response,
            remote_host.filter(|h| !h.is_empty()).map(str::to_string),
            external_port,
            protocol,
        )
    }

    pub async fn get_port_mapping_by_index(&self, index: u32) -> Result<PortMappingEntry> {
        let response = self
            .session
            .invoke(GET_GENERIC_ENTRY, &[("NewPortMappingIndex", index.into())])
            .await?;
        let external_port = parse_output(&response, "NewExternalPort")?;
        let protocol = parse_output(&response, "NewProtocol")?;
        let remote_host = response
            .get("NewRemoteHost")
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(str::to_string);
        entry_from_response(&response, remote_host, external_port, protocol)
    }

    pub async fn delete_port_mapping(
        &self,
        remote_host: Option<&str>,
        external_port: u16,
        protocol: Protocol,
    ) -> Result<()> {
        self.session
            .invoke(
                DELETE_PORT_MAPPING,
                &[
                    ("NewRemoteHost", remote_host_value(remote_host)),
                    ("NewExternalPort", external_port.into()),
                    ("NewProtocol", protocol.as_str().into()),
                ],
            )
            .await?;
        tracing::info!(external_port, %protocol, "deleted port mapping");
        Ok(())
    }

    /// Every mapping on the gateway, read by index until an end-of-list fault.
    pub async fn get_redirects(&self) -> Result<Vec<PortMappingEntry>> {
        let quirks = self.session.quirks();
        let limit = self.session.enumeration_limit();
        let mut entries = Vec::new();
        for index in 0..limit {
            match self.get_port_mapping_by_index(index).await {
                Ok(entry) => entries.push(entry),
                Err(Error::SoapFault { fault, .. }) if quirks.is_end_of_list(fault.code) => {
                    tracing::debug!(index, code = fault.code, "end of port mapping list");
                    return Ok(entries);
                }
                Err(e) => return Err(e),
            }
        }
        Err(Error::EnumerationUnterminated { limit })
    }

    /// First free external port for `protocol`, see [`next_free_port`].
    ///
    /// With a template the port is also mapped: the template is added with
    /// its external port replaced, and its internal port too when that is 0.
    pub async fn get_next_mapping(
        &self,
        protocol: Protocol,
        base: u16,
        template: Option<&PortMappingEntry>,
    ) -> Result<u16> {
        let used: BTreeSet<u16> = self
            .get_redirects()
            .await?
            .into_iter()
            .filter(|entry| entry.protocol == protocol)
            .map(|entry| entry.external_port)
            .collect();
        let port = next_free_port(&used, base)?;

        if let Some(template) = template {
            let entry = PortMappingEntry {
                external_port: port,
                protocol,
                internal_port: if template.internal_port == 0 {
                    port
                } else {
                    template.internal_port
                },
                ..template.clone()
            };
            self.add_port_mapping(&entry).await?;
        }
        Ok(port)
    }
}

/// First port not in `used`, scanning up from the larger of `base` and the
/// lowest used port. With nothing in use that is `base` itself. Port 0 is
/// never returned.
pub fn next_free_port(used: &BTreeSet<u16>, base: u16) -> Result<u16> {
    let start = used
        .first()
        .map_or(base, |&lowest| lowest.max(base))
        .max(1);
    (start..=u16::MAX)
        .find(|port| !used.contains(port))
        .ok_or(Error::PortsExhausted { start })
}

fn remote_host_value(remote_host: Option<&str>) -> Value {
    remote_host.unwrap_or_default().into()
}

fn invalid_output(response: &ActionResponse, argument: &str, value: &str) -> Error {
    Error::InvalidOutput {
        action: response.action.clone(),
        argument: argument.to_string(),
        value: value.to_string(),
    }
}

fn parse_output<T: FromStr>(response: &ActionResponse, argument: &str) -> Result<T> {
    let raw = response.require(argument)?;
    raw.trim()
        .parse()
        .map_err(|_| invalid_output(response, argument, raw))
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

fn entry_from_response(
    response: &ActionResponse,
    remote_host: Option<String>,
    external_port: u16,
    protocol: Protocol,
) -> Result<PortMappingEntry> {
    let enabled = match response.get("NewEnabled") {
        Some(raw) => parse_bool(raw).ok_or_else(|| invalid_output(response, "NewEnabled", raw))?,
        None => true,
    };
    let lease_duration = match response.get("NewLeaseDuration").map(str::trim) {
        Some("") | None => 0,
        Some(raw) => raw
            .parse()
            .map_err(|_| invalid_output(response, "NewLeaseDuration", raw))?,
    };

    Ok(PortMappingEntry {
        external_port,
        protocol,
        remote_host,
        internal_client: parse_output(response, "NewInternalClient")?,
        internal_port: parse_output(response, "NewInternalPort")?,
        enabled,
        description: response
            .get("NewPortMappingDescription")
            .unwrap_or_default()
            .to_string(),
        lease_duration,
    })
}
