//! A discovered, described gateway ready for action invocation.

use crate::config::ControlPointConfig;
use crate::description;
use crate::error::{Error, Result};
use crate::http::HttpClient;
use crate::mapping::PortMappings;
use crate::model::{Device, Service};
use crate::quirks::{GatewaySignature, HeaderCase, Quirks};
use crate::soap::{ActionResponse, SoapClient, Value};
use crate::ssdp::{self, Advertisement};
use std::net::{IpAddr, Ipv4Addr};

/// Everything learned about one gateway. Immutable once established.
#[derive(Debug)]
pub struct GatewaySession {
    advertisement: Advertisement,
    device: Device,
    service: Service,
    signature: GatewaySignature,
    quirks: &'static Quirks,
    local_addr: Ipv4Addr,
    lan_addr: Option<IpAddr>,
    search_headers: Vec<(String, String)>,
    enumeration_limit: u32,
    soap: SoapClient,
}

impl GatewaySession {
    /// Discover a gateway and read its description.
    ///
    /// When several gateways answer, the first to answer is used.
    pub async fn establish(config: &ControlPointConfig) -> Result<Self> {
        let mut advertisements = ssdp::search(config).await?.into_iter();
        let chosen = advertisements.next().ok_or(Error::DiscoveryTimeout {
            attempts: config.discovery_retries.saturating_add(1),
        })?;
        for other in advertisements {
            tracing::debug!(location = %other.location, usn = %other.usn, "ignoring additional gateway");
        }
        tracing::info!(
            location = %chosen.location,
            server = %chosen.server,
            from = %chosen.from,
            "using gateway"
        );
        Self::from_advertisement(config, chosen).await
    }

    /// Read the description of an already discovered gateway.
    pub async fn from_advertisement(
        config: &ControlPointConfig,
        advertisement: Advertisement,
    ) -> Result<Self> {
        let http = HttpClient::new(config.timeout, HeaderCase::default())?;
        let description =
            description::fetch(&http, &advertisement.location, &advertisement.server).await?;

        let service = description
            .device
            .wan_connection_service()
            .cloned()
            .ok_or_else(|| Error::CapabilityNotFound {
                device: device_label(&description.device),
            })?;
        tracing::debug!(
            service_type = %service.service_type,
            control_url = %service.control_url,
            actions = service.actions.len(),
            "selected WAN connection service"
        );

        let local_addr = if config.local_addr.is_unspecified() {
            let addr = ssdp::route_local_addr(advertisement.from).await?;
            tracing::debug!(local_addr = %addr, gateway = %advertisement.from, "learned local address");
            addr
        } else {
            config.local_addr
        };

        let quirks = description.quirks;
        let http = if quirks.header_case == HeaderCase::default() {
            http
        } else {
            HttpClient::new(config.timeout, quirks.header_case)?
        };

        Ok(GatewaySession {
            advertisement,
            device: description.device,
            service,
            signature: description.signature,
            quirks,
            local_addr,
            lan_addr: config.lan_addr,
            search_headers: config.msearch_headers.clone(),
            enumeration_limit: config.enumeration_limit,
            soap: SoapClient::new(http, quirks),
        })
    }

    /// Invoke an action on the WAN connection service.
    pub async fn invoke(&self, action: &str, args: &[(&str, Value)]) -> Result<ActionResponse> {
        self.soap.invoke(&self.service, action, args).await
    }

    pub fn port_mappings(&self) -> PortMappings<'_> {
        PortMappings::new(self)
    }

    pub fn advertisement(&self) -> &Advertisement {
        &self.advertisement
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// The WAN connection service actions are sent to.
    pub fn service(&self) -> &Service {
        &self.service
    }

    pub fn signature(&self) -> &GatewaySignature {
        &self.signature
    }

    pub fn quirks(&self) -> &'static Quirks {
        self.quirks
    }

    /// Local address on the route to the gateway. Learned from the routing
    /// table when the configuration leaves it unspecified.
    pub fn local_addr(&self) -> Ipv4Addr {
        self.local_addr
    }

    /// Address the gateway answered discovery from.
    pub fn gateway_addr(&self) -> IpAddr {
        self.advertisement.from.ip()
    }

    pub fn lan_addr(&self) -> Option<IpAddr> {
        self.lan_addr
    }

    /// Internal client used when a mapping request names none.
    pub fn default_internal_client(&self) -> IpAddr {
        self.lan_addr.unwrap_or(IpAddr::V4(self.local_addr))
    }

    pub fn search_headers(&self) -> &[(String, String)] {
        &self.search_headers
    }

    pub fn enumeration_limit(&self) -> u32 {
        self.enumeration_limit
    }
}

fn device_label(device: &Device) -> String {
    if !device.friendly_name.is_empty() {
        device.friendly_name.clone()
    } else if !device.udn.is_empty() {
        device.udn.clone()
    } else {
        device.device_type.clone()
    }
}
