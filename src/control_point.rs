//! Control point façade: one method per command, plus [`Command`] dispatch.

use crate::config::ControlPointConfig;
use crate::error::{Error, Result};
use crate::mapping::{PortMappingEntry, Protocol};
use crate::session::GatewaySession;
use crate::ssdp::{self, Advertisement};
use serde::Serialize;
use std::net::IpAddr;

/// A UPnP IGD control point.
///
/// Actions need a session; [`ControlPoint::connect`] establishes it. The typed
/// methods fail with [`Error::NotReady`] before that, without touching the
/// network. [`ControlPoint::execute`] connects on demand.
#[derive(Debug)]
pub struct ControlPoint {
    config: ControlPointConfig,
    session: Option<GatewaySession>,
}

impl ControlPoint {
    pub fn new(config: ControlPointConfig) -> Self {
        ControlPoint {
            config,
            session: None,
        }
    }

    pub fn config(&self) -> &ControlPointConfig {
        &self.config
    }

    /// Discover and describe the gateway, unless already done.
    pub async fn connect(&mut self) -> Result<&GatewaySession> {
        if self.session.is_none() {
            let session = GatewaySession::establish(&self.config).await?;
            self.session = Some(session);
        }
        self.session()
    }

    /// Use a gateway found by an earlier search instead of searching again.
    pub async fn connect_to(&mut self, advertisement: Advertisement) -> Result<&GatewaySession> {
        let session = GatewaySession::from_advertisement(&self.config, advertisement).await?;
        self.session = Some(session);
        self.session()
    }

    pub fn session(&self) -> Result<&GatewaySession> {
        self.session.as_ref().ok_or(Error::NotReady)
    }

    /// Every gateway answering the search, deduplicated, in arrival order.
    pub async fn m_search(&self) -> Result<Vec<Advertisement>> {
        ssdp::search(&self.config).await
    }

    pub async fn get_external_ip(&self) -> Result<Option<IpAddr>> {
        self.session()?.port_mappings().get_external_ip().await
    }

    pub async fn add_port_mapping(&self, entry: &PortMappingEntry) -> Result<()> {
        self.session()?.port_mappings().add_port_mapping(entry).await
    }

    pub async fn get_port_mapping_by_index(&self, index: u32) -> Result<PortMappingEntry> {
        self.session()?
            .port_mappings()
            .get_port_mapping_by_index(index)
            .await
    }

    pub async fn get_redirects(&self) -> Result<Vec<PortMappingEntry>> {
        self.session()?.port_mappings().get_redirects().await
    }

    pub async fn get_specific_port_mapping(
        &self,
        remote_host: Option<&str>,
        external_port: u16,
        protocol: Protocol,
    ) -> Result<PortMappingEntry> {
        self.session()?
            .port_mappings()
            .get_specific_port_mapping(remote_host, external_port, protocol)
            .await
    }

    pub async fn delete_port_mapping(
        &self,
        remote_host: Option<&str>,
        external_port: u16,
        protocol: Protocol,
    ) -> Result<()> {
        self.session()?
            .port_mappings()
            .delete_port_mapping(remote_host, external_port, protocol)
            .await
    }

    pub async fn get_next_mapping(
        &self,
        protocol: Protocol,
        base: u16,
        template: Option<&PortMappingEntry>,
    ) -> Result<u16> {
        self.session()?
            .port_mappings()
            .get_next_mapping(protocol, base, template)
            .await
    }

    /// Run a command, connecting first when it needs a session.
    pub async fn execute(&mut self, command: Command) -> Result<CommandOutput> {
        if command != Command::MSearch {
            self.connect().await?;
        }

        match command {
            Command::MSearch => self.m_search().await.map(CommandOutput::Gateways),
            Command::GetExternalIp => self.get_external_ip().await.map(CommandOutput::ExternalIp),
            Command::AddPortMapping(request) => {
                let entry = request.into_entry(self.session()?.default_internal_client());
                self.add_port_mapping(&entry).await?;
                Ok(CommandOutput::Done)
            }
            Command::GetPortMappingByIndex { index } => self
                .get_port_mapping_by_index(index)
                .await
                .map(CommandOutput::Entry),
            Command::GetRedirects => self.get_redirects().await.map(CommandOutput::Entries),
            Command::GetSpecificPortMapping {
                remote_host,
                external_port,
                protocol,
            } => self
                .get_specific_port_mapping(remote_host.as_deref(), external_port, protocol)
                .await
                .map(CommandOutput::Entry),
            Command::DeletePortMapping {
                remote_host,
                external_port,
                protocol,
            } => {
                self.delete_port_mapping(remote_host.as_deref(), external_port, protocol)
                    .await?;
                Ok(CommandOutput::Done)
            }
            Command::GetNextMapping {
                protocol,
                base,
                template,
            } => {
                let default_client = self.session()?.default_internal_client();
                let template = template.map(|request| request.into_entry(default_client));
                let added = template.is_some();
                let port = self
                    .get_next_mapping(protocol, base, template.as_ref())
                    .await?;
                Ok(CommandOutput::NextPort { port, added })
            }
        }
    }
}

/// A mapping to create. The internal client defaults to the session's LAN
/// address, else its local interface address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingRequest {
    pub external_port: u16,
    pub protocol: Protocol,
    pub internal_port: u16,
    pub internal_client: Option<IpAddr>,
    pub remote_host: Option<String>,
    pub enabled: bool,
    pub description: String,
    pub lease_duration: u32,
}

impl MappingRequest {
    pub fn new(external_port: u16, protocol: Protocol, internal_port: u16) -> Self {
        MappingRequest {
            external_port,
            protocol,
            internal_port,
            internal_client: None,
            remote_host: None,
            enabled: true,
            description: String::new(),
            lease_duration: 0,
        }
    }

    pub fn with_internal_client(mut self, client: impl Into<IpAddr>) -> Self {
        self.internal_client = Some(client.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_lease(mut self, seconds: u32) -> Self {
        self.lease_duration = seconds;
        self
    }

    fn into_entry(self, default_client: IpAddr) -> PortMappingEntry {
        PortMappingEntry {
            external_port: self.external_port,
            protocol: self.protocol,
            remote_host: self.remote_host,
            internal_client: self.internal_client.unwrap_or(default_client),
            internal_port: self.internal_port,
            enabled: self.enabled,
            description: self.description,
            lease_duration: self.lease_duration,
        }
    }
}

/// Commands understood by [`ControlPoint::execute`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    MSearch,
    GetExternalIp,
    AddPortMapping(MappingRequest),
    GetPortMappingByIndex {
        index: u32,
    },
    GetRedirects,
    GetSpecificPortMapping {
        remote_host: Option<String>,
        external_port: u16,
        protocol: Protocol,
    },
    DeletePortMapping {
        remote_host: Option<String>,
        external_port: u16,
        protocol: Protocol,
    },
    /// Find the next free port; with a template, also map it.
    GetNextMapping {
        protocol: Protocol,
        base: u16,
        template: Option<MappingRequest>,
    },
}

/// Result of a command, serializable for rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandOutput {
    Gateways(Vec<Advertisement>),
    ExternalIp(Option<IpAddr>),
    Done,
    Entry(PortMappingEntry),
    Entries(Vec<PortMappingEntry>),
    NextPort { port: u16, added: bool },
}
