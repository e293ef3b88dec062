//! # igd-control
//!
//! A UPnP Internet Gateway Device (IGD) control point: finds the gateway with
//! SSDP, reads its device and service descriptions, and manages port mappings
//! through SOAP actions on its WAN connection service.
//!
//! Gateways that bend the IGD specification are handled by a table of vendor
//! quirks, see [`quirks`].
//!
//! ## Example
//!
//! ```no_run
//! use igd_control::{ControlPoint, ControlPointConfig, MappingRequest, Protocol};
//!
//! # async fn run() -> igd_control::Result<()> {
//! let mut control_point = ControlPoint::new(ControlPointConfig::default());
//! control_point.connect().await?;
//!
//! let external_ip = control_point.get_external_ip().await?;
//! println!("external address: {external_ip:?}");
//!
//! let port = control_point.get_next_mapping(Protocol::TCP, 8000, None).await?;
//! println!("next free TCP port: {port}");
//! # let _ = MappingRequest::new(port, Protocol::TCP, port);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod control_point;
pub mod description;
pub mod error;
pub mod mapping;
pub mod model;
pub mod quirks;
pub mod session;
pub mod soap;
pub mod ssdp;

mod http;
mod xml;

// Re-exports for convenience
pub use config::{ControlPointConfig, InterfaceProvider, LocalInterface};
pub use control_point::{Command, CommandOutput, ControlPoint, MappingRequest};
pub use error::{Error, Phase, Result};
pub use mapping::{PortMappingEntry, Protocol};
pub use session::GatewaySession;
pub use soap::{ActionResponse, FaultKind, SoapFault, Value};
pub use ssdp::Advertisement;
