//! Error types for igd-control.

use crate::soap::SoapFault;
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for igd-control operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to a gateway.
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to create, bind or use the SSDP socket.
    #[error("socket error: {0}")]
    Socket(#[from] std::io::Error),

    /// No gateway answered the M-SEARCH.
    #[error("no gateway answered M-SEARCH after {attempts} attempt(s)")]
    DiscoveryTimeout { attempts: u32 },

    /// A gateway address was given but it never answered.
    #[error("gateway {addr} did not answer M-SEARCH")]
    DiscoveryTargetUnreachable { addr: IpAddr },

    /// A description or SCPD document could not be retrieved.
    #[error("failed to fetch {document} from {url}: {cause}")]
    DescriptionUnreachable {
        document: Document,
        url: String,
        #[source]
        cause: TransportFailure,
    },

    /// A description or SCPD document could not be parsed, even tolerantly.
    #[error("failed to parse {document}: {reason}")]
    DescriptionParse { document: Document, reason: String },

    /// The gateway exposes no WAN connection service.
    #[error("device {device} exposes no WANIPConnection or WANPPPConnection service")]
    CapabilityNotFound { device: String },

    /// The action is not declared by the resolved service.
    #[error("action {action} is not declared by {service}")]
    ActionNotSupported { service: String, action: String },

    /// An input argument is missing, undeclared or does not fit its data type.
    #[error("invalid argument {argument} for {action}: {reason}")]
    InvalidArgument {
        action: String,
        argument: String,
        reason: String,
    },

    /// HTTP-level failure while invoking an action.
    #[error("SOAP request {action} failed: {cause}")]
    SoapTransport {
        action: String,
        #[source]
        cause: TransportFailure,
    },

    /// The gateway answered with a SOAP fault.
    #[error("{action} failed: {fault}")]
    SoapFault {
        action: String,
        #[source]
        fault: SoapFault,
    },

    /// A required output argument was absent from the response.
    #[error("{action} response is missing {argument}")]
    MissingOutput { action: String, argument: String },

    /// An output argument could not be decoded.
    #[error("{action} returned an invalid {argument}: {value:?}")]
    InvalidOutput {
        action: String,
        argument: String,
        value: String,
    },

    /// Port mapping enumeration never saw an end-of-list signal.
    #[error("port mapping list did not terminate within {limit} entries")]
    EnumerationUnterminated { limit: u32 },

    /// Every port at or above the base is taken.
    #[error("no free external port at or above {start}")]
    PortsExhausted { start: u16 },

    /// The interface provider has no IPv4 address for the named interface.
    #[error("interface {0} not found or has no IPv4 address")]
    InterfaceNotFound(String),

    /// No local IPv4 address routes to the gateway.
    #[error("no local IPv4 address routes to gateway {gateway}")]
    LocalAddressUnknown { gateway: IpAddr },

    /// Failed to build the HTTP client.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    /// An action was requested before discovery and description succeeded.
    #[error("gateway session is not ready: discovery and description must succeed first")]
    NotReady,
}

/// The phase a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Discovery,
    Description,
    Action,
    Session,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Discovery => "discovery",
            Phase::Description => "description",
            Phase::Action => "action",
            Phase::Session => "session",
        };
        f.write_str(name)
    }
}

impl Error {
    /// The phase that failed.
    pub fn phase(&self) -> Phase {
        match self {
            Error::Socket(_)
            | Error::DiscoveryTimeout { .. }
            | Error::DiscoveryTargetUnreachable { .. } => Phase::Discovery,
            Error::DescriptionUnreachable { .. }
            | Error::DescriptionParse { .. }
            | Error::CapabilityNotFound { .. } => Phase::Description,
            Error::ActionNotSupported { .. }
            | Error::InvalidArgument { .. }
            | Error::SoapTransport { .. }
            | Error::SoapFault { .. }
            | Error::MissingOutput { .. }
            | Error::InvalidOutput { .. }
            | Error::EnumerationUnterminated { .. }
            | Error::PortsExhausted { .. } => Phase::Action,
            Error::InterfaceNotFound(_)
            | Error::LocalAddressUnknown { .. }
            | Error::HttpClient(_)
            | Error::NotReady => Phase::Session,
        }
    }

    /// The SOAP fault carried by this error, if any.
    pub fn soap_fault(&self) -> Option<&SoapFault> {
        match self {
            Error::SoapFault { fault, .. } => Some(fault),
            _ => None,
        }
    }

    /// Whether the failure was caused by a network timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::DiscoveryTimeout { .. } | Error::DiscoveryTargetUnreachable { .. } => true,
            Error::DescriptionUnreachable { cause, .. } | Error::SoapTransport { cause, .. } => {
                cause.is_timeout()
            }
            _ => false,
        }
    }
}

/// Identifies which XML document a description failure refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Document {
    /// The root device description at the LOCATION URL.
    Root,
    /// The SCPD of the named service.
    Scpd { service_id: String },
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Document::Root => f.write_str("root device description"),
            Document::Scpd { service_id } => write!(f, "SCPD of {service_id}"),
        }
    }
}

/// Why an HTTP exchange failed.
#[derive(Debug, Error)]
pub enum TransportFailure {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error(transparent)]
    Http(reqwest::Error),

    #[error("connection failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed HTTP response: {0}")]
    MalformedResponse(String),
}

impl TransportFailure {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportFailure::Timeout(_))
    }
}
