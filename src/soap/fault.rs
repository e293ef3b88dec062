//! SOAP fault decoding and the UPnP error code table.

use crate::quirks::{FaultShape, Quirks};
use crate::xml::{self, Element};
use std::fmt;
use thiserror::Error;

/// A UPnP error reported by the gateway in a SOAP fault.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("UPnP error {code} ({kind}): {description}")]
pub struct SoapFault {
    pub code: u16,
    pub description: String,
    pub kind: FaultKind,
}

impl SoapFault {
    pub fn new(code: u16, description: impl Into<String>) -> Self {
        SoapFault {
            code,
            description: description.into(),
            kind: FaultKind::from_code(code),
        }
    }
}

/// Meaning of a UPnP error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    InvalidAction,
    InvalidArgs,
    ActionFailed,
    ArgumentValueInvalid,
    ArgumentValueOutOfRange,
    OptionalActionNotImplemented,
    OutOfMemory,
    HumanInterventionRequired,
    StringArgumentTooLong,
    ActionNotAuthorized,
    SpecifiedArrayIndexInvalid,
    NoSuchEntryInArray,
    WildCardNotPermittedInSrcIp,
    WildCardNotPermittedInExtPort,
    ConflictInMappingEntry,
    SamePortValuesRequired,
    OnlyPermanentLeasesSupported,
    RemoteHostOnlySupportsWildcard,
    ExternalPortOnlySupportsWildcard,
    NoPortMapsAvailable,
    ConflictWithOtherMechanisms,
    WildCardNotPermittedInIntPort,
    UnknownVendorError,
}

impl FaultKind {
    pub fn from_code(code: u16) -> Self {
        match code {
            401 => FaultKind::InvalidAction,
            402 => FaultKind::InvalidArgs,
            501 => FaultKind::ActionFailed,
            600 => FaultKind::ArgumentValueInvalid,
            601 => FaultKind::ArgumentValueOutOfRange,
            602 => FaultKind::OptionalActionNotImplemented,
            603 => FaultKind::OutOfMemory,
            604 => FaultKind::HumanInterventionRequired,
            605 => FaultKind::StringArgumentTooLong,
            606 => FaultKind::ActionNotAuthorized,
            713 => FaultKind::SpecifiedArrayIndexInvalid,
            714 => FaultKind::NoSuchEntryInArray,
            715 => FaultKind::WildCardNotPermittedInSrcIp,
            716 => FaultKind::WildCardNotPermittedInExtPort,
            718 => FaultKind::ConflictInMappingEntry,
            724 => FaultKind::SamePortValuesRequired,
            725 => FaultKind::OnlyPermanentLeasesSupported,
            726 => FaultKind::RemoteHostOnlySupportsWildcard,
            727 => FaultKind::ExternalPortOnlySupportsWildcard,
            728 => FaultKind::NoPortMapsAvailable,
            729 => FaultKind::ConflictWithOtherMechanisms,
            732 => FaultKind::WildCardNotPermittedInIntPort,
            _ => FaultKind::UnknownVendorError,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FaultKind::InvalidAction => "InvalidAction",
            FaultKind::InvalidArgs => "InvalidArgs",
            FaultKind::ActionFailed => "ActionFailed",
            FaultKind::ArgumentValueInvalid => "ArgumentValueInvalid",
            FaultKind::ArgumentValueOutOfRange => "ArgumentValueOutOfRange",
            FaultKind::OptionalActionNotImplemented => "OptionalActionNotImplemented",
            FaultKind::OutOfMemory => "OutOfMemory",
            FaultKind::HumanInterventionRequired => "HumanInterventionRequired",
            FaultKind::StringArgumentTooLong => "StringArgumentTooLong",
            FaultKind::ActionNotAuthorized => "ActionNotAuthorized",
            FaultKind::SpecifiedArrayIndexInvalid => "SpecifiedArrayIndexInvalid",
            FaultKind::NoSuchEntryInArray => "NoSuchEntryInArray",
            FaultKind::WildCardNotPermittedInSrcIp => "WildCardNotPermittedInSrcIP",
            FaultKind::WildCardNotPermittedInExtPort => "WildCardNotPermittedInExtPort",
            FaultKind::ConflictInMappingEntry => "ConflictInMappingEntry",
            FaultKind::SamePortValuesRequired => "SamePortValuesRequired",
            FaultKind::OnlyPermanentLeasesSupported => "OnlyPermanentLeasesSupported",
            FaultKind::RemoteHostOnlySupportsWildcard => "RemoteHostOnlySupportsWildcard",
            FaultKind::ExternalPortOnlySupportsWildcard => "ExternalPortOnlySupportsWildcard",
            FaultKind::NoPortMapsAvailable => "NoPortMapsAvailable",
            FaultKind::ConflictWithOtherMechanisms => "ConflictWithOtherMechanisms",
            FaultKind::WildCardNotPermittedInIntPort => "WildCardNotPermittedInIntPort",
            FaultKind::UnknownVendorError => "UnknownVendorError",
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decode a fault body. The standard `UPnPError` layout is tried first, then
/// the shapes listed by the quirk row, in order.
pub(crate) fn parse_fault(body: &str, quirks: &Quirks) -> Option<SoapFault> {
    let root = xml::parse(body).ok()?;
    let shapes = std::iter::once(&FaultShape::UpnpError).chain(quirks.fault_shapes);
    for shape in shapes {
        if let Some(fault) = decode(&root, *shape, quirks) {
            return Some(fault);
        }
    }
    None
}

fn decode(root: &Element, shape: FaultShape, quirks: &Quirks) -> Option<SoapFault> {
    let rule = quirks.tag_match;
    match shape {
        FaultShape::UpnpError => {
            let error = root.find("UPnPError", rule)?;
            let code = error.child_text("errorCode", rule)?.parse().ok()?;
            let description = error.child_text("errorDescription", rule).unwrap_or_default();
            Some(SoapFault::new(code, description))
        }
        FaultShape::BareErrorCode => {
            let code = root.find("errorCode", rule)?.text.trim().parse().ok()?;
            let description = root
                .find("errorDescription", rule)
                .or_else(|| root.find("faultstring", rule))
                .map(|e| e.text.trim())
                .unwrap_or_default();
            Some(SoapFault::new(code, description))
        }
        FaultShape::FaultStringCode => {
            let text = root.find("faultstring", rule)?.text.trim();
            let code = embedded_code(text)?;
            Some(SoapFault::new(code, text))
        }
    }
}

// First run of three or more digits, e.g. `714` in "UPnPError 714 NoSuchEntry".
fn embedded_code(text: &str) -> Option<u16> {
    text.split(|c: char| !c.is_ascii_digit())
        .find(|run| run.len() >= 3)
        .and_then(|run| run.parse().ok())
}
