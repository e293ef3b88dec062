//! Vendor quirk registry.
//!
//! Gateways deviate from the IGD specification in a handful of recurring
//! ways. Each deviation is recorded here as a table row keyed by patterns over
//! the [`GatewaySignature`]; the description fetcher and the SOAP client look
//! the row up and apply its flags. Supporting a new vendor means adding a row.

use serde::Serialize;

/// Identifies a gateway implementation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GatewaySignature {
    /// `SERVER` header of the SSDP response.
    pub server: String,
    /// `manufacturer` of the root device.
    pub manufacturer: String,
    /// `modelName` of the root device.
    pub model: String,
    /// `deviceType` of the root device.
    pub device_type: String,
}

impl GatewaySignature {
    /// Signature known right after discovery, before the description is parsed.
    pub fn from_server(server: impl Into<String>) -> Self {
        GatewaySignature {
            server: server.into(),
            ..Default::default()
        }
    }
}

/// How HTTP header names are written on SOAP requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HeaderCase {
    /// Lowercase names, as HTTP/1.1 allows.
    #[default]
    Lower,
    /// `SOAPAction`, `Content-Type` written exactly as spelled here, for
    /// stacks that compare header names case-sensitively.
    Verbatim,
}

/// How element names are compared when parsing tolerantly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TagMatch {
    /// Qualified names must match exactly, prefix included.
    Exact,
    /// Namespace prefixes are ignored.
    #[default]
    LocalName,
    /// Namespace prefixes are ignored and names compare ASCII case-insensitively.
    IgnoreCase,
}

impl TagMatch {
    /// Whether the element named `qualified` matches the wanted local name.
    pub fn matches(self, qualified: &str, wanted: &str) -> bool {
        match self {
            TagMatch::Exact => qualified == wanted,
            TagMatch::LocalName => local_name(qualified) == wanted,
            TagMatch::IgnoreCase => local_name(qualified).eq_ignore_ascii_case(wanted),
        }
    }
}

fn local_name(qualified: &str) -> &str {
    qualified
        .rsplit_once(':')
        .map_or(qualified, |(_, local)| local)
}

/// Shapes a SOAP fault body may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultShape {
    /// `Fault/detail/UPnPError/errorCode`, the standard layout.
    UpnpError,
    /// An `errorCode` element anywhere in the body without a `UPnPError` wrapper.
    BareErrorCode,
    /// The numeric code embedded in `faultstring`, e.g. `UPnPError 714`.
    FaultStringCode,
}

/// Fault codes that end a `GetGenericPortMappingEntry` enumeration on every gateway.
pub const STANDARD_END_OF_LIST: &[u16] = &[714, 713];

/// Adjustments applied to one family of gateways.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quirks {
    /// Short name of the row, used in logs.
    pub name: &'static str,
    pub header_case: HeaderCase,
    /// Tag matching used when the strict parse of a document fails.
    pub tag_match: TagMatch,
    /// Fault shapes tried after the standard `UPnPError` layout.
    pub fault_shapes: &'static [FaultShape],
    /// Codes besides the standard ones that signal the end of the mapping list.
    pub end_of_list_codes: &'static [u16],
}

impl Quirks {
    /// Whether a fault code terminates port mapping enumeration.
    pub fn is_end_of_list(&self, code: u16) -> bool {
        STANDARD_END_OF_LIST.contains(&code) || self.end_of_list_codes.contains(&code)
    }
}

/// Row used when no vendor pattern matches.
pub static DEFAULT_QUIRKS: Quirks = Quirks {
    name: "default",
    header_case: HeaderCase::Lower,
    tag_match: TagMatch::LocalName,
    fault_shapes: &[],
    end_of_list_codes: &[],
};

struct QuirkEntry {
    server: Option<&'static str>,
    manufacturer: Option<&'static str>,
    device_type: Option<&'static str>,
    quirks: Quirks,
}

impl QuirkEntry {
    fn matches(&self, signature: &GatewaySignature) -> bool {
        let patterns = [
            (self.server, signature.server.as_str()),
            (self.manufacturer, signature.manufacturer.as_str()),
            (self.device_type, signature.device_type.as_str()),
        ];
        let mut any = false;
        for (pattern, value) in patterns {
            if let Some(pattern) = pattern {
                if !contains_ignore_case(value, pattern) {
                    return false;
                }
                any = true;
            }
        }
        any
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack
        .to_ascii_lowercase()
        .contains(&needle.to_ascii_lowercase())
}

// Huawei gateways are recognized by either the SERVER header or the manufacturer.
const HUAWEI: Quirks = Quirks {
    name: "huawei",
    header_case: HeaderCase::Lower,
    tag_match: TagMatch::IgnoreCase,
    fault_shapes: &[FaultShape::BareErrorCode],
    end_of_list_codes: &[402],
};

static REGISTRY: &[QuirkEntry] = &[
    QuirkEntry {
        server: None,
        manufacturer: Some("Huawei"),
        device_type: None,
        quirks: HUAWEI,
    },
    QuirkEntry {
        server: Some("Huawei"),
        manufacturer: None,
        device_type: None,
        quirks: HUAWEI,
    },
    QuirkEntry {
        server: Some("BRCM"),
        manufacturer: None,
        device_type: None,
        quirks: Quirks {
            name: "broadcom",
            header_case: HeaderCase::Lower,
            tag_match: TagMatch::LocalName,
            fault_shapes: &[FaultShape::FaultStringCode],
            end_of_list_codes: &[501],
        },
    },
    QuirkEntry {
        server: None,
        manufacturer: Some("AVM"),
        device_type: None,
        quirks: Quirks {
            name: "avm",
            header_case: HeaderCase::Verbatim,
            tag_match: TagMatch::LocalName,
            fault_shapes: &[],
            end_of_list_codes: &[],
        },
    },
    QuirkEntry {
        server: Some("ZyXEL"),
        manufacturer: None,
        device_type: None,
        quirks: Quirks {
            name: "zyxel",
            header_case: HeaderCase::Verbatim,
            tag_match: TagMatch::IgnoreCase,
            fault_shapes: &[FaultShape::FaultStringCode],
            end_of_list_codes: &[],
        },
    },
    QuirkEntry {
        server: None,
        manufacturer: Some("TP-LINK"),
        device_type: None,
        quirks: Quirks {
            name: "tp-link",
            header_case: HeaderCase::Lower,
            tag_match: TagMatch::LocalName,
            fault_shapes: &[FaultShape::BareErrorCode],
            end_of_list_codes: &[402, 501],
        },
    },
    QuirkEntry {
        server: None,
        manufacturer: Some("NETGEAR"),
        device_type: None,
        quirks: Quirks {
            name: "netgear",
            header_case: HeaderCase::Lower,
            tag_match: TagMatch::IgnoreCase,
            fault_shapes: &[FaultShape::BareErrorCode, FaultShape::FaultStringCode],
            end_of_list_codes: &[501],
        },
    },
];

/// Find the quirk row for a signature. First matching row wins.
pub fn lookup(signature: &GatewaySignature) -> &'static Quirks {
    REGISTRY
        .iter()
        .find(|entry| entry.matches(signature))
        .map_or(&DEFAULT_QUIRKS, |entry| &entry.quirks)
}
