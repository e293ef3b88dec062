//! SOAP 1.1 envelope encoding and response decoding.

use crate::quirks::TagMatch;
use crate::xml::{self, Element};
use quick_xml::escape::escape;

const SOAP_ENVELOPE_START: &str = r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/">
<s:Body>"#;

const SOAP_ENVELOPE_END: &str = r#"</s:Body>
</s:Envelope>"#;

/// Build a request envelope. Arguments are written in the order given.
pub(crate) fn request(service_type: &str, action: &str, args: &[(&str, String)]) -> String {
    let mut body = format!("<u:{action} xmlns:u=\"{}\">", escape(service_type));
    for (name, value) in args {
        body.push_str(&format!("<{name}>{}</{name}>", escape(value.as_str())));
    }
    body.push_str(&format!("</u:{action}>"));
    format!("{SOAP_ENVELOPE_START}\n{body}\n{SOAP_ENVELOPE_END}")
}

/// The element inside `Body` carrying `element` (e.g. `AddPortMappingResponse`).
///
/// Falls back to the first child of `Body` when no element has that name.
fn body_element<'a>(root: &'a Element, element: &str, rule: TagMatch) -> Option<&'a Element> {
    let body = root
        .child("Body", rule)
        .or_else(|| root.find("Body", rule))?;
    body.child(element, rule).or_else(|| body.children.first())
}

/// Name and text of every argument element under `element`, in document order.
pub(crate) fn parse_arguments(
    body: &str,
    element: &str,
    rule: TagMatch,
) -> Result<Vec<(String, String)>, String> {
    let root = xml::parse(body)?;
    let wrapper = body_element(&root, element, rule)
        .ok_or_else(|| format!("no <{element}> in SOAP body"))?;
    Ok(wrapper
        .children
        .iter()
        .map(|c| (c.local_name().to_string(), c.text.trim().to_string()))
        .collect())
}
