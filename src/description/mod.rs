//! Device description retrieval and parsing.

mod scpd;

pub(crate) use scpd::parse_scpd;

use crate::error::{Document, Error, Result};
use crate::http::HttpClient;
use crate::model::{Device, Service};
use crate::quirks::{self, GatewaySignature, Quirks, TagMatch};
use crate::xml::{self, Element};
use reqwest::Url;
use serde::Deserialize;
use std::collections::HashMap;

/// A parsed description with the signature and quirks it resolved to.
#[derive(Debug, Clone)]
pub struct Description {
    pub device: Device,
    pub signature: GatewaySignature,
    pub quirks: &'static Quirks,
}

/// Fetch the root description at `location` and the SCPD of every service.
pub(crate) async fn fetch(http: &HttpClient, location: &str, server: &str) -> Result<Description> {
    let body = http
        .get(location)
        .await
        .map_err(|cause| Error::DescriptionUnreachable {
            document: Document::Root,
            url: location.to_string(),
            cause,
        })?;

    let early = quirks::lookup(&GatewaySignature::from_server(server));
    let (url_base, mut device) =
        parse_description(&body, early.tag_match).map_err(|reason| Error::DescriptionParse {
            document: Document::Root,
            reason,
        })?;

    let signature = GatewaySignature {
        server: server.to_string(),
        manufacturer: device.manufacturer.clone(),
        model: device.model_name.clone(),
        device_type: device.device_type.clone(),
    };
    let quirks = quirks::lookup(&signature);
    tracing::debug!(quirks = quirks.name, ?signature, "resolved gateway quirks");

    let base = url_base.as_deref().unwrap_or(location);
    resolve_urls(&mut device, base);

    let targets: Vec<(String, String)> = device
        .all_services()
        .into_iter()
        .filter(|s| !s.scpd_url.is_empty())
        .map(|s| (s.service_id.clone(), s.scpd_url.clone()))
        .collect();

    let mut tables = HashMap::new();
    for (service_id, url) in targets {
        if tables.contains_key(&url) {
            continue;
        }
        let document = Document::Scpd {
            service_id: service_id.clone(),
        };
        let body = http
            .get(&url)
            .await
            .map_err(|cause| Error::DescriptionUnreachable {
                document: document.clone(),
                url: url.clone(),
                cause,
            })?;
        let table = parse_scpd(&body, quirks.tag_match)
            .map_err(|reason| Error::DescriptionParse { document, reason })?;
        tracing::debug!(service_id = %service_id, actions = table.actions.len(), "parsed SCPD");
        tables.insert(url, table);
    }

    device.for_each_service_mut(&mut |service| {
        if let Some(table) = tables.get(&service.scpd_url) {
            service.actions = table.actions.clone();
            service.state_variables = table.state_variables.clone();
        }
    });

    Ok(Description {
        device,
        signature,
        quirks,
    })
}

/// Parse a root description into its `URLBase` and root device.
///
/// A strict deserialization is tried first; when it fails, the document is
/// re-read with the tolerant tree reader using `fallback` for tag matching.
pub(crate) fn parse_description(
    body: &str,
    fallback: TagMatch,
) -> std::result::Result<(Option<String>, Device), String> {
    match quick_xml::de::from_str::<RootXml>(body) {
        Ok(root) => Ok((non_empty(root.url_base), root.device.into())),
        Err(strict) => {
            tracing::warn!(error = %strict, "strict description parse failed, retrying tolerantly");
            let root = xml::parse(body)?;
            let device = root
                .child("device", fallback)
                .ok_or_else(|| format!("no <device> element ({strict})"))?;
            let url_base = root.child_text("URLBase", fallback).map(str::to_string);
            Ok((url_base.and_then(non_empty), device_from_element(device, fallback)?))
        }
    }
}

fn device_from_element(element: &Element, rule: TagMatch) -> std::result::Result<Device, String> {
    let text = |name: &str| element.child_text(name, rule).unwrap_or_default().to_string();
    let device_type = element
        .child_text("deviceType", rule)
        .ok_or_else(|| "device without <deviceType>".to_string())?
        .to_string();

    let services = element
        .child("serviceList", rule)
        .map(|list| {
            list.children_named("service", rule)
                .map(|s| service_from_element(s, rule))
                .collect()
        })
        .unwrap_or_default();

    let devices = match element.child("deviceList", rule) {
        Some(list) => list
            .children_named("device", rule)
            .map(|d| device_from_element(d, rule))
            .collect::<std::result::Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };

    Ok(Device {
        udn: text("UDN"),
        device_type,
        friendly_name: text("friendlyName"),
        manufacturer: text("manufacturer"),
        model_name: text("modelName"),
        services,
        devices,
    })
}

fn service_from_element(element: &Element, rule: TagMatch) -> Service {
    let text = |name: &str| element.child_text(name, rule).unwrap_or_default().to_string();
    Service {
        service_type: text("serviceType"),
        service_id: text("serviceId"),
        control_url: text("controlURL"),
        event_sub_url: text("eventSubURL"),
        scpd_url: text("SCPDURL"),
        ..Default::default()
    }
}

fn resolve_urls(device: &mut Device, base: &str) {
    let Ok(base) = Url::parse(base) else {
        tracing::warn!(base, "description base URL is not absolute, leaving service URLs as is");
        return;
    };
    device.for_each_service_mut(&mut |service| {
        for url in [
            &mut service.control_url,
            &mut service.event_sub_url,
            &mut service.scpd_url,
        ] {
            if url.is_empty() {
                continue;
            }
            match base.join(url) {
                Ok(resolved) => *url = resolved.to_string(),
                Err(e) => tracing::warn!(url = %url, error = %e, "cannot resolve service URL"),
            }
        }
    });
}

fn non_empty(value: String) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

#[derive(Debug, Deserialize)]
struct RootXml {
    #[serde(rename = "URLBase", default)]
    url_base: String,
    device: DeviceXml,
}

#[derive(Debug, Deserialize)]
struct DeviceXml {
    #[serde(rename = "deviceType")]
    device_type: String,
    #[serde(rename = "friendlyName", default)]
    friendly_name: String,
    #[serde(default)]
    manufacturer: String,
    #[serde(rename = "modelName", default)]
    model_name: String,
    #[serde(rename = "UDN", default)]
    udn: String,
    #[serde(rename = "serviceList", default)]
    service_list: ServiceListXml,
    #[serde(rename = "deviceList", default)]
    device_list: DeviceListXml,
}

#[derive(Debug, Default, Deserialize)]
struct ServiceListXml {
    #[serde(default)]
    service: Vec<ServiceXml>,
}

#[derive(Debug, Default, Deserialize)]
struct DeviceListXml {
    #[serde(default)]
    device: Vec<DeviceXml>,
}

#[derive(Debug, Deserialize)]
struct ServiceXml {
    #[serde(rename = "serviceType", default)]
    service_type: String,
    #[serde(rename = "serviceId", default)]
    service_id: String,
    #[serde(rename = "controlURL", default)]
    control_url: String,
    #[serde(rename = "eventSubURL", default)]
    event_sub_url: String,
    #[serde(rename = "SCPDURL", default)]
    scpd_url: String,
}

impl From<DeviceXml> for Device {
    fn from(xml: DeviceXml) -> Self {
        Device {
            udn: xml.udn.trim().to_string(),
            device_type: xml.device_type.trim().to_string(),
            friendly_name: xml.friendly_name.trim().to_string(),
            manufacturer: xml.manufacturer.trim().to_string(),
            model_name: xml.model_name.trim().to_string(),
            services: xml.service_list.service.into_iter().map(Service::from).collect(),
            devices: xml.device_list.device.into_iter().map(Device::from).collect(),
        }
    }
}

impl From<ServiceXml> for Service {
    fn from(xml: ServiceXml) -> Self {
        Service {
            service_type: xml.service_type.trim().to_string(),
            service_id: xml.service_id.trim().to_string(),
            control_url: xml.control_url.trim().to_string(),
            event_sub_url: xml.event_sub_url.trim().to_string(),
            scpd_url: xml.scpd_url.trim().to_string(),
            ..Default::default()
        }
    }
}
