//! A stateful mock IGD for integration tests: an axum HTTP server for
//! descriptions and SOAP control, plus a UDP responder answering M-SEARCH.

#![allow(dead_code)]

mod documents;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::Response,
    routing::{get, post},
    Router,
};
use igd_control::ControlPointConfig;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::{oneshot, Mutex, RwLock};

pub const IGD_ST: &str = "urn:schemas-upnp-org:device:InternetGatewayDevice:1";
pub const IGD_USN: &str = "uuid:mock-igd-001::urn:schemas-upnp-org:device:InternetGatewayDevice:1";

/// Install a test subscriber honoring `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A port mapping held by the mock gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    pub remote_host: String,
    pub external_port: u16,
    pub protocol: String,
    pub internal_port: u16,
    pub internal_client: String,
    pub enabled: bool,
    pub description: String,
    pub lease_duration: u32,
}

impl Mapping {
    pub fn new(external_port: u16, protocol: &str, internal_client: &str, internal_port: u16) -> Self {
        Mapping {
            remote_host: String::new(),
            external_port,
            protocol: protocol.to_string(),
            internal_port,
            internal_client: internal_client.to_string(),
            enabled: true,
            description: String::new(),
            lease_duration: 0,
        }
    }

    fn outputs(&self, with_key: bool) -> Vec<(&'static str, String)> {
        let mut values = Vec::new();
        if with_key {
            values.push(("NewRemoteHost", self.remote_host.clone()));
            values.push(("NewExternalPort", self.external_port.to_string()));
            values.push(("NewProtocol", self.protocol.clone()));
        }
        values.push(("NewInternalPort", self.internal_port.to_string()));
        values.push(("NewInternalClient", self.internal_client.clone()));
        values.push(("NewEnabled", if self.enabled { "1" } else { "0" }.to_string()));
        values.push(("NewPortMappingDescription", self.description.clone()));
        values.push(("NewLeaseDuration", self.lease_duration.to_string()));
        values
    }
}

/// Layout of SOAP fault bodies sent by the mock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultStyle {
    /// `detail/UPnPError/errorCode`.
    UpnpError,
    /// `detail/errorCode` without the `UPnPError` wrapper.
    BareErrorCode,
    /// Code only inside `faultstring`.
    FaultStringCode,
}

struct GatewayState {
    mappings: RwLock<Vec<Mapping>>,
    external_ip: String,
    manufacturer: String,
    /// Fault code once the index passes the last mapping; `None` wraps around forever.
    end_of_list: Option<u16>,
    description_status: StatusCode,
    capitalized_tags: bool,
    fault_style: FaultStyle,
    soap_actions: Mutex<Vec<String>>,
}

impl GatewayState {
    fn document(&self, xml: String) -> Response<Body> {
        let xml = if self.capitalized_tags {
            documents::capitalize_tags(&xml)
        } else {
            xml
        };
        xml_response(StatusCode::OK, xml)
    }

    fn fault(&self, code: u16, description: &str) -> Response<Body> {
        let body = match self.fault_style {
            FaultStyle::UpnpError => documents::soap_fault(code, description),
            FaultStyle::BareErrorCode => documents::bare_error_fault(code, description),
            FaultStyle::FaultStringCode => documents::fault_string_fault(code, description),
        };
        xml_response(StatusCode::INTERNAL_SERVER_ERROR, body)
    }
}

/// A running mock gateway. Stops when dropped.
pub struct MockGateway {
    http_addr: SocketAddr,
    ssdp_addr: SocketAddr,
    state: Arc<GatewayState>,
    ssdp_requests: Arc<Mutex<Vec<String>>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockGateway {
    pub async fn start() -> Self {
        Self::builder().start().await
    }

    pub fn builder() -> MockGatewayBuilder {
        MockGatewayBuilder::default()
    }

    /// LOCATION advertised over SSDP.
    pub fn location(&self) -> String {
        format!("http://{}/rootDesc.xml", self.http_addr)
    }

    pub fn ssdp_addr(&self) -> SocketAddr {
        self.ssdp_addr
    }

    /// Configuration that discovers this gateway by unicast on loopback.
    pub fn config(&self) -> ControlPointConfig {
        ControlPointConfig::new()
            .with_local_addr(Ipv4Addr::LOCALHOST)
            .with_gateway(Ipv4Addr::LOCALHOST)
            .with_ssdp_port(self.ssdp_addr.port())
            .with_mx(1)
            .with_retries(1)
            .with_response_window(Duration::from_millis(300))
            .with_timeout(Duration::from_secs(2))
    }

    pub async fn mappings(&self) -> Vec<Mapping> {
        self.state.mappings.read().await.clone()
    }

    /// Action names of every SOAP request received, in order.
    pub async fn soap_actions(&self) -> Vec<String> {
        self.state.soap_actions.lock().await.clone()
    }

    /// Raw M-SEARCH datagrams received, in order.
    pub async fn ssdp_requests(&self) -> Vec<String> {
        self.ssdp_requests.lock().await.clone()
    }
}

impl Drop for MockGateway {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Builder for configuring a mock gateway.
pub struct MockGatewayBuilder {
    server: String,
    manufacturer: String,
    external_ip: String,
    end_of_list: Option<u16>,
    mappings: Vec<Mapping>,
    usns: Vec<String>,
    malformed_first: bool,
    silent: bool,
    description_status: StatusCode,
    capitalized_tags: bool,
    fault_style: FaultStyle,
}

impl Default for MockGatewayBuilder {
    fn default() -> Self {
        MockGatewayBuilder {
            server: "Linux/5.4 UPnP/1.1 mock-igd/0.1".to_string(),
            manufacturer: "mock-igd".to_string(),
            external_ip: "203.0.113.1".to_string(),
            end_of_list: Some(714),
            mappings: Vec::new(),
            usns: vec![IGD_USN.to_string()],
            malformed_first: false,
            silent: false,
            description_status: StatusCode::OK,
            capitalized_tags: false,
            fault_style: FaultStyle::UpnpError,
        }
    }
}

impl MockGatewayBuilder {
    /// SERVER header of the SSDP responses.
    pub fn server(mut self, server: &str) -> Self {
        self.server = server.to_string();
        self
    }

    pub fn manufacturer(mut self, manufacturer: &str) -> Self {
        self.manufacturer = manufacturer.to_string();
        self
    }

    pub fn external_ip(mut self, ip: &str) -> Self {
        self.external_ip = ip.to_string();
        self
    }

    pub fn end_of_list(mut self, code: Option<u16>) -> Self {
        self.end_of_list = code;
        self
    }

    pub fn mapping(mut self, mapping: Mapping) -> Self {
        self.mappings.push(mapping);
        self
    }

    /// USNs sent in reply to every M-SEARCH, one datagram each, in order.
    pub fn advertise(mut self, usns: &[&str]) -> Self {
        self.usns = usns.iter().map(|usn| usn.to_string()).collect();
        self
    }

    /// Send a response without LOCATION before the real ones.
    pub fn malformed_first(mut self) -> Self {
        self.malformed_first = true;
        self
    }

    /// Record M-SEARCH requests but never answer them.
    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }

    pub fn description_status(mut self, status: StatusCode) -> Self {
        self.description_status = status;
        self
    }

    /// Serve descriptions and SCPDs with capitalized element names.
    pub fn capitalized_tags(mut self) -> Self {
        self.capitalized_tags = true;
        self
    }

    pub fn fault_style(mut self, style: FaultStyle) -> Self {
        self.fault_style = style;
        self
    }

    pub async fn start(self) -> MockGateway {
        let state = Arc::new(GatewayState {
            mappings: RwLock::new(self.mappings),
            external_ip: self.external_ip,
            manufacturer: self.manufacturer,
            end_of_list: self.end_of_list,
            description_status: self.description_status,
            capitalized_tags: self.capitalized_tags,
            fault_style: self.fault_style,
            soap_actions: Mutex::new(Vec::new()),
        });
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let http_addr = listener.local_addr().unwrap();
        tokio::spawn(run_http_server(listener, state.clone(), shutdown_rx));

        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let ssdp_addr = socket.local_addr().unwrap();
        let ssdp_requests = Arc::new(Mutex::new(Vec::new()));
        let responder = SsdpResponder {
            location: format!("http://{http_addr}/rootDesc.xml"),
            server: self.server,
            usns: self.usns,
            malformed_first: self.malformed_first,
            silent: self.silent,
            requests: ssdp_requests.clone(),
        };
        tokio::spawn(responder.run(socket));

        MockGateway {
            http_addr,
            ssdp_addr,
            state,
            ssdp_requests,
            shutdown_tx: Some(shutdown_tx),
        }
    }
}

// =============================================================================
// SSDP
// =============================================================================

struct SsdpResponder {
    location: String,
    server: String,
    usns: Vec<String>,
    malformed_first: bool,
    silent: bool,
    requests: Arc<Mutex<Vec<String>>>,
}

impl SsdpResponder {
    async fn run(self, socket: UdpSocket) {
        let mut buf = [0u8; 2048];
        while let Ok((len, src)) = socket.recv_from(&mut buf).await {
            let request = String::from_utf8_lossy(&buf[..len]).to_string();
            self.requests.lock().await.push(request.clone());
            if self.silent || !request.starts_with("M-SEARCH") {
                continue;
            }

            let st = extract_header(&request, "ST").unwrap_or_else(|| IGD_ST.to_string());
            if self.malformed_first {
                let malformed = format!("HTTP/1.1 200 OK\r\nST: {st}\r\nUSN: uuid:broken\r\n\r\n");
                let _ = socket.send_to(malformed.as_bytes(), src).await;
            }
            for usn in &self.usns {
                let response = format!(
                    "HTTP/1.1 200 OK\r\n\
                     CACHE-CONTROL: max-age=1800\r\n\
                     ST: {st}\r\n\
                     USN: {usn}\r\n\
                     EXT:\r\n\
                     SERVER: {}\r\n\
                     LOCATION: {}\r\n\
                     \r\n",
                    self.server, self.location
                );
                let _ = socket.send_to(response.as_bytes(), src).await;
            }
        }
    }
}

/// Extract a header value from an SSDP request.
fn extract_header(request: &str, header: &str) -> Option<String> {
    for line in request.lines() {
        let line = line.trim();
        if line.to_uppercase().starts_with(&format!("{}:", header.to_uppercase())) {
            let value = line[header.len() + 1..].trim();
            return Some(value.to_string());
        }
    }
    None
}

// =============================================================================
// HTTP / SOAP
// =============================================================================

async fn run_http_server(
    listener: TcpListener,
    state: Arc<GatewayState>,
    shutdown_rx: oneshot::Receiver<()>,
) {
    let app = Router::new()
        .route("/rootDesc.xml", get(handle_root_desc))
        .route("/WANIPCn.xml", get(handle_wan_ip_connection_scpd))
        .route("/WANCommonIFC1.xml", get(handle_wan_common_ifc_scpd))
        .route("/ctl/IPConn", post(handle_soap_action))
        .with_state(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        })
        .await
        .ok();
}

fn xml_response(status: StatusCode, xml: String) -> Response<Body> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/xml; charset=\"utf-8\"")
        .body(Body::from(xml))
        .unwrap()
}

async fn handle_root_desc(State(state): State<Arc<GatewayState>>) -> Response<Body> {
    if state.description_status != StatusCode::OK {
        return xml_response(state.description_status, String::new());
    }
    state.document(documents::device_description(&state.manufacturer))
}

async fn handle_wan_ip_connection_scpd(State(state): State<Arc<GatewayState>>) -> Response<Body> {
    state.document(documents::wan_ip_connection_scpd())
}

async fn handle_wan_common_ifc_scpd(State(state): State<Arc<GatewayState>>) -> Response<Body> {
    state.document(documents::wan_common_ifc_scpd())
}

fn success(action: &str, values: &[(&str, String)]) -> Response<Body> {
    xml_response(StatusCode::OK, documents::soap_response(action, values))
}

/// Extract a value from XML by tag name (simple implementation).
fn extract_xml_value(body: &str, tag: &str) -> Option<String> {
    let start_tag = format!("<{}>", tag);
    let end_tag = format!("</{}>", tag);

    let start = body.find(&start_tag)? + start_tag.len();
    let end = body[start..].find(&end_tag)?;
    let raw = &body[start..start + end];
    Some(
        quick_xml::escape::unescape(raw)
            .map(|value| value.into_owned())
            .unwrap_or_else(|_| raw.to_string()),
    )
}

async fn handle_soap_action(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    body: String,
) -> Response<Body> {
    let soap_action = headers
        .get("SOAPACTION")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let action = soap_action
        .trim_matches('"')
        .rsplit('#')
        .next()
        .unwrap_or("")
        .to_string();
    state.soap_actions.lock().await.push(action.clone());

    let value = |tag: &str| extract_xml_value(&body, tag).unwrap_or_default();
    let number = |tag: &str| value(tag).parse::<u32>().unwrap_or(0);

    match action.as_str() {
        "GetExternalIPAddress" => success(
            &action,
            &[("NewExternalIPAddress", state.external_ip.clone())],
        ),
        "AddPortMapping" => {
            let mapping = Mapping {
                remote_host: value("NewRemoteHost"),
                external_port: number("NewExternalPort") as u16,
                protocol: value("NewProtocol"),
                internal_port: number("NewInternalPort") as u16,
                internal_client: value("NewInternalClient"),
                enabled: value("NewEnabled") == "1",
                description: value("NewPortMappingDescription"),
                lease_duration: number("NewLeaseDuration"),
            };
            let mut mappings = state.mappings.write().await;
            let existing = mappings.iter().position(|m| {
                m.external_port == mapping.external_port && m.protocol == mapping.protocol
            });
            match existing {
                Some(i) if mappings[i].internal_client != mapping.internal_client => {
                    state.fault(718, "ConflictInMappingEntry")
                }
                Some(i) => {
                    mappings[i] = mapping;
                    success(&action, &[])
                }
                None => {
                    mappings.push(mapping);
                    success(&action, &[])
                }
            }
        }
        "GetSpecificPortMappingEntry" => {
            let port = number("NewExternalPort") as u16;
            let protocol = value("NewProtocol");
            let mappings = state.mappings.read().await;
            match mappings
                .iter()
                .find(|m| m.external_port == port && m.protocol == protocol)
            {
                Some(m) => success(&action, &m.outputs(false)),
                None => state.fault(714, "NoSuchEntryInArray"),
            }
        }
        "DeletePortMapping" => {
            let port = number("NewExternalPort") as u16;
            let protocol = value("NewProtocol");
            let mut mappings = state.mappings.write().await;
            let before = mappings.len();
            mappings.retain(|m| !(m.external_port == port && m.protocol == protocol));
            if mappings.len() == before {
                state.fault(714, "NoSuchEntryInArray")
            } else {
                success(&action, &[])
            }
        }
        "GetGenericPortMappingEntry" => {
            let index = number("NewPortMappingIndex") as usize;
            let mappings = state.mappings.read().await;
            if let Some(m) = mappings.get(index) {
                return success(&action, &m.outputs(true));
            }
            match state.end_of_list {
                Some(714) => state.fault(714, "NoSuchEntryInArray"),
                Some(713) => state.fault(713, "SpecifiedArrayIndexInvalid"),
                Some(code) => state.fault(code, "Invalid Args"),
                None => {
                    let fallback = Mapping::new(9, "UDP", "192.168.1.2", 9);
                    let m = if mappings.is_empty() {
                        &fallback
                    } else {
                        &mappings[index % mappings.len()]
                    };
                    success(&action, &m.outputs(true))
                }
            }
        }
        _ => {
            tracing::debug!("No handler for action: {}", action);
            state.fault(401, "Invalid Action")
        }
    }
}
