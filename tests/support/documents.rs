//! Description documents served by the mock gateway.

pub const WANIP_SERVICE: &str = "urn:schemas-upnp-org:service:WANIPConnection:1";

/// Root description with the WAN connection service two devices deep.
pub fn device_description(manufacturer: &str) -> String {
    format!(
        r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <specVersion>
    <major>1</major>
    <minor>0</minor>
  </specVersion>
  <device>
    <deviceType>urn:schemas-upnp-org:device:InternetGatewayDevice:1</deviceType>
    <friendlyName>Mock IGD</friendlyName>
    <manufacturer>{manufacturer}</manufacturer>
    <modelName>Mock Internet Gateway Device</modelName>
    <UDN>uuid:mock-igd-001</UDN>
    <deviceList>
      <device>
        <deviceType>urn:schemas-upnp-org:device:WANDevice:1</deviceType>
        <friendlyName>WANDevice</friendlyName>
        <UDN>uuid:mock-igd-wan-001</UDN>
        <serviceList>
          <service>
            <serviceType>urn:schemas-upnp-org:service:WANCommonInterfaceConfig:1</serviceType>
            <serviceId>urn:upnp-org:serviceId:WANCommonIFC1</serviceId>
            <SCPDURL>/WANCommonIFC1.xml</SCPDURL>
            <controlURL>/ctl/CmnIfCfg</controlURL>
            <eventSubURL>/evt/CmnIfCfg</eventSubURL>
          </service>
        </serviceList>
        <deviceList>
          <device>
            <deviceType>urn:schemas-upnp-org:device:WANConnectionDevice:1</deviceType>
            <friendlyName>WANConnectionDevice</friendlyName>
            <UDN>uuid:mock-igd-wanconn-001</UDN>
            <serviceList>
              <service>
                <serviceType>{WANIP_SERVICE}</serviceType>
                <serviceId>urn:upnp-org:serviceId:WANIPConn1</serviceId>
                <SCPDURL>/WANIPCn.xml</SCPDURL>
                <controlURL>/ctl/IPConn</controlURL>
                <eventSubURL>/evt/IPConn</eventSubURL>
              </service>
            </serviceList>
          </device>
        </deviceList>
      </device>
    </deviceList>
  </device>
</root>"#
    )
}

fn argument(name: &str, direction: &str, variable: &str) -> String {
    format!(
        "<argument><name>{name}</name><direction>{direction}</direction>\
         <relatedStateVariable>{variable}</relatedStateVariable></argument>"
    )
}

fn action(name: &str, arguments: &[String]) -> String {
    format!(
        "<action><name>{name}</name><argumentList>{}</argumentList></action>",
        arguments.concat()
    )
}

fn state_variable(name: &str, data_type: &str) -> String {
    format!(
        "<stateVariable sendEvents=\"no\"><name>{name}</name><dataType>{data_type}</dataType></stateVariable>"
    )
}

fn entry_outputs() -> Vec<String> {
    vec![
        argument("NewInternalPort", "out", "InternalPort"),
        argument("NewInternalClient", "out", "InternalClient"),
        argument("NewEnabled", "out", "PortMappingEnabled"),
        argument("NewPortMappingDescription", "out", "PortMappingDescription"),
        argument("NewLeaseDuration", "out", "PortMappingLeaseDuration"),
    ]
}

fn mapping_key(direction: &str) -> Vec<String> {
    vec![
        argument("NewRemoteHost", direction, "RemoteHost"),
        argument("NewExternalPort", direction, "ExternalPort"),
        argument("NewProtocol", direction, "PortMappingProtocol"),
    ]
}

/// WANIPConnection SCPD with the port mapping actions.
pub fn wan_ip_connection_scpd() -> String {
    let add = [
        mapping_key("in"),
        vec![
            argument("NewInternalPort", "in", "InternalPort"),
            argument("NewInternalClient", "in", "InternalClient"),
            argument("NewEnabled", "in", "PortMappingEnabled"),
            argument("NewPortMappingDescription", "in", "PortMappingDescription"),
            argument("NewLeaseDuration", "in", "PortMappingLeaseDuration"),
        ],
    ]
    .concat();
    let generic = [
        vec![argument("NewPortMappingIndex", "in", "PortMappingNumberOfEntries")],
        mapping_key("out"),
        entry_outputs(),
    ]
    .concat();
    let specific = [mapping_key("in"), entry_outputs()].concat();

    let actions = [
        action(
            "GetExternalIPAddress",
            &[argument("NewExternalIPAddress", "out", "ExternalIPAddress")],
        ),
        action("AddPortMapping", &add),
        action("DeletePortMapping", &mapping_key("in")),
        action("GetGenericPortMappingEntry", &generic),
        action("GetSpecificPortMappingEntry", &specific),
    ]
    .concat();

    let variables = [
        state_variable("ExternalIPAddress", "string"),
        state_variable("RemoteHost", "string"),
        state_variable("ExternalPort", "ui2"),
        state_variable("PortMappingProtocol", "string"),
        state_variable("InternalPort", "ui2"),
        state_variable("InternalClient", "string"),
        state_variable("PortMappingEnabled", "boolean"),
        state_variable("PortMappingDescription", "string"),
        state_variable("PortMappingLeaseDuration", "ui4"),
        state_variable("PortMappingNumberOfEntries", "ui2"),
    ]
    .concat();

    format!(
        r#"<?xml version="1.0"?>
<scpd xmlns="urn:schemas-upnp-org:service-1-0">
  <specVersion><major>1</major><minor>0</minor></specVersion>
  <actionList>{actions}</actionList>
  <serviceStateTable>{variables}</serviceStateTable>
</scpd>"#
    )
}

/// WANCommonInterfaceConfig SCPD.
pub fn wan_common_ifc_scpd() -> String {
    let actions = action(
        "GetTotalBytesSent",
        &[argument("NewTotalBytesSent", "out", "TotalBytesSent")],
    );
    let variables = state_variable("TotalBytesSent", "ui4");
    format!(
        r#"<?xml version="1.0"?>
<scpd xmlns="urn:schemas-upnp-org:service-1-0">
  <specVersion><major>1</major><minor>0</minor></specVersion>
  <actionList>{actions}</actionList>
  <serviceStateTable>{variables}</serviceStateTable>
</scpd>"#
    )
}

const SOAP_ENVELOPE_START: &str = r#"<?xml version="1.0"?>
<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/">
<s:Body>"#;

const SOAP_ENVELOPE_END: &str = r#"</s:Body>
</s:Envelope>"#;

/// Successful action response with the given output arguments.
pub fn soap_response(action: &str, values: &[(&str, String)]) -> String {
    let args: String = values
        .iter()
        .map(|(name, value)| format!("<{name}>{}</{name}>\n", quick_xml::escape::escape(value.as_str())))
        .collect();
    format!(
        "{SOAP_ENVELOPE_START}\n<u:{action}Response xmlns:u=\"{WANIP_SERVICE}\">\n{args}</u:{action}Response>\n{SOAP_ENVELOPE_END}"
    )
}

/// Standard UPnPError fault.
pub fn soap_fault(code: u16, description: &str) -> String {
    format!(
        r#"{SOAP_ENVELOPE_START}
<s:Fault>
<faultcode>s:Client</faultcode>
<faultstring>UPnPError</faultstring>
<detail>
<UPnPError xmlns="urn:schemas-upnp-org:control-1-0">
<errorCode>{code}</errorCode>
<errorDescription>{description}</errorDescription>
</UPnPError>
</detail>
</s:Fault>
{SOAP_ENVELOPE_END}"#
    )
}

/// Bare `errorCode` in the fault detail, without a `UPnPError` wrapper.
pub fn bare_error_fault(code: u16, description: &str) -> String {
    format!(
        r#"{SOAP_ENVELOPE_START}
<s:Fault>
<faultcode>s:Client</faultcode>
<faultstring>UPnPError</faultstring>
<detail>
<errorCode>{code}</errorCode>
<errorDescription>{description}</errorDescription>
</detail>
</s:Fault>
{SOAP_ENVELOPE_END}"#
    )
}

/// Fault whose only code is embedded in `faultstring`.
pub fn fault_string_fault(code: u16, description: &str) -> String {
    format!(
        r#"{SOAP_ENVELOPE_START}
<s:Fault>
<faultcode>s:Client</faultcode>
<faultstring>UPnPError {code} {description}</faultstring>
</s:Fault>
{SOAP_ENVELOPE_END}"#
    )
}

/// Capitalize the first letter of every element name: `<deviceList>` becomes
/// `<DeviceList>`. Processing instructions and text are left alone.
pub fn capitalize_tags(xml: &str) -> String {
    let mut out = String::with_capacity(xml.len());
    let mut chars = xml.chars().peekable();
    while let Some(c) = chars.next() {
        out.push(c);
        if c != '<' {
            continue;
        }
        if chars.peek() == Some(&'/') {
            out.push('/');
            chars.next();
        }
        if let Some(first) = chars.next_if(|n| n.is_ascii_lowercase()) {
            out.push(first.to_ascii_uppercase());
        }
    }
    out
}
