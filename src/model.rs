//! Device, service and action model built from description documents.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// A UPnP device and everything it embeds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Device {
    pub udn: String,
    pub device_type: String,
    pub friendly_name: String,
    pub manufacturer: String,
    pub model_name: String,
    pub services: Vec<Service>,
    pub devices: Vec<Device>,
}

impl Device {
    /// All services of this device and its descendants, depth first.
    pub fn all_services(&self) -> Vec<&Service> {
        let mut services: Vec<&Service> = self.services.iter().collect();
        for child in &self.devices {
            services.extend(child.all_services());
        }
        services
    }

    pub(crate) fn for_each_service_mut(&mut self, f: &mut impl FnMut(&mut Service)) {
        for service in &mut self.services {
            f(service);
        }
        for child in &mut self.devices {
            child.for_each_service_mut(f);
        }
    }

    /// The WAN connection service used for port mapping.
    ///
    /// WANIPConnection is preferred over WANPPPConnection; within a kind the
    /// first one in tree order wins.
    pub fn wan_connection_service(&self) -> Option<&Service> {
        let services = self.all_services();
        services
            .iter()
            .find(|s| s.kind() == Some(ConnectionKind::Ip))
            .or_else(|| {
                services
                    .iter()
                    .find(|s| s.kind() == Some(ConnectionKind::Ppp))
            })
            .copied()
    }
}

/// Kind of WAN connection service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionKind {
    Ip,
    Ppp,
}

/// A service declared by a device, with its SCPD contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Service {
    pub service_type: String,
    pub service_id: String,
    pub control_url: String,
    pub event_sub_url: String,
    pub scpd_url: String,
    pub actions: Vec<Action>,
    pub state_variables: BTreeMap<String, DataType>,
}

impl Service {
    pub fn action(&self, name: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.name == name)
    }

    pub fn kind(&self) -> Option<ConnectionKind> {
        let service_type = self.service_type.to_ascii_lowercase();
        if service_type.contains(":service:wanipconnection:") {
            Some(ConnectionKind::Ip)
        } else if service_type.contains(":service:wanpppconnection:") {
            Some(ConnectionKind::Ppp)
        } else {
            None
        }
    }
}

/// An action declared in an SCPD. Argument order is the declared order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Action {
    pub name: String,
    pub inputs: Vec<Argument>,
    pub outputs: Vec<Argument>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Argument {
    pub name: String,
    pub related_state_variable: String,
    pub data_type: DataType,
}

/// Data type of a state variable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub enum DataType {
    #[default]
    String,
    Boolean,
    Ui1,
    Ui2,
    Ui4,
    Ui8,
    I1,
    I2,
    I4,
    I8,
    Other(String),
}

impl DataType {
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "string" => DataType::String,
            "boolean" => DataType::Boolean,
            "ui1" => DataType::Ui1,
            "ui2" => DataType::Ui2,
            "ui4" => DataType::Ui4,
            "ui8" => DataType::Ui8,
            "i1" => DataType::I1,
            "i2" => DataType::I2,
            "i4" | "int" => DataType::I4,
            "i8" => DataType::I8,
            _ => DataType::Other(name.trim().to_string()),
        }
    }

    /// Inclusive range of integer types.
    pub fn integer_range(&self) -> Option<(i128, i128)> {
        let range = match self {
            DataType::Ui1 => (0, i128::from(u8::MAX)),
            DataType::Ui2 => (0, i128::from(u16::MAX)),
            DataType::Ui4 => (0, i128::from(u32::MAX)),
            DataType::Ui8 => (0, i128::from(u64::MAX)),
            DataType::I1 => (i128::from(i8::MIN), i128::from(i8::MAX)),
            DataType::I2 => (i128::from(i16::MIN), i128::from(i16::MAX)),
            DataType::I4 => (i128::from(i32::MIN), i128::from(i32::MAX)),
            DataType::I8 => (i128::from(i64::MIN), i128::from(i64::MAX)),
            _ => return None,
        };
        Some(range)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::String => "string",
            DataType::Boolean => "boolean",
            DataType::Ui1 => "ui1",
            DataType::Ui2 => "ui2",
            DataType::Ui4 => "ui4",
            DataType::Ui8 => "ui8",
            DataType::I1 => "i1",
            DataType::I2 => "i2",
            DataType::I4 => "i4",
            DataType::I8 => "i8",
            DataType::Other(name) => name,
        };
        f.write_str(name)
    }
}
