//! SOAP action client.
//!
//! Actions are invoked against a [`Service`] whose SCPD has been parsed: the
//! declared inputs decide argument order and value encoding, the declared
//! outputs decide what is read back.

mod envelope;
mod fault;

pub use fault::{FaultKind, SoapFault};

use crate::error::{Error, Result, TransportFailure};
use crate::http::HttpClient;
use crate::model::{Action, DataType, Service};
use crate::quirks::Quirks;

/// An input argument value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Str(String),
    UInt(u64),
    Int(i64),
    Bool(bool),
}

impl Value {
    /// Encode the value for an argument of the given data type.
    fn encode(&self, data_type: &DataType) -> std::result::Result<String, String> {
        if *data_type == DataType::Boolean {
            return match self {
                Value::Bool(b) => Ok(bool_str(*b).to_string()),
                Value::UInt(n @ (0 | 1)) => Ok(n.to_string()),
                Value::Int(n @ (0 | 1)) => Ok(n.to_string()),
                Value::Str(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "1" | "true" | "yes" => Ok("1".to_string()),
                    "0" | "false" | "no" => Ok("0".to_string()),
                    _ => Err(format!("{s:?} is not a boolean")),
                },
                other => Err(format!("{other:?} is not a boolean")),
            };
        }

        if let Some((min, max)) = data_type.integer_range() {
            let n: i128 = match self {
                Value::UInt(n) => i128::from(*n),
                Value::Int(n) => i128::from(*n),
                Value::Str(s) => s
                    .trim()
                    .parse()
                    .map_err(|_| format!("{s:?} is not an integer"))?,
                Value::Bool(b) => i128::from(*b),
            };
            if n < min || n > max {
                return Err(format!("{n} is out of range for {data_type}"));
            }
            return Ok(n.to_string());
        }

        Ok(match self {
            Value::Str(s) => s.clone(),
            Value::UInt(n) => n.to_string(),
            Value::Int(n) => n.to_string(),
            Value::Bool(b) => bool_str(*b).to_string(),
        })
    }
}

fn bool_str(b: bool) -> &'static str {
    if b {
        "1"
    } else {
        "0"
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

macro_rules! value_from_int {
    ($variant:ident, $wide:ty: $($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(n: $t) -> Self {
                Value::$variant(<$wide>::from(n))
            }
        })*
    };
}

value_from_int!(UInt, u64: u8, u16, u32, u64);
value_from_int!(Int, i64: i8, i16, i32, i64);

/// Output arguments of a successful invocation, in declared order.
///
/// An output the gateway left out is kept with a `None` value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionResponse {
    pub action: String,
    pub values: Vec<(String, Option<String>)>,
}

impl ActionResponse {
    /// Value of an output argument; `None` if missing or undeclared.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.as_deref())
    }

    pub fn is_missing(&self, name: &str) -> bool {
        self.get(name).is_none()
    }

    /// Value of an output argument the caller cannot do without.
    pub fn require(&self, name: &str) -> Result<&str> {
        self.get(name).ok_or_else(|| Error::MissingOutput {
            action: self.action.clone(),
            argument: name.to_string(),
        })
    }
}

/// Invokes actions on one gateway.
#[derive(Debug)]
pub(crate) struct SoapClient {
    http: HttpClient,
    quirks: &'static Quirks,
}

impl SoapClient {
    pub fn new(http: HttpClient, quirks: &'static Quirks) -> Self {
        SoapClient { http, quirks }
    }

    pub async fn invoke(
        &self,
        service: &Service,
        action_name: &str,
        args: &[(&str, Value)],
    ) -> Result<ActionResponse> {
        let action = service
            .action(action_name)
            .ok_or_else(|| Error::ActionNotSupported {
                service: service.service_type.clone(),
                action: action_name.to_string(),
            })?;
        let encoded = encode_inputs(action, args)?;

        let body = envelope::request(&service.service_type, action_name, &encoded);
        let soap_action = format!("\"{}#{}\"", service.service_type, action_name);
        let response = self
            .http
            .post_soap(&service.control_url, &soap_action, body)
            .await
            .map_err(|cause| Error::SoapTransport {
                action: action_name.to_string(),
                cause,
            })?;

        if !response.is_success() {
            return Err(match fault::parse_fault(&response.body, self.quirks) {
                Some(fault) => {
                    tracing::debug!(action = action_name, code = fault.code, kind = %fault.kind, "SOAP fault");
                    Error::SoapFault {
                        action: action_name.to_string(),
                        fault,
                    }
                }
                None => Error::SoapTransport {
                    action: action_name.to_string(),
                    cause: TransportFailure::Status(response.status),
                },
            });
        }

        Ok(self.decode_outputs(action, &response.body))
    }

    fn decode_outputs(&self, action: &Action, body: &str) -> ActionResponse {
        let wrapper = format!("{}Response", action.name);
        let received = match envelope::parse_arguments(body, &wrapper, self.quirks.tag_match) {
            Ok(received) => received,
            Err(reason) => {
                tracing::warn!(action = %action.name, %reason, "unreadable action response");
                Vec::new()
            }
        };

        let values = action
            .outputs
            .iter()
            .map(|output| {
                let value = received
                    .iter()
                    .find(|(name, _)| self.quirks.tag_match.matches(name, &output.name))
                    .map(|(_, value)| value.clone());
                if value.is_none() {
                    tracing::warn!(action = %action.name, argument = %output.name, "output argument missing from response");
                }
                (output.name.clone(), value)
            })
            .collect();

        ActionResponse {
            action: action.name.clone(),
            values,
        }
    }
}

/// Check `args` against the declared inputs and encode them in declared order.
fn encode_inputs<'a>(
    action: &'a Action,
    args: &[(&str, Value)],
) -> Result<Vec<(&'a str, String)>> {
    let invalid = |argument: &str, reason: String| Error::InvalidArgument {
        action: action.name.clone(),
        argument: argument.to_string(),
        reason,
    };

    if let Some((name, _)) = args
        .iter()
        .find(|(name, _)| !action.inputs.iter().any(|input| input.name == *name))
    {
        return Err(invalid(name, "not declared by the action".to_string()));
    }

    action
        .inputs
        .iter()
        .map(|input| {
            let (_, value) = args
                .iter()
                .find(|(name, _)| *name == input.name)
                .ok_or_else(|| invalid(&input.name, "missing".to_string()))?;
            let encoded = value
                .encode(&input.data_type)
                .map_err(|reason| invalid(&input.name, reason))?;
            Ok((input.name.as_str(), encoded))
        })
        .collect()
}
