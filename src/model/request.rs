//! Request decoding
//!
//! A request is a JSON object whose *first* field names the category
//! (`{"ip": "1.2.3.4"}`). Field order is the order in the document, which
//! serde_json keeps because the crate enables `preserve_order`.

use serde_json::{Map, Value};
use strum::{AsRefStr, EnumString};

/// Maximum number of addresses accepted by one `iplist` request
pub const IP_LIST_LIMIT: usize = 100;

/// Closed set of request categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum RequestCategory {
    Ping,
    Status,
    Ip,
    #[strum(serialize = "iplist")]
    IpList,
}

impl std::fmt::Display for RequestCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_ref())
    }
}

/// Why a payload could not be turned into a [`Request`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Not an object, or no fields left after `auth` was stripped
    InvalidPayload,
    /// First field is not a known category
    UnknownCategory(String),
}

/// A routed request: its category plus the full object for the handler
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub category: RequestCategory,
    pub body: Map<String, Value>,
}

impl Request {
    /// Route a payload by the name of its first field
    pub fn decode(payload: Value) -> Result<Self, DecodeError> {
        let Value::Object(body) = payload else {
            return Err(DecodeError::InvalidPayload);
        };

        let name = body.keys().next().ok_or(DecodeError::InvalidPayload)?;
        let category = name
            .parse::<RequestCategory>()
            .map_err(|_| DecodeError::UnknownCategory(name.clone()))?;

        Ok(Self { category, body })
    }
}

/// Parse raw bytes from the wire; anything that is not JSON becomes `null`
pub fn parse_payload(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap_or(Value::Null)
}

/// Payloads rejected with "payload cannot be empty"
///
/// Only a non-empty JSON object can carry a request; every scalar, every
/// list and `{}` counts as empty.
pub fn is_empty_payload(payload: &Value) -> bool {
    !matches!(payload, Value::Object(map) if !map.is_empty())
}
