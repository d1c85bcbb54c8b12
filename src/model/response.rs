use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fixed client-facing messages
pub mod messages {
    pub const EMPTY_PAYLOAD: &str = "payload cannot be empty";
    pub const UNAUTHORIZED: &str = "unauthorized request";
    pub const INVALID_PAYLOAD: &str = "invalid payload";
    pub const INVALID_REQUEST: &str = "invalid request";
    pub const PONG: &str = "pong";
    pub const INVALID_IP: &str = "invalid ip";
    pub const INVALID_IP_LIST: &str = "invalid ip list";
    pub const IP_LIST_TOO_LONG: &str = "max. 100 ip address is allowed";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// Reply envelope; `status`, `data` and `message` are always present
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub status: ResponseStatus,
    pub data: Option<Value>,
    pub message: Option<String>,
}

impl ResponseEnvelope {
    pub fn success(data: Option<Value>, message: Option<&str>) -> Self {
        Self {
            status: ResponseStatus::Success,
            data,
            message: message.map(str::to_string),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            data: None,
            message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }

    /// Serialize for the wire
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_else(|_| {
            br#"{"status":"error","data":null,"message":"internal error"}"#.to_vec()
        })
    }
}
