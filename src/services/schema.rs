//! Request shape validation for the `ip` and `iplist` categories

use serde_json::{Map, Value};

/// Which request shape to check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    Ip,
    IpList,
}

/// Describes the first rule a payload broke; only ever logged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    pub field: &'static str,
    pub reason: &'static str,
}

impl std::fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

pub trait SchemaValidator: Send + Sync {
    fn validate(&self, kind: SchemaKind, body: &Map<String, Value>)
    -> Result<(), SchemaViolation>;
}

/// Built-in rules
///
/// - `ip`: field `ip` is a non-empty string
/// - `iplist`: field `iplist` is an array (entries are checked one by one later)
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestSchema;

impl SchemaValidator for RequestSchema {
    fn validate(
        &self,
        kind: SchemaKind,
        body: &Map<String, Value>,
    ) -> Result<(), SchemaViolation> {
        match kind {
            SchemaKind::Ip => match body.get("ip") {
                Some(Value::String(s)) if !s.is_empty() => Ok(()),
                Some(Value::String(_)) => Err(SchemaViolation {
                    field: "ip",
                    reason: "must not be empty",
                }),
                Some(_) => Err(SchemaViolation {
                    field: "ip",
                    reason: "must be a string",
                }),
                None => Err(SchemaViolation {
                    field: "ip",
                    reason: "is required",
                }),
            },
            SchemaKind::IpList => match body.get("iplist") {
                Some(Value::Array(_)) => Ok(()),
                Some(_) => Err(SchemaViolation {
                    field: "iplist",
                    reason: "must be an array",
                }),
                None => Err(SchemaViolation {
                    field: "iplist",
                    reason: "is required",
                }),
            },
        }
    }
}
