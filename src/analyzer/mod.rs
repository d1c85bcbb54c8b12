//! Request pipeline
//!
//! Authenticate → extract category → dispatch → handle → respond.
//! Every failure becomes an error envelope; nothing here ends the worker.

mod handlers;

use std::sync::Arc;

use arc_swap::ArcSwap;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::BackendHandle;
use crate::config::{AppConfig, AuthConfig};
use crate::model::{
    DecodeError, Request, RequestCategory, ResponseEnvelope, is_empty_payload, messages,
    parse_payload,
};
use crate::services::{
    Argon2Verifier, BlacklistSnapshot, CredentialVerifier, ReaderSlot, RequestSchema,
    SchemaValidator,
};
use crate::stats::StatsCounter;

/// Shared, swappable blacklist snapshot
pub type BlacklistSlot = ArcSwap<BlacklistSnapshot>;

pub struct Analyzer {
    readers: Arc<ReaderSlot>,
    blacklist: Arc<BlacklistSlot>,
    backend: BackendHandle,
    stats: Arc<StatsCounter>,
    schema: Arc<dyn SchemaValidator>,
    verifier: Arc<dyn CredentialVerifier>,
}

impl Analyzer {
    pub fn new(
        readers: Arc<ReaderSlot>,
        blacklist: Arc<BlacklistSlot>,
        backend: BackendHandle,
        stats: Arc<StatsCounter>,
    ) -> Self {
        Self {
            readers,
            blacklist,
            backend,
            stats,
            schema: Arc::new(RequestSchema),
            verifier: Arc::new(Argon2Verifier),
        }
    }

    pub fn with_schema(mut self, schema: Arc<dyn SchemaValidator>) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn CredentialVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    pub fn stats(&self) -> &Arc<StatsCounter> {
        &self.stats
    }

    /// Handle raw bytes received from a connection
    pub async fn handle_bytes(&self, config: &AppConfig, bytes: &[u8]) -> ResponseEnvelope {
        self.handle(config, parse_payload(bytes)).await
    }

    /// Handle one decoded payload under the given configuration snapshot
    pub async fn handle(&self, config: &AppConfig, payload: Value) -> ResponseEnvelope {
        if is_empty_payload(&payload) {
            debug!("Rejected empty payload");
            return ResponseEnvelope::error(messages::EMPTY_PAYLOAD);
        }

        let Some(payload) = self.authenticate(&config.auth, payload) else {
            warn!("Unauthorized request rejected");
            return ResponseEnvelope::error(messages::UNAUTHORIZED);
        };

        let request = match Request::decode(payload) {
            Ok(request) => request,
            Err(DecodeError::InvalidPayload) => {
                debug!("Rejected payload without a request field");
                return ResponseEnvelope::error(messages::INVALID_PAYLOAD);
            }
            Err(DecodeError::UnknownCategory(name)) => {
                debug!("Unknown request category: {}", name);
                return ResponseEnvelope::error(messages::INVALID_REQUEST);
            }
        };

        self.dispatch(config, request).await
    }

    /// With auth enabled, verify and strip the `auth` field
    ///
    /// `None` means the request is rejected; the reason is never returned.
    fn authenticate(&self, auth: &AuthConfig, payload: Value) -> Option<Value> {
        if !auth.enabled {
            return Some(payload);
        }

        let Value::Object(mut body) = payload else {
            return None;
        };
        let Some(Value::String(secret)) = body.shift_remove("auth") else {
            return None;
        };
        if !auth.authenticate(self.verifier.as_ref(), &secret) {
            return None;
        }
        Some(Value::Object(body))
    }

    async fn dispatch(&self, config: &AppConfig, request: Request) -> ResponseEnvelope {
        match request.category {
            RequestCategory::Ping => ResponseEnvelope::success(None, Some(messages::PONG)),
            RequestCategory::Status => self.handle_status().await,
            RequestCategory::Ip => self.handle_ip(config, &request.body).await,
            RequestCategory::IpList => self.handle_ip_list(config, &request.body).await,
        }
    }
}
