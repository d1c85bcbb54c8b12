//! Service layer
//!
//! Collaborators the request pipeline is built from: geo lookup, blacklist
//! snapshots, credential checks and request shape validation.

pub mod blacklist;
mod credential;
pub mod geoip;
mod schema;

pub use blacklist::{BlacklistSnapshot, BlacklistUpdater};
pub use credential::{Argon2Verifier, CredentialVerifier, hash_secret};
pub use geoip::{GeoReader, LoadedReader, MaxMindReader, ReaderSlot};
pub use schema::{RequestSchema, SchemaKind, SchemaValidator, SchemaViolation};
