//! ip-analyzer - IP geolocation lookup service
//!
//! Clients send one JSON request per TCP connection; workers resolve the
//! address against a MaxMind database, annotate an IPsum threat level and
//! share results and counters through an optional Redis backend.
//!
//! # Architecture
//! - `analyzer`: request pipeline (auth, dispatch, handlers)
//! - `cache`: result cache, eviction policies and backends
//! - `services`: geo readers, blacklist, schema and credential checks
//! - `stats`: success/failure counters
//! - `scheduler`: deadline-queue job runner and cron parser
//! - `runtime`: worker context, resource lifecycle, supervisor and worker modes
//! - `config`: configuration management
//! - `system`: logging and platform abstraction

pub mod analyzer;
pub mod cache;
pub mod cli;
pub mod config;
pub mod errors;
pub mod model;
pub mod runtime;
pub mod scheduler;
pub mod services;
pub mod stats;
pub mod system;
