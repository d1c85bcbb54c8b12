use std::sync::{Arc, OnceLock};

use arc_swap::ArcSwap;

use super::AppConfig;
use super::validators::validate_config;
use crate::errors::{AnalyzerError, Result};

static CONFIG: OnceLock<ArcSwap<AppConfig>> = OnceLock::new();
static CONFIG_PATH: OnceLock<String> = OnceLock::new();

/// Default configuration file, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Current configuration snapshot, `None` before [`init_config`]
///
/// Components take the snapshot once per request and pass it down
/// explicitly, so a reload never changes settings halfway through a request.
pub fn try_get_config() -> Option<Arc<AppConfig>> {
    CONFIG.get().map(|c| c.load_full())
}

/// Load, validate and install the global configuration
///
/// Only the first call loads from disk; later calls are no-ops.
pub fn init_config(path: Option<&str>) -> Result<Arc<AppConfig>> {
    let path = CONFIG_PATH.get_or_init(|| path.unwrap_or(DEFAULT_CONFIG_PATH).to_string());

    if let Some(existing) = CONFIG.get() {
        return Ok(existing.load_full());
    }

    let config = load_validated(path)?;
    let swap = CONFIG.get_or_init(|| ArcSwap::from_pointee(config));
    Ok(swap.load_full())
}

/// Install an already constructed configuration (embedding and tests)
pub fn install_config(config: AppConfig) -> Arc<AppConfig> {
    let config = Arc::new(config);
    match CONFIG.get() {
        Some(swap) => swap.store(config.clone()),
        None => {
            let _ = CONFIG.set(ArcSwap::new(config.clone()));
        }
    }
    config
}

/// Rebuild the configuration from its file and environment, then swap it in
///
/// On failure the active configuration stays untouched.
pub fn reload_config() -> Result<Arc<AppConfig>> {
    let swap = CONFIG
        .get()
        .ok_or_else(|| AnalyzerError::config("Config not initialized"))?;
    let path = CONFIG_PATH
        .get()
        .map(String::as_str)
        .unwrap_or(DEFAULT_CONFIG_PATH);

    let config = Arc::new(load_validated(path)?);
    swap.store(config.clone());
    Ok(config)
}

/// Path the configuration was loaded from
pub fn config_path() -> &'static str {
    CONFIG_PATH
        .get()
        .map(String::as_str)
        .unwrap_or(DEFAULT_CONFIG_PATH)
}

fn load_validated(path: &str) -> Result<AppConfig> {
    let config = AppConfig::load(path)
        .map_err(|e| AnalyzerError::config(format!("Failed to load {}: {}", path, e)))?;
    validate_config(&config)?;
    Ok(config)
}
