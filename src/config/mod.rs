mod r#impl;
mod structs;
pub mod validators;

pub use r#impl::{
    DEFAULT_CONFIG_PATH, config_path, init_config, install_config, reload_config,
    try_get_config,
};
pub use structs::*;
pub use validators::validate_config;
