//! Agent configuration.
//!
//! Loaded from a TOML file, then environment overrides are applied, then the
//! result is validated. Workers receive their own clone of the relevant
//! section at construction time and never observe later changes.
//!
//! ```toml
//! [profile]
//! model_id = "resnet50"
//! stat_root = "/var/lib/infstat/stats"
//! save_interval_secs = 60
//!
//! [upload]
//! endpoint_url = "https://collector.example.com/upload"
//! auth_token = "..."
//! sensor_id = "edge-01"
//! source_folder = "/var/lib/infstat/stats"
//! delete_after_archive = true
//! ```

pub mod loader;
pub mod types;
pub mod validation;

pub use loader::{apply_environment_overrides, find_config_file, load_config, parse_config, CONFIG_FILE_NAME};
pub use types::*;
pub use validation::{is_file_name_safe, validate_config};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
