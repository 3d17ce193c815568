use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{validate_config, AgentConfig, ConfigError, ConfigResult};

pub const CONFIG_FILE_NAME: &str = "infstat.toml";
pub const CONFIG_PATH_ENV: &str = "INFSTAT_CONFIG_PATH";

/// Locate the configuration file.
///
/// Search order:
/// 1. `INFSTAT_CONFIG_PATH` environment variable
/// 2. `./infstat.toml`
/// 3. `/etc/infstat/infstat.toml`
pub fn find_config_file() -> ConfigResult<PathBuf> {
    if let Ok(env_path) = env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        return Err(ConfigError::FileNotFound(format!(
            "{} points at {}, which does not exist",
            CONFIG_PATH_ENV,
            path.display()
        )));
    }

    let mut search_paths = Vec::new();
    if let Ok(cwd) = env::current_dir() {
        search_paths.push(cwd.join(CONFIG_FILE_NAME));
    }
    search_paths.push(Path::new("/etc/infstat").join(CONFIG_FILE_NAME));

    for path in &search_paths {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    let searched = search_paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    Err(ConfigError::FileNotFound(searched))
}

/// Load, override and validate.
///
/// `config_path` of `None` falls back to [`find_config_file`].
pub fn load_config(config_path: Option<&Path>) -> ConfigResult<AgentConfig> {
    let config_file = match config_path {
        Some(path) => path.to_path_buf(),
        None => find_config_file()?,
    };
    debug!("Loading configuration from {}", config_file.display());

    let content = fs::read_to_string(&config_file)?;
    let mut config = parse_config(&content)?;
    apply_environment_overrides(&mut config);
    validate_config(&config)?;
    Ok(config)
}

/// Parse TOML text without overrides or validation.
pub fn parse_config(content: &str) -> ConfigResult<AgentConfig> {
    Ok(toml::from_str(content)?)
}

/// Apply environment variable overrides.
///
/// Supported variables:
/// - `INFSTAT_MODEL_ID` -> `profile.model_id`
/// - `INFSTAT_STAT_ROOT` -> `profile.stat_root`
/// - `INFSTAT_SAVE_INTERVAL` -> `profile.save_interval_secs`
/// - `INFSTAT_ENDPOINT_URL` -> `upload.endpoint_url`
/// - `INFSTAT_AUTH_TOKEN` -> `upload.auth_token`
/// - `INFSTAT_SENSOR_ID` -> `upload.sensor_id`
/// - `INFSTAT_UPLOAD_INTERVAL` -> `upload.interval_secs`
/// - `INFSTAT_DELETE_AFTER_ARCHIVE` -> `upload.delete_after_archive`
pub fn apply_environment_overrides(config: &mut AgentConfig) {
    if let Ok(value) = env::var("INFSTAT_MODEL_ID") {
        config.profile.model_id = value;
    }
    if let Ok(value) = env::var("INFSTAT_STAT_ROOT") {
        config.profile.stat_root = PathBuf::from(value);
    }
    if let Ok(value) = env::var("INFSTAT_SAVE_INTERVAL") {
        if let Ok(secs) = value.parse::<u64>() {
            config.profile.save_interval_secs = secs;
        }
    }

    if let Ok(value) = env::var("INFSTAT_ENDPOINT_URL") {
        config.upload.endpoint_url = value;
    }
    if let Ok(value) = env::var("INFSTAT_AUTH_TOKEN") {
        config.upload.auth_token = value;
    }
    if let Ok(value) = env::var("INFSTAT_SENSOR_ID") {
        config.upload.sensor_id = value;
    }
    if let Ok(value) = env::var("INFSTAT_UPLOAD_INTERVAL") {
        if let Ok(secs) = value.parse::<u64>() {
            config.upload.interval_secs = secs;
        }
    }
    if let Ok(value) = env::var("INFSTAT_DELETE_AFTER_ARCHIVE") {
        config.upload.delete_after_archive = parse_flag(&value);
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes")
}
