use super::{AgentConfig, ConfigError, ConfigResult};

/// Reject configurations the workers cannot run with.
pub fn validate_config(config: &AgentConfig) -> ConfigResult<()> {
    let profile = &config.profile;
    let upload = &config.upload;

    if profile.model_id.trim().is_empty() {
        return Err(ConfigError::MissingRequired("profile.model_id".to_string()));
    }
    if !is_file_name_safe(&profile.model_id) {
        return Err(ConfigError::InvalidValue(format!(
            "profile.model_id {:?} is used in file names and may not contain path separators",
            profile.model_id
        )));
    }
    if profile.save_interval_secs == 0 {
        return Err(ConfigError::InvalidValue(
            "profile.save_interval_secs must be at least 1".to_string(),
        ));
    }

    if upload.endpoint_url.trim().is_empty() {
        return Err(ConfigError::MissingRequired("upload.endpoint_url".to_string()));
    }
    if !upload.endpoint_url.starts_with("http://") && !upload.endpoint_url.starts_with("https://") {
        return Err(ConfigError::InvalidValue(format!(
            "upload.endpoint_url must be an http(s) URL, got {}",
            upload.endpoint_url
        )));
    }
    if upload.sensor_id.trim().is_empty() {
        return Err(ConfigError::MissingRequired("upload.sensor_id".to_string()));
    }
    if upload.interval_secs == 0 {
        return Err(ConfigError::InvalidValue(
            "upload.interval_secs must be at least 1".to_string(),
        ));
    }
    if upload.request_timeout_secs == 0 {
        return Err(ConfigError::InvalidValue(
            "upload.request_timeout_secs must be at least 1".to_string(),
        ));
    }
    // The tar would otherwise contain itself.
    if upload.staging_dir.starts_with(&upload.source_folder) {
        return Err(ConfigError::InvalidValue(format!(
            "upload.staging_dir {} lies inside upload.source_folder {}",
            upload.staging_dir.display(),
            upload.source_folder.display()
        )));
    }

    Ok(())
}

/// True when `id` can be embedded in a file name without leaving its folder.
pub fn is_file_name_safe(id: &str) -> bool {
    !id.contains(['/', '\\', '\0']) && id != "." && id != ".."
}
