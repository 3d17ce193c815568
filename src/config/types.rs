use std::path::PathBuf;
use std::time::Duration;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub profile: ProfileConfig,
    pub upload: UploadConfig,
}

/// Settings for the statistics engine and its persistence registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// Prefix of the per-class score files.
    pub model_id: String,

    /// Where serialized summaries are written.
    #[serde(default = "default_stat_root")]
    pub stat_root: PathBuf,

    /// Where the application drops raw samples. Created on startup.
    #[serde(default = "default_data_root")]
    pub data_root: PathBuf,

    #[serde(default = "default_save_interval_secs")]
    pub save_interval_secs: u64,

    /// Upper bound reported by `num_tracked_classes` and used to cap
    /// `frequent_classes`.
    #[serde(default = "default_top_classes")]
    pub top_classes: usize,
}

impl ProfileConfig {
    pub fn new(model_id: impl Into<String>, stat_root: impl Into<PathBuf>) -> Self {
        Self {
            model_id: model_id.into(),
            stat_root: stat_root.into(),
            data_root: default_data_root(),
            save_interval_secs: default_save_interval_secs(),
            top_classes: default_top_classes(),
        }
    }

    pub fn save_interval(&self) -> Duration {
        Duration::from_secs(self.save_interval_secs)
    }
}

/// Settings for the archive-and-ship worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadConfig {
    pub endpoint_url: String,
    pub auth_token: String,
    pub sensor_id: String,

    #[serde(default = "default_source_folder")]
    pub source_folder: PathBuf,

    #[serde(default = "default_upload_interval_secs")]
    pub interval_secs: u64,

    /// Sent verbatim as the `file_type` form field.
    #[serde(default = "default_file_type")]
    pub file_type: String,

    #[serde(default)]
    pub delete_after_archive: bool,

    /// Scratch space for the per-cycle tar and tar.gz.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl UploadConfig {
    pub fn new(
        endpoint_url: impl Into<String>,
        auth_token: impl Into<String>,
        sensor_id: impl Into<String>,
        source_folder: impl Into<PathBuf>,
    ) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            auth_token: auth_token.into(),
            sensor_id: sensor_id.into(),
            source_folder: source_folder.into(),
            interval_secs: default_upload_interval_secs(),
            file_type: default_file_type(),
            delete_after_archive: false,
            staging_dir: default_staging_dir(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_stat_root() -> PathBuf {
    PathBuf::from("./stats")
}

fn default_data_root() -> PathBuf {
    PathBuf::from("./data")
}

fn default_save_interval_secs() -> u64 {
    60
}

fn default_top_classes() -> usize {
    10
}

fn default_source_folder() -> PathBuf {
    PathBuf::from("./stats")
}

fn default_upload_interval_secs() -> u64 {
    300
}

fn default_file_type() -> String {
    "statistics".to_string()
}

fn default_staging_dir() -> PathBuf {
    std::env::temp_dir().join("infstat")
}

fn default_request_timeout_secs() -> u64 {
    30
}
