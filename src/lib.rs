pub mod config;
pub mod profile;
pub mod sketch;
pub mod telemetry;
pub mod uploader;
pub mod worker;

pub use config::{AgentConfig, ProfileConfig, UploadConfig};
pub use profile::{ClassKey, ModelProfile, SummaryRegistry};
pub use uploader::{CycleOutcome, HttpUploader};
