//! Statistics aggregation and persistence.
//!
//! `ModelProfile` is called synchronously from the inference path and only
//! touches in-memory summaries. Every summary it creates is registered with
//! its `SummaryRegistry`, whose background loop writes them to disk on a
//! fixed interval.

pub mod model;
pub mod registry;

pub use model::{ClassKey, ModelProfile};
pub use registry::{Registration, SaveReport, SummaryRegistry};

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("failed to create folder {}: {source}", path.display())]
    CreateFolder {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("model id {0:?} cannot be used in file names")]
    InvalidModelId(String),

    #[error("save loop needs a running tokio runtime")]
    NoRuntime,
}
