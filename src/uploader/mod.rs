//! Archive-and-ship pipeline.
//!
//! Every `interval` the worker packs the source folder into a tar, gzips it,
//! posts it to the collector and, if configured, deletes the shipped files.
//! The tar and tar.gz live in the staging directory for exactly one cycle.

pub mod archive;
pub mod client;
pub mod pipeline;

pub use archive::{ArchiveBuilder, TarGzArchiver};
pub use client::{HttpUploadClient, UploadClient, UploadError, UploadRequest};
pub use pipeline::{ArtifactGuard, CycleOutcome, HttpUploader};

use std::fmt;
use serde::{Deserialize, Serialize};

/// Stages of one cycle, in execution order. Any failure jumps straight to
/// cleanup, which is not a stage of its own: it runs when the cycle's
/// `ArtifactGuard` is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CycleStage {
    Archiving,
    Compressing,
    Uploading,
    PurgingSource,
}

impl fmt::Display for CycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CycleStage::Archiving => "archiving",
            CycleStage::Compressing => "compressing",
            CycleStage::Uploading => "uploading",
            CycleStage::PurgingSource => "purging source",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("{stage} failed: {source}")]
    Io {
        stage: CycleStage,
        source: std::io::Error,
    },

    #[error("uploading failed: {0}")]
    Upload(#[from] UploadError),

    #[error("{stage} task did not complete: {message}")]
    Aborted { stage: CycleStage, message: String },

    #[error("upload loop needs a running tokio runtime")]
    NoRuntime,
}

impl PipelineError {
    /// Stage the cycle was in when it failed.
    pub fn stage(&self) -> Option<CycleStage> {
        match self {
            PipelineError::Io { stage, .. } | PipelineError::Aborted { stage, .. } => Some(*stage),
            PipelineError::Upload(_) => Some(CycleStage::Uploading),
            PipelineError::NoRuntime => None,
        }
    }
}
