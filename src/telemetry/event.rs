use serde::{Deserialize, Serialize};
use crate::uploader::CycleStage;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TelemetryEvent {
    /// One pass of the persistence registry.
    SaveTick {
        written: usize,
        failed: usize,
        skipped: usize,
    },

    CycleCompleted {
        files: usize,
        bytes: u64,
        purged: bool,
    },

    /// Source folder was empty; nothing was packed or sent.
    CycleSkipped,

    CycleFailed {
        stage: CycleStage,
    },
}
