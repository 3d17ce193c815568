use std::collections::VecDeque;
use serde::Serialize;
use super::event::TelemetryEvent;
use crate::uploader::CycleStage;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    pub save: SaveStats,
    pub upload: UploadStats,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SaveStats {
    pub ticks: u64,
    pub files_written: u64,
    pub write_failures: u64,
    pub dropped_handles: u64,
    /// Ticks where at least one write failed.
    pub degraded_ticks: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UploadStats {
    pub cycles: u64,
    pub shipped: u64,
    pub skipped: u64,
    pub failed: u64,
    pub files_shipped: u64,
    pub bytes_shipped: u64,
    pub purges: u64,
    pub avg_bytes_per_cycle: f64,
    pub last_failure: Option<CycleStage>,
}

pub fn compute_snapshot(events: &VecDeque<TelemetryEvent>) -> TelemetrySnapshot {
    let mut snap = TelemetrySnapshot::default();

    for event in events {
        match event {
            TelemetryEvent::SaveTick { written, failed, skipped } => {
                snap.save.ticks += 1;
                snap.save.files_written += *written as u64;
                snap.save.write_failures += *failed as u64;
                snap.save.dropped_handles += *skipped as u64;
                if *failed > 0 {
                    snap.save.degraded_ticks += 1;
                }
            }
            TelemetryEvent::CycleCompleted { files, bytes, purged } => {
                snap.upload.cycles += 1;
                snap.upload.shipped += 1;
                snap.upload.files_shipped += *files as u64;
                snap.upload.bytes_shipped += bytes;
                if *purged {
                    snap.upload.purges += 1;
                }
            }
            TelemetryEvent::CycleSkipped => {
                snap.upload.cycles += 1;
                snap.upload.skipped += 1;
            }
            TelemetryEvent::CycleFailed { stage } => {
                snap.upload.cycles += 1;
                snap.upload.failed += 1;
                snap.upload.last_failure = Some(*stage);
            }
        }
    }

    if snap.upload.shipped > 0 {
        snap.upload.avg_bytes_per_cycle = snap.upload.bytes_shipped as f64 / snap.upload.shipped as f64;
    }

    snap
}
