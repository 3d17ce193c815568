//! Worker telemetry.
//!
//! The save loop and the upload loop record one event per tick / cycle into a
//! bounded ring buffer. Counters are derived on demand by `compute_snapshot`,
//! so recording stays cheap and never allocates beyond the buffer cap.
//!
//! Events carry counts, sizes and stage names only. File contents and
//! credentials never enter the recorder.

pub mod event;
pub mod metrics;
pub mod recorder;

pub use event::TelemetryEvent;
pub use metrics::{compute_snapshot, SaveStats, TelemetrySnapshot, UploadStats};
pub use recorder::{shared, SharedTelemetry, TelemetryRecorder};
