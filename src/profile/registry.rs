use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::ProfileError;
use crate::sketch::{Persistable, SummaryKind};
use crate::telemetry::{SharedTelemetry, TelemetryEvent};
use crate::worker::Worker;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// A summary and the file it is written to.
///
/// The registry never owns the summary. Once the owner drops it the
/// registration is skipped on every following tick.
#[derive(Debug, Clone)]
pub struct Registration {
    handle: Weak<dyn Persistable>,
    pub path: PathBuf,
    pub kind: SummaryKind,
}

impl Registration {
    pub fn is_live(&self) -> bool {
        self.handle.strong_count() > 0
    }
}

/// Outcome of one save pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveReport {
    pub written: usize,
    pub failed: usize,
    /// Registrations whose summary no longer exists.
    pub skipped: usize,
}

/// Periodically writes every registered summary to its destination.
pub struct SummaryRegistry {
    name: String,
    interval: Duration,
    registrations: RwLock<Vec<Registration>>,
    telemetry: SharedTelemetry,
    worker: Mutex<Option<Worker>>,
}

impl SummaryRegistry {
    pub fn new(name: impl Into<String>, interval: Duration, telemetry: SharedTelemetry) -> Self {
        Self {
            name: name.into(),
            interval: interval.max(MIN_INTERVAL),
            registrations: RwLock::new(Vec::new()),
            telemetry,
            worker: Mutex::new(None),
        }
    }

    /// Add a summary to the save set.
    ///
    /// Each handle must be registered exactly once, at a path no other
    /// registration uses. The caller is responsible for check-then-register.
    pub fn register<T>(&self, handle: &Arc<T>, path: impl Into<PathBuf>)
    where
        T: Persistable + 'static,
    {
        let path = path.into();
        let weak: Weak<T> = Arc::downgrade(handle);
        let mut registrations = self.registrations.write();
        debug_assert!(
            !registrations.iter().any(|r| r.path == path),
            "summary path registered twice: {}",
            path.display()
        );
        debug!("{}: registered {:?} summary at {}", self.name, handle.kind(), path.display());
        registrations.push(Registration {
            handle: weak,
            kind: handle.kind(),
            path,
        });
    }

    pub fn registrations(&self) -> Vec<Registration> {
        self.registrations.read().clone()
    }

    pub fn registered_paths(&self) -> Vec<PathBuf> {
        self.registrations.read().iter().map(|r| r.path.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.registrations.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.read().is_empty()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn telemetry(&self) -> SharedTelemetry {
        Arc::clone(&self.telemetry)
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Serialize every live registration once.
    ///
    /// Works on a snapshot of the registration set, so producers may keep
    /// registering while this runs. A failed write is logged and counted and
    /// the remaining registrations are still written.
    pub fn save_now(&self) -> SaveReport {
        let snapshot = self.registrations.read().clone();
        let mut report = SaveReport::default();

        for registration in &snapshot {
            let Some(summary) = registration.handle.upgrade() else {
                report.skipped += 1;
                continue;
            };
            let bytes = summary.to_bytes();
            match write_atomically(&registration.path, &bytes) {
                Ok(()) => report.written += 1,
                Err(e) => {
                    warn!("{}: failed to save {}: {}", self.name, registration.path.display(), e);
                    report.failed += 1;
                }
            }
        }

        debug!(
            "{}: save pass wrote {} / failed {} / skipped {}",
            self.name, report.written, report.failed, report.skipped
        );
        self.telemetry.lock().record(TelemetryEvent::SaveTick {
            written: report.written,
            failed: report.failed,
            skipped: report.skipped,
        });
        report
    }

    /// Start the save loop. Calling it on a running registry is a no-op.
    pub fn start(self: &Arc<Self>) -> Result<(), ProfileError> {
        let mut worker = self.worker.lock();
        if worker.as_ref().is_some_and(|w| !w.is_finished()) {
            return Ok(());
        }

        let registry = Arc::clone(self);
        let spawned = Worker::spawn(self.name.clone(), move |cancel| registry.run(cancel))
            .ok_or(ProfileError::NoRuntime)?;
        *worker = Some(spawned);

        info!("{}: saving every {:?}", self.name, self.interval);
        Ok(())
    }

    /// Stop the save loop, wait for it to exit, then flush once more so the
    /// last partial interval reaches disk.
    pub async fn stop(self: &Arc<Self>) {
        let worker = self.worker.lock().take();
        let Some(worker) = worker else {
            return;
        };
        worker.shutdown().await;
        self.flush().await;
        info!("{}: stopped", self.name);
    }

    /// Ask the loop to exit without waiting. Used where we cannot await.
    pub fn signal_stop(&self) {
        if let Some(worker) = self.worker.lock().as_ref() {
            worker.signal();
        }
    }

    async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut cadence = interval(self.interval);
        cadence.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // First tick completes immediately; nothing has been observed yet.
        cadence.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = cadence.tick() => {}
            }
            self.flush().await;
        }
    }

    async fn flush(self: &Arc<Self>) -> Option<SaveReport> {
        let registry = Arc::clone(self);
        match tokio::task::spawn_blocking(move || registry.save_now()).await {
            Ok(report) => Some(report),
            Err(e) => {
                error!("{}: save pass aborted: {}", self.name, e);
                None
            }
        }
    }
}

/// Write to `<path>.tmp`, then rename over `path`.
fn write_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let written = fs::File::create(&tmp).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });
    if let Err(e) = written.and_then(|()| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}
