use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex as CycleLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::archive::{ArchiveBuilder, TarGzArchiver};
use super::client::{HttpUploadClient, UploadClient, UploadRequest};
use super::{CycleStage, PipelineError};
use crate::config::UploadConfig;
use crate::telemetry::{self, SharedTelemetry, TelemetryEvent};
use crate::worker::Worker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Shipped { files: usize, bytes: u64, purged: bool },
    /// No file in the source folder could be packed.
    NothingToShip,
}

/// Temporary tar and tar.gz of one cycle. Both files are removed when the
/// guard drops, whichever way the cycle ends.
#[derive(Debug)]
pub struct ArtifactGuard {
    container: PathBuf,
    compressed: PathBuf,
}

impl ArtifactGuard {
    pub fn new(staging_dir: &Path) -> Self {
        let id = Uuid::new_v4();
        Self {
            container: staging_dir.join(format!("archive-{}.tar", id)),
            compressed: staging_dir.join(format!("archive-{}.tar.gz", id)),
        }
    }

    pub fn container(&self) -> &Path {
        &self.container
    }

    pub fn compressed(&self) -> &Path {
        &self.compressed
    }
}

impl Drop for ArtifactGuard {
    fn drop(&mut self) {
        for path in [&self.container, &self.compressed] {
            match fs::remove_file(path) {
                Ok(()) => debug!("Removed {}", path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
            }
        }
    }
}

struct CycleRunner {
    config: UploadConfig,
    archiver: Arc<dyn ArchiveBuilder>,
    client: Arc<dyn UploadClient>,
    telemetry: SharedTelemetry,
    // Cycles never overlap, even when `run_cycle` is called next to the loop.
    serial: CycleLock<()>,
}

impl CycleRunner {
    async fn run_cycle(&self) -> Result<CycleOutcome, PipelineError> {
        let _serial = self.serial.lock().await;
        let timestamp = unix_timestamp(SystemTime::now());

        let result = self.execute(timestamp).await;

        let event = match &result {
            Ok(CycleOutcome::Shipped { files, bytes, purged }) => TelemetryEvent::CycleCompleted {
                files: *files,
                bytes: *bytes,
                purged: *purged,
            },
            Ok(CycleOutcome::NothingToShip) => TelemetryEvent::CycleSkipped,
            Err(e) => TelemetryEvent::CycleFailed {
                stage: e.stage().unwrap_or(CycleStage::Archiving),
            },
        };
        self.telemetry.lock().record(event);
        result
    }

    async fn execute(&self, timestamp: u64) -> Result<CycleOutcome, PipelineError> {
        let source = self.config.source_folder.clone();
        let staging = self.config.staging_dir.clone();
        let artifacts = ArtifactGuard::new(&staging);

        // 1. Archive
        let files = {
            let archiver = Arc::clone(&self.archiver);
            let source = source.clone();
            let container = artifacts.container().to_path_buf();
            blocking(CycleStage::Archiving, move || {
                let files = archiver.collect_files(&source)?;
                if files.is_empty() {
                    return Ok(files);
                }
                fs::create_dir_all(&staging)?;
                archiver.create_container(&container, &source, &files)
            })
            .await?
        };
        if files.is_empty() {
            debug!("Nothing to ship in {}", source.display());
            return Ok(CycleOutcome::NothingToShip);
        }

        // 2. Compress
        {
            let archiver = Arc::clone(&self.archiver);
            let container = artifacts.container().to_path_buf();
            let compressed = artifacts.compressed().to_path_buf();
            blocking(CycleStage::Compressing, move || archiver.compress(&container, &compressed)).await?;
        }

        // 3. Upload
        let payload = tokio::fs::read(artifacts.compressed())
            .await
            .map_err(|source| PipelineError::Io {
                stage: CycleStage::Uploading,
                source,
            })?;
        let bytes = payload.len() as u64;
        let file_name = artifacts
            .compressed()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "archive.tar.gz".to_string());

        self.client
            .submit(UploadRequest {
                sensor_id: self.config.sensor_id.clone(),
                timestamp,
                file_type: self.config.file_type.clone(),
                file_name,
                payload,
            })
            .await?;

        // 4. Purge, only what was packed. Failure keeps the cycle successful.
        let mut purged = false;
        if self.config.delete_after_archive {
            let archiver = Arc::clone(&self.archiver);
            let shipped = files.clone();
            match blocking(CycleStage::PurgingSource, move || archiver.purge(&source, &shipped)).await {
                Ok(()) => purged = true,
                Err(e) => warn!("Uploaded archive but could not empty source folder: {}", e),
            }
        }

        Ok(CycleOutcome::Shipped {
            files: files.len(),
            bytes,
            purged,
        })
    }
}

/// Seconds since the unix epoch. A clock set before the epoch yields 0,
/// with a warning, rather than failing the cycle.
fn unix_timestamp(now: SystemTime) -> u64 {
    match now.duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_secs(),
        Err(e) => {
            warn!("System clock is {:?} before the unix epoch; uploading with timestamp 0", e.duration());
            0
        }
    }
}

async fn blocking<T, F>(stage: CycleStage, task: F) -> Result<T, PipelineError>
where
    F: FnOnce() -> io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(task).await {
        Ok(result) => result.map_err(|source| PipelineError::Io { stage, source }),
        Err(e) => Err(PipelineError::Aborted {
            stage,
            message: e.to_string(),
        }),
    }
}

/// Background worker that archives, uploads and reclaims the source folder
/// on a fixed interval.
pub struct HttpUploader {
    runner: Arc<CycleRunner>,
    worker: Option<Worker>,
}

impl HttpUploader {
    /// tar.gz archiver plus a reqwest client built from `config`.
    pub fn from_config(config: UploadConfig, telemetry: SharedTelemetry) -> Result<Self, PipelineError> {
        let client = HttpUploadClient::new(
            config.endpoint_url.clone(),
            config.auth_token.clone(),
            config.request_timeout(),
        )?;
        Ok(Self::with_parts(config, Arc::new(TarGzArchiver::new()), Arc::new(client), telemetry))
    }

    pub fn new(config: UploadConfig, archiver: Arc<dyn ArchiveBuilder>, client: Arc<dyn UploadClient>) -> Self {
        Self::with_parts(config, archiver, client, telemetry::shared())
    }

    pub fn with_parts(
        config: UploadConfig,
        archiver: Arc<dyn ArchiveBuilder>,
        client: Arc<dyn UploadClient>,
        telemetry: SharedTelemetry,
    ) -> Self {
        Self {
            runner: Arc::new(CycleRunner {
                config,
                archiver,
                client,
                telemetry,
                serial: CycleLock::new(()),
            }),
            worker: None,
        }
    }

    pub fn config(&self) -> &UploadConfig {
        &self.runner.config
    }

    pub fn telemetry(&self) -> SharedTelemetry {
        Arc::clone(&self.runner.telemetry)
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Run one archive → compress → upload → purge cycle now.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, PipelineError> {
        self.runner.run_cycle().await
    }

    /// Start the loop: one cycle immediately, then one per interval.
    pub fn start(&mut self) -> Result<(), PipelineError> {
        if self.is_running() {
            return Ok(());
        }
        let runner = Arc::clone(&self.runner);
        let worker = Worker::spawn("HttpUploader", move |cancel| upload_loop(runner, cancel))
            .ok_or(PipelineError::NoRuntime)?;
        self.worker = Some(worker);
        Ok(())
    }

    /// Stop the loop and wait for it. A cycle in flight runs to completion,
    /// cleanup included, before this returns.
    pub async fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.shutdown().await;
            info!("HttpUploader stopped");
        }
    }
}

impl Drop for HttpUploader {
    fn drop(&mut self) {
        if let Some(worker) = &self.worker {
            worker.signal();
        }
    }
}

async fn upload_loop(runner: Arc<CycleRunner>, cancel: CancellationToken) {
    let interval = runner.config.interval();
    info!(
        "HttpUploader shipping {} to {} every {:?}",
        runner.config.source_folder.display(),
        runner.config.endpoint_url,
        interval
    );

    loop {
        if cancel.is_cancelled() {
            break;
        }

        match runner.run_cycle().await {
            Ok(CycleOutcome::Shipped { files, bytes, purged }) => {
                info!("Shipped {} files ({} bytes compressed, purged: {})", files, bytes, purged)
            }
            Ok(CycleOutcome::NothingToShip) => {}
            Err(e) => error!("Upload cycle failed: {}", e),
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}
