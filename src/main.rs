use std::path::PathBuf;

use anyhow::Context;
use infstat::config::load_config;
use infstat::telemetry;
use infstat::HttpUploader;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Standalone shipping agent: archives and uploads whatever the inference
/// process has written to `upload.source_folder`.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")?;

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = load_config(config_path.as_deref()).context("loading configuration")?;
    tracing::info!("infstat agent starting as sensor {}", config.upload.sensor_id);

    let telemetry = telemetry::shared();
    let mut uploader = HttpUploader::from_config(config.upload.clone(), telemetry.clone())?;
    uploader.start()?;

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    tracing::info!("Shutdown requested");
    uploader.stop().await;

    let snapshot = telemetry.lock().snapshot();
    tracing::info!("Final telemetry: {}", serde_json::to_string(&snapshot.upload)?);
    Ok(())
}
