use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use super::registry::SummaryRegistry;
use super::ProfileError;
use crate::config::{is_file_name_safe, ProfileConfig};
use crate::sketch::{FrequencySummary, QuantileSummary};
use crate::telemetry::{self, SharedTelemetry};

/// Class label emitted by the model.
pub type ClassKey = i64;

#[derive(Default)]
struct ClassSummaries {
    scores: HashMap<ClassKey, Arc<QuantileSummary>>,
    embeddings: HashMap<ClassKey, Arc<QuantileSummary>>,
}

/// Per-model inference statistics.
///
/// Holds a global embedding summary, a latency summary, a frequency summary
/// over class labels, and per-class score and embedding summaries created on
/// first sight of a class. Every summary is registered with the owned
/// `SummaryRegistry` exactly once, when it is created.
///
/// All `observe_*` calls are synchronous, in-memory and never touch disk.
pub struct ModelProfile {
    model_id: String,
    stat_root: PathBuf,
    data_root: PathBuf,
    top_classes: usize,
    registry: Arc<SummaryRegistry>,
    embeddings: Arc<QuantileSummary>,
    latency: Arc<QuantileSummary>,
    class_frequency: Arc<FrequencySummary>,
    // One lock for map mutation and registration, so a new class can never be
    // created or registered twice.
    classes: Mutex<ClassSummaries>,
}

impl ModelProfile {
    pub fn new(config: &ProfileConfig) -> Result<Self, ProfileError> {
        Self::with_telemetry(config, telemetry::shared())
    }

    pub fn with_telemetry(config: &ProfileConfig, telemetry: SharedTelemetry) -> Result<Self, ProfileError> {
        if config.model_id.is_empty() || !is_file_name_safe(&config.model_id) {
            return Err(ProfileError::InvalidModelId(config.model_id.clone()));
        }
        create_folder(&config.stat_root)?;
        create_folder(&config.data_root)?;

        let registry = Arc::new(SummaryRegistry::new(
            format!("ModelProfile[{}]", config.model_id),
            config.save_interval(),
            telemetry,
        ));

        let profile = Self {
            model_id: config.model_id.clone(),
            stat_root: config.stat_root.clone(),
            data_root: config.data_root.clone(),
            top_classes: config.top_classes,
            registry,
            embeddings: Arc::new(QuantileSummary::new()),
            latency: Arc::new(QuantileSummary::new()),
            class_frequency: Arc::new(FrequencySummary::new()),
            classes: Mutex::new(ClassSummaries::default()),
        };
        profile.register_globals();

        info!(
            "ModelProfile {} tracking statistics under {}",
            profile.model_id,
            profile.stat_root.display()
        );
        Ok(profile)
    }

    fn register_globals(&self) {
        self.registry.register(&self.embeddings, self.stat_root.join("embeddings.bin"));
        self.registry.register(
            &self.class_frequency,
            self.stat_root.join(format!("{}_classes.bin", self.model_id)),
        );
        self.registry.register(
            &self.latency,
            self.stat_root.join(format!("{}_latency.bin", self.model_id)),
        );
    }

    /// Feed every component of an embedding into the global summary.
    pub fn observe_embedding(&self, embedding: &[f32]) {
        self.embeddings.update_all(embedding);
    }

    /// Record `(score, class)` pairs from one inference.
    pub fn observe_classification(&self, results: &[(f32, ClassKey)]) {
        let summaries: Vec<Arc<QuantileSummary>> = {
            let mut classes = self.classes.lock();
            results
                .iter()
                .map(|(_, class)| self.score_summary(&mut classes, *class))
                .collect()
        };

        for ((score, class), summary) in results.iter().zip(summaries) {
            summary.update(*score);
            self.class_frequency.update(class.to_string());
        }
    }

    /// Same as `observe_classification`, also recording inference latency.
    pub fn observe_classification_with_latency(&self, latency_ms: f32, results: &[(f32, ClassKey)]) {
        self.latency.update(latency_ms);
        self.observe_classification(results);
    }

    /// Feed an embedding into the summary for `class`.
    pub fn observe_class_embedding(&self, class: ClassKey, embedding: &[f32]) {
        let summary = {
            let mut classes = self.classes.lock();
            self.embedding_summary(&mut classes, class)
        };
        summary.update_all(embedding);
    }

    // Both lookups run with `classes` held by the caller.
    fn score_summary(&self, classes: &mut ClassSummaries, class: ClassKey) -> Arc<QuantileSummary> {
        if let Some(existing) = classes.scores.get(&class) {
            return Arc::clone(existing);
        }
        let summary = Arc::new(QuantileSummary::new());
        self.registry.register(&summary, self.score_path(class));
        classes.scores.insert(class, Arc::clone(&summary));
        debug!("ModelProfile {}: tracking scores for class {}", self.model_id, class);
        summary
    }

    fn embedding_summary(&self, classes: &mut ClassSummaries, class: ClassKey) -> Arc<QuantileSummary> {
        if let Some(existing) = classes.embeddings.get(&class) {
            return Arc::clone(existing);
        }
        let summary = Arc::new(QuantileSummary::new());
        self.registry.register(&summary, self.class_embedding_path(class));
        classes.embeddings.insert(class, Arc::clone(&summary));
        summary
    }

    pub fn score_path(&self, class: ClassKey) -> PathBuf {
        self.stat_root.join(format!("{}{}.bin", self.model_id, class))
    }

    pub fn class_embedding_path(&self, class: ClassKey) -> PathBuf {
        self.stat_root.join(format!("{}_embedding.bin", class))
    }

    /// The configured top-class bound. Not the number of classes seen so far;
    /// see [`ModelProfile::tracked_class_count`] for that.
    pub fn num_tracked_classes(&self) -> usize {
        self.top_classes
    }

    /// Number of classes with a score summary.
    pub fn tracked_class_count(&self) -> usize {
        self.classes.lock().scores.len()
    }

    /// Most frequently predicted labels, capped at the top-class bound.
    pub fn frequent_classes(&self) -> Vec<(String, u64)> {
        self.class_frequency.top(self.top_classes)
    }

    pub fn class_score_count(&self, class: ClassKey) -> Option<u64> {
        self.classes.lock().scores.get(&class).map(|s| s.count())
    }

    pub fn class_embedding_count(&self, class: ClassKey) -> Option<u64> {
        self.classes.lock().embeddings.get(&class).map(|s| s.count())
    }

    pub fn embedding_count(&self) -> u64 {
        self.embeddings.count()
    }

    pub fn registered_paths(&self) -> Vec<PathBuf> {
        self.registry.registered_paths()
    }

    pub fn registry(&self) -> &Arc<SummaryRegistry> {
        &self.registry
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn stat_root(&self) -> &Path {
        &self.stat_root
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    pub fn start_saving(&self) -> Result<(), ProfileError> {
        self.registry.start()
    }

    /// Stop the save loop and write everything one last time.
    pub async fn stop_saving(&self) {
        self.registry.stop().await;
    }
}

impl Drop for ModelProfile {
    fn drop(&mut self) {
        // Cannot join here; the loop exits on its next wake-up.
        self.registry.signal_stop();
    }
}

fn create_folder(path: &Path) -> Result<(), ProfileError> {
    fs::create_dir_all(path).map_err(|source| ProfileError::CreateFolder {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(dir: &Path) -> ModelProfile {
        let mut config = ProfileConfig::new("m", dir.join("stats"));
        config.data_root = dir.join("data");
        config.top_classes = 3;
        ModelProfile::new(&config).unwrap()
    }

    #[test]
    fn globals_are_registered_on_construction() {
        let dir = tempfile::tempdir().unwrap();
        let profile = profile(dir.path());

        let paths = profile.registered_paths();
        assert_eq!(paths.len(), 3);
        assert!(paths.contains(&dir.path().join("stats").join("embeddings.bin")));
        assert!(dir.path().join("data").is_dir());
    }

    #[test]
    fn model_id_with_separator_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = ProfileConfig::new("../outside", dir.path().join("stats"));
        assert!(matches!(
            ModelProfile::new(&config),
            Err(ProfileError::InvalidModelId(_))
        ));
        assert!(!dir.path().join("stats").exists());
    }

    #[test]
    fn repeated_class_reuses_summary() {
        let dir = tempfile::tempdir().unwrap();
        let profile = profile(dir.path());

        profile.observe_classification(&[(0.9, 4), (0.1, 2)]);
        profile.observe_classification(&[(0.8, 4)]);

        assert_eq!(profile.tracked_class_count(), 2);
        assert_eq!(profile.class_score_count(4), Some(2));
        assert_eq!(profile.registered_paths().len(), 5);
    }
}
