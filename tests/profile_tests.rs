use infstat::config::ProfileConfig;
use infstat::profile::{ModelProfile, SaveReport, SummaryRegistry};
use infstat::sketch::QuantileSummary;
use infstat::telemetry;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn config(dir: &Path, save_interval_secs: u64) -> ProfileConfig {
    let mut config = ProfileConfig::new("resnet", dir.join("stats"));
    config.data_root = dir.join("data");
    config.save_interval_secs = save_interval_secs;
    config.top_classes = 5;
    config
}

fn files_in(dir: &Path) -> HashSet<PathBuf> {
    fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect()
}

#[test]
fn test_concurrent_first_sight_creates_one_summary_per_class() {
    let dir = tempfile::tempdir().unwrap();
    let profile = Arc::new(ModelProfile::new(&config(dir.path(), 60)).unwrap());

    const THREADS: usize = 8;
    const ROUNDS: usize = 50;
    const CLASSES: i64 = 20;

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let profile = Arc::clone(&profile);
            thread::spawn(move || {
                for round in 0..ROUNDS {
                    // Every thread walks the classes in a different order.
                    let results: Vec<(f32, i64)> = (0..CLASSES)
                        .map(|c| (0.5, (c + (t + round) as i64) % CLASSES))
                        .collect();
                    profile.observe_classification(&results);
                    profile.observe_class_embedding((t as i64 + round as i64) % CLASSES, &[0.1, 0.2]);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(profile.tracked_class_count(), CLASSES as usize);
    for class in 0..CLASSES {
        assert_eq!(
            profile.class_score_count(class),
            Some((THREADS * ROUNDS) as u64),
            "lost score updates for class {}",
            class
        );
    }
    let embedding_updates: u64 = (0..CLASSES)
        .filter_map(|c| profile.class_embedding_count(c))
        .sum();
    assert_eq!(embedding_updates, (THREADS * ROUNDS * 2) as u64);

    // 3 globals + one score file and one embedding file per class.
    let paths = profile.registered_paths();
    let unique: HashSet<_> = paths.iter().cloned().collect();
    assert_eq!(paths.len(), unique.len(), "duplicate registration");
    assert_eq!(paths.len(), 3 + 2 * CLASSES as usize);
}

#[test]
fn test_file_layout_follows_model_and_class() {
    let dir = tempfile::tempdir().unwrap();
    let profile = ModelProfile::new(&config(dir.path(), 60)).unwrap();
    let stats = dir.path().join("stats");

    profile.observe_classification(&[(0.9, 3)]);
    profile.observe_class_embedding(7, &[1.0, 2.0, 3.0]);

    let paths: HashSet<_> = profile.registered_paths().into_iter().collect();
    assert!(paths.contains(&stats.join("embeddings.bin")));
    assert!(paths.contains(&stats.join("resnet3.bin")));
    assert!(paths.contains(&stats.join("7_embedding.bin")));
    assert_eq!(profile.class_embedding_count(7), Some(3));
}

#[test]
fn test_global_embedding_takes_every_component() {
    let dir = tempfile::tempdir().unwrap();
    let profile = ModelProfile::new(&config(dir.path(), 60)).unwrap();

    profile.observe_embedding(&[0.1; 128]);
    profile.observe_embedding(&[0.2; 64]);

    assert_eq!(profile.embedding_count(), 192);
    // Global embeddings never create per-class state.
    assert_eq!(profile.tracked_class_count(), 0);
}

#[test]
fn test_num_tracked_classes_is_the_configured_bound() {
    let dir = tempfile::tempdir().unwrap();
    let profile = ModelProfile::new(&config(dir.path(), 60)).unwrap();
    assert_eq!(profile.num_tracked_classes(), 5);

    let results: Vec<(f32, i64)> = (0..12).map(|c| (0.3, c)).collect();
    profile.observe_classification(&results);

    assert_eq!(profile.num_tracked_classes(), 5);
    assert_eq!(profile.tracked_class_count(), 12);
}

#[test]
fn test_frequent_classes_capped_by_bound() {
    let dir = tempfile::tempdir().unwrap();
    let profile = ModelProfile::new(&config(dir.path(), 60)).unwrap();

    for class in 0..8i64 {
        for _ in 0..=class {
            profile.observe_classification(&[(0.5, class)]);
        }
    }

    let top = profile.frequent_classes();
    assert_eq!(top.len(), 5);
    assert_eq!(top[0], ("7".to_string(), 8));
    assert!(top.windows(2).all(|w| w[0].1 >= w[1].1));
}

#[test]
fn test_save_writes_exactly_registered_paths() {
    let dir = tempfile::tempdir().unwrap();
    let profile = ModelProfile::new(&config(dir.path(), 60)).unwrap();
    profile.observe_classification(&[(0.4, 1), (0.6, 2)]);
    profile.observe_class_embedding(1, &[0.5]);
    profile.observe_classification_with_latency(12.5, &[(0.7, 1)]);

    let report = profile.registry().save_now();

    let registered: HashSet<_> = profile.registered_paths().into_iter().collect();
    assert_eq!(report, SaveReport { written: registered.len(), failed: 0, skipped: 0 });
    assert_eq!(files_in(&dir.path().join("stats")), registered);
    for path in &registered {
        assert!(fs::metadata(path).unwrap().len() > 0, "{} is empty", path.display());
    }
}

#[test]
fn test_one_failing_write_does_not_stop_the_tick() {
    let dir = tempfile::tempdir().unwrap();
    let registry = SummaryRegistry::new("test", Duration::from_secs(60), telemetry::shared());

    let good_a = Arc::new(QuantileSummary::new());
    let bad = Arc::new(QuantileSummary::new());
    let good_b = Arc::new(QuantileSummary::new());
    good_a.update(1.0);
    good_b.update(2.0);

    registry.register(&good_a, dir.path().join("a.bin"));
    registry.register(&bad, dir.path().join("no-such-dir").join("bad.bin"));
    registry.register(&good_b, dir.path().join("b.bin"));

    let report = registry.save_now();

    assert_eq!(report.written, 2);
    assert_eq!(report.failed, 1);
    assert!(dir.path().join("a.bin").exists());
    assert!(dir.path().join("b.bin").exists());

    let snap = registry.telemetry().lock().snapshot();
    assert_eq!(snap.save.degraded_ticks, 1);
}

#[test]
fn test_dropped_summary_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let registry = SummaryRegistry::new("test", Duration::from_secs(60), telemetry::shared());

    let kept = Arc::new(QuantileSummary::new());
    registry.register(&kept, dir.path().join("kept.bin"));
    {
        let gone = Arc::new(QuantileSummary::new());
        registry.register(&gone, dir.path().join("gone.bin"));
    }

    let report = registry.save_now();
    assert_eq!(report, SaveReport { written: 1, failed: 0, skipped: 1 });
    assert!(!dir.path().join("gone.bin").exists());
}

#[tokio::test]
async fn test_save_loop_overwrites_each_tick() {
    let dir = tempfile::tempdir().unwrap();
    let profile = ModelProfile::new(&config(dir.path(), 1)).unwrap();
    let path = profile.score_path(1);

    profile.observe_classification(&[(0.1, 1)]);
    profile.start_saving().unwrap();

    tokio::time::sleep(Duration::from_millis(1400)).await;
    let first = fs::read(&path).expect("first tick should have written the file");
    let first_modified = fs::metadata(&path).unwrap().modified().unwrap();

    for i in 0..50 {
        profile.observe_classification(&[(i as f32 / 50.0, 1)]);
    }
    tokio::time::sleep(Duration::from_millis(1000)).await;
    let second = fs::read(&path).unwrap();
    let second_modified = fs::metadata(&path).unwrap().modified().unwrap();

    profile.stop_saving().await;

    assert_ne!(first, second, "second tick should replace the file content");
    assert!(second_modified >= first_modified);
    assert!(profile.registry().telemetry().lock().snapshot().save.ticks >= 2);
}

#[tokio::test]
async fn test_nothing_saved_after_stop() {
    let dir = tempfile::tempdir().unwrap();
    let profile = ModelProfile::new(&config(dir.path(), 1)).unwrap();
    profile.observe_classification(&[(0.5, 9)]);

    profile.start_saving().unwrap();
    assert!(profile.registry().is_running());
    tokio::time::sleep(Duration::from_millis(1200)).await;

    profile.stop_saving().await;
    assert!(!profile.registry().is_running());

    let telemetry = profile.registry().telemetry();
    let ticks_at_stop = telemetry.lock().snapshot().save.ticks;
    // The final flush in stop() counts as a tick.
    assert!(ticks_at_stop >= 2);

    tokio::time::sleep(Duration::from_millis(2200)).await;
    assert_eq!(telemetry.lock().snapshot().save.ticks, ticks_at_stop);
}

#[test]
fn test_start_without_runtime_fails() {
    let dir = tempfile::tempdir().unwrap();
    let profile = ModelProfile::new(&config(dir.path(), 1)).unwrap();
    assert!(profile.start_saving().is_err());
}
