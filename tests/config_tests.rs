use infstat::config::{load_config, parse_config, validate_config, ConfigError};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

const MINIMAL: &str = r#"
[profile]
model_id = "resnet50"

[upload]
endpoint_url = "https://collector.example.com/upload"
auth_token = "abc"
sensor_id = "edge-01"
"#;

#[test]
fn test_defaults_fill_optional_fields() {
    let config = parse_config(MINIMAL).unwrap();

    assert_eq!(config.profile.model_id, "resnet50");
    assert_eq!(config.profile.stat_root, PathBuf::from("./stats"));
    assert_eq!(config.profile.save_interval(), Duration::from_secs(60));
    assert_eq!(config.profile.top_classes, 10);

    assert_eq!(config.upload.interval(), Duration::from_secs(300));
    assert_eq!(config.upload.file_type, "statistics");
    assert!(!config.upload.delete_after_archive);
    assert_eq!(config.upload.request_timeout(), Duration::from_secs(30));
    validate_config(&config).unwrap();
}

#[test]
fn test_full_file_round_trips_through_loader() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("infstat.toml");
    fs::write(
        &path,
        r#"
[profile]
model_id = "yolo"
stat_root = "/var/lib/infstat/stats"
data_root = "/var/lib/infstat/data"
save_interval_secs = 5
top_classes = 3

[upload]
endpoint_url = "http://10.0.0.2:8080/ingest"
auth_token = "t0k"
sensor_id = "edge-42"
source_folder = "/var/lib/infstat/stats"
interval_secs = 120
file_type = "tdigest"
delete_after_archive = true
staging_dir = "/var/tmp/infstat"
request_timeout_secs = 10
"#,
    )
    .unwrap();

    let config = load_config(Some(&path)).unwrap();

    assert_eq!(config.profile.model_id, "yolo");
    assert_eq!(config.profile.top_classes, 3);
    assert_eq!(config.upload.interval_secs, 120);
    assert_eq!(config.upload.file_type, "tdigest");
    assert_eq!(config.upload.staging_dir, PathBuf::from("/var/tmp/infstat"));
}

#[test]
fn test_missing_required_field_is_a_parse_error() {
    let err = parse_config("[profile]\nmodel_id = \"m\"\n").unwrap_err();
    assert!(matches!(err, ConfigError::ParseError(_)));
}

#[test]
fn test_zero_intervals_rejected() {
    let mut config = parse_config(MINIMAL).unwrap();
    config.upload.interval_secs = 0;
    assert!(matches!(validate_config(&config), Err(ConfigError::InvalidValue(_))));

    let mut config = parse_config(MINIMAL).unwrap();
    config.profile.save_interval_secs = 0;
    assert!(matches!(validate_config(&config), Err(ConfigError::InvalidValue(_))));
}

#[test]
fn test_endpoint_must_be_http() {
    let mut config = parse_config(MINIMAL).unwrap();
    config.upload.endpoint_url = "ftp://collector".to_string();
    assert!(matches!(validate_config(&config), Err(ConfigError::InvalidValue(_))));

    config.upload.endpoint_url = "  ".to_string();
    assert!(matches!(validate_config(&config), Err(ConfigError::MissingRequired(_))));
}

#[test]
fn test_staging_inside_source_rejected() {
    let mut config = parse_config(MINIMAL).unwrap();
    config.upload.source_folder = PathBuf::from("/data/out");
    config.upload.staging_dir = PathBuf::from("/data/out/tmp");
    assert!(matches!(validate_config(&config), Err(ConfigError::InvalidValue(_))));
}

#[test]
fn test_missing_file_reports_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_config(Some(&dir.path().join("nope.toml"))).unwrap_err();
    assert!(matches!(err, ConfigError::IoError(_)));
}

#[test]
fn test_model_id_with_path_separator_rejected() {
    for bad in ["../../etc/cron.d/x", "models/resnet", "..", "a\\b"] {
        let mut config = parse_config(MINIMAL).unwrap();
        config.profile.model_id = bad.to_string();
        assert!(
            matches!(validate_config(&config), Err(ConfigError::InvalidValue(_))),
            "{} accepted",
            bad
        );
    }
}
