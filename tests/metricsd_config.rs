use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use zone_metrics::config::{ArchiveBackend, MetricsdConfig};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "ZONE_METRICS_CONFIG",
        "ZONE_METRICS_DEVICE_ID",
        "ZONE_METRICS_ZONES_PATH",
        "ZONE_METRICS_ARCHIVE_BACKEND",
        "ZONE_METRICS_ARCHIVE_ROOT",
        "ZONE_METRICS_QUERY_TIMEOUT_SECS",
        "ZONE_METRICS_SOURCE",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "device_id": "lobby-cam-2",
        "zones_path": "zones.json",
        "source": "stub://lobby",
        "archive": {
            "backend": "sqlite",
            "root": "/var/lib/detections",
            "db_path": "lobby.db"
        },
        "realtime": {
            "ring_capacity": 30,
            "tick_ms": 500,
            "report_secs": 10
        },
        "history": {
            "default_window_minutes": 60,
            "max_range_minutes": 720,
            "query_timeout_secs": 5
        }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("ZONE_METRICS_CONFIG", file.path());
    std::env::set_var("ZONE_METRICS_DEVICE_ID", "lobby-cam-3");
    std::env::set_var("ZONE_METRICS_QUERY_TIMEOUT_SECS", "90");

    let cfg = MetricsdConfig::load().expect("load config");

    assert_eq!(cfg.device_id, "lobby-cam-3");
    assert_eq!(cfg.zones_path, Some(PathBuf::from("zones.json")));
    assert_eq!(cfg.source, "stub://lobby");
    assert_eq!(cfg.archive.backend, ArchiveBackend::Sqlite);
    assert_eq!(cfg.archive.root, PathBuf::from("/var/lib/detections"));
    assert_eq!(cfg.archive.db_path, "lobby.db");
    assert_eq!(cfg.realtime.ring_capacity, 30);
    assert_eq!(cfg.realtime.tick, Duration::from_millis(500));
    assert_eq!(cfg.realtime.report_every, Duration::from_secs(10));
    assert_eq!(cfg.history.default_window_minutes, 60);
    assert_eq!(cfg.history.max_range_minutes, 720);
    assert_eq!(cfg.history.query_timeout, Duration::from_secs(90));

    clear_env();
}

#[test]
fn loads_toml_config() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let raw = r#"
device_id = "dock-1"

[archive]
backend = "memory"

[realtime]
ring_capacity = 5
"#;
    std::io::Write::write_all(&mut file, raw.as_bytes()).expect("write config");
    std::env::set_var("ZONE_METRICS_CONFIG", file.path());

    let cfg = MetricsdConfig::load().expect("load config");
    assert_eq!(cfg.device_id, "dock-1");
    assert_eq!(cfg.archive.backend, ArchiveBackend::Memory);
    assert_eq!(cfg.realtime.ring_capacity, 5);
    assert_eq!(cfg.realtime.tick, Duration::from_secs(1));

    clear_env();
}

#[test]
fn env_only_defaults() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("ZONE_METRICS_ARCHIVE_BACKEND", "filesystem");
    std::env::set_var("ZONE_METRICS_ARCHIVE_ROOT", "/data/detectoroutput");
    std::env::set_var("ZONE_METRICS_SOURCE", "-");

    let cfg = MetricsdConfig::load().expect("load config");
    assert_eq!(cfg.device_id, "iot-unifiededge-001");
    assert_eq!(cfg.archive.root, PathBuf::from("/data/detectoroutput"));
    assert_eq!(cfg.source, "-");
    assert!(cfg.zones_path.is_none());

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("ZONE_METRICS_DEVICE_ID", "dev/00");
    assert!(MetricsdConfig::load().is_err());
    clear_env();

    std::env::set_var("ZONE_METRICS_QUERY_TIMEOUT_SECS", "soon");
    assert!(MetricsdConfig::load().is_err());
    clear_env();

    std::env::set_var("ZONE_METRICS_ARCHIVE_BACKEND", "s3");
    assert!(MetricsdConfig::load().is_err());
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, br#"{"realtime": {"ring_capacity": 0}}"#)
        .expect("write config");
    std::env::set_var("ZONE_METRICS_CONFIG", file.path());
    assert!(MetricsdConfig::load().is_err());

    clear_env();
}
