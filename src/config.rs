use anyhow::{anyhow, Result};
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::storage::{ArchiveStore, FilesystemArchiveStore, InMemoryArchiveStore, SqliteArchiveStore};

const DEFAULT_DEVICE_ID: &str = "iot-unifiededge-001";
const DEFAULT_ARCHIVE_ROOT: &str = "detectoroutput";
const DEFAULT_ARCHIVE_DB_PATH: &str = "archive.db";
const DEFAULT_SOURCE: &str = "stub://";
const DEFAULT_RING_CAPACITY: usize = crate::realtime::DEFAULT_RING_CAPACITY;
const DEFAULT_TICK_MS: u64 = 1000;
const DEFAULT_REPORT_SECS: u64 = 5;
const DEFAULT_WINDOW_MINUTES: u32 = 15;
const DEFAULT_MAX_RANGE_MINUTES: u32 = crate::historical::DEFAULT_MAX_RANGE_MINUTES;
const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

const DEVICE_ID_PATTERN: &str = r"^[A-Za-z0-9][A-Za-z0-9_.-]{0,127}$";

#[derive(Debug, Deserialize, Default)]
struct MetricsdConfigFile {
    device_id: Option<String>,
    zones_path: Option<PathBuf>,
    source: Option<String>,
    archive: Option<ArchiveConfigFile>,
    realtime: Option<RealtimeConfigFile>,
    history: Option<HistoryConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ArchiveConfigFile {
    backend: Option<String>,
    root: Option<PathBuf>,
    db_path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RealtimeConfigFile {
    ring_capacity: Option<usize>,
    tick_ms: Option<u64>,
    report_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct HistoryConfigFile {
    default_window_minutes: Option<u32>,
    max_range_minutes: Option<u32>,
    query_timeout_secs: Option<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArchiveBackend {
    Filesystem,
    Sqlite,
    Memory,
}

impl FromStr for ArchiveBackend {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "filesystem" | "fs" => Ok(Self::Filesystem),
            "sqlite" => Ok(Self::Sqlite),
            "memory" => Ok(Self::Memory),
            other => Err(anyhow!(
                "unknown archive backend {:?} (expected filesystem, sqlite or memory)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsdConfig {
    pub device_id: String,
    pub zones_path: Option<PathBuf>,
    /// `stub://<name>`, a message file path, or `-` for stdin.
    pub source: String,
    pub archive: ArchiveSettings,
    pub realtime: RealtimeSettings,
    pub history: HistorySettings,
}

#[derive(Debug, Clone)]
pub struct ArchiveSettings {
    pub backend: ArchiveBackend,
    pub root: PathBuf,
    pub db_path: String,
}

#[derive(Debug, Clone)]
pub struct RealtimeSettings {
    pub ring_capacity: usize,
    pub tick: Duration,
    /// How often the daemon logs live metrics.
    pub report_every: Duration,
}

#[derive(Debug, Clone)]
pub struct HistorySettings {
    pub default_window_minutes: u32,
    pub max_range_minutes: u32,
    pub query_timeout: Duration,
}

impl ArchiveSettings {
    pub fn open_store(&self) -> Result<Arc<dyn ArchiveStore>> {
        Ok(match self.backend {
            ArchiveBackend::Filesystem => Arc::new(FilesystemArchiveStore::new(&self.root)),
            ArchiveBackend::Sqlite => Arc::new(SqliteArchiveStore::open(&self.db_path)?),
            ArchiveBackend::Memory => Arc::new(InMemoryArchiveStore::new()),
        })
    }
}

impl MetricsdConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("ZONE_METRICS_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: MetricsdConfigFile) -> Result<Self> {
        let archive_file = file.archive.unwrap_or_default();
        let realtime_file = file.realtime.unwrap_or_default();
        let history_file = file.history.unwrap_or_default();

        let archive = ArchiveSettings {
            backend: match archive_file.backend.as_deref() {
                Some(raw) => raw.parse()?,
                None => ArchiveBackend::Filesystem,
            },
            root: archive_file
                .root
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ARCHIVE_ROOT)),
            db_path: archive_file
                .db_path
                .unwrap_or_else(|| DEFAULT_ARCHIVE_DB_PATH.to_string()),
        };
        let realtime = RealtimeSettings {
            ring_capacity: realtime_file.ring_capacity.unwrap_or(DEFAULT_RING_CAPACITY),
            tick: Duration::from_millis(realtime_file.tick_ms.unwrap_or(DEFAULT_TICK_MS)),
            report_every: Duration::from_secs(
                realtime_file.report_secs.unwrap_or(DEFAULT_REPORT_SECS),
            ),
        };
        let history = HistorySettings {
            default_window_minutes: history_file
                .default_window_minutes
                .unwrap_or(DEFAULT_WINDOW_MINUTES),
            max_range_minutes: history_file
                .max_range_minutes
                .unwrap_or(DEFAULT_MAX_RANGE_MINUTES),
            query_timeout: Duration::from_secs(
                history_file
                    .query_timeout_secs
                    .unwrap_or(DEFAULT_QUERY_TIMEOUT_SECS),
            ),
        };
        Ok(Self {
            device_id: file
                .device_id
                .unwrap_or_else(|| DEFAULT_DEVICE_ID.to_string()),
            zones_path: file.zones_path,
            source: file.source.unwrap_or_else(|| DEFAULT_SOURCE.to_string()),
            archive,
            realtime,
            history,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(device_id) = non_empty_env("ZONE_METRICS_DEVICE_ID") {
            self.device_id = device_id;
        }
        if let Some(path) = non_empty_env("ZONE_METRICS_ZONES_PATH") {
            self.zones_path = Some(PathBuf::from(path));
        }
        if let Some(backend) = non_empty_env("ZONE_METRICS_ARCHIVE_BACKEND") {
            self.archive.backend = backend.parse()?;
        }
        if let Some(root) = non_empty_env("ZONE_METRICS_ARCHIVE_ROOT") {
            self.archive.root = PathBuf::from(root);
        }
        if let Some(source) = non_empty_env("ZONE_METRICS_SOURCE") {
            self.source = source;
        }
        if let Some(timeout) = non_empty_env("ZONE_METRICS_QUERY_TIMEOUT_SECS") {
            let seconds: u64 = timeout.trim().parse().map_err(|_| {
                anyhow!("ZONE_METRICS_QUERY_TIMEOUT_SECS must be an integer number of seconds")
            })?;
            self.history.query_timeout = Duration::from_secs(seconds);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        validate_device_id(&self.device_id)?;
        if self.realtime.ring_capacity == 0 {
            return Err(anyhow!("realtime.ring_capacity must be greater than zero"));
        }
        if self.realtime.tick.is_zero() {
            return Err(anyhow!("realtime.tick_ms must be greater than zero"));
        }
        if self.realtime.report_every.is_zero() {
            return Err(anyhow!("realtime.report_secs must be greater than zero"));
        }
        if self.history.max_range_minutes == 0 {
            return Err(anyhow!("history.max_range_minutes must be greater than zero"));
        }
        if self.history.default_window_minutes > self.history.max_range_minutes {
            return Err(anyhow!(
                "history.default_window_minutes exceeds history.max_range_minutes"
            ));
        }
        Ok(())
    }
}

/// Device ids become the first archive key segment, so they are restricted
/// to a single path-safe token.
pub fn validate_device_id(device_id: &str) -> Result<()> {
    let re = Regex::new(DEVICE_ID_PATTERN)?;
    if !re.is_match(device_id) {
        return Err(anyhow!(
            "device_id {:?} must match {}",
            device_id,
            DEVICE_ID_PATTERN
        ));
    }
    Ok(())
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<MetricsdConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path.extension().and_then(|ext| ext.to_str()) == Some("toml");
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
