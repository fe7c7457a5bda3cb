//! Zone configuration and its shared, atomically swapped snapshot.
//!
//! The spatial configuration ("aggregator config") is an immutable value.
//! Editors build a new value and publish it through [`ZoneModel::replace`]
//! (or [`ZoneModel::update`] for copy-on-write edits). Readers take an
//! `Arc` snapshot, so a frame is always resolved against one complete
//! configuration even while an edit is being published.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::ops::Deref;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::geometry::Point;

const DEFAULT_ZONE_NAME: &str = "queue";
const DEFAULT_THRESHOLD: f64 = 10.0;

/// A named polygon (3+ points) or threshold line (exactly 2 points).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    /// Display label only; collision never looks at it.
    pub name: String,
    #[serde(default)]
    pub polygon: Vec<Point>,
    /// Reserved for count alarms; not used by collision.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

impl Zone {
    pub fn new(name: &str, polygon: Vec<Point>, threshold: f64) -> Self {
        Self {
            name: name.to_string(),
            polygon,
            threshold,
        }
    }

    pub fn is_line(&self) -> bool {
        self.polygon.len() == 2
    }

    pub fn is_area(&self) -> bool {
        self.polygon.len() >= 3
    }
}

/// Open polyline drawn for reference. Never used for collision.
pub type Polyline = Vec<Point>;

/// The whole spatial configuration. Replaced wholesale, never merged.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatorConfig {
    #[serde(default)]
    pub lines: Vec<Polyline>,
    #[serde(default)]
    pub zones: Vec<Zone>,
}

impl AggregatorConfig {
    /// Starting configuration: a single empty `queue` zone.
    pub fn with_default_zone() -> Self {
        Self {
            lines: Vec::new(),
            zones: vec![Zone::new(DEFAULT_ZONE_NAME, Vec::new(), DEFAULT_THRESHOLD)],
        }
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| anyhow!("invalid zone configuration: {}", e))
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| anyhow!("failed to read zones file {}: {}", path.display(), e))?;
        Self::from_json(&raw).map_err(|e| anyhow!("{}: {}", path.display(), e))
    }

    /// Writes through a temporary file and renames it into place.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = self.to_json_pretty()?;
        let tmp_path = path.with_extension("tmp");
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Comma-joined zone names, as shown next to zone metrics.
    pub fn zone_names(&self) -> String {
        self.zones
            .iter()
            .map(|zone| zone.name.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Read-only view over the zones of one published configuration.
#[derive(Clone, Debug)]
pub struct ZoneSet(Arc<AggregatorConfig>);

impl ZoneSet {
    pub fn config(&self) -> &AggregatorConfig {
        &self.0
    }
}

impl Deref for ZoneSet {
    type Target = [Zone];

    fn deref(&self) -> &[Zone] {
        &self.0.zones
    }
}

/// Shared holder of the current configuration.
pub struct ZoneModel {
    current: RwLock<Arc<AggregatorConfig>>,
    version: AtomicU64,
}

impl ZoneModel {
    pub fn new(config: AggregatorConfig) -> Self {
        Self {
            current: RwLock::new(Arc::new(config)),
            version: AtomicU64::new(0),
        }
    }

    /// Current configuration. Cheap: clones an `Arc`.
    pub fn snapshot(&self) -> Arc<AggregatorConfig> {
        // The lock only guards an Arc swap, so a poisoned guard still holds a complete value.
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Zones of the current configuration, in display order.
    pub fn zones(&self) -> ZoneSet {
        ZoneSet(self.snapshot())
    }

    /// Publishes a new configuration in one swap.
    pub fn replace(&self, config: AggregatorConfig) {
        let next = Arc::new(config);
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = next;
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        log::debug!("zone configuration replaced (version {})", version);
    }

    /// Copy-on-write edit. Concurrent `update` calls are serialised, so no
    /// edit is lost; readers see either the old or the new value.
    pub fn update<F>(&self, edit: F)
    where
        F: FnOnce(&mut AggregatorConfig),
    {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        let mut next = AggregatorConfig::clone(&guard);
        edit(&mut next);
        *guard = Arc::new(next);
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        log::debug!("zone configuration edited (version {})", version);
    }

    /// Number of configurations published since construction.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }
}

impl Default for ZoneModel {
    fn default() -> Self {
        Self::new(AggregatorConfig::with_default_zone())
    }
}
