use anyhow::{anyhow, Result};
use std::sync::RwLock;

use super::{ArchiveLayout, PARTITION_COUNT};
use crate::storage::ArchiveStore;

/// Session-wide cache of the device's live sub-partition.
///
/// Existence checks run without holding the lock, so concurrent first
/// lookups may both scan; they reach the same answer and the first write wins.
#[derive(Debug, Default)]
pub struct PartitionCache {
    found: RwLock<Option<u8>>,
}

impl PartitionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cached(&self) -> Option<u8> {
        match self.found.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Cached partition, or the first of `00..03` that exists in `store`.
    /// `Ok(None)` means the device has no archive; nothing is cached then.
    pub fn discover(&self, store: &dyn ArchiveStore, layout: &ArchiveLayout) -> Result<Option<u8>> {
        if let Some(partition) = self.cached() {
            return Ok(Some(partition));
        }

        for partition in 0..PARTITION_COUNT {
            let key = layout.partition_key(partition);
            if store.exists(&key)? {
                let mut slot = self
                    .found
                    .write()
                    .map_err(|_| anyhow!("partition cache lock poisoned"))?;
                let adopted = *slot.get_or_insert(partition);
                log::info!(
                    "archive partition for {}: {:02}",
                    layout.device_id(),
                    adopted
                );
                return Ok(Some(adopted));
            }
            log::debug!("archive partition {} absent", key);
        }

        log::warn!(
            "no archive partition found for device {}",
            layout.device_id()
        );
        Ok(None)
    }

    /// Forgets the cached partition; the next `discover` scans again.
    pub fn invalidate(&self) {
        match self.found.write() {
            Ok(mut guard) => *guard = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }
}
