use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    error::{KrxError, KrxResult},
    store::PartitionedTable,
};

/// Static configuration for a store instance. Validated eagerly so a
/// malformed config never produces a partially-usable `Orchestrator` or
/// `DataLoader` (spec: configuration errors surface at initialization).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub store_root: PathBuf,
    pub ephemeral_root: PathBuf,
    pub row_group_size: usize,
    pub compression_level: i32,
    pub skip_if_present: bool,
    #[serde(with = "duration_secs")]
    pub lock_stale_after: Duration,
}

impl Config {
    pub fn new(store_root: impl Into<PathBuf>, ephemeral_root: impl Into<PathBuf>) -> KrxResult<Self> {
        let cfg = Self {
            store_root: store_root.into(),
            ephemeral_root: ephemeral_root.into(),
            row_group_size: 1000,
            compression_level: 3,
            skip_if_present: true,
            lock_stale_after: Duration::from_secs(6 * 3600),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json(path: &std::path::Path) -> KrxResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let cfg: Self = serde_json::from_str(&text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> KrxResult<()> {
        if self.store_root.as_os_str().is_empty() {
            return Err(KrxError::Config("store_root must not be empty".into()));
        }
        if self.ephemeral_root.as_os_str().is_empty() {
            return Err(KrxError::Config("ephemeral_root must not be empty".into()));
        }
        if self.row_group_size == 0 {
            return Err(KrxError::Config("row_group_size must be > 0".into()));
        }
        if self.compression_level < 0 {
            return Err(KrxError::Config("compression_level must be >= 0".into()));
        }
        Ok(())
    }

    pub fn universe_root(&self) -> PathBuf {
        self.store_root.join("universes")
    }

    pub fn cumulative_root(&self) -> PathBuf {
        self.ephemeral_root.join("cumulative_adjustments")
    }

    /// Staging subtree for one table. Each of the three `PartitionedTable`s
    /// (snapshot, universe, cumulative) gets its own subtree, keyed by
    /// `table` — otherwise `reconcile()` for one table would sweep debris
    /// left behind by another table's crashed rewrite (spec §4.2).
    pub fn staging_root(&self, table: &str) -> PathBuf {
        self.ephemeral_root.join("staging").join(table)
    }

    /// Backup subtree for one table. See [`Config::staging_root`].
    pub fn backup_root(&self, table: &str) -> PathBuf {
        self.ephemeral_root.join("backup").join(table)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.store_root.join(".lock")
    }

    /// The snapshot/enrichment `PartitionedTable` for this config. Centralized
    /// here so every caller (the orchestrator's write path, the composer's
    /// read path) constructs it identically.
    pub fn snapshot_table(&self) -> PartitionedTable {
        PartitionedTable::new(self.store_root.clone(), self.staging_root("snapshot"), self.backup_root("snapshot"))
    }

    pub fn universe_table(&self) -> PartitionedTable {
        PartitionedTable::new(self.universe_root(), self.staging_root("universe"), self.backup_root("universe"))
    }

    pub fn cumulative_table(&self) -> PartitionedTable {
        PartitionedTable::new(self.cumulative_root(), self.staging_root("cumulative"), self.backup_root("cumulative"))
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
