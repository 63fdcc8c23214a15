use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use polars::prelude::*;

use crate::error::{KrxError, KrxResult};

const FILE_NAME: &str = "part.parquet";

/// Formats the fixed textual partition key `TRD_DD=YYYYMMDD`.
pub fn partition_key(date: NaiveDate) -> String {
    format!("TRD_DD={}", date.format("%Y%m%d"))
}

/// Parses a partition directory name back into a date. Returns `None` for
/// any name that doesn't match the expected key shape (so unrelated
/// directories under a root are ignored rather than erroring).
pub fn parse_partition_key(name: &str) -> Option<NaiveDate> {
    let digits = name.strip_prefix("TRD_DD=")?;
    NaiveDate::parse_from_str(digits, "%Y%m%d").ok()
}

pub fn partition_dir(root: &Path, date: NaiveDate) -> PathBuf {
    root.join(partition_key(date))
}

pub fn partition_file(root: &Path, date: NaiveDate) -> PathBuf {
    partition_dir(root, date).join(FILE_NAME)
}

/// Atomically publishes `df` as the partition for `date` under `root`,
/// following the four-step protocol of spec §4.2:
///
/// 1. stage the new partition under `staging_root`,
/// 2. if a prior version exists at the final path, move it aside to
///    `backup_root`,
/// 3. rename the staged partition into place (single directory rename),
/// 4. best-effort delete the backup.
///
/// Crash recovery for every window between these steps is handled by
/// [`reconcile`], which must run once at orchestrator startup before any
/// new writes are attempted.
pub fn write_partition_atomic(
    root: &Path,
    staging_root: &Path,
    backup_root: &Path,
    date: NaiveDate,
    df: &mut DataFrame,
    row_group_size: usize,
    compression_level: i32,
) -> KrxResult<()> {
    let key = partition_key(date);
    let staged_dir = staging_root.join(&key);
    let final_dir = root.join(&key);
    let backup_dir = backup_root.join(&key);

    if staged_dir.exists() {
        std::fs::remove_dir_all(&staged_dir)?;
    }
    std::fs::create_dir_all(&staged_dir)?;
    let staged_file = staged_dir.join(FILE_NAME);
    write_parquet(&staged_file, df, row_group_size, compression_level)?;

    // Step 2: move prior version aside, if any.
    if final_dir.exists() {
        if backup_dir.exists() {
            std::fs::remove_dir_all(&backup_dir)?;
        }
        if let Some(parent) = backup_dir.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::rename(&final_dir, &backup_dir)
            .map_err(|e| KrxError::store(&final_dir, "backup", e.to_string()))?;
    }

    // Step 3: publish.
    if let Some(parent) = final_dir.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::rename(&staged_dir, &final_dir)
        .map_err(|e| KrxError::store(&staged_dir, "publish", e.to_string()))?;

    // Step 4: best-effort cleanup; leftover backups are swept by `reconcile`.
    let _ = std::fs::remove_dir_all(&backup_dir);

    Ok(())
}

fn write_parquet(
    path: &Path,
    df: &mut DataFrame,
    row_group_size: usize,
    compression_level: i32,
) -> KrxResult<()> {
    let file = std::fs::File::create(path)?;
    ParquetWriter::new(file)
        .with_row_group_size(Some(row_group_size))
        .with_compression(ParquetCompression::Zstd(Some(
            ZstdLevel::try_new(compression_level)
                .map_err(|e| KrxError::store(path, "compress", e.to_string()))?,
        )))
        .finish(df)?;
    Ok(())
}

/// Startup reconciliation: sweeps `staging_root` and `backup_root` relative
/// to `root`, restoring or discarding debris per spec §4.2's crash table.
///
/// - Staging debris with no corresponding published partition: discarded
///   (crash between steps 1 and 3, nothing was ever observable).
/// - Backup with no published partition: the backup is moved back into
///   place (crash between steps 2 and 3).
/// - Backup alongside a published partition: the backup is deleted (crash
///   between steps 3 and 4).
pub fn reconcile(root: &Path, staging_root: &Path, backup_root: &Path) -> KrxResult<()> {
    if staging_root.exists() {
        std::fs::remove_dir_all(staging_root)?;
    }
    std::fs::create_dir_all(staging_root)?;

    if !backup_root.exists() {
        return Ok(());
    }

    for entry in std::fs::read_dir(backup_root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let key = entry.file_name();
        let final_dir = root.join(&key);
        let backup_dir = entry.path();

        if final_dir.exists() {
            std::fs::remove_dir_all(&backup_dir)?;
        } else {
            if let Some(parent) = final_dir.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::rename(&backup_dir, &final_dir)
                .map_err(|e| KrxError::store(&backup_dir, "reconcile", e.to_string()))?;
        }
    }

    Ok(())
}

/// Lists published partition dates under `root`, ascending, ignoring
/// non-partition entries.
pub fn list_partitions(root: &Path) -> KrxResult<Vec<NaiveDate>> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    let mut dates = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if let Some(date) = entry
            .file_name()
            .to_str()
            .and_then(parse_partition_key)
        {
            dates.push(date);
        }
    }
    dates.sort();
    Ok(dates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, d).unwrap()
    }

    fn sample_df() -> DataFrame {
        df! {
            "security_id" => ["005930"],
            "close_price" => [73_100i64],
        }
        .unwrap()
    }

    #[test]
    fn partition_key_round_trips() {
        let d = date(15);
        let key = partition_key(d);
        assert_eq!(key, "TRD_DD=20260115");
        assert_eq!(parse_partition_key(&key), Some(d));
    }

    #[test]
    fn write_and_list_roundtrip() {
        let base = crate::test_support::temp_dir("partition_write_list");
        let root = base.join("store");
        let staging = base.join("staging");
        let backup = base.join("backup");

        let mut df = sample_df();
        write_partition_atomic(&root, &staging, &backup, date(1), &mut df, 1000, 3).unwrap();
        write_partition_atomic(&root, &staging, &backup, date(3), &mut df, 1000, 3).unwrap();

        let partitions = list_partitions(&root).unwrap();
        assert_eq!(partitions, vec![date(1), date(3)]);
        assert!(partition_file(&root, date(1)).exists());
        assert!(!backup.join(partition_key(date(1))).exists());

        std::fs::remove_dir_all(&base).ok();
    }

    #[test]
    fn rewrite_replaces_partition_and_cleans_backup() {
        let base = crate::test_support::temp_dir("partition_rewrite");
        let root = base.join("store");
        let staging = base.join("staging");
        let backup = base.join("backup");

        let mut df = sample_df();
        write_partition_atomic(&root, &staging, &backup, date(5), &mut df, 1000, 3).unwrap();

        let mut df2 = df! {
            "security_id" => ["005930"],
            "close_price" => [74_000i64],
        }
        .unwrap();
        write_partition_atomic(&root, &staging, &backup, date(5), &mut df2, 1000, 3).unwrap();

        let read_back = ParquetReader::new(std::fs::File::open(partition_file(&root, date(5))).unwrap())
            .finish()
            .unwrap();
        let close: i64 = read_back
            .column("close_price")
            .unwrap()
            .i64()
            .unwrap()
            .get(0)
            .unwrap();
        assert_eq!(close, 74_000);
        assert!(!backup.join(partition_key(date(5))).exists());

        std::fs::remove_dir_all(&base).ok();
    }

    #[test]
    fn reconcile_restores_orphaned_backup() {
        let base = crate::test_support::temp_dir("partition_reconcile_restore");
        let root = base.join("store");
        let staging = base.join("staging");
        let backup = base.join("backup");

        // Simulate a crash between steps 2 and 3: backup exists, final is missing.
        let key = partition_key(date(7));
        std::fs::create_dir_all(backup.join(&key)).unwrap();
        std::fs::write(backup.join(&key).join(FILE_NAME), b"stub").unwrap();

        reconcile(&root, &staging, &backup).unwrap();

        assert!(root.join(&key).exists());
        assert!(!backup.join(&key).exists());

        std::fs::remove_dir_all(&base).ok();
    }

    #[test]
    fn reconcile_deletes_leftover_backup_when_final_exists() {
        let base = crate::test_support::temp_dir("partition_reconcile_cleanup");
        let root = base.join("store");
        let staging = base.join("staging");
        let backup = base.join("backup");

        let mut df = sample_df();
        write_partition_atomic(&root, &staging, &backup, date(9), &mut df, 1000, 3).unwrap();

        // Simulate a crash between steps 3 and 4: stray backup alongside the
        // already-published final partition.
        let key = partition_key(date(9));
        std::fs::create_dir_all(backup.join(&key)).unwrap();
        std::fs::write(backup.join(&key).join(FILE_NAME), b"stub").unwrap();

        reconcile(&root, &staging, &backup).unwrap();

        assert!(root.join(&key).exists());
        assert!(!backup.join(&key).exists());

        std::fs::remove_dir_all(&base).ok();
    }
}
