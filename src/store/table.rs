use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use polars::prelude::*;

use crate::{
    error::{KrxError, KrxResult},
    io::partition::{self, partition_file},
};

/// A Hive-style, single-level, date-partitioned columnar table. Used for the
/// snapshot/enrichment table, the universe table, and the ephemeral
/// cumulative-multiplier cache — all three share this layout (spec §4.2).
pub struct PartitionedTable {
    root: PathBuf,
    staging_root: PathBuf,
    backup_root: PathBuf,
}

impl PartitionedTable {
    pub fn new(root: impl Into<PathBuf>, staging_root: impl Into<PathBuf>, backup_root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            staging_root: staging_root.into(),
            backup_root: backup_root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Runs startup reconciliation for this table's staging/backup trees.
    pub fn reconcile(&self) -> KrxResult<()> {
        partition::reconcile(&self.root, &self.staging_root, &self.backup_root)
    }

    pub fn has_partition(&self, date: NaiveDate) -> bool {
        partition_file(&self.root, date).exists()
    }

    pub fn list_partitions(&self) -> KrxResult<Vec<NaiveDate>> {
        partition::list_partitions(&self.root)
    }

    /// Sorts `df` by `sort_col` ascending (enforcing the row-group pruning
    /// precondition of spec §4.2) and publishes it atomically as the
    /// partition for `date`.
    pub fn write_partition(
        &self,
        date: NaiveDate,
        df: DataFrame,
        sort_col: &str,
        row_group_size: usize,
        compression_level: i32,
    ) -> KrxResult<()> {
        let mut sorted = df
            .lazy()
            .sort([sort_col], SortMultipleOptions::default())
            .collect()?;
        partition::write_partition_atomic(
            &self.root,
            &self.staging_root,
            &self.backup_root,
            date,
            &mut sorted,
            row_group_size,
            compression_level,
        )
    }

    pub fn read_partition(&self, date: NaiveDate) -> KrxResult<DataFrame> {
        let path = partition_file(&self.root, date);
        let file = std::fs::File::open(&path)
            .map_err(|e| KrxError::store(&path, "read", e.to_string()))?;
        ParquetReader::new(file)
            .finish()
            .map_err(|e| KrxError::corruption(&path, e.to_string()))
    }

    /// Partition- and column-pruned range scan. Missing partitions (e.g.
    /// holidays) are silently omitted. Rows come back ordered (date
    /// ascending, `sort_col` ascending within date) because each partition
    /// is written pre-sorted and partitions are concatenated in date order.
    /// The partition key is materialized as a `trading_date` column.
    ///
    /// Row-group pruning on `symbol_filter` happens for free: polars' lazy
    /// Parquet scanner consults per-row-group min/max statistics on the sort
    /// column and skips row groups outside the predicate's range.
    pub fn scan(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        symbol_col: &str,
        symbol_filter: Option<&[String]>,
        columns: Option<&[String]>,
    ) -> KrxResult<DataFrame> {
        let dates = self
            .list_partitions()?
            .into_iter()
            .filter(|d| *d >= start && *d <= end)
            .collect::<Vec<_>>();

        let mut frames = Vec::with_capacity(dates.len());
        for date in dates {
            let path = partition_file(&self.root, date);
            let mut lf = LazyFrame::scan_parquet(
                PlPath::new(path.to_string_lossy().as_ref()),
                ScanArgsParquet::default(),
            )
            .map_err(|e| KrxError::corruption(&path, e.to_string()))?;

            if let Some(symbols) = symbol_filter {
                let values: Vec<AnyValue> =
                    symbols.iter().map(|s| AnyValue::StringOwned(s.into())).collect();
                lf = lf.filter(col(symbol_col).is_in(lit(Series::from_any_values(
                    "symbols".into(),
                    &values,
                    false,
                )?), false));
            }
            if let Some(cols) = columns {
                let selected: Vec<Expr> = cols.iter().map(|c| col(c.as_str())).collect();
                lf = lf.select(selected);
            }

            let df = lf
                .collect()
                .map_err(|e| KrxError::corruption(&path, e.to_string()))?;
            let df = df
                .lazy()
                .with_column(lit(date).alias("trading_date"))
                .collect()?;
            frames.push(df);
        }

        if frames.is_empty() {
            return Ok(DataFrame::empty());
        }

        concat(
            frames.into_iter().map(|f| f.lazy()).collect::<Vec<_>>(),
            UnionArgs::default(),
        )?
        .collect()
        .map_err(KrxError::from)
    }
}
