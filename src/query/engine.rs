use chrono::NaiveDate;
use polars::prelude::*;

use crate::{error::KrxResult, schema::SnapshotCol, store::PartitionedTable};

/// Long-format `(trading_date, security_id, value)` scan of a single column
/// over `[start, end]`, optionally restricted to `symbols` (spec §4.3). This
/// is the thin query-layer seam over `PartitionedTable::scan`: C3's pruning
/// guarantees (partition/row-group/column) live in `store::table`, which
/// already satisfies them; this function just fixes the column projection
/// and result shape the composer (C10) expects.
pub fn scan_field(
    table: &PartitionedTable,
    column: &str,
    start: NaiveDate,
    end: NaiveDate,
    symbols: Option<&[String]>,
) -> KrxResult<DataFrame> {
    let projected = [SnapshotCol::SecurityId.as_str().to_string(), column.to_string()];
    let df = table.scan(start, end, SnapshotCol::SecurityId.as_str(), symbols, Some(&projected))?;

    df.lazy()
        .select([
            col("trading_date"),
            col(SnapshotCol::SecurityId.as_str()).alias("security_id"),
            col(column).cast(DataType::Float64).alias("value"),
        ])
        .sort(
            ["trading_date", "security_id"],
            SortMultipleOptions::default(),
        )
        .collect()
        .map_err(Into::into)
}
