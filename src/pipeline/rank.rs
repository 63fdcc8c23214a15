use chrono::NaiveDate;
use polars::prelude::*;
use tracing::{debug, instrument};

use crate::{config::Config, error::KrxResult, schema::SnapshotCol, store::PartitionedTable};

/// Runs S3 over `[start, end]`: dense-ranks each date's cross-section by
/// `traded_value` descending and rewrites the partition atomically (spec
/// §4.6). Ties share a rank and the sequence has no gaps, which is exactly
/// `RankMethod::Dense`'s semantics.
#[instrument(skip(table, config), fields(start = %start, end = %end))]
pub fn enrich_liquidity_rank(table: &PartitionedTable, config: &Config, start: NaiveDate, end: NaiveDate) -> KrxResult<usize> {
    let mut rewritten = 0;
    for date in table.list_partitions()?.into_iter().filter(|d| *d >= start && *d <= end) {
        let df = table.read_partition(date)?;
        let ranked = rank_by_traded_value(df)?;
        table.write_partition(
            date,
            ranked,
            SnapshotCol::SecurityId.as_str(),
            config.row_group_size,
            config.compression_level,
        )?;
        rewritten += 1;
        debug!(%date, "liquidity_rank rewritten");
    }
    Ok(rewritten)
}

fn rank_by_traded_value(df: DataFrame) -> KrxResult<DataFrame> {
    let options = RankOptions {
        method: RankMethod::Dense,
        descending: true,
    };
    let ranked = df
        .lazy()
        .with_column(
            col(SnapshotCol::TradedValue.as_str())
                .rank(options, None)
                .cast(DataType::UInt32)
                .alias(SnapshotCol::LiquidityRank.as_str()),
        )
        .collect()?;
    Ok(ranked)
}
