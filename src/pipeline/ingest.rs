use chrono::NaiveDate;
use polars::prelude::*;
use tracing::{debug, info, instrument};

use crate::{
    config::Config,
    error::KrxResult,
    fetcher::Fetcher,
    schema::SnapshotCol,
    store::{snapshot::SnapshotRow, PartitionedTable},
};

/// Outcome of ingesting a single date (spec §4.9 step 1's per-date
/// classification).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Written { rows: usize },
    Skipped,
    NonTrading,
}

/// Runs S1 for one date: fetch, decode, sort, publish. Returns `Skipped`
/// without calling the fetcher at all when `config.skip_if_present` is set
/// and the partition already exists (spec §4.4's default resume policy).
#[instrument(skip(fetcher, table, config), fields(date = %date))]
pub async fn ingest_date(
    fetcher: &impl Fetcher,
    table: &PartitionedTable,
    config: &Config,
    date: NaiveDate,
) -> KrxResult<IngestOutcome> {
    if config.skip_if_present && table.has_partition(date) {
        debug!("partition already present, skipping fetch");
        return Ok(IngestOutcome::Skipped);
    }

    let records = fetcher.fetch_day(date).await?;
    if records.is_empty() {
        info!("no records returned, treating as non-trading day");
        return Ok(IngestOutcome::NonTrading);
    }

    let mut rows = Vec::with_capacity(records.len());
    for record in &records {
        rows.push(SnapshotRow::decode(date, record)?);
    }
    rows.sort_by(|a, b| a.security_id.cmp(&b.security_id));

    let df = rows_to_dataframe(&rows)?;
    let row_count = df.height();
    table.write_partition(
        date,
        df,
        SnapshotCol::SecurityId.as_str(),
        config.row_group_size,
        config.compression_level,
    )?;
    info!(rows = row_count, "ingested partition");
    Ok(IngestOutcome::Written { rows: row_count })
}

fn rows_to_dataframe(rows: &[SnapshotRow]) -> KrxResult<DataFrame> {
    let security_id: Vec<&str> = rows.iter().map(|r| r.security_id.as_str()).collect();
    let symbol: Vec<&str> = rows.iter().map(|r| r.symbol.as_str()).collect();
    let name: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
    let market: Vec<&str> = rows.iter().map(|r| r.market.as_str()).collect();
    let base_price: Vec<i64> = rows.iter().map(|r| r.base_price).collect();
    let close_price: Vec<i64> = rows.iter().map(|r| r.close_price).collect();
    let price_change: Vec<i64> = rows.iter().map(|r| r.price_change).collect();
    let traded_volume: Vec<i64> = rows.iter().map(|r| r.traded_volume).collect();
    let traded_value: Vec<i64> = rows.iter().map(|r| r.traded_value).collect();
    let fluctuation_rate: Vec<&str> = rows.iter().map(|r| r.fluctuation_rate.as_str()).collect();
    let fluctuation_type: Vec<&str> = rows.iter().map(|r| r.fluctuation_type.as_str()).collect();
    let adjustment_factor: Vec<Option<f64>> = rows.iter().map(|r| r.adjustment_factor).collect();
    let liquidity_rank: Vec<Option<u32>> = rows.iter().map(|r| r.liquidity_rank).collect();

    Ok(df![
        SnapshotCol::SecurityId.as_str() => security_id,
        SnapshotCol::Symbol.as_str() => symbol,
        SnapshotCol::Name.as_str() => name,
        SnapshotCol::Market.as_str() => market,
        SnapshotCol::BasePrice.as_str() => base_price,
        SnapshotCol::ClosePrice.as_str() => close_price,
        SnapshotCol::PriceChange.as_str() => price_change,
        SnapshotCol::TradedVolume.as_str() => traded_volume,
        SnapshotCol::TradedValue.as_str() => traded_value,
        SnapshotCol::FluctuationRate.as_str() => fluctuation_rate,
        SnapshotCol::FluctuationType.as_str() => fluctuation_type,
        SnapshotCol::AdjustmentFactor.as_str() => adjustment_factor,
        SnapshotCol::LiquidityRank.as_str() => liquidity_rank,
    ]?)
}
