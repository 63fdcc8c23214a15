use std::collections::HashMap;

use chrono::NaiveDate;
use polars::prelude::*;
use rust_decimal::Decimal;
use tracing::{debug, instrument};

use crate::{
    config::Config,
    error::{KrxError, KrxResult},
    schema::SnapshotCol,
    sorted_vec_map::SortedVecMap,
    store::PartitionedTable,
};

/// Runs S2 over `[start, end]`: computes `adjustment_factor` for every
/// symbol observation in the window and rewrites each affected partition
/// atomically (spec §4.5).
///
/// The predecessor lookup is allowed to walk arbitrarily far left of
/// `start` (spec §4.5 step 1), so the per-symbol history is built from
/// every partition on disk up to `end`, not just the requested window.
#[instrument(skip(table, config), fields(start = %start, end = %end))]
pub fn enrich_adjustment(table: &PartitionedTable, config: &Config, start: NaiveDate, end: NaiveDate) -> KrxResult<usize> {
    let all_dates = table.list_partitions()?;
    let earliest = match all_dates.first() {
        Some(d) => *d,
        None => return Ok(0),
    };

    let long = table.scan(
        earliest,
        end,
        SnapshotCol::SecurityId.as_str(),
        None,
        Some(&[
            SnapshotCol::SecurityId.as_str().to_string(),
            SnapshotCol::BasePrice.as_str().to_string(),
            SnapshotCol::ClosePrice.as_str().to_string(),
        ]),
    )?;

    let mut histories: HashMap<String, SortedVecMap<NaiveDate, (i64, i64)>> = HashMap::new();
    let ids = long.column(SnapshotCol::SecurityId.as_str())?.str()?;
    let bases = long.column(SnapshotCol::BasePrice.as_str())?.i64()?;
    let closes = long.column(SnapshotCol::ClosePrice.as_str())?.i64()?;
    let dates = long.column("trading_date")?.date()?;

    for i in 0..long.height() {
        let id = ids.get(i).unwrap().to_string();
        let base = bases.get(i).unwrap();
        let close = closes.get(i).unwrap();
        let date = date_from_days(dates.get(i).unwrap());
        histories.entry(id).or_default().insert(date, (base, close));
    }

    // Per symbol, walk chronologically once, computing factor(t) from the
    // immediately preceding observation's close price, regardless of
    // whether that predecessor lies inside [start, end].
    let mut factors_by_date: HashMap<NaiveDate, HashMap<String, f64>> = HashMap::new();
    for (symbol, history) in &histories {
        let mut prev_close: Option<i64> = None;
        for (date, (base, close)) in history.iter() {
            if *date >= start && *date <= end {
                let factor = match prev_close {
                    Some(0) | None => None,
                    Some(prev) => Some(decimal_ratio(*base, prev)),
                };
                if let Some(f) = factor {
                    factors_by_date
                        .entry(*date)
                        .or_default()
                        .insert(symbol.clone(), f);
                }
            }
            prev_close = Some(*close);
        }
    }

    let mut rewritten = 0;
    for date in all_dates.into_iter().filter(|d| *d >= start && *d <= end) {
        let df = table.read_partition(date)?;
        let empty = HashMap::new();
        let factors = factors_by_date.get(&date).unwrap_or(&empty);
        let updated = replace_adjustment_column(df, factors)?;
        table.write_partition(
            date,
            updated,
            SnapshotCol::SecurityId.as_str(),
            config.row_group_size,
            config.compression_level,
        )?;
        rewritten += 1;
        debug!(%date, "adjustment_factor rewritten");
    }

    Ok(rewritten)
}

/// `base / prior_close`, computed via `Decimal` to preserve precision down
/// to the 10⁻⁶ guarantee spec §4.5 requires, then narrowed to `f64` once.
fn decimal_ratio(base: i64, prior_close: i64) -> f64 {
    let ratio = Decimal::from(base) / Decimal::from(prior_close);
    ratio.to_string().parse::<f64>().unwrap_or(f64::NAN)
}

fn date_from_days(days_since_epoch: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap() + chrono::Duration::days(days_since_epoch as i64)
}

fn replace_adjustment_column(df: DataFrame, factors: &HashMap<String, f64>) -> KrxResult<DataFrame> {
    let ids = df.column(SnapshotCol::SecurityId.as_str())?.str()?;
    let values: Vec<Option<f64>> = ids
        .into_iter()
        .map(|id| id.and_then(|id| factors.get(id).copied()))
        .collect();
    let series = Series::new(SnapshotCol::AdjustmentFactor.name(), values);
    let mut df = df;
    df.with_column(series)
        .map_err(|e| KrxError::store(std::path::PathBuf::new(), "enrich_adjustment", e.to_string()))?;
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, d).unwrap()
    }

    fn config(base: &std::path::Path) -> Config {
        Config::new(base.join("store"), base.join("ephemeral")).unwrap()
    }

    fn write_day(table: &PartitionedTable, cfg: &Config, date: NaiveDate, base: i64, close: i64) {
        let df = df! {
            SnapshotCol::SecurityId.as_str() => ["S1"],
            SnapshotCol::Symbol.as_str() => ["S1"],
            SnapshotCol::Name.as_str() => ["Name"],
            SnapshotCol::Market.as_str() => ["primary"],
            SnapshotCol::BasePrice.as_str() => [base],
            SnapshotCol::ClosePrice.as_str() => [close],
            SnapshotCol::PriceChange.as_str() => [0i64],
            SnapshotCol::TradedVolume.as_str() => [1i64],
            SnapshotCol::TradedValue.as_str() => [1i64],
            SnapshotCol::FluctuationRate.as_str() => ["0.0"],
            SnapshotCol::FluctuationType.as_str() => ["steady"],
            SnapshotCol::AdjustmentFactor.as_str() => [None::<f64>],
            SnapshotCol::LiquidityRank.as_str() => [None::<u32>],
        }
        .unwrap();
        table
            .write_partition(date, df, SnapshotCol::SecurityId.as_str(), cfg.row_group_size, cfg.compression_level)
            .unwrap();
    }

    #[test]
    fn first_observation_has_null_factor() {
        let base = crate::test_support::temp_dir("adjust_first_obs");
        let cfg = config(&base);
        let table = cfg.snapshot_table();
        write_day(&table, &cfg, date(1), 2_520_000, 2_520_000);

        enrich_adjustment(&table, &cfg, date(1), date(1)).unwrap();

        let df = table.read_partition(date(1)).unwrap();
        let factor = df
            .column(SnapshotCol::AdjustmentFactor.as_str())
            .unwrap()
            .f64()
            .unwrap()
            .get(0);
        assert_eq!(factor, None);

        std::fs::remove_dir_all(&base).ok();
    }

    #[test]
    fn split_day_factor_matches_scenario_a() {
        let base = crate::test_support::temp_dir("adjust_split_scenario_a");
        let cfg = config(&base);
        let table = cfg.snapshot_table();
        write_day(&table, &cfg, date(1), 2_520_000, 2_520_000);
        write_day(&table, &cfg, date(2), 2_607_000, 2_607_000);
        write_day(&table, &cfg, date(3), 2_650_000, 2_650_000);
        write_day(&table, &cfg, date(4), 53_000, 51_900);
        write_day(&table, &cfg, date(5), 51_900, 52_600);

        enrich_adjustment(&table, &cfg, date(1), date(5)).unwrap();

        let d4 = table.read_partition(date(4)).unwrap();
        let factor = d4
            .column(SnapshotCol::AdjustmentFactor.as_str())
            .unwrap()
            .f64()
            .unwrap()
            .get(0)
            .unwrap();
        assert!((factor - 0.02).abs() < 1e-9);

        std::fs::remove_dir_all(&base).ok();
    }

    #[test]
    fn rerunning_is_idempotent() {
        let base = crate::test_support::temp_dir("adjust_idempotent");
        let cfg = config(&base);
        let table = cfg.snapshot_table();
        write_day(&table, &cfg, date(1), 1000, 1000);
        write_day(&table, &cfg, date(2), 1100, 1100);

        enrich_adjustment(&table, &cfg, date(1), date(2)).unwrap();
        let first = table
            .read_partition(date(2))
            .unwrap()
            .column(SnapshotCol::AdjustmentFactor.as_str())
            .unwrap()
            .f64()
            .unwrap()
            .get(0);

        enrich_adjustment(&table, &cfg, date(1), date(2)).unwrap();
        let second = table
            .read_partition(date(2))
            .unwrap()
            .column(SnapshotCol::AdjustmentFactor.as_str())
            .unwrap()
            .f64()
            .unwrap()
            .get(0);

        assert_eq!(first, second);
        std::fs::remove_dir_all(&base).ok();
    }
}
