use chrono::NaiveDate;
use polars::prelude::*;
use tracing::{debug, instrument};

use crate::{config::Config, error::KrxResult, schema::SnapshotCol, store::PartitionedTable};

fn thresholds() -> [(u32, &'static str); 4] {
    [
        (100, SnapshotCol::InTop100.as_str()),
        (200, SnapshotCol::InTop200.as_str()),
        (500, SnapshotCol::InTop500.as_str()),
        (1000, SnapshotCol::InTop1000.as_str()),
    ]
}

/// Runs S4b over `[start, end]`: projects `(security_id, liquidity_rank)`
/// from each date's (already S3-enriched) partition into boolean membership
/// flags and publishes to the universe table (spec §4.8). The subset
/// invariant (`in_top_N ⇒ in_top_M` for N ≤ M) falls out structurally from
/// comparing the same rank against nested thresholds.
#[instrument(skip(snapshot_table, universe_table, config), fields(start = %start, end = %end))]
pub fn materialize_universe(
    snapshot_table: &PartitionedTable,
    universe_table: &PartitionedTable,
    config: &Config,
    start: NaiveDate,
    end: NaiveDate,
) -> KrxResult<usize> {
    let mut written = 0;
    for date in snapshot_table.list_partitions()?.into_iter().filter(|d| *d >= start && *d <= end) {
        let df = snapshot_table.read_partition(date)?;
        let flags = flag_dataframe(df)?;
        universe_table.write_partition(
            date,
            flags,
            SnapshotCol::SecurityId.as_str(),
            config.row_group_size,
            config.compression_level,
        )?;
        written += 1;
        debug!(%date, "universe partition written");
    }
    Ok(written)
}

fn flag_dataframe(df: DataFrame) -> KrxResult<DataFrame> {
    let mut lf = df
        .lazy()
        .select([col(SnapshotCol::SecurityId.as_str()), col(SnapshotCol::LiquidityRank.as_str())]);

    for (threshold, name) in thresholds() {
        lf = lf.with_column(
            col(SnapshotCol::LiquidityRank.as_str())
                .lt_eq(lit(threshold))
                .alias(name),
        );
    }

    lf.select([
        col(SnapshotCol::SecurityId.as_str()),
        col(SnapshotCol::InTop100.as_str()),
        col(SnapshotCol::InTop200.as_str()),
        col(SnapshotCol::InTop500.as_str()),
        col(SnapshotCol::InTop1000.as_str()),
    ])
    .sort([SnapshotCol::SecurityId.as_str()], SortMultipleOptions::default())
    .collect()
    .map_err(Into::into)
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

    fn snapshot_with_ranks(ranks: &[(&str, Option<u32>)]) -> DataFrame {
        let n = ranks.len();
        let ids: Vec<&str> = ranks.iter().map(|(id, _)| *id).collect();
        let rank_vals: Vec<Option<u32>> = ranks.iter().map(|(_, r)| *r).collect();
        df! {
            SnapshotCol::SecurityId.as_str() => ids,
            SnapshotCol::Symbol.as_str() => ranks.iter().map(|(id, _)| *id).collect::<Vec<_>>(),
            SnapshotCol::Name.as_str() => vec!["Name"; n],
            SnapshotCol::Market.as_str() => vec!["primary"; n],
            SnapshotCol::BasePrice.as_str() => vec![1000i64; n],
            SnapshotCol::ClosePrice.as_str() => vec![1000i64; n],
            SnapshotCol::PriceChange.as_str() => vec![0i64; n],
            SnapshotCol::TradedVolume.as_str() => vec![1i64; n],
            SnapshotCol::TradedValue.as_str() => vec![1i64; n],
            SnapshotCol::FluctuationRate.as_str() => vec!["0.0"; n],
            SnapshotCol::FluctuationType.as_str() => vec!["steady"; n],
            SnapshotCol::AdjustmentFactor.as_str() => vec![None::<f64>; n],
            SnapshotCol::LiquidityRank.as_str() => rank_vals,
        }
        .unwrap()
    }

    #[test]
    fn subset_invariant_holds_across_thresholds() {
        let base = crate::test_support::temp_dir("universe_subset_invariant");
        let cfg = config(&base);
        let snap = cfg.snapshot_table();
        let uni = cfg.universe_table();
        let df = snapshot_with_ranks(&[("A", Some(1)), ("B", Some(150)), ("C", Some(600)), ("D", Some(5000))]);
        snap.write_partition(date(1), df, SnapshotCol::SecurityId.as_str(), cfg.row_group_size, cfg.compression_level)
            .unwrap();

        materialize_universe(&snap, &uni, &cfg, date(1), date(1)).unwrap();

        let flags = uni.read_partition(date(1)).unwrap();
        let top100 = flags.column(SnapshotCol::InTop100.as_str()).unwrap().bool().unwrap();
        let top1000 = flags.column(SnapshotCol::InTop1000.as_str()).unwrap().bool().unwrap();
        for i in 0..flags.height() {
            if top100.get(i).unwrap() {
                assert!(top1000.get(i).unwrap());
            }
        }

        std::fs::remove_dir_all(&base).ok();
    }

    #[test]
    fn halted_symbol_worst_rank_has_all_flags_false() {
        let base = crate::test_support::temp_dir("universe_halted_symbol");
        let cfg = config(&base);
        let snap = cfg.snapshot_table();
        let uni = cfg.universe_table();
        let df = snapshot_with_ranks(&[("A", Some(1)), ("H", Some(9999))]);
        snap.write_partition(date(3), df, SnapshotCol::SecurityId.as_str(), cfg.row_group_size, cfg.compression_level)
            .unwrap();

        materialize_universe(&snap, &uni, &cfg, date(3), date(3)).unwrap();

        let flags = uni.read_partition(date(3)).unwrap();
        let ids = flags.column(SnapshotCol::SecurityId.as_str()).unwrap().str().unwrap();
        let idx = (0..flags.height()).find(|&i| ids.get(i) == Some("H")).unwrap();
        for col_name in thresholds().map(|(_, name)| name) {
            assert_eq!(flags.column(col_name).unwrap().bool().unwrap().get(idx), Some(false));
        }

        std::fs::remove_dir_all(&base).ok();
    }
}
