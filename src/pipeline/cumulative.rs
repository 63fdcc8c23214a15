use std::collections::HashMap;

use chrono::NaiveDate;
use polars::prelude::*;
use rust_decimal::Decimal;
use tracing::{debug, instrument};

use crate::{
    config::Config,
    error::KrxResult,
    schema::SnapshotCol,
    sorted_vec_map::SortedVecMap,
    store::PartitionedTable,
};

/// Builds the ephemeral cumulative-multiplier cache for window `[start,
/// end]` (spec §4.7, S4a). Written fresh every call — there is no
/// incremental update path, matching the "discard between sessions"
/// lifecycle of spec §3.
#[instrument(skip(snapshot_table, cumulative_table, config), fields(start = %start, end = %end))]
pub fn build_cumulative_cache(
    snapshot_table: &PartitionedTable,
    cumulative_table: &PartitionedTable,
    config: &Config,
    start: NaiveDate,
    end: NaiveDate,
) -> KrxResult<usize> {
    let long = snapshot_table.scan(
        start,
        end,
        SnapshotCol::SecurityId.as_str(),
        None,
        Some(&[
            SnapshotCol::SecurityId.as_str().to_string(),
            SnapshotCol::AdjustmentFactor.as_str().to_string(),
        ]),
    )?;

    let mut histories: HashMap<String, SortedVecMap<NaiveDate, Option<f64>>> = HashMap::new();
    let ids = long.column(SnapshotCol::SecurityId.as_str())?.str()?;
    let factors = long.column(SnapshotCol::AdjustmentFactor.as_str())?.f64()?;
    let dates = long.column("trading_date")?.date()?;

    for i in 0..long.height() {
        let id = ids.get(i).unwrap().to_string();
        let factor = factors.get(i);
        let date = date_from_days(dates.get(i).unwrap());
        histories.entry(id).or_default().insert(date, factor);
    }

    // cum(t_k) = 1; walking backward, cum(t_i) = cum(t_{i+1}) * f(t_{i+1}).
    // Null factors count as 1.0 (spec §4.7 step 5).
    let mut by_date: HashMap<NaiveDate, HashMap<String, f64>> = HashMap::new();
    for (symbol, history) in &histories {
        let entries: Vec<(NaiveDate, Option<f64>)> = history.iter().map(|(d, f)| (*d, *f)).collect();
        let mut cum = Decimal::from(1);
        let mut next_factor: Option<f64> = None;
        for (date, factor) in entries.into_iter().rev() {
            if let Some(f) = next_factor {
                cum *= Decimal::try_from(f).unwrap_or(Decimal::from(1));
            }
            let value = cum.to_string().parse::<f64>().unwrap_or(f64::NAN);
            by_date.entry(date).or_default().insert(symbol.clone(), value);
            next_factor = Some(factor.unwrap_or(1.0));
        }
    }

    let mut written = 0;
    for (date, multipliers) in by_date {
        let mut ids: Vec<&String> = multipliers.keys().collect();
        ids.sort();
        let security_id: Vec<&str> = ids.iter().map(|s| s.as_str()).collect();
        let cum_multiplier: Vec<f64> = ids.iter().map(|id| multipliers[*id]).collect();
        let df = df![
            SnapshotCol::SecurityId.as_str() => security_id,
            SnapshotCol::CumulativeMultiplier.as_str() => cum_multiplier,
        ]?;
        cumulative_table.write_partition(
            date,
            df,
            SnapshotCol::SecurityId.as_str(),
            config.row_group_size,
            config.compression_level,
        )?;
        written += 1;
        debug!(%date, "cumulative multiplier partition written");
    }

    Ok(written)
}

fn date_from_days(days_since_epoch: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap() + chrono::Duration::days(days_since_epoch as i64)
}
