use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use polars::prelude::*;
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::instrument;

use crate::{
    config::Config,
    error::{KrxError, KrxResult},
    io::lock::AdvisoryLock,
    pipeline::cumulative::build_cumulative_cache,
    query::{engine::scan_field, registry::FieldRegistry},
    schema::SnapshotCol,
    store::PartitionedTable,
};

/// Selects which symbols a `get` call is restricted to (spec §4.10 step 4).
pub enum Universe {
    Symbols(Vec<String>),
    Named(&'static str),
}

impl Universe {
    fn named_column(name: &str) -> Option<&'static str> {
        match name {
            "top_100" => Some(SnapshotCol::InTop100.as_str()),
            "top_200" => Some(SnapshotCol::InTop200.as_str()),
            "top_500" => Some(SnapshotCol::InTop500.as_str()),
            "top_1000" => Some(SnapshotCol::InTop1000.as_str()),
            _ => None,
        }
    }
}

/// A query handle bound to a fixed `[start, end]` window (the "range-locked
/// loader" of the GLOSSARY). Its cumulative-multiplier cache is built once
/// at construction and is valid only for this window.
pub struct DataLoader {
    config: Config,
    snapshot_table: PartitionedTable,
    universe_table: PartitionedTable,
    cumulative_table: PartitionedTable,
    registry: FieldRegistry,
    start: NaiveDate,
    end: NaiveDate,
}

impl DataLoader {
    /// Builds the window-scoped cumulative-multiplier cache (S4a). Assumes
    /// S1–S3 and S4b have already been run by an `Orchestrator::prepare`
    /// call over a superset of `[start, end]`. Fails with `KrxError::Busy`
    /// if an orchestrator currently holds the store's advisory lock.
    #[instrument(skip(config), fields(start = %start, end = %end))]
    pub fn new(config: Config, start: NaiveDate, end: NaiveDate) -> KrxResult<Self> {
        // A transient acquire-then-release: fails fast if a writer is
        // currently active, without holding the lock for the loader's
        // lifetime (queries take no locks, spec §5).
        drop(AdvisoryLock::acquire(&config.lock_path(), config.lock_stale_after)?);

        let snapshot_table = config.snapshot_table();
        let universe_table = config.universe_table();
        let cumulative_table = config.cumulative_table();

        build_cumulative_cache(&snapshot_table, &cumulative_table, &config, start, end)?;

        Ok(Self {
            config,
            snapshot_table,
            universe_table,
            cumulative_table,
            registry: FieldRegistry::default(),
            start,
            end,
        })
    }

    pub fn window(&self) -> (NaiveDate, NaiveDate) {
        (self.start, self.end)
    }

    /// Implements the six-step `get` contract of spec §4.10.
    #[instrument(skip(self, universe), fields(field = field))]
    pub fn get(
        &self,
        field: &str,
        universe: Option<Universe>,
        sub_window: Option<(NaiveDate, NaiveDate)>,
        adjusted: bool,
    ) -> KrxResult<DataFrame> {
        let entry = self.registry.resolve(field)?;

        let (start, end) = match sub_window {
            Some((s, e)) => {
                if s < self.start || e > self.end {
                    return Err(KrxError::Window {
                        start: s.to_string(),
                        end: e.to_string(),
                        loader_start: self.start.to_string(),
                        loader_end: self.end.to_string(),
                    });
                }
                (s, e)
            }
            None => (self.start, self.end),
        };

        let mut long = scan_field(&self.snapshot_table, entry.column.as_str(), start, end, None)?;

        if let Some(universe) = universe {
            long = self.apply_universe(long, universe, start, end)?;
        }

        if adjusted && entry.adjustable {
            long = self.apply_adjustment(long, start, end)?;
        }

        pivot_to_wide(long)
    }

    fn apply_universe(&self, long: DataFrame, universe: Universe, start: NaiveDate, end: NaiveDate) -> KrxResult<DataFrame> {
        match universe {
            Universe::Symbols(symbols) => {
                let set: HashSet<String> = symbols.into_iter().collect();
                let mask: Vec<bool> = long
                    .column("security_id")?
                    .str()?
                    .into_iter()
                    .map(|id| id.map(|id| set.contains(id)).unwrap_or(false))
                    .collect();
                let mask = BooleanChunked::new("mask".into(), mask);
                Ok(long.filter(&mask)?)
            }
            Universe::Named(name) => {
                let column = Universe::named_column(name).ok_or_else(|| KrxError::Registry {
                    field: name.to_string(),
                    known: "top_100, top_200, top_500, top_1000".to_string(),
                })?;
                let projected = [SnapshotCol::SecurityId.as_str().to_string(), column.to_string()];
                let flags = self.universe_table.scan(
                    start,
                    end,
                    SnapshotCol::SecurityId.as_str(),
                    None,
                    Some(&projected),
                )?;
                let flags = flags
                    .lazy()
                    .filter(col(column))
                    .select([col("trading_date"), col(SnapshotCol::SecurityId.as_str()).alias("security_id")])
                    .collect()?;

                Ok(long
                    .lazy()
                    .join(
                        flags.lazy(),
                        [col("trading_date"), col("security_id")],
                        [col("trading_date"), col("security_id")],
                        JoinArgs::new(JoinType::Inner),
                    )
                    .collect()?)
            }
        }
    }

    /// Applies S4a's multipliers via an inner join on `(trading_date,
    /// security_id)`; unmatched rows (no cached multiplier) keep multiplier
    /// 1.0 (spec §4.10 step 5 and §7's numeric convention).
    fn apply_adjustment(&self, long: DataFrame, start: NaiveDate, end: NaiveDate) -> KrxResult<DataFrame> {
        let projected = [
            SnapshotCol::SecurityId.as_str().to_string(),
            SnapshotCol::CumulativeMultiplier.as_str().to_string(),
        ];
        let multipliers = self.cumulative_table.scan(
            start,
            end,
            SnapshotCol::SecurityId.as_str(),
            None,
            Some(&projected),
        )?;
        let multipliers = multipliers
            .lazy()
            .select([
                col("trading_date"),
                col(SnapshotCol::SecurityId.as_str()).alias("security_id"),
                col(SnapshotCol::CumulativeMultiplier.as_str()).alias("cum_multiplier"),
            ])
            .collect()?;

        let joined = long
            .lazy()
            .join(
                multipliers.lazy(),
                [col("trading_date"), col("security_id")],
                [col("trading_date"), col("security_id")],
                JoinArgs::new(JoinType::Left),
            )
            .collect()?;

        let values = joined.column("value")?.f64()?;
        let multiplier_col = joined.column("cum_multiplier")?.f64()?;
        // spec §4.10 step 5: the adjusted value is rounded and stored as an
        // integer, not left as a float alongside the unadjusted path.
        let adjusted: Vec<Option<i64>> = (0..joined.height())
            .map(|i| {
                let value = values.get(i)?;
                let multiplier = multiplier_col.get(i).unwrap_or(1.0);
                Some(bankers_round(value * multiplier) as i64)
            })
            .collect();

        let mut result = joined.select(["trading_date", "security_id"])?;
        result.with_column(Series::new("value".into(), adjusted))?;
        Ok(result)
    }
}

/// Rounds to the nearest integer, ties to even, matching spec §4.10 step 5's
/// "bankers'/nearest-even rounding" requirement. Routed through `Decimal` so
/// the tie-breaking rule is exact rather than subject to binary-float
/// representation error near `.5`.
fn bankers_round(value: f64) -> f64 {
    match Decimal::try_from(value) {
        Ok(d) => d
            .round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven)
            .to_string()
            .parse()
            .unwrap_or(value.round()),
        Err(_) => value.round(),
    }
}

fn date_from_days(days_since_epoch: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap() + chrono::Duration::days(days_since_epoch as i64)
}

/// Manual long→wide pivot: index = trading_date ascending, columns = the
/// union of symbols observed in `long`, cells = value, missing combinations
/// null. Implemented by hand rather than via polars' pivot entry point to
/// keep this path stable across polars pivot-API churn (see DESIGN.md).
///
/// `value` may be `Float64` (the raw unadjusted path) or `Int64` (the
/// adjusted path, already rounded to an integer by `apply_adjustment`); the
/// output column dtype follows whichever was passed in.
fn pivot_to_wide(long: DataFrame) -> KrxResult<DataFrame> {
    let dates = long.column("trading_date")?.date()?;
    let ids = long.column("security_id")?.str()?;
    let value_col = long.column("value")?;
    let store_as_int = matches!(value_col.dtype(), DataType::Int64);
    let values = value_col.cast(&DataType::Float64)?;
    let values = values.f64()?;

    let mut symbols: Vec<String> = ids.into_no_null_iter().map(String::from).collect();
    symbols.sort();
    symbols.dedup();

    let mut by_date: HashMap<i32, HashMap<String, f64>> = HashMap::new();
    for i in 0..long.height() {
        let Some(date) = dates.get(i) else { continue };
        let Some(id) = ids.get(i) else { continue };
        let Some(value) = values.get(i) else { continue };
        by_date.entry(date).or_default().insert(id.to_string(), value);
    }

    let mut ordered_dates: Vec<i32> = by_date.keys().copied().collect();
    ordered_dates.sort();

    let naive_dates: Vec<NaiveDate> = ordered_dates.iter().map(|d| date_from_days(*d)).collect();
    let date_series = Series::new("trading_date".into(), naive_dates);
    let mut columns = vec![date_series];

    for symbol in &symbols {
        let column: Vec<Option<f64>> = ordered_dates
            .iter()
            .map(|d| by_date.get(d).and_then(|row| row.get(symbol).copied()))
            .collect();
        let series = if store_as_int {
            let ints: Vec<Option<i64>> = column.into_iter().map(|v| v.map(|v| v as i64)).collect();
            Series::new(symbol.as_str().into(), ints)
        } else {
            Series::new(symbol.as_str().into(), column)
        };
        columns.push(series);
    }

    DataFrame::new(columns).map_err(Into::into)
}

impl Drop for DataLoader {
    /// Cleans the ephemeral cumulative-multiplier cache on drop (spec §9
    /// design note: "clean the ephemeral root on loader drop"). Only the
    /// cumulative-cache subtree is removed; `staging`/`backup` belong to the
    /// orchestrator's write path and outlive any one loader.
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(self.config.cumulative_root());
    }
}
