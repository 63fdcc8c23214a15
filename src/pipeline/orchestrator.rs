use std::time::Instant;

use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::{
    config::Config,
    error::{KrxError, KrxResult},
    events::{ProgressEvent, ProgressSink, Stage},
    fetcher::Fetcher,
    io::lock::AdvisoryLock,
    pipeline::{
        adjust::enrich_adjustment, cumulative::build_cumulative_cache, ingest::IngestOutcome,
        ingest::ingest_date, rank::enrich_liquidity_rank, universe::materialize_universe,
    },
    store::PartitionedTable,
};

/// Outcome of `Orchestrator::prepare` (spec §4.9, §7): per-date ingestion
/// failures are collected here rather than aborting the whole sweep.
#[derive(Debug, Default)]
pub struct PrepareSummary {
    pub succeeded: Vec<NaiveDate>,
    pub skipped_non_trading: Vec<NaiveDate>,
    pub failed: Vec<(NaiveDate, KrxError)>,
    pub rewritten_for_adjustment: usize,
    pub rewritten_for_rank: usize,
    pub cumulative_partitions: usize,
    pub universe_partitions: usize,
    pub cancelled: bool,
}

/// Drives a store root through S1→S2→S3→S4a→S4b for a window, under a
/// single-writer advisory lock (spec §4.9, §5).
pub struct Orchestrator {
    config: Config,
    snapshot_table: PartitionedTable,
    universe_table: PartitionedTable,
    cumulative_table: PartitionedTable,
}

impl Orchestrator {
    /// Constructs the orchestrator and runs startup reconciliation over
    /// every table's staging/backup trees (spec §4.2's crash recovery),
    /// restoring any partition left mid-rewrite by a prior crashed process.
    pub fn new(config: Config) -> KrxResult<Self> {
        let snapshot_table = config.snapshot_table();
        let universe_table = config.universe_table();
        let cumulative_table = config.cumulative_table();

        snapshot_table.reconcile()?;
        universe_table.reconcile()?;
        cumulative_table.reconcile()?;

        Ok(Self {
            config,
            snapshot_table,
            universe_table,
            cumulative_table,
        })
    }

    pub fn snapshot_table(&self) -> &PartitionedTable {
        &self.snapshot_table
    }

    pub fn universe_table(&self) -> &PartitionedTable {
        &self.universe_table
    }

    pub fn cumulative_table(&self) -> &PartitionedTable {
        &self.cumulative_table
    }

    #[instrument(skip(self, fetcher, cancel, sink), fields(start = %start, end = %end))]
    pub async fn prepare(
        &self,
        fetcher: &impl Fetcher,
        start: NaiveDate,
        end: NaiveDate,
        cancel: CancellationToken,
        mut sink: impl ProgressSink,
    ) -> KrxResult<PrepareSummary> {
        let _lock = AdvisoryLock::acquire(&self.config.lock_path(), self.config.lock_stale_after)?;
        let mut summary = PrepareSummary::default();

        // Step 1: S1 sweep. A fatal error on one date is recorded and the
        // sweep continues (spec §4.9 step 1's isolation guarantee).
        let mut date = start;
        while date <= end {
            if cancel.is_cancelled() {
                info!("cancellation observed between dates, stopping sweep");
                summary.cancelled = true;
                return Ok(summary);
            }

            let t0 = Instant::now();
            match ingest_date(fetcher, &self.snapshot_table, &self.config, date).await {
                Ok(IngestOutcome::Written { rows }) => {
                    summary.succeeded.push(date);
                    sink.on_event(ProgressEvent {
                        stage: Stage::Ingest,
                        date: Some(date),
                        rows_written: rows,
                        elapsed: t0.elapsed(),
                    });
                }
                Ok(IngestOutcome::Skipped) => summary.succeeded.push(date),
                Ok(IngestOutcome::NonTrading) => summary.skipped_non_trading.push(date),
                Err(e) => {
                    warn!(%date, error = %e, "ingestion failed for date, continuing sweep");
                    summary.failed.push((date, e));
                }
            }
            date = date.succ_opt().expect("date overflow");
        }

        if cancel.is_cancelled() {
            summary.cancelled = true;
            return Ok(summary);
        }

        // Steps 2-3: S2/S3. Re-enriching the whole window unconditionally is
        // idempotency-safe (spec §4.9 step 2's allowed implementation).
        let t0 = Instant::now();
        summary.rewritten_for_adjustment = enrich_adjustment(&self.snapshot_table, &self.config, start, end)?;
        sink.on_event(ProgressEvent {
            stage: Stage::Adjustment,
            date: None,
            rows_written: summary.rewritten_for_adjustment,
            elapsed: t0.elapsed(),
        });

        if cancel.is_cancelled() {
            summary.cancelled = true;
            return Ok(summary);
        }

        let t0 = Instant::now();
        summary.rewritten_for_rank = enrich_liquidity_rank(&self.snapshot_table, &self.config, start, end)?;
        sink.on_event(ProgressEvent {
            stage: Stage::LiquidityRank,
            date: None,
            rows_written: summary.rewritten_for_rank,
            elapsed: t0.elapsed(),
        });

        if cancel.is_cancelled() {
            summary.cancelled = true;
            return Ok(summary);
        }

        // Step 4: S4a.
        let t0 = Instant::now();
        summary.cumulative_partitions =
            build_cumulative_cache(&self.snapshot_table, &self.cumulative_table, &self.config, start, end)?;
        sink.on_event(ProgressEvent {
            stage: Stage::CumulativeCache,
            date: None,
            rows_written: summary.cumulative_partitions,
            elapsed: t0.elapsed(),
        });

        // Step 5: S4b.
        let t0 = Instant::now();
        summary.universe_partitions =
            materialize_universe(&self.snapshot_table, &self.universe_table, &self.config, start, end)?;
        sink.on_event(ProgressEvent {
            stage: Stage::Universe,
            date: None,
            rows_written: summary.universe_partitions,
            elapsed: t0.elapsed(),
        });

        info!(
            succeeded = summary.succeeded.len(),
            failed = summary.failed.len(),
            non_trading = summary.skipped_non_trading.len(),
            "prepare complete"
        );
        Ok(summary)
    }
}
