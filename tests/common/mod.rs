use std::sync::Once;

use chrono::NaiveDate;
use krx_store::{Fetcher, KrxResult, RawRecord, RawValue};
use std::collections::HashMap;
use time::macros::format_description;
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Wires up a file-backed tracing subscriber the first time any integration
/// test calls it, so a failing `#[instrument]`ed stage can be diagnosed by
/// re-running with the log file in hand instead of blind `unwrap` panics.
/// Safe to call from every test; later calls are no-ops.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let log_dir = std::env::temp_dir().join("krx_store_it_logs");
        let _ = std::fs::create_dir_all(&log_dir);

        let timestamp = time::OffsetDateTime::now_utc()
            .format(&format_description!(
                "[year][month][day]-[hour][minute][second]"
            ))
            .unwrap_or_else(|_| "unknown".to_string());
        let file_name = format!("krx_store-{timestamp}.log");

        let file_appender = tracing_appender::rolling::never(&log_dir, &file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        // Leaked deliberately: the guard must outlive every test in this
        // process, and integration test binaries never signal a clean exit
        // point for us to drop it at.
        Box::leak(Box::new(guard));

        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(non_blocking)
            .with_span_events(tracing_subscriber::fmt::format::FmtSpan::NONE)
            .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
            .try_init();
    });
}

pub fn date(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, d).unwrap()
}

pub struct StubFetcher {
    pub days: HashMap<NaiveDate, Vec<RawRecord>>,
}

impl Fetcher for StubFetcher {
    async fn fetch_day(&self, date: NaiveDate) -> KrxResult<Vec<RawRecord>> {
        Ok(self.days.get(&date).cloned().unwrap_or_default())
    }
}

pub fn record(security_id: &str, base: i64, close: i64, traded_value: i64) -> RawRecord {
    [
        ("security_id", RawValue::Str(security_id.into())),
        ("symbol", RawValue::Str(security_id.into())),
        ("name", RawValue::Str("Name".into())),
        ("market", RawValue::Str("primary".into())),
        ("base_price", RawValue::Int(base)),
        ("close_price", RawValue::Int(close)),
        ("price_change", RawValue::Int(0)),
        ("traded_volume", RawValue::Int(10)),
        ("traded_value", RawValue::Int(traded_value)),
        ("fluctuation_rate", RawValue::Str("0.0".into())),
        ("fluctuation_type", RawValue::Str("steady".into())),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

pub fn temp_root(label: &str) -> std::path::PathBuf {
    let base = std::env::temp_dir().join(format!(
        "krx_store_it_{label}_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    std::fs::create_dir_all(&base).unwrap();
    base
}
