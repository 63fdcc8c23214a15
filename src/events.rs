use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;

/// A stage/date boundary notification emitted by the orchestrator (spec
/// §4.9, §4.12). Carries enough to drive a progress bar or a structured log
/// line without the orchestrator depending on any particular UI.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub stage: Stage,
    pub date: Option<NaiveDate>,
    pub rows_written: usize,
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Ingest,
    Adjustment,
    LiquidityRank,
    CumulativeCache,
    Universe,
}

/// Callback sink for progress events. Implemented trivially by closures via
/// the blanket impl below; the default no-op sink is `()`.
pub trait ProgressSink {
    fn on_event(&mut self, event: ProgressEvent);
}

impl<F: FnMut(ProgressEvent)> ProgressSink for F {
    fn on_event(&mut self, event: ProgressEvent) {
        self(event)
    }
}

impl ProgressSink for () {
    fn on_event(&mut self, _event: ProgressEvent) {}
}

mod duration_millis {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u128(d.as_millis())
    }
}
