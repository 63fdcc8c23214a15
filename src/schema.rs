use polars::prelude::PlSmallStr;
use strum::{Display, EnumString, IntoStaticStr};

/// The standardized vocabulary for every column that appears in any of the
/// three on-disk tables (snapshot/enrichment, universe, cumulative cache).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum SnapshotCol {
    /// Partition key, reconstructed from the directory name — never stored
    /// inside the file payload itself (spec §9 open question, resolved).
    TradingDate,
    SecurityId,
    Symbol,
    Name,
    Market,
    BasePrice,
    ClosePrice,
    PriceChange,
    TradedVolume,
    TradedValue,
    FluctuationRate,
    FluctuationType,
    /// Enriched by S2; null until then, and for a symbol's first observation.
    AdjustmentFactor,
    /// Enriched by S3; null until then.
    LiquidityRank,
    /// Ephemeral-only: lives in the cumulative-cache table, never in the
    /// main snapshot table.
    CumulativeMultiplier,
    InTop100,
    InTop200,
    InTop500,
    InTop1000,
}

impl From<SnapshotCol> for PlSmallStr {
    fn from(value: SnapshotCol) -> Self {
        value.as_str().into()
    }
}

impl SnapshotCol {
    pub fn name(&self) -> PlSmallStr {
        (*self).into()
    }

    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}
