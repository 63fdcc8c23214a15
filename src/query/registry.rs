use std::collections::HashMap;

use crate::{
    error::{KrxError, KrxResult},
    schema::SnapshotCol,
};

/// One entry in the field registry (spec §4.11): a logical field name's
/// physical column and whether it may be scaled by a cumulative multiplier.
#[derive(Debug, Clone, Copy)]
pub struct FieldEntry {
    pub column: SnapshotCol,
    pub adjustable: bool,
}

/// Declarative logical-field-name → physical-column mapping, loaded once at
/// `DataLoader` construction. Extensible without touching the composer
/// (spec §4.11): adding a field is adding one entry here.
pub struct FieldRegistry {
    entries: HashMap<&'static str, FieldEntry>,
}

impl Default for FieldRegistry {
    fn default() -> Self {
        let mut entries = HashMap::new();
        entries.insert(
            "close",
            FieldEntry {
                column: SnapshotCol::ClosePrice,
                adjustable: true,
            },
        );
        entries.insert(
            "base_price",
            FieldEntry {
                column: SnapshotCol::BasePrice,
                adjustable: true,
            },
        );
        entries.insert(
            "price_change",
            FieldEntry {
                column: SnapshotCol::PriceChange,
                adjustable: false,
            },
        );
        entries.insert(
            "volume",
            FieldEntry {
                column: SnapshotCol::TradedVolume,
                adjustable: false,
            },
        );
        entries.insert(
            "value",
            FieldEntry {
                column: SnapshotCol::TradedValue,
                adjustable: false,
            },
        );
        entries.insert(
            "liquidity_rank",
            FieldEntry {
                column: SnapshotCol::LiquidityRank,
                adjustable: false,
            },
        );
        Self { entries }
    }
}

impl FieldRegistry {
    pub fn resolve(&self, field: &str) -> KrxResult<FieldEntry> {
        self.entries.get(field).copied().ok_or_else(|| {
            let mut known: Vec<&str> = self.entries.keys().copied().collect();
            known.sort();
            KrxError::Registry {
                field: field.to_string(),
                known: known.join(", "),
            }
        })
    }
}
