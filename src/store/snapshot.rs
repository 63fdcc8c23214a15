use chrono::NaiveDate;

use crate::{
    error::{KrxError, KrxResult},
    fetcher::{RawRecord, RawValue},
};

/// One (trading_date, security_id) observation, fully typed and validated.
/// `C1`'s only job is producing this from a `RawRecord`; everything
/// downstream operates on `SnapshotRow` only (spec §9's "typed row struct at
/// the ingestion boundary").
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRow {
    pub security_id: String,
    pub symbol: String,
    pub name: String,
    pub market: String,
    pub base_price: i64,
    pub close_price: i64,
    pub price_change: i64,
    pub traded_volume: i64,
    pub traded_value: i64,
    pub fluctuation_rate: String,
    pub fluctuation_type: String,
    /// Null until S2 runs.
    pub adjustment_factor: Option<f64>,
    /// Null until S3 runs.
    pub liquidity_rank: Option<u32>,
}

const REQUIRED_STRING_FIELDS: &[&str] = &[
    "security_id",
    "symbol",
    "name",
    "market",
    "fluctuation_rate",
    "fluctuation_type",
];

impl SnapshotRow {
    /// Decodes one upstream record. Unknown fields are ignored; a missing
    /// required field is a fatal `PayloadError` for that record (spec §4.1).
    pub fn decode(date: NaiveDate, record: &RawRecord) -> KrxResult<Self> {
        let get_str = |key: &str| -> KrxResult<String> {
            match record.get(key) {
                Some(RawValue::Str(s)) => Ok(s.clone()),
                Some(RawValue::Int(n)) => Ok(n.to_string()),
                None => Err(missing(date, record, key)),
            }
        };

        for key in REQUIRED_STRING_FIELDS {
            if !record.contains_key(*key) {
                return Err(missing(date, record, key));
            }
        }

        Ok(Self {
            security_id: get_str("security_id")?,
            symbol: get_str("symbol")?,
            name: get_str("name")?,
            market: get_str("market")?,
            base_price: parse_number(date, record, "base_price")?,
            close_price: parse_number(date, record, "close_price")?,
            price_change: parse_number(date, record, "price_change")?,
            traded_volume: parse_number(date, record, "traded_volume")?,
            traded_value: parse_number(date, record, "traded_value")?,
            fluctuation_rate: get_str("fluctuation_rate")?,
            fluctuation_type: get_str("fluctuation_type")?,
            adjustment_factor: None,
            liquidity_rank: None,
        })
    }
}

fn missing(date: NaiveDate, record: &RawRecord, key: &str) -> KrxError {
    let security_id = match record.get("security_id") {
        Some(RawValue::Str(s)) => s.clone(),
        Some(RawValue::Int(n)) => n.to_string(),
        None => "<unknown>".to_string(),
    };
    KrxError::Payload {
        date: date.to_string(),
        security_id,
        msg: format!("missing required field '{key}'"),
    }
}

/// Upstream numeric fields arrive as locale-formatted strings with thousands
/// separators, or occasionally already as integers; strip separators and
/// parse to a signed 64-bit integer (spec §4.1).
fn parse_number(date: NaiveDate, record: &RawRecord, key: &str) -> KrxResult<i64> {
    match record.get(key) {
        Some(RawValue::Int(n)) => Ok(*n),
        Some(RawValue::Str(s)) => {
            let stripped: String = s.chars().filter(|c| *c != ',').collect();
            let stripped = stripped.trim();
            stripped.parse::<i64>().map_err(|e| KrxError::Payload {
                date: date.to_string(),
                security_id: record
                    .get("security_id")
                    .map(|v| match v {
                        RawValue::Str(s) => s.clone(),
                        RawValue::Int(n) => n.to_string(),
                    })
                    .unwrap_or_else(|| "<unknown>".to_string()),
                msg: format!("field '{key}' is not a valid integer ('{s}'): {e}"),
            })
        }
        None => Err(missing(date, record, key)),
    }
}
