use std::{collections::HashMap, future::Future};

use chrono::NaiveDate;

use crate::error::KrxResult;

/// A single upstream value: the payload arrives as an untyped string/number
/// map (spec §9's "dynamic dict-shaped records"). `C1` is the only consumer
/// that interprets these.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Str(String),
    Int(i64),
}

pub type RawRecord = HashMap<String, RawValue>;

/// The only seam the core has with networking. HTTP, retries, rate limits,
/// endpoint-catalog parsing, and scheduling are all the caller's
/// responsibility; they are expressed by wrapping an implementation of this
/// trait, never by this crate.
pub trait Fetcher: Send + Sync {
    /// Returns one record per listed symbol for `date`, or an empty vector
    /// if `date` was a non-trading day. Any other failure is surfaced to the
    /// caller as `KrxError::Fetch`.
    fn fetch_day(&self, date: NaiveDate) -> impl Future<Output = KrxResult<Vec<RawRecord>>> + Send;
}
