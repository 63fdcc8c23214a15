use std::path::PathBuf;

use thiserror::Error;

pub type KrxResult<T> = Result<T, KrxError>;

/// The taxonomy a caller can match on. Mirrors the failure kinds a query or
/// a pipeline run can surface; orchestrator-level per-date failures are
/// collected into a `PrepareSummary` rather than propagated (see
/// `pipeline::orchestrator`).
#[derive(Debug, Error)]
pub enum KrxError {
    #[error("config error: {0}")]
    Config(String),

    #[error("fetch failed for {date}: {msg}")]
    Fetch { date: String, msg: String },

    #[error("payload error for {date}/{security_id}: {msg}")]
    Payload {
        date: String,
        security_id: String,
        msg: String,
    },

    #[error("store error at {path} during {stage}: {msg}")]
    Store {
        path: PathBuf,
        stage: String,
        msg: String,
    },

    #[error("corruption: partition {path} could not be decoded: {msg}")]
    Corruption { path: PathBuf, msg: String },

    #[error("window error: sub-window [{start}, {end}] lies outside loader window [{loader_start}, {loader_end}]")]
    Window {
        start: String,
        end: String,
        loader_start: String,
        loader_end: String,
    },

    #[error("unknown field '{field}'; known fields: {known}")]
    Registry { field: String, known: String },

    #[error("store busy: advisory lock held by pid {pid} since {since}")]
    Busy { pid: u32, since: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("decimal error: {0}")]
    Decimal(#[from] rust_decimal::Error),

    #[error("serde_json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl KrxError {
    pub fn store(path: impl Into<PathBuf>, stage: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Store {
            path: path.into(),
            stage: stage.into(),
            msg: msg.into(),
        }
    }

    pub fn corruption(path: impl Into<PathBuf>, msg: impl Into<String>) -> Self {
        Self::Corruption {
            path: path.into(),
            msg: msg.into(),
        }
    }
}
