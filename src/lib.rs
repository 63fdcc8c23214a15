// === Public Modules (The Canonical Paths) ===
pub mod config;
pub mod error;
pub mod events;
pub mod fetcher;
pub mod pipeline;
pub mod query;
pub mod schema;
pub mod store;

// === Private Implementation Details ===
mod io;

// === Facades (Re-exporting internals) ===
pub use crate::io::lock::AdvisoryLock;

// === Convenience ===
pub mod sorted_vec_map;

pub use crate::config::Config;
pub use crate::error::{KrxError, KrxResult};
pub use crate::fetcher::{Fetcher, RawRecord, RawValue};
pub use crate::pipeline::{Orchestrator, PrepareSummary};
pub use crate::query::{DataLoader, Universe};

#[cfg(test)]
pub(crate) mod test_support;
