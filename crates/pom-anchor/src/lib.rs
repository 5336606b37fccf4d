//! Anchor Store Client: commits fingerprint/owner bindings to a ledger
//!
//! - `ledger`: the `Ledger` collaborator trait
//! - `memory`: hash-chained in-process ledger with balance and fault injection
//! - `http`: JSON/HTTP ledger
//! - `client`: `AnchorClient::submit_anchor` with ledger reconciliation
pub mod client;
pub mod http;
pub mod ledger;
pub mod memory;

pub use client::AnchorClient;
pub use http::HttpLedger;
pub use ledger::{Ledger, LedgerEntry};
pub use memory::InMemoryLedger;

use pom_core::config::LedgerConfig;
use pom_core::ProofError;
use std::sync::Arc;
use std::time::Duration;

/// Build the configured ledger backend.
pub fn ledger_from_config(config: &LedgerConfig, timeout: Duration) -> Result<Arc<dyn Ledger>, ProofError> {
    let ledger: Arc<dyn Ledger> = match config {
        LedgerConfig::Memory {
            initial_balance,
            commit_fee,
        } => Arc::new(InMemoryLedger::new(*initial_balance, *commit_fee)),
        LedgerConfig::Http { endpoint } => Arc::new(HttpLedger::new(endpoint, timeout)?),
    };
    tracing::info!(ledger = ledger.name(), "ledger configured");
    Ok(ledger)
}
