//! Services module for ledger-sync-service.

pub mod database;
pub mod ledger;
pub mod matching;
pub mod metrics;
pub mod sync;

pub use database::Database;
pub use ledger::{InvoicePage, LedgerApiClient, LedgerInvoiceDto};
pub use matching::{find_match, normalize_name, MatchCache};
pub use metrics::{get_metrics, init_metrics, record_error, record_sync_run};
pub use sync::SyncEngine;
