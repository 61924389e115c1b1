//! HTTP handlers for ledger-sync-service.

pub mod links;
pub mod sync;
