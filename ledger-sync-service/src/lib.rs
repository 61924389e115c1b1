//! Ledger Sync Service - mirrors invoices from the external ledger and
//! reconciles them against CRM customer records.

pub mod config;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;

pub use startup::AppState;
