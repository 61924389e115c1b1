//! Domain models for ledger-sync-service.

#![allow(clippy::should_implement_trait)]

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;
use uuid::Uuid;

/// Entity category key for the invoice mirror in `sync_status`.
pub const SYNC_ENTITY_INVOICES: &str = "invoices";

// ============================================================================
// Customer Models
// ============================================================================

/// A CRM-owned customer. This service reads `display_name` / `organization`
/// for matching and writes only `ledger_customer_id`.
#[derive(Debug, Clone, FromRow)]
pub struct CustomerRecord {
    pub customer_id: Uuid,
    pub display_name: String,
    pub organization: Option<String>,
    pub ledger_customer_id: Option<i64>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

// ============================================================================
// Invoice Mirror Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoiceStatus {
    Draft,
    Open,
    Partial,
    Paid,
    Void,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Open => "open",
            Self::Partial => "partial",
            Self::Paid => "paid",
            Self::Void => "void",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "draft" => Self::Draft,
            "open" => Self::Open,
            "partial" => Self::Partial,
            "paid" => Self::Paid,
            "void" => Self::Void,
            _ => Self::Open,
        }
    }
}

/// Locally persisted copy of one ledger invoice, keyed by the ledger's own
/// invoice id.
#[derive(Debug, Clone, FromRow)]
pub struct LedgerInvoice {
    pub ledger_invoice_id: i64,
    pub ledger_customer_id: i64,
    pub ledger_customer_name: String,
    pub customer_id: Option<Uuid>,
    pub invoice_number: String,
    pub amount: Decimal,
    pub amount_due: Decimal,
    pub status: String,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub paid_date: Option<NaiveDate>,
    pub subject: Option<String>,
    pub notes: Option<String>,
    pub currency: String,
    pub synced_utc: DateTime<Utc>,
}

// ============================================================================
// Sync Status Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Pending,
    Syncing,
    Success,
    Error,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Syncing => "syncing",
            Self::Success => "success",
            Self::Error => "error",
        }
    }

    /// Parses a stored state string. Unlike the invoice status, an unknown
    /// value here is a corrupt record, not something to paper over.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "syncing" => Some(Self::Syncing),
            "success" => Some(Self::Success),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Legal transitions: a run enters `syncing` from any non-running state
    /// and leaves it for exactly one terminal state.
    pub fn can_transition_to(self, next: SyncState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Syncing)
                | (Self::Success, Self::Syncing)
                | (Self::Error, Self::Syncing)
                | (Self::Syncing, Self::Success)
                | (Self::Syncing, Self::Error)
        )
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct SyncStatusRecord {
    pub entity: String,
    pub state: String,
    pub last_synced_utc: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub records_synced: i32,
    pub updated_utc: DateTime<Utc>,
}

impl SyncStatusRecord {
    pub fn state(&self) -> Option<SyncState> {
        SyncState::parse(&self.state)
    }
}

// ============================================================================
// Aggregates and Run Outcome
// ============================================================================

/// One ledger customer whose imported invoices have no CRM link, with enough
/// context for an operator to decide whether it is worth resolving.
#[derive(Debug, Clone, FromRow)]
pub struct UnmatchedLedgerCustomer {
    pub ledger_customer_id: i64,
    pub ledger_customer_name: String,
    pub invoice_count: i64,
    pub total_amount: Decimal,
}

/// Counts reported by one completed sync run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub records_synced: u32,
    pub customers_linked: u32,
    pub unmatched_invoices: u32,
}
