//! Manual link handlers.
//!
//! The escape hatch for the conservative exact-match policy: an operator
//! resolves a ledger customer the normalizer could not, once, and every
//! later sync reuses the stored link without re-matching.

use axum::{
    extract::{Path, State},
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::models::UnmatchedLedgerCustomer;
use crate::startup::AppState;

/// One ledger customer with imported invoices and no CRM link.
#[derive(Debug, Serialize)]
pub struct UnmatchedCustomerResponse {
    pub ledger_customer_id: i64,
    pub ledger_customer_name: String,
    pub invoice_count: i64,
    pub total_amount: Decimal,
}

impl From<UnmatchedLedgerCustomer> for UnmatchedCustomerResponse {
    fn from(u: UnmatchedLedgerCustomer) -> Self {
        Self {
            ledger_customer_id: u.ledger_customer_id,
            ledger_customer_name: u.ledger_customer_name,
            invoice_count: u.invoice_count,
            total_amount: u.total_amount,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct LinkCustomerRequest {
    #[validate(range(min = 1))]
    pub ledger_customer_id: i64,
    pub customer_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct LinkCustomerResponse {
    pub invoices_updated: u64,
    /// False when the customer already carried a ledger link; a manual link
    /// never overwrites a prior automatic match.
    pub customer_link_set: bool,
}

#[derive(Debug, Deserialize)]
pub struct LinkInvoiceRequest {
    pub customer_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct LinkInvoiceResponse {
    pub ledger_invoice_id: i64,
    pub customer_id: Uuid,
}

/// List unmatched ledger customers, highest outstanding value first.
pub async fn unmatched_customers(
    State(state): State<AppState>,
) -> Result<Json<Vec<UnmatchedCustomerResponse>>, AppError> {
    let unmatched = state.db.list_unmatched_customers().await?;
    Ok(Json(unmatched.into_iter().map(Into::into).collect()))
}

/// Link a ledger customer to a CRM customer and retroactively attach every
/// already-imported invoice for that ledger customer.
pub async fn link_customer(
    State(state): State<AppState>,
    Json(payload): Json<LinkCustomerRequest>,
) -> Result<Json<LinkCustomerResponse>, AppError> {
    payload.validate()?;

    let customer = state
        .db
        .get_customer(payload.customer_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!(
                "Customer {} does not exist",
                payload.customer_id
            ))
        })?;

    let invoices_updated = state
        .db
        .link_invoices_for_ledger_customer(payload.ledger_customer_id, customer.customer_id)
        .await?;

    let customer_link_set = state
        .db
        .set_customer_ledger_link_if_absent(customer.customer_id, payload.ledger_customer_id)
        .await?;

    tracing::info!(
        ledger_customer_id = payload.ledger_customer_id,
        customer_id = %customer.customer_id,
        invoices_updated,
        customer_link_set,
        "Ledger customer manually linked"
    );

    Ok(Json(LinkCustomerResponse {
        invoices_updated,
        customer_link_set,
    }))
}

/// Override the customer link on a single imported invoice.
pub async fn link_invoice(
    State(state): State<AppState>,
    Path(ledger_invoice_id): Path<i64>,
    Json(payload): Json<LinkInvoiceRequest>,
) -> Result<Json<LinkInvoiceResponse>, AppError> {
    let invoice = state
        .db
        .get_invoice(ledger_invoice_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!(
                "Invoice {} has not been imported",
                ledger_invoice_id
            ))
        })?;

    let customer = state
        .db
        .get_customer(payload.customer_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!(
                "Customer {} does not exist",
                payload.customer_id
            ))
        })?;

    state
        .db
        .link_single_invoice(invoice.ledger_invoice_id, customer.customer_id)
        .await?;

    tracing::info!(
        ledger_invoice_id = invoice.ledger_invoice_id,
        ledger_customer_id = invoice.ledger_customer_id,
        customer_id = %customer.customer_id,
        "Invoice manually linked"
    );

    Ok(Json(LinkInvoiceResponse {
        ledger_invoice_id: invoice.ledger_invoice_id,
        customer_id: customer.customer_id,
    }))
}
