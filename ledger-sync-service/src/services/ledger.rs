//! HTTP client for the external ledger's invoice API.
//!
//! The upstream paginates its invoice collection: each response carries the
//! page number, the page size, and the number of the next page when one
//! exists. The fetch is all-or-nothing; a failure on any page aborts the
//! whole run so a partial invoice set is never imported.

use crate::config::LedgerConfig;
use crate::services::metrics::LEDGER_PAGE_DURATION;
use chrono::NaiveDate;
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use std::time::Duration;

/// Header carrying the ledger account identifier on every request.
pub const ACCOUNT_ID_HEADER: &str = "Ledger-Account-Id";

/// One invoice as reported by the ledger API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerInvoiceDto {
    /// Ledger-assigned invoice id; the natural key for the local mirror.
    pub id: i64,
    /// Ledger-assigned customer id.
    pub client_id: i64,
    /// Customer display name as the ledger currently knows it.
    pub client_name: String,
    /// Human-facing invoice number.
    pub number: String,
    /// Total invoiced amount.
    pub amount: Decimal,
    /// Amount still due.
    pub due_amount: Decimal,
    /// Lifecycle state reported by the ledger.
    pub status: String,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub paid_date: Option<NaiveDate>,
    pub subject: Option<String>,
    pub notes: Option<String>,
    pub currency: String,
}

/// One page of the upstream invoice collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoicePage {
    pub invoices: Vec<LedgerInvoiceDto>,
    pub page: u32,
    pub per_page: u32,
    /// `None` signals the last page.
    pub next_page: Option<u32>,
}

/// Client for the ledger's invoice collection.
#[derive(Clone)]
pub struct LedgerApiClient {
    client: Client,
    config: LedgerConfig,
}

impl LedgerApiClient {
    /// Create a new ledger client from explicit configuration.
    pub fn new(config: LedgerConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self { client, config })
    }

    /// Fetch a single page of invoices.
    async fn fetch_page(&self, page: u32, per_page: u32) -> Result<InvoicePage, AppError> {
        let url = format!("{}/invoices", self.config.api_base_url);

        let timer = std::time::Instant::now();
        let response = self
            .client
            .get(&url)
            .query(&[("page", page), ("per_page", per_page)])
            .bearer_auth(self.config.access_token.expose_secret())
            .header(ACCOUNT_ID_HEADER, &self.config.account_id)
            .send()
            .await
            .map_err(|e| {
                LEDGER_PAGE_DURATION
                    .with_label_values(&["transport_error"])
                    .observe(timer.elapsed().as_secs_f64());
                tracing::error!(page = page, error = %e, "Ledger page request failed");
                AppError::BadGateway(format!("Ledger request for page {} failed: {}", page, e))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            AppError::BadGateway(format!("Failed to read ledger response body: {}", e))
        })?;

        LEDGER_PAGE_DURATION
            .with_label_values(&[if status.is_success() { "ok" } else { "http_error" }])
            .observe(timer.elapsed().as_secs_f64());

        if !status.is_success() {
            tracing::error!(page = page, status = %status, body = %body, "Ledger returned non-success status");
            return Err(AppError::BadGateway(format!(
                "Ledger returned {} for page {}: {}",
                status, page, body
            )));
        }

        let parsed: InvoicePage = serde_json::from_str(&body).map_err(|e| {
            tracing::error!(page = page, error = %e, "Malformed ledger page");
            AppError::BadGateway(format!("Malformed ledger page {}: {}", page, e))
        })?;

        tracing::debug!(
            page = parsed.page,
            invoices = parsed.invoices.len(),
            next_page = ?parsed.next_page,
            "Fetched ledger page"
        );

        Ok(parsed)
    }

    /// Fetch every invoice the ledger reports, concatenated in page order.
    /// Any page failure aborts the whole fetch.
    pub async fn fetch_all_invoices(&self) -> Result<Vec<LedgerInvoiceDto>, AppError> {
        let mut invoices = Vec::new();
        let mut page = 1u32;

        loop {
            let fetched = self.fetch_page(page, self.config.page_size).await?;
            invoices.extend(fetched.invoices);

            match fetched.next_page {
                Some(next) if next > page => page = next,
                Some(next) => {
                    return Err(AppError::BadGateway(format!(
                        "Ledger pagination did not advance: page {} pointed to {}",
                        page, next
                    )));
                }
                None => break,
            }
        }

        tracing::info!(
            invoices = invoices.len(),
            pages = page,
            "Fetched full invoice set from ledger"
        );

        Ok(invoices)
    }

    /// Verify credentials and reachability with a minimal request; imports
    /// nothing.
    pub async fn test_connection(&self) -> Result<(), AppError> {
        self.fetch_page(1, 1).await.map(|_| ())
    }
}
