//! The invoice sync engine.
//!
//! One run: acquire the status lock, fetch the full invoice set from the
//! ledger, resolve each invoice's customer through the run-scoped match
//! cache, upsert each mirror row, then record the terminal outcome. The
//! fetch is all-or-nothing; upserts already written before a mid-loop
//! failure stay in place, so a failed run may still have imported some
//! invoices.

use crate::models::{SyncOutcome, SYNC_ENTITY_INVOICES};
use crate::services::database::Database;
use crate::services::ledger::LedgerApiClient;
use crate::services::matching::{find_match, MatchCache};
use crate::services::metrics::{
    record_customer_match, record_error, record_invoice_synced, record_sync_run,
};
use service_core::error::AppError;
use std::sync::Arc;

pub struct SyncEngine {
    db: Arc<Database>,
    ledger: LedgerApiClient,
    stale_after_secs: i64,
}

impl SyncEngine {
    pub fn new(db: Arc<Database>, ledger: LedgerApiClient, stale_after_secs: i64) -> Self {
        Self {
            db,
            ledger,
            stale_after_secs,
        }
    }

    /// Run one full invoice sync. Rejects with `Conflict` when another run
    /// holds the lock; any failure after acquisition transitions the status
    /// record to `error` with the captured message before returning.
    #[tracing::instrument(skip(self))]
    pub async fn run(&self) -> Result<SyncOutcome, AppError> {
        self.db
            .begin_sync(SYNC_ENTITY_INVOICES, self.stale_after_secs)
            .await?;

        match self.run_locked().await {
            Ok(outcome) => {
                self.db
                    .finish_sync_success(SYNC_ENTITY_INVOICES, outcome.records_synced as i32)
                    .await?;
                record_sync_run("success");
                tracing::info!(
                    records_synced = outcome.records_synced,
                    customers_linked = outcome.customers_linked,
                    unmatched_invoices = outcome.unmatched_invoices,
                    "Invoice sync succeeded"
                );
                Ok(outcome)
            }
            Err(e) => {
                record_sync_run("error");
                record_error("sync_run");
                tracing::error!(error = %e, "Invoice sync failed");
                // A failure here would strand the record in `syncing` until
                // the staleness takeover, so it is logged rather than
                // allowed to mask the original error.
                if let Err(status_err) = self
                    .db
                    .finish_sync_error(SYNC_ENTITY_INVOICES, &e.to_string())
                    .await
                {
                    tracing::error!(error = %status_err, "Failed to record sync error state");
                }
                Err(e)
            }
        }
    }

    /// The body of a run, executed while the status record is `syncing`.
    async fn run_locked(&self) -> Result<SyncOutcome, AppError> {
        let invoices = self.ledger.fetch_all_invoices().await?;

        let customers = self.db.list_customers().await?;
        let mut cache = MatchCache::new();
        cache.seed_from_customers(&customers);

        let mut outcome = SyncOutcome::default();

        for invoice in &invoices {
            // Resolve through the run cache: each distinct ledger customer
            // id runs the matcher at most once per run, and the stored-link
            // write below happens only on that first resolution.
            let resolved = match cache.get(invoice.client_id) {
                Some(cached) => {
                    record_customer_match("cached");
                    cached
                }
                None => match find_match(&invoice.client_name, &customers) {
                    Some(customer) => {
                        if customer.ledger_customer_id != Some(invoice.client_id) {
                            self.db
                                .set_customer_ledger_link(customer.customer_id, invoice.client_id)
                                .await?;
                            outcome.customers_linked += 1;
                        }
                        cache.insert(invoice.client_id, Some(customer.customer_id));
                        record_customer_match("matched");
                        Some(customer.customer_id)
                    }
                    None => {
                        cache.insert(invoice.client_id, None);
                        record_customer_match("unmatched");
                        None
                    }
                },
            };

            self.db.upsert_invoice(invoice, resolved).await?;
            record_invoice_synced(resolved.is_some());

            outcome.records_synced += 1;
            if resolved.is_none() {
                outcome.unmatched_invoices += 1;
            }
        }

        Ok(outcome)
    }

    /// Verify ledger credentials and reachability without importing.
    pub async fn test_connection(&self) -> Result<(), AppError> {
        self.ledger.test_connection().await
    }
}
