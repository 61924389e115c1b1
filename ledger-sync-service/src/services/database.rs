//! Database service for ledger-sync-service.

use crate::models::{
    CustomerRecord, InvoiceStatus, LedgerInvoice, SyncStatusRecord, UnmatchedLedgerCustomer,
};
use crate::services::ledger::LedgerInvoiceDto;
use crate::services::metrics::DB_QUERY_DURATION;
use chrono::{Duration as ChronoDuration, Utc};
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "ledger-sync-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // =========================================================================
    // Customer Operations
    // =========================================================================

    /// Read the full customer snapshot in ascending id order. The order is
    /// what makes first-match-wins matching deterministic.
    #[instrument(skip(self))]
    pub async fn list_customers(&self) -> Result<Vec<CustomerRecord>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_customers"])
            .start_timer();

        let customers = sqlx::query_as::<_, CustomerRecord>(
            r#"
            SELECT customer_id, display_name, organization, ledger_customer_id, created_utc, updated_utc
            FROM customers
            ORDER BY customer_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list customers: {}", e)))?;

        timer.observe_duration();

        Ok(customers)
    }

    #[instrument(skip(self), fields(customer_id = %customer_id))]
    pub async fn get_customer(&self, customer_id: Uuid) -> Result<Option<CustomerRecord>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_customer"])
            .start_timer();

        let customer = sqlx::query_as::<_, CustomerRecord>(
            r#"
            SELECT customer_id, display_name, organization, ledger_customer_id, created_utc, updated_utc
            FROM customers
            WHERE customer_id = $1
            "#,
        )
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get customer: {}", e)))?;

        timer.observe_duration();

        Ok(customer)
    }

    /// Store the resolved ledger customer id on a customer record. The only
    /// customer field this service ever writes.
    #[instrument(skip(self), fields(customer_id = %customer_id, ledger_customer_id = ledger_customer_id))]
    pub async fn set_customer_ledger_link(
        &self,
        customer_id: Uuid,
        ledger_customer_id: i64,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["set_customer_ledger_link"])
            .start_timer();

        sqlx::query(
            r#"
            UPDATE customers
            SET ledger_customer_id = $2,
                updated_utc = NOW()
            WHERE customer_id = $1
            "#,
        )
        .bind(customer_id)
        .bind(ledger_customer_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to set customer ledger link: {}", e))
        })?;

        timer.observe_duration();
        info!(customer_id = %customer_id, ledger_customer_id, "Customer linked to ledger id");

        Ok(())
    }

    /// Manual-link variant: sets the ledger link only when none is stored,
    /// so an operator action never silently overwrites an automatic match.
    #[instrument(skip(self), fields(customer_id = %customer_id, ledger_customer_id = ledger_customer_id))]
    pub async fn set_customer_ledger_link_if_absent(
        &self,
        customer_id: Uuid,
        ledger_customer_id: i64,
    ) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["set_customer_ledger_link_if_absent"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE customers
            SET ledger_customer_id = $2,
                updated_utc = NOW()
            WHERE customer_id = $1 AND ledger_customer_id IS NULL
            "#,
        )
        .bind(customer_id)
        .bind(ledger_customer_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to set customer ledger link: {}", e))
        })?;

        timer.observe_duration();

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Invoice Mirror Operations
    // =========================================================================

    /// Insert-or-update the mirror row for one ledger invoice in a single
    /// atomic statement keyed on the ledger invoice id. Every mutable field
    /// is overwritten and the sync timestamp refreshed; repeated imports of
    /// the same id can never produce a duplicate.
    #[instrument(skip(self, dto), fields(ledger_invoice_id = dto.id))]
    pub async fn upsert_invoice(
        &self,
        dto: &LedgerInvoiceDto,
        customer_id: Option<Uuid>,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["upsert_invoice"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO ledger_invoices (
                ledger_invoice_id, ledger_customer_id, ledger_customer_name, customer_id,
                invoice_number, amount, amount_due, status,
                issue_date, due_date, paid_date, subject, notes, currency, synced_utc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, NOW())
            ON CONFLICT (ledger_invoice_id) DO UPDATE SET
                ledger_customer_id = EXCLUDED.ledger_customer_id,
                ledger_customer_name = EXCLUDED.ledger_customer_name,
                customer_id = EXCLUDED.customer_id,
                invoice_number = EXCLUDED.invoice_number,
                amount = EXCLUDED.amount,
                amount_due = EXCLUDED.amount_due,
                status = EXCLUDED.status,
                issue_date = EXCLUDED.issue_date,
                due_date = EXCLUDED.due_date,
                paid_date = EXCLUDED.paid_date,
                subject = EXCLUDED.subject,
                notes = EXCLUDED.notes,
                currency = EXCLUDED.currency,
                synced_utc = NOW()
            "#,
        )
        .bind(dto.id)
        .bind(dto.client_id)
        .bind(&dto.client_name)
        .bind(customer_id)
        .bind(&dto.number)
        .bind(dto.amount)
        .bind(dto.due_amount)
        .bind(InvoiceStatus::from_str(&dto.status).as_str())
        .bind(dto.issue_date)
        .bind(dto.due_date)
        .bind(dto.paid_date)
        .bind(&dto.subject)
        .bind(&dto.notes)
        .bind(&dto.currency)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to upsert invoice: {}", e)))?;

        timer.observe_duration();

        Ok(())
    }

    #[instrument(skip(self), fields(ledger_invoice_id = ledger_invoice_id))]
    pub async fn get_invoice(
        &self,
        ledger_invoice_id: i64,
    ) -> Result<Option<LedgerInvoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice"])
            .start_timer();

        let invoice = sqlx::query_as::<_, LedgerInvoice>(
            r#"
            SELECT ledger_invoice_id, ledger_customer_id, ledger_customer_name, customer_id,
                   invoice_number, amount, amount_due, status,
                   issue_date, due_date, paid_date, subject, notes, currency, synced_utc
            FROM ledger_invoices
            WHERE ledger_invoice_id = $1
            "#,
        )
        .bind(ledger_invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get invoice: {}", e)))?;

        timer.observe_duration();

        Ok(invoice)
    }

    /// Ledger customers with imported invoices but no CRM link, aggregated so
    /// an operator can resolve the highest-value mismatches first.
    #[instrument(skip(self))]
    pub async fn list_unmatched_customers(
        &self,
    ) -> Result<Vec<UnmatchedLedgerCustomer>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_unmatched_customers"])
            .start_timer();

        let unmatched = sqlx::query_as::<_, UnmatchedLedgerCustomer>(
            r#"
            SELECT ledger_customer_id,
                   MIN(ledger_customer_name) AS ledger_customer_name,
                   COUNT(*) AS invoice_count,
                   SUM(amount) AS total_amount
            FROM ledger_invoices
            WHERE customer_id IS NULL
            GROUP BY ledger_customer_id
            ORDER BY SUM(amount) DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list unmatched customers: {}", e))
        })?;

        timer.observe_duration();

        Ok(unmatched)
    }

    /// Point every imported invoice for a ledger customer at the given CRM
    /// customer. Returns the number of invoices updated.
    #[instrument(skip(self), fields(ledger_customer_id = ledger_customer_id, customer_id = %customer_id))]
    pub async fn link_invoices_for_ledger_customer(
        &self,
        ledger_customer_id: i64,
        customer_id: Uuid,
    ) -> Result<u64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["link_invoices_for_ledger_customer"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE ledger_invoices
            SET customer_id = $2
            WHERE ledger_customer_id = $1
            "#,
        )
        .bind(ledger_customer_id)
        .bind(customer_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to link invoices: {}", e)))?;

        timer.observe_duration();

        Ok(result.rows_affected())
    }

    /// Single-invoice override, independent of the bulk link path.
    #[instrument(skip(self), fields(ledger_invoice_id = ledger_invoice_id, customer_id = %customer_id))]
    pub async fn link_single_invoice(
        &self,
        ledger_invoice_id: i64,
        customer_id: Uuid,
    ) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["link_single_invoice"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE ledger_invoices
            SET customer_id = $2
            WHERE ledger_invoice_id = $1
            "#,
        )
        .bind(ledger_invoice_id)
        .bind(customer_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to link invoice: {}", e)))?;

        timer.observe_duration();

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Sync Status Operations
    // =========================================================================

    #[instrument(skip(self))]
    pub async fn get_sync_status(
        &self,
        entity: &str,
    ) -> Result<Option<SyncStatusRecord>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_sync_status"])
            .start_timer();

        let record = sqlx::query_as::<_, SyncStatusRecord>(
            r#"
            SELECT entity, state, last_synced_utc, last_error, records_synced, updated_utc
            FROM sync_status
            WHERE entity = $1
            "#,
        )
        .bind(entity)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get sync status: {}", e)))?;

        timer.observe_duration();

        Ok(record)
    }

    /// Transition the status record to `syncing`, acting as the exclusive
    /// run lock. The conditional WHERE mirrors `SyncState::can_transition_to`:
    /// any non-running state may enter `syncing`; a record already `syncing`
    /// blocks the trigger unless it has gone stale.
    #[instrument(skip(self))]
    pub async fn begin_sync(&self, entity: &str, stale_after_secs: i64) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["begin_sync"])
            .start_timer();

        let stale_cutoff = Utc::now() - ChronoDuration::seconds(stale_after_secs);

        let result = sqlx::query(
            r#"
            UPDATE sync_status
            SET state = 'syncing',
                last_error = NULL,
                updated_utc = NOW()
            WHERE entity = $1
              AND (state <> 'syncing' OR updated_utc < $2)
            "#,
        )
        .bind(entity)
        .bind(stale_cutoff)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to begin sync: {}", e)))?;

        timer.observe_duration();

        if result.rows_affected() == 0 {
            // Either the seeded row is missing or another run holds (or just
            // released) the lock; both mean this trigger must not proceed.
            match self.get_sync_status(entity).await? {
                Some(_) => Err(AppError::Conflict(anyhow::anyhow!(
                    "A sync for '{}' is already running",
                    entity
                ))),
                None => Err(AppError::DatabaseError(anyhow::anyhow!(
                    "Sync status row for '{}' is not seeded",
                    entity
                ))),
            }
        } else {
            info!(entity, "Sync started");
            Ok(())
        }
    }

    /// Terminal transition `syncing -> success`, recording the run counts.
    #[instrument(skip(self))]
    pub async fn finish_sync_success(
        &self,
        entity: &str,
        records_synced: i32,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["finish_sync_success"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE sync_status
            SET state = 'success',
                last_synced_utc = NOW(),
                last_error = NULL,
                records_synced = $2,
                updated_utc = NOW()
            WHERE entity = $1 AND state = 'syncing'
            "#,
        )
        .bind(entity)
        .bind(records_synced)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to finish sync: {}", e)))?;

        timer.observe_duration();

        if result.rows_affected() == 0 {
            return Err(AppError::DatabaseError(anyhow::anyhow!(
                "Illegal sync transition: '{}' was not in 'syncing'",
                entity
            )));
        }

        info!(entity, records_synced, "Sync completed");
        Ok(())
    }

    /// Terminal transition `syncing -> error`, capturing the failure message
    /// verbatim for operator diagnosis.
    #[instrument(skip(self, message))]
    pub async fn finish_sync_error(&self, entity: &str, message: &str) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["finish_sync_error"])
            .start_timer();

        let result = sqlx::query(
            r#"
            UPDATE sync_status
            SET state = 'error',
                last_error = $2,
                updated_utc = NOW()
            WHERE entity = $1 AND state = 'syncing'
            "#,
        )
        .bind(entity)
        .bind(message)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to record sync error: {}", e)))?;

        timer.observe_duration();

        if result.rows_affected() == 0 {
            return Err(AppError::DatabaseError(anyhow::anyhow!(
                "Illegal sync transition: '{}' was not in 'syncing'",
                entity
            )));
        }

        info!(entity, "Sync failed");
        Ok(())
    }
}
