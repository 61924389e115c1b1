//! Sync lifecycle handlers: status, trigger, connection test.

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use service_core::error::AppError;

use crate::models::{SyncStatusRecord, SYNC_ENTITY_INVOICES};
use crate::services::SyncEngine;
use crate::startup::AppState;

/// Current sync status for the invoice mirror. A record that has never
/// completed a run reports `pending` with a null `last_synced_utc`, which is
/// how callers distinguish never-synced from synced-but-stale.
#[derive(Debug, Serialize)]
pub struct SyncStatusResponse {
    pub entity: String,
    pub state: String,
    pub last_synced_utc: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub records_synced: i32,
    pub updated_utc: DateTime<Utc>,
}

impl From<SyncStatusRecord> for SyncStatusResponse {
    fn from(r: SyncStatusRecord) -> Self {
        Self {
            entity: r.entity,
            state: r.state,
            last_synced_utc: r.last_synced_utc,
            last_error: r.last_error,
            records_synced: r.records_synced,
            updated_utc: r.updated_utc,
        }
    }
}

/// Counts reported by a completed sync run.
#[derive(Debug, Serialize)]
pub struct SyncOutcomeResponse {
    pub records_synced: u32,
    pub customers_linked: u32,
    pub unmatched_invoices: u32,
}

#[derive(Debug, Serialize)]
pub struct ConnectionCheckResponse {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Get the sync status record for the invoice mirror.
pub async fn get_status(
    State(state): State<AppState>,
) -> Result<Json<SyncStatusResponse>, AppError> {
    let record = state
        .db
        .get_sync_status(SYNC_ENTITY_INVOICES)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!(
                "Sync status for '{}' is not seeded",
                SYNC_ENTITY_INVOICES
            ))
        })?;

    if record.state().is_none() {
        return Err(AppError::DatabaseError(anyhow::anyhow!(
            "Sync status for '{}' holds unknown state '{}'",
            SYNC_ENTITY_INVOICES,
            record.state
        )));
    }

    Ok(Json(record.into()))
}

/// Trigger one full invoice sync and report its outcome counts.
///
/// Returns 409 when a run is already in progress. The run itself executes on
/// a spawned task, so a caller disconnecting mid-run cannot cancel it
/// half-way and strand the status record in `syncing`.
pub async fn trigger_sync(
    State(state): State<AppState>,
) -> Result<Json<SyncOutcomeResponse>, AppError> {
    tracing::info!("Invoice sync triggered");

    let engine = SyncEngine::new(
        state.db.clone(),
        state.ledger.clone(),
        state.config.sync.stale_after_secs,
    );

    let outcome = tokio::spawn(async move { engine.run().await })
        .await
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("Sync task failed: {}", e)))??;

    Ok(Json(SyncOutcomeResponse {
        records_synced: outcome.records_synced,
        customers_linked: outcome.customers_linked,
        unmatched_invoices: outcome.unmatched_invoices,
    }))
}

/// Verify ledger credentials and reachability without performing a sync.
pub async fn test_connection(State(state): State<AppState>) -> Json<ConnectionCheckResponse> {
    let engine = SyncEngine::new(
        state.db.clone(),
        state.ledger.clone(),
        state.config.sync.stale_after_secs,
    );

    match engine.test_connection().await {
        Ok(()) => Json(ConnectionCheckResponse {
            connected: true,
            error: None,
        }),
        Err(e) => {
            tracing::warn!(error = %e, "Ledger connection test failed");
            Json(ConnectionCheckResponse {
                connected: false,
                error: Some(e.to_string()),
            })
        }
    }
}
