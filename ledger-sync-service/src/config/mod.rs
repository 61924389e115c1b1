//! Configuration module for ledger-sync-service.

use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone)]
pub struct SyncServiceConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub ledger: LedgerConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Credentials and endpoint for the external ledger API. Constructed here and
/// handed to the client explicitly, so tests can substitute a fake upstream
/// without touching process environment.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub api_base_url: String,
    pub access_token: Secret<String>,
    pub account_id: String,
    pub page_size: u32,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// A run stuck in `syncing` longer than this is presumed dead and its
    /// lock may be taken over by the next trigger.
    pub stale_after_secs: i64,
}

impl SyncServiceConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "ledger-sync-service".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required"))
                })?,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2),
            },
            ledger: LedgerConfig {
                api_base_url: env::var("LEDGER_API_URL").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("LEDGER_API_URL is required"))
                })?,
                access_token: Secret::new(env::var("LEDGER_ACCESS_TOKEN").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("LEDGER_ACCESS_TOKEN is required"))
                })?),
                account_id: env::var("LEDGER_ACCOUNT_ID").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("LEDGER_ACCOUNT_ID is required"))
                })?,
                page_size: env::var("LEDGER_PAGE_SIZE")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(100),
                request_timeout_secs: env::var("LEDGER_REQUEST_TIMEOUT_SECONDS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            },
            sync: SyncConfig {
                stale_after_secs: env::var("SYNC_STALE_AFTER_SECONDS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1800),
            },
        })
    }
}
