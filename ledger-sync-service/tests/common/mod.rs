//! Common test utilities for ledger-sync-service integration tests.

#![allow(dead_code)]

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use ledger_sync_service::config::{
    DatabaseConfig, LedgerConfig, SyncConfig, SyncServiceConfig,
};
use ledger_sync_service::services::{InvoicePage, LedgerInvoiceDto};
use ledger_sync_service::startup::Application;
use rust_decimal::Decimal;
use secrecy::Secret;
use serde::Deserialize;
use service_core::config::Config as CommonConfig;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::{Arc, Mutex, Once};
use uuid::Uuid;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,ledger_sync_service=debug,sqlx=warn")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub const TEST_TOKEN: &str = "test-token";
pub const TEST_ACCOUNT: &str = "acct-test";

// ============================================================================
// Fake ledger upstream
// ============================================================================

#[derive(Default)]
struct FakeLedgerState {
    invoices: Vec<LedgerInvoiceDto>,
    fail_on_page: Option<u32>,
    expected_token: String,
}

/// An in-process stand-in for the ledger API: serves the paginated invoice
/// collection, checks the credential headers, and can be told to fail a
/// specific page.
#[derive(Clone)]
pub struct FakeLedger {
    state: Arc<Mutex<FakeLedgerState>>,
}

impl FakeLedger {
    pub fn set_invoices(&self, invoices: Vec<LedgerInvoiceDto>) {
        self.state.lock().unwrap().invoices = invoices;
    }

    pub fn set_fail_on_page(&self, page: Option<u32>) {
        self.state.lock().unwrap().fail_on_page = page;
    }

    pub fn set_expected_token(&self, token: &str) {
        self.state.lock().unwrap().expected_token = token.to_string();
    }
}

#[derive(Deserialize)]
struct PageQuery {
    page: u32,
    per_page: u32,
}

async fn fake_invoices_endpoint(
    State(ledger): State<FakeLedger>,
    Query(query): Query<PageQuery>,
    headers: HeaderMap,
) -> Response {
    let state = ledger.state.lock().unwrap();

    let authorization = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let has_account = headers.contains_key("ledger-account-id");
    if authorization != format!("Bearer {}", state.expected_token) || !has_account {
        return (
            StatusCode::UNAUTHORIZED,
            "invalid ledger credentials".to_string(),
        )
            .into_response();
    }

    if state.fail_on_page == Some(query.page) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            "ledger exploded".to_string(),
        )
            .into_response();
    }

    let start = ((query.page - 1) * query.per_page) as usize;
    let end = (start + query.per_page as usize).min(state.invoices.len());
    let chunk = if start < state.invoices.len() {
        state.invoices[start..end].to_vec()
    } else {
        Vec::new()
    };
    let next_page = if end < state.invoices.len() {
        Some(query.page + 1)
    } else {
        None
    };

    Json(InvoicePage {
        invoices: chunk,
        page: query.page,
        per_page: query.per_page,
        next_page,
    })
    .into_response()
}

async fn spawn_fake_ledger() -> (FakeLedger, String) {
    let ledger = FakeLedger {
        state: Arc::new(Mutex::new(FakeLedgerState {
            expected_token: TEST_TOKEN.to_string(),
            ..Default::default()
        })),
    };

    let router = Router::new()
        .route("/invoices", get(fake_invoices_endpoint))
        .with_state(ledger.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind fake ledger listener");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    (ledger, format!("http://{}", addr))
}

// ============================================================================
// Test application
// ============================================================================

fn test_config(database_url: &str, ledger_url: &str) -> SyncServiceConfig {
    SyncServiceConfig {
        common: CommonConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        service_name: "ledger-sync-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: database_url.to_string(),
            max_connections: 2,
            min_connections: 1,
        },
        ledger: LedgerConfig {
            api_base_url: ledger_url.to_string(),
            access_token: Secret::new(TEST_TOKEN.to_string()),
            account_id: TEST_ACCOUNT.to_string(),
            // Small pages so a handful of invoices spans several pages.
            page_size: 2,
            request_timeout_secs: 5,
        },
        sync: SyncConfig {
            stale_after_secs: 1800,
        },
    }
}

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    pub db: PgPool,
    pub ledger: FakeLedger,
}

/// Spawn the application against TEST_DATABASE_URL and a fresh fake ledger,
/// and reset the shared tables so each test starts clean.
pub async fn spawn_app() -> TestApp {
    init_tracing();

    let database_url = std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must be set to run integration tests");

    let (ledger, ledger_url) = spawn_fake_ledger().await;

    let config = test_config(&database_url, &ledger_url);
    let app = Application::build(config)
        .await
        .expect("Failed to build application");
    let port = app.port();

    tokio::spawn(async move {
        app.run_until_stopped().await.ok();
    });

    let address = format!("http://127.0.0.1:{}", port);
    let client = reqwest::Client::new();

    // Wait for the server to accept connections.
    let mut attempts = 0;
    loop {
        match client.get(format!("{}/ready", address)).send().await {
            Ok(_) => break,
            Err(_) if attempts < 20 => {
                attempts += 1;
                tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
            }
            Err(e) => panic!("Server did not become ready after 20 attempts: {}", e),
        }
    }

    let db = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .expect("Failed to connect test pool");

    reset_database(&db).await;

    TestApp {
        address,
        client,
        db,
        ledger,
    }
}

pub async fn reset_database(pool: &PgPool) {
    sqlx::query("TRUNCATE ledger_invoices, customers")
        .execute(pool)
        .await
        .expect("Failed to truncate tables");

    sqlx::query(
        r#"
        UPDATE sync_status
        SET state = 'pending', last_synced_utc = NULL, last_error = NULL,
            records_synced = 0, updated_utc = NOW()
        WHERE entity = 'invoices'
        "#,
    )
    .execute(pool)
    .await
    .expect("Failed to reset sync status");
}

// ============================================================================
// Fixture helpers
// ============================================================================

pub async fn insert_customer(
    pool: &PgPool,
    display_name: &str,
    organization: Option<&str>,
) -> Uuid {
    let customer_id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO customers (customer_id, display_name, organization)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(customer_id)
    .bind(display_name)
    .bind(organization)
    .execute(pool)
    .await
    .expect("Failed to insert customer");

    customer_id
}

pub async fn customer_ledger_link(pool: &PgPool, customer_id: Uuid) -> Option<i64> {
    sqlx::query_scalar("SELECT ledger_customer_id FROM customers WHERE customer_id = $1")
        .bind(customer_id)
        .fetch_one(pool)
        .await
        .expect("Failed to read customer link")
}

pub async fn invoice_customer(pool: &PgPool, ledger_invoice_id: i64) -> Option<Uuid> {
    sqlx::query_scalar("SELECT customer_id FROM ledger_invoices WHERE ledger_invoice_id = $1")
        .bind(ledger_invoice_id)
        .fetch_one(pool)
        .await
        .expect("Failed to read invoice link")
}

pub async fn invoice_count(pool: &PgPool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM ledger_invoices")
        .fetch_one(pool)
        .await
        .expect("Failed to count invoices")
}

pub async fn set_sync_state(pool: &PgPool, state: &str, age_secs: i64) {
    sqlx::query(
        r#"
        UPDATE sync_status
        SET state = $1, updated_utc = NOW() - make_interval(secs => $2)
        WHERE entity = 'invoices'
        "#,
    )
    .bind(state)
    .bind(age_secs as f64)
    .execute(pool)
    .await
    .expect("Failed to set sync state");
}

pub fn ledger_invoice(
    id: i64,
    client_id: i64,
    client_name: &str,
    amount: &str,
) -> LedgerInvoiceDto {
    LedgerInvoiceDto {
        id,
        client_id,
        client_name: client_name.to_string(),
        number: format!("INV-{:04}", id),
        amount: amount.parse::<Decimal>().expect("bad amount"),
        due_amount: amount.parse::<Decimal>().expect("bad amount"),
        status: "open".to_string(),
        issue_date: NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(),
        due_date: NaiveDate::from_ymd_opt(2025, 5, 31),
        paid_date: None,
        subject: None,
        notes: None,
        currency: "USD".to_string(),
    }
}
