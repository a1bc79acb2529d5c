// Not every test binary uses every helper.
#![allow(dead_code)]

use axum::http::StatusCode;
use lotledger::api::{self, AppState};
use lotledger::cache::SystemClock;
use lotledger::config::Config;
use lotledger::db::init_db;
use lotledger::domain::{Decimal, Mint, OpenLot, RawAmount, Strategy, TimeMs, UserId, WalletId};
use lotledger::oracle::MockOracle;
use lotledger::orchestration::{Reconciler, TradeService};
use lotledger::wallets::{InMemoryWalletDirectory, WalletInfo};
use lotledger::{IdempotencyLayer, Repository};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::util::ServiceExt;

pub struct TestApp {
    pub router: axum::Router,
    pub repo: Arc<Repository>,
    pub wallets: Arc<InMemoryWalletDirectory>,
    pub oracle: Arc<MockOracle>,
    _temp: TempDir,
}

pub fn test_config(db_path: String, armed: bool) -> Config {
    Config {
        port: 0,
        database_path: db_path,
        oracle_api_url: "http://example.invalid".to_string(),
        min_liquidity_usd: Decimal::from_str_canonical("1000").unwrap(),
        price_staleness_secs: 21_600,
        min_dust_usd: Decimal::from_str_canonical("0.01").unwrap(),
        min_import_usd: Decimal::from_str_canonical("1").unwrap(),
        idempotency_ttl_secs: 3600,
        mutation_timeout_secs: 5,
        mutation_max_retries: 1,
        automation_armed: armed,
        exclude_mints: vec!["So11111111111111111111111111111111111111112".to_string()],
    }
}

/// Router plus its collaborators; one wallet `w1` ("main") is registered for
/// the default user.
pub async fn setup_test_app_with(armed: bool) -> TestApp {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();

    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool));
    let config = test_config(db_path, armed);

    let wallets = Arc::new(InMemoryWalletDirectory::new());
    wallets.register_wallet(
        &UserId::new("default"),
        WalletInfo {
            id: WalletId::new("w1"),
            label: "main".to_string(),
            public_key: "pk-w1".to_string(),
        },
    );
    let oracle = Arc::new(MockOracle::new());

    let trader = Arc::new(TradeService::new(
        repo.clone(),
        oracle.clone(),
        wallets.clone(),
        config.clone(),
    ));
    let reconciler = Arc::new(Reconciler::new(
        repo.clone(),
        oracle.clone(),
        wallets.clone(),
        config.clone(),
    ));
    let idempotency = Arc::new(IdempotencyLayer::new(
        Duration::from_secs(config.idempotency_ttl_secs),
        Arc::new(SystemClock),
    ));

    let state = AppState::new(
        repo.clone(),
        config,
        trader,
        reconciler,
        idempotency,
    );
    TestApp {
        router: api::create_router(state),
        repo,
        wallets,
        oracle,
        _temp: temp_dir,
    }
}

pub async fn setup_test_app() -> TestApp {
    setup_test_app_with(false).await
}

/// Issue one request and decode the JSON body.
pub async fn send(
    router: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
    idempotency_key: Option<&str>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = axum::http::Request::builder().method(method).uri(uri);
    if let Some(key) = idempotency_key {
        builder = builder.header("Idempotency-Key", key);
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(axum::body::Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(axum::body::Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, json)
}

/// An open lot seeded directly into the repository.
pub fn seeded_lot(mint: &str, acquired: u128, cost: u128, created_ms: i64) -> OpenLot {
    OpenLot {
        id: 0,
        wallet_id: WalletId::new("w1"),
        mint: Mint::new(mint),
        cost: RawAmount(cost),
        acquired_quantity: RawAmount(acquired),
        closed_quantity: RawAmount::ZERO,
        decimals: 9,
        strategy: Strategy::new("manual"),
        entry_price: Decimal::from_str_canonical("0.5").unwrap(),
        entry_price_usd: Decimal::from_str_canonical("1").unwrap(),
        created_at: TimeMs::new(created_ms),
        extensions: None,
    }
}
