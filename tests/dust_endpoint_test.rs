mod common;

use axum::http::StatusCode;
use common::{seeded_lot, send, setup_test_app};
use lotledger::domain::{Mint, TimeMs, Trigger, WalletId};
use lotledger::oracle::TokenQuote;
use lotledger::Decimal;
use serde_json::json;

fn quote(price: &str) -> TokenQuote {
    TokenQuote {
        price: Decimal::from_str_canonical(price).unwrap(),
        liquidity: Decimal::from_str_canonical("50000").unwrap(),
        update_unix_time: TimeMs::now().as_secs(),
    }
}

#[tokio::test]
async fn test_clear_dust_closes_only_dust_lots() {
    let app = setup_test_app().await;
    app.oracle.set_quote(Mint::new("MintA"), quote("2"));
    app.oracle.set_quote(Mint::new("DustMint"), quote("2"));
    // 1 token at $2 stays; 1e-6 tokens at $2 is under the $0.01 floor.
    app.repo
        .insert_lot(&seeded_lot("MintA", 1_000_000_000, 500, 1000))
        .await
        .unwrap();
    app.repo
        .insert_lot(&seeded_lot("DustMint", 1_000, 1, 1000))
        .await
        .unwrap();

    let (status, body) = send(
        &app.router,
        "POST",
        "/v1/clear-dust",
        Some(json!({ "walletId": "w1" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let cleared = body["cleared"].as_array().unwrap();
    assert_eq!(cleared.len(), 1);
    assert_eq!(cleared[0]["mint"], "DustMint");
    assert_eq!(cleared[0]["quantity"], "1000");

    let open = app
        .repo
        .query_open_lots(&WalletId::new("w1"), None, None)
        .await
        .unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].mint, Mint::new("MintA"));

    // The soft close leaves an audit trail with the dust trigger.
    let trades = app
        .repo
        .query_realized_trades(&WalletId::new("w1"), Some(&Mint::new("DustMint")))
        .await
        .unwrap();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].trigger, Some(Trigger::Dust));
}

#[tokio::test]
async fn test_clear_dust_second_run_is_noop() {
    let app = setup_test_app().await;
    app.repo
        .insert_lot(&seeded_lot("DustMint", 1_000, 1, 1000))
        .await
        .unwrap();

    let (status, body) = send(
        &app.router,
        "POST",
        "/v1/clear-dust",
        Some(json!({ "walletId": "w1" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cleared"].as_array().unwrap().len(), 1);

    let (status, body) = send(
        &app.router,
        "POST",
        "/v1/clear-dust",
        Some(json!({ "walletId": "w1" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["cleared"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_clear_dust_hard_delete_leaves_no_trade() {
    let app = setup_test_app().await;
    app.repo
        .insert_lot(&seeded_lot("DustMint", 1_000, 1, 1000))
        .await
        .unwrap();

    let (status, body) = send(
        &app.router,
        "POST",
        "/v1/clear-dust",
        Some(json!({ "walletId": "w1", "hardDelete": true })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cleared"].as_array().unwrap().len(), 1);

    let open = app
        .repo
        .query_open_lots(&WalletId::new("w1"), None, None)
        .await
        .unwrap();
    assert!(open.is_empty());
    let trades = app
        .repo
        .query_realized_trades(&WalletId::new("w1"), None)
        .await
        .unwrap();
    assert!(trades.is_empty());
}

#[tokio::test]
async fn test_clear_dust_custom_floor() {
    let app = setup_test_app().await;
    app.oracle.set_quote(Mint::new("MintA"), quote("2"));
    app.repo
        .insert_lot(&seeded_lot("MintA", 1_000_000_000, 500, 1000))
        .await
        .unwrap();

    // $2 position is dust under a $5 floor.
    let (status, body) = send(
        &app.router,
        "POST",
        "/v1/clear-dust",
        Some(json!({ "walletId": "w1", "minDustUsd": 5 })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cleared"].as_array().unwrap().len(), 1);
}
