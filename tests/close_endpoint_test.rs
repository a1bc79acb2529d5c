mod common;

use axum::http::StatusCode;
use common::{seeded_lot, send, setup_test_app, setup_test_app_with};
use lotledger::domain::{Mint, RawAmount, WalletId};
use serde_json::json;

fn close_body(extra: serde_json::Value) -> serde_json::Value {
    let mut body = json!({
        "walletId": "w1",
        "exitPrice": 0.6,
        "exitPriceUsd": 1.2
    });
    body.as_object_mut()
        .unwrap()
        .extend(extra.as_object().unwrap().clone());
    body
}

#[tokio::test]
async fn test_fifo_consumes_oldest_lot_first() {
    let app = setup_test_app().await;
    // A at t=1000 and B at t=2000, 10 tokens each.
    app.repo
        .insert_lot(&seeded_lot("MintA", 10_000_000_000, 500, 1000))
        .await
        .unwrap();
    app.repo
        .insert_lot(&seeded_lot("MintA", 10_000_000_000, 500, 2000))
        .await
        .unwrap();

    // Closing 15 tokens must fully close A and leave B with 5.
    let (status, body) = send(
        &app.router,
        "PATCH",
        "/v1/close-lot/MintA",
        Some(close_body(json!({ "amount": "15000000000" }))),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], "15000000000");
    assert_eq!(body["fullySold"].as_array().unwrap().len(), 1);
    assert_eq!(body["partials"].as_array().unwrap().len(), 1);

    let open = app
        .repo
        .query_open_lots(&WalletId::new("w1"), Some(&Mint::new("MintA")), None)
        .await
        .unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].created_at.as_ms(), 2000);
    assert_eq!(open[0].remaining(), RawAmount(5_000_000_000));
}

#[tokio::test]
async fn test_close_hundred_percent() {
    let app = setup_test_app().await;
    app.repo
        .insert_lot(&seeded_lot("MintA", 1_000_000_000, 50, 1000))
        .await
        .unwrap();

    let (status, body) = send(
        &app.router,
        "PATCH",
        "/v1/close-lot/MintA",
        Some(close_body(json!({ "percent": 100 }))),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], "1000000000");

    let trades = app
        .repo
        .query_realized_trades(&WalletId::new("w1"), Some(&Mint::new("MintA")))
        .await
        .unwrap();
    assert_eq!(trades.len(), 1, "one aggregated trade per close request");
    assert_eq!(trades[0].closed_quantity, RawAmount(1_000_000_000));
}

#[tokio::test]
async fn test_close_without_open_lots_404() {
    let app = setup_test_app().await;
    let (status, body) = send(
        &app.router,
        "PATCH",
        "/v1/close-lot/MintA",
        Some(close_body(json!({ "percent": 100 }))),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "No matching open trades");
}

#[tokio::test]
async fn test_close_zero_percent_400() {
    let app = setup_test_app().await;
    app.repo
        .insert_lot(&seeded_lot("MintA", 1_000_000_000, 50, 1000))
        .await
        .unwrap();

    let (status, body) = send(
        &app.router,
        "PATCH",
        "/v1/close-lot/MintA",
        Some(close_body(json!({ "percent": 0 }))),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid sell amount");
}

#[tokio::test]
async fn test_close_without_target_400() {
    let app = setup_test_app().await;
    let (status, _) = send(
        &app.router,
        "PATCH",
        "/v1/close-lot/MintA",
        Some(close_body(json!({}))),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_tp_trigger_requires_arming() {
    let app = setup_test_app().await;
    app.repo
        .insert_lot(&seeded_lot("MintA", 1_000_000_000, 50, 1000))
        .await
        .unwrap();

    let (status, body) = send(
        &app.router,
        "PATCH",
        "/v1/close-lot/MintA",
        Some(close_body(json!({ "percent": 100, "triggerType": "tp" }))),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["needsArm"], true);
}

#[tokio::test]
async fn test_tp_trigger_allowed_when_armed() {
    let app = setup_test_app_with(true).await;
    app.repo
        .insert_lot(&seeded_lot("MintA", 1_000_000_000, 50, 1000))
        .await
        .unwrap();

    // Exit $1.2 vs entry $1: +20% gain, so the tp label sticks.
    let (status, body) = send(
        &app.router,
        "PATCH",
        "/v1/close-lot/MintA",
        Some(close_body(json!({ "percent": 100, "triggerType": "tp" }))),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["trigger"], "tp");
}

#[tokio::test]
async fn test_closed_never_exceeds_acquired() {
    let app = setup_test_app().await;
    app.repo
        .insert_lot(&seeded_lot("MintA", 1_000_000_000, 50, 1000))
        .await
        .unwrap();

    // Ask for far more than held; the ledger clamps at acquired.
    let (status, body) = send(
        &app.router,
        "PATCH",
        "/v1/close-lot/MintA",
        Some(close_body(json!({ "amount": "9000000000" }))),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], "1000000000");

    let open = app
        .repo
        .query_open_lots(&WalletId::new("w1"), None, None)
        .await
        .unwrap();
    assert!(open.is_empty());
}
