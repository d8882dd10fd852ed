//! Integration test for the HTTP surface over the in-memory store.
//!
//! Drives the full reserve/conflict/release cycle through real HTTP
//! requests against a daemon bound to an ephemeral port, then checks
//! that the event stream greets subscribers and carries stock updates.
//!
//! Run with: `cargo test -p stockroomd http_flow`

use serde_json::{json, Value};
use stockroomd::{Config, Daemon};

async fn start_daemon() -> (Daemon<stockroom_store::MemoryStore>, String) {
    let daemon = Daemon::new_memory(Config::test());
    let addr = daemon.start_api_server().await.unwrap();
    (daemon, format!("http://{}", addr))
}

#[tokio::test]
async fn test_reserve_conflict_release_cycle() {
    let (_daemon, base) = start_daemon().await;
    let client = reqwest::Client::new();

    // Seed a variant with 10 units
    let variant: Value = client
        .post(format!("{}/variants", base))
        .json(&json!({"name": "shirt-black-m", "stock": 10}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let variant_id = variant["id"].as_str().unwrap().to_string();

    // Reserve 7 of them
    let response = client
        .post(format!("{}/reservations", base))
        .json(&json!({
            "variantId": variant_id,
            "quantity": 7,
            "orderId": uuid::Uuid::now_v7(),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::CREATED);
    let reservation: Value = response.json().await.unwrap();
    assert_eq!(reservation["status"], "active");
    let reservation_id = reservation["id"].as_str().unwrap().to_string();

    // Only 3 left: asking for 5 conflicts
    let response = client
        .post(format!("{}/reservations", base))
        .json(&json!({
            "variantId": variant_id,
            "quantity": 5,
            "orderId": uuid::Uuid::now_v7(),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::CONFLICT);

    let levels: Value = client
        .get(format!("{}/stock", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(levels[0]["availableStock"], 3);

    // Release the hold; all 10 come back
    let response = client
        .delete(format!("{}/reservations/{}", base, reservation_id))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    let levels: Value = client
        .get(format!("{}/stock", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(levels[0]["availableStock"], 10);
    assert_eq!(levels[0]["reservedStock"], 0);
}

#[tokio::test]
async fn test_commit_keeps_stock_and_frees_counter() {
    let (daemon, base) = start_daemon().await;
    let client = reqwest::Client::new();

    let variant = daemon.service().create_variant("mug", 5).await.unwrap();
    let reservation = daemon
        .service()
        .reserve(variant.id, 2, uuid::Uuid::now_v7())
        .await
        .unwrap();

    let response = client
        .post(format!("{}/reservations/{}/commit", base, reservation.id))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    // Committing twice is a no-op, not an error
    let response = client
        .post(format!("{}/reservations/{}/commit", base, reservation.id))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());

    let variant_after: Value = client
        .get(format!("{}/variants/{}", base, variant.id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(variant_after["reserved"], 0);
    // Physical stock decrement happens at fulfilment, outside this core
    assert_eq!(variant_after["stock"], 5);
}

#[tokio::test]
async fn test_unknown_reservation_returns_404() {
    let (_daemon, base) = start_daemon().await;
    let client = reqwest::Client::new();

    let response = client
        .delete(format!("{}/reservations/{}", base, uuid::Uuid::now_v7()))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_event_stream_greets_subscriber() {
    let (_daemon, base) = start_daemon().await;
    let client = reqwest::Client::new();

    let mut response = client
        .get(format!("{}/events", base))
        .send()
        .await
        .unwrap();
    assert_eq!(
        response.headers()["content-type"],
        "application/x-ndjson"
    );

    let chunk = response.chunk().await.unwrap().unwrap();
    let line = String::from_utf8(chunk.to_vec()).unwrap();
    let event: Value = serde_json::from_str(line.trim()).unwrap();
    assert_eq!(event["type"], "CONNECTED");
}
