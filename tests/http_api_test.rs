mod common;

use axum::{body, http::Method};
use serde_json::{json, Value};
use uuid::Uuid;

use common::TestCtx;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read response body");
    serde_json::from_slice(&bytes).expect("response body was not json")
}

#[tokio::test]
async fn health_and_status_need_no_auth() {
    let ctx = TestCtx::new().await;

    let response = ctx.request(Method::GET, "/api/v1/health", None, None).await;
    assert_eq!(response.status(), 200);

    let response = ctx.request(Method::GET, "/api/v1/status", None, None).await;
    assert_eq!(response.status(), 200);
    let json = body_json(response).await;
    assert_eq!(json["success"], json!(true));
}

#[tokio::test]
async fn order_routes_reject_missing_or_garbage_tokens() {
    let ctx = TestCtx::new().await;

    let response = ctx.request(Method::GET, "/api/v1/orders", None, None).await;
    assert_eq!(response.status(), 401);

    let response = ctx
        .request(Method::GET, "/api/v1/orders", None, Some("not-a-jwt"))
        .await;
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn draft_creation_over_http_returns_the_envelope() {
    let ctx = TestCtx::new().await;
    ctx.seed_reference().await;
    let user = Uuid::new_v4();
    ctx.seed_address(user).await;
    let token = ctx.token_for(user);

    let response = ctx
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(json!({ "service_id": 1, "clothes_count": 20 })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), 200);

    let json = body_json(response).await;
    assert_eq!(json["success"], json!(true));
    let order_id = json["data"]["order_id"]
        .as_str()
        .expect("order_id missing from response");
    Uuid::parse_str(order_id).expect("order_id was not a uuid");
}

#[tokio::test]
async fn validation_failures_map_to_400_with_a_message() {
    let ctx = TestCtx::new().await;
    ctx.seed_reference().await;
    let user = Uuid::new_v4();
    ctx.seed_address(user).await;
    let token = ctx.token_for(user);

    let response = ctx
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(json!({ "service_id": 1, "clothes_count": 3 })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), 400);

    let json = body_json(response).await;
    assert!(json["message"]
        .as_str()
        .unwrap_or_default()
        .contains("Minimum 10"));
}

#[tokio::test]
async fn listing_accepts_every_date_range_token() {
    let ctx = TestCtx::new().await;
    ctx.seed_reference().await;
    let user = Uuid::new_v4();
    ctx.seed_address(user).await;
    let token = ctx.token_for(user);

    let (pickup, delivery) = ctx.far_schedule();
    let order_id = ctx.create_order(user, pickup, delivery).await;
    ctx.seed_advance_payment(order_id).await;

    for range in [
        "last_7_days",
        "last_30_days",
        "last_6_months",
        "last_year",
        "anytime",
    ] {
        let uri = format!("/api/v1/orders?date_range={}", range);
        let response = ctx.request(Method::GET, &uri, None, Some(&token)).await;
        assert_eq!(response.status(), 200, "date_range={} was rejected", range);

        // The order was created moments ago, so every window includes it.
        let json = body_json(response).await;
        assert_eq!(json["data"]["total"], json!(1), "date_range={}", range);
        assert_eq!(
            json["data"]["orders"][0]["order_id"],
            json!(order_id.to_string()),
            "date_range={}",
            range
        );
    }

    let response = ctx
        .request(
            Method::GET,
            "/api/v1/orders?date_range=yesterday",
            None,
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn unknown_routes_fall_through_to_404() {
    let ctx = TestCtx::new().await;

    let response = ctx
        .request(Method::GET, "/api/v1/no-such-route", None, None)
        .await;
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn reference_data_is_readable_without_auth() {
    let ctx = TestCtx::new().await;
    ctx.seed_reference().await;

    let response = ctx.request(Method::GET, "/api/v1/services", None, None).await;
    assert_eq!(response.status(), 200);
    let json = body_json(response).await;
    assert_eq!(json["data"].as_array().map(Vec::len), Some(1));

    let response = ctx
        .request(Method::GET, "/api/v1/time-slots", None, None)
        .await;
    assert_eq!(response.status(), 200);
    let json = body_json(response).await;
    // The inactive slot is filtered out.
    assert_eq!(json["data"].as_array().map(Vec::len), Some(2));
}
