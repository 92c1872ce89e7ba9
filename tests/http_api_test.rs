mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use chrono::Utc;
use serde_json::{json, Value};
use tower::ServiceExt;

use atelier_api::payments::webhook::{sign_payload, SIGNATURE_HEADER};

use atelier_api::entities::discount::DiscountType;

use common::{
    seed_digital_product, seed_discount, seed_discount_detailed, spawn_router, WEBHOOK_SECRET,
};

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, payload: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(payload).unwrap()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn signed_webhook(payload: &Value) -> Request<Body> {
    let bytes = serde_json::to_vec(payload).unwrap();
    let signature = sign_payload(&bytes, WEBHOOK_SECRET, Utc::now().timestamp());
    Request::builder()
        .method("POST")
        .uri("/api/stripe/webhook")
        .header(header::CONTENT_TYPE, "application/json")
        .header(SIGNATURE_HEADER, signature)
        .body(Body::from(bytes))
        .unwrap()
}

#[tokio::test]
async fn health_reports_connected_database() {
    let (router, _app) = spawn_router().await;
    let response = router.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "connected");
}

#[tokio::test]
async fn empty_cart_is_a_bad_request() {
    let (router, _app) = spawn_router().await;
    let response = router
        .oneshot(post_json(
            "/api/checkout",
            &json!({ "items": [], "customerEmail": "buyer@example.com" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Bad Request");
}

#[tokio::test]
async fn unknown_order_is_not_found() {
    let (router, _app) = spawn_router().await;
    let response = router
        .oneshot(get(&format!("/api/orders/{}", uuid::Uuid::new_v4())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unsigned_webhook_is_unauthorized() {
    let (router, _app) = spawn_router().await;
    let response = router
        .oneshot(post_json(
            "/api/stripe/webhook",
            &json!({ "type": "checkout.session.completed", "data": { "object": {} } }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn signed_unknown_event_is_acknowledged() {
    let (router, _app) = spawn_router().await;
    let response = router
        .oneshot(signed_webhook(&json!({
            "id": "evt_1",
            "type": "invoice.created",
            "data": { "object": {} }
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["received"], true);
}

#[tokio::test]
async fn discount_validation_reports_each_failure_distinctly() {
    let (router, app) = spawn_router().await;
    seed_discount(&app.db, "WELCOME10", DiscountType::Percentage, 10, None).await;
    seed_discount_detailed(
        &app.db,
        "EXPIRED",
        DiscountType::Percentage,
        10,
        None,
        0,
        Some(Utc::now() - chrono::Duration::days(1)),
    )
    .await;
    seed_discount_detailed(&app.db, "CAPPED", DiscountType::Fixed, 500, Some(2), 2, None).await;

    let response = router
        .clone()
        .oneshot(get("/api/discounts/validate"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = router
        .clone()
        .oneshot(get("/api/discounts/validate?code=NOPE"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = router
        .clone()
        .oneshot(get("/api/discounts/validate?code=EXPIRED"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::GONE);

    let response = router
        .clone()
        .oneshot(get("/api/discounts/validate?code=CAPPED"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Lookup is case-insensitive, like checkout itself.
    let response = router
        .clone()
        .oneshot(get("/api/discounts/validate?code=welcome10"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["code"], "WELCOME10");
    assert_eq!(body["discountType"], "percentage");
    assert_eq!(body["value"], 10);
}

#[tokio::test]
async fn digital_purchase_flows_from_checkout_to_download() {
    let (router, app) = spawn_router().await;
    let print = seed_digital_product(
        &app.db,
        app.assets_dir.path(),
        "Harbor Print",
        4_000,
        "harbor-print.pdf",
        b"%PDF-1.4 fake print",
    )
    .await;

    // 1. Checkout over HTTP.
    let response = router
        .clone()
        .oneshot(post_json(
            "/api/checkout",
            &json!({
                "items": [{ "productId": print.id, "quantity": 1 }],
                "customerEmail": "buyer@example.com"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let checkout = body_json(response).await;
    let order_id = checkout["orderId"].as_str().unwrap().to_string();
    let session_id = checkout["sessionId"].as_str().unwrap().to_string();
    assert_eq!(checkout["summary"]["shippingCents"], 0);

    // 2. Downloads are gated until payment confirms.
    let response = router
        .clone()
        .oneshot(get(&format!(
            "/api/orders/{}/downloads?session_id={}",
            order_id, session_id
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // 3. Signed completion webhook reconciles the payment.
    let response = router
        .clone()
        .oneshot(signed_webhook(&json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": session_id,
                "payment_intent": "pi_test_1",
                "metadata": { "orderId": order_id, "hasDigitalItems": "true" },
                "customer_details": { "email": "buyer@example.com" }
            }}
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // 4. A mismatched session id never unlocks the listing.
    let response = router
        .clone()
        .oneshot(get(&format!(
            "/api/orders/{}/downloads?session_id=cs_wrong",
            order_id
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // 5. The right session id lists exactly one live link.
    let response = router
        .clone()
        .oneshot(get(&format!(
            "/api/orders/{}/downloads?session_id={}",
            order_id, session_id
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let listing = body_json(response).await;
    let downloads = listing["downloads"].as_array().unwrap();
    assert_eq!(downloads.len(), 1);
    let entry = &downloads[0];
    assert_eq!(entry["fileName"], "harbor-print.pdf");
    assert_eq!(entry["downloadCount"], 0);
    assert_eq!(entry["maxDownloads"], 5);
    assert!(entry["expiresAt"].is_string());
    let token = entry["token"].as_str().unwrap().to_string();
    assert_eq!(
        entry["url"].as_str().unwrap(),
        format!("{}/api/download/{}", common::APP_URL, token)
    );

    // 6. The token serves the asset bytes as an attachment.
    let response = router
        .clone()
        .oneshot(get(&format!("/api/download/{}", token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/pdf"
    );
    assert!(response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .contains("harbor-print.pdf"));
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"%PDF-1.4 fake print");

    // 7. An unknown token is a 404.
    let response = router
        .oneshot(get("/api/download/not-a-token"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
