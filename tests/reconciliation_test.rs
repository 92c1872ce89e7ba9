mod common;

use sea_orm::EntityTrait;

use atelier_api::entities::download_token::Entity as DownloadToken;
use atelier_api::entities::order::{OrderStatus, PaymentStatus};
use atelier_api::entities::product::{Entity as Product, ProductStatus, ProductType};
use atelier_api::services::checkout::{CheckoutItem, CheckoutRequest, ShippingAddressInput};

use common::{
    completed_session_event, expired_session_event, payment_failed_event, seed_digital_product,
    seed_product, spawn_app, TestApp,
};

async fn checkout_mixed_cart(app: &TestApp) -> (uuid::Uuid, uuid::Uuid, uuid::Uuid, String) {
    let painting = seed_product(
        &app.db,
        "Harbor at Dusk",
        48_000,
        ProductType::Physical,
        ProductStatus::Active,
    )
    .await;
    let print = seed_digital_product(
        &app.db,
        app.assets_dir.path(),
        "Harbor Print",
        4_000,
        "harbor-print.pdf",
        b"%PDF-1.4 fake print",
    )
    .await;

    let response = app
        .services
        .checkout
        .checkout(CheckoutRequest {
            items: vec![
                CheckoutItem {
                    product_id: painting.id,
                    quantity: 1,
                },
                CheckoutItem {
                    product_id: print.id,
                    quantity: 1,
                },
            ],
            discount_code: None,
            customer_email: Some("buyer@example.com".into()),
            shipping_address: Some(ShippingAddressInput {
                name: "Jo Buyer".into(),
                line1: "1 Gallery Row".into(),
                line2: None,
                city: "Portland".into(),
                state: "OR".into(),
                postal_code: "97201".into(),
                country: "US".into(),
            }),
        })
        .await
        .unwrap();

    (response.order_id, painting.id, print.id, response.session_id)
}

#[tokio::test]
async fn completed_session_pays_order_sells_original_and_mints_token() {
    let app = spawn_app().await;
    let (order_id, painting_id, print_id, session_id) = checkout_mixed_cart(&app).await;

    app.services
        .reconciliation
        .process_event(completed_session_event(
            order_id,
            &session_id,
            Some("pi_test_9"),
            true,
        ))
        .await
        .unwrap();

    let order = app
        .services
        .orders
        .get_order(order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.payment_status, PaymentStatus::Paid);
    assert_eq!(order.payment_reference.as_deref(), Some("pi_test_9"));
    assert_eq!(order.payment_session_id.as_deref(), Some(session_id.as_str()));
    // Provider-collected contact data wins over the submitted snapshot.
    assert_eq!(order.email, "buyer@example.com");
    assert_eq!(order.name.as_deref(), Some("Jo Buyer"));

    let painting = Product::find_by_id(painting_id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(painting.status, ProductStatus::Sold);

    let tokens = app.services.downloads.list_for_order(order_id).await.unwrap();
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].product_id, print_id);
    assert_eq!(tokens[0].max_downloads, 5);
    assert_eq!(tokens[0].download_count, 0);

    // The sold original can never be checked out again.
    let err = app
        .services
        .checkout
        .checkout(CheckoutRequest {
            items: vec![CheckoutItem {
                product_id: painting_id,
                quantity: 1,
            }],
            discount_code: None,
            customer_email: Some("latecomer@example.com".into()),
            shipping_address: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        atelier_api::errors::ServiceError::Conflict(_)
    ));
}

#[tokio::test]
async fn duplicate_delivery_applies_no_second_side_effects() {
    let app = spawn_app().await;
    let (order_id, _painting_id, _print_id, session_id) = checkout_mixed_cart(&app).await;

    let event = completed_session_event(order_id, &session_id, Some("pi_test_9"), true);
    app.services
        .reconciliation
        .process_event(event.clone())
        .await
        .unwrap();
    app.services
        .reconciliation
        .process_event(event)
        .await
        .unwrap();

    let tokens = DownloadToken::find().all(&*app.db).await.unwrap();
    assert_eq!(tokens.len(), 1, "second delivery must not mint again");
}

#[tokio::test]
async fn missing_digital_asset_skips_token_but_order_stays_paid() {
    let app = spawn_app().await;
    let ghost = seed_digital_product(
        &app.db,
        app.assets_dir.path(),
        "Ghost Print",
        4_000,
        "ghost.pdf",
        b"temp",
    )
    .await;
    std::fs::remove_file(app.assets_dir.path().join("ghost.pdf")).unwrap();

    let response = app
        .services
        .checkout
        .checkout(CheckoutRequest {
            items: vec![CheckoutItem {
                product_id: ghost.id,
                quantity: 1,
            }],
            discount_code: None,
            customer_email: Some("buyer@example.com".into()),
            shipping_address: None,
        })
        .await
        .unwrap();

    app.services
        .reconciliation
        .process_event(completed_session_event(
            response.order_id,
            &response.session_id,
            None,
            true,
        ))
        .await
        .unwrap();

    let order = app
        .services
        .orders
        .get_order(response.order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Paid);
    // Capture reference falls back to the session id without an intent.
    assert_eq!(
        order.payment_reference.as_deref(),
        Some(response.session_id.as_str())
    );

    let tokens = app
        .services
        .downloads
        .list_for_order(response.order_id)
        .await
        .unwrap();
    assert!(tokens.is_empty());
}

#[tokio::test]
async fn redelivery_repairs_side_effects_missed_after_the_paid_transition() {
    let app = spawn_app().await;
    let (order_id, painting_id, _print_id, session_id) = checkout_mixed_cart(&app).await;

    // The paid transition landed but the process died before sold-marking
    // and minting ran.
    let won = app
        .services
        .orders
        .mark_paid_if_pending(order_id, Default::default(), "pi_test_9")
        .await
        .unwrap();
    assert!(won);
    assert!(app
        .services
        .downloads
        .list_for_order(order_id)
        .await
        .unwrap()
        .is_empty());

    // The provider redelivers; the lost CAS path repairs what is missing.
    app.services
        .reconciliation
        .process_event(completed_session_event(
            order_id,
            &session_id,
            Some("pi_test_9"),
            true,
        ))
        .await
        .unwrap();

    let painting = Product::find_by_id(painting_id)
        .one(&*app.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(painting.status, ProductStatus::Sold);

    let tokens = app.services.downloads.list_for_order(order_id).await.unwrap();
    assert_eq!(tokens.len(), 1);

    // And a further redelivery repairs nothing twice.
    app.services
        .reconciliation
        .process_event(completed_session_event(
            order_id,
            &session_id,
            Some("pi_test_9"),
            true,
        ))
        .await
        .unwrap();
    let tokens = DownloadToken::find().all(&*app.db).await.unwrap();
    assert_eq!(tokens.len(), 1);
}

#[tokio::test]
async fn expired_session_cancels_pending_order_only() {
    let app = spawn_app().await;
    let (order_id, _, _, session_id) = checkout_mixed_cart(&app).await;

    app.services
        .reconciliation
        .process_event(expired_session_event(order_id, &session_id))
        .await
        .unwrap();

    let order = app
        .services
        .orders
        .get_order(order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert_eq!(order.payment_status, PaymentStatus::Failed);
}

#[tokio::test]
async fn expiry_after_capture_does_not_unpay_the_order() {
    let app = spawn_app().await;
    let (order_id, _, _, session_id) = checkout_mixed_cart(&app).await;

    app.services
        .reconciliation
        .process_event(completed_session_event(order_id, &session_id, None, false))
        .await
        .unwrap();
    app.services
        .reconciliation
        .process_event(expired_session_event(order_id, &session_id))
        .await
        .unwrap();

    let order = app
        .services
        .orders
        .get_order(order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.payment_status, PaymentStatus::Paid);
}

#[tokio::test]
async fn payment_failure_marks_the_matching_order() {
    let app = spawn_app().await;
    let (order_id, _, _, session_id) = checkout_mixed_cart(&app).await;

    // The failed intent correlates back through the session reference.
    app.services
        .reconciliation
        .process_event(payment_failed_event(&session_id))
        .await
        .unwrap();

    let order = app
        .services
        .orders
        .get_order(order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Failed);
    assert_eq!(order.status, OrderStatus::Pending);
}

#[tokio::test]
async fn unknown_event_and_unknown_order_are_acknowledged() {
    let app = spawn_app().await;

    let unknown_kind: atelier_api::payments::webhook::WebhookEvent =
        serde_json::from_value(serde_json::json!({
            "id": "evt_x",
            "type": "invoice.created",
            "data": { "object": {} }
        }))
        .unwrap();
    app.services
        .reconciliation
        .process_event(unknown_kind)
        .await
        .unwrap();

    let orphan = completed_session_event(uuid::Uuid::new_v4(), "cs_orphan", None, false);
    app.services
        .reconciliation
        .process_event(orphan)
        .await
        .unwrap();
}
