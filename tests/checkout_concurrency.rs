mod common;

use std::collections::HashSet;

use axum::http::StatusCode;
use serde_json::json;
use uuid::Uuid;

use common::spawn_app;
use solestore::domain::aggregates::PaymentMethod;
use solestore::services::cart::AddItemRequest;
use solestore::services::checkout::PlaceOrderRequest;
use solestore::StoreError;

fn cod() -> PlaceOrderRequest {
    PlaceOrderRequest { shipping_address: None, payment_method: PaymentMethod::CashOnDelivery, note: None }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_checkouts_never_oversell() {
    let app = spawn_app().await;
    let admin = app.admin_token().await;
    let product = app.create_product(&admin, "LTD-1", 4999, &[("UK9", 5)]).await;
    let product_id: Uuid = product.parse().unwrap();

    let mut customers = Vec::new();
    for i in 0..20 {
        let token = app.customer_token(&format!("rush{}@example.com", i)).await;
        let claims = app.state.auth.verify(&token).unwrap();
        let add = AddItemRequest { product_id, size: "UK9".into(), quantity: 1 };
        app.state.carts.add_item(claims.sub, add).await.unwrap();
        customers.push(claims.sub);
    }

    let mut handles = Vec::new();
    for customer in customers {
        let orders = app.state.orders.clone();
        handles.push(tokio::spawn(async move { orders.place_order(customer, None, cod()).await }));
    }

    let (mut placed, mut sold_out) = (0, 0);
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => placed += 1,
            Err(StoreError::InsufficientStock { .. }) => sold_out += 1,
            Err(other) => panic!("unexpected error: {}", other),
        }
    }
    assert_eq!(placed, 5);
    assert_eq!(sold_out, 15);
    assert_eq!(app.stock(&admin, &product, "UK9").await, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_retries_create_one_order() {
    let app = spawn_app().await;
    let admin = app.admin_token().await;
    let product = app.create_product(&admin, "LTD-2", 3000, &[("UK8", 10)]).await;
    let token = app.customer_token("double-click@example.com").await;
    let (status, _) = app
        .request("POST", "/api/v1/cart/items", Some(&token), Some(json!({ "product_id": product, "size": "UK8", "quantity": 2 })))
        .await;
    assert_eq!(status, StatusCode::OK);
    let customer = app.state.auth.verify(&token).unwrap().sub;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let orders = app.state.orders.clone();
        handles.push(tokio::spawn(async move { orders.place_order(customer, Some("tap-tap".into()), cod()).await }));
    }

    let mut ids = HashSet::new();
    let mut created = 0;
    for handle in handles {
        let placed = handle.await.unwrap().unwrap();
        if placed.created {
            created += 1;
        }
        ids.insert(placed.order.id);
    }
    assert_eq!(created, 1);
    assert_eq!(ids.len(), 1);
    assert_eq!(app.stock(&admin, &product, "UK8").await, 8);
}
