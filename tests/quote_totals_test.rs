//! Quote calculation invariants, including the HTTP preview endpoint.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use quotewise::billing::{
    InMemoryBillingStore, InvoiceManager, MockProviderInvoiceClient,
    MockProviderSubscriptionClient, SubscriptionManager, WebhookProcessor,
};
use quotewise::http::{AppState, router};
use quotewise::quotes::{LineItem, QuoteRates, calculate_quote};

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn test_totals_compose() {
    let items = vec![
        LineItem::new("Labor", 85.0, 8.0),
        LineItem::new("Water heater", 649.99, 1.0),
        LineItem::new("Fittings", 4.25, 12.0),
    ];
    let totals = calculate_quote(
        &items,
        QuoteRates {
            markup_rate: 0.15,
            tax_rate: 0.0825,
        },
    );

    assert!(close(totals.subtotal, 85.0 * 8.0 + 649.99 + 4.25 * 12.0));
    assert!(close(totals.markup, totals.subtotal * 0.15));
    assert!(close(totals.tax, (totals.subtotal + totals.markup) * 0.0825));
    assert!(close(totals.total, totals.subtotal + totals.markup + totals.tax));
}

#[test]
fn test_empty_quote() {
    let totals = calculate_quote(
        &[],
        QuoteRates {
            markup_rate: 0.2,
            tax_rate: 0.1,
        },
    );
    assert_eq!(totals.subtotal, 0.0);
    assert_eq!(totals.markup, 0.0);
    assert_eq!(totals.tax, 0.0);
    assert_eq!(totals.total, 0.0);
}

#[test]
fn test_single_item_subtotal() {
    let totals = calculate_quote(
        &[LineItem::new("Hourly labor", 92.5, 3.5)],
        QuoteRates {
            markup_rate: 0.0,
            tax_rate: 0.0,
        },
    );
    assert!(close(totals.subtotal, 323.75));
    assert!(close(totals.total, 323.75));
}

#[test]
fn test_negative_quantity_is_arithmetic_not_validated() {
    let totals = calculate_quote(
        &[
            LineItem::new("Labor", 100.0, 2.0),
            LineItem::new("Promo discount", 25.0, -2.0),
        ],
        QuoteRates {
            markup_rate: 0.1,
            tax_rate: 0.05,
        },
    );
    assert!(close(totals.subtotal, 150.0));
}

fn test_app() -> Router {
    let store = InMemoryBillingStore::new();
    let state = AppState {
        webhooks: Arc::new(WebhookProcessor::new(
            store.clone(),
            "whsec_unused".to_string(),
            300,
            3,
        )),
        subscriptions: Arc::new(SubscriptionManager::new(
            store.clone(),
            MockProviderSubscriptionClient::new(),
        )),
        invoices: Arc::new(InvoiceManager::new(store, MockProviderInvoiceClient::new(), 3)),
    };
    router(state)
}

#[tokio::test]
async fn test_quote_preview_endpoint() {
    let app = test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/quotes/preview")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::json!({
                        "items": [
                            {"description": "Labor", "cost": 100.0, "quantity": 2.0}
                        ],
                        "markup_rate": 0.2,
                        "tax_rate": 0.1,
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert!(close(json["subtotal"].as_f64().unwrap(), 200.0));
    assert!(close(json["markup"].as_f64().unwrap(), 40.0));
    assert!(close(json["tax"].as_f64().unwrap(), 24.0));
    assert!(close(json["total"].as_f64().unwrap(), 264.0));
}

#[tokio::test]
async fn test_quote_preview_endpoint_empty_items() {
    let app = test_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/quotes/preview")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::json!({
                        "items": [],
                        "markup_rate": 0.2,
                        "tax_rate": 0.1,
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["total"].as_f64().unwrap(), 0.0);
}
