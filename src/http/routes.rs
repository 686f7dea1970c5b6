//! Route handlers for the billing and quoting API.
//!
//! The webhook endpoint implements the provider's inbound contract:
//! signature failures and missing headers get 400, duplicates and skips
//! get 200, and events that exhausted their processing attempts get 500
//! with the recorded error.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::post,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::billing::invoice::{InvoiceManager, ProviderInvoiceClient};
use crate::billing::storage::BillingStore;
use crate::billing::subscription::{ProviderSubscriptionClient, SubscriptionManager};
use crate::billing::webhook::{WebhookOutcome, WebhookProcessor};
use crate::error::Result;
use crate::quotes::{LineItem, QuoteRates, calculate_quote};

/// Header carrying the provider's webhook signature.
pub const SIGNATURE_HEADER: &str = "provider-signature";

/// Shared state for the API routes.
pub struct AppState<S, SC, IC>
where
    S: BillingStore,
    SC: ProviderSubscriptionClient,
    IC: ProviderInvoiceClient,
{
    /// Webhook processor.
    pub webhooks: Arc<WebhookProcessor<S>>,
    /// Subscription manager.
    pub subscriptions: Arc<SubscriptionManager<S, SC>>,
    /// Invoice manager.
    pub invoices: Arc<InvoiceManager<S, IC>>,
}

impl<S, SC, IC> Clone for AppState<S, SC, IC>
where
    S: BillingStore,
    SC: ProviderSubscriptionClient,
    IC: ProviderInvoiceClient,
{
    fn clone(&self) -> Self {
        Self {
            webhooks: Arc::clone(&self.webhooks),
            subscriptions: Arc::clone(&self.subscriptions),
            invoices: Arc::clone(&self.invoices),
        }
    }
}

/// Build the API router.
pub fn router<S, SC, IC>(state: AppState<S, SC, IC>) -> Router
where
    S: BillingStore + Clone + Send + Sync + 'static,
    SC: ProviderSubscriptionClient + Send + Sync + 'static,
    IC: ProviderInvoiceClient + Send + Sync + 'static,
{
    Router::new()
        .route("/webhooks/provider", post(provider_webhook))
        .route("/quotes/preview", post(preview_quote))
        .route(
            "/billing/subscription/preview-change",
            post(preview_plan_change),
        )
        .route("/billing/invoices/:invoice_id/retry", post(retry_invoice))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct WebhookResponse {
    received: bool,
    outcome: &'static str,
}

/// Inbound provider webhook endpoint.
async fn provider_webhook<S, SC, IC>(
    State(state): State<AppState<S, SC, IC>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<axum::response::Response>
where
    S: BillingStore + Clone + Send + Sync + 'static,
    SC: ProviderSubscriptionClient + Send + Sync + 'static,
    IC: ProviderInvoiceClient + Send + Sync + 'static,
{
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    let outcome = state.webhooks.process(&body, signature).await?;

    let response = match outcome {
        WebhookOutcome::Processed => (
            StatusCode::OK,
            Json(WebhookResponse {
                received: true,
                outcome: "processed",
            }),
        )
            .into_response(),
        WebhookOutcome::Skipped => (
            StatusCode::OK,
            Json(WebhookResponse {
                received: true,
                outcome: "skipped",
            }),
        )
            .into_response(),
        WebhookOutcome::AlreadyProcessed => (
            StatusCode::OK,
            Json(WebhookResponse {
                received: true,
                outcome: "already_processed",
            }),
        )
            .into_response(),
        WebhookOutcome::Failed { error } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "received": true,
                "outcome": "failed",
                "error": error,
            })),
        )
            .into_response(),
    };

    Ok(response)
}

#[derive(Deserialize)]
struct QuotePreviewRequest {
    items: Vec<LineItem>,
    markup_rate: f64,
    tax_rate: f64,
}

/// Pure quote total preview.
async fn preview_quote(Json(request): Json<QuotePreviewRequest>) -> impl IntoResponse {
    let totals = calculate_quote(
        &request.items,
        QuoteRates {
            markup_rate: request.markup_rate,
            tax_rate: request.tax_rate,
        },
    );
    Json(totals)
}

#[derive(Deserialize)]
struct PreviewPlanChangeRequest {
    account_id: String,
    new_price_id: String,
}

/// Proration preview for a plan change.
async fn preview_plan_change<S, SC, IC>(
    State(state): State<AppState<S, SC, IC>>,
    Json(request): Json<PreviewPlanChangeRequest>,
) -> Result<impl IntoResponse>
where
    S: BillingStore + Clone + Send + Sync + 'static,
    SC: ProviderSubscriptionClient + Send + Sync + 'static,
    IC: ProviderInvoiceClient + Send + Sync + 'static,
{
    let preview = state
        .subscriptions
        .preview_plan_change(&request.account_id, &request.new_price_id)
        .await?;
    Ok(Json(preview))
}

#[derive(Deserialize, Default)]
struct RetryInvoiceRequest {
    #[serde(default)]
    payment_method: Option<String>,
}

#[derive(Serialize)]
struct RetryInvoiceResponse {
    invoice_id: String,
    status: String,
    attempt_count: u32,
}

/// Bounded failed-payment retry for an invoice.
async fn retry_invoice<S, SC, IC>(
    State(state): State<AppState<S, SC, IC>>,
    Path(invoice_id): Path<String>,
    Json(request): Json<RetryInvoiceRequest>,
) -> Result<impl IntoResponse>
where
    S: BillingStore + Clone + Send + Sync + 'static,
    SC: ProviderSubscriptionClient + Send + Sync + 'static,
    IC: ProviderInvoiceClient + Send + Sync + 'static,
{
    let invoice = state
        .invoices
        .retry_failed_payment(&invoice_id, request.payment_method.as_deref())
        .await?;

    Ok(Json(RetryInvoiceResponse {
        invoice_id: invoice.provider_invoice_id,
        status: invoice.status.as_str().to_string(),
        attempt_count: invoice.attempt_count,
    }))
}
