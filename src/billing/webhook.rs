//! Provider webhook handling.
//!
//! Handles signature verification, idempotency, raw-event recording, event
//! routing, and bounded retry of transient processing failures.
//!
//! The inbound contract, in order:
//!
//! 1. verify the signature against the stored secret (400 on failure or a
//!    missing header)
//! 2. short-circuit already-processed event IDs (200)
//! 3. record the raw event before processing
//! 4. dispatch by event type to the matching upsert logic
//! 5. retry transient failures up to a bound; after that, mark the event
//!    failed with its error message (500)

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::customer::{CustomerManager, ProviderCustomerData};
use super::dispute::{DisputeManager, ProviderDispute};
use super::invoice::{InvoiceManager, ProviderInvoice};
use super::payment::{PaymentMethodManager, ProviderPaymentMethod};
use super::storage::{BillingStore, SubscriptionStatus, WebhookEventRecord};
use super::subscription::{ProviderSubscription, SubscriptionManager};
use crate::error::{QuotewiseError, Result};
use crate::util::unix_now;

/// Webhook processor for provider events.
///
/// The webhook secret is stored using [`SecretString`] to prevent accidental
/// exposure in logs or debug output.
pub struct WebhookProcessor<S: BillingStore> {
    store: S,
    webhook_secret: SecretString,
    tolerance_secs: i64,
    max_attempts: u32,
}

impl<S: BillingStore + Clone> WebhookProcessor<S> {
    /// Create a new webhook processor.
    #[must_use]
    pub fn new(
        store: S,
        webhook_secret: impl Into<SecretString>,
        tolerance_secs: i64,
        max_attempts: u32,
    ) -> Self {
        Self {
            store,
            webhook_secret: webhook_secret.into(),
            tolerance_secs,
            max_attempts,
        }
    }

    /// Build a processor straight from billing configuration.
    #[must_use]
    pub fn from_config(store: S, config: &crate::config::BillingConfig) -> Self {
        Self::new(
            store,
            config.webhook_secret.clone(),
            config.webhook_tolerance_secs,
            config.max_event_attempts,
        )
    }

    /// Run the full inbound contract against a raw request.
    ///
    /// Verification failures (including a missing header) come back as
    /// `Err` mapping to 400. Everything past verification resolves to a
    /// [`WebhookOutcome`].
    pub async fn process(
        &self,
        payload: &[u8],
        signature_header: Option<&str>,
    ) -> Result<WebhookOutcome> {
        let header = signature_header.ok_or_else(|| {
            QuotewiseError::bad_request("Missing webhook signature header")
        })?;

        let (event, raw) = self.verify_signature(payload, header)?;

        // Idempotency: settled events short-circuit.
        if let Some(existing) = self.store.get_event(&event.id).await? {
            if existing.is_settled() {
                tracing::debug!(
                    target: "quotewise::billing::webhook",
                    event_id = %event.id,
                    "Event already processed"
                );
                return Ok(WebhookOutcome::AlreadyProcessed);
            }
        }

        // Record the raw event before touching any mirror.
        let record = WebhookEventRecord::received(&event.id, &event.event_type, raw);
        self.store.record_event(&record).await?;

        self.dispatch_with_retry(&event).await
    }

    /// Verify the signature header and parse the event.
    ///
    /// The header carries `t=<unix>,v1=<hex hmac-sha256>` where the MAC is
    /// computed over `"{t}.{payload}"`. Comparison is constant-time.
    pub fn verify_signature(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<(WebhookEvent, serde_json::Value)> {
        let sig_parts = parse_signature_header(signature)?;

        let now = unix_now() as i64;
        let age = (now - sig_parts.timestamp).abs();
        if age > self.tolerance_secs {
            return Err(super::error::BillingError::WebhookTimestampExpired {
                age_seconds: age,
            }
            .into());
        }

        let signed_payload = format!(
            "{}.{}",
            sig_parts.timestamp,
            String::from_utf8_lossy(payload)
        );
        let expected = compute_signature(
            self.webhook_secret.expose_secret(),
            signed_payload.as_bytes(),
        )?;

        let provided = hex::decode(&sig_parts.signature).map_err(|_| {
            QuotewiseError::bad_request("Invalid signature format")
        })?;

        if expected.ct_eq(&provided).unwrap_u8() != 1 {
            return Err(super::error::BillingError::InvalidWebhookSignature.into());
        }

        // Log parse problems internally; clients get a generic message.
        let raw: serde_json::Value = serde_json::from_slice(payload).map_err(|e| {
            tracing::warn!(
                target: "quotewise::billing::webhook",
                error = %e,
                "Failed to parse webhook payload"
            );
            super::error::BillingError::InvalidWebhookPayload {
                message: "malformed JSON payload".to_string(),
            }
        })?;

        let event: WebhookEvent = serde_json::from_value(raw.clone()).map_err(|e| {
            tracing::warn!(
                target: "quotewise::billing::webhook",
                error = %e,
                "Webhook payload missing required fields"
            );
            super::error::BillingError::InvalidWebhookPayload {
                message: "missing required event fields".to_string(),
            }
        })?;

        Ok((event, raw))
    }

    /// Dispatch an event, retrying transient failures up to the bound.
    async fn dispatch_with_retry(&self, event: &WebhookEvent) -> Result<WebhookOutcome> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.dispatch(event).await {
                Ok(Handled::Processed) => {
                    self.store.mark_event_processed(&event.id, attempt).await?;
                    return Ok(WebhookOutcome::Processed);
                }
                Ok(Handled::Ignored) => {
                    self.store.mark_event_skipped(&event.id).await?;
                    return Ok(WebhookOutcome::Skipped);
                }
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    tracing::warn!(
                        target: "quotewise::billing::webhook",
                        event_id = %event.id,
                        attempt,
                        error = %err,
                        "Transient failure processing webhook event, retrying"
                    );
                }
                Err(err) => {
                    let message = err.to_string();
                    self.store
                        .mark_event_failed(&event.id, attempt, &message)
                        .await?;
                    tracing::error!(
                        target: "quotewise::billing::webhook",
                        event_id = %event.id,
                        attempt,
                        error = %message,
                        "Webhook event processing failed"
                    );
                    return Ok(WebhookOutcome::Failed { error: message });
                }
            }
        }
    }

    /// Route a verified event to the matching upsert logic.
    async fn dispatch(&self, event: &WebhookEvent) -> Result<Handled> {
        match event.event_type.as_str() {
            "customer.updated" => self.handle_customer_updated(event).await,
            "customer.subscription.created" | "customer.subscription.updated" => {
                self.handle_subscription_updated(event).await
            }
            "customer.subscription.deleted" => self.handle_subscription_deleted(event).await,
            "invoice.paid" => self.handle_invoice_event(event, SubscriptionStatus::Active).await,
            "invoice.payment_failed" => {
                self.handle_invoice_event(event, SubscriptionStatus::PastDue).await
            }
            "payment_method.attached" => self.handle_payment_method_attached(event).await,
            "payment_method.detached" => self.handle_payment_method_detached(event).await,
            "charge.dispute.created" | "charge.dispute.updated" | "charge.dispute.closed" => {
                self.handle_dispute_event(event).await
            }
            "charge.refunded" => {
                // The refund itself lives at the provider; nothing to mirror.
                tracing::info!(
                    target: "quotewise::billing::webhook",
                    event_id = %event.id,
                    "Charge refunded"
                );
                Ok(Handled::Processed)
            }
            _ => Ok(Handled::Ignored),
        }
    }

    async fn handle_customer_updated(&self, event: &WebhookEvent) -> Result<Handled> {
        let obj = object_of(event)?;
        let data = ProviderCustomerData {
            id: str_field(obj, "id")?,
            email: opt_str_field(obj, "email").unwrap_or_default(),
            default_payment_method: opt_str_field(obj, "default_payment_method"),
            delinquent: obj.get("delinquent").and_then(|v| v.as_bool()).unwrap_or(false),
            account_id: obj
                .get("metadata")
                .and_then(|m| m.get("account_id"))
                .and_then(|v| v.as_str())
                .map(String::from),
        };

        let customers = CustomerManager::new(self.store.clone(), NullCustomerClient);
        customers.sync_from_provider(data).await?;
        Ok(Handled::Processed)
    }

    async fn handle_subscription_updated(&self, event: &WebhookEvent) -> Result<Handled> {
        let data = parse_subscription(event)?;
        let subscriptions = SubscriptionManager::new(self.store.clone(), NullSubscriptionClient);
        subscriptions.sync_from_provider(data).await?;
        Ok(Handled::Processed)
    }

    async fn handle_subscription_deleted(&self, event: &WebhookEvent) -> Result<Handled> {
        let obj = object_of(event)?;
        let subscription_id = str_field(obj, "id")?;
        let subscriptions = SubscriptionManager::new(self.store.clone(), NullSubscriptionClient);
        subscriptions.sync_deleted(&subscription_id).await?;
        Ok(Handled::Processed)
    }

    async fn handle_invoice_event(
        &self,
        event: &WebhookEvent,
        subscription_status: SubscriptionStatus,
    ) -> Result<Handled> {
        let data = parse_invoice(event)?;
        let subscription_id = data.subscription_id.clone();

        let invoices = InvoiceManager::new(self.store.clone(), NullInvoiceClient, 1);
        invoices.sync_from_provider(data).await?;

        if let Some(subscription_id) = subscription_id {
            let subscriptions =
                SubscriptionManager::new(self.store.clone(), NullSubscriptionClient);
            subscriptions
                .mark_status(&subscription_id, subscription_status)
                .await?;
        }

        Ok(Handled::Processed)
    }

    async fn handle_payment_method_attached(&self, event: &WebhookEvent) -> Result<Handled> {
        let obj = object_of(event)?;
        let card = obj.get("card");
        let data = ProviderPaymentMethod {
            id: str_field(obj, "id")?,
            customer_id: str_field(obj, "customer")?,
            kind: opt_str_field(obj, "type").unwrap_or_else(|| "card".to_string()),
            brand: card.and_then(|c| c.get("brand")).and_then(|v| v.as_str()).map(String::from),
            last4: card.and_then(|c| c.get("last4")).and_then(|v| v.as_str()).map(String::from),
            exp_month: card
                .and_then(|c| c.get("exp_month"))
                .and_then(|v| v.as_u64())
                .map(|m| m as u8),
            exp_year: card
                .and_then(|c| c.get("exp_year"))
                .and_then(|v| v.as_u64())
                .map(|y| y as u16),
        };

        let methods =
            PaymentMethodManager::new(self.store.clone(), NullPaymentMethodClient, NullInvoiceClient);
        methods.sync_attached(data).await?;
        Ok(Handled::Processed)
    }

    async fn handle_payment_method_detached(&self, event: &WebhookEvent) -> Result<Handled> {
        let obj = object_of(event)?;
        let payment_method_id = str_field(obj, "id")?;
        let methods =
            PaymentMethodManager::new(self.store.clone(), NullPaymentMethodClient, NullInvoiceClient);
        methods.sync_detached(&payment_method_id).await?;
        Ok(Handled::Processed)
    }

    async fn handle_dispute_event(&self, event: &WebhookEvent) -> Result<Handled> {
        let obj = object_of(event)?;
        let data = ProviderDispute {
            id: str_field(obj, "id")?,
            charge_id: str_field(obj, "charge")?,
            customer_id: opt_str_field(obj, "customer").unwrap_or_default(),
            amount: obj.get("amount").and_then(|v| v.as_i64()).unwrap_or(0),
            currency: opt_str_field(obj, "currency").unwrap_or_else(|| "usd".to_string()),
            reason: opt_str_field(obj, "reason").unwrap_or_else(|| "general".to_string()),
            status: opt_str_field(obj, "status").unwrap_or_else(|| "needs_response".to_string()),
            evidence_due_by: obj.get("evidence_due_by").and_then(|v| v.as_u64()),
        };

        let disputes = DisputeManager::new(self.store.clone(), NullDisputeClient);
        disputes.sync_from_provider(data).await?;
        Ok(Handled::Processed)
    }
}

fn parse_subscription(event: &WebhookEvent) -> Result<ProviderSubscription> {
    let obj = object_of(event)?;
    Ok(ProviderSubscription {
        id: str_field(obj, "id")?,
        customer_id: str_field(obj, "customer")?,
        price_id: obj
            .get("items")
            .and_then(|v| v.get("data"))
            .and_then(|v| v.as_array())
            .and_then(|items| items.first())
            .and_then(|item| item.get("price"))
            .and_then(|p| p.get("id"))
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or(super::error::BillingError::InvalidWebhookPayload {
                message: "subscription has no price".to_string(),
            })?,
        status: opt_str_field(obj, "status").unwrap_or_else(|| "active".to_string()),
        current_period_start: obj
            .get("current_period_start")
            .and_then(|v| v.as_u64())
            .unwrap_or(0),
        current_period_end: obj
            .get("current_period_end")
            .and_then(|v| v.as_u64())
            .unwrap_or(0),
        cancel_at_period_end: obj
            .get("cancel_at_period_end")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
    })
}

fn parse_invoice(event: &WebhookEvent) -> Result<ProviderInvoice> {
    let obj = object_of(event)?;
    Ok(ProviderInvoice {
        id: str_field(obj, "id")?,
        customer_id: str_field(obj, "customer")?,
        subscription_id: opt_str_field(obj, "subscription"),
        status: opt_str_field(obj, "status").unwrap_or_else(|| "open".to_string()),
        amount_due: obj.get("amount_due").and_then(|v| v.as_i64()).unwrap_or(0),
        amount_paid: obj.get("amount_paid").and_then(|v| v.as_i64()).unwrap_or(0),
        attempt_count: obj
            .get("attempt_count")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as u32,
        last_payment_error: obj
            .get("last_payment_error")
            .and_then(|e| e.get("message"))
            .and_then(|v| v.as_str())
            .map(String::from),
    })
}

fn object_of(event: &WebhookEvent) -> Result<&serde_json::Map<String, serde_json::Value>> {
    event.data.object.as_object().ok_or_else(|| {
        super::error::BillingError::InvalidWebhookPayload {
            message: "event data is not an object".to_string(),
        }
        .into()
    })
}

fn str_field(obj: &serde_json::Map<String, serde_json::Value>, key: &str) -> Result<String> {
    obj.get(key)
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or_else(|| {
            super::error::BillingError::InvalidWebhookPayload {
                message: format!("missing field '{}'", key),
            }
            .into()
        })
}

fn opt_str_field(obj: &serde_json::Map<String, serde_json::Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(|v| v.as_str()).map(String::from)
}

/// Parsed webhook event.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct WebhookEvent {
    /// Event ID.
    pub id: String,
    /// Event type (e.g., "invoice.payment_failed").
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event data.
    pub data: WebhookEventData,
    /// Timestamp when the event was created.
    pub created: u64,
}

/// Webhook event data.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct WebhookEventData {
    /// The object that triggered the event.
    pub object: serde_json::Value,
}

/// Outcome of webhook processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Event was processed successfully.
    Processed,
    /// Event was recognized but intentionally not handled.
    Skipped,
    /// Event was already processed (idempotency).
    AlreadyProcessed,
    /// Event failed after bounded attempts; the error is recorded.
    Failed { error: String },
}

/// Internal dispatch result.
enum Handled {
    Processed,
    Ignored,
}

/// Parsed signature header parts.
struct SignatureParts {
    timestamp: i64,
    signature: String,
}

/// Parse the provider signature header (`t=...,v1=...`).
fn parse_signature_header(header: &str) -> Result<SignatureParts> {
    let mut timestamp = None;
    let mut signature = None;

    for part in header.split(',') {
        let (key, value) = part.split_once('=').ok_or_else(|| {
            QuotewiseError::bad_request("Invalid signature header format")
        })?;

        match key.trim() {
            "t" => timestamp = value.parse().ok(),
            "v1" => signature = Some(value.to_string()),
            _ => {} // Ignore other versions
        }
    }

    Ok(SignatureParts {
        timestamp: timestamp.ok_or_else(|| {
            QuotewiseError::bad_request("Missing timestamp in signature")
        })?,
        signature: signature.ok_or_else(|| {
            QuotewiseError::bad_request("Missing v1 signature")
        })?,
    })
}

/// Compute HMAC-SHA256 over a payload.
fn compute_signature(secret: &str, payload: &[u8]) -> Result<Vec<u8>> {
    type HmacSha256 = Hmac<Sha256>;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| QuotewiseError::internal("HMAC error"))?;
    mac.update(payload);
    Ok(mac.finalize().into_bytes().to_vec())
}

// Null clients for the webhook path. Webhook handlers only write mirrors;
// they never call back out to the provider.

struct NullCustomerClient;

impl super::customer::ProviderCustomerClient for NullCustomerClient {
    async fn create_customer(
        &self,
        _request: super::customer::CreateCustomerRequest,
    ) -> Result<super::customer::ProviderCustomer> {
        Err(QuotewiseError::internal("Not available in webhook context"))
    }

    async fn update_customer(
        &self,
        _customer_id: &str,
        _request: super::customer::UpdateCustomerRequest,
    ) -> Result<super::customer::ProviderCustomer> {
        Err(QuotewiseError::internal("Not available in webhook context"))
    }

    async fn delete_customer(&self, _customer_id: &str) -> Result<()> {
        Err(QuotewiseError::internal("Not available in webhook context"))
    }
}

struct NullSubscriptionClient;

impl super::subscription::ProviderSubscriptionClient for NullSubscriptionClient {
    async fn create_subscription(
        &self,
        _request: super::subscription::CreateSubscriptionRequest,
    ) -> Result<ProviderSubscription> {
        Err(QuotewiseError::internal("Not available in webhook context"))
    }

    async fn get_subscription(&self, _subscription_id: &str) -> Result<ProviderSubscription> {
        Err(QuotewiseError::internal("Not available in webhook context"))
    }

    async fn update_subscription_price(
        &self,
        _subscription_id: &str,
        _new_price_id: &str,
        _proration: super::subscription::ProrationBehavior,
    ) -> Result<ProviderSubscription> {
        Err(QuotewiseError::internal("Not available in webhook context"))
    }

    async fn cancel_subscription(
        &self,
        _subscription_id: &str,
        _at_period_end: bool,
    ) -> Result<ProviderSubscription> {
        Err(QuotewiseError::internal("Not available in webhook context"))
    }

    async fn preview_proration(
        &self,
        _subscription_id: &str,
        _new_price_id: &str,
    ) -> Result<super::subscription::ProrationPreview> {
        Err(QuotewiseError::internal("Not available in webhook context"))
    }
}

struct NullInvoiceClient;

impl super::invoice::ProviderInvoiceClient for NullInvoiceClient {
    async fn get_invoice(&self, _invoice_id: &str) -> Result<ProviderInvoice> {
        Err(QuotewiseError::internal("Not available in webhook context"))
    }

    async fn pay_invoice(
        &self,
        _invoice_id: &str,
        _payment_method: Option<&str>,
    ) -> Result<ProviderInvoice> {
        Err(QuotewiseError::internal("Not available in webhook context"))
    }

    async fn list_open_invoices(&self, _customer_id: &str) -> Result<Vec<ProviderInvoice>> {
        Err(QuotewiseError::internal("Not available in webhook context"))
    }

    async fn mark_uncollectible(&self, _invoice_id: &str) -> Result<ProviderInvoice> {
        Err(QuotewiseError::internal("Not available in webhook context"))
    }
}

struct NullPaymentMethodClient;

impl super::payment::ProviderPaymentMethodClient for NullPaymentMethodClient {
    async fn attach(
        &self,
        _payment_method_id: &str,
        _customer_id: &str,
    ) -> Result<ProviderPaymentMethod> {
        Err(QuotewiseError::internal("Not available in webhook context"))
    }

    async fn detach(&self, _payment_method_id: &str) -> Result<()> {
        Err(QuotewiseError::internal("Not available in webhook context"))
    }

    async fn set_default(&self, _customer_id: &str, _payment_method_id: &str) -> Result<()> {
        Err(QuotewiseError::internal("Not available in webhook context"))
    }
}

struct NullDisputeClient;

impl super::dispute::ProviderDisputeClient for NullDisputeClient {
    async fn get_dispute(&self, _dispute_id: &str) -> Result<ProviderDispute> {
        Err(QuotewiseError::internal("Not available in webhook context"))
    }

    async fn submit_evidence(
        &self,
        _dispute_id: &str,
        _evidence: super::dispute::DisputeEvidence,
    ) -> Result<ProviderDispute> {
        Err(QuotewiseError::internal("Not available in webhook context"))
    }

    async fn close_dispute(&self, _dispute_id: &str) -> Result<ProviderDispute> {
        Err(QuotewiseError::internal("Not available in webhook context"))
    }
}

/// Signing helpers for tests.
#[cfg(any(test, feature = "test-support"))]
pub mod test {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    /// Build a valid signature header for a payload, the way the provider
    /// signs outbound webhooks.
    #[must_use]
    pub fn signature_header(secret: &str, timestamp: i64, payload: &[u8]) -> String {
        type HmacSha256 = Hmac<Sha256>;

        let signed_payload = format!("{}.{}", timestamp, String::from_utf8_lossy(payload));
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signed_payload.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        format!("t={},v1={}", timestamp, signature)
    }
}
