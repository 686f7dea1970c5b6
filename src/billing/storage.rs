//! Storage traits for mirrored billing data.
//!
//! Every persisted entity is a mirror of a provider-side object, keyed by
//! the provider's ID. Implement [`BillingStore`] to persist these rows to
//! your database; an in-memory implementation is provided for testing.
//!
//! Mirrors are written with upserts only. Reprocessing a webhook event can
//! overwrite a row but never duplicate it.

use crate::error::Result;
use crate::util::unix_now;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Mirrored provider customer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredCustomer {
    /// Our account ID (the quoting-tool tenant).
    pub account_id: String,
    /// Provider customer ID.
    pub provider_customer_id: String,
    /// Billing email.
    pub email: String,
    /// Default payment method, if any.
    pub default_payment_method: Option<String>,
    /// Whether the provider flagged the customer as delinquent.
    pub delinquent: bool,
    /// Last updated timestamp (unix seconds).
    pub updated_at: u64,
}

/// Mirrored subscription state.
///
/// Synced from the provider via webhooks so request paths never need a
/// provider API call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredSubscription {
    /// Provider subscription ID.
    pub provider_subscription_id: String,
    /// Provider customer ID.
    pub provider_customer_id: String,
    /// Provider price ID the subscription is on.
    pub price_id: String,
    /// Subscription status.
    pub status: SubscriptionStatus,
    /// Current billing period start (unix seconds).
    pub current_period_start: u64,
    /// Current billing period end (unix seconds).
    pub current_period_end: u64,
    /// Whether the subscription will cancel at period end.
    pub cancel_at_period_end: bool,
    /// Last updated timestamp.
    pub updated_at: u64,
}

impl StoredSubscription {
    /// Check if the subscription is active (including trialing).
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(
            self.status,
            SubscriptionStatus::Active | SubscriptionStatus::Trialing
        )
    }

    /// Check if payment has failed.
    #[must_use]
    pub fn is_past_due(&self) -> bool {
        self.status == SubscriptionStatus::PastDue
    }
}

/// Subscription status, mirroring the provider's status enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Subscription is active and paid.
    Active,
    /// Subscription is in trial period.
    Trialing,
    /// Payment failed, subscription still active but past due.
    PastDue,
    /// Subscription has been canceled.
    Canceled,
    /// Subscription is incomplete (awaiting payment).
    Incomplete,
    /// Subscription expired after incomplete payment.
    IncompleteExpired,
    /// Subscription is paused.
    Paused,
    /// Subscription is unpaid.
    Unpaid,
}

impl SubscriptionStatus {
    /// Parse from provider status string.
    #[must_use]
    pub fn from_provider(status: &str) -> Self {
        match status {
            "active" => Self::Active,
            "trialing" => Self::Trialing,
            "past_due" => Self::PastDue,
            "canceled" => Self::Canceled,
            "incomplete" => Self::Incomplete,
            "incomplete_expired" => Self::IncompleteExpired,
            "paused" => Self::Paused,
            "unpaid" => Self::Unpaid,
            _ => Self::Canceled, // Default to canceled for unknown statuses
        }
    }

    /// Convert to the provider's string form.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Trialing => "trialing",
            Self::PastDue => "past_due",
            Self::Canceled => "canceled",
            Self::Incomplete => "incomplete",
            Self::IncompleteExpired => "incomplete_expired",
            Self::Paused => "paused",
            Self::Unpaid => "unpaid",
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Mirrored invoice.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredInvoice {
    /// Provider invoice ID.
    pub provider_invoice_id: String,
    /// Provider customer ID.
    pub provider_customer_id: String,
    /// Provider subscription ID, if the invoice belongs to one.
    pub provider_subscription_id: Option<String>,
    /// Invoice status.
    pub status: InvoiceStatus,
    /// Amount due in cents.
    pub amount_due: i64,
    /// Amount paid in cents.
    pub amount_paid: i64,
    /// How many payment attempts the provider has made.
    pub attempt_count: u32,
    /// Message from the most recent failed payment, if any.
    pub last_payment_error: Option<String>,
    /// Last updated timestamp.
    pub updated_at: u64,
}

/// Invoice status, mirroring the provider's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Open,
    Paid,
    Uncollectible,
    Void,
}

impl InvoiceStatus {
    /// Parse from provider status string.
    #[must_use]
    pub fn from_provider(status: &str) -> Self {
        match status {
            "draft" => Self::Draft,
            "open" => Self::Open,
            "paid" => Self::Paid,
            "uncollectible" => Self::Uncollectible,
            "void" => Self::Void,
            _ => Self::Open,
        }
    }

    /// Convert to the provider's string form.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Open => "open",
            Self::Paid => "paid",
            Self::Uncollectible => "uncollectible",
            Self::Void => "void",
        }
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Mirrored payment method.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredPaymentMethod {
    /// Provider payment method ID.
    pub provider_payment_method_id: String,
    /// Provider customer ID the method is attached to.
    pub provider_customer_id: String,
    /// Method kind (e.g., "card").
    pub kind: String,
    /// Card brand, if a card.
    pub brand: Option<String>,
    /// Last four digits, if a card.
    pub last4: Option<String>,
    /// Expiry month, if a card.
    pub exp_month: Option<u8>,
    /// Expiry year, if a card.
    pub exp_year: Option<u16>,
    /// Whether this is the customer's default method.
    pub is_default: bool,
    /// Last updated timestamp.
    pub updated_at: u64,
}

/// Mirrored dispute.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredDispute {
    /// Provider dispute ID.
    pub provider_dispute_id: String,
    /// Provider charge ID being disputed.
    pub provider_charge_id: String,
    /// Provider customer ID.
    pub provider_customer_id: String,
    /// Disputed amount in cents.
    pub amount: i64,
    /// Currency code.
    pub currency: String,
    /// Provider reason string (e.g., "fraudulent").
    pub reason: String,
    /// Dispute status.
    pub status: DisputeStatus,
    /// Deadline for submitting evidence (unix seconds), if open.
    pub evidence_due_by: Option<u64>,
    /// Last updated timestamp.
    pub updated_at: u64,
}

/// Dispute status, mirroring the provider's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    NeedsResponse,
    UnderReview,
    Won,
    Lost,
    WarningClosed,
}

impl DisputeStatus {
    /// Parse from provider status string.
    #[must_use]
    pub fn from_provider(status: &str) -> Self {
        match status {
            "needs_response" | "warning_needs_response" => Self::NeedsResponse,
            "under_review" | "warning_under_review" => Self::UnderReview,
            "won" => Self::Won,
            "lost" => Self::Lost,
            "warning_closed" => Self::WarningClosed,
            _ => Self::UnderReview,
        }
    }

    /// Convert to the provider's string form.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NeedsResponse => "needs_response",
            Self::UnderReview => "under_review",
            Self::Won => "won",
            Self::Lost => "lost",
            Self::WarningClosed => "warning_closed",
        }
    }
}

impl std::fmt::Display for DisputeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A webhook event as recorded in the idempotency table.
///
/// The raw payload is persisted before processing so failed events can be
/// inspected and replayed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebhookEventRecord {
    /// Provider event ID.
    pub event_id: String,
    /// Provider event type (e.g., "invoice.payment_failed").
    pub event_type: String,
    /// The raw event payload.
    pub payload: serde_json::Value,
    /// Processing status.
    pub status: EventStatus,
    /// How many processing attempts have been made.
    pub attempts: u32,
    /// Error message from the last failed attempt.
    pub last_error: Option<String>,
    /// When the event was received (unix seconds).
    pub received_at: u64,
    /// When processing finished (unix seconds), if it has.
    pub processed_at: Option<u64>,
}

impl WebhookEventRecord {
    /// Build a freshly received record for an event.
    #[must_use]
    pub fn received(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            event_type: event_type.into(),
            payload,
            status: EventStatus::Received,
            attempts: 0,
            last_error: None,
            received_at: unix_now(),
            processed_at: None,
        }
    }

    /// Whether this event has reached a terminal status.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        !matches!(self.status, EventStatus::Received)
    }
}

/// Webhook event processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Recorded, processing not yet finished.
    Received,
    /// Processed successfully.
    Processed,
    /// Recognized but intentionally not handled.
    Skipped,
    /// Gave up after bounded attempts.
    Failed,
}

/// Trait for storing mirrored billing data.
///
/// Implement this trait to persist billing state to your database.
/// An in-memory implementation is provided for testing.
#[async_trait]
pub trait BillingStore: Send + Sync {
    // Customers

    /// Insert or overwrite the mirrored customer row.
    async fn upsert_customer(&self, customer: &StoredCustomer) -> Result<()>;

    /// Get a mirrored customer by provider customer ID.
    async fn get_customer(&self, provider_customer_id: &str) -> Result<Option<StoredCustomer>>;

    /// Find the mirrored customer for an account.
    async fn find_customer_by_account(&self, account_id: &str) -> Result<Option<StoredCustomer>>;

    // Subscriptions

    /// Insert or overwrite the mirrored subscription row.
    async fn upsert_subscription(&self, subscription: &StoredSubscription) -> Result<()>;

    /// Get a mirrored subscription by provider subscription ID.
    async fn get_subscription(
        &self,
        provider_subscription_id: &str,
    ) -> Result<Option<StoredSubscription>>;

    /// Find the mirrored subscription for a provider customer.
    async fn find_subscription_by_customer(
        &self,
        provider_customer_id: &str,
    ) -> Result<Option<StoredSubscription>>;

    /// Delete the mirrored subscription row.
    async fn delete_subscription(&self, provider_subscription_id: &str) -> Result<()>;

    // Invoices

    /// Insert or overwrite the mirrored invoice row.
    async fn upsert_invoice(&self, invoice: &StoredInvoice) -> Result<()>;

    /// Get a mirrored invoice by provider invoice ID.
    async fn get_invoice(&self, provider_invoice_id: &str) -> Result<Option<StoredInvoice>>;

    /// List mirrored invoices still open for a customer.
    async fn open_invoices_for_customer(
        &self,
        provider_customer_id: &str,
    ) -> Result<Vec<StoredInvoice>>;

    // Payment methods

    /// Insert or overwrite the mirrored payment method row.
    async fn upsert_payment_method(&self, method: &StoredPaymentMethod) -> Result<()>;

    /// Get a mirrored payment method by provider ID.
    async fn get_payment_method(
        &self,
        provider_payment_method_id: &str,
    ) -> Result<Option<StoredPaymentMethod>>;

    /// List mirrored payment methods for a customer.
    async fn list_payment_methods(
        &self,
        provider_customer_id: &str,
    ) -> Result<Vec<StoredPaymentMethod>>;

    /// Delete a mirrored payment method row (after detach).
    async fn delete_payment_method(&self, provider_payment_method_id: &str) -> Result<()>;

    /// Mark one method as the customer's default, clearing any previous default.
    async fn set_default_payment_method(
        &self,
        provider_customer_id: &str,
        provider_payment_method_id: &str,
    ) -> Result<()>;

    // Disputes

    /// Insert or overwrite the mirrored dispute row.
    async fn upsert_dispute(&self, dispute: &StoredDispute) -> Result<()>;

    /// Get a mirrored dispute by provider dispute ID.
    async fn get_dispute(&self, provider_dispute_id: &str) -> Result<Option<StoredDispute>>;

    // Webhook event log / idempotency table

    /// Record a received event if its ID is not already present.
    ///
    /// Returns `true` if the record was inserted, `false` if the event ID
    /// was already known (the stored record is left untouched).
    async fn record_event(&self, record: &WebhookEventRecord) -> Result<bool>;

    /// Get a recorded event by ID.
    async fn get_event(&self, event_id: &str) -> Result<Option<WebhookEventRecord>>;

    /// Mark an event as processed.
    async fn mark_event_processed(&self, event_id: &str, attempts: u32) -> Result<()>;

    /// Mark an event as recognized but skipped.
    async fn mark_event_skipped(&self, event_id: &str) -> Result<()>;

    /// Mark an event as permanently failed with its last error message.
    async fn mark_event_failed(&self, event_id: &str, attempts: u32, error: &str) -> Result<()>;
}

/// In-memory billing store for testing.
#[cfg(any(test, feature = "test-support"))]
pub mod test {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, RwLock};

    /// In-memory billing store for testing.
    ///
    /// Wraps data in Arc for cheap cloning.
    #[derive(Default, Clone)]
    pub struct InMemoryBillingStore {
        inner: Arc<InMemoryBillingStoreInner>,
    }

    #[derive(Default)]
    struct InMemoryBillingStoreInner {
        customers: RwLock<HashMap<String, StoredCustomer>>,
        subscriptions: RwLock<HashMap<String, StoredSubscription>>,
        invoices: RwLock<HashMap<String, StoredInvoice>>,
        payment_methods: RwLock<HashMap<String, StoredPaymentMethod>>,
        disputes: RwLock<HashMap<String, StoredDispute>>,
        events: RwLock<HashMap<String, WebhookEventRecord>>,
    }

    impl InMemoryBillingStore {
        /// Create a new in-memory store.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Number of mirrored subscription rows (for test assertions).
        pub fn subscription_count(&self) -> usize {
            self.inner.subscriptions.read().unwrap().len()
        }

        /// Number of mirrored invoice rows (for test assertions).
        pub fn invoice_count(&self) -> usize {
            self.inner.invoices.read().unwrap().len()
        }

        /// All recorded events (for test assertions).
        pub fn all_events(&self) -> Vec<WebhookEventRecord> {
            self.inner.events.read().unwrap().values().cloned().collect()
        }
    }

    #[async_trait]
    impl BillingStore for InMemoryBillingStore {
        async fn upsert_customer(&self, customer: &StoredCustomer) -> Result<()> {
            self.inner
                .customers
                .write()
                .unwrap()
                .insert(customer.provider_customer_id.clone(), customer.clone());
            Ok(())
        }

        async fn get_customer(&self, provider_customer_id: &str) -> Result<Option<StoredCustomer>> {
            Ok(self
                .inner
                .customers
                .read()
                .unwrap()
                .get(provider_customer_id)
                .cloned())
        }

        async fn find_customer_by_account(
            &self,
            account_id: &str,
        ) -> Result<Option<StoredCustomer>> {
            let customers = self.inner.customers.read().unwrap();
            Ok(customers
                .values()
                .find(|c| c.account_id == account_id)
                .cloned())
        }

        async fn upsert_subscription(&self, subscription: &StoredSubscription) -> Result<()> {
            self.inner.subscriptions.write().unwrap().insert(
                subscription.provider_subscription_id.clone(),
                subscription.clone(),
            );
            Ok(())
        }

        async fn get_subscription(
            &self,
            provider_subscription_id: &str,
        ) -> Result<Option<StoredSubscription>> {
            Ok(self
                .inner
                .subscriptions
                .read()
                .unwrap()
                .get(provider_subscription_id)
                .cloned())
        }

        async fn find_subscription_by_customer(
            &self,
            provider_customer_id: &str,
        ) -> Result<Option<StoredSubscription>> {
            let subs = self.inner.subscriptions.read().unwrap();
            Ok(subs
                .values()
                .find(|s| s.provider_customer_id == provider_customer_id)
                .cloned())
        }

        async fn delete_subscription(&self, provider_subscription_id: &str) -> Result<()> {
            self.inner
                .subscriptions
                .write()
                .unwrap()
                .remove(provider_subscription_id);
            Ok(())
        }

        async fn upsert_invoice(&self, invoice: &StoredInvoice) -> Result<()> {
            self.inner
                .invoices
                .write()
                .unwrap()
                .insert(invoice.provider_invoice_id.clone(), invoice.clone());
            Ok(())
        }

        async fn get_invoice(&self, provider_invoice_id: &str) -> Result<Option<StoredInvoice>> {
            Ok(self
                .inner
                .invoices
                .read()
                .unwrap()
                .get(provider_invoice_id)
                .cloned())
        }

        async fn open_invoices_for_customer(
            &self,
            provider_customer_id: &str,
        ) -> Result<Vec<StoredInvoice>> {
            let invoices = self.inner.invoices.read().unwrap();
            let mut open: Vec<StoredInvoice> = invoices
                .values()
                .filter(|i| {
                    i.provider_customer_id == provider_customer_id
                        && i.status == InvoiceStatus::Open
                })
                .cloned()
                .collect();
            open.sort_by(|a, b| a.provider_invoice_id.cmp(&b.provider_invoice_id));
            Ok(open)
        }

        async fn upsert_payment_method(&self, method: &StoredPaymentMethod) -> Result<()> {
            self.inner
                .payment_methods
                .write()
                .unwrap()
                .insert(method.provider_payment_method_id.clone(), method.clone());
            Ok(())
        }

        async fn get_payment_method(
            &self,
            provider_payment_method_id: &str,
        ) -> Result<Option<StoredPaymentMethod>> {
            Ok(self
                .inner
                .payment_methods
                .read()
                .unwrap()
                .get(provider_payment_method_id)
                .cloned())
        }

        async fn list_payment_methods(
            &self,
            provider_customer_id: &str,
        ) -> Result<Vec<StoredPaymentMethod>> {
            let methods = self.inner.payment_methods.read().unwrap();
            let mut list: Vec<StoredPaymentMethod> = methods
                .values()
                .filter(|m| m.provider_customer_id == provider_customer_id)
                .cloned()
                .collect();
            list.sort_by(|a, b| {
                a.provider_payment_method_id.cmp(&b.provider_payment_method_id)
            });
            Ok(list)
        }

        async fn delete_payment_method(&self, provider_payment_method_id: &str) -> Result<()> {
            self.inner
                .payment_methods
                .write()
                .unwrap()
                .remove(provider_payment_method_id);
            Ok(())
        }

        async fn set_default_payment_method(
            &self,
            provider_customer_id: &str,
            provider_payment_method_id: &str,
        ) -> Result<()> {
            let mut methods = self.inner.payment_methods.write().unwrap();
            for method in methods.values_mut() {
                if method.provider_customer_id == provider_customer_id {
                    method.is_default =
                        method.provider_payment_method_id == provider_payment_method_id;
                    method.updated_at = unix_now();
                }
            }
            Ok(())
        }

        async fn upsert_dispute(&self, dispute: &StoredDispute) -> Result<()> {
            self.inner
                .disputes
                .write()
                .unwrap()
                .insert(dispute.provider_dispute_id.clone(), dispute.clone());
            Ok(())
        }

        async fn get_dispute(&self, provider_dispute_id: &str) -> Result<Option<StoredDispute>> {
            Ok(self
                .inner
                .disputes
                .read()
                .unwrap()
                .get(provider_dispute_id)
                .cloned())
        }

        async fn record_event(&self, record: &WebhookEventRecord) -> Result<bool> {
            let mut events = self.inner.events.write().unwrap();
            if events.contains_key(&record.event_id) {
                return Ok(false);
            }
            events.insert(record.event_id.clone(), record.clone());
            Ok(true)
        }

        async fn get_event(&self, event_id: &str) -> Result<Option<WebhookEventRecord>> {
            Ok(self.inner.events.read().unwrap().get(event_id).cloned())
        }

        async fn mark_event_processed(&self, event_id: &str, attempts: u32) -> Result<()> {
            let mut events = self.inner.events.write().unwrap();
            if let Some(event) = events.get_mut(event_id) {
                event.status = EventStatus::Processed;
                event.attempts = attempts;
                event.last_error = None;
                event.processed_at = Some(unix_now());
            }
            Ok(())
        }

        async fn mark_event_skipped(&self, event_id: &str) -> Result<()> {
            let mut events = self.inner.events.write().unwrap();
            if let Some(event) = events.get_mut(event_id) {
                event.status = EventStatus::Skipped;
                event.processed_at = Some(unix_now());
            }
            Ok(())
        }

        async fn mark_event_failed(&self, event_id: &str, attempts: u32, error: &str) -> Result<()> {
            let mut events = self.inner.events.write().unwrap();
            if let Some(event) = events.get_mut(event_id) {
                event.status = EventStatus::Failed;
                event.attempts = attempts;
                event.last_error = Some(error.to_string());
                event.processed_at = Some(unix_now());
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test::InMemoryBillingStore;
    use super::*;

    fn sample_subscription() -> StoredSubscription {
        StoredSubscription {
            provider_subscription_id: "sub_123".to_string(),
            provider_customer_id: "cus_123".to_string(),
            price_id: "price_starter".to_string(),
            status: SubscriptionStatus::Active,
            current_period_start: 1_700_000_000,
            current_period_end: 1_702_592_000,
            cancel_at_period_end: false,
            updated_at: 1_700_000_000,
        }
    }

    #[test]
    fn test_subscription_status_from_provider() {
        assert_eq!(
            SubscriptionStatus::from_provider("active"),
            SubscriptionStatus::Active
        );
        assert_eq!(
            SubscriptionStatus::from_provider("past_due"),
            SubscriptionStatus::PastDue
        );
        assert_eq!(
            SubscriptionStatus::from_provider("unknown"),
            SubscriptionStatus::Canceled
        );
    }

    #[test]
    fn test_subscription_helpers() {
        let mut sub = sample_subscription();
        assert!(sub.is_active());
        assert!(!sub.is_past_due());

        sub.status = SubscriptionStatus::PastDue;
        assert!(!sub.is_active());
        assert!(sub.is_past_due());
    }

    #[test]
    fn test_invoice_status_roundtrip() {
        assert_eq!(InvoiceStatus::from_provider("open"), InvoiceStatus::Open);
        assert_eq!(InvoiceStatus::from_provider("paid"), InvoiceStatus::Paid);
        assert_eq!(
            InvoiceStatus::from_provider("uncollectible"),
            InvoiceStatus::Uncollectible
        );
        assert_eq!(InvoiceStatus::Open.as_str(), "open");
    }

    #[test]
    fn test_dispute_status_from_provider() {
        assert_eq!(
            DisputeStatus::from_provider("needs_response"),
            DisputeStatus::NeedsResponse
        );
        assert_eq!(
            DisputeStatus::from_provider("warning_needs_response"),
            DisputeStatus::NeedsResponse
        );
        assert_eq!(DisputeStatus::from_provider("won"), DisputeStatus::Won);
    }

    #[tokio::test]
    async fn test_upsert_subscription_never_duplicates() {
        let store = InMemoryBillingStore::new();
        let sub = sample_subscription();

        store.upsert_subscription(&sub).await.unwrap();
        let mut updated = sub.clone();
        updated.status = SubscriptionStatus::PastDue;
        store.upsert_subscription(&updated).await.unwrap();

        assert_eq!(store.subscription_count(), 1);
        let loaded = store.get_subscription("sub_123").await.unwrap().unwrap();
        assert_eq!(loaded.status, SubscriptionStatus::PastDue);
    }

    #[tokio::test]
    async fn test_customer_lookup_by_account() {
        let store = InMemoryBillingStore::new();
        let customer = StoredCustomer {
            account_id: "acct_1".to_string(),
            provider_customer_id: "cus_abc".to_string(),
            email: "owner@plumbco.example".to_string(),
            default_payment_method: None,
            delinquent: false,
            updated_at: 0,
        };
        store.upsert_customer(&customer).await.unwrap();

        let found = store.find_customer_by_account("acct_1").await.unwrap().unwrap();
        assert_eq!(found.provider_customer_id, "cus_abc");
        assert!(store.find_customer_by_account("acct_2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_open_invoices_filter() {
        let store = InMemoryBillingStore::new();
        for (id, status) in [
            ("in_1", InvoiceStatus::Open),
            ("in_2", InvoiceStatus::Paid),
            ("in_3", InvoiceStatus::Open),
        ] {
            store
                .upsert_invoice(&StoredInvoice {
                    provider_invoice_id: id.to_string(),
                    provider_customer_id: "cus_123".to_string(),
                    provider_subscription_id: Some("sub_123".to_string()),
                    status,
                    amount_due: 4900,
                    amount_paid: 0,
                    attempt_count: 1,
                    last_payment_error: None,
                    updated_at: 0,
                })
                .await
                .unwrap();
        }

        let open = store.open_invoices_for_customer("cus_123").await.unwrap();
        assert_eq!(open.len(), 2);
        assert_eq!(open[0].provider_invoice_id, "in_1");
        assert_eq!(open[1].provider_invoice_id, "in_3");
    }

    #[tokio::test]
    async fn test_set_default_payment_method_clears_previous() {
        let store = InMemoryBillingStore::new();
        for (id, is_default) in [("pm_1", true), ("pm_2", false)] {
            store
                .upsert_payment_method(&StoredPaymentMethod {
                    provider_payment_method_id: id.to_string(),
                    provider_customer_id: "cus_123".to_string(),
                    kind: "card".to_string(),
                    brand: Some("visa".to_string()),
                    last4: Some("4242".to_string()),
                    exp_month: Some(12),
                    exp_year: Some(2030),
                    is_default,
                    updated_at: 0,
                })
                .await
                .unwrap();
        }

        store
            .set_default_payment_method("cus_123", "pm_2")
            .await
            .unwrap();

        let methods = store.list_payment_methods("cus_123").await.unwrap();
        let pm_1 = methods.iter().find(|m| m.provider_payment_method_id == "pm_1").unwrap();
        let pm_2 = methods.iter().find(|m| m.provider_payment_method_id == "pm_2").unwrap();
        assert!(!pm_1.is_default);
        assert!(pm_2.is_default);
    }

    #[tokio::test]
    async fn test_record_event_is_insert_if_absent() {
        let store = InMemoryBillingStore::new();
        let record = WebhookEventRecord::received(
            "evt_1",
            "invoice.paid",
            serde_json::json!({"id": "evt_1"}),
        );

        assert!(store.record_event(&record).await.unwrap());
        // Second insert with the same ID reports a duplicate and keeps the original.
        assert!(!store.record_event(&record).await.unwrap());

        store.mark_event_processed("evt_1", 1).await.unwrap();
        let loaded = store.get_event("evt_1").await.unwrap().unwrap();
        assert_eq!(loaded.status, EventStatus::Processed);
        assert_eq!(loaded.attempts, 1);
        assert!(loaded.processed_at.is_some());
    }

    #[tokio::test]
    async fn test_mark_event_failed_records_error() {
        let store = InMemoryBillingStore::new();
        let record = WebhookEventRecord::received(
            "evt_2",
            "customer.subscription.updated",
            serde_json::json!({"id": "evt_2"}),
        );
        store.record_event(&record).await.unwrap();

        store
            .mark_event_failed("evt_2", 3, "store write failed")
            .await
            .unwrap();

        let loaded = store.get_event("evt_2").await.unwrap().unwrap();
        assert_eq!(loaded.status, EventStatus::Failed);
        assert_eq!(loaded.attempts, 3);
        assert_eq!(loaded.last_error.as_deref(), Some("store write failed"));
        assert!(loaded.is_settled());
    }
}
