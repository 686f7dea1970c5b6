//! Billing coordination against the payment provider.
//!
//! Every persisted entity here is a mirror of a provider-side object keyed
//! by the provider's ID; the provider stays the source of truth and
//! webhooks keep the mirrors current. The managers cover the edge cases a
//! subscription business actually hits: failed-payment retry, proration
//! preview and execution, refund and credit issuance, dispute handling,
//! and payment-method-failure recovery.
//!
//! # Example
//!
//! ```rust,ignore
//! use quotewise::billing::{CustomerManager, SubscriptionManager, WebhookProcessor};
//!
//! let customers = CustomerManager::new(store.clone(), customer_client);
//! let customer = customers.get_or_create_customer("acct_42", "owner@shop.example").await?;
//!
//! let subscriptions = SubscriptionManager::new(store.clone(), subscription_client);
//! subscriptions.start_subscription("acct_42", "price_starter").await?;
//!
//! // Preview what an upgrade would cost before committing.
//! let preview = subscriptions.preview_plan_change("acct_42", "price_pro").await?;
//! if preview.amount_due <= budget {
//!     subscriptions.change_plan("acct_42", "price_pro").await?;
//! }
//! ```

pub mod customer;
pub mod dispute;
pub mod error;
pub mod invoice;
pub mod payment;
pub mod refund;
pub mod storage;
pub mod subscription;
pub mod webhook;

// Storage exports
pub use storage::{
    BillingStore, DisputeStatus, EventStatus, InvoiceStatus, StoredCustomer, StoredDispute,
    StoredInvoice, StoredPaymentMethod, StoredSubscription, SubscriptionStatus,
    WebhookEventRecord,
};

// Customer exports
pub use customer::{
    CreateCustomerRequest, CustomerManager, ProviderCustomer, ProviderCustomerClient,
    ProviderCustomerData, UpdateCustomerRequest,
};

// Subscription exports
pub use subscription::{
    CreateSubscriptionRequest, ProrationBehavior, ProrationPreview, ProviderSubscription,
    ProviderSubscriptionClient, SubscriptionManager,
};

// Invoice exports
pub use invoice::{InvoiceManager, ProviderInvoice, ProviderInvoiceClient};

// Payment method exports
pub use payment::{
    PaymentMethodManager, ProviderPaymentMethod, ProviderPaymentMethodClient, RecoveryReport,
};

// Dispute exports
pub use dispute::{DisputeEvidence, DisputeManager, ProviderDispute, ProviderDisputeClient};

// Refund exports
pub use refund::{
    CreateRefundRequest, CreditNote, ProviderRefundClient, Refund, RefundManager, RefundReason,
    RefundStatus,
};

// Webhook exports
pub use webhook::{WebhookEvent, WebhookEventData, WebhookOutcome, WebhookProcessor};

// Error exports
pub use error::BillingError;

// Test exports
#[cfg(any(test, feature = "test-support"))]
pub use storage::test::InMemoryBillingStore;

#[cfg(any(test, feature = "test-support"))]
pub use customer::test::MockProviderCustomerClient;

#[cfg(any(test, feature = "test-support"))]
pub use subscription::test::MockProviderSubscriptionClient;

#[cfg(any(test, feature = "test-support"))]
pub use invoice::test::MockProviderInvoiceClient;

#[cfg(any(test, feature = "test-support"))]
pub use payment::test::MockProviderPaymentMethodClient;

#[cfg(any(test, feature = "test-support"))]
pub use dispute::test::MockProviderDisputeClient;

#[cfg(any(test, feature = "test-support"))]
pub use refund::test::MockProviderRefundClient;
