//! Subscription management.
//!
//! Handles the subscription lifecycle: creation, plan changes with proration
//! preview and execution, cancellation, and webhook-driven mirror syncing.

use super::error::BillingError;
use super::storage::{BillingStore, StoredSubscription, SubscriptionStatus};
use crate::error::Result;
use crate::util::unix_now;

/// Subscription management operations.
pub struct SubscriptionManager<S: BillingStore, C: ProviderSubscriptionClient> {
    store: S,
    client: C,
}

impl<S: BillingStore, C: ProviderSubscriptionClient> SubscriptionManager<S, C> {
    /// Create a new subscription manager.
    #[must_use]
    pub fn new(store: S, client: C) -> Self {
        Self { store, client }
    }

    /// Start a subscription for an account on the given price.
    ///
    /// The account must already have a linked provider customer. Provider
    /// rejections (declined card, unknown price) surface as typed
    /// [`BillingError`] values.
    pub async fn start_subscription(
        &self,
        account_id: &str,
        price_id: &str,
    ) -> Result<StoredSubscription> {
        let customer = self
            .store
            .find_customer_by_account(account_id)
            .await?
            .ok_or(BillingError::NoCustomer {
                account_id: account_id.to_string(),
            })?;

        let created = self
            .client
            .create_subscription(CreateSubscriptionRequest {
                customer_id: customer.provider_customer_id.clone(),
                price_id: price_id.to_string(),
            })
            .await?;

        let mirrored = mirror_of(&created);
        self.store.upsert_subscription(&mirrored).await?;

        tracing::info!(
            target: "quotewise::billing::subscription",
            account_id,
            subscription_id = %mirrored.provider_subscription_id,
            price_id,
            "Started subscription"
        );

        Ok(mirrored)
    }

    /// Get the mirrored subscription for an account.
    pub async fn current_subscription(
        &self,
        account_id: &str,
    ) -> Result<Option<StoredSubscription>> {
        let Some(customer) = self.store.find_customer_by_account(account_id).await? else {
            return Ok(None);
        };
        self.store
            .find_subscription_by_customer(&customer.provider_customer_id)
            .await
    }

    /// Preview the proration of moving an account to a new price.
    ///
    /// Read-only: nothing changes at the provider or in the mirror.
    pub async fn preview_plan_change(
        &self,
        account_id: &str,
        new_price_id: &str,
    ) -> Result<ProrationPreview> {
        let subscription = self.require_subscription(account_id).await?;
        self.client
            .preview_proration(&subscription.provider_subscription_id, new_price_id)
            .await
    }

    /// Move an account to a new price, creating prorations.
    pub async fn change_plan(
        &self,
        account_id: &str,
        new_price_id: &str,
    ) -> Result<StoredSubscription> {
        let subscription = self.require_subscription(account_id).await?;

        let updated = self
            .client
            .update_subscription_price(
                &subscription.provider_subscription_id,
                new_price_id,
                ProrationBehavior::CreateProrations,
            )
            .await?;

        let mirrored = mirror_of(&updated);
        self.store.upsert_subscription(&mirrored).await?;

        tracing::info!(
            target: "quotewise::billing::subscription",
            account_id,
            subscription_id = %mirrored.provider_subscription_id,
            new_price_id,
            "Changed plan"
        );

        Ok(mirrored)
    }

    /// Cancel an account's subscription.
    ///
    /// With `at_period_end` the subscription stays active until the current
    /// period closes; otherwise it is canceled immediately.
    pub async fn cancel(&self, account_id: &str, at_period_end: bool) -> Result<StoredSubscription> {
        let subscription = self.require_subscription(account_id).await?;

        let canceled = self
            .client
            .cancel_subscription(&subscription.provider_subscription_id, at_period_end)
            .await?;

        let mirrored = mirror_of(&canceled);
        self.store.upsert_subscription(&mirrored).await?;
        Ok(mirrored)
    }

    /// Upsert the mirror from a provider-side subscription object.
    ///
    /// This is the webhook path. Keyed by provider subscription ID, so
    /// reprocessing the same event overwrites rather than duplicates.
    pub async fn sync_from_provider(&self, data: ProviderSubscription) -> Result<()> {
        let mirrored = mirror_of(&data);
        self.store.upsert_subscription(&mirrored).await
    }

    /// Remove the mirror after the provider deleted the subscription.
    pub async fn sync_deleted(&self, provider_subscription_id: &str) -> Result<()> {
        self.store.delete_subscription(provider_subscription_id).await
    }

    /// Flip the mirrored status after an invoice payment event.
    ///
    /// `invoice.paid` flips to active, `invoice.payment_failed` to past_due.
    /// The next subscription.updated event from the provider overwrites.
    pub async fn mark_status(
        &self,
        provider_subscription_id: &str,
        status: SubscriptionStatus,
    ) -> Result<()> {
        if let Some(mut subscription) =
            self.store.get_subscription(provider_subscription_id).await?
        {
            subscription.status = status;
            subscription.updated_at = unix_now();
            self.store.upsert_subscription(&subscription).await?;
        }
        Ok(())
    }

    async fn require_subscription(&self, account_id: &str) -> Result<StoredSubscription> {
        self.current_subscription(account_id)
            .await?
            .ok_or_else(|| {
                BillingError::NoSubscription {
                    account_id: account_id.to_string(),
                }
                .into()
            })
    }
}

fn mirror_of(subscription: &ProviderSubscription) -> StoredSubscription {
    StoredSubscription {
        provider_subscription_id: subscription.id.clone(),
        provider_customer_id: subscription.customer_id.clone(),
        price_id: subscription.price_id.clone(),
        status: SubscriptionStatus::from_provider(&subscription.status),
        current_period_start: subscription.current_period_start,
        current_period_end: subscription.current_period_end,
        cancel_at_period_end: subscription.cancel_at_period_end,
        updated_at: unix_now(),
    }
}

/// Request to create a provider subscription.
#[derive(Debug, Clone)]
pub struct CreateSubscriptionRequest {
    /// Provider customer ID.
    pub customer_id: String,
    /// Provider price ID.
    pub price_id: String,
}

/// A subscription as returned by the provider.
#[derive(Debug, Clone)]
pub struct ProviderSubscription {
    /// Provider subscription ID.
    pub id: String,
    /// Provider customer ID.
    pub customer_id: String,
    /// Provider price ID.
    pub price_id: String,
    /// Provider status string.
    pub status: String,
    /// Current billing period start (unix seconds).
    pub current_period_start: u64,
    /// Current billing period end (unix seconds).
    pub current_period_end: u64,
    /// Whether the subscription will cancel at period end.
    pub cancel_at_period_end: bool,
}

/// How to handle proration on plan changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProrationBehavior {
    /// Create prorations for any changes (default).
    CreateProrations,
    /// Don't create prorations.
    None,
}

impl ProrationBehavior {
    /// Convert to the provider's string form.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateProrations => "create_prorations",
            Self::None => "none",
        }
    }
}

/// Preview of the proration a plan change would produce.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ProrationPreview {
    /// Net amount due now in cents; negative means a credit.
    pub amount_due: i64,
    /// Currency code.
    pub currency: String,
    /// Timestamp the proration would be computed at.
    pub proration_date: u64,
    /// Human-readable proration line descriptions.
    pub lines: Vec<String>,
}

/// Trait for provider subscription operations.
pub trait ProviderSubscriptionClient: Send + Sync {
    /// Create a new subscription at the provider.
    fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> impl std::future::Future<Output = Result<ProviderSubscription>> + Send;

    /// Get a subscription from the provider.
    fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> impl std::future::Future<Output = Result<ProviderSubscription>> + Send;

    /// Change the subscription's price.
    fn update_subscription_price(
        &self,
        subscription_id: &str,
        new_price_id: &str,
        proration: ProrationBehavior,
    ) -> impl std::future::Future<Output = Result<ProviderSubscription>> + Send;

    /// Cancel the subscription, either immediately or at period end.
    fn cancel_subscription(
        &self,
        subscription_id: &str,
        at_period_end: bool,
    ) -> impl std::future::Future<Output = Result<ProviderSubscription>> + Send;

    /// Preview the proration of moving the subscription to a new price.
    fn preview_proration(
        &self,
        subscription_id: &str,
        new_price_id: &str,
    ) -> impl std::future::Future<Output = Result<ProrationPreview>> + Send;
}

/// Mock provider subscription client for testing.
#[cfg(any(test, feature = "test-support"))]
pub mod test {
    use super::*;
    use std::collections::HashMap;
    use std::sync::RwLock;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    const PERIOD_SECS: u64 = 30 * 86400;

    /// Mock provider subscription client.
    ///
    /// Prices must be registered with [`register_price`] before use;
    /// creating or moving to an unregistered price fails the way the real
    /// provider rejects an unknown price ID.
    ///
    /// [`register_price`]: MockProviderSubscriptionClient::register_price
    #[derive(Default)]
    pub struct MockProviderSubscriptionClient {
        subscription_counter: AtomicU64,
        subscriptions: RwLock<HashMap<String, ProviderSubscription>>,
        prices: RwLock<HashMap<String, i64>>,
        decline_next_create: AtomicBool,
    }

    impl MockProviderSubscriptionClient {
        /// Create a new mock client.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Register a price ID with its per-period amount in cents.
        pub fn register_price(&self, price_id: &str, amount_cents: i64) {
            self.prices
                .write()
                .unwrap()
                .insert(price_id.to_string(), amount_cents);
        }

        /// Make the next create_subscription fail with a card decline.
        pub fn decline_next_create(&self) {
            self.decline_next_create.store(true, Ordering::SeqCst);
        }

        fn price_amount(&self, price_id: &str) -> Result<i64> {
            self.prices.read().unwrap().get(price_id).copied().ok_or_else(|| {
                super::super::error::BillingError::InvalidPrice {
                    price_id: price_id.to_string(),
                }
                .into()
            })
        }
    }

    impl ProviderSubscriptionClient for MockProviderSubscriptionClient {
        async fn create_subscription(
            &self,
            request: CreateSubscriptionRequest,
        ) -> Result<ProviderSubscription> {
            self.price_amount(&request.price_id)?;

            if self.decline_next_create.swap(false, Ordering::SeqCst) {
                return Err(super::super::error::BillingError::CardDeclined {
                    message: "Your card was declined.".to_string(),
                    decline_code: Some("generic_decline".to_string()),
                }
                .into());
            }

            let id = format!(
                "sub_test_{}",
                self.subscription_counter.fetch_add(1, Ordering::SeqCst)
            );
            let start = crate::util::unix_now();
            let subscription = ProviderSubscription {
                id: id.clone(),
                customer_id: request.customer_id,
                price_id: request.price_id,
                status: "active".to_string(),
                current_period_start: start,
                current_period_end: start + PERIOD_SECS,
                cancel_at_period_end: false,
            };
            self.subscriptions
                .write()
                .unwrap()
                .insert(id, subscription.clone());
            Ok(subscription)
        }

        async fn get_subscription(&self, subscription_id: &str) -> Result<ProviderSubscription> {
            self.subscriptions
                .read()
                .unwrap()
                .get(subscription_id)
                .cloned()
                .ok_or_else(|| {
                    super::super::error::BillingError::SubscriptionNotFound {
                        subscription_id: subscription_id.to_string(),
                    }
                    .into()
                })
        }

        async fn update_subscription_price(
            &self,
            subscription_id: &str,
            new_price_id: &str,
            _proration: ProrationBehavior,
        ) -> Result<ProviderSubscription> {
            self.price_amount(new_price_id)?;

            let mut subscriptions = self.subscriptions.write().unwrap();
            let subscription = subscriptions.get_mut(subscription_id).ok_or({
                super::super::error::BillingError::SubscriptionNotFound {
                    subscription_id: subscription_id.to_string(),
                }
            })?;
            subscription.price_id = new_price_id.to_string();
            Ok(subscription.clone())
        }

        async fn cancel_subscription(
            &self,
            subscription_id: &str,
            at_period_end: bool,
        ) -> Result<ProviderSubscription> {
            let mut subscriptions = self.subscriptions.write().unwrap();
            let subscription = subscriptions.get_mut(subscription_id).ok_or({
                super::super::error::BillingError::SubscriptionNotFound {
                    subscription_id: subscription_id.to_string(),
                }
            })?;
            if at_period_end {
                subscription.cancel_at_period_end = true;
            } else {
                subscription.status = "canceled".to_string();
            }
            Ok(subscription.clone())
        }

        async fn preview_proration(
            &self,
            subscription_id: &str,
            new_price_id: &str,
        ) -> Result<ProrationPreview> {
            let new_amount = self.price_amount(new_price_id)?;
            let subscription = self.get_subscription(subscription_id).await?;
            let old_amount = self.price_amount(&subscription.price_id)?;

            // Full-period swap: credit the old price, charge the new one.
            Ok(ProrationPreview {
                amount_due: new_amount - old_amount,
                currency: "usd".to_string(),
                proration_date: crate::util::unix_now(),
                lines: vec![
                    format!("Unused time on {}", subscription.price_id),
                    format!("Remaining time on {}", new_price_id),
                ],
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test::MockProviderSubscriptionClient;
    use super::*;
    use crate::billing::storage::StoredCustomer;
    use crate::billing::storage::test::InMemoryBillingStore;

    async fn store_with_customer() -> InMemoryBillingStore {
        let store = InMemoryBillingStore::new();
        store
            .upsert_customer(&StoredCustomer {
                account_id: "acct_1".to_string(),
                provider_customer_id: "cus_1".to_string(),
                email: "owner@plumbco.example".to_string(),
                default_payment_method: Some("pm_1".to_string()),
                delinquent: false,
                updated_at: 0,
            })
            .await
            .unwrap();
        store
    }

    fn client_with_prices() -> MockProviderSubscriptionClient {
        let client = MockProviderSubscriptionClient::new();
        client.register_price("price_starter", 2900);
        client.register_price("price_pro", 7900);
        client
    }

    #[tokio::test]
    async fn test_start_subscription_mirrors_row() {
        let store = store_with_customer().await;
        let manager = SubscriptionManager::new(store.clone(), client_with_prices());

        let subscription = manager
            .start_subscription("acct_1", "price_starter")
            .await
            .unwrap();
        assert_eq!(subscription.status, SubscriptionStatus::Active);
        assert_eq!(subscription.price_id, "price_starter");
        assert_eq!(store.subscription_count(), 1);
    }

    #[tokio::test]
    async fn test_start_subscription_without_customer() {
        let store = InMemoryBillingStore::new();
        let manager = SubscriptionManager::new(store, client_with_prices());

        let result = manager.start_subscription("acct_unknown", "price_starter").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_start_subscription_invalid_price() {
        let store = store_with_customer().await;
        let manager = SubscriptionManager::new(store, client_with_prices());

        let result = manager.start_subscription("acct_1", "price_bogus").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_start_subscription_card_declined() {
        let store = store_with_customer().await;
        let client = client_with_prices();
        client.decline_next_create();
        let manager = SubscriptionManager::new(store.clone(), client);

        let result = manager.start_subscription("acct_1", "price_starter").await;
        assert!(result.is_err());
        // Nothing mirrored on failure.
        assert_eq!(store.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_preview_plan_change_is_read_only() {
        let store = store_with_customer().await;
        let manager = SubscriptionManager::new(store.clone(), client_with_prices());

        manager.start_subscription("acct_1", "price_starter").await.unwrap();
        let preview = manager
            .preview_plan_change("acct_1", "price_pro")
            .await
            .unwrap();

        assert_eq!(preview.amount_due, 5000);
        assert_eq!(preview.lines.len(), 2);

        // Mirror still on the old price.
        let current = manager.current_subscription("acct_1").await.unwrap().unwrap();
        assert_eq!(current.price_id, "price_starter");
    }

    #[tokio::test]
    async fn test_change_plan_executes_proration() {
        let store = store_with_customer().await;
        let manager = SubscriptionManager::new(store.clone(), client_with_prices());

        manager.start_subscription("acct_1", "price_starter").await.unwrap();
        let updated = manager.change_plan("acct_1", "price_pro").await.unwrap();

        assert_eq!(updated.price_id, "price_pro");
        let current = manager.current_subscription("acct_1").await.unwrap().unwrap();
        assert_eq!(current.price_id, "price_pro");
        assert_eq!(store.subscription_count(), 1);
    }

    #[tokio::test]
    async fn test_cancel_at_period_end() {
        let store = store_with_customer().await;
        let manager = SubscriptionManager::new(store, client_with_prices());

        manager.start_subscription("acct_1", "price_starter").await.unwrap();
        let canceled = manager.cancel("acct_1", true).await.unwrap();

        assert!(canceled.cancel_at_period_end);
        assert_eq!(canceled.status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn test_cancel_immediately() {
        let store = store_with_customer().await;
        let manager = SubscriptionManager::new(store, client_with_prices());

        manager.start_subscription("acct_1", "price_starter").await.unwrap();
        let canceled = manager.cancel("acct_1", false).await.unwrap();

        assert_eq!(canceled.status, SubscriptionStatus::Canceled);
    }

    #[tokio::test]
    async fn test_sync_from_provider_upserts() {
        let store = InMemoryBillingStore::new();
        let manager = SubscriptionManager::new(store.clone(), client_with_prices());

        let data = ProviderSubscription {
            id: "sub_hook".to_string(),
            customer_id: "cus_1".to_string(),
            price_id: "price_starter".to_string(),
            status: "active".to_string(),
            current_period_start: 1_700_000_000,
            current_period_end: 1_702_592_000,
            cancel_at_period_end: false,
        };

        manager.sync_from_provider(data.clone()).await.unwrap();
        manager.sync_from_provider(data).await.unwrap();

        assert_eq!(store.subscription_count(), 1);
    }

    #[tokio::test]
    async fn test_mark_status() {
        let store = InMemoryBillingStore::new();
        let manager = SubscriptionManager::new(store.clone(), client_with_prices());

        manager
            .sync_from_provider(ProviderSubscription {
                id: "sub_1".to_string(),
                customer_id: "cus_1".to_string(),
                price_id: "price_starter".to_string(),
                status: "active".to_string(),
                current_period_start: 0,
                current_period_end: 0,
                cancel_at_period_end: false,
            })
            .await
            .unwrap();

        manager
            .mark_status("sub_1", SubscriptionStatus::PastDue)
            .await
            .unwrap();

        let loaded = store.get_subscription("sub_1").await.unwrap().unwrap();
        assert!(loaded.is_past_due());
    }

    #[tokio::test]
    async fn test_sync_deleted_removes_mirror() {
        let store = InMemoryBillingStore::new();
        let manager = SubscriptionManager::new(store.clone(), client_with_prices());

        manager
            .sync_from_provider(ProviderSubscription {
                id: "sub_gone".to_string(),
                customer_id: "cus_1".to_string(),
                price_id: "price_starter".to_string(),
                status: "active".to_string(),
                current_period_start: 0,
                current_period_end: 0,
                cancel_at_period_end: false,
            })
            .await
            .unwrap();

        manager.sync_deleted("sub_gone").await.unwrap();
        assert_eq!(store.subscription_count(), 0);
    }
}
