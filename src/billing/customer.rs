//! Customer management.
//!
//! Creates provider customers for quoting-tool accounts and keeps the
//! mirrored customer row in sync.

use super::storage::{BillingStore, StoredCustomer};
use crate::error::Result;
use crate::util::unix_now;

/// Customer management operations.
///
/// Links accounts to provider customers and mirrors the result locally.
pub struct CustomerManager<S: BillingStore, C: ProviderCustomerClient> {
    store: S,
    client: C,
}

impl<S: BillingStore, C: ProviderCustomerClient> CustomerManager<S, C> {
    /// Create a new customer manager.
    #[must_use]
    pub fn new(store: S, client: C) -> Self {
        Self { store, client }
    }

    /// Get the mirrored customer for an account, creating one if needed.
    ///
    /// 1. Check if the account already has a mirrored customer
    /// 2. If not, create a new customer at the provider
    /// 3. Mirror the new customer locally
    pub async fn get_or_create_customer(
        &self,
        account_id: &str,
        email: &str,
    ) -> Result<StoredCustomer> {
        if let Some(existing) = self.store.find_customer_by_account(account_id).await? {
            return Ok(existing);
        }

        let created = self
            .client
            .create_customer(CreateCustomerRequest {
                email: email.to_string(),
                account_id: account_id.to_string(),
            })
            .await?;

        let mirrored = StoredCustomer {
            account_id: account_id.to_string(),
            provider_customer_id: created.id,
            email: created.email,
            default_payment_method: created.default_payment_method,
            delinquent: created.delinquent,
            updated_at: unix_now(),
        };
        self.store.upsert_customer(&mirrored).await?;

        tracing::info!(
            target: "quotewise::billing::customer",
            account_id,
            customer_id = %mirrored.provider_customer_id,
            "Created provider customer"
        );

        Ok(mirrored)
    }

    /// Get the mirrored customer for an account (without creating).
    pub async fn get_customer(&self, account_id: &str) -> Result<Option<StoredCustomer>> {
        self.store.find_customer_by_account(account_id).await
    }

    /// Update the billing email at the provider and in the mirror.
    pub async fn update_email(&self, account_id: &str, email: &str) -> Result<()> {
        let mut customer = self
            .store
            .find_customer_by_account(account_id)
            .await?
            .ok_or(super::error::BillingError::NoCustomer {
                account_id: account_id.to_string(),
            })?;

        self.client
            .update_customer(
                &customer.provider_customer_id,
                UpdateCustomerRequest {
                    email: Some(email.to_string()),
                },
            )
            .await?;

        customer.email = email.to_string();
        customer.updated_at = unix_now();
        self.store.upsert_customer(&customer).await
    }

    /// Upsert the mirror from a provider-side customer object.
    ///
    /// This is the webhook path. The account link comes from the provider
    /// metadata when present, otherwise from the existing row.
    pub async fn sync_from_provider(&self, data: ProviderCustomerData) -> Result<()> {
        let existing = self.store.get_customer(&data.id).await?;

        let account_id = match data.account_id.or_else(|| existing.as_ref().map(|c| c.account_id.clone())) {
            Some(id) => id,
            None => {
                // Customer created outside this app; nothing to link it to yet.
                tracing::warn!(
                    target: "quotewise::billing::customer",
                    customer_id = %data.id,
                    "Ignoring customer event with no account link"
                );
                return Ok(());
            }
        };

        let mirrored = StoredCustomer {
            account_id,
            provider_customer_id: data.id,
            email: data.email,
            default_payment_method: data.default_payment_method,
            delinquent: data.delinquent,
            updated_at: unix_now(),
        };
        self.store.upsert_customer(&mirrored).await
    }
}

/// Request to create a provider customer.
#[derive(Debug, Clone)]
pub struct CreateCustomerRequest {
    /// Billing email address.
    pub email: String,
    /// Account ID stored in provider metadata so webhooks can link back.
    pub account_id: String,
}

/// Request to update a provider customer.
#[derive(Debug, Clone, Default)]
pub struct UpdateCustomerRequest {
    /// New billing email.
    pub email: Option<String>,
}

/// A customer as returned by the provider.
#[derive(Debug, Clone)]
pub struct ProviderCustomer {
    /// Provider customer ID.
    pub id: String,
    /// Billing email.
    pub email: String,
    /// Default payment method, if any.
    pub default_payment_method: Option<String>,
    /// Whether the provider flagged the customer as delinquent.
    pub delinquent: bool,
}

/// Customer fields extracted from a webhook payload.
#[derive(Debug, Clone)]
pub struct ProviderCustomerData {
    /// Provider customer ID.
    pub id: String,
    /// Billing email.
    pub email: String,
    /// Default payment method, if any.
    pub default_payment_method: Option<String>,
    /// Whether the provider flagged the customer as delinquent.
    pub delinquent: bool,
    /// Account ID from provider metadata, if present.
    pub account_id: Option<String>,
}

/// Trait for provider customer operations.
///
/// This abstraction allows testing without real provider calls.
#[allow(async_fn_in_trait)]
pub trait ProviderCustomerClient: Send + Sync {
    /// Create a new customer at the provider.
    async fn create_customer(&self, request: CreateCustomerRequest) -> Result<ProviderCustomer>;

    /// Update an existing customer at the provider.
    async fn update_customer(
        &self,
        customer_id: &str,
        request: UpdateCustomerRequest,
    ) -> Result<ProviderCustomer>;

    /// Delete a customer at the provider.
    async fn delete_customer(&self, customer_id: &str) -> Result<()>;
}

/// Mock provider customer client for testing.
#[cfg(any(test, feature = "test-support"))]
pub mod test {
    use super::*;
    use std::collections::HashMap;
    use std::sync::RwLock;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Mock provider customer client.
    #[derive(Default)]
    pub struct MockProviderCustomerClient {
        customer_counter: AtomicU64,
        customers: RwLock<HashMap<String, ProviderCustomer>>,
    }

    impl MockProviderCustomerClient {
        /// Create a new mock client.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Get all created customers (for test assertions).
        pub fn created_customers(&self) -> Vec<ProviderCustomer> {
            self.customers.read().unwrap().values().cloned().collect()
        }
    }

    impl ProviderCustomerClient for MockProviderCustomerClient {
        async fn create_customer(
            &self,
            request: CreateCustomerRequest,
        ) -> Result<ProviderCustomer> {
            let id = format!(
                "cus_test_{}",
                self.customer_counter.fetch_add(1, Ordering::SeqCst)
            );
            let customer = ProviderCustomer {
                id: id.clone(),
                email: request.email,
                default_payment_method: None,
                delinquent: false,
            };
            self.customers.write().unwrap().insert(id, customer.clone());
            Ok(customer)
        }

        async fn update_customer(
            &self,
            customer_id: &str,
            request: UpdateCustomerRequest,
        ) -> Result<ProviderCustomer> {
            let mut customers = self.customers.write().unwrap();
            let customer = customers.get_mut(customer_id).ok_or({
                super::super::error::BillingError::CustomerNotFound {
                    customer_id: customer_id.to_string(),
                }
            })?;
            if let Some(email) = request.email {
                customer.email = email;
            }
            Ok(customer.clone())
        }

        async fn delete_customer(&self, customer_id: &str) -> Result<()> {
            self.customers.write().unwrap().remove(customer_id);
            Ok(())
        }
    }
}
