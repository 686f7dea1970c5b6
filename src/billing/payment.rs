//! Payment method management.
//!
//! Handles attaching, detaching, and setting default payment methods, and
//! the recovery path for a failed default method: attach a replacement,
//! make it the default, then settle whatever invoices were left open.

use super::error::BillingError;
use super::invoice::ProviderInvoiceClient;
use super::storage::{BillingStore, InvoiceStatus, StoredCustomer, StoredPaymentMethod};
use crate::error::Result;
use crate::util::unix_now;

/// Payment method management operations.
pub struct PaymentMethodManager<S, P, I>
where
    S: BillingStore,
    P: ProviderPaymentMethodClient,
    I: ProviderInvoiceClient,
{
    store: S,
    client: P,
    invoice_client: I,
}

impl<S, P, I> PaymentMethodManager<S, P, I>
where
    S: BillingStore,
    P: ProviderPaymentMethodClient,
    I: ProviderInvoiceClient,
{
    /// Create a new payment method manager.
    #[must_use]
    pub fn new(store: S, client: P, invoice_client: I) -> Self {
        Self {
            store,
            client,
            invoice_client,
        }
    }

    /// Attach a payment method to an account's customer.
    ///
    /// With `make_default` the method also becomes the customer's default.
    pub async fn attach(
        &self,
        account_id: &str,
        payment_method_id: &str,
        make_default: bool,
    ) -> Result<StoredPaymentMethod> {
        let customer = self.require_customer(account_id).await?;

        let attached = self
            .client
            .attach(payment_method_id, &customer.provider_customer_id)
            .await?;

        let mirrored = StoredPaymentMethod {
            provider_payment_method_id: attached.id.clone(),
            provider_customer_id: attached.customer_id.clone(),
            kind: attached.kind.clone(),
            brand: attached.brand.clone(),
            last4: attached.last4.clone(),
            exp_month: attached.exp_month,
            exp_year: attached.exp_year,
            is_default: false,
            updated_at: unix_now(),
        };
        self.store.upsert_payment_method(&mirrored).await?;

        if make_default {
            self.set_default(account_id, &attached.id).await?;
        }

        self.store
            .get_payment_method(&attached.id)
            .await?
            .ok_or_else(|| {
                crate::error::QuotewiseError::internal("payment method vanished after attach")
            })
    }

    /// Detach a payment method from an account's customer.
    pub async fn detach(&self, account_id: &str, payment_method_id: &str) -> Result<()> {
        let customer = self.require_customer(account_id).await?;
        self.verify_ownership(&customer, payment_method_id).await?;

        self.client.detach(payment_method_id).await?;
        self.store.delete_payment_method(payment_method_id).await
    }

    /// Make a payment method the customer's default.
    pub async fn set_default(&self, account_id: &str, payment_method_id: &str) -> Result<()> {
        let mut customer = self.require_customer(account_id).await?;
        self.verify_ownership(&customer, payment_method_id).await?;

        self.client
            .set_default(&customer.provider_customer_id, payment_method_id)
            .await?;

        self.store
            .set_default_payment_method(&customer.provider_customer_id, payment_method_id)
            .await?;

        customer.default_payment_method = Some(payment_method_id.to_string());
        customer.updated_at = unix_now();
        self.store.upsert_customer(&customer).await
    }

    /// List the mirrored payment methods for an account.
    pub async fn list(&self, account_id: &str) -> Result<Vec<StoredPaymentMethod>> {
        let customer = self.require_customer(account_id).await?;
        self.store
            .list_payment_methods(&customer.provider_customer_id)
            .await
    }

    /// Recover from a failed default payment method.
    ///
    /// Attaches the replacement, makes it the default, then attempts to
    /// settle every invoice the provider still has open for the customer.
    /// An invoice that declines again stays open; the report says which
    /// went through.
    pub async fn recover_with_new_method(
        &self,
        account_id: &str,
        new_payment_method_id: &str,
    ) -> Result<RecoveryReport> {
        let customer = self.require_customer(account_id).await?;

        self.attach(account_id, new_payment_method_id, true).await?;

        let open = self
            .invoice_client
            .list_open_invoices(&customer.provider_customer_id)
            .await?;

        let mut settled = Vec::new();
        let mut still_open = Vec::new();

        for invoice in open {
            match self
                .invoice_client
                .pay_invoice(&invoice.id, Some(new_payment_method_id))
                .await
            {
                Ok(paid) => {
                    let mirrored = super::invoice::mirror_of(&paid);
                    self.store.upsert_invoice(&mirrored).await?;
                    if mirrored.status == InvoiceStatus::Paid {
                        settled.push(invoice.id);
                    } else {
                        still_open.push(invoice.id);
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        target: "quotewise::billing::payment",
                        account_id,
                        invoice_id = %invoice.id,
                        error = %err,
                        "Could not settle invoice during recovery"
                    );
                    still_open.push(invoice.id);
                }
            }
        }

        tracing::info!(
            target: "quotewise::billing::payment",
            account_id,
            payment_method_id = new_payment_method_id,
            settled = settled.len(),
            still_open = still_open.len(),
            "Payment method recovery finished"
        );

        Ok(RecoveryReport {
            payment_method_id: new_payment_method_id.to_string(),
            invoices_settled: settled,
            invoices_still_open: still_open,
        })
    }

    /// Upsert the mirror from a provider-side payment method object.
    ///
    /// This is the webhook path for `payment_method.attached`.
    pub async fn sync_attached(&self, data: ProviderPaymentMethod) -> Result<()> {
        let mirrored = StoredPaymentMethod {
            provider_payment_method_id: data.id,
            provider_customer_id: data.customer_id,
            kind: data.kind,
            brand: data.brand,
            last4: data.last4,
            exp_month: data.exp_month,
            exp_year: data.exp_year,
            is_default: false,
            updated_at: unix_now(),
        };
        self.store.upsert_payment_method(&mirrored).await
    }

    /// Drop the mirror after a provider-side detach.
    ///
    /// This is the webhook path for `payment_method.detached`.
    pub async fn sync_detached(&self, payment_method_id: &str) -> Result<()> {
        self.store.delete_payment_method(payment_method_id).await
    }

    async fn require_customer(&self, account_id: &str) -> Result<StoredCustomer> {
        self.store
            .find_customer_by_account(account_id)
            .await?
            .ok_or_else(|| {
                BillingError::NoCustomer {
                    account_id: account_id.to_string(),
                }
                .into()
            })
    }

    async fn verify_ownership(
        &self,
        customer: &StoredCustomer,
        payment_method_id: &str,
    ) -> Result<()> {
        let method = self
            .store
            .get_payment_method(payment_method_id)
            .await?
            .ok_or(BillingError::PaymentMethodNotFound {
                payment_method_id: payment_method_id.to_string(),
            })?;

        if method.provider_customer_id != customer.provider_customer_id {
            return Err(BillingError::CustomerMismatch {
                resource: payment_method_id.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// Outcome of a payment-method recovery run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RecoveryReport {
    /// The replacement payment method.
    pub payment_method_id: String,
    /// Invoices settled by the recovery.
    pub invoices_settled: Vec<String>,
    /// Invoices that remain open after the recovery.
    pub invoices_still_open: Vec<String>,
}

/// A payment method as returned by the provider.
#[derive(Debug, Clone)]
pub struct ProviderPaymentMethod {
    /// Provider payment method ID.
    pub id: String,
    /// Provider customer ID.
    pub customer_id: String,
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
}

/// Trait for provider payment method operations.
#[allow(async_fn_in_trait)]
pub trait ProviderPaymentMethodClient: Send + Sync {
    /// Attach a payment method to a customer.
    async fn attach(
        &self,
        payment_method_id: &str,
        customer_id: &str,
    ) -> Result<ProviderPaymentMethod>;

    /// Detach a payment method from its customer.
    async fn detach(&self, payment_method_id: &str) -> Result<()>;

    /// Set a customer's default payment method.
    async fn set_default(&self, customer_id: &str, payment_method_id: &str) -> Result<()>;
}

/// Mock provider payment method client for testing.
#[cfg(any(test, feature = "test-support"))]
pub mod test {
    use super::*;
    use std::collections::HashMap;
    use std::sync::RwLock;

    /// Mock provider payment method client.
    #[derive(Default)]
    pub struct MockProviderPaymentMethodClient {
        attached: RwLock<HashMap<String, ProviderPaymentMethod>>,
        defaults: RwLock<HashMap<String, String>>,
    }

    impl MockProviderPaymentMethodClient {
        /// Create a new mock client.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// The default payment method recorded for a customer.
        pub fn default_for(&self, customer_id: &str) -> Option<String> {
            self.defaults.read().unwrap().get(customer_id).cloned()
        }
    }

    impl ProviderPaymentMethodClient for MockProviderPaymentMethodClient {
        async fn attach(
            &self,
            payment_method_id: &str,
            customer_id: &str,
        ) -> Result<ProviderPaymentMethod> {
            let method = ProviderPaymentMethod {
                id: payment_method_id.to_string(),
                customer_id: customer_id.to_string(),
                kind: "card".to_string(),
                brand: Some("visa".to_string()),
                last4: Some("4242".to_string()),
                exp_month: Some(12),
                exp_year: Some(2030),
            };
            self.attached
                .write()
                .unwrap()
                .insert(payment_method_id.to_string(), method.clone());
            Ok(method)
        }

        async fn detach(&self, payment_method_id: &str) -> Result<()> {
            let removed = self.attached.write().unwrap().remove(payment_method_id);
            if removed.is_none() {
                return Err(super::super::error::BillingError::PaymentMethodNotFound {
                    payment_method_id: payment_method_id.to_string(),
                }
                .into());
            }
            Ok(())
        }

        async fn set_default(&self, customer_id: &str, payment_method_id: &str) -> Result<()> {
            if !self.attached.read().unwrap().contains_key(payment_method_id) {
                return Err(super::super::error::BillingError::PaymentMethodNotFound {
                    payment_method_id: payment_method_id.to_string(),
                }
                .into());
            }
            self.defaults
                .write()
                .unwrap()
                .insert(customer_id.to_string(), payment_method_id.to_string());
            Ok(())
        }
    }
}
