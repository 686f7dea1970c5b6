//! Invoice management.
//!
//! Mirrors provider invoices and drives failed-payment recovery: a bounded
//! retry loop that settles an open invoice or records why it couldn't.

use super::error::BillingError;
use super::storage::{BillingStore, InvoiceStatus, StoredInvoice};
use crate::error::Result;
use crate::util::unix_now;

/// Invoice management operations.
pub struct InvoiceManager<S: BillingStore, C: ProviderInvoiceClient> {
    store: S,
    client: C,
    max_payment_attempts: u32,
}

impl<S: BillingStore, C: ProviderInvoiceClient> InvoiceManager<S, C> {
    /// Create a new invoice manager.
    ///
    /// `max_payment_attempts` bounds the retry loop in
    /// [`retry_failed_payment`](Self::retry_failed_payment).
    #[must_use]
    pub fn new(store: S, client: C, max_payment_attempts: u32) -> Self {
        Self {
            store,
            client,
            max_payment_attempts,
        }
    }

    /// Get the mirrored invoice.
    pub async fn get_invoice(&self, invoice_id: &str) -> Result<Option<StoredInvoice>> {
        self.store.get_invoice(invoice_id).await
    }

    /// Mirrored invoices still open for an account.
    pub async fn open_invoices(&self, account_id: &str) -> Result<Vec<StoredInvoice>> {
        let customer = self
            .store
            .find_customer_by_account(account_id)
            .await?
            .ok_or(BillingError::NoCustomer {
                account_id: account_id.to_string(),
            })?;
        self.store
            .open_invoices_for_customer(&customer.provider_customer_id)
            .await
    }

    /// Retry payment of an open invoice, bounded by the configured attempts.
    ///
    /// Declines are retried (the classic insufficient-funds case often
    /// clears on a later attempt), as are transient provider failures. The
    /// mirror is updated after every attempt so `attempt_count` and
    /// `last_payment_error` reflect what actually happened. When the bound
    /// is exhausted the call fails with
    /// [`BillingError::RetryLimitExceeded`].
    ///
    /// Pass `payment_method` to charge a specific method instead of the
    /// customer's default.
    pub async fn retry_failed_payment(
        &self,
        invoice_id: &str,
        payment_method: Option<&str>,
    ) -> Result<StoredInvoice> {
        let current = self.client.get_invoice(invoice_id).await?;
        if current.status != "open" {
            return Err(BillingError::InvoiceNotPayable {
                invoice_id: invoice_id.to_string(),
                status: current.status,
            }
            .into());
        }

        for attempt in 1..=self.max_payment_attempts {
            match self.client.pay_invoice(invoice_id, payment_method).await {
                Ok(invoice) => {
                    let mirrored = mirror_of(&invoice);
                    self.store.upsert_invoice(&mirrored).await?;

                    if mirrored.status == InvoiceStatus::Paid {
                        tracing::info!(
                            target: "quotewise::billing::invoice",
                            invoice_id,
                            attempt,
                            "Invoice paid"
                        );
                        return Ok(mirrored);
                    }

                    tracing::warn!(
                        target: "quotewise::billing::invoice",
                        invoice_id,
                        attempt,
                        error = mirrored.last_payment_error.as_deref().unwrap_or("unknown"),
                        "Invoice payment attempt declined"
                    );
                }
                Err(err) if err.is_transient() => {
                    tracing::warn!(
                        target: "quotewise::billing::invoice",
                        invoice_id,
                        attempt,
                        error = %err,
                        "Transient failure paying invoice"
                    );
                }
                Err(err) => return Err(err),
            }
        }

        Err(BillingError::RetryLimitExceeded {
            operation: format!("pay_invoice {}", invoice_id),
        }
        .into())
    }

    /// Mark an invoice that will never be collected.
    pub async fn write_off(&self, invoice_id: &str) -> Result<StoredInvoice> {
        let invoice = self.client.mark_uncollectible(invoice_id).await?;
        let mirrored = mirror_of(&invoice);
        self.store.upsert_invoice(&mirrored).await?;
        Ok(mirrored)
    }

    /// Upsert the mirror from a provider-side invoice object.
    ///
    /// This is the webhook path.
    pub async fn sync_from_provider(&self, data: ProviderInvoice) -> Result<()> {
        let mirrored = mirror_of(&data);
        self.store.upsert_invoice(&mirrored).await
    }
}

pub(crate) fn mirror_of(invoice: &ProviderInvoice) -> StoredInvoice {
    StoredInvoice {
        provider_invoice_id: invoice.id.clone(),
        provider_customer_id: invoice.customer_id.clone(),
        provider_subscription_id: invoice.subscription_id.clone(),
        status: InvoiceStatus::from_provider(&invoice.status),
        amount_due: invoice.amount_due,
        amount_paid: invoice.amount_paid,
        attempt_count: invoice.attempt_count,
        last_payment_error: invoice.last_payment_error.clone(),
        updated_at: unix_now(),
    }
}

/// An invoice as returned by the provider.
///
/// A declined payment attempt is data, not an error: the invoice comes back
/// still `open` with `last_payment_error` set. Transport and provider
/// failures are errors.
#[derive(Debug, Clone)]
pub struct ProviderInvoice {
    /// Provider invoice ID.
    pub id: String,
    /// Provider customer ID.
    pub customer_id: String,
    /// Provider subscription ID, if any.
    pub subscription_id: Option<String>,
    /// Provider status string.
    pub status: String,
    /// Amount due in cents.
    pub amount_due: i64,
    /// Amount paid in cents.
    pub amount_paid: i64,
    /// Payment attempts made so far.
    pub attempt_count: u32,
    /// Message from the most recent failed payment, if any.
    pub last_payment_error: Option<String>,
}

/// Trait for provider invoice operations.
pub trait ProviderInvoiceClient: Send + Sync {
    /// Get an invoice from the provider.
    fn get_invoice(
        &self,
        invoice_id: &str,
    ) -> impl std::future::Future<Output = Result<ProviderInvoice>> + Send;

    /// Attempt to pay an open invoice.
    ///
    /// Pass `payment_method` to charge a specific method instead of the
    /// customer's default. A decline returns the invoice still open with
    /// `last_payment_error` set.
    fn pay_invoice(
        &self,
        invoice_id: &str,
        payment_method: Option<&str>,
    ) -> impl std::future::Future<Output = Result<ProviderInvoice>> + Send;

    /// List open invoices for a customer.
    fn list_open_invoices(
        &self,
        customer_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<ProviderInvoice>>> + Send;

    /// Mark an invoice uncollectible.
    fn mark_uncollectible(
        &self,
        invoice_id: &str,
    ) -> impl std::future::Future<Output = Result<ProviderInvoice>> + Send;
}

/// Mock provider invoice client for testing.
#[cfg(any(test, feature = "test-support"))]
pub mod test {
    use super::*;
    use std::collections::HashMap;
    use std::sync::RwLock;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Mock provider invoice client.
    ///
    /// Payment behavior is scripted per invoice with
    /// [`decline_payments`](Self::decline_payments) and globally with
    /// [`fail_transiently`](Self::fail_transiently).
    #[derive(Default)]
    pub struct MockProviderInvoiceClient {
        invoices: RwLock<HashMap<String, ProviderInvoice>>,
        declines_remaining: RwLock<HashMap<String, (u32, String)>>,
        transient_failures: AtomicU32,
    }

    impl MockProviderInvoiceClient {
        /// Create a new mock client.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Register an open invoice.
        pub fn add_open_invoice(
            &self,
            invoice_id: &str,
            customer_id: &str,
            subscription_id: Option<&str>,
            amount_due: i64,
        ) {
            self.invoices.write().unwrap().insert(
                invoice_id.to_string(),
                ProviderInvoice {
                    id: invoice_id.to_string(),
                    customer_id: customer_id.to_string(),
                    subscription_id: subscription_id.map(String::from),
                    status: "open".to_string(),
                    amount_due,
                    amount_paid: 0,
                    attempt_count: 0,
                    last_payment_error: None,
                },
            );
        }

        /// Script the next `count` payment attempts on an invoice to decline.
        pub fn decline_payments(&self, invoice_id: &str, count: u32, message: &str) {
            self.declines_remaining
                .write()
                .unwrap()
                .insert(invoice_id.to_string(), (count, message.to_string()));
        }

        /// Script the next `count` pay calls to fail with a provider 503.
        pub fn fail_transiently(&self, count: u32) {
            self.transient_failures.store(count, Ordering::SeqCst);
        }

        fn lookup(&self, invoice_id: &str) -> Result<ProviderInvoice> {
            self.invoices
                .read()
                .unwrap()
                .get(invoice_id)
                .cloned()
                .ok_or_else(|| {
                    super::super::error::BillingError::InvoiceNotFound {
                        invoice_id: invoice_id.to_string(),
                    }
                    .into()
                })
        }
    }

    impl ProviderInvoiceClient for MockProviderInvoiceClient {
        async fn get_invoice(&self, invoice_id: &str) -> Result<ProviderInvoice> {
            self.lookup(invoice_id)
        }

        async fn pay_invoice(
            &self,
            invoice_id: &str,
            _payment_method: Option<&str>,
        ) -> Result<ProviderInvoice> {
            // Transient outage takes precedence over any scripted decline.
            let transient = self.transient_failures.load(Ordering::SeqCst);
            if transient > 0 {
                self.transient_failures.store(transient - 1, Ordering::SeqCst);
                return Err(super::super::error::BillingError::ProviderApiError {
                    operation: "pay_invoice".to_string(),
                    message: "temporarily unavailable".to_string(),
                    code: None,
                    http_status: Some(503),
                }
                .into());
            }

            self.lookup(invoice_id)?;

            let mut invoices = self.invoices.write().unwrap();
            let invoice = invoices.get_mut(invoice_id).unwrap();
            invoice.attempt_count += 1;

            let mut declines = self.declines_remaining.write().unwrap();
            if let Some((remaining, message)) = declines.get_mut(invoice_id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    invoice.last_payment_error = Some(message.clone());
                    return Ok(invoice.clone());
                }
            }

            invoice.status = "paid".to_string();
            invoice.amount_paid = invoice.amount_due;
            invoice.last_payment_error = None;
            Ok(invoice.clone())
        }

        async fn list_open_invoices(&self, customer_id: &str) -> Result<Vec<ProviderInvoice>> {
            let invoices = self.invoices.read().unwrap();
            let mut open: Vec<ProviderInvoice> = invoices
                .values()
                .filter(|i| i.customer_id == customer_id && i.status == "open")
                .cloned()
                .collect();
            open.sort_by(|a, b| a.id.cmp(&b.id));
            Ok(open)
        }

        async fn mark_uncollectible(&self, invoice_id: &str) -> Result<ProviderInvoice> {
            self.lookup(invoice_id)?;
            let mut invoices = self.invoices.write().unwrap();
            let invoice = invoices.get_mut(invoice_id).unwrap();
            invoice.status = "uncollectible".to_string();
            Ok(invoice.clone())
        }
    }
}
