//! Refund and credit management.
//!
//! Handles full and partial refunds against charges, and credit notes
//! against invoices. Customer-facing operations verify that the charge
//! belongs to the account's customer before touching the provider.

use super::error::BillingError;
use super::storage::BillingStore;
use crate::error::Result;

/// A refund as returned by the provider.
#[derive(Debug, Clone)]
pub struct Refund {
    /// Provider refund ID.
    pub id: String,
    /// Amount refunded in cents.
    pub amount: i64,
    /// Currency (e.g., "usd").
    pub currency: String,
    /// Refund status.
    pub status: RefundStatus,
    /// Reason for the refund.
    pub reason: Option<RefundReason>,
    /// The charge this refund is against.
    pub charge_id: String,
    /// Unix timestamp of when the refund was created.
    pub created: u64,
}

/// Status of a refund.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundStatus {
    /// Refund is pending.
    Pending,
    /// Refund succeeded.
    Succeeded,
    /// Refund failed.
    Failed,
    /// Refund was canceled.
    Canceled,
}

impl RefundStatus {
    /// Convert from provider status string.
    #[must_use]
    pub fn from_provider(status: &str) -> Self {
        match status {
            "pending" => Self::Pending,
            "succeeded" => Self::Succeeded,
            "failed" => Self::Failed,
            "canceled" => Self::Canceled,
            _ => Self::Pending,
        }
    }

    /// Convert to string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }
}

/// Reason for a refund.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundReason {
    /// Duplicate charge.
    Duplicate,
    /// Fraudulent charge.
    Fraudulent,
    /// Requested by customer.
    RequestedByCustomer,
}

impl RefundReason {
    /// Convert to the provider's reason string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Duplicate => "duplicate",
            Self::Fraudulent => "fraudulent",
            Self::RequestedByCustomer => "requested_by_customer",
        }
    }

    /// Convert from the provider's reason string.
    #[must_use]
    pub fn from_provider(reason: &str) -> Option<Self> {
        match reason {
            "duplicate" => Some(Self::Duplicate),
            "fraudulent" => Some(Self::Fraudulent),
            "requested_by_customer" => Some(Self::RequestedByCustomer),
            _ => None,
        }
    }
}

/// Request to create a refund.
#[derive(Debug, Clone)]
pub struct CreateRefundRequest {
    /// The charge to refund.
    pub charge_id: String,
    /// Amount to refund in cents. If None, refunds the full amount.
    pub amount: Option<i64>,
    /// Reason for the refund.
    pub reason: Option<RefundReason>,
}

impl CreateRefundRequest {
    /// Create a full-refund request for a charge.
    #[must_use]
    pub fn for_charge(charge_id: impl Into<String>) -> Self {
        Self {
            charge_id: charge_id.into(),
            amount: None,
            reason: None,
        }
    }

    /// Set the refund amount (partial refund).
    #[must_use]
    pub fn with_amount(mut self, amount: i64) -> Self {
        self.amount = Some(amount);
        self
    }

    /// Set the refund reason.
    #[must_use]
    pub fn with_reason(mut self, reason: RefundReason) -> Self {
        self.reason = Some(reason);
        self
    }
}

/// A credit note issued against an invoice.
#[derive(Debug, Clone)]
pub struct CreditNote {
    /// Provider credit note ID.
    pub id: String,
    /// The invoice the credit applies to.
    pub invoice_id: String,
    /// Credited amount in cents.
    pub amount: i64,
    /// Currency (e.g., "usd").
    pub currency: String,
    /// Memo shown to the customer.
    pub memo: Option<String>,
    /// Unix timestamp of when the credit note was created.
    pub created: u64,
}

/// Trait for provider refund and credit operations.
#[allow(async_fn_in_trait)]
pub trait ProviderRefundClient: Send + Sync {
    /// Create a new refund.
    async fn create_refund(&self, request: CreateRefundRequest) -> Result<Refund>;

    /// Get a refund by ID.
    async fn get_refund(&self, refund_id: &str) -> Result<Refund>;

    /// List refunds for a charge.
    async fn list_refunds(&self, charge_id: &str, limit: u8) -> Result<Vec<Refund>>;

    /// Get the customer ID associated with a charge.
    ///
    /// Used for authorization checks to verify charge ownership.
    async fn charge_customer_id(&self, charge_id: &str) -> Result<String>;

    /// Issue a credit note against an invoice.
    async fn create_credit_note(
        &self,
        invoice_id: &str,
        amount: i64,
        memo: Option<&str>,
    ) -> Result<CreditNote>;
}

/// Refund management with ownership checks.
///
/// Verifies that charges belong to the account's mirrored customer before
/// processing, so one tenant can never refund another tenant's charge.
pub struct RefundManager<S: BillingStore, C: ProviderRefundClient> {
    store: S,
    client: C,
}

impl<S: BillingStore, C: ProviderRefundClient> RefundManager<S, C> {
    /// Create a new refund manager.
    #[must_use]
    pub fn new(store: S, client: C) -> Self {
        Self { store, client }
    }

    /// Refund a charge, verifying it belongs to the account.
    ///
    /// * `amount` - Amount to refund in cents. If None, refunds the full charge.
    pub async fn refund_charge(
        &self,
        account_id: &str,
        charge_id: &str,
        amount: Option<i64>,
        reason: Option<RefundReason>,
    ) -> Result<Refund> {
        self.verify_charge_ownership(account_id, charge_id).await?;

        let mut request = CreateRefundRequest::for_charge(charge_id);
        if let Some(amount) = amount {
            request = request.with_amount(amount);
        }
        if let Some(reason) = reason {
            request = request.with_reason(reason);
        }

        let refund = self.client.create_refund(request).await?;

        tracing::info!(
            target: "quotewise::billing::refund",
            account_id,
            charge_id,
            refund_id = %refund.id,
            amount = refund.amount,
            "Issued refund"
        );

        Ok(refund)
    }

    /// Issue a credit note against one of the account's invoices.
    ///
    /// The invoice must be mirrored and belong to the account's customer.
    pub async fn issue_credit(
        &self,
        account_id: &str,
        invoice_id: &str,
        amount: i64,
        memo: Option<&str>,
    ) -> Result<CreditNote> {
        let customer = self
            .store
            .find_customer_by_account(account_id)
            .await?
            .ok_or(BillingError::NoCustomer {
                account_id: account_id.to_string(),
            })?;

        let invoice = self.store.get_invoice(invoice_id).await?.ok_or({
            BillingError::InvoiceNotFound {
                invoice_id: invoice_id.to_string(),
            }
        })?;

        if invoice.provider_customer_id != customer.provider_customer_id {
            return Err(BillingError::CustomerMismatch {
                resource: invoice_id.to_string(),
            }
            .into());
        }

        let credit = self
            .client
            .create_credit_note(invoice_id, amount, memo)
            .await?;

        tracing::info!(
            target: "quotewise::billing::refund",
            account_id,
            invoice_id,
            credit_note_id = %credit.id,
            amount,
            "Issued credit note"
        );

        Ok(credit)
    }

    /// Get a refund by ID.
    pub async fn get_refund(&self, refund_id: &str) -> Result<Refund> {
        self.client.get_refund(refund_id).await
    }

    /// List refunds for a charge, verifying ownership first.
    pub async fn list_refunds_for_charge(
        &self,
        account_id: &str,
        charge_id: &str,
        limit: u8,
    ) -> Result<Vec<Refund>> {
        self.verify_charge_ownership(account_id, charge_id).await?;
        self.client.list_refunds(charge_id, limit).await
    }

    async fn verify_charge_ownership(&self, account_id: &str, charge_id: &str) -> Result<()> {
        let customer = self
            .store
            .find_customer_by_account(account_id)
            .await?
            .ok_or(BillingError::NoCustomer {
                account_id: account_id.to_string(),
            })?;

        let charge_customer = self.client.charge_customer_id(charge_id).await?;
        if charge_customer != customer.provider_customer_id {
            return Err(BillingError::CustomerMismatch {
                resource: charge_id.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// Mock provider refund client for testing.
#[cfg(any(test, feature = "test-support"))]
pub mod test {
    use super::*;
    use std::collections::HashMap;
    use std::sync::RwLock;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Mock provider refund client.
    #[derive(Default)]
    pub struct MockProviderRefundClient {
        refunds: RwLock<HashMap<String, Refund>>,
        charge_refunds: RwLock<HashMap<String, Vec<String>>>,
        charge_customers: RwLock<HashMap<String, String>>,
        credit_notes: RwLock<HashMap<String, CreditNote>>,
        counter: AtomicU64,
    }

    impl MockProviderRefundClient {
        /// Create a new mock client.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Register a charge with its customer ID for ownership verification.
        pub fn add_charge(&self, charge_id: &str, customer_id: &str) {
            self.charge_customers
                .write()
                .unwrap()
                .insert(charge_id.to_string(), customer_id.to_string());
        }

        /// All credit notes issued (for test assertions).
        pub fn issued_credit_notes(&self) -> Vec<CreditNote> {
            self.credit_notes.read().unwrap().values().cloned().collect()
        }
    }

    impl ProviderRefundClient for MockProviderRefundClient {
        async fn create_refund(&self, request: CreateRefundRequest) -> Result<Refund> {
            let id = format!("re_test_{}", self.counter.fetch_add(1, Ordering::SeqCst));

            let refund = Refund {
                id: id.clone(),
                amount: request.amount.unwrap_or(1000),
                currency: "usd".to_string(),
                status: RefundStatus::Succeeded,
                reason: request.reason,
                charge_id: request.charge_id.clone(),
                created: crate::util::unix_now(),
            };

            self.refunds.write().unwrap().insert(id.clone(), refund.clone());
            self.charge_refunds
                .write()
                .unwrap()
                .entry(request.charge_id)
                .or_default()
                .push(id);

            Ok(refund)
        }

        async fn get_refund(&self, refund_id: &str) -> Result<Refund> {
            self.refunds
                .read()
                .unwrap()
                .get(refund_id)
                .cloned()
                .ok_or_else(|| {
                    super::super::error::BillingError::RefundNotFound {
                        refund_id: refund_id.to_string(),
                    }
                    .into()
                })
        }

        async fn list_refunds(&self, charge_id: &str, limit: u8) -> Result<Vec<Refund>> {
            let charge_refunds = self.charge_refunds.read().unwrap();
            let refunds = self.refunds.read().unwrap();

            let ids = charge_refunds.get(charge_id).cloned().unwrap_or_default();
            Ok(ids
                .into_iter()
                .take(limit as usize)
                .filter_map(|id| refunds.get(&id).cloned())
                .collect())
        }

        async fn charge_customer_id(&self, charge_id: &str) -> Result<String> {
            self.charge_customers
                .read()
                .unwrap()
                .get(charge_id)
                .cloned()
                .ok_or_else(|| {
                    super::super::error::BillingError::ChargeNotFound {
                        charge_id: charge_id.to_string(),
                    }
                    .into()
                })
        }

        async fn create_credit_note(
            &self,
            invoice_id: &str,
            amount: i64,
            memo: Option<&str>,
        ) -> Result<CreditNote> {
            let id = format!("cn_test_{}", self.counter.fetch_add(1, Ordering::SeqCst));
            let credit = CreditNote {
                id: id.clone(),
                invoice_id: invoice_id.to_string(),
                amount,
                currency: "usd".to_string(),
                memo: memo.map(String::from),
                created: crate::util::unix_now(),
            };
            self.credit_notes.write().unwrap().insert(id, credit.clone());
            Ok(credit)
        }
    }
}
