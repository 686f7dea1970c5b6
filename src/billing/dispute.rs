//! Dispute handling.
//!
//! Mirrors provider disputes and drives the two things a merchant can do
//! with one: submit evidence while the provider still accepts it, or
//! concede and close.

use super::error::BillingError;
use super::storage::{BillingStore, DisputeStatus, StoredDispute};
use crate::error::Result;
use crate::util::unix_now;

/// Dispute management operations.
pub struct DisputeManager<S: BillingStore, C: ProviderDisputeClient> {
    store: S,
    client: C,
}

impl<S: BillingStore, C: ProviderDisputeClient> DisputeManager<S, C> {
    /// Create a new dispute manager.
    #[must_use]
    pub fn new(store: S, client: C) -> Self {
        Self { store, client }
    }

    /// Get the mirrored dispute.
    pub async fn get_dispute(&self, dispute_id: &str) -> Result<Option<StoredDispute>> {
        self.store.get_dispute(dispute_id).await
    }

    /// Submit evidence for a dispute.
    ///
    /// Only allowed while the dispute still needs a response; afterwards
    /// the provider no longer accepts evidence.
    pub async fn submit_evidence(
        &self,
        dispute_id: &str,
        evidence: DisputeEvidence,
    ) -> Result<StoredDispute> {
        let mirrored = self.store.get_dispute(dispute_id).await?.ok_or({
            BillingError::DisputeNotFound {
                dispute_id: dispute_id.to_string(),
            }
        })?;

        if mirrored.status != DisputeStatus::NeedsResponse {
            return Err(BillingError::DisputeNotOpen {
                dispute_id: dispute_id.to_string(),
                status: mirrored.status.as_str().to_string(),
            }
            .into());
        }

        let updated = self.client.submit_evidence(dispute_id, evidence).await?;
        let mirrored = mirror_of(&updated);
        self.store.upsert_dispute(&mirrored).await?;

        tracing::info!(
            target: "quotewise::billing::dispute",
            dispute_id,
            "Submitted dispute evidence"
        );

        Ok(mirrored)
    }

    /// Concede a dispute, accepting the loss.
    pub async fn concede(&self, dispute_id: &str) -> Result<StoredDispute> {
        if self.store.get_dispute(dispute_id).await?.is_none() {
            return Err(BillingError::DisputeNotFound {
                dispute_id: dispute_id.to_string(),
            }
            .into());
        }

        let closed = self.client.close_dispute(dispute_id).await?;
        let mirrored = mirror_of(&closed);
        self.store.upsert_dispute(&mirrored).await?;
        Ok(mirrored)
    }

    /// Upsert the mirror from a provider-side dispute object.
    ///
    /// This is the webhook path for `charge.dispute.*` events.
    pub async fn sync_from_provider(&self, data: ProviderDispute) -> Result<()> {
        let mirrored = mirror_of(&data);
        self.store.upsert_dispute(&mirrored).await
    }
}

fn mirror_of(dispute: &ProviderDispute) -> StoredDispute {
    StoredDispute {
        provider_dispute_id: dispute.id.clone(),
        provider_charge_id: dispute.charge_id.clone(),
        provider_customer_id: dispute.customer_id.clone(),
        amount: dispute.amount,
        currency: dispute.currency.clone(),
        reason: dispute.reason.clone(),
        status: DisputeStatus::from_provider(&dispute.status),
        evidence_due_by: dispute.evidence_due_by,
        updated_at: unix_now(),
    }
}

/// A dispute as returned by the provider.
#[derive(Debug, Clone)]
pub struct ProviderDispute {
    /// Provider dispute ID.
    pub id: String,
    /// Provider charge ID being disputed.
    pub charge_id: String,
    /// Provider customer ID.
    pub customer_id: String,
    /// Disputed amount in cents.
    pub amount: i64,
    /// Currency code.
    pub currency: String,
    /// Provider reason string.
    pub reason: String,
    /// Provider status string.
    pub status: String,
    /// Evidence submission deadline (unix seconds), if open.
    pub evidence_due_by: Option<u64>,
}

/// Evidence submitted in response to a dispute.
#[derive(Debug, Clone, Default)]
pub struct DisputeEvidence {
    /// Free-form explanation of why the charge was legitimate.
    pub explanation: Option<String>,
    /// Email used when the quote was accepted.
    pub customer_email: Option<String>,
    /// Link or reference to the signed quote / service agreement.
    pub service_documentation: Option<String>,
}

/// Trait for provider dispute operations.
#[allow(async_fn_in_trait)]
pub trait ProviderDisputeClient: Send + Sync {
    /// Get a dispute from the provider.
    async fn get_dispute(&self, dispute_id: &str) -> Result<ProviderDispute>;

    /// Submit evidence; moves the dispute under review.
    async fn submit_evidence(
        &self,
        dispute_id: &str,
        evidence: DisputeEvidence,
    ) -> Result<ProviderDispute>;

    /// Close the dispute, conceding the loss.
    async fn close_dispute(&self, dispute_id: &str) -> Result<ProviderDispute>;
}

/// Mock provider dispute client for testing.
#[cfg(any(test, feature = "test-support"))]
pub mod test {
    use super::*;
    use std::collections::HashMap;
    use std::sync::RwLock;

    /// Mock provider dispute client.
    #[derive(Default)]
    pub struct MockProviderDisputeClient {
        disputes: RwLock<HashMap<String, ProviderDispute>>,
        evidence: RwLock<HashMap<String, DisputeEvidence>>,
    }

    impl MockProviderDisputeClient {
        /// Create a new mock client.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Register a dispute needing a response.
        pub fn add_dispute(&self, dispute_id: &str, charge_id: &str, customer_id: &str, amount: i64) {
            self.disputes.write().unwrap().insert(
                dispute_id.to_string(),
                ProviderDispute {
                    id: dispute_id.to_string(),
                    charge_id: charge_id.to_string(),
                    customer_id: customer_id.to_string(),
                    amount,
                    currency: "usd".to_string(),
                    reason: "fraudulent".to_string(),
                    status: "needs_response".to_string(),
                    evidence_due_by: Some(crate::util::unix_now() + 7 * 86400),
                },
            );
        }

        /// Evidence submitted for a dispute (for test assertions).
        pub fn submitted_evidence(&self, dispute_id: &str) -> Option<DisputeEvidence> {
            self.evidence.read().unwrap().get(dispute_id).cloned()
        }
    }

    impl ProviderDisputeClient for MockProviderDisputeClient {
        async fn get_dispute(&self, dispute_id: &str) -> Result<ProviderDispute> {
            self.disputes
                .read()
                .unwrap()
                .get(dispute_id)
                .cloned()
                .ok_or_else(|| {
                    super::super::error::BillingError::DisputeNotFound {
                        dispute_id: dispute_id.to_string(),
                    }
                    .into()
                })
        }

        async fn submit_evidence(
            &self,
            dispute_id: &str,
            evidence: DisputeEvidence,
        ) -> Result<ProviderDispute> {
            let mut disputes = self.disputes.write().unwrap();
            let dispute = disputes.get_mut(dispute_id).ok_or({
                super::super::error::BillingError::DisputeNotFound {
                    dispute_id: dispute_id.to_string(),
                }
            })?;
            dispute.status = "under_review".to_string();
            self.evidence
                .write()
                .unwrap()
                .insert(dispute_id.to_string(), evidence);
            Ok(dispute.clone())
        }

        async fn close_dispute(&self, dispute_id: &str) -> Result<ProviderDispute> {
            let mut disputes = self.disputes.write().unwrap();
            let dispute = disputes.get_mut(dispute_id).ok_or({
                super::super::error::BillingError::DisputeNotFound {
                    dispute_id: dispute_id.to_string(),
                }
            })?;
            dispute.status = "lost".to_string();
            Ok(dispute.clone())
        }
    }
}
