//! Refund, credit issuance, and dispute handling flows.

use quotewise::billing::{
    BillingStore, DisputeEvidence, DisputeManager, DisputeStatus, InMemoryBillingStore,
    InvoiceStatus, MockProviderDisputeClient, MockProviderRefundClient, ProviderDispute,
    RefundManager, RefundReason, RefundStatus, StoredCustomer, StoredInvoice,
};

async fn store_with_customer(account_id: &str, customer_id: &str) -> InMemoryBillingStore {
    let store = InMemoryBillingStore::new();
    store
        .upsert_customer(&StoredCustomer {
            account_id: account_id.to_string(),
            provider_customer_id: customer_id.to_string(),
            email: "owner@plumbco.example".to_string(),
            default_payment_method: None,
            delinquent: false,
            updated_at: 0,
        })
        .await
        .unwrap();
    store
}

#[tokio::test]
async fn test_full_refund_flow() {
    let store = store_with_customer("acct_1", "cus_1").await;
    let client = MockProviderRefundClient::new();
    client.add_charge("ch_job_deposit", "cus_1");
    let refunds = RefundManager::new(store, client);

    let refund = refunds
        .refund_charge(
            "acct_1",
            "ch_job_deposit",
            None,
            Some(RefundReason::RequestedByCustomer),
        )
        .await
        .unwrap();

    assert_eq!(refund.status, RefundStatus::Succeeded);
    assert_eq!(refund.charge_id, "ch_job_deposit");

    let listed = refunds
        .list_refunds_for_charge("acct_1", "ch_job_deposit", 10)
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, refund.id);
}

#[tokio::test]
async fn test_cross_tenant_refund_blocked() {
    // acct_1's store knows cus_1; the charge belongs to cus_2.
    let store = store_with_customer("acct_1", "cus_1").await;
    let client = MockProviderRefundClient::new();
    client.add_charge("ch_not_yours", "cus_2");
    let refunds = RefundManager::new(store, client);

    let result = refunds.refund_charge("acct_1", "ch_not_yours", None, None).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_credit_note_against_own_invoice() {
    let store = store_with_customer("acct_1", "cus_1").await;
    store
        .upsert_invoice(&StoredInvoice {
            provider_invoice_id: "in_march".to_string(),
            provider_customer_id: "cus_1".to_string(),
            provider_subscription_id: Some("sub_1".to_string()),
            status: InvoiceStatus::Paid,
            amount_due: 7900,
            amount_paid: 7900,
            attempt_count: 1,
            last_payment_error: None,
            updated_at: 0,
        })
        .await
        .unwrap();

    let client = MockProviderRefundClient::new();
    let refunds = RefundManager::new(store, client);

    let credit = refunds
        .issue_credit("acct_1", "in_march", 2000, Some("two weeks of downtime"))
        .await
        .unwrap();

    assert_eq!(credit.invoice_id, "in_march");
    assert_eq!(credit.amount, 2000);
}

#[tokio::test]
async fn test_credit_note_requires_mirrored_invoice() {
    let store = store_with_customer("acct_1", "cus_1").await;
    let refunds = RefundManager::new(store, MockProviderRefundClient::new());

    let result = refunds.issue_credit("acct_1", "in_ghost", 100, None).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_dispute_lifecycle_mirror_evidence_outcome() {
    let store = InMemoryBillingStore::new();
    let client = MockProviderDisputeClient::new();
    client.add_dispute("dp_1", "ch_1", "cus_1", 14900);
    let disputes = DisputeManager::new(store.clone(), client);

    // Webhook mirrors the new dispute.
    disputes
        .sync_from_provider(ProviderDispute {
            id: "dp_1".to_string(),
            charge_id: "ch_1".to_string(),
            customer_id: "cus_1".to_string(),
            amount: 14900,
            currency: "usd".to_string(),
            reason: "product_not_received".to_string(),
            status: "needs_response".to_string(),
            evidence_due_by: Some(1_720_000_000),
        })
        .await
        .unwrap();

    // Merchant responds with the signed quote.
    let under_review = disputes
        .submit_evidence(
            "dp_1",
            DisputeEvidence {
                explanation: Some("Customer signed off on the completed job".to_string()),
                customer_email: Some("client@example.com".to_string()),
                service_documentation: Some("quote #2231, completion photos".to_string()),
            },
        )
        .await
        .unwrap();
    assert_eq!(under_review.status, DisputeStatus::UnderReview);

    // Evidence can't be submitted twice.
    let again = disputes.submit_evidence("dp_1", DisputeEvidence::default()).await;
    assert!(again.is_err());

    // The provider decides; the webhook mirrors the outcome.
    disputes
        .sync_from_provider(ProviderDispute {
            id: "dp_1".to_string(),
            charge_id: "ch_1".to_string(),
            customer_id: "cus_1".to_string(),
            amount: 14900,
            currency: "usd".to_string(),
            reason: "product_not_received".to_string(),
            status: "won".to_string(),
            evidence_due_by: None,
        })
        .await
        .unwrap();

    let final_state = store.get_dispute("dp_1").await.unwrap().unwrap();
    assert_eq!(final_state.status, DisputeStatus::Won);
}

#[tokio::test]
async fn test_concede_dispute() {
    let store = InMemoryBillingStore::new();
    let client = MockProviderDisputeClient::new();
    client.add_dispute("dp_small", "ch_2", "cus_1", 900);
    let disputes = DisputeManager::new(store.clone(), client);

    disputes
        .sync_from_provider(ProviderDispute {
            id: "dp_small".to_string(),
            charge_id: "ch_2".to_string(),
            customer_id: "cus_1".to_string(),
            amount: 900,
            currency: "usd".to_string(),
            reason: "fraudulent".to_string(),
            status: "needs_response".to_string(),
            evidence_due_by: Some(1_720_000_000),
        })
        .await
        .unwrap();

    // Not worth fighting a $9 dispute.
    let conceded = disputes.concede("dp_small").await.unwrap();
    assert_eq!(conceded.status, DisputeStatus::Lost);
}
