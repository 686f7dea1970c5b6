//! Billing-specific error types.
//!
//! Provides granular error types for billing operations, enabling better
//! error handling and more informative error messages for API consumers.

use std::fmt;

/// Billing-specific errors.
///
/// These errors provide more context than generic errors and can be
/// converted to `QuotewiseError` for HTTP responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingError {
    // Provider API failures surfaced as typed responses
    /// The card was declined by the provider.
    CardDeclined {
        message: String,
        decline_code: Option<String>,
    },
    /// The price ID is unknown to the provider.
    InvalidPrice { price_id: String },
    /// The resource belongs to a different provider customer.
    CustomerMismatch { resource: String },

    // Customer errors
    /// No provider customer is linked to the account.
    NoCustomer { account_id: String },
    /// The provider customer does not exist.
    CustomerNotFound { customer_id: String },

    // Subscription errors
    /// No subscription found for the account.
    NoSubscription { account_id: String },
    /// The provider subscription does not exist.
    SubscriptionNotFound { subscription_id: String },

    // Invoice errors
    /// Invoice not found or doesn't belong to the customer.
    InvoiceNotFound { invoice_id: String },
    /// The invoice cannot be paid in its current status.
    InvoiceNotPayable { invoice_id: String, status: String },

    // Payment method errors
    /// The payment method does not exist.
    PaymentMethodNotFound { payment_method_id: String },

    // Dispute errors
    /// The dispute does not exist.
    DisputeNotFound { dispute_id: String },
    /// Evidence can only be submitted while the dispute needs a response.
    DisputeNotOpen { dispute_id: String, status: String },

    // Refund errors
    /// The refund does not exist.
    RefundNotFound { refund_id: String },
    /// The charge does not exist.
    ChargeNotFound { charge_id: String },

    // Webhook errors
    /// Webhook signature is invalid.
    InvalidWebhookSignature,
    /// Webhook timestamp is too old (replay attack protection).
    WebhookTimestampExpired { age_seconds: i64 },
    /// Webhook event data is malformed.
    InvalidWebhookPayload { message: String },

    // Provider API errors
    /// The provider API returned an error.
    ProviderApiError {
        operation: String,
        message: String,
        code: Option<String>,
        http_status: Option<u16>,
    },

    // General errors
    /// The operation failed after multiple retries.
    RetryLimitExceeded { operation: String },
    /// An unexpected internal error occurred.
    Internal { message: String },
}

impl fmt::Display for BillingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CardDeclined { message, decline_code } => {
                write!(f, "Card declined: {}", message)?;
                if let Some(code) = decline_code {
                    write!(f, " (code: {})", code)?;
                }
                Ok(())
            }
            Self::InvalidPrice { price_id } => {
                write!(f, "Invalid price: {}", price_id)
            }
            Self::CustomerMismatch { resource } => {
                write!(f, "Resource '{}' belongs to a different customer", resource)
            }
            Self::NoCustomer { account_id } => {
                write!(f, "No provider customer linked to '{}'", account_id)
            }
            Self::CustomerNotFound { customer_id } => {
                write!(f, "Customer not found: {}", customer_id)
            }
            Self::NoSubscription { account_id } => {
                write!(f, "No subscription found for '{}'", account_id)
            }
            Self::SubscriptionNotFound { subscription_id } => {
                write!(f, "Subscription not found: {}", subscription_id)
            }
            Self::InvoiceNotFound { invoice_id } => {
                write!(f, "Invoice not found: {}", invoice_id)
            }
            Self::InvoiceNotPayable { invoice_id, status } => {
                write!(f, "Invoice '{}' cannot be paid while {}", invoice_id, status)
            }
            Self::PaymentMethodNotFound { payment_method_id } => {
                write!(f, "Payment method not found: {}", payment_method_id)
            }
            Self::DisputeNotFound { dispute_id } => {
                write!(f, "Dispute not found: {}", dispute_id)
            }
            Self::DisputeNotOpen { dispute_id, status } => {
                write!(f, "Dispute '{}' is {} and no longer accepts evidence", dispute_id, status)
            }
            Self::RefundNotFound { refund_id } => {
                write!(f, "Refund not found: {}", refund_id)
            }
            Self::ChargeNotFound { charge_id } => {
                write!(f, "Charge not found: {}", charge_id)
            }
            Self::InvalidWebhookSignature => {
                write!(f, "Invalid webhook signature")
            }
            Self::WebhookTimestampExpired { age_seconds } => {
                write!(f, "Webhook timestamp expired ({} seconds old)", age_seconds)
            }
            Self::InvalidWebhookPayload { message } => {
                write!(f, "Invalid webhook payload: {}", message)
            }
            Self::ProviderApiError { operation, message, code, http_status } => {
                write!(f, "Provider API error during '{}': {}", operation, message)?;
                if let Some(code) = code {
                    write!(f, " (code: {})", code)?;
                }
                if let Some(status) = http_status {
                    write!(f, " [HTTP {}]", status)?;
                }
                Ok(())
            }
            Self::RetryLimitExceeded { operation } => {
                write!(f, "Operation '{}' failed after multiple retries", operation)
            }
            Self::Internal { message } => {
                write!(f, "Internal billing error: {}", message)
            }
        }
    }
}

impl std::error::Error for BillingError {}

impl From<BillingError> for crate::error::QuotewiseError {
    fn from(err: BillingError) -> Self {
        match &err {
            // Map to NotFound
            BillingError::NoCustomer { .. }
            | BillingError::CustomerNotFound { .. }
            | BillingError::NoSubscription { .. }
            | BillingError::SubscriptionNotFound { .. }
            | BillingError::InvoiceNotFound { .. }
            | BillingError::PaymentMethodNotFound { .. }
            | BillingError::DisputeNotFound { .. }
            | BillingError::RefundNotFound { .. }
            | BillingError::ChargeNotFound { .. } => {
                crate::error::QuotewiseError::NotFound(err.to_string())
            }

            // Map to BadRequest (client errors)
            BillingError::CardDeclined { .. }
            | BillingError::InvalidPrice { .. }
            | BillingError::InvoiceNotPayable { .. }
            | BillingError::DisputeNotOpen { .. }
            | BillingError::InvalidWebhookSignature
            | BillingError::WebhookTimestampExpired { .. }
            | BillingError::InvalidWebhookPayload { .. } => {
                crate::error::QuotewiseError::BadRequest(err.to_string())
            }

            // Ownership mismatches read as forbidden
            BillingError::CustomerMismatch { .. } => {
                crate::error::QuotewiseError::Forbidden(err.to_string())
            }

            // Map to Internal (server errors)
            BillingError::RetryLimitExceeded { .. } | BillingError::Internal { .. } => {
                crate::error::QuotewiseError::Internal(err.to_string())
            }

            // Map provider API errors based on HTTP status
            BillingError::ProviderApiError { http_status, .. } => match http_status {
                Some(429) => crate::error::QuotewiseError::TooManyRequests(err.to_string()),
                Some(400..=499) => crate::error::QuotewiseError::BadRequest(err.to_string()),
                Some(503) => crate::error::QuotewiseError::ServiceUnavailable(err.to_string()),
                _ => crate::error::QuotewiseError::Internal(err.to_string()),
            },
        }
    }
}

impl BillingError {
    /// Check if this is a client error (4xx).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::CardDeclined { .. }
            | Self::InvalidPrice { .. }
            | Self::CustomerMismatch { .. }
            | Self::NoCustomer { .. }
            | Self::CustomerNotFound { .. }
            | Self::NoSubscription { .. }
            | Self::SubscriptionNotFound { .. }
            | Self::InvoiceNotFound { .. }
            | Self::InvoiceNotPayable { .. }
            | Self::PaymentMethodNotFound { .. }
            | Self::DisputeNotFound { .. }
            | Self::DisputeNotOpen { .. }
            | Self::RefundNotFound { .. }
            | Self::ChargeNotFound { .. }
            | Self::InvalidWebhookSignature
            | Self::WebhookTimestampExpired { .. }
            | Self::InvalidWebhookPayload { .. } => true,
            Self::ProviderApiError { http_status, .. } => {
                matches!(http_status, Some(400..=499))
            }
            _ => false,
        }
    }

    /// Check if this is a server error (5xx).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        match self {
            Self::RetryLimitExceeded { .. } | Self::Internal { .. } => true,
            Self::ProviderApiError { http_status, .. } => {
                matches!(http_status, Some(500..=599) | None)
            }
            _ => false,
        }
    }

    /// Check if this error is transient and worth retrying.
    ///
    /// Rate limits (429) and provider server errors (5xx) are retryable.
    /// Card declines are handled separately by the payment retry path,
    /// which decides per decline code.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ProviderApiError { http_status, .. } => {
                matches!(http_status, Some(429) | Some(500..=599))
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BillingError::InvoiceNotFound {
            invoice_id: "in_123".to_string(),
        };
        assert_eq!(err.to_string(), "Invoice not found: in_123");

        let err = BillingError::CardDeclined {
            message: "Your card has insufficient funds.".to_string(),
            decline_code: Some("insufficient_funds".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Card declined: Your card has insufficient funds. (code: insufficient_funds)"
        );
    }

    #[test]
    fn test_error_classification() {
        let err = BillingError::InvalidPrice {
            price_id: "price_bogus".to_string(),
        };
        assert!(err.is_client_error());
        assert!(!err.is_server_error());
        assert!(!err.is_retryable());

        let err = BillingError::ProviderApiError {
            operation: "pay_invoice".to_string(),
            message: "temporarily unavailable".to_string(),
            code: None,
            http_status: Some(503),
        };
        assert!(!err.is_client_error());
        assert!(err.is_server_error());
        assert!(err.is_retryable());

        let err = BillingError::ProviderApiError {
            operation: "create_customer".to_string(),
            message: "rate limited".to_string(),
            code: Some("rate_limit".to_string()),
            http_status: Some(429),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn test_convert_to_quotewise_error() {
        let err = BillingError::NoSubscription {
            account_id: "acct_123".to_string(),
        };
        let converted: crate::error::QuotewiseError = err.into();
        assert!(matches!(converted, crate::error::QuotewiseError::NotFound(_)));

        let err = BillingError::InvalidWebhookSignature;
        let converted: crate::error::QuotewiseError = err.into();
        assert!(matches!(converted, crate::error::QuotewiseError::BadRequest(_)));

        let err = BillingError::CustomerMismatch {
            resource: "ch_123".to_string(),
        };
        let converted: crate::error::QuotewiseError = err.into();
        assert!(matches!(converted, crate::error::QuotewiseError::Forbidden(_)));

        let err = BillingError::ProviderApiError {
            operation: "pay_invoice".to_string(),
            message: "rate limited".to_string(),
            code: None,
            http_status: Some(429),
        };
        let converted: crate::error::QuotewiseError = err.into();
        assert!(converted.is_transient());
    }
}
