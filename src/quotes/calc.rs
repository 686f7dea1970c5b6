//! Pure quote total calculation.
//!
//! Totals compose as:
//!
//! ```text
//! subtotal = Σ cost × quantity
//! markup   = subtotal × markup_rate
//! tax      = (subtotal + markup) × tax_rate
//! total    = subtotal + markup + tax
//! ```
//!
//! Tax applies to the marked-up amount, not the raw subtotal.

use serde::{Deserialize, Serialize};

/// One line of a quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    /// What the line covers (e.g., "Water heater install, labor").
    #[serde(default)]
    pub description: String,
    /// Unit cost. Fractional values are fine.
    pub cost: f64,
    /// Quantity. Fractional values are fine (e.g., 1.5 hours).
    pub quantity: f64,
}

impl LineItem {
    /// Create a line item.
    #[must_use]
    pub fn new(description: impl Into<String>, cost: f64, quantity: f64) -> Self {
        Self {
            description: description.into(),
            cost,
            quantity,
        }
    }

    /// The line's contribution to the subtotal.
    #[must_use]
    pub fn extended(&self) -> f64 {
        self.cost * self.quantity
    }
}

/// Markup and tax rates applied to a quote.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuoteRates {
    /// Markup applied to the subtotal (0.2 = 20%).
    pub markup_rate: f64,
    /// Tax applied to subtotal plus markup (0.08 = 8%).
    pub tax_rate: f64,
}

/// Computed quote totals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuoteTotals {
    /// Sum of cost × quantity across line items.
    pub subtotal: f64,
    /// Markup amount.
    pub markup: f64,
    /// Tax amount.
    pub tax: f64,
    /// Grand total.
    pub total: f64,
}

/// Compute quote totals from line items and rates.
///
/// An empty item list yields all zeros. Inputs are not validated: negative
/// quantities (e.g., discount lines) flow through the arithmetic as-is.
#[must_use]
pub fn calculate_quote(items: &[LineItem], rates: QuoteRates) -> QuoteTotals {
    let subtotal: f64 = items.iter().map(LineItem::extended).sum();
    let markup = subtotal * rates.markup_rate;
    let tax = (subtotal + markup) * rates.tax_rate;

    QuoteTotals {
        subtotal,
        markup,
        tax,
        total: subtotal + markup + tax,
    }
}
