//! Quote building for service businesses.

pub mod calc;

pub use calc::{LineItem, QuoteRates, QuoteTotals, calculate_quote};
