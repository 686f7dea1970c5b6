//! Quotewise - billing and engagement backend for a quoting SaaS
//!
//! Quotewise keeps a service business's subscription billing honest: it
//! mirrors payment-provider state into local rows, processes provider
//! webhooks exactly once, and handles the edge cases subscriptions hit in
//! practice (failed-payment retry, proration, refunds and credits,
//! disputes, payment-method recovery). It also computes quote totals and
//! picks which in-app surveys a user should see.
//!
//! # Features
//!
//! - **Billing**: provider-mirroring managers for customers, subscriptions,
//!   invoices, payment methods, disputes, and refunds
//! - **Webhooks**: signature verification, idempotency, raw-event
//!   recording, and bounded retry
//! - **Quotes**: pure subtotal/markup/tax/total calculation
//! - **Engagement**: survey targeting with frequency capping and a
//!   vendor-SDK tracking seam
//! - **Testing**: in-memory store and mock provider clients behind the
//!   `test-support` feature
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use quotewise::{ConfigBuilder, http};
//!
//! #[tokio::main]
//! async fn main() {
//!     quotewise::init_tracing();
//!
//!     let config = ConfigBuilder::new()
//!         .from_env()
//!         .build()
//!         .expect("invalid configuration");
//!
//!     // Wire AppState with your store and provider clients, then:
//!     // let app = http::router(state);
//!     // axum::serve(listener, app).await.unwrap();
//!     let _ = config;
//! }
//! ```

#![allow(async_fn_in_trait)] // provider client traits use native async fns

pub mod billing;
mod config;
pub mod engagement;
mod error;
pub mod http;
pub mod quotes;
mod util;

// Re-exports for public API
pub use config::{BillingConfig, Config, ConfigBuilder, LoggingConfig, ServerConfig};
pub use error::{ErrorResponse, QuotewiseError, Result};

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging with sensible defaults
///
/// This should be called early in your application, typically in main()
/// before building the router.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Set log level (e.g., "info", "debug", "quotewise=debug")
/// - `QUOTEWISE_LOG_JSON`: Set to "true" for JSON formatted logs
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json_logs = std::env::var("QUOTEWISE_LOG_JSON")
        .map(|v| v.parse::<bool>().unwrap_or(false))
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
