//! HTTP surface: application state and route handlers.

pub mod routes;

pub use routes::{AppState, SIGNATURE_HEADER, router};
