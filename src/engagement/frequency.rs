//! Frequency cap storage.
//!
//! The original client kept these counters in browser storage; server-side
//! they live behind a trait so any key-value backing works.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// How often a user has seen a survey.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayState {
    /// Lifetime display count.
    pub displays: u32,
    /// Unix timestamp of the most recent display, if any.
    pub last_displayed_at: Option<u64>,
}

/// Trait for storing survey display counters per user.
#[async_trait]
pub trait FrequencyCapStore: Send + Sync {
    /// Get the display state for a user/survey pair.
    async fn get_state(&self, account_id: &str, survey_id: &str) -> Result<DisplayState>;

    /// Record a display at the given time.
    async fn record_display(&self, account_id: &str, survey_id: &str, at: u64) -> Result<()>;
}

/// In-memory frequency cap store (for development/testing).
#[cfg(any(test, feature = "test-support"))]
pub mod test {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, RwLock};

    /// In-memory frequency cap store.
    #[derive(Default, Clone)]
    pub struct InMemoryFrequencyCapStore {
        states: Arc<RwLock<HashMap<(String, String), DisplayState>>>,
    }

    impl InMemoryFrequencyCapStore {
        /// Create a new in-memory store.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl FrequencyCapStore for InMemoryFrequencyCapStore {
        async fn get_state(&self, account_id: &str, survey_id: &str) -> Result<DisplayState> {
            Ok(self
                .states
                .read()
                .unwrap()
                .get(&(account_id.to_string(), survey_id.to_string()))
                .copied()
                .unwrap_or_default())
        }

        async fn record_display(&self, account_id: &str, survey_id: &str, at: u64) -> Result<()> {
            let mut states = self.states.write().unwrap();
            let state = states
                .entry((account_id.to_string(), survey_id.to_string()))
                .or_default();
            state.displays += 1;
            state.last_displayed_at = Some(at);
            Ok(())
        }
    }
}
