//! Event forwarding to the analytics vendor.
//!
//! The vendor SDK stays behind [`TrackingClient`]; the tracker shapes the
//! events Quotewise emits and nothing here blocks on delivery guarantees.

use crate::error::Result;

/// An event forwarded to the vendor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingEvent {
    /// Event name (e.g., "survey_answered").
    pub name: String,
    /// Account the event belongs to.
    pub account_id: String,
    /// Free-form event properties.
    pub properties: serde_json::Value,
}

/// Trait for forwarding events to the analytics vendor.
#[allow(async_fn_in_trait)]
pub trait TrackingClient: Send + Sync {
    /// Forward one event.
    async fn track(&self, event: TrackingEvent) -> Result<()>;
}

/// Tracking client that drops everything.
///
/// Use when analytics is disabled (self-hosted installs, tests that don't
/// care about events).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpTrackingClient;

impl TrackingClient for NoOpTrackingClient {
    async fn track(&self, _event: TrackingEvent) -> Result<()> {
        Ok(())
    }
}

/// Emits Quotewise's engagement events.
pub struct EngagementTracker<C: TrackingClient> {
    client: C,
}

impl<C: TrackingClient> EngagementTracker<C> {
    /// Create a new tracker.
    #[must_use]
    pub fn new(client: C) -> Self {
        Self { client }
    }

    /// A survey was displayed.
    pub async fn survey_shown(&self, account_id: &str, survey_id: &str) -> Result<()> {
        self.client
            .track(TrackingEvent {
                name: "survey_shown".to_string(),
                account_id: account_id.to_string(),
                properties: serde_json::json!({ "survey_id": survey_id }),
            })
            .await
    }

    /// A survey was answered.
    pub async fn survey_answered(
        &self,
        account_id: &str,
        survey_id: &str,
        answer: &str,
    ) -> Result<()> {
        self.client
            .track(TrackingEvent {
                name: "survey_answered".to_string(),
                account_id: account_id.to_string(),
                properties: serde_json::json!({
                    "survey_id": survey_id,
                    "answer": answer,
                }),
            })
            .await
    }

    /// Free-form feedback was submitted.
    pub async fn feedback_submitted(
        &self,
        account_id: &str,
        category: &str,
        message: &str,
    ) -> Result<()> {
        self.client
            .track(TrackingEvent {
                name: "feedback_submitted".to_string(),
                account_id: account_id.to_string(),
                properties: serde_json::json!({
                    "category": category,
                    "message_length": message.len(),
                }),
            })
            .await
    }
}

/// Recording tracking client for testing.
#[cfg(any(test, feature = "test-support"))]
pub mod test {
    use super::*;
    use std::sync::{Arc, RwLock};

    /// Tracking client that records every event for assertions.
    #[derive(Default, Clone)]
    pub struct RecordingTrackingClient {
        events: Arc<RwLock<Vec<TrackingEvent>>>,
    }

    impl RecordingTrackingClient {
        /// Create a new recording client.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// All events tracked so far.
        pub fn events(&self) -> Vec<TrackingEvent> {
            self.events.read().unwrap().clone()
        }
    }

    impl TrackingClient for RecordingTrackingClient {
        async fn track(&self, event: TrackingEvent) -> Result<()> {
            self.events.write().unwrap().push(event);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test::RecordingTrackingClient;
    use super::*;

    #[tokio::test]
    async fn test_survey_events_are_forwarded() {
        let client = RecordingTrackingClient::new();
        let tracker = EngagementTracker::new(client.clone());

        tracker.survey_shown("acct_1", "nps_quarterly").await.unwrap();
        tracker.survey_answered("acct_1", "nps_quarterly", "9").await.unwrap();

        let events = client.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].name, "survey_shown");
        assert_eq!(events[1].name, "survey_answered");
        assert_eq!(events[1].properties["answer"], "9");
    }

    #[tokio::test]
    async fn test_feedback_event_reports_length_not_content() {
        let client = RecordingTrackingClient::new();
        let tracker = EngagementTracker::new(client.clone());

        tracker
            .feedback_submitted("acct_1", "billing", "the invoice page is confusing")
            .await
            .unwrap();

        let events = client.events();
        assert_eq!(events[0].properties["message_length"], 29);
        assert!(events[0].properties.get("message").is_none());
    }

    #[tokio::test]
    async fn test_noop_client_accepts_everything() {
        let tracker = EngagementTracker::new(NoOpTrackingClient);
        tracker.survey_shown("acct_1", "any").await.unwrap();
    }
}
