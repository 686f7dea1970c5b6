//! In-app engagement: survey targeting and event forwarding.
//!
//! Survey selection is pure filtering of a static catalog by user tier and
//! activity, combined with frequency capping so nobody sees the same
//! prompt twice in a week. Rendering belongs to the client; answer and
//! feedback events are forwarded to the analytics vendor through the
//! [`TrackingClient`] seam.

pub mod catalog;
pub mod frequency;
pub mod selection;
pub mod tracking;

pub use catalog::{Audience, SurveyDefinition, UserTier, default_catalog};
pub use frequency::{DisplayState, FrequencyCapStore};
pub use selection::{SurveySelector, UserProfile, eligible_surveys};
pub use tracking::{EngagementTracker, NoOpTrackingClient, TrackingClient, TrackingEvent};

#[cfg(any(test, feature = "test-support"))]
pub use frequency::test::InMemoryFrequencyCapStore;

#[cfg(any(test, feature = "test-support"))]
pub use tracking::test::RecordingTrackingClient;
