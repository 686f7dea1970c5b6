//! Survey targeting, frequency capping, and event forwarding.

use quotewise::engagement::{
    EngagementTracker, InMemoryFrequencyCapStore, RecordingTrackingClient, SurveySelector,
    UserProfile, UserTier, default_catalog, eligible_surveys,
};

fn profile(account_id: &str, tier: UserTier, quotes: u32, days: u32) -> UserProfile {
    UserProfile {
        account_id: account_id.to_string(),
        tier,
        quotes_created: quotes,
        days_since_signup: days,
    }
}

#[test]
fn test_free_tier_never_sees_paid_surveys() {
    let catalog = default_catalog();
    let eligible = eligible_surveys(&catalog, &profile("acct_1", UserTier::Free, 500, 365));

    for survey in &eligible {
        assert!(
            survey.audience.tiers.contains(&UserTier::Free),
            "{} leaked to a free user",
            survey.id
        );
    }
}

#[test]
fn test_new_user_sees_nothing() {
    let catalog = default_catalog();
    let eligible = eligible_surveys(&catalog, &profile("acct_1", UserTier::Pro, 0, 0));
    assert!(eligible.is_empty());
}

#[tokio::test]
async fn test_selection_respects_lifetime_cap_across_sessions() {
    let caps = InMemoryFrequencyCapStore::new();
    let selector = SurveySelector::new(default_catalog(), caps);
    let user = profile("acct_1", UserTier::Starter, 40, 120);

    // onboarding_checkin caps at one display ever.
    let first = selector.select(&user).await.unwrap();
    assert!(first.iter().any(|s| s.id == "onboarding_checkin"));

    selector.record_display("acct_1", "onboarding_checkin").await.unwrap();

    let second = selector.select(&user).await.unwrap();
    assert!(!second.iter().any(|s| s.id == "onboarding_checkin"));
}

#[tokio::test]
async fn test_selection_is_scoped_per_account() {
    let caps = InMemoryFrequencyCapStore::new();
    let selector = SurveySelector::new(default_catalog(), caps);

    selector.record_display("acct_1", "nps_quarterly").await.unwrap();

    // acct_2 is unaffected by acct_1's history.
    let fresh = selector
        .select(&profile("acct_2", UserTier::Pro, 40, 120))
        .await
        .unwrap();
    assert!(fresh.iter().any(|s| s.id == "nps_quarterly"));
}

#[tokio::test]
async fn test_show_and_answer_forwards_events() {
    let caps = InMemoryFrequencyCapStore::new();
    let selector = SurveySelector::new(default_catalog(), caps);
    let client = RecordingTrackingClient::new();
    let tracker = EngagementTracker::new(client.clone());
    let user = profile("acct_1", UserTier::Pro, 40, 120);

    // The flow the app runs: select, show, record, answer.
    let selected = selector.select(&user).await.unwrap();
    let survey = selected
        .iter()
        .find(|s| s.id == "nps_quarterly")
        .expect("nps should be selectable");

    tracker.survey_shown("acct_1", &survey.id).await.unwrap();
    selector.record_display("acct_1", &survey.id).await.unwrap();
    tracker.survey_answered("acct_1", &survey.id, "10").await.unwrap();

    let events = client.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].name, "survey_shown");
    assert_eq!(events[0].properties["survey_id"], "nps_quarterly");
    assert_eq!(events[1].name, "survey_answered");
    assert_eq!(events[1].properties["answer"], "10");

    // And the cooldown now hides it.
    let after = selector.select(&user).await.unwrap();
    assert!(!after.iter().any(|s| s.id == "nps_quarterly"));
}

#[tokio::test]
async fn test_feedback_submission_tracks_category() {
    let client = RecordingTrackingClient::new();
    let tracker = EngagementTracker::new(client.clone());

    tracker
        .feedback_submitted("acct_1", "quotes", "would like line item templates")
        .await
        .unwrap();

    let events = client.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].name, "feedback_submitted");
    assert_eq!(events[0].properties["category"], "quotes");
}
