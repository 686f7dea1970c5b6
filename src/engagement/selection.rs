//! Survey selection.
//!
//! Eligibility is a pure filter over the catalog; the selector layers
//! frequency capping on top.

use super::catalog::SurveyDefinition;
use super::frequency::FrequencyCapStore;
use crate::error::Result;
use crate::util::unix_now;

/// What we know about a user when picking surveys.
#[derive(Debug, Clone)]
pub struct UserProfile {
    /// Account the user belongs to.
    pub account_id: String,
    /// Subscription tier.
    pub tier: super::catalog::UserTier,
    /// Quotes the user has created so far.
    pub quotes_created: u32,
    /// Days since the account signed up.
    pub days_since_signup: u32,
}

/// Pure eligibility filter: tier and activity rules only.
///
/// Frequency capping is the selector's job; this function is deterministic
/// over its inputs.
#[must_use]
pub fn eligible_surveys<'a>(
    catalog: &'a [SurveyDefinition],
    profile: &UserProfile,
) -> Vec<&'a SurveyDefinition> {
    catalog
        .iter()
        .filter(|survey| {
            survey.audience.tiers.contains(&profile.tier)
                && profile.quotes_created >= survey.audience.min_quotes_created
                && profile.days_since_signup >= survey.audience.min_days_since_signup
        })
        .collect()
}

/// Picks the surveys a user should see right now.
pub struct SurveySelector<F: FrequencyCapStore> {
    catalog: Vec<SurveyDefinition>,
    caps: F,
}

impl<F: FrequencyCapStore> SurveySelector<F> {
    /// Create a selector over a catalog.
    #[must_use]
    pub fn new(catalog: Vec<SurveyDefinition>, caps: F) -> Self {
        Self { catalog, caps }
    }

    /// Surveys the user is eligible for and not capped out of.
    ///
    /// A survey is suppressed once its lifetime cap is reached, or while
    /// the last display is within the cooldown window.
    pub async fn select(&self, profile: &UserProfile) -> Result<Vec<SurveyDefinition>> {
        let now = unix_now();
        let mut selected = Vec::new();

        for survey in eligible_surveys(&self.catalog, profile) {
            let state = self
                .caps
                .get_state(&profile.account_id, &survey.id)
                .await?;

            if state.displays >= survey.max_displays {
                continue;
            }

            if let Some(last) = state.last_displayed_at {
                let cooldown_secs = u64::from(survey.cooldown_days) * 86400;
                if now.saturating_sub(last) < cooldown_secs {
                    continue;
                }
            }

            selected.push(survey.clone());
        }

        Ok(selected)
    }

    /// Record that a survey was displayed to the user.
    pub async fn record_display(&self, account_id: &str, survey_id: &str) -> Result<()> {
        self.caps.record_display(account_id, survey_id, unix_now()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engagement::catalog::{Audience, UserTier, default_catalog};
    use crate::engagement::frequency::test::InMemoryFrequencyCapStore;

    fn profile(tier: UserTier, quotes: u32, days: u32) -> UserProfile {
        UserProfile {
            account_id: "acct_1".to_string(),
            tier,
            quotes_created: quotes,
            days_since_signup: days,
        }
    }

    #[test]
    fn test_eligibility_filters_by_tier() {
        let catalog = default_catalog();
        let eligible = eligible_surveys(&catalog, &profile(UserTier::Free, 100, 365));
        assert!(eligible.iter().any(|s| s.id == "upgrade_blocker"));
        assert!(!eligible.iter().any(|s| s.id == "pro_feature_feedback"));
        assert!(!eligible.iter().any(|s| s.id == "nps_quarterly"));
    }

    #[test]
    fn test_eligibility_filters_by_activity() {
        let catalog = default_catalog();

        // Brand-new pro user: active enough for nothing yet.
        let eligible = eligible_surveys(&catalog, &profile(UserTier::Pro, 0, 0));
        assert!(eligible.is_empty());

        // Seasoned pro user gets the pro surveys.
        let eligible = eligible_surveys(&catalog, &profile(UserTier::Pro, 30, 60));
        let ids: Vec<&str> = eligible.iter().map(|s| s.id.as_str()).collect();
        assert!(ids.contains(&"nps_quarterly"));
        assert!(ids.contains(&"pro_feature_feedback"));
    }

    #[test]
    fn test_eligibility_boundary_is_inclusive() {
        let catalog = vec![SurveyDefinition {
            id: "exact".to_string(),
            prompt: "?".to_string(),
            audience: Audience {
                tiers: vec![UserTier::Starter],
                min_quotes_created: 10,
                min_days_since_signup: 30,
            },
            cooldown_days: 1,
            max_displays: 1,
        }];

        let eligible = eligible_surveys(&catalog, &profile(UserTier::Starter, 10, 30));
        assert_eq!(eligible.len(), 1);

        let not_yet = eligible_surveys(&catalog, &profile(UserTier::Starter, 9, 30));
        assert!(not_yet.is_empty());
    }

    #[tokio::test]
    async fn test_selector_suppresses_at_lifetime_cap() {
        let caps = InMemoryFrequencyCapStore::new();
        let selector = SurveySelector::new(default_catalog(), caps);
        let profile = profile(UserTier::Starter, 50, 90);

        let before = selector.select(&profile).await.unwrap();
        assert!(before.iter().any(|s| s.id == "onboarding_checkin"));

        // onboarding_checkin has a lifetime cap of 1.
        selector.record_display("acct_1", "onboarding_checkin").await.unwrap();

        let after = selector.select(&profile).await.unwrap();
        assert!(!after.iter().any(|s| s.id == "onboarding_checkin"));
    }

    #[tokio::test]
    async fn test_selector_suppresses_within_cooldown() {
        let caps = InMemoryFrequencyCapStore::new();
        let selector = SurveySelector::new(default_catalog(), caps);
        let profile = profile(UserTier::Pro, 50, 90);

        // nps_quarterly allows 8 displays, but a fresh display starts the
        // 90-day cooldown.
        selector.record_display("acct_1", "nps_quarterly").await.unwrap();

        let after = selector.select(&profile).await.unwrap();
        assert!(!after.iter().any(|s| s.id == "nps_quarterly"));
    }

    #[tokio::test]
    async fn test_selector_caps_are_per_account() {
        let caps = InMemoryFrequencyCapStore::new();
        let selector = SurveySelector::new(default_catalog(), caps);

        selector.record_display("acct_1", "onboarding_checkin").await.unwrap();

        let other = UserProfile {
            account_id: "acct_2".to_string(),
            tier: UserTier::Starter,
            quotes_created: 50,
            days_since_signup: 90,
        };
        let selected = selector.select(&other).await.unwrap();
        assert!(selected.iter().any(|s| s.id == "onboarding_checkin"));
    }
}
