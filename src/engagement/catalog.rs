//! The static survey catalog.
//!
//! Surveys are configuration, not data: the set ships with the app and
//! changes via deploy, the same way plan definitions do.

use serde::{Deserialize, Serialize};

/// Subscription tier a user can be on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserTier {
    Free,
    Starter,
    Pro,
}

impl UserTier {
    /// Convert to string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Starter => "starter",
            Self::Pro => "pro",
        }
    }
}

/// Who a survey targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Audience {
    /// Tiers the survey applies to.
    pub tiers: Vec<UserTier>,
    /// Minimum quotes the user must have created.
    pub min_quotes_created: u32,
    /// Minimum days since signup.
    pub min_days_since_signup: u32,
}

/// A survey as configured in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyDefinition {
    /// Stable survey identifier.
    pub id: String,
    /// The question shown to the user.
    pub prompt: String,
    /// Targeting rules.
    pub audience: Audience,
    /// Days to wait between displays.
    pub cooldown_days: u32,
    /// Lifetime display cap.
    pub max_displays: u32,
}

/// The surveys Quotewise ships with.
#[must_use]
pub fn default_catalog() -> Vec<SurveyDefinition> {
    vec![
        SurveyDefinition {
            id: "onboarding_checkin".to_string(),
            prompt: "How was setting up your first quote?".to_string(),
            audience: Audience {
                tiers: vec![UserTier::Free, UserTier::Starter, UserTier::Pro],
                min_quotes_created: 1,
                min_days_since_signup: 3,
            },
            cooldown_days: 30,
            max_displays: 1,
        },
        SurveyDefinition {
            id: "nps_quarterly".to_string(),
            prompt: "How likely are you to recommend Quotewise to another contractor?"
                .to_string(),
            audience: Audience {
                tiers: vec![UserTier::Starter, UserTier::Pro],
                min_quotes_created: 10,
                min_days_since_signup: 30,
            },
            cooldown_days: 90,
            max_displays: 8,
        },
        SurveyDefinition {
            id: "pro_feature_feedback".to_string(),
            prompt: "Which reporting feature should we build next?".to_string(),
            audience: Audience {
                tiers: vec![UserTier::Pro],
                min_quotes_created: 25,
                min_days_since_signup: 14,
            },
            cooldown_days: 60,
            max_displays: 2,
        },
        SurveyDefinition {
            id: "upgrade_blocker".to_string(),
            prompt: "What's keeping you on the free plan?".to_string(),
            audience: Audience {
                tiers: vec![UserTier::Free],
                min_quotes_created: 5,
                min_days_since_signup: 21,
            },
            cooldown_days: 45,
            max_displays: 3,
        },
    ]
}
