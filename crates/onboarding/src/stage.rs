//! Pure onboarding stage resolution. No I/O.

use quill_identity::IdentityRecord;

use crate::flags::OnboardingFlags;

/// Steps of the onboarding pipeline, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    AnonymousLanding,
    ProfileCompletion,
    TopicSelection,
    Dashboard,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Self::AnonymousLanding,
        Self::ProfileCompletion,
        Self::TopicSelection,
        Self::Dashboard,
    ];

    /// Canonical route for the stage.
    pub fn route(self) -> &'static str {
        match self {
            Self::AnonymousLanding => "/",
            Self::ProfileCompletion => "/profile-completion",
            Self::TopicSelection => "/topics-selection",
            Self::Dashboard => "/dashboard",
        }
    }

    /// Inverse of [`route`](Self::route). Accepts trailing slashes, query
    /// strings and fragments.
    pub fn from_route(path: &str) -> Option<Self> {
        let path = normalize_path(path);
        Self::ALL.into_iter().find(|s| s.route() == path)
    }

    /// Whether the stage requires a signed-in user.
    pub fn is_protected(self) -> bool {
        self != Self::AnonymousLanding
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::AnonymousLanding => "anonymous_landing",
            Self::ProfileCompletion => "profile_completion",
            Self::TopicSelection => "topic_selection",
            Self::Dashboard => "dashboard",
        };
        f.write_str(name)
    }
}

/// Strip query, fragment and trailing slashes. The root stays `/`.
pub fn normalize_path(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}

/// Derive the stage a visitor belongs in.
///
/// Only the identity's presence and the two local flags matter. A signed-in
/// user without a flags record is treated as having completed nothing.
pub fn resolve(identity: Option<&IdentityRecord>, flags: Option<&OnboardingFlags>) -> Stage {
    if identity.is_none() {
        return Stage::AnonymousLanding;
    }
    let (profile_completed, topics_selected) =
        flags.map_or((false, false), |f| (f.profile_completed, f.topics_selected));

    if !profile_completed {
        Stage::ProfileCompletion
    } else if !topics_selected {
        Stage::TopicSelection
    } else {
        Stage::Dashboard
    }
}
