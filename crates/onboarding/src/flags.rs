//! Typed onboarding flags on top of a [`KeyValueStore`].
//!
//! Key layout (shared with every other reader of the same storage):
//!
//! | key | value |
//! |---|---|
//! | `user_<uid>_profile_completed` | `"true"` / `"false"` |
//! | `user_<uid>_topics_selected` | `"true"` / `"false"` |
//! | `user_<uid>_topics` | JSON array of strings |
//! | `user_<uid>_profile_data` | JSON `{fullName, profileImage, fromGoogle, ...}` |

use std::{collections::BTreeSet, sync::Arc};

use {
    quill_common::UserId,
    serde::{Deserialize, Serialize},
    tracing::{debug, warn},
};

use crate::{avatar::AvatarSource, error::Result, storage::KeyValueStore};

pub mod keys {
    use quill_common::UserId;

    /// Pointer to the signed-in user's identity snapshot.
    pub const CURRENT_USER: &str = "currentUser";

    pub fn profile_completed(uid: &UserId) -> String {
        format!("user_{uid}_profile_completed")
    }

    pub fn topics_selected(uid: &UserId) -> String {
        format!("user_{uid}_topics_selected")
    }

    pub fn topics(uid: &UserId) -> String {
        format!("user_{uid}_topics")
    }

    pub fn profile_data(uid: &UserId) -> String {
        format!("user_{uid}_profile_data")
    }

    pub fn identity_snapshot(uid: &UserId) -> String {
        format!("user_{uid}")
    }
}

/// Local mirror of the committed profile. May be stale; never consulted for
/// stage resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedProfile {
    pub full_name: String,
    /// Data URI for custom uploads, provider URL otherwise, empty for none.
    #[serde(default)]
    pub profile_image: String,
    #[serde(default)]
    pub from_google: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<UserId>,
}

impl CachedProfile {
    pub fn avatar_source(&self) -> AvatarSource {
        AvatarSource::from_stored(&self.profile_image)
    }
}

/// Onboarding progress for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OnboardingFlags {
    pub profile_completed: bool,
    pub topics_selected: bool,
    pub selected_topics: BTreeSet<String>,
    pub cached_profile: Option<CachedProfile>,
}

impl OnboardingFlags {
    pub fn cached_avatar(&self) -> AvatarSource {
        self.cached_profile
            .as_ref()
            .map(CachedProfile::avatar_source)
            .unwrap_or_default()
    }
}

/// The two stage-driving flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagName {
    ProfileCompleted,
    TopicsSelected,
}

impl FlagName {
    fn key(self, uid: &UserId) -> String {
        match self {
            Self::ProfileCompleted => keys::profile_completed(uid),
            Self::TopicsSelected => keys::topics_selected(uid),
        }
    }
}

impl std::fmt::Display for FlagName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ProfileCompleted => f.write_str("profile_completed"),
            Self::TopicsSelected => f.write_str("topics_selected"),
        }
    }
}

/// Typed access to per-user onboarding state.
///
/// Concurrent writers to the same user (several tabs) are not coordinated;
/// the last write wins.
#[derive(Clone)]
pub struct FlagStore {
    kv: Arc<dyn KeyValueStore>,
}

impl FlagStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    pub fn kv(&self) -> &Arc<dyn KeyValueStore> {
        &self.kv
    }

    /// `None` until a record has been created for `uid`.
    pub fn get_flags(&self, uid: &UserId) -> Option<OnboardingFlags> {
        let profile = self.kv.get(&keys::profile_completed(uid));
        let topics = self.kv.get(&keys::topics_selected(uid));
        if profile.is_none() && topics.is_none() {
            return None;
        }

        Some(OnboardingFlags {
            profile_completed: parse_flag(uid, FlagName::ProfileCompleted, profile),
            topics_selected: parse_flag(uid, FlagName::TopicsSelected, topics),
            selected_topics: self.read_json(&keys::topics(uid)).unwrap_or_default(),
            cached_profile: self.read_json(&keys::profile_data(uid)),
        })
    }

    pub fn set_flag(&self, uid: &UserId, name: FlagName, value: bool) -> Result<()> {
        debug!(user_id = %uid, flag = %name, value, "setting onboarding flag");
        self.kv.set(&name.key(uid), if value {
            "true"
        } else {
            "false"
        })
    }

    /// Create a record with both flags `false` unless one exists. Returns
    /// whether a record was created; existing progress is never reset.
    pub fn ensure_record(&self, uid: &UserId) -> Result<bool> {
        if self.get_flags(uid).is_some() {
            return Ok(false);
        }
        self.set_flag(uid, FlagName::ProfileCompleted, false)?;
        self.set_flag(uid, FlagName::TopicsSelected, false)?;
        Ok(true)
    }

    pub fn set_topics(&self, uid: &UserId, topics: &BTreeSet<String>) -> Result<()> {
        let list: Vec<&String> = topics.iter().collect();
        self.kv
            .set(&keys::topics(uid), &serde_json::to_string(&list)?)
    }

    pub fn set_cached_profile(&self, uid: &UserId, profile: &CachedProfile) -> Result<()> {
        self.kv
            .set(&keys::profile_data(uid), &serde_json::to_string(profile)?)
    }

    fn read_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.kv.get(key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "ignoring unparseable storage entry");
                None
            },
        }
    }
}

fn parse_flag(uid: &UserId, name: FlagName, raw: Option<String>) -> bool {
    match raw.as_deref() {
        Some("true") => true,
        Some("false") | None => false,
        Some(other) => {
            warn!(user_id = %uid, flag = %name, value = other, "unexpected flag value, treating as false");
            false
        },
    }
}
