/// Config schema types (onboarding policy, profile rules, avatar handling, storage).
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QuillConfig {
    pub onboarding: OnboardingConfig,
    pub profile: ProfileConfig,
    pub avatar: AvatarConfig,
    pub storage: StorageConfig,
}

/// How a freshly signed-in account is classified as "new".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NewUserDetection {
    /// Account creation time equals last sign-in time.
    #[default]
    StrictTimestamps,
    /// No local onboarding record exists for the user.
    FlagsAbsent,
    /// Either of the above.
    Either,
}

/// Onboarding pipeline policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OnboardingConfig {
    /// Minimum number of topics a user must pick. Historically both 3 and 5
    /// were used; defaults to 3.
    pub min_topics: usize,
    /// Reject topics that are not part of the built-in catalog.
    pub restrict_to_catalog: bool,
    pub new_user_detection: NewUserDetection,
}

impl Default for OnboardingConfig {
    fn default() -> Self {
        Self {
            min_topics: 3,
            restrict_to_catalog: true,
            new_user_detection: NewUserDetection::default(),
        }
    }
}

/// Profile form validation bounds, counted in characters after trimming.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    pub name_min_chars: usize,
    pub name_max_chars: usize,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            name_min_chars: 2,
            name_max_chars: 50,
        }
    }
}

/// Avatar upload and provider-photo retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AvatarConfig {
    /// Largest accepted manual upload. Defaults to 5 MiB.
    pub max_upload_bytes: usize,
    /// Pixel size requested when rewriting provider photo URLs.
    pub canonical_size: u32,
    /// Identity reloads attempted for new accounts without a photo.
    pub retry_attempts: u32,
    /// Backoff unit; attempt `n` waits `n * retry_backoff_ms`.
    pub retry_backoff_ms: u64,
}

impl Default for AvatarConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: 5 * 1024 * 1024,
            canonical_size: 400,
            retry_attempts: 3,
            retry_backoff_ms: 500,
        }
    }
}

/// Local persistence locations. Unset paths resolve under the data dir.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub flags_path: Option<PathBuf>,
    pub profiles_path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn flags_path(&self) -> PathBuf {
        self.flags_path
            .clone()
            .unwrap_or_else(|| crate::loader::data_dir().join("local_storage.json"))
    }

    pub fn profiles_path(&self) -> PathBuf {
        self.profiles_path
            .clone()
            .unwrap_or_else(|| crate::loader::data_dir().join("profiles.json"))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_policy() {
        let cfg = QuillConfig::default();
        assert_eq!(cfg.onboarding.min_topics, 3);
        assert!(cfg.onboarding.restrict_to_catalog);
        assert_eq!(
            cfg.onboarding.new_user_detection,
            NewUserDetection::StrictTimestamps
        );
        assert_eq!(cfg.profile.name_min_chars, 2);
        assert_eq!(cfg.profile.name_max_chars, 50);
        assert_eq!(cfg.avatar.max_upload_bytes, 5_242_880);
        assert_eq!(cfg.avatar.retry_attempts, 3);
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let cfg: QuillConfig = toml::from_str(
            "[onboarding]\nmin_topics = 5\nnew_user_detection = \"either\"\n",
        )
        .unwrap();
        assert_eq!(cfg.onboarding.min_topics, 5);
        assert_eq!(cfg.onboarding.new_user_detection, NewUserDetection::Either);
        assert!(cfg.onboarding.restrict_to_catalog);
        assert_eq!(cfg.avatar.canonical_size, 400);
    }

    #[test]
    fn explicit_storage_paths_win() {
        let storage = StorageConfig {
            flags_path: Some(PathBuf::from("/tmp/flags.json")),
            profiles_path: None,
        };
        assert_eq!(storage.flags_path(), PathBuf::from("/tmp/flags.json"));
    }
}
