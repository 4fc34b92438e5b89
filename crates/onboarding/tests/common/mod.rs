#![allow(dead_code)]

use std::sync::Arc;

use {
    chrono::{DateTime, Duration, TimeZone, Utc},
    quill_common::UserId,
    quill_config::QuillConfig,
    quill_identity::{IdentityRecord, MemoryIdentityProvider, SignInOutcome},
    quill_onboarding::{
        KeyValueStore, MemoryKeyValueStore, MemoryNavigator, MemoryProfileStore,
        OnboardingService,
    },
};

pub const PROVIDER_PHOTO: &str = "https://lh3.googleusercontent.com/a/ACg8ocK=s96-c";
pub const PROVIDER_PHOTO_400: &str = "https://lh3.googleusercontent.com/a/ACg8ocK=s400-c";

pub struct Harness {
    pub identity: Arc<MemoryIdentityProvider>,
    pub remote: Arc<MemoryProfileStore>,
    pub kv: Arc<MemoryKeyValueStore>,
    pub nav: Arc<MemoryNavigator>,
    pub service: OnboardingService,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(QuillConfig::default())
    }

    pub fn with_config(config: QuillConfig) -> Self {
        let identity = Arc::new(MemoryIdentityProvider::new());
        let remote = Arc::new(MemoryProfileStore::new());
        let kv = Arc::new(MemoryKeyValueStore::new());
        let nav = Arc::new(MemoryNavigator::new("/"));
        let service = OnboardingService::new(
            identity.clone(),
            remote.clone(),
            kv.clone(),
            nav.clone(),
            config,
        );
        Self {
            identity,
            remote,
            kv,
            nav,
            service,
        }
    }

    pub fn script(&self, record: IdentityRecord) {
        self.identity
            .enqueue_sign_in(SignInOutcome::Account(record));
    }

    pub fn preset_flags(&self, uid: &str, profile_completed: bool, topics_selected: bool) {
        self.kv
            .set(
                &format!("user_{uid}_profile_completed"),
                &profile_completed.to_string(),
            )
            .unwrap();
        self.kv
            .set(
                &format!("user_{uid}_topics_selected"),
                &topics_selected.to_string(),
            )
            .unwrap();
    }

    pub fn path(&self) -> String {
        use quill_onboarding::Navigator;
        self.nav.current_path()
    }
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 1, 10, 0, 0).unwrap()
}

pub fn uid(raw: &str) -> UserId {
    UserId::new(raw).unwrap()
}

/// Account created by this very sign-in.
pub fn fresh(raw: &str) -> IdentityRecord {
    IdentityRecord::new_account(uid(raw), format!("{raw}@example.com"), t0())
}

/// Account created earlier, signing in again.
pub fn returning(raw: &str) -> IdentityRecord {
    fresh(raw)
        .with_display_name("Returning User")
        .with_avatar_url(PROVIDER_PHOTO)
        .signed_in_at(t0() + Duration::days(30))
}
