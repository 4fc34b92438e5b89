//! Session bookkeeping in local storage: the `user_<uid>` identity snapshot
//! and the `currentUser` pointer.
//!
//! None of this feeds stage resolution; it exists so other readers of the
//! same storage can show who is signed in without asking the provider.

use std::{collections::BTreeMap, sync::Arc};

use {
    chrono::{DateTime, Utc},
    quill_common::UserId,
    quill_config::NewUserDetection,
    quill_identity::IdentityRecord,
    serde::{Deserialize, Serialize},
    tracing::{debug, warn},
};

use crate::{error::Result, flags::keys, storage::KeyValueStore};

/// Decide whether a sign-in belongs to a brand-new user.
///
/// `has_record` is whether an onboarding record existed before this sign-in.
pub fn is_new_user(
    detection: NewUserDetection,
    identity: &IdentityRecord,
    has_record: bool,
) -> bool {
    match detection {
        NewUserDetection::StrictTimestamps => identity.is_freshly_created(),
        NewUserDetection::FlagsAbsent => !has_record,
        NewUserDetection::Either => identity.is_freshly_created() || !has_record,
    }
}

/// Identity attributes mirrored into local storage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentitySnapshot {
    pub uid: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, rename = "photoURL")]
    pub photo_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login: Option<DateTime<Utc>>,
    /// Fields written by other code paths, carried through untouched.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl IdentitySnapshot {
    fn from_identity(identity: &IdentityRecord, now: DateTime<Utc>) -> Self {
        Self {
            uid: identity.user_id.to_string(),
            email: identity.email.clone(),
            display_name: identity.display_name.clone().unwrap_or_default(),
            photo_url: identity.avatar_url.clone().unwrap_or_default(),
            created_at: Some(now),
            last_login: Some(now),
            extra: BTreeMap::new(),
        }
    }
}

#[derive(Clone)]
pub struct SessionCache {
    kv: Arc<dyn KeyValueStore>,
}

impl SessionCache {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    /// Record a sign-in. New users get a fresh snapshot; returning users keep
    /// theirs with `lastLogin` bumped.
    pub fn record_sign_in(
        &self,
        identity: &IdentityRecord,
        new_user: bool,
        now: DateTime<Utc>,
    ) -> Result<IdentitySnapshot> {
        let uid = &identity.user_id;
        let snapshot = match self.snapshot(uid) {
            Some(mut existing) if !new_user => {
                existing.last_login = Some(now);
                existing
            },
            _ => IdentitySnapshot::from_identity(identity, now),
        };
        debug!(user_id = %uid, new_user, "recording sign-in snapshot");
        self.write(uid, &snapshot)?;
        Ok(snapshot)
    }

    /// Merge committed profile fields into the snapshot.
    pub fn record_profile(
        &self,
        uid: &UserId,
        display_name: &str,
        photo_url: Option<&str>,
    ) -> Result<()> {
        let mut snapshot = self.snapshot(uid).unwrap_or_else(|| IdentitySnapshot {
            uid: uid.to_string(),
            ..Default::default()
        });
        snapshot.display_name = display_name.to_string();
        if let Some(url) = photo_url {
            snapshot.photo_url = url.to_string();
        }
        self.write(uid, &snapshot)
    }

    pub fn snapshot(&self, uid: &UserId) -> Option<IdentitySnapshot> {
        self.read(&keys::identity_snapshot(uid))
    }

    pub fn current_user(&self) -> Option<IdentitySnapshot> {
        self.read(keys::CURRENT_USER)
    }

    /// Drop the `currentUser` pointer. Per-user data stays.
    pub fn forget_current_user(&self) -> Result<()> {
        self.kv.remove(keys::CURRENT_USER)
    }

    fn write(&self, uid: &UserId, snapshot: &IdentitySnapshot) -> Result<()> {
        let data = serde_json::to_string(snapshot)?;
        self.kv.set(&keys::identity_snapshot(uid), &data)?;
        self.kv.set(keys::CURRENT_USER, &data)
    }

    fn read(&self, key: &str) -> Option<IdentitySnapshot> {
        let raw = self.kv.get(key)?;
        serde_json::from_str(&raw)
            .inspect_err(|e| warn!(key, error = %e, "ignoring unparseable identity snapshot"))
            .ok()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::storage::MemoryKeyValueStore,
        chrono::{Duration, TimeZone},
        rstest::rstest,
    };

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 5, 9, 0, 0).unwrap()
    }

    fn fresh() -> IdentityRecord {
        IdentityRecord::new_account(UserId::new("n1").unwrap(), "n1@example.com", t0())
    }

    fn returning() -> IdentityRecord {
        fresh().signed_in_at(t0() + Duration::days(3))
    }

    #[rstest]
    #[case(NewUserDetection::StrictTimestamps, true, true, true)]
    #[case(NewUserDetection::StrictTimestamps, false, false, false)]
    #[case(NewUserDetection::FlagsAbsent, false, false, true)]
    #[case(NewUserDetection::FlagsAbsent, true, true, false)]
    #[case(NewUserDetection::Either, false, false, true)]
    #[case(NewUserDetection::Either, true, true, true)]
    #[case(NewUserDetection::Either, false, true, false)]
    fn new_user_detection(
        #[case] detection: NewUserDetection,
        #[case] fresh_account: bool,
        #[case] has_record: bool,
        #[case] expected: bool,
    ) {
        let id = if fresh_account {
            fresh()
        } else {
            returning()
        };
        assert_eq!(is_new_user(detection, &id, has_record), expected);
    }

    #[test]
    fn returning_sign_in_only_bumps_last_login() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let cache = SessionCache::new(kv.clone());
        let first = cache.record_sign_in(&fresh(), true, t0()).unwrap();

        let later = t0() + Duration::days(3);
        let second = cache.record_sign_in(&returning(), false, later).unwrap();
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.last_login, Some(later));
        assert_eq!(cache.current_user().unwrap(), second);
    }

    #[test]
    fn snapshot_uses_shared_field_names_and_keeps_extras() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        kv.set(
            "user_n1",
            r#"{"uid":"n1","email":"n1@example.com","displayName":"","photoURL":"","theme":"dark"}"#,
        )
        .unwrap();
        let cache = SessionCache::new(kv.clone());
        cache.record_sign_in(&returning(), false, t0()).unwrap();

        let stored: serde_json::Value =
            serde_json::from_str(&kv.get("user_n1").unwrap()).unwrap();
        assert_eq!(stored["theme"], "dark");
        assert!(stored.get("lastLogin").is_some());
        assert!(stored.get("photoURL").is_some());
    }

    #[test]
    fn forgetting_current_user_keeps_snapshot() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let cache = SessionCache::new(kv.clone());
        cache.record_sign_in(&fresh(), true, t0()).unwrap();
        cache
            .record_profile(&fresh().user_id, "Nia", Some("https://p/n.png"))
            .unwrap();
        cache.forget_current_user().unwrap();

        assert!(cache.current_user().is_none());
        let snap = cache.snapshot(&fresh().user_id).unwrap();
        assert_eq!(snap.display_name, "Nia");
        assert_eq!(snap.photo_url, "https://p/n.png");
    }
}
