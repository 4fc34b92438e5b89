//! Remote profile-document store.
//!
//! Both writes are keyed by user id with full-replace upsert semantics: a
//! resubmission after a failure simply overwrites.

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    path::PathBuf,
    sync::Mutex,
};

use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    quill_common::UserId,
    serde::{Deserialize, Serialize},
    tracing::{debug, info},
};

use crate::error::{Error, Result};

/// The profile document stored under `users/<uid>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRecord {
    pub uid: UserId,
    pub full_name: String,
    pub email: String,
    /// Data URI, provider URL, or empty.
    pub profile_image: String,
    pub from_google: bool,
    pub updated_at: DateTime<Utc>,
}

/// The full selected-topic set for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicsRecord {
    pub uid: UserId,
    pub topics: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn put_profile(&self, user_id: &UserId, record: &ProfileRecord) -> Result<()>;
    async fn put_topics(&self, user_id: &UserId, record: &TopicsRecord) -> Result<()>;
}

#[derive(Debug, Default)]
struct MemoryState {
    profiles: HashMap<UserId, ProfileRecord>,
    topics: HashMap<UserId, TopicsRecord>,
    failures: VecDeque<String>,
    writes: usize,
}

/// In-memory store with injectable write failures.
#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    state: Mutex<MemoryState>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make the next write fail with `message`. Calls queue up.
    pub fn fail_next_write(&self, message: impl Into<String>) {
        self.lock().failures.push_back(message.into());
    }

    pub fn profile(&self, user_id: &UserId) -> Option<ProfileRecord> {
        self.lock().profiles.get(user_id).cloned()
    }

    pub fn topics(&self, user_id: &UserId) -> Option<TopicsRecord> {
        self.lock().topics.get(user_id).cloned()
    }

    /// Successful writes so far.
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    fn check_failure(state: &mut MemoryState) -> Result<()> {
        match state.failures.pop_front() {
            Some(message) => Err(Error::remote_write(message)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn put_profile(&self, user_id: &UserId, record: &ProfileRecord) -> Result<()> {
        let mut state = self.lock();
        Self::check_failure(&mut state)?;
        state.profiles.insert(user_id.clone(), record.clone());
        state.writes += 1;
        Ok(())
    }

    async fn put_topics(&self, user_id: &UserId, record: &TopicsRecord) -> Result<()> {
        let mut state = self.lock();
        Self::check_failure(&mut state)?;
        state.topics.insert(user_id.clone(), record.clone());
        state.writes += 1;
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Documents {
    #[serde(default)]
    users: BTreeMap<String, ProfileRecord>,
    #[serde(default)]
    topics: BTreeMap<String, TopicsRecord>,
}

/// Stores documents in a single JSON file. Stands in for the hosted document
/// store on local runs.
#[derive(Debug)]
pub struct FileProfileStore {
    path: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

impl FileProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<Documents> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(data) => Ok(serde_json::from_str(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Documents::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn update(&self, f: impl FnOnce(&mut Documents) + Send) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut docs = self.load().await.map_err(Error::into_remote_failure)?;
        f(&mut docs);
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(Error::remote_write)?;
        }
        let data = serde_json::to_string_pretty(&docs).map_err(Error::remote_write)?;
        tokio::fs::write(&self.path, data)
            .await
            .map_err(Error::remote_write)?;
        debug!(path = %self.path.display(), "documents written");
        Ok(())
    }

    pub async fn profile(&self, user_id: &UserId) -> Result<Option<ProfileRecord>> {
        Ok(self.load().await?.users.remove(user_id.as_str()))
    }

    pub async fn topics(&self, user_id: &UserId) -> Result<Option<TopicsRecord>> {
        Ok(self.load().await?.topics.remove(user_id.as_str()))
    }
}

#[async_trait]
impl ProfileStore for FileProfileStore {
    async fn put_profile(&self, user_id: &UserId, record: &ProfileRecord) -> Result<()> {
        info!(user_id = %user_id, "saving profile document");
        let record = record.clone();
        let key = user_id.to_string();
        self.update(move |docs| {
            docs.users.insert(key, record);
        })
        .await
    }

    async fn put_topics(&self, user_id: &UserId, record: &TopicsRecord) -> Result<()> {
        info!(user_id = %user_id, count = record.topics.len(), "saving topics document");
        let record = record.clone();
        let key = user_id.to_string();
        self.update(move |docs| {
            docs.topics.insert(key, record);
        })
        .await
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn profile(uid: &UserId, name: &str) -> ProfileRecord {
        ProfileRecord {
            uid: uid.clone(),
            full_name: name.into(),
            email: "p@example.com".into(),
            profile_image: String::new(),
            from_google: false,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn memory_store_failures_are_one_shot() {
        let store = MemoryProfileStore::new();
        let uid = UserId::new("m1").unwrap();
        store.fail_next_write("offline");

        let err = store
            .put_profile(&uid, &profile(&uid, "A"))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(store.profile(&uid).is_none());

        store.put_profile(&uid, &profile(&uid, "A")).await.unwrap();
        assert_eq!(store.profile(&uid).unwrap().full_name, "A");
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn file_store_upserts() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileProfileStore::new(dir.path().join("docs").join("profiles.json"));
        let uid = UserId::new("f1").unwrap();

        store.put_profile(&uid, &profile(&uid, "First")).await.unwrap();
        store.put_profile(&uid, &profile(&uid, "Second")).await.unwrap();
        store
            .put_topics(&uid, &TopicsRecord {
                uid: uid.clone(),
                topics: vec!["Books".into()],
                updated_at: Utc::now(),
            })
            .await
            .unwrap();

        assert_eq!(
            store.profile(&uid).await.unwrap().unwrap().full_name,
            "Second"
        );
        assert_eq!(store.topics(&uid).await.unwrap().unwrap().topics, vec![
            "Books"
        ]);
    }

    #[tokio::test]
    async fn file_store_failures_are_retryable() {
        let dir = tempfile::tempdir().unwrap();
        let uid = UserId::new("f2").unwrap();

        // Unreadable document file.
        let corrupt = dir.path().join("corrupt.json");
        std::fs::write(&corrupt, "{not json").unwrap();
        let err = FileProfileStore::new(&corrupt)
            .put_profile(&uid, &profile(&uid, "A"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RemoteWriteFailed { .. }));
        assert_eq!(std::fs::read_to_string(&corrupt).unwrap(), "{not json");

        // Target path is a directory.
        let blocked = dir.path().join("blocked.json");
        std::fs::create_dir(&blocked).unwrap();
        let err = FileProfileStore::new(&blocked)
            .put_topics(&uid, &TopicsRecord {
                uid: uid.clone(),
                topics: vec!["Books".into()],
                updated_at: Utc::now(),
            })
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn profile_record_uses_document_field_names() {
        let uid = UserId::new("d1").unwrap();
        let json = serde_json::to_value(profile(&uid, "Doc")).unwrap();
        assert_eq!(json["fullName"], "Doc");
        assert_eq!(json["fromGoogle"], false);
        assert!(json.get("profileImage").is_some());
    }
}
