//! Avatar resolution.
//!
//! Precedence: a cached custom upload always wins, then the provider photo
//! (rewritten to the canonical size). New accounts whose photo has not
//! propagated yet get a bounded reload loop with linear backoff.

use std::{collections::HashMap, sync::Arc, time::Duration};

use {
    base64::{Engine, engine::general_purpose::STANDARD},
    quill_common::UserId,
    quill_config::AvatarConfig,
    quill_identity::{IdentityProvider, IdentityRecord},
    serde::{Deserialize, Serialize},
    tokio::task::JoinHandle,
    tokio_util::sync::CancellationToken,
    tracing::{debug, warn},
};

use crate::{
    error::{Error, Result},
    flags::OnboardingFlags,
};

const DATA_URI_IMAGE_PREFIX: &str = "data:image/";
const PROVIDER_PHOTO_HOST: &str = "googleusercontent.com";

/// Which picture to show for a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "src", rename_all = "snake_case")]
pub enum AvatarSource {
    #[default]
    NoAvatar,
    /// `data:image/...;base64,...`
    CustomUpload(String),
    /// Normalised provider photo URL.
    ProviderAvatar(String),
}

impl AvatarSource {
    /// Classify a persisted `profileImage` value.
    pub fn from_stored(image: &str) -> Self {
        if image.is_empty() {
            Self::NoAvatar
        } else if is_data_uri(image) {
            Self::CustomUpload(image.to_string())
        } else {
            Self::ProviderAvatar(image.to_string())
        }
    }

    /// Inverse of [`from_stored`](Self::from_stored).
    pub fn to_stored(&self) -> String {
        self.url().unwrap_or_default().to_string()
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            Self::NoAvatar => None,
            Self::CustomUpload(src) | Self::ProviderAvatar(src) => Some(src),
        }
    }

    pub fn is_custom_upload(&self) -> bool {
        matches!(self, Self::CustomUpload(_))
    }
}

pub fn is_data_uri(src: &str) -> bool {
    src.starts_with(DATA_URI_IMAGE_PREFIX)
}

/// Rewrite a trailing `=s<N>-c` size token on provider photo URLs to
/// `=s<size>-c`. Other URLs pass through untouched.
pub fn normalize_provider_url(url: &str, size: u32) -> String {
    let is_provider_host = url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.ends_with(PROVIDER_PHOTO_HOST)))
        .unwrap_or(false);
    if !is_provider_host {
        return url.to_string();
    }

    let Some(stem) = url.strip_suffix("-c") else {
        return url.to_string();
    };
    let Some(idx) = stem.rfind("=s") else {
        return url.to_string();
    };
    let digits = &stem[idx + 2..];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return url.to_string();
    }
    format!("{}=s{size}-c", &stem[..idx])
}

/// Up to two uppercase initials for the placeholder shown while (or instead
/// of) loading a picture.
pub fn initials(label: &str) -> String {
    let label = label.trim();
    let source = match label.split_once('@') {
        Some((local, _)) if !label.contains(char::is_whitespace) => local,
        _ => label,
    };
    let letters: String = source
        .split(|c: char| c.is_whitespace() || matches!(c, '.' | '_' | '-'))
        .filter_map(|word| word.chars().find(|c| c.is_alphanumeric()))
        .take(2)
        .flat_map(char::to_uppercase)
        .collect();
    if letters.is_empty() {
        "?".to_string()
    } else {
        letters
    }
}

/// A user-selected image file.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    pub fn new(content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            content_type: content_type.into(),
            bytes,
        }
    }

    /// Guess the content type from a file extension.
    pub fn from_path_bytes(path: &std::path::Path, bytes: Vec<u8>) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let content_type = match ext.as_deref() {
            Some("png") => "image/png",
            Some("jpg" | "jpeg") => "image/jpeg",
            Some("gif") => "image/gif",
            Some("webp") => "image/webp",
            Some("svg") => "image/svg+xml",
            _ => "application/octet-stream",
        };
        Self::new(content_type, bytes)
    }
}

/// Validate and encode a manual upload as a [`AvatarSource::CustomUpload`].
pub fn accept_upload(upload: ImageUpload, max_bytes: usize) -> Result<AvatarSource> {
    if upload.bytes.is_empty() {
        return Err(Error::invalid("avatar", "the selected file is empty"));
    }
    if upload.bytes.len() > max_bytes {
        return Err(Error::invalid(
            "avatar",
            format!("please select an image smaller than {}", human_size(max_bytes)),
        ));
    }
    let content_type = upload.content_type.trim().to_ascii_lowercase();
    if !content_type.starts_with("image/") {
        return Err(Error::invalid("avatar", "please select a valid image file"));
    }
    Ok(AvatarSource::CustomUpload(format!(
        "data:{content_type};base64,{}",
        STANDARD.encode(&upload.bytes)
    )))
}

fn human_size(bytes: usize) -> String {
    const MIB: usize = 1024 * 1024;
    if bytes >= MIB && bytes % MIB == 0 {
        format!("{}MB", bytes / MIB)
    } else {
        format!("{bytes} bytes")
    }
}

enum Retry {
    Found(String),
    Cancelled,
}

/// Resolves avatars and remembers provider photos discovered by retries.
pub struct AvatarResolver {
    identity: Arc<dyn IdentityProvider>,
    config: AvatarConfig,
    refreshed: std::sync::Mutex<HashMap<UserId, String>>,
}

impl AvatarResolver {
    pub fn new(identity: Arc<dyn IdentityProvider>, config: AvatarConfig) -> Self {
        Self {
            identity,
            config,
            refreshed: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &AvatarConfig {
        &self.config
    }

    /// The provider photo known without a network call: the record's URL,
    /// else one found by an earlier retry.
    pub fn provider_avatar(&self, identity: &IdentityRecord) -> Option<String> {
        if let Some(url) = identity.avatar_url.as_deref().filter(|u| !u.is_empty()) {
            return Some(normalize_provider_url(url, self.config.canonical_size));
        }
        self.refreshed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&identity.user_id)
            .cloned()
    }

    /// Resolve the avatar to display. `None` means `cancel` fired first.
    ///
    /// `new_account` enables the reload loop when no provider photo exists.
    pub async fn resolve(
        &self,
        identity: &IdentityRecord,
        flags: Option<&OnboardingFlags>,
        new_account: bool,
        cancel: &CancellationToken,
    ) -> Option<AvatarSource> {
        if let Some(flags) = flags {
            let cached = flags.cached_avatar();
            if cached.is_custom_upload() {
                return Some(cached);
            }
        }
        if let Some(url) = self.provider_avatar(identity) {
            return Some(AvatarSource::ProviderAvatar(url));
        }
        if !new_account {
            return Some(AvatarSource::NoAvatar);
        }

        match self.fetch_provider_avatar(identity, cancel).await {
            Ok(Some(url)) => Some(AvatarSource::ProviderAvatar(url)),
            Ok(None) => None,
            Err(e) => {
                debug!(user_id = %identity.user_id, error = %e, "falling back to placeholder");
                Some(AvatarSource::NoAvatar)
            },
        }
    }

    /// Reload the identity until a photo shows up.
    ///
    /// Attempt `n` (1-based) is followed by a `n * retry_backoff_ms` pause.
    /// Returns `Ok(None)` when cancelled and `AvatarResolutionTimeout` once
    /// all attempts are spent.
    pub async fn fetch_provider_avatar(
        &self,
        identity: &IdentityRecord,
        cancel: &CancellationToken,
    ) -> Result<Option<String>> {
        match self.retry_loop(identity, cancel).await? {
            Retry::Found(url) => Ok(Some(url)),
            Retry::Cancelled => Ok(None),
        }
    }

    async fn retry_loop(
        &self,
        identity: &IdentityRecord,
        cancel: &CancellationToken,
    ) -> Result<Retry> {
        let attempts = self.config.retry_attempts;
        for attempt in 1..=attempts {
            if cancel.is_cancelled() {
                return Ok(Retry::Cancelled);
            }

            match self.identity.reload().await {
                Ok(Some(fresh)) if fresh.user_id != identity.user_id => {
                    debug!(user_id = %identity.user_id, "identity changed during avatar retry");
                    return Ok(Retry::Cancelled);
                },
                Ok(Some(fresh)) => {
                    if let Some(url) = fresh.avatar_url.filter(|u| !u.is_empty()) {
                        if cancel.is_cancelled() {
                            return Ok(Retry::Cancelled);
                        }
                        let url = normalize_provider_url(&url, self.config.canonical_size);
                        debug!(user_id = %identity.user_id, attempt, "provider photo found");
                        self.refreshed
                            .lock()
                            .unwrap_or_else(|e| e.into_inner())
                            .insert(identity.user_id.clone(), url.clone());
                        return Ok(Retry::Found(url));
                    }
                },
                Ok(None) => {
                    debug!(user_id = %identity.user_id, "signed out during avatar retry");
                    return Ok(Retry::Cancelled);
                },
                Err(e) => {
                    warn!(user_id = %identity.user_id, attempt, error = %e, "identity reload failed");
                },
            }

            let backoff = Duration::from_millis(
                self.config
                    .retry_backoff_ms
                    .saturating_mul(u64::from(attempt)),
            );
            tokio::select! {
                _ = cancel.cancelled() => return Ok(Retry::Cancelled),
                _ = tokio::time::sleep(backoff) => {},
            }
        }
        Err(Error::AvatarResolutionTimeout { attempts })
    }

    /// Resolve in the background. The returned task shows initials until
    /// the result lands and cancels the work when dropped.
    pub fn spawn(
        self: &Arc<Self>,
        identity: IdentityRecord,
        flags: Option<OnboardingFlags>,
        new_account: bool,
    ) -> AvatarTask {
        let cancel = CancellationToken::new();
        let placeholder = initials(
            flags
                .as_ref()
                .and_then(|f| f.cached_profile.as_ref())
                .map(|p| p.full_name.as_str())
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| identity.label()),
        );
        let resolver = Arc::clone(self);
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            resolver
                .resolve(&identity, flags.as_ref(), new_account, &token)
                .await
        });
        AvatarTask {
            placeholder,
            cancel,
            handle: Some(handle),
        }
    }
}

/// Handle to a background avatar resolution.
pub struct AvatarTask {
    placeholder: String,
    cancel: CancellationToken,
    handle: Option<JoinHandle<Option<AvatarSource>>>,
}

impl AvatarTask {
    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait for the result. `None` if cancelled or already awaited.
    pub async fn wait(&mut self) -> Option<AvatarSource> {
        let handle = self.handle.take()?;
        match handle.await {
            Ok(result) if !self.cancel.is_cancelled() => result,
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "avatar task failed");
                None
            },
        }
    }
}

impl Drop for AvatarTask {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
