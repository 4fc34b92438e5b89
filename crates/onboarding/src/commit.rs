//! Form-side validation and the in-progress profile draft.
//!
//! Everything here is synchronous and side-effect free; persistence happens
//! in [`crate::service::OnboardingService`].

use std::collections::BTreeSet;

use {
    quill_config::{OnboardingConfig, ProfileConfig},
    quill_identity::{IdentityRecord, ProfileUpdate},
};

use crate::{
    avatar::{AvatarSource, ImageUpload, accept_upload, is_data_uri},
    catalog,
    error::{Error, Result},
};

/// Trim and bound-check a full name. Bounds count characters, not bytes.
pub fn validate_full_name(raw: &str, policy: &ProfileConfig) -> Result<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(Error::invalid("full_name", "please enter your full name"));
    }
    let len = name.chars().count();
    if len < policy.name_min_chars {
        return Err(Error::invalid(
            "full_name",
            format!("must be at least {} characters", policy.name_min_chars),
        ));
    }
    if len > policy.name_max_chars {
        return Err(Error::invalid(
            "full_name",
            format!("must be at most {} characters", policy.name_max_chars),
        ));
    }
    Ok(name.to_string())
}

/// Normalise a topic selection into the set that will be stored.
///
/// Trims, drops case-insensitive duplicates (keeping the first spelling, or
/// the catalog spelling when restricted to the catalog), then enforces the
/// minimum. A minimum of 0 is treated as 1.
pub fn validate_topics<I, S>(topics: I, policy: &OnboardingConfig) -> Result<BTreeSet<String>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = BTreeSet::new();
    let mut selected = BTreeSet::new();
    for topic in topics {
        let topic = topic.as_ref().trim();
        if topic.is_empty() {
            return Err(Error::invalid("topics", "topic names cannot be empty"));
        }
        let topic = if policy.restrict_to_catalog {
            catalog::canonical_topic(topic)
                .ok_or_else(|| Error::invalid("topics", format!("unknown topic \"{topic}\"")))?
        } else {
            topic
        };
        if seen.insert(topic.to_lowercase()) {
            selected.insert(topic.to_string());
        }
    }

    let min = policy.min_topics.max(1);
    if selected.len() < min {
        return Err(Error::invalid(
            "topics",
            format!(
                "please select at least {min} topics to continue ({} selected)",
                selected.len()
            ),
        ));
    }
    Ok(selected)
}

/// State of the profile-completion form between mount and submit.
#[derive(Debug, Clone)]
pub struct ProfileDraft {
    pub full_name: String,
    pub email: String,
    image: AvatarSource,
    provider_photo: Option<String>,
    max_upload_bytes: usize,
}

impl ProfileDraft {
    pub fn new(
        full_name: impl Into<String>,
        email: impl Into<String>,
        image: AvatarSource,
        provider_photo: Option<String>,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            full_name: full_name.into(),
            email: email.into(),
            image,
            provider_photo,
            max_upload_bytes,
        }
    }

    pub fn image(&self) -> &AvatarSource {
        &self.image
    }

    pub fn provider_photo(&self) -> Option<&str> {
        self.provider_photo.as_deref()
    }

    /// Replace the image with a manual upload. On rejection the previous
    /// image is kept.
    pub fn upload(&mut self, upload: ImageUpload) -> Result<()> {
        self.image = accept_upload(upload, self.max_upload_bytes)?;
        Ok(())
    }

    /// Record a provider photo that arrived after the form opened. It is
    /// shown only if the user has not picked something else.
    pub fn set_provider_photo(&mut self, url: String) {
        if self.image == AvatarSource::NoAvatar {
            self.image = AvatarSource::ProviderAvatar(url.clone());
        }
        self.provider_photo = Some(url);
    }

    /// Switch back to the provider photo. Returns `false` when none is known.
    pub fn reset_to_provider(&mut self) -> bool {
        match &self.provider_photo {
            Some(url) => {
                self.image = AvatarSource::ProviderAvatar(url.clone());
                true
            },
            None => false,
        }
    }

    pub fn remove_image(&mut self) {
        self.image = AvatarSource::NoAvatar;
    }

    /// The image to persist: the chosen one, or the provider photo when the
    /// image was removed.
    pub fn final_image(&self) -> AvatarSource {
        match (&self.image, &self.provider_photo) {
            (AvatarSource::NoAvatar, Some(url)) => AvatarSource::ProviderAvatar(url.clone()),
            (image, _) => image.clone(),
        }
    }
}

/// Fields to push back to the identity provider after a profile commit.
///
/// Data URIs never leave the device; a custom upload pushes the provider
/// photo (if any) instead.
pub fn identity_update(
    identity: &IdentityRecord,
    full_name: &str,
    image: &AvatarSource,
    provider_photo: Option<&str>,
) -> ProfileUpdate {
    let photo = match image.url() {
        Some(src) if !is_data_uri(src) => Some(src),
        _ => provider_photo.or(identity.avatar_url.as_deref()),
    };

    ProfileUpdate {
        display_name: (identity.display_name.as_deref() != Some(full_name))
            .then(|| full_name.to_string()),
        avatar_url: photo
            .filter(|p| !is_data_uri(p) && identity.avatar_url.as_deref() != Some(*p))
            .map(str::to_string),
    }
}
