//! Onboarding service: sign-in bookkeeping and the two form commits.
//!
//! Every commit writes the remote document first and flips its local flag
//! last, so a failed write never advances the stage and resubmitting the
//! same input is safe.

use std::{collections::BTreeSet, sync::Arc};

use {
    chrono::Utc,
    quill_config::QuillConfig,
    quill_identity::{IdentityProvider, IdentityRecord},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{
    avatar::{AvatarResolver, AvatarSource, AvatarTask},
    commit::{ProfileDraft, identity_update, validate_full_name, validate_topics},
    error::{Error, Result},
    flags::{CachedProfile, FlagName, FlagStore},
    remote::{ProfileRecord, ProfileStore, TopicsRecord},
    router::{Navigator, PageMount, StageRouter},
    session::{IdentitySnapshot, SessionCache, is_new_user},
    stage::Stage,
    storage::KeyValueStore,
};

pub struct OnboardingService {
    identity: Arc<dyn IdentityProvider>,
    remote: Arc<dyn ProfileStore>,
    flags: FlagStore,
    session: SessionCache,
    router: Arc<StageRouter>,
    avatar: Arc<AvatarResolver>,
    config: QuillConfig,
}

impl OnboardingService {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        remote: Arc<dyn ProfileStore>,
        kv: Arc<dyn KeyValueStore>,
        navigator: Arc<dyn Navigator>,
        config: QuillConfig,
    ) -> Self {
        let flags = FlagStore::new(Arc::clone(&kv));
        let router = Arc::new(StageRouter::new(flags.clone(), navigator));
        let avatar = Arc::new(AvatarResolver::new(
            Arc::clone(&identity),
            config.avatar.clone(),
        ));
        Self {
            identity,
            remote,
            flags,
            session: SessionCache::new(kv),
            router,
            avatar,
            config,
        }
    }

    pub fn router(&self) -> &Arc<StageRouter> {
        &self.router
    }

    pub fn avatar(&self) -> &Arc<AvatarResolver> {
        &self.avatar
    }

    pub fn flags(&self) -> &FlagStore {
        &self.flags
    }

    pub fn config(&self) -> &QuillConfig {
        &self.config
    }

    pub fn current_identity(&self) -> Option<IdentityRecord> {
        self.identity.current()
    }

    pub fn current_stage(&self) -> Stage {
        self.router.resolve_for(self.identity.current().as_ref())
    }

    /// The locally mirrored `currentUser` snapshot.
    pub fn current_user(&self) -> Option<IdentitySnapshot> {
        self.session.current_user()
    }

    /// Sign in, make sure an onboarding record exists, and route to the
    /// resolved stage.
    pub async fn sign_in(&self) -> Result<Stage> {
        let identity = self.identity.sign_in().await.inspect_err(|e| {
            warn!(error = %e, "sign-in failed");
        })?;
        let uid = &identity.user_id;

        let has_record = self.flags.get_flags(uid).is_some();
        let new_user = is_new_user(
            self.config.onboarding.new_user_detection,
            &identity,
            has_record,
        );
        self.flags.ensure_record(uid)?;
        self.session.record_sign_in(&identity, new_user, Utc::now())?;

        let stage = self.router.sync(Some(&identity));
        info!(user_id = %uid, new_user, %stage, "signed in");
        Ok(stage)
    }

    /// Sign out. Onboarding progress stays on disk.
    pub async fn sign_out(&self) -> Result<Stage> {
        self.session.forget_current_user()?;
        self.identity.sign_out().await?;
        Ok(self.router.sync(None))
    }

    /// Mount `page` with avatar resolution enabled.
    pub fn mount(&self, page: Stage) -> PageMount {
        self.router
            .mount(page, self.identity.as_ref(), Some(Arc::clone(&self.avatar)))
    }

    /// Resolve the signed-in user's avatar in the background.
    pub fn spawn_avatar(&self) -> Option<AvatarTask> {
        let identity = self.identity.current()?;
        let flags = self.flags.get_flags(&identity.user_id);
        let new_account = identity.is_freshly_created();
        Some(self.avatar.spawn(identity, flags, new_account))
    }

    /// Prefill the profile form from the cached profile and the provider.
    pub fn start_profile(&self) -> Result<ProfileDraft> {
        let identity = self.identity.current().ok_or(Error::NotAuthenticated)?;
        let cached = self
            .flags
            .get_flags(&identity.user_id)
            .and_then(|f| f.cached_profile);
        let provider_photo = self.avatar.provider_avatar(&identity);

        let full_name = cached
            .as_ref()
            .map(|p| p.full_name.clone())
            .filter(|n| !n.trim().is_empty())
            .or_else(|| identity.display_name.clone())
            .unwrap_or_default();
        let image = match cached.as_ref().map(CachedProfile::avatar_source) {
            Some(custom @ AvatarSource::CustomUpload(_)) => custom,
            _ => provider_photo
                .clone()
                .map(AvatarSource::ProviderAvatar)
                .unwrap_or_default(),
        };

        Ok(ProfileDraft::new(
            full_name,
            identity.email.clone(),
            image,
            provider_photo,
            self.config.avatar.max_upload_bytes,
        ))
    }

    /// Fetch a late provider photo into `draft` for accounts created by this
    /// sign-in. Returns whether one was found.
    pub async fn refresh_provider_photo(
        &self,
        draft: &mut ProfileDraft,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        if draft.provider_photo().is_some() {
            return Ok(false);
        }
        let identity = self.identity.current().ok_or(Error::NotAuthenticated)?;
        if !identity.is_freshly_created() {
            return Ok(false);
        }
        match self.avatar.fetch_provider_avatar(&identity, cancel).await {
            Ok(Some(url)) => {
                draft.set_provider_photo(url);
                Ok(true)
            },
            Ok(None) => Ok(false),
            Err(e) => {
                debug!(user_id = %identity.user_id, error = %e, "no provider photo");
                Ok(false)
            },
        }
    }

    /// Validate and persist the profile form, then advance.
    ///
    /// Losing the session mid-commit sends the visitor to the landing page.
    pub async fn commit_profile(&self, draft: &ProfileDraft) -> Result<Stage> {
        self.leave_if_signed_out(self.try_commit_profile(draft).await)
    }

    async fn try_commit_profile(&self, draft: &ProfileDraft) -> Result<Stage> {
        let full_name = validate_full_name(&draft.full_name, &self.config.profile)?;
        let identity = self.identity.current().ok_or(Error::NotAuthenticated)?;
        let uid = identity.user_id.clone();

        let mut draft = draft.clone();
        if draft.provider_photo().is_none() {
            if let Some(url) = self.avatar.provider_avatar(&identity) {
                draft.set_provider_photo(url);
            } else if identity.is_freshly_created() {
                self.refresh_provider_photo(&mut draft, &CancellationToken::new())
                    .await?;
            }
        }
        let image = draft.final_image();
        let provider_photo = draft.provider_photo().map(str::to_string);
        let from_google = provider_photo.is_some();
        let email = if identity.email.is_empty() {
            draft.email.clone()
        } else {
            identity.email.clone()
        };

        let record = ProfileRecord {
            uid: uid.clone(),
            full_name: full_name.clone(),
            email: email.clone(),
            profile_image: image.to_stored(),
            from_google,
            updated_at: Utc::now(),
        };
        self.remote
            .put_profile(&uid, &record)
            .await
            .map_err(Error::into_remote_failure)?;

        let update = identity_update(&identity, &full_name, &image, provider_photo.as_deref());
        if !update.is_empty() {
            self.identity
                .update_profile(&uid, update.clone())
                .await
                .map_err(|e| Error::from(e).into_remote_failure())?;
            self.session
                .record_profile(&uid, &full_name, update.avatar_url.as_deref())?;
        }

        self.flags.set_cached_profile(&uid, &CachedProfile {
            full_name,
            profile_image: record.profile_image,
            from_google,
            email: Some(email),
            uid: Some(uid.clone()),
        })?;
        self.flags.set_flag(&uid, FlagName::ProfileCompleted, true)?;
        info!(user_id = %uid, custom_image = image.is_custom_upload(), "profile completed");

        Ok(self.router.sync(Some(&identity)))
    }

    /// Validate and persist the topic selection, then advance.
    pub async fn commit_topics<I, S>(&self, topics: I) -> Result<Stage>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let topics = validate_topics(topics, &self.config.onboarding)?;
        self.leave_if_signed_out(self.try_commit_topics(topics).await)
    }

    async fn try_commit_topics(&self, topics: BTreeSet<String>) -> Result<Stage> {
        let identity = self.identity.current().ok_or(Error::NotAuthenticated)?;
        let uid = &identity.user_id;

        let record = TopicsRecord {
            uid: uid.clone(),
            topics: topics.iter().cloned().collect(),
            updated_at: Utc::now(),
        };
        self.remote
            .put_topics(uid, &record)
            .await
            .map_err(Error::into_remote_failure)?;

        self.flags.set_topics(uid, &topics)?;
        self.flags.set_flag(uid, FlagName::TopicsSelected, true)?;
        info!(user_id = %uid, count = topics.len(), "topics selected");

        Ok(self.router.sync(Some(&identity)))
    }

    fn leave_if_signed_out(&self, result: Result<Stage>) -> Result<Stage> {
        if let Err(Error::NotAuthenticated) = &result {
            warn!("session lost during commit");
            self.router.navigate(Stage::AnonymousLanding);
        }
        result
    }
}
