use {async_trait::async_trait, quill_common::UserId};

use crate::{
    error::Result,
    events::IdentitySubscription,
    record::{IdentityRecord, ProfileUpdate},
};

/// The external identity provider as seen by the onboarding core.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Interactive sign-in. Fails with `AuthCancelled` or `AuthProvider`.
    async fn sign_in(&self) -> Result<IdentityRecord>;

    /// The currently signed-in identity, without a network round trip.
    fn current(&self) -> Option<IdentityRecord>;

    /// Re-fetch the current identity from the provider.
    async fn reload(&self) -> Result<Option<IdentityRecord>>;

    /// Push display name and/or photo URL. Fails with `NotAuthenticated` or
    /// `RemoteWriteFailed`.
    async fn update_profile(&self, user_id: &UserId, update: ProfileUpdate) -> Result<()>;

    async fn sign_out(&self) -> Result<()>;

    fn subscribe(&self) -> IdentitySubscription;
}
