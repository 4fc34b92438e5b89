use {
    chrono::{DateTime, Utc},
    quill_common::UserId,
    serde::{Deserialize, Serialize},
};

/// The authenticated user's identity attributes as reported by the provider.
///
/// Read-only outside the identity adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRecord {
    pub user_id: UserId,
    pub email: String,
    pub display_name: Option<String>,
    /// Provider-specific photo URL; may lag behind account creation.
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_sign_in_at: DateTime<Utc>,
}

impl IdentityRecord {
    /// A record for an account created by this very sign-in.
    pub fn new_account(user_id: UserId, email: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            email: email.into(),
            display_name: None,
            avatar_url: None,
            created_at: at,
            last_sign_in_at: at,
        }
    }

    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_avatar_url(mut self, url: impl Into<String>) -> Self {
        self.avatar_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn signed_in_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_sign_in_at = at;
        self
    }

    /// Exact timestamp equality at sign-in time marks a freshly created account.
    pub fn is_freshly_created(&self) -> bool {
        self.created_at == self.last_sign_in_at
    }

    /// Display name when set and non-blank, else the email address.
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.email)
    }
}

/// Fields pushed back to the identity provider. `None` leaves a field as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.avatar_url.is_none()
    }
}
