use quill_common::FromMessage;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("sign-in was cancelled")]
    AuthCancelled,
    #[error("identity provider error: {message}")]
    AuthProviderError { message: String },
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("{field}: {message}")]
    InvalidInput {
        field: &'static str,
        message: String,
    },
    #[error("remote write failed: {message}")]
    RemoteWriteFailed { message: String },
    #[error("avatar still missing after {attempts} attempts")]
    AvatarResolutionTimeout { attempts: u32 },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn remote_write(message: impl std::fmt::Display) -> Self {
        Self::RemoteWriteFailed {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    /// Only remote write failures are worth resubmitting unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RemoteWriteFailed { .. })
    }

    /// Collapse a collaborator failure into `RemoteWriteFailed`, keeping
    /// authentication loss distinguishable.
    pub(crate) fn into_remote_failure(self) -> Self {
        match self {
            Self::NotAuthenticated | Self::RemoteWriteFailed { .. } => self,
            other => Self::remote_write(other),
        }
    }
}

impl From<quill_identity::Error> for Error {
    fn from(err: quill_identity::Error) -> Self {
        use quill_identity::Error as Identity;
        match err {
            Identity::AuthCancelled => Self::AuthCancelled,
            Identity::AuthProvider { message } => Self::AuthProviderError { message },
            Identity::NotAuthenticated => Self::NotAuthenticated,
            Identity::RemoteWriteFailed { message } => Self::RemoteWriteFailed { message },
        }
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

quill_common::impl_context!();
