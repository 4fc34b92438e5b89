#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("sign-in was cancelled")]
    AuthCancelled,
    #[error("identity provider error: {message}")]
    AuthProvider { message: String },
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("remote write failed: {message}")]
    RemoteWriteFailed { message: String },
}

impl Error {
    #[must_use]
    pub fn provider(message: impl Into<String>) -> Self {
        Self::AuthProvider {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn remote_write(message: impl Into<String>) -> Self {
        Self::RemoteWriteFailed {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
