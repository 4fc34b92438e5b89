//! Identity adapter: the authenticated user's record as reported by the
//! external identity provider, plus change notifications.
//!
//! The provider itself (popup sign-in, token refresh) lives behind
//! [`IdentityProvider`]; [`MemoryIdentityProvider`] is a scriptable
//! implementation for tests and local runs.

pub mod error;
pub mod events;
pub mod memory;
pub mod provider;
pub mod record;

pub use {
    error::{Error, Result},
    events::{IdentityEvents, IdentitySubscription},
    memory::{MemoryIdentityProvider, SignInOutcome},
    provider::IdentityProvider,
    record::{IdentityRecord, ProfileUpdate},
};
