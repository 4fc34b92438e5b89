//! Onboarding controller.
//!
//! Flow: anonymous landing → profile completion → topic selection → dashboard.
//!
//! Stage is derived from two locally persisted flags ([`flags`]), never from
//! remote profile content, so it is available before any network round trip.
//! [`router`] turns the stage into redirects, [`service`] commits form
//! results, and [`avatar`] decides which picture to show.

pub mod avatar;
pub mod catalog;
pub mod commit;
pub mod error;
pub mod flags;
pub mod remote;
pub mod router;
pub mod service;
pub mod session;
pub mod stage;
pub mod storage;
pub mod wizard;

pub use {
    avatar::{AvatarResolver, AvatarSource, AvatarTask, ImageUpload},
    commit::ProfileDraft,
    error::{Context, Error, Result},
    flags::{CachedProfile, FlagName, FlagStore, OnboardingFlags},
    remote::{FileProfileStore, MemoryProfileStore, ProfileRecord, ProfileStore, TopicsRecord},
    router::{MemoryNavigator, Navigator, PageMount, PageView, RouteDecision, StageRouter},
    service::OnboardingService,
    session::{IdentitySnapshot, SessionCache},
    stage::{Stage, resolve},
    storage::{FileKeyValueStore, KeyValueStore, MemoryKeyValueStore},
    wizard::run_wizard,
};
