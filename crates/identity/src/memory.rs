//! In-process identity provider with scripted sign-ins.

use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
};

use {
    async_trait::async_trait,
    quill_common::UserId,
    tracing::{debug, info},
};

use crate::{
    error::{Error, Result},
    events::{IdentityEvents, IdentitySubscription},
    provider::IdentityProvider,
    record::{IdentityRecord, ProfileUpdate},
};

/// What the next `sign_in` call does.
#[derive(Debug, Clone)]
pub enum SignInOutcome {
    Account(IdentityRecord),
    Cancelled,
    ProviderError(String),
}

#[derive(Debug)]
struct Account {
    record: IdentityRecord,
    /// Photo URL that shows up after this many further reloads.
    pending_avatar: Option<(u32, String)>,
}

#[derive(Debug, Default)]
struct State {
    script: VecDeque<SignInOutcome>,
    accounts: HashMap<UserId, Account>,
    current: Option<UserId>,
    fail_next_update: Option<Error>,
    fail_next_reload: Option<Error>,
    reloads: u32,
}

impl State {
    fn current_record(&self) -> Option<IdentityRecord> {
        let uid = self.current.as_ref()?;
        self.accounts.get(uid).map(|a| a.record.clone())
    }
}

/// Scriptable [`IdentityProvider`] for tests and local runs.
#[derive(Debug, Default)]
pub struct MemoryIdentityProvider {
    state: Mutex<State>,
    events: IdentityEvents,
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue the outcome of a future `sign_in` call.
    pub fn enqueue_sign_in(&self, outcome: SignInOutcome) {
        self.lock().script.push_back(outcome);
    }

    /// Make `url` appear on `user_id`'s record after `reloads` reloads,
    /// mimicking a provider that propagates photos late.
    pub fn set_avatar_after_reloads(&self, user_id: &UserId, reloads: u32, url: impl Into<String>) {
        let mut state = self.lock();
        if let Some(account) = state.accounts.get_mut(user_id) {
            account.pending_avatar = Some((reloads, url.into()));
        }
    }

    pub fn fail_next_update(&self, error: Error) {
        self.lock().fail_next_update = Some(error);
    }

    pub fn fail_next_reload(&self, error: Error) {
        self.lock().fail_next_reload = Some(error);
    }

    /// Drop the session without an explicit sign-out (e.g. token revoked).
    pub fn expire_session(&self) {
        self.lock().current = None;
        self.events.publish(None);
    }

    pub fn reload_count(&self) -> u32 {
        self.lock().reloads
    }

    pub fn record(&self, user_id: &UserId) -> Option<IdentityRecord> {
        self.lock().accounts.get(user_id).map(|a| a.record.clone())
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    async fn sign_in(&self) -> Result<IdentityRecord> {
        let record = {
            let mut state = self.lock();
            let outcome = state
                .script
                .pop_front()
                .ok_or_else(|| Error::provider("no sign-in scripted"))?;
            let record = match outcome {
                SignInOutcome::Account(record) => record,
                SignInOutcome::Cancelled => return Err(Error::AuthCancelled),
                SignInOutcome::ProviderError(message) => return Err(Error::provider(message)),
            };

            let uid = record.user_id.clone();
            match state.accounts.get_mut(&uid) {
                Some(account) => account.record = record.clone(),
                None => {
                    state.accounts.insert(uid.clone(), Account {
                        record: record.clone(),
                        pending_avatar: None,
                    });
                },
            }
            state.current = Some(uid);
            record
        };

        info!(user_id = %record.user_id, "signed in");
        self.events.publish(Some(record.clone()));
        Ok(record)
    }

    fn current(&self) -> Option<IdentityRecord> {
        self.lock().current_record()
    }

    async fn reload(&self) -> Result<Option<IdentityRecord>> {
        let mut state = self.lock();
        state.reloads += 1;
        if let Some(err) = state.fail_next_reload.take() {
            return Err(err);
        }

        let Some(uid) = state.current.clone() else {
            return Ok(None);
        };
        if let Some(account) = state.accounts.get_mut(&uid)
            && let Some((remaining, url)) = account.pending_avatar.take()
        {
            if remaining <= 1 {
                debug!(user_id = %uid, "provider photo propagated");
                account.record.avatar_url = Some(url);
            } else {
                account.pending_avatar = Some((remaining - 1, url));
            }
        }
        Ok(state.current_record())
    }

    async fn update_profile(&self, user_id: &UserId, update: ProfileUpdate) -> Result<()> {
        let mut state = self.lock();
        if state.current.as_ref() != Some(user_id) {
            return Err(Error::NotAuthenticated);
        }
        if let Some(err) = state.fail_next_update.take() {
            return Err(err);
        }
        let account = state
            .accounts
            .get_mut(user_id)
            .ok_or(Error::NotAuthenticated)?;
        if let Some(name) = update.display_name {
            account.record.display_name = Some(name);
        }
        if let Some(url) = update.avatar_url {
            account.record.avatar_url = Some(url);
        }
        Ok(())
    }

    async fn sign_out(&self) -> Result<()> {
        let previous = self.lock().current.take();
        if let Some(uid) = previous {
            info!(user_id = %uid, "signed out");
        }
        self.events.publish(None);
        Ok(())
    }

    fn subscribe(&self) -> IdentitySubscription {
        self.events.subscribe()
    }
}
