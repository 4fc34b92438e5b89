//! Identity change notifications.
//!
//! Backed by a `watch` channel: a subscriber always observes the most recent
//! identity, and transitions it has not yet consumed collapse into the
//! latest one.

use {tokio::sync::watch, tracing::debug};

use crate::record::IdentityRecord;

/// Publisher side, embedded in identity providers.
#[derive(Debug)]
pub struct IdentityEvents {
    tx: watch::Sender<Option<IdentityRecord>>,
}

impl Default for IdentityEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityEvents {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Publish the current identity. Returns `false` (and notifies nobody)
    /// when it equals the previously published value.
    pub fn publish(&self, identity: Option<IdentityRecord>) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == identity {
                return false;
            }
            *current = identity;
            true
        });
        if changed {
            debug!(
                user_id = ?self.tx.borrow().as_ref().map(|r| r.user_id.to_string()),
                "identity changed"
            );
        }
        changed
    }

    pub fn current(&self) -> Option<IdentityRecord> {
        self.tx.borrow().clone()
    }

    /// Open a subscription. The first [`IdentitySubscription::next`] call
    /// yields the identity current at subscribe time.
    pub fn subscribe(&self) -> IdentitySubscription {
        IdentitySubscription {
            rx: self.tx.subscribe(),
            initial_pending: true,
        }
    }
}

/// A single live subscription. Dropping it (or calling
/// [`unsubscribe`](Self::unsubscribe)) releases it.
#[derive(Debug)]
pub struct IdentitySubscription {
    rx: watch::Receiver<Option<IdentityRecord>>,
    initial_pending: bool,
}

impl IdentitySubscription {
    /// Wait for the next identity transition.
    ///
    /// Returns `None` once the publisher is gone.
    pub async fn next(&mut self) -> Option<Option<IdentityRecord>> {
        if self.initial_pending {
            self.initial_pending = false;
            return Some(self.rx.borrow_and_update().clone());
        }
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    pub fn current(&self) -> Option<IdentityRecord> {
        self.rx.borrow().clone()
    }

    pub fn unsubscribe(self) {}
}
