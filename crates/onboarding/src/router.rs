//! Stage routing.
//!
//! [`StageRouter`] compares the stage a visitor belongs in with the page
//! being shown and redirects when they differ. A [`PageMount`] owns one
//! identity subscription for the lifetime of a page and re-routes on every
//! identity transition; a newer transition supersedes any in-flight avatar
//! work started for an older one.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU64, Ordering},
};

use {
    quill_identity::{IdentityProvider, IdentityRecord},
    tokio::{sync::watch, task::JoinHandle},
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{
    avatar::{AvatarResolver, AvatarSource, AvatarTask},
    flags::{FlagStore, OnboardingFlags},
    stage::{self, Stage, normalize_path},
};

/// Where the visitor currently is, and how to send them elsewhere.
pub trait Navigator: Send + Sync {
    fn current_path(&self) -> String;
    fn redirect(&self, path: &str);
}

#[derive(Debug)]
struct NavState {
    path: String,
    redirects: Vec<String>,
}

/// Navigator that records redirects instead of performing them.
#[derive(Debug)]
pub struct MemoryNavigator {
    state: Mutex<NavState>,
}

impl Default for MemoryNavigator {
    fn default() -> Self {
        Self::new("/")
    }
}

impl MemoryNavigator {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(NavState {
                path: path.into(),
                redirects: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, NavState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Simulate the user following a link.
    pub fn visit(&self, path: impl Into<String>) {
        self.lock().path = path.into();
    }

    /// Every redirect issued so far, oldest first.
    pub fn redirects(&self) -> Vec<String> {
        self.lock().redirects.clone()
    }
}

impl Navigator for MemoryNavigator {
    fn current_path(&self) -> String {
        self.lock().path.clone()
    }

    fn redirect(&self, path: &str) {
        let mut state = self.lock();
        state.path = path.to_string();
        state.redirects.push(path.to_string());
    }
}

/// Outcome of checking a page against the resolved stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    Render,
    Redirect(Stage),
}

pub struct StageRouter {
    flags: FlagStore,
    navigator: Arc<dyn Navigator>,
    generation: AtomicU64,
}

impl StageRouter {
    pub fn new(flags: FlagStore, navigator: Arc<dyn Navigator>) -> Self {
        Self {
            flags,
            navigator,
            generation: AtomicU64::new(0),
        }
    }

    pub fn flags(&self) -> &FlagStore {
        &self.flags
    }

    pub fn navigator(&self) -> &Arc<dyn Navigator> {
        &self.navigator
    }

    /// Identity transitions seen by mounted pages so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn flags_for(&self, identity: Option<&IdentityRecord>) -> Option<OnboardingFlags> {
        identity.and_then(|id| self.flags.get_flags(&id.user_id))
    }

    /// Resolve the stage from the local flags. No network access.
    pub fn resolve_for(&self, identity: Option<&IdentityRecord>) -> Stage {
        stage::resolve(identity, self.flags_for(identity).as_ref())
    }

    /// Decide whether `page` may render for `identity`.
    pub fn guard(&self, page: Stage, identity: Option<&IdentityRecord>) -> RouteDecision {
        if identity.is_none() {
            return if page.is_protected() {
                RouteDecision::Redirect(Stage::AnonymousLanding)
            } else {
                RouteDecision::Render
            };
        }
        let resolved = self.resolve_for(identity);
        if resolved == page {
            RouteDecision::Render
        } else {
            RouteDecision::Redirect(resolved)
        }
    }

    /// Go to `stage`. Returns `false` without redirecting when already there.
    pub fn navigate(&self, stage: Stage) -> bool {
        let current = self.navigator.current_path();
        if normalize_path(&current) == stage.route() {
            return false;
        }
        info!(from = %current, to = stage.route(), "redirecting");
        self.navigator.redirect(stage.route());
        true
    }

    /// Resolve and move the visitor to the stage's route.
    pub fn sync(&self, identity: Option<&IdentityRecord>) -> Stage {
        let resolved = self.resolve_for(identity);
        self.navigate(resolved);
        resolved
    }

    /// Mount `page`: subscribe to identity changes and route on each one
    /// until the returned handle is dropped.
    ///
    /// With an avatar resolver, a page that renders also resolves the
    /// signed-in user's avatar in the background.
    pub fn mount(
        self: &Arc<Self>,
        page: Stage,
        provider: &dyn IdentityProvider,
        avatar: Option<Arc<AvatarResolver>>,
    ) -> PageMount {
        let mut subscription = provider.subscribe();
        let (tx, rx) = watch::channel(PageView::pending(page));
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let router = Arc::clone(self);

        let handle = tokio::spawn(async move {
            let mut avatar_task: Option<AvatarTask> = None;
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    event = subscription.next() => {
                        let Some(identity) = event else {
                            debug!(page = %page, "identity events closed");
                            break;
                        };
                        // Supersede whatever the previous transition started.
                        avatar_task = None;
                        let view = router.on_identity(page, identity, avatar.as_ref(), &mut avatar_task);
                        tx.send_replace(view);
                    },
                    resolved = settle(&mut avatar_task) => {
                        if let Some(source) = resolved {
                            tx.send_modify(|view| view.avatar = Some(source));
                        }
                    },
                }
            }
            subscription.unsubscribe();
            debug!(page = %page, "page unmounted");
        });

        PageMount {
            view: rx,
            cancel,
            handle: Some(handle),
        }
    }

    fn on_identity(
        &self,
        page: Stage,
        identity: Option<IdentityRecord>,
        avatar: Option<&Arc<AvatarResolver>>,
        avatar_task: &mut Option<AvatarTask>,
    ) -> PageView {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let flags = self.flags_for(identity.as_ref());
        let resolved = stage::resolve(identity.as_ref(), flags.as_ref());

        let decision = if resolved == page {
            RouteDecision::Render
        } else {
            self.navigate(resolved);
            RouteDecision::Redirect(resolved)
        };
        debug!(page = %page, %resolved, generation, "routed identity change");

        let mut placeholder = None;
        if decision == RouteDecision::Render
            && let (Some(id), Some(resolver)) = (identity.as_ref(), avatar)
        {
            let task = resolver.spawn(id.clone(), flags, id.is_freshly_created());
            placeholder = Some(task.placeholder().to_string());
            *avatar_task = Some(task);
        }

        PageView {
            page,
            generation,
            identity,
            decision: Some(decision),
            placeholder,
            avatar: None,
        }
    }
}

/// Wait for the pending avatar task, if any. Never resolves without one.
async fn settle(task: &mut Option<AvatarTask>) -> Option<AvatarSource> {
    let Some(pending) = task.as_mut() else {
        return std::future::pending().await;
    };
    let resolved = pending.wait().await;
    *task = None;
    resolved
}

/// What a mounted page should display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageView {
    pub page: Stage,
    /// Router generation of the identity transition this view reflects.
    pub generation: u64,
    pub identity: Option<IdentityRecord>,
    /// `None` until the first identity event has been routed.
    pub decision: Option<RouteDecision>,
    /// Initials shown while the avatar resolves.
    pub placeholder: Option<String>,
    pub avatar: Option<AvatarSource>,
}

impl PageView {
    fn pending(page: Stage) -> Self {
        Self {
            page,
            generation: 0,
            identity: None,
            decision: None,
            placeholder: None,
            avatar: None,
        }
    }

    pub fn should_render(&self) -> bool {
        self.decision == Some(RouteDecision::Render)
    }
}

/// A mounted page. Dropping it releases the subscription and cancels any
/// avatar work.
pub struct PageMount {
    view: watch::Receiver<PageView>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl PageMount {
    pub fn view(&self) -> PageView {
        self.view.borrow().clone()
    }

    /// Wait until the view satisfies `predicate`. `None` once unmounted.
    pub async fn wait_for(&mut self, predicate: impl FnMut(&PageView) -> bool) -> Option<PageView> {
        self.view
            .wait_for(predicate)
            .await
            .ok()
            .map(|view| view.clone())
    }

    /// Wait for the first routed identity event.
    pub async fn routed(&mut self) -> Option<PageView> {
        self.wait_for(|view| view.decision.is_some()).await
    }

    /// Tear down and wait for the event loop to exit.
    pub async fn unmount(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take()
            && let Err(e) = handle.await
        {
            warn!(error = %e, "page event loop failed");
        }
    }
}

impl Drop for PageMount {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{flags::FlagName, storage::MemoryKeyValueStore},
        chrono::{TimeZone, Utc},
        quill_common::UserId,
    };

    fn router(path: &str) -> (StageRouter, Arc<MemoryNavigator>) {
        let nav = Arc::new(MemoryNavigator::new(path));
        let flags = FlagStore::new(Arc::new(MemoryKeyValueStore::new()));
        (StageRouter::new(flags, nav.clone()), nav)
    }

    fn identity(uid: &str) -> IdentityRecord {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        IdentityRecord::new_account(UserId::new(uid).unwrap(), "r@example.com", t0)
    }

    #[test]
    fn redirect_to_current_page_is_noop() {
        let (router, nav) = router("/profile-completion/");
        assert!(!router.navigate(Stage::ProfileCompletion));
        assert!(nav.redirects().is_empty());
        assert!(router.navigate(Stage::Dashboard));
        assert!(!router.navigate(Stage::Dashboard));
        assert_eq!(nav.redirects(), vec!["/dashboard"]);
    }

    #[test]
    fn guard_blocks_incomplete_profile_from_dashboard() {
        let (router, _) = router("/dashboard");
        let id = identity("g1");
        assert_eq!(
            router.guard(Stage::Dashboard, Some(&id)),
            RouteDecision::Redirect(Stage::ProfileCompletion)
        );
        assert_eq!(
            router.guard(Stage::Dashboard, None),
            RouteDecision::Redirect(Stage::AnonymousLanding)
        );
    }

    #[test]
    fn guard_lets_anonymous_visitors_see_landing_only() {
        let (router, _) = router("/");
        for page in Stage::ALL {
            let expected = if page.is_protected() {
                RouteDecision::Redirect(Stage::AnonymousLanding)
            } else {
                RouteDecision::Render
            };
            assert_eq!(router.guard(page, None), expected);
        }
        assert_eq!(
            router.guard(Stage::AnonymousLanding, Some(&identity("g2"))),
            RouteDecision::Redirect(Stage::ProfileCompletion)
        );
    }

    #[test]
    fn sync_follows_flags() {
        let (router, nav) = router("/");
        let id = identity("s1");
        router
            .flags()
            .set_flag(&id.user_id, FlagName::ProfileCompleted, true)
            .unwrap();
        assert_eq!(router.sync(Some(&id)), Stage::TopicSelection);
        assert_eq!(nav.current_path(), "/topics-selection");
        assert_eq!(router.sync(Some(&id)), Stage::TopicSelection);
        assert_eq!(nav.redirects().len(), 1);
    }
}
