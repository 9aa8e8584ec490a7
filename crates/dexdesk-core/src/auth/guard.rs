//! Route-entry guard for protected routes.
//!
//! [`GuardMachine`] is the pure state machine: it is fed the outcomes of the
//! identity probe and the token renewal, and each [`GuardMachine::evaluate`]
//! yields a [`RouteDecision`] plus the effects the caller must run next.
//! [`SessionGuard`] runs those effects against an [`IdentityApi`] and a
//! [`SessionStore`] until the decision settles.
//!
//! Renewal is edge-triggered: it fires once per probe failure instance, no
//! matter how often the machine is evaluated while the probe stays failed.
//! After a successful renewal the guard commits the new pair and re-issues the
//! probe once; a failure of that retry ends the session instead of renewing
//! again.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cache::QueryKey;
use crate::models::{Account, Credentials};

use super::{IdentityApi, SessionStore, TokenRefresher, KEY_MY_ACCOUNT};

/// What the route should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    Loading,
    RenderProtected,
    RenderPublic,
    RedirectToLogin,
    RedirectToHome,
}

impl RouteDecision {
    pub fn is_settled(&self) -> bool {
        !matches!(self, RouteDecision::Loading)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryStatus {
    /// Never started
    #[default]
    Idle,
    /// First fetch in flight, no result yet
    Pending,
    Success,
    Error,
}

/// Observable state of one async operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpState {
    status: QueryStatus,
    fetching: bool,
}

impl OpState {
    pub fn status(&self) -> QueryStatus {
        self.status
    }

    pub fn is_fetching(&self) -> bool {
        self.fetching
    }

    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == QueryStatus::Error
    }

    /// Fetching while an earlier result is still on display
    pub fn is_refetching(&self) -> bool {
        self.fetching && matches!(self.status, QueryStatus::Success | QueryStatus::Error)
    }

    /// Start a fetch, keeping any earlier result visible
    fn start(&mut self) {
        self.fetching = true;
        if self.status == QueryStatus::Idle {
            self.status = QueryStatus::Pending;
        }
    }

    /// Start a fetch that discards the earlier result
    fn start_fresh(&mut self) {
        self.fetching = true;
        self.status = QueryStatus::Pending;
    }

    fn resolve(&mut self, ok: bool) {
        self.fetching = false;
        self.status = if ok {
            QueryStatus::Success
        } else {
            QueryStatus::Error
        };
    }
}

/// Decision for a protected route from the probe and renewal states.
///
/// An unresolved first probe always shows loading; a successful probe renders
/// regardless of renewal; an in-flight renewal shows loading; anything else
/// redirects to login.
pub fn decide_protected(probe: &OpState, renewal: &OpState) -> RouteDecision {
    if probe.is_fetching() && !probe.is_refetching() {
        RouteDecision::Loading
    } else if probe.is_success() {
        RouteDecision::RenderProtected
    } else if renewal.is_fetching() {
        RouteDecision::Loading
    } else {
        RouteDecision::RedirectToLogin
    }
}

/// Work the driver must perform after an evaluation, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardEffect {
    StartProbe,
    StartRenewal,
    /// Write the renewed pair into both stores
    Commit(Credentials),
    /// Remove both keys from both stores
    Clear,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub decision: RouteDecision,
    pub effects: Vec<GuardEffect>,
}

#[derive(Debug, Clone)]
pub struct GuardMachine {
    probe_enabled: bool,
    probe: OpState,
    renewal: OpState,
    /// Id of the latest probe failure
    probe_failures: u64,
    /// Probe failure that renewal has already been triggered for
    renewal_latch: Option<u64>,
    pending_commit: Option<Credentials>,
    refetch_requested: bool,
    renewed: bool,
    cleared: bool,
}

impl GuardMachine {
    /// Fresh machine for a route entry. Without an access token the probe is
    /// disabled and no effect is ever produced.
    pub fn mount(has_access_token: bool) -> Self {
        Self {
            probe_enabled: has_access_token,
            probe: OpState::default(),
            renewal: OpState::default(),
            probe_failures: 0,
            renewal_latch: None,
            pending_commit: None,
            refetch_requested: false,
            renewed: false,
            cleared: false,
        }
    }

    pub fn probe(&self) -> OpState {
        self.probe
    }

    pub fn renewal(&self) -> OpState {
        self.renewal
    }

    pub fn probe_resolved(&mut self, ok: bool) {
        self.probe.resolve(ok);
        if !ok {
            self.probe_failures += 1;
        }
    }

    /// `None` covers both a rejected exchange and a missing refresh token
    pub fn renewal_resolved(&mut self, issued: Option<Credentials>) {
        self.renewal.resolve(issued.is_some());
        self.pending_commit = issued;
    }

    /// Ask for a background re-check of an established session. Returns
    /// false if there is nothing to re-check.
    pub fn request_refetch(&mut self) -> bool {
        if !self.probe_enabled || !self.probe.is_success() || self.probe.is_fetching() {
            return false;
        }
        self.refetch_requested = true;
        // A later failure is a new session-loss event
        self.renewed = false;
        self.cleared = false;
        self.renewal = OpState::default();
        true
    }

    pub fn evaluate(&mut self) -> Evaluation {
        let mut effects = Vec::new();

        if !self.probe_enabled {
            return Evaluation {
                decision: RouteDecision::RedirectToLogin,
                effects,
            };
        }

        if let Some(credentials) = self.pending_commit.take() {
            effects.push(GuardEffect::Commit(credentials));
            self.renewed = true;
            // The old result belongs to the old token
            self.probe.start_fresh();
            effects.push(GuardEffect::StartProbe);
        } else if self.probe.status() == QueryStatus::Idle && !self.probe.is_fetching() {
            self.probe.start();
            effects.push(GuardEffect::StartProbe);
        } else if self.refetch_requested && !self.probe.is_fetching() {
            self.refetch_requested = false;
            self.probe.start();
            effects.push(GuardEffect::StartProbe);
        }

        let fresh_failure = self.probe.is_error()
            && !self.probe.is_fetching()
            && self.renewal_latch != Some(self.probe_failures);
        if fresh_failure {
            self.renewal_latch = Some(self.probe_failures);
            if self.renewed {
                self.clear_once(&mut effects);
            } else if !self.renewal.is_fetching() {
                self.renewal.start_fresh();
                effects.push(GuardEffect::StartRenewal);
            }
        }

        if self.renewal.is_error() {
            self.clear_once(&mut effects);
        }

        Evaluation {
            decision: decide_protected(&self.probe, &self.renewal),
            effects,
        }
    }

    fn clear_once(&mut self, effects: &mut Vec<GuardEffect>) {
        if !self.cleared {
            self.cleared = true;
            effects.push(GuardEffect::Clear);
        }
    }
}

/// Drives a [`GuardMachine`] against the backend and the credential stores.
pub struct SessionGuard {
    session: SessionStore,
    api: Arc<dyn IdentityApi>,
    refresher: TokenRefresher,
    machine: Option<GuardMachine>,
    decisions: watch::Sender<RouteDecision>,
    account: Option<Account>,
}

impl SessionGuard {
    pub fn new(api: Arc<dyn IdentityApi>, session: SessionStore) -> Self {
        let refresher = TokenRefresher::new(api.clone(), session.clone());
        let (decisions, _) = watch::channel(RouteDecision::Loading);
        Self {
            session,
            api,
            refresher,
            machine: None,
            decisions,
            account: None,
        }
    }

    /// Every decision the guard passes through, latest first
    pub fn subscribe(&self) -> watch::Receiver<RouteDecision> {
        self.decisions.subscribe()
    }

    /// Account returned by the last successful probe
    pub fn account(&self) -> Option<&Account> {
        self.account.as_ref()
    }

    /// Enter a protected route and run until the decision settles.
    pub async fn enter(&mut self) -> RouteDecision {
        let has_token = self.session.has_access_token();
        if !has_token {
            debug!("No access token, skipping identity probe");
        }
        let mut machine = GuardMachine::mount(has_token);
        let decision = self.drive(&mut machine).await;
        self.machine = Some(machine);
        decision
    }

    /// Re-check an already rendered route in the background, e.g. after the
    /// credential generation changed. The route keeps rendering while the
    /// probe is in flight.
    pub async fn revalidate(&mut self) -> RouteDecision {
        let Some(mut machine) = self.machine.take() else {
            return self.enter().await;
        };
        if !machine.request_refetch() {
            return self.enter().await;
        }
        let decision = self.drive(&mut machine).await;
        self.machine = Some(machine);
        decision
    }

    async fn drive(&mut self, machine: &mut GuardMachine) -> RouteDecision {
        // Generation the failing credentials were read at; commits and clears
        // only apply if nobody has rotated credentials since.
        let mut observed = self.session.generation();

        loop {
            let Evaluation { decision, effects } = machine.evaluate();
            self.decisions.send_replace(decision);
            if effects.is_empty() {
                debug!(?decision, "Route decision settled");
                return decision;
            }

            for effect in effects {
                match effect {
                    GuardEffect::StartProbe => {
                        observed = self.session.generation();
                        let token = self.session.bearer_token();
                        match self.api.probe(&token).await {
                            Ok(account) => {
                                if let Err(e) = self
                                    .session
                                    .cache()
                                    .write_as(QueryKey::from(KEY_MY_ACCOUNT), &account)
                                {
                                    warn!(error = %e, "Failed to cache account");
                                }
                                self.account = Some(account);
                                machine.probe_resolved(true);
                            }
                            Err(e) => {
                                debug!(error = %e, "Identity probe failed");
                                self.account = None;
                                machine.probe_resolved(false);
                            }
                        }
                    }
                    GuardEffect::StartRenewal => {
                        let issued = match self.refresher.refresh().await {
                            Ok(Some(credentials)) => Some(credentials),
                            Ok(None) => {
                                info!("No refresh token stored, session ended");
                                None
                            }
                            Err(e) => {
                                warn!(error = %e, "Token renewal failed");
                                None
                            }
                        };
                        machine.renewal_resolved(issued);
                    }
                    GuardEffect::Commit(credentials) => {
                        match self.session.commit_if_current(observed, &credentials) {
                            Some(generation) => observed = generation,
                            None => debug!("Renewed credentials superseded, not committing"),
                        }
                    }
                    GuardEffect::Clear => {
                        self.session.clear_if_current(observed);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::testing::FakeIdentity;
    use crate::auth::{CredentialStore, MemoryCredentialStore, KEY_ACCESS_TOKEN, KEY_REFRESH_TOKEN};
    use crate::cache::RequestCache;
    use pretty_assertions::assert_eq;

    // ===== GuardMachine =====

    #[test]
    fn test_no_token_redirects_without_effects() {
        let mut machine = GuardMachine::mount(false);
        for _ in 0..3 {
            let eval = machine.evaluate();
            assert_eq!(eval.decision, RouteDecision::RedirectToLogin);
            assert!(eval.effects.is_empty());
        }
    }

    #[test]
    fn test_pending_probe_always_renders_loading() {
        let mut machine = GuardMachine::mount(true);
        let first = machine.evaluate();
        assert_eq!(first.decision, RouteDecision::Loading);
        assert_eq!(first.effects, vec![GuardEffect::StartProbe]);

        for _ in 0..10 {
            let eval = machine.evaluate();
            assert_eq!(eval.decision, RouteDecision::Loading);
            assert!(eval.effects.is_empty(), "probe must not be restarted");
        }
    }

    #[test]
    fn test_renewal_triggered_once_per_probe_failure() {
        let mut machine = GuardMachine::mount(true);
        machine.evaluate();
        machine.probe_resolved(false);

        let renewals: usize = (0..5)
            .map(|_| {
                machine
                    .evaluate()
                    .effects
                    .iter()
                    .filter(|e| **e == GuardEffect::StartRenewal)
                    .count()
            })
            .sum();
        assert_eq!(renewals, 1);
        assert_eq!(machine.evaluate().decision, RouteDecision::Loading);
    }

    #[test]
    fn test_renewal_success_commits_and_retries_probe() {
        let mut machine = GuardMachine::mount(true);
        machine.evaluate();
        machine.probe_resolved(false);
        machine.evaluate();
        machine.renewal_resolved(Some(Credentials::new("new-A", "new-R")));

        let eval = machine.evaluate();
        assert_eq!(
            eval.effects,
            vec![
                GuardEffect::Commit(Credentials::new("new-A", "new-R")),
                GuardEffect::StartProbe
            ]
        );
        assert_eq!(eval.decision, RouteDecision::Loading);

        machine.probe_resolved(true);
        let eval = machine.evaluate();
        assert_eq!(eval.decision, RouteDecision::RenderProtected);
        assert!(eval.effects.is_empty());
    }

    #[test]
    fn test_renewal_failure_clears_once_and_redirects() {
        let mut machine = GuardMachine::mount(true);
        machine.evaluate();
        machine.probe_resolved(false);
        machine.evaluate();
        machine.renewal_resolved(None);

        let eval = machine.evaluate();
        assert_eq!(eval.effects, vec![GuardEffect::Clear]);
        assert_eq!(eval.decision, RouteDecision::RedirectToLogin);

        let again = machine.evaluate();
        assert!(again.effects.is_empty());
        assert_eq!(again.decision, RouteDecision::RedirectToLogin);
    }

    #[test]
    fn test_retry_failure_after_renewal_is_terminal() {
        let mut machine = GuardMachine::mount(true);
        machine.evaluate();
        machine.probe_resolved(false);
        machine.evaluate();
        machine.renewal_resolved(Some(Credentials::new("new-A", "new-R")));
        machine.evaluate();
        machine.probe_resolved(false);

        let eval = machine.evaluate();
        assert_eq!(eval.effects, vec![GuardEffect::Clear]);
        assert_eq!(eval.decision, RouteDecision::RedirectToLogin);
    }

    #[test]
    fn test_background_refetch_keeps_rendering() {
        let mut machine = GuardMachine::mount(true);
        machine.evaluate();
        machine.probe_resolved(true);
        assert_eq!(machine.evaluate().decision, RouteDecision::RenderProtected);

        assert!(machine.request_refetch());
        let eval = machine.evaluate();
        assert_eq!(eval.effects, vec![GuardEffect::StartProbe]);
        assert!(machine.probe().is_refetching());
        assert_eq!(eval.decision, RouteDecision::RenderProtected);
    }

    #[test]
    fn test_decide_protected_success_wins_over_renewal() {
        let mut probe = OpState::default();
        probe.resolve(true);
        let mut renewal = OpState::default();
        renewal.start();
        assert_eq!(decide_protected(&probe, &renewal), RouteDecision::RenderProtected);
    }

    // ===== SessionGuard =====

    struct Harness {
        store: Arc<MemoryCredentialStore>,
        session: SessionStore,
        fake: Arc<FakeIdentity>,
        guard: SessionGuard,
    }

    fn harness(pairs: &[(&str, &str)], fake: FakeIdentity) -> Harness {
        let store = Arc::new(MemoryCredentialStore::with_entries(pairs.iter().copied()));
        let session = SessionStore::new(store.clone(), Arc::new(RequestCache::new()));
        let fake = Arc::new(fake);
        let guard = SessionGuard::new(fake.clone(), session.clone());
        Harness {
            store,
            session,
            fake,
            guard,
        }
    }

    #[tokio::test]
    async fn test_expired_access_token_is_renewed() {
        let mut h = harness(
            &[(KEY_ACCESS_TOKEN, "expired-A"), (KEY_REFRESH_TOKEN, "good-R")],
            FakeIdentity::new()
                .accepts("new-A")
                .renews("good-R", Credentials::new("new-A", "new-R")),
        );

        assert_eq!(h.guard.enter().await, RouteDecision::RenderProtected);

        assert_eq!(h.store.get(KEY_ACCESS_TOKEN).as_deref(), Some("new-A"));
        assert_eq!(h.store.get(KEY_REFRESH_TOKEN).as_deref(), Some("new-R"));
        let cache = h.session.cache();
        assert_eq!(cache.read_as::<String>(&KEY_ACCESS_TOKEN.into()).as_deref(), Some("new-A"));
        assert_eq!(cache.read_as::<String>(&KEY_REFRESH_TOKEN.into()).as_deref(), Some("new-R"));
        assert_eq!(h.fake.exchange_calls(), 1);
        assert_eq!(h.fake.probe_calls(), 2);
        assert!(h.guard.account().is_some());
    }

    #[tokio::test]
    async fn test_missing_refresh_token_clears_session() {
        let mut h = harness(&[(KEY_ACCESS_TOKEN, "bad-A")], FakeIdentity::new());

        assert_eq!(h.guard.enter().await, RouteDecision::RedirectToLogin);

        assert_eq!(h.fake.exchange_calls(), 0);
        assert_eq!(h.store.get(KEY_ACCESS_TOKEN), None);
        assert_eq!(h.store.get(KEY_REFRESH_TOKEN), None);
        assert!(h.session.cache().read(&KEY_ACCESS_TOKEN.into()).is_none());
        assert!(h.session.cache().read(&KEY_REFRESH_TOKEN.into()).is_none());
    }

    #[tokio::test]
    async fn test_no_token_makes_no_calls() {
        let mut h = harness(&[], FakeIdentity::new());
        assert_eq!(h.guard.enter().await, RouteDecision::RedirectToLogin);
        assert_eq!(h.fake.probe_calls(), 0);
        assert_eq!(h.fake.exchange_calls(), 0);
    }

    #[tokio::test]
    async fn test_valid_token_renders() {
        let mut h = harness(
            &[(KEY_ACCESS_TOKEN, "good-A"), (KEY_REFRESH_TOKEN, "good-R")],
            FakeIdentity::new().accepts("good-A"),
        );
        let rx = h.guard.subscribe();

        assert_eq!(h.guard.enter().await, RouteDecision::RenderProtected);
        assert_eq!(*rx.borrow(), RouteDecision::RenderProtected);
        assert_eq!(h.fake.probe_calls(), 1);
        assert_eq!(h.fake.exchange_calls(), 0);
        assert!(h.session.cache().read_fresh(&KEY_MY_ACCOUNT.into()).is_some());
    }

    #[tokio::test]
    async fn test_rejected_refresh_token_clears_both_stores() {
        let mut h = harness(
            &[(KEY_ACCESS_TOKEN, "expired-A"), (KEY_REFRESH_TOKEN, "revoked-R")],
            FakeIdentity::new(),
        );

        assert_eq!(h.guard.enter().await, RouteDecision::RedirectToLogin);
        assert_eq!(h.fake.exchange_calls(), 1);
        assert_eq!(h.store.get(KEY_ACCESS_TOKEN), None);
        assert_eq!(h.store.get(KEY_REFRESH_TOKEN), None);
        assert!(!h.session.has_access_token());
    }

    #[tokio::test]
    async fn test_renewed_token_that_still_fails_ends_session() {
        let mut h = harness(
            &[(KEY_ACCESS_TOKEN, "expired-A"), (KEY_REFRESH_TOKEN, "good-R")],
            FakeIdentity::new().renews("good-R", Credentials::new("also-bad-A", "new-R")),
        );

        assert_eq!(h.guard.enter().await, RouteDecision::RedirectToLogin);
        assert_eq!(h.fake.exchange_calls(), 1, "no retry storm");
        assert_eq!(h.fake.probe_calls(), 2);
        assert!(!h.session.has_access_token());
        assert_eq!(h.session.refresh_token(), None);
    }

    #[tokio::test]
    async fn test_login_during_renewal_wins() {
        let store = Arc::new(MemoryCredentialStore::with_entries([
            (KEY_ACCESS_TOKEN, "expired-A"),
            (KEY_REFRESH_TOKEN, "good-R"),
        ]));
        let session = SessionStore::new(store.clone(), Arc::new(RequestCache::new()));
        let login = session.clone();
        let fake = Arc::new(
            FakeIdentity::new()
                .accepts("login-A")
                .renews("good-R", Credentials::new("stale-A", "stale-R"))
                .during_exchange(move || {
                    login.commit(&Credentials::new("login-A", "login-R"));
                }),
        );
        let mut guard = SessionGuard::new(fake.clone(), session.clone());

        assert_eq!(guard.enter().await, RouteDecision::RenderProtected);
        assert_eq!(store.get(KEY_ACCESS_TOKEN).as_deref(), Some("login-A"));
        assert_eq!(store.get(KEY_REFRESH_TOKEN).as_deref(), Some("login-R"));
    }

    #[tokio::test]
    async fn test_revalidate_after_revocation_renews() {
        let mut h = harness(
            &[(KEY_ACCESS_TOKEN, "good-A"), (KEY_REFRESH_TOKEN, "good-R")],
            FakeIdentity::new()
                .accepts("good-A")
                .accepts("new-A")
                .renews("good-R", Credentials::new("new-A", "new-R")),
        );
        assert_eq!(h.guard.enter().await, RouteDecision::RenderProtected);

        h.fake.revoke("good-A");
        assert_eq!(h.guard.revalidate().await, RouteDecision::RenderProtected);
        assert_eq!(h.fake.exchange_calls(), 1);
        assert_eq!(h.session.access_token().as_deref(), Some("new-A"));
    }
}
