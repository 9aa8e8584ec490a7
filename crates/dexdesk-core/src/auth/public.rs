use tracing::debug;

use super::{RouteDecision, SessionStore};

/// Outcome of looking up the access token for a public-only route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenLookup {
    /// The read has not completed yet
    Pending,
    Resolved(Option<String>),
}

/// Decision for a public-only route (login, registration, ...): signed-in
/// users are sent home, everyone else sees the page.
pub fn decide_public(lookup: &TokenLookup) -> RouteDecision {
    match lookup {
        TokenLookup::Pending => RouteDecision::Loading,
        TokenLookup::Resolved(Some(token)) if !token.is_empty() => RouteDecision::RedirectToHome,
        TokenLookup::Resolved(_) => RouteDecision::RenderPublic,
    }
}

/// Guard for public-only routes. Reads the token from cache or store; never
/// touches the network.
#[derive(Clone)]
pub struct PublicGuard {
    session: SessionStore,
}

impl PublicGuard {
    pub fn new(session: SessionStore) -> Self {
        Self { session }
    }

    pub fn enter(&self) -> RouteDecision {
        let decision = decide_public(&TokenLookup::Resolved(self.session.access_token()));
        debug!(?decision, "Public route decision");
        decision
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::auth::{MemoryCredentialStore, KEY_ACCESS_TOKEN};
    use crate::cache::{QueryKey, RequestCache};

    #[test]
    fn test_decide_public() {
        assert_eq!(decide_public(&TokenLookup::Pending), RouteDecision::Loading);
        assert_eq!(decide_public(&TokenLookup::Resolved(None)), RouteDecision::RenderPublic);
        assert_eq!(
            decide_public(&TokenLookup::Resolved(Some(String::new()))),
            RouteDecision::RenderPublic
        );
        assert_eq!(
            decide_public(&TokenLookup::Resolved(Some("a-1".to_string()))),
            RouteDecision::RedirectToHome
        );
    }

    #[test]
    fn test_redirects_home_from_store_or_cache() {
        let store = Arc::new(MemoryCredentialStore::with_entries([(KEY_ACCESS_TOKEN, "a-1")]));
        let guard = PublicGuard::new(SessionStore::new(store, Arc::new(RequestCache::new())));
        assert_eq!(guard.enter(), RouteDecision::RedirectToHome);

        let cache = Arc::new(RequestCache::new());
        cache.write(QueryKey::from(KEY_ACCESS_TOKEN), "cached-A".into());
        let guard = PublicGuard::new(SessionStore::new(Arc::new(MemoryCredentialStore::new()), cache));
        assert_eq!(guard.enter(), RouteDecision::RedirectToHome);
    }

    #[test]
    fn test_renders_public_without_token() {
        let guard = PublicGuard::new(SessionStore::new(
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(RequestCache::new()),
        ));
        assert_eq!(guard.enter(), RouteDecision::RenderPublic);
    }
}
