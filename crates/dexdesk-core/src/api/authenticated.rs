use std::future::Future;

use tracing::debug;

use crate::auth::SessionStore;

use super::{ApiClient, ApiError};

/// Runs backend calls with whatever access token is current at call time.
///
/// The token is resolved per call (cache, then durable store, then empty), so
/// a call made after a renewal sees the new token without any re-wiring.
/// Errors pass through untouched; an empty token simply earns a 401.
#[derive(Clone)]
pub struct AuthenticatedClient {
    api: ApiClient,
    session: SessionStore,
}

impl AuthenticatedClient {
    pub fn new(api: ApiClient, session: SessionStore) -> Self {
        Self { api, session }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    /// Bearer token a call made right now would use
    pub fn token(&self) -> String {
        self.session.bearer_token()
    }

    /// Run `op` with a client handle and the current bearer token.
    ///
    /// ```ignore
    /// let me = authed.call(|api, token| async move { api.me(&token).await }).await?;
    /// ```
    pub async fn call<T, F, Fut>(&self, op: F) -> Result<T, ApiError>
    where
        F: FnOnce(ApiClient, String) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let token = self.token();
        if token.is_empty() {
            debug!("No access token available, calling unauthenticated");
        }
        op(self.api.clone(), token).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::auth::{MemoryCredentialStore, KEY_ACCESS_TOKEN};
    use crate::cache::RequestCache;
    use crate::models::Credentials;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn authed(server: &MockServer, pairs: &[(&str, &str)]) -> AuthenticatedClient {
        let store = Arc::new(MemoryCredentialStore::with_entries(pairs.iter().copied()));
        let session = SessionStore::new(store, Arc::new(RequestCache::new()));
        let api = ApiClient::new(server.uri()).expect("client should build");
        AuthenticatedClient::new(api, session)
    }

    #[tokio::test]
    async fn test_uses_token_from_durable_store() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/me"))
            .and(header("authorization", "Bearer stored-A"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "email": "ada@example.com"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = authed(&server, &[(KEY_ACCESS_TOKEN, "stored-A")]);
        let account = client
            .call(|api, token| async move { api.me(&token).await })
            .await
            .expect("probe should succeed");
        assert_eq!(account.email, "ada@example.com");
    }

    #[tokio::test]
    async fn test_picks_up_committed_token_on_next_call() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/me"))
            .and(header("authorization", "Bearer new-A"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "email": "ada@example.com"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = authed(&server, &[(KEY_ACCESS_TOKEN, "old-A")]);
        client.session().commit(&Credentials::new("new-A", "new-R"));
        assert_eq!(client.token(), "new-A");
        client
            .call(|api, token| async move { api.me(&token).await })
            .await
            .expect("new token should be sent");
    }

    #[tokio::test]
    async fn test_missing_token_yields_unauthenticated_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/me"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = authed(&server, &[]);
        assert_eq!(client.token(), "");
        let err = client
            .call(|api, token| async move { api.me(&token).await })
            .await
            .expect_err("should be rejected");
        assert!(err.is_unauthenticated());
    }
}
