use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::api::{ApiClient, ApiError};
use crate::models::{Account, Credentials};

use super::SessionStore;

/// The two backend calls the session guard depends on.
#[async_trait]
pub trait IdentityApi: Send + Sync {
    /// `GET /users/me` with the given bearer token
    async fn probe(&self, access_token: &str) -> Result<Account, ApiError>;

    /// `POST /auth/refresh-token`
    async fn exchange(&self, refresh_token: &str) -> Result<Credentials, ApiError>;
}

#[async_trait]
impl IdentityApi for ApiClient {
    async fn probe(&self, access_token: &str) -> Result<Account, ApiError> {
        self.me(access_token).await
    }

    async fn exchange(&self, refresh_token: &str) -> Result<Credentials, ApiError> {
        self.refresh_token(refresh_token).await
    }
}

/// Performs the refresh-token exchange. Fetch only: persisting the result is
/// the caller's job.
#[derive(Clone)]
pub struct TokenRefresher {
    api: Arc<dyn IdentityApi>,
    session: SessionStore,
}

impl TokenRefresher {
    pub fn new(api: Arc<dyn IdentityApi>, session: SessionStore) -> Self {
        Self { api, session }
    }

    /// Exchange the stored refresh token for a new pair.
    ///
    /// Returns `Ok(None)` without touching the network when no refresh token
    /// is stored.
    pub async fn refresh(&self) -> Result<Option<Credentials>, ApiError> {
        let Some(refresh_token) = self.session.refresh_token() else {
            debug!("No refresh token stored, skipping exchange");
            return Ok(None);
        };
        self.api.exchange(&refresh_token).await.map(Some)
    }
}
