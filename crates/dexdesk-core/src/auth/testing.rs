//! Scriptable `IdentityApi` used by the auth tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::api::ApiError;
use crate::models::{Account, Credentials};

use super::IdentityApi;

type Hook = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
pub(crate) struct FakeIdentity {
    valid_access: Mutex<HashSet<String>>,
    renewals: Mutex<HashMap<String, Credentials>>,
    during_exchange: Option<Hook>,
    probe_calls: AtomicUsize,
    exchange_calls: AtomicUsize,
}

impl FakeIdentity {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Probe succeeds for this access token
    pub(crate) fn accepts(self, access_token: &str) -> Self {
        self.valid_access.lock().insert(access_token.to_string());
        self
    }

    /// Exchange succeeds for this refresh token
    pub(crate) fn renews(self, refresh_token: &str, issued: Credentials) -> Self {
        self.renewals.lock().insert(refresh_token.to_string(), issued);
        self
    }

    /// Run `hook` while an exchange is in flight
    pub(crate) fn during_exchange(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.during_exchange = Some(Box::new(hook));
        self
    }

    pub(crate) fn revoke(&self, access_token: &str) {
        self.valid_access.lock().remove(access_token);
    }

    pub(crate) fn probe_calls(&self) -> usize {
        self.probe_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn exchange_calls(&self) -> usize {
        self.exchange_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityApi for FakeIdentity {
    async fn probe(&self, access_token: &str) -> Result<Account, ApiError> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        if self.valid_access.lock().contains(access_token) {
            Ok(Account {
                id: Some(1),
                email: "ada@example.com".to_string(),
                first_name: Some("Ada".to_string()),
                last_name: None,
                is_email_verified: Some(true),
            })
        } else {
            Err(ApiError::Unauthorized)
        }
    }

    async fn exchange(&self, refresh_token: &str) -> Result<Credentials, ApiError> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(ref hook) = self.during_exchange {
            hook();
        }
        let issued = self.renewals.lock().get(refresh_token).cloned();
        issued.ok_or(ApiError::Unauthorized)
    }
}
