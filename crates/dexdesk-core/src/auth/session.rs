use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::cache::{QueryKey, RequestCache};
use crate::models::Credentials;

use super::credentials::CredentialStore;
use super::{KEY_ACCESS_TOKEN, KEY_REFRESH_TOKEN};

/// Keeps the durable credential store and the in-memory request cache in step.
///
/// All credential writes go through here. Each write touches the cache and the
/// durable store for a key back to back with no suspension point in between,
/// then bumps the credential generation. Readers look in the cache first and
/// fall back to the durable store.
///
/// Clones share the same stores and write lock.
#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn CredentialStore>,
    cache: Arc<RequestCache>,
    write_lock: Arc<Mutex<()>>,
}

impl SessionStore {
    pub fn new(store: Arc<dyn CredentialStore>, cache: Arc<RequestCache>) -> Self {
        Self {
            store,
            cache,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn cache(&self) -> &Arc<RequestCache> {
        &self.cache
    }

    fn lookup(&self, key: &str) -> Option<String> {
        self.cache
            .read_as::<String>(&QueryKey::from(key))
            .or_else(|| self.store.get(key))
            .filter(|v| !v.is_empty())
    }

    /// Current access token, cache first then durable store
    pub fn access_token(&self) -> Option<String> {
        self.lookup(KEY_ACCESS_TOKEN)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.lookup(KEY_REFRESH_TOKEN)
    }

    /// Access token to send as bearer; empty when signed out
    pub fn bearer_token(&self) -> String {
        self.access_token().unwrap_or_default()
    }

    pub fn has_access_token(&self) -> bool {
        self.access_token().is_some()
    }

    pub fn generation(&self) -> u64 {
        self.cache.credential_generation()
    }

    fn write_key(&self, key: &str, value: &str) {
        self.cache.write(QueryKey::from(key), value.into());
        if let Err(e) = self.store.set(key, value) {
            warn!(key, error = %e, "Failed to persist credential");
        }
    }

    fn remove_key(&self, key: &str) {
        self.cache.remove(&QueryKey::from(key));
        if let Err(e) = self.store.remove(key) {
            warn!(key, error = %e, "Failed to remove persisted credential");
        }
    }

    fn write_locked(&self, credentials: &Credentials) -> u64 {
        self.write_key(KEY_ACCESS_TOKEN, &credentials.access_token);
        self.write_key(KEY_REFRESH_TOKEN, &credentials.refresh_token);
        // Everything else was fetched with the old token, including the probe result
        self.cache.invalidate_except(&[
            QueryKey::from(KEY_ACCESS_TOKEN),
            QueryKey::from(KEY_REFRESH_TOKEN),
        ]);
        self.cache.bump_credential_generation()
    }

    fn clear_locked(&self) -> u64 {
        self.remove_key(KEY_ACCESS_TOKEN);
        self.remove_key(KEY_REFRESH_TOKEN);
        // No cached query may outlive the session it was fetched for
        self.cache.remove_all();
        self.cache.bump_credential_generation()
    }

    /// Write a new credential pair into both stores and mark every cached
    /// query stale. Returns the new generation.
    pub fn commit(&self, credentials: &Credentials) -> u64 {
        let _guard = self.write_lock.lock();
        let generation = self.write_locked(credentials);
        info!(generation, "Credentials updated");
        generation
    }

    /// Commit only if no other credential write happened since `expected`.
    ///
    /// Returns the new generation, or `None` when the pair was discarded as stale.
    pub fn commit_if_current(&self, expected: u64, credentials: &Credentials) -> Option<u64> {
        let _guard = self.write_lock.lock();
        let current = self.cache.credential_generation();
        if current != expected {
            debug!(expected, current, "Discarding stale credentials");
            return None;
        }
        let generation = self.write_locked(credentials);
        info!(generation, "Credentials renewed");
        Some(generation)
    }

    /// Remove both keys from both stores and drop every cached query.
    /// Returns the new generation.
    pub fn clear(&self) -> u64 {
        let _guard = self.write_lock.lock();
        let generation = self.clear_locked();
        info!(generation, "Credentials cleared");
        generation
    }

    /// Clear only if no other credential write happened since `expected`.
    pub fn clear_if_current(&self, expected: u64) -> Option<u64> {
        let _guard = self.write_lock.lock();
        let current = self.cache.credential_generation();
        if current != expected {
            debug!(expected, current, "Skipping clear, credentials changed meanwhile");
            return None;
        }
        let generation = self.clear_locked();
        info!(generation, "Credentials cleared");
        Some(generation)
    }
}
