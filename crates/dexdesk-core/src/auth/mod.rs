//! Session and authentication lifecycle.
//!
//! This module provides:
//! - `CredentialStore`: durable storage for the access and refresh tokens
//!   (file, OS keychain, or in-memory)
//! - `SessionStore`: keeps the durable store and the in-memory `RequestCache`
//!   consistent as credentials rotate
//! - `TokenRefresher`: the refresh-token exchange
//! - `SessionGuard` / `PublicGuard`: route-entry decisions
//!
//! Tokens carry no client-side expiry. A failed identity probe is what
//! reveals an expired access token.

pub mod credentials;
pub mod guard;
pub mod public;
pub mod refresher;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use credentials::{
    CredentialStore, FileCredentialStore, KeyringCredentialStore, MemoryCredentialStore,
};
pub use guard::{
    decide_protected, Evaluation, GuardEffect, GuardMachine, OpState, QueryStatus, RouteDecision,
    SessionGuard,
};
pub use public::{decide_public, PublicGuard, TokenLookup};
pub use refresher::{IdentityApi, TokenRefresher};
pub use session::SessionStore;

/// Storage key for the access token, shared by both stores
pub const KEY_ACCESS_TOKEN: &str = "access_token";

/// Storage key for the refresh token, shared by both stores
pub const KEY_REFRESH_TOKEN: &str = "refresh_token";

/// Cache key for the identity probe result
pub const KEY_MY_ACCOUNT: &str = "my-account";
