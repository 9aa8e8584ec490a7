//! dexdesk-core - session, API and caching layer for the dexdesk console.
//!
//! The console manages tokens, liquidity pools and trades over a REST API.
//! This crate holds everything below the screens:
//!
//! - `auth`: credential storage, token renewal and route guards
//! - `api`: the HTTP client and the authenticated request wrapper
//! - `cache`: the in-memory request cache and cached resource queries
//! - `models`: wire types
//! - `config`: persisted settings
//! - `routes`: console routes and their access level

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod models;
pub mod routes;

pub use api::{ApiClient, ApiError, AuthenticatedClient};
pub use auth::{PublicGuard, RouteDecision, SessionGuard, SessionStore};
pub use cache::{RequestCache, ResourceQueries};
pub use config::Config;
