//! In-memory request caching.
//!
//! This module provides the `RequestCache`, a process-wide key-addressed
//! store for fetched values. It mirrors the credential keys written by the
//! session layer and caches domain query results (list pages, details,
//! dropdowns) so repeated views do not hit the network. Query data is
//! considered stale after 60 minutes or once explicitly invalidated.

pub mod queries;
pub mod request_cache;

pub use queries::{ResourceQueries, DEFAULT_PAGE_SIZE};
pub use request_cache::{CachedData, QueryKey, RequestCache};
