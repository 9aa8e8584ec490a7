//! REST API client module for the dexdesk backend.
//!
//! This module provides the `ApiClient` transport and typed endpoints, and
//! `AuthenticatedClient`, which attaches the current access token to calls.
//!
//! The API uses bearer token authentication; tokens come from
//! `POST /auth/login` and are rotated through `POST /auth/refresh-token`.

pub mod authenticated;
pub mod client;
pub mod error;

pub use authenticated::AuthenticatedClient;
pub use client::{ApiClient, ApiRequest};
pub use error::{ApiError, EMAIL_NOT_VERIFIED};
