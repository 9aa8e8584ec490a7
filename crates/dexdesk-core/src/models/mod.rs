//! Data models for the dexdesk backend.
//!
//! This module contains the wire types exchanged with the REST API:
//!
//! - `Credentials` and the auth request bodies
//! - `Account`: the signed-in user's profile (`/users/me`)
//! - `Token`, `LiquidityPool`, `Trade`: the managed resources
//! - `Page<T>`: the `{result, total}` envelope used by every list endpoint

pub mod account;
pub mod auth;
pub mod liquidity_pool;
pub mod token;
pub mod trade;

use std::fmt;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

pub use account::{Account, UpdateAccountRequest};
pub use auth::{
    ChangePasswordRequest, Credentials, EmailRequest, LoginRequest, RefreshRequest,
    RegisterRequest, ResetPasswordRequest,
};
pub use liquidity_pool::{LiquidityPool, LiquidityPoolDropdown, LiquidityPoolInput};
pub use token::{Token, TokenDropdown, TokenInput};
pub use trade::{Trade, TradeDropdown, TradeInput};

/// Paged list envelope returned by `GET /{resource}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub result: Vec<T>,
    pub total: u64,
}

impl<T> Page<T> {
    /// Number of pages needed to show `total` items at `limit` per page
    pub fn page_count(&self, limit: u32) -> u64 {
        if limit == 0 {
            return 0;
        }
        self.total.div_ceil(u64::from(limit))
    }
}

/// The CRUD resources exposed by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Tokens,
    LiquidityPools,
    Trades,
}

impl Resource {
    pub const ALL: [Resource; 3] = [Resource::Tokens, Resource::LiquidityPools, Resource::Trades];

    /// Path segment, also used as the cache key prefix
    pub fn path(&self) -> &'static str {
        match self {
            Resource::Tokens => "tokens",
            Resource::LiquidityPools => "liquidityPools",
            Resource::Trades => "trades",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Resource::Tokens => "Token",
            Resource::LiquidityPools => "Liquidity pool",
            Resource::Trades => "Trade",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// Ties a model type to its resource endpoints and companion types.
pub trait ResourceModel: Serialize + DeserializeOwned + Send + Sync + 'static {
    const RESOURCE: Resource;

    /// Body for create and update calls
    type Input: Serialize + Send + Sync;

    /// Compact shape returned by `GET /{resource}/dropdown`
    type Dropdown: Serialize + DeserializeOwned + Send + 'static;
}

impl ResourceModel for Token {
    const RESOURCE: Resource = Resource::Tokens;
    type Input = TokenInput;
    type Dropdown = TokenDropdown;
}

impl ResourceModel for LiquidityPool {
    const RESOURCE: Resource = Resource::LiquidityPools;
    type Input = LiquidityPoolInput;
    type Dropdown = LiquidityPoolDropdown;
}

impl ResourceModel for Trade {
    const RESOURCE: Resource = Resource::Trades;
    type Input = TradeInput;
    type Dropdown = TradeDropdown;
}
