use serde::{Deserialize, Serialize};

use super::LiquidityPoolDropdown;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub ticker_symbol: Option<String>,
    pub decimal_place: u32,
    pub total_supply: f64,
    pub circulating_supply: f64,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub liquidity_pool: Option<LiquidityPoolDropdown>,
}

impl Token {
    /// Ticker if set, otherwise the token name
    pub fn symbol(&self) -> &str {
        self.ticker_symbol.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenDropdown {
    pub id: i64,
    pub ticker_symbol: String,
}

/// Body for creating or updating a token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInput {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticker_symbol: Option<String>,
    pub decimal_place: u32,
    pub total_supply: f64,
    pub circulating_supply: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    pub liquidity_pool_id: i64,
}
