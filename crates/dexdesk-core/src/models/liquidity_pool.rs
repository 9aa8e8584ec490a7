use serde::{Deserialize, Serialize};

use super::TokenDropdown;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquidityPool {
    pub id: i64,
    pub token1: TokenDropdown,
    pub token2: TokenDropdown,
    pub reserve1: f64,
    pub reserve2: f64,
    #[serde(default)]
    pub fee_rate: Option<f64>,
}

impl LiquidityPool {
    /// Pair label such as `ETH/USDC`
    pub fn pair(&self) -> String {
        format!("{}/{}", self.token1.ticker_symbol, self.token2.ticker_symbol)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidityPoolDropdown {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquidityPoolInput {
    pub token1_id: i64,
    pub token2_id: i64,
    pub reserve1: f64,
    pub reserve2: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_rate: Option<f64>,
}
