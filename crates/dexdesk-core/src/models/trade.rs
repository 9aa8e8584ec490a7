use serde::{Deserialize, Serialize};

use super::TokenDropdown;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub id: i64,
    pub timestamp: String,
    pub token1: TokenDropdown,
    pub token2: TokenDropdown,
    pub amount1: f64,
    pub amount2: f64,
    pub fee: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeDropdown {
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeInput {
    pub timestamp: String,
    pub token1_id: i64,
    pub token2_id: i64,
    pub amount1: f64,
    pub amount2: f64,
    pub fee: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trade() {
        let json = r#"{"id":9,"timestamp":"2024-05-01T10:00:00Z","token1":{"id":1,"tickerSymbol":"ETH"},"token2":{"id":2,"tickerSymbol":"USDC"},"amount1":1.5,"amount2":4500,"fee":0.3}"#;
        let trade: Trade = serde_json::from_str(json).expect("trade should parse");
        assert_eq!(trade.token2.ticker_symbol, "USDC");
        assert_eq!(trade.amount2, 4500.0);
    }
}
