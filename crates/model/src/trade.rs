use {
    chrono::{DateTime, Utc},
    number::serialization::HexOrDecimalU256,
    primitive_types::{H160, H256, U256},
    serde::{Deserialize, Serialize},
    serde_with::serde_as,
};

/// How a pair of orders nets out economically.
#[derive(Eq, PartialEq, Clone, Copy, Debug, Deserialize, Serialize, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    /// Opposite sides of the same token; tokens change hands for collateral.
    Complementary,
    /// Two buys whose prices sum to at least `ONE`; a full outcome set is
    /// minted from their combined collateral.
    Mint,
    /// Two sells whose prices sum to at most `ONE`; a full outcome set is
    /// merged back into collateral.
    Merge,
}

/// A fill produced by the matching engine. Prices are always the resting
/// order's price, normalized to the fixed-point scale.
#[serde_as]
#[derive(Eq, PartialEq, Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub id: u64,
    pub taker_order: H256,
    pub maker_order: H256,
    pub maker: H160,
    pub taker: H160,
    pub market_id: H256,
    #[serde_as(as = "HexOrDecimalU256")]
    pub token_id: U256,
    /// Outcome token quantity that changed hands.
    #[serde_as(as = "HexOrDecimalU256")]
    pub amount: U256,
    #[serde_as(as = "HexOrDecimalU256")]
    pub price: U256,
    pub match_type: MatchType,
    #[serde_as(as = "HexOrDecimalU256")]
    pub fee: U256,
    #[serde_as(as = "HexOrDecimalU256")]
    pub fee_rate_bps: U256,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_serde_round_trip() {
        let trade = Trade {
            id: 7,
            taker_order: H256::from_low_u64_be(1),
            maker_order: H256::from_low_u64_be(2),
            maker: H160::from_low_u64_be(3),
            taker: H160::from_low_u64_be(4),
            market_id: H256::from_low_u64_be(5),
            token_id: 1.into(),
            amount: U256::exp10(18),
            price: U256::exp10(17) * 5,
            match_type: MatchType::Complementary,
            fee: 0.into(),
            fee_rate_bps: 0.into(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&trade).unwrap();
        assert_eq!(serde_json::from_str::<Trade>(&json).unwrap(), trade);
        assert!(json.contains("\"matchType\":\"complementary\""));
    }
}
