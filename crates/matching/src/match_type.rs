use {
    crate::order_price,
    model::{
        order::{Order, Side},
        trade::MatchType,
    },
};

/// Economic classification of an order pair, symmetric in argument order.
///
/// Opposite sides trade tokens for collateral. Two buys can only clear when
/// their combined prices fund a full outcome set; two sells when a full set
/// can be dissolved without owing collateral. Pairs outside those bounds do
/// not match at all.
pub fn match_type(a: &Order, b: &Order) -> Option<MatchType> {
    match (a.side, b.side) {
        (Side::Buy, Side::Sell) | (Side::Sell, Side::Buy) => Some(MatchType::Complementary),
        (Side::Buy, Side::Buy) => can_mint(a, b).then_some(MatchType::Mint),
        (Side::Sell, Side::Sell) => can_merge(a, b).then_some(MatchType::Merge),
    }
}

/// Two buys whose prices sum to at least `ONE` mint a full set.
pub fn can_mint(a: &Order, b: &Order) -> bool {
    if a.side != Side::Buy || b.side != Side::Buy {
        return false;
    }
    match (order_price(a), order_price(b)) {
        (Some(price_a), Some(price_b)) => price_a.saturating_add(price_b) >= number::one(),
        _ => false,
    }
}

/// Two sells whose prices sum to at most `ONE` merge a full set.
pub fn can_merge(a: &Order, b: &Order) -> bool {
    if a.side != Side::Sell || b.side != Side::Sell {
        return false;
    }
    match (order_price(a), order_price(b)) {
        (Some(price_a), Some(price_b)) => price_a.saturating_add(price_b) <= number::one(),
        _ => false,
    }
}
