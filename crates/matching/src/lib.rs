//! Price-time priority matching for binary outcome markets.
//!
//! Every `(market, token)` pair has its own book. Makers pre-lock the
//! resource they deliver (collateral for buys, outcome tokens for sells) and
//! fills move value exclusively between locked columns, so a resting order is
//! always fully funded.

pub mod book;
pub mod engine;
pub mod fees;
pub mod match_type;

pub use crate::{
    book::{BookEntry, OrderBook, PriceLevel},
    engine::{MatchResult, MatchingEngine},
    match_type::{can_merge, can_mint, match_type},
};

use {
    model::order::{Order, Side},
    number::u256_ext::U256Ext,
    primitive_types::U256,
};

#[derive(Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("order has zero amounts or a degenerate price")]
    InvalidOrder,
    #[error("maker cannot fund the order")]
    InsufficientBalance,
    #[error("no such resting order")]
    OrderNotFound,
    #[error("only the maker may cancel an order")]
    NotOwner,
    /// A fill failed to settle in the ledger even though the book believed
    /// both sides were funded. This is unreachable while invariants hold.
    #[error("ledger rejected a fill: {0}")]
    Ledger(#[from] ledger::Error),
}

/// Normalized price of an order in `[0, ONE]` fixed-point.
///
/// A buy offers `maker_amount` collateral for `taker_amount` tokens, a sell
/// offers `maker_amount` tokens for `taker_amount` collateral; both normalize
/// to collateral-per-token.
pub fn order_price(order: &Order) -> Option<U256> {
    let (collateral, tokens) = match order.side {
        Side::Buy => (order.maker_amount, order.taker_amount),
        Side::Sell => (order.taker_amount, order.maker_amount),
    };
    let price = collateral.full_mul_div(&number::one(), &tokens)?;
    (!price.is_zero()).then_some(price)
}

#[cfg(test)]
pub(crate) mod testutil {
    use {
        super::*,
        model::{
            order::OrderBuilder,
            signature::SigningScheme,
            DomainSeparator,
        },
        primitive_types::{H160, H256},
        secp256k1::SecretKey,
    };

    pub fn domain() -> DomainSeparator {
        DomainSeparator::new(137, H160::from_low_u64_be(0xccc))
    }

    pub fn key(seed: u8) -> SecretKey {
        SecretKey::from_slice(&[seed; 32]).unwrap()
    }

    pub fn address(seed: u8) -> H160 {
        let secp = secp256k1::Secp256k1::signing_only();
        model::signature::public_key_address(&secp256k1::PublicKey::from_secret_key(
            &secp,
            &key(seed),
        ))
    }

    pub fn market() -> H256 {
        H256::from_low_u64_be(1)
    }

    /// An order priced at `price_e18` collateral per token for `tokens`
    /// outcome tokens, signed by `seed`'s key.
    pub fn signed_order(seed: u8, side: Side, price_e18: U256, tokens: U256, salt: u64) -> Order {
        let collateral = price_e18
            .full_mul_div(&tokens, &number::one())
            .expect("test amounts fit");
        let (maker_amount, taker_amount) = match side {
            Side::Buy => (collateral, tokens),
            Side::Sell => (tokens, collateral),
        };
        OrderBuilder::default()
            .with_salt(salt.into())
            .with_market_id(market())
            .with_token_id(1.into())
            .with_side(side)
            .with_maker_amount(maker_amount)
            .with_taker_amount(taker_amount)
            .sign_with(SigningScheme::Eip712, &domain(), &key(seed))
            .build()
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::testutil::signed_order};

    #[test]
    fn price_extraction_normalizes_both_sides() {
        let half = number::one() / 2;
        let tokens = U256::exp10(20);
        let buy = signed_order(1, Side::Buy, half, tokens, 0);
        let sell = signed_order(2, Side::Sell, half, tokens, 0);
        assert_eq!(order_price(&buy), Some(half));
        assert_eq!(order_price(&sell), Some(half));
    }

    #[test]
    fn degenerate_prices_are_rejected() {
        let mut order = signed_order(1, Side::Buy, number::one() / 2, U256::exp10(20), 0);
        order.taker_amount = U256::zero();
        assert_eq!(order_price(&order), None);
        order.taker_amount = U256::MAX;
        // So much wanted for so little collateral that the price truncates
        // to zero.
        assert_eq!(order_price(&order), None);
    }
}
