use {
    number::BPS_DIVISOR,
    primitive_types::{U256, U512},
};

/// Fee for a fill of `amount` tokens at `price`:
/// `bps * min(price, ONE - price) * amount / (BPS_DIVISOR * ONE)`.
///
/// Symmetric around a price of one half where it is maximal, linear in
/// amount and rate up to the final floor division. The triple product is
/// carried in 512 bits and divided once so no precision is lost on the way.
pub fn fee_amount(price: U256, amount: U256, fee_rate_bps: U256) -> U256 {
    let one = number::one();
    let base = price.min(one.saturating_sub(price));
    let numerator = fee_rate_bps.full_mul(base) * U512::from(amount);
    let denominator = U512::from(BPS_DIVISOR) * U512::from(one);
    // The quotient is at most `amount` so the conversion cannot fail.
    U256::try_from(numerator / denominator).unwrap_or_default()
}
