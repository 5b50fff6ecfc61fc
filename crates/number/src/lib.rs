pub mod conversions;
pub mod serialization;
pub mod u256_ext;

use primitive_types::U256;

/// Fixed-point scale factor shared by all amounts and prices: `10^18`.
pub fn one() -> U256 {
    U256::exp10(18)
}

/// Denominator for basis-point rates.
pub const BPS_DIVISOR: u64 = 10_000;
