use primitive_types::{U256, U512};

pub trait U256Ext: Sized {
    fn checked_ceil_div(&self, other: &Self) -> Option<Self>;

    /// `self * factor / divisor` computed in 512 bits so the intermediate
    /// product cannot overflow. `None` if the divisor is zero or the final
    /// quotient does not fit 256 bits.
    fn full_mul_div(&self, factor: &Self, divisor: &Self) -> Option<Self>;

    /// Like [`U256Ext::full_mul_div`] but rounding the quotient up.
    fn full_mul_div_ceil(&self, factor: &Self, divisor: &Self) -> Option<Self>;
}

impl U256Ext for U256 {
    fn checked_ceil_div(&self, other: &Self) -> Option<Self> {
        self.checked_add(other.checked_sub(1.into())?)?
            .checked_div(*other)
    }

    fn full_mul_div(&self, factor: &Self, divisor: &Self) -> Option<Self> {
        if divisor.is_zero() {
            return None;
        }
        let product = self.full_mul(*factor);
        let quotient = product.checked_div(U512::from(*divisor))?;
        quotient.try_into().ok()
    }

    fn full_mul_div_ceil(&self, factor: &Self, divisor: &Self) -> Option<Self> {
        if divisor.is_zero() {
            return None;
        }
        let divisor = U512::from(*divisor);
        let product = self.full_mul(*factor);
        let quotient = product
            .checked_add(divisor - U512::one())?
            .checked_div(divisor)?;
        quotient.try_into().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceil_div_rounds_up() {
        assert_eq!(
            U256::from(10).checked_ceil_div(&3.into()),
            Some(U256::from(4))
        );
        assert_eq!(
            U256::from(9).checked_ceil_div(&3.into()),
            Some(U256::from(3))
        );
        assert_eq!(U256::from(10).checked_ceil_div(&0.into()), None);
    }

    #[test]
    fn full_mul_div_survives_intermediate_overflow() {
        let max = U256::MAX;
        assert_eq!(max.full_mul_div(&max, &max), Some(max));
        assert_eq!(
            U256::from(10).full_mul_div(&6.into(), &4.into()),
            Some(U256::from(15))
        );
        assert_eq!(max.full_mul_div(&2.into(), &1.into()), None);
        assert_eq!(max.full_mul_div(&1.into(), &0.into()), None);
    }

    #[test]
    fn full_mul_div_ceil_rounds_up() {
        assert_eq!(
            U256::from(10).full_mul_div_ceil(&1.into(), &3.into()),
            Some(U256::from(4))
        );
        assert_eq!(
            U256::from(9).full_mul_div_ceil(&1.into(), &3.into()),
            Some(U256::from(3))
        );
        assert_eq!(U256::from(9).full_mul_div_ceil(&1.into(), &0.into()), None);
    }
}
