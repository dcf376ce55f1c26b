//! Safety margins applied to the gas estimate and gas price before a mint
//! transaction is sent.

use std::str::FromStr;

use rust_decimal::{
    prelude::{FromPrimitive, ToPrimitive},
    Decimal,
};

use crate::error::{PaperCatsError, Result};

pub const DEFAULT_GAS_MULTIPLIER: f64 = 1.2;
pub const DEFAULT_GAS_PRICE_MULTIPLIER: f64 = 1.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasPolicy {
    gas_multiplier: Decimal,
    gas_price_multiplier: Decimal,
}

impl GasPolicy {
    pub fn new(gas_multiplier: f64, gas_price_multiplier: f64) -> Result<Self> {
        Ok(Self {
            gas_multiplier: to_multiplier(gas_multiplier)?,
            gas_price_multiplier: to_multiplier(gas_price_multiplier)?,
        })
    }

    /// `ceil(estimate * gas_multiplier)`
    pub fn gas_limit(&self, estimate: u64) -> Result<u64> {
        (Decimal::from(estimate) * self.gas_multiplier)
            .ceil()
            .to_u64()
            .ok_or_else(|| PaperCatsError::InvalidAmount(format!("gas limit for {estimate} overflows")))
    }

    /// `ceil(gas_price * gas_price_multiplier)`
    pub fn gas_price(&self, current: u128) -> Result<u128> {
        Decimal::from_u128(current)
            .and_then(|price| price.checked_mul(self.gas_price_multiplier))
            .map(|price| price.ceil())
            .and_then(|price| price.to_u128())
            .ok_or_else(|| PaperCatsError::InvalidAmount(format!("gas price {current} out of range")))
    }
}

impl Default for GasPolicy {
    fn default() -> Self {
        Self {
            gas_multiplier: Decimal::new(12, 1),
            gas_price_multiplier: Decimal::new(12, 1),
        }
    }
}

/// Goes through the shortest decimal rendering of the float so `1.2` is
/// exactly 1.2 rather than its binary approximation.
fn to_multiplier(value: f64) -> Result<Decimal> {
    if !value.is_finite() || value <= 0.0 {
        return Err(PaperCatsError::InvalidAmount(format!(
            "gas multiplier must be positive, got {value}"
        )));
    }
    Decimal::from_str(&value.to_string())
        .map_err(|e| PaperCatsError::InvalidAmount(format!("gas multiplier {value}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_margins() {
        let policy = GasPolicy::new(DEFAULT_GAS_MULTIPLIER, DEFAULT_GAS_PRICE_MULTIPLIER).unwrap();
        assert_eq!(policy, GasPolicy::default());
        assert_eq!(policy.gas_limit(21_000).unwrap(), 25_200);
        assert_eq!(policy.gas_limit(21_001).unwrap(), 25_202);
        assert_eq!(policy.gas_price(1_000_000_000).unwrap(), 1_200_000_000);
        assert_eq!(policy.gas_price(3).unwrap(), 4);
    }

    #[test]
    fn test_custom_multiplier() {
        let policy = GasPolicy::new(1.13, 1.0).unwrap();
        assert_eq!(policy.gas_limit(100_000).unwrap(), 113_000);
        assert_eq!(policy.gas_price(7).unwrap(), 7);
    }

    #[test]
    fn test_rejects_nonsense() {
        assert!(GasPolicy::new(0.0, 1.2).is_err());
        assert!(GasPolicy::new(1.2, f64::NAN).is_err());
        assert!(GasPolicy::new(-1.0, 1.2).is_err());
    }
}
