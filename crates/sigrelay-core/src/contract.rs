//! Per-symbol contract rules.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::decimal::{Price, Size};

/// Exchange rules governing order size and price precision for one symbol.
///
/// Fetched fresh for every operation and never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractSpec {
    /// Smallest order size the exchange accepts.
    pub min_trade_size: Size,
    /// Sizes must be a multiple of this.
    pub size_increment: Size,
    /// Decimal places allowed in the size field.
    pub volume_decimals: u32,
    /// Decimal places allowed in price fields.
    pub price_decimals: u32,
}

impl ContractSpec {
    /// Fallback used when the contract lookup fails.
    pub fn fallback() -> Self {
        Self {
            min_trade_size: Size::new(Decimal::new(1, 3)),
            size_increment: Size::new(Decimal::new(1, 3)),
            volume_decimals: 3,
            price_decimals: 2,
        }
    }

    /// Round a price to this contract's precision.
    pub fn round_price(&self, price: Price) -> Price {
        price.round_to_decimals(self.price_decimals)
    }
}

impl Default for ContractSpec {
    fn default() -> Self {
        Self::fallback()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_fallback_values() {
        let spec = ContractSpec::fallback();
        assert_eq!(spec.min_trade_size.inner(), dec!(0.001));
        assert_eq!(spec.size_increment.inner(), dec!(0.001));
        assert_eq!(spec.price_decimals, 2);
    }

    #[test]
    fn test_round_price() {
        let spec = ContractSpec {
            price_decimals: 1,
            ..ContractSpec::fallback()
        };
        assert_eq!(spec.round_price(Price::new(dec!(100.26))).inner(), dec!(100.3));
    }
}
