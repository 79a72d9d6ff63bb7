//! Order size and protective price computation.

use rust_decimal::Decimal;
use sigrelay_core::{ContractSpec, Price, Side, Size};

use crate::error::{ExecutorError, ExecutorResult};

/// Contract size for a notional amount at `price`.
///
/// Rounds up to the size increment so the position is never smaller than
/// requested, then enforces the contract minimum.
pub fn compute_size(
    symbol: &str,
    notional: Decimal,
    price: Price,
    spec: &ContractSpec,
) -> ExecutorResult<Size> {
    if !price.is_positive() || notional <= Decimal::ZERO {
        return Err(ExecutorError::SizeTooSmall {
            symbol: symbol.to_string(),
            size: Size::ZERO,
            min: spec.min_trade_size,
        });
    }

    let raw = Size::new(notional / price.inner());
    let size = raw.ceil_to_increment(spec.size_increment);
    if size < spec.min_trade_size || !size.is_positive() {
        return Err(ExecutorError::SizeTooSmall {
            symbol: symbol.to_string(),
            size,
            min: spec.min_trade_size,
        });
    }
    Ok(size)
}

/// Stop-loss price `pct` percent against the position.
pub fn stop_loss_price(base: Price, pct: Decimal, side: Side, spec: &ContractSpec) -> Price {
    let signed = match side {
        Side::Buy => -pct,
        Side::Sell => pct,
    };
    spec.round_price(base.offset_pct(signed))
}

/// Take-profit price `pct` percent in favour of the position.
pub fn take_profit_price(base: Price, pct: Decimal, side: Side, spec: &ContractSpec) -> Price {
    let signed = match side {
        Side::Buy => pct,
        Side::Sell => -pct,
    };
    spec.round_price(base.offset_pct(signed))
}

/// Split a position for partial take-profit.
///
/// Returns `(first, second)` summing to `size`, with the first half rounded
/// down to the increment. `None` when either half would be below the
/// contract minimum.
pub fn split_half(size: Size, spec: &ContractSpec) -> Option<(Size, Size)> {
    let first = (size * Decimal::new(5, 1)).floor_to_increment(spec.size_increment);
    let second = size - first;
    if first < spec.min_trade_size || second < spec.min_trade_size {
        return None;
    }
    Some((first, second))
}
