//! Position valuation from raw pool accounting.
//!
//! Everything here is pure: the inputs are snapshots read at one block and the
//! outputs are human-unit `f64`s. Prices follow `price = 1.0001^tick` (token1
//! per token0, before decimal adjustment) and amounts use the usual
//! concentrated-liquidity range math.
//!
//! # Uncollected fees
//!
//! Fees are estimated as
//! `(feeGrowthGlobal - feeGrowthOutsideLower - feeGrowthOutsideUpper - feeGrowthInsideLast) / 2^128 * liquidity`,
//! computed over unbounded integers. Outside-growth accounting at range
//! boundaries makes this negative for positions that are not in range; such
//! results are clamped to zero. This is an approximation, not the pool's own
//! `feeGrowthInside` derivation.

use alloy::primitives::U256;
use serde::Serialize;

use crate::chain::{scale_down, u256_to_f64};

/// `2^128` as a float.
pub const Q128: f64 = 340_282_366_920_938_463_463_374_607_431_768_211_456.0;

/// Price ratio between two adjacent ticks.
pub const TICK_BASE: f64 = 1.0001;

/// Pool-wide accounting at a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolGlobals {
    /// Fees of token0 per unit of liquidity, Q128.128.
    pub fee_growth_global0_x128: U256,
    /// Fees of token1 per unit of liquidity, Q128.128.
    pub fee_growth_global1_x128: U256,
    /// Current tick.
    pub tick: i32,
}

impl PoolGlobals {
    /// Square root of the current raw price, derived from the tick.
    #[must_use]
    pub fn sqrt_price(&self) -> f64 {
        tick_to_price(self.tick).sqrt()
    }
}

/// Per-tick accounting of a range boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickState {
    /// Total liquidity referencing the tick.
    pub liquidity_gross: u128,
    /// Liquidity added (removed) when the tick is crossed left to right.
    pub liquidity_net: i128,
    /// Token0 fee growth on the other side of the tick, Q128.128.
    pub fee_growth_outside0_x128: U256,
    /// Token1 fee growth on the other side of the tick, Q128.128.
    pub fee_growth_outside1_x128: U256,
}

/// A position record as stored by the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PositionRawState {
    /// Liquidity of the position.
    pub liquidity: u128,
    /// Token0 fee growth inside the range at the last update, Q128.128.
    pub fee_growth_inside0_last_x128: U256,
    /// Token1 fee growth inside the range at the last update, Q128.128.
    pub fee_growth_inside1_last_x128: U256,
    /// Settled token0 fees, raw units.
    pub tokens_owed0: u128,
    /// Settled token1 fees, raw units.
    pub tokens_owed1: u128,
}

/// Prices at the current tick and at both range bounds, not decimal adjusted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawPrices {
    /// Price at the pool's current tick.
    pub current: f64,
    /// Price at the lower bound of the range.
    pub lower: f64,
    /// Price at the upper bound of the range.
    pub upper: f64,
}

impl RawPrices {
    /// Prices for a pool at `tick` and a range `[tick_lower, tick_upper]`.
    #[must_use]
    pub fn new(tick: i32, tick_lower: i32, tick_upper: i32) -> Self {
        Self {
            current: tick_to_price(tick),
            lower: tick_to_price(tick_lower),
            upper: tick_to_price(tick_upper),
        }
    }
}

/// Value locked, prices and fees of a position, in token units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ValuationResult {
    /// Token0 locked in the position.
    pub qtty_token0: f64,
    /// Token1 locked in the position.
    pub qtty_token1: f64,
    /// Token1 per token0.
    pub price_token0: f64,
    /// Token0 per token1.
    pub price_token1: f64,
    /// Token0 fees accrued since the last update of the position.
    pub fees_uncollected_token0: f64,
    /// Token1 fees accrued since the last update of the position.
    pub fees_uncollected_token1: f64,
    /// Token0 credited to the position and not yet collected.
    pub fees_owed_token0: f64,
    /// Token1 credited to the position and not yet collected.
    pub fees_owed_token1: f64,
}

impl ValuationResult {
    /// Aggregates two ranges of the same pool.
    ///
    /// Amounts and fees add up; prices do not depend on the range and are
    /// averaged to smooth out rounding between the two computations.
    #[must_use]
    pub fn combine(&self, other: &Self) -> Self {
        Self {
            qtty_token0: self.qtty_token0 + other.qtty_token0,
            qtty_token1: self.qtty_token1 + other.qtty_token1,
            price_token0: (self.price_token0 + other.price_token0) / 2.0,
            price_token1: (self.price_token1 + other.price_token1) / 2.0,
            fees_uncollected_token0: self.fees_uncollected_token0 + other.fees_uncollected_token0,
            fees_uncollected_token1: self.fees_uncollected_token1 + other.fees_uncollected_token1,
            fees_owed_token0: self.fees_owed_token0 + other.fees_owed_token0,
            fees_owed_token1: self.fees_owed_token1 + other.fees_owed_token1,
        }
    }

    /// Adds tokens held directly by the position owner.
    #[must_use]
    pub fn with_idle(mut self, idle_token0: f64, idle_token1: f64) -> Self {
        self.qtty_token0 += idle_token0;
        self.qtty_token1 += idle_token1;
        self
    }
}

/// `1.0001^tick`.
#[must_use]
#[inline]
pub fn tick_to_price(tick: i32) -> f64 {
    TICK_BASE.powi(tick)
}

/// Raw token amounts backing `liquidity` over the range described by `prices`.
///
/// Below the range everything is token0, above it everything is token1.
#[must_use]
pub fn amounts_for_liquidity(liquidity: u128, prices: &RawPrices) -> (f64, f64) {
    let liquidity = liquidity as f64;
    let sqrt_current = prices.current.sqrt();
    let sqrt_lower = prices.lower.sqrt();
    let sqrt_upper = prices.upper.sqrt();

    if prices.current <= prices.lower {
        (liquidity * (1.0 / sqrt_lower - 1.0 / sqrt_upper), 0.0)
    } else if prices.current < prices.upper {
        (
            liquidity * (1.0 / sqrt_current - 1.0 / sqrt_upper),
            liquidity * (sqrt_current - sqrt_lower),
        )
    } else {
        (0.0, liquidity * (sqrt_upper - sqrt_lower))
    }
}

/// Raw uncollected fees of one token, clamped at zero.
#[must_use]
pub fn uncollected_fees(
    fee_growth_global_x128: U256,
    fee_growth_outside_lower_x128: U256,
    fee_growth_outside_upper_x128: U256,
    fee_growth_inside_last_x128: U256,
    liquidity: u128,
) -> f64 {
    // a sum above 2^256 is above the global growth too
    let growth = fee_growth_outside_lower_x128
        .checked_add(fee_growth_outside_upper_x128)
        .and_then(|outside| outside.checked_add(fee_growth_inside_last_x128))
        .and_then(|spent| fee_growth_global_x128.checked_sub(spent));

    match growth {
        Some(growth) => u256_to_f64(growth) / Q128 * liquidity as f64,
        None => {
            log::debug!("negative uncollected fees clamped to zero");
            0.0
        }
    }
}

/// Values one position range.
///
/// `decimals` are the (token0, token1) decimals. The range bounds are not
/// validated: a reversed range yields degenerate amounts.
#[must_use]
pub fn value_position(
    pool: &PoolGlobals,
    lower: &TickState,
    upper: &TickState,
    position: &PositionRawState,
    tick_lower: i32,
    tick_upper: i32,
    decimals: (u8, u8),
) -> ValuationResult {
    let (decimals0, decimals1) = decimals;
    let prices = RawPrices::new(pool.tick, tick_lower, tick_upper);

    // uniswap prices are token1/token0 in raw units
    let price_token0 = prices.current * 10f64.powi(i32::from(decimals0) - i32::from(decimals1));

    let (amount0, amount1) = amounts_for_liquidity(position.liquidity, &prices);

    let fees0 = uncollected_fees(
        pool.fee_growth_global0_x128,
        lower.fee_growth_outside0_x128,
        upper.fee_growth_outside0_x128,
        position.fee_growth_inside0_last_x128,
        position.liquidity,
    );
    let fees1 = uncollected_fees(
        pool.fee_growth_global1_x128,
        lower.fee_growth_outside1_x128,
        upper.fee_growth_outside1_x128,
        position.fee_growth_inside1_last_x128,
        position.liquidity,
    );

    ValuationResult {
        qtty_token0: scale_down(amount0, decimals0),
        qtty_token1: scale_down(amount1, decimals1),
        price_token0,
        price_token1: 1.0 / price_token0,
        fees_uncollected_token0: scale_down(fees0, decimals0),
        fees_uncollected_token1: scale_down(fees1, decimals1),
        fees_owed_token0: scale_down(position.tokens_owed0 as f64, decimals0),
        fees_owed_token1: scale_down(position.tokens_owed1 as f64, decimals1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q128(units: u64) -> U256 {
        U256::from(units) << 128
    }

    fn assert_close(got: f64, expect: f64) {
        let tolerance = expect.abs().max(1.0) * 1e-9;
        assert!(
            (got - expect).abs() <= tolerance,
            "got {got}, expected {expect}"
        );
    }

    fn position(liquidity: u128) -> PositionRawState {
        PositionRawState {
            liquidity,
            ..Default::default()
        }
    }

    #[test]
    fn test_tick_to_price() {
        assert_eq!(tick_to_price(0), 1.0);
        assert_close(tick_to_price(1), 1.0001);
        assert_close(tick_to_price(-1) * tick_to_price(1), 1.0);
    }

    #[test]
    fn test_amounts_below_range_are_token0() {
        for tick in [-1_000, -120, -60] {
            let prices = RawPrices::new(tick, -60, 60);
            let (amount0, amount1) = amounts_for_liquidity(1_000_000_000_000, &prices);
            assert!(amount0 > 0.0);
            assert_eq!(amount1, 0.0);
        }
    }

    #[test]
    fn test_amounts_above_range_are_token1() {
        for tick in [60, 61, 5_000] {
            let prices = RawPrices::new(tick, -60, 60);
            let (amount0, amount1) = amounts_for_liquidity(1_000_000_000_000, &prices);
            assert_eq!(amount0, 0.0);
            assert!(amount1 > 0.0);
        }
    }

    #[test]
    fn test_amounts_in_symmetric_range() {
        let liquidity = 1_000_000_000_000u128;
        let (amount0, amount1) = amounts_for_liquidity(liquidity, &RawPrices::new(0, -60, 60));
        let expect = liquidity as f64 * (1.0 - TICK_BASE.powi(-30));
        assert_close(amount0, expect);
        assert_close(amount1, expect);
    }

    #[test]
    fn test_amounts_are_continuous_at_bounds() {
        let liquidity = 5_000_000_000u128;
        let (at_lower0, _) = amounts_for_liquidity(liquidity, &RawPrices::new(-60, -60, 60));
        let (inside0, inside1) = amounts_for_liquidity(liquidity, &RawPrices::new(-59, -60, 60));
        assert!(inside0 < at_lower0);
        assert!(at_lower0 - inside0 < at_lower0 * 1e-2);
        assert!(inside1 < liquidity as f64 * 1e-4);

        let (_, at_upper1) = amounts_for_liquidity(liquidity, &RawPrices::new(60, -60, 60));
        let (inside0, inside1) = amounts_for_liquidity(liquidity, &RawPrices::new(59, -60, 60));
        assert!(inside1 < at_upper1);
        assert!(inside0 < liquidity as f64 * 1e-4);
    }

    #[test]
    fn test_uncollected_fees() {
        let fees = uncollected_fees(q128(10), q128(1), q128(2), q128(4), 1_000_000);
        assert_eq!(fees, 3_000_000.0);
        assert_eq!(uncollected_fees(q128(10), U256::ZERO, U256::ZERO, q128(10), 5), 0.0);
    }

    #[test]
    fn test_negative_fees_are_clamped() {
        assert_eq!(uncollected_fees(q128(1), q128(1), q128(1), q128(1), 1_000), 0.0);
        // outside growth wrapped around 2^256
        assert_eq!(
            uncollected_fees(q128(5), U256::MAX, q128(1), U256::ZERO, 1_000),
            0.0
        );
    }

    #[test]
    fn test_value_position() {
        let pool = PoolGlobals {
            fee_growth_global0_x128: q128(10),
            fee_growth_global1_x128: q128(3),
            tick: 0,
        };
        let lower = TickState {
            fee_growth_outside0_x128: q128(1),
            ..Default::default()
        };
        let upper = TickState {
            fee_growth_outside1_x128: q128(1),
            ..Default::default()
        };
        let position = PositionRawState {
            liquidity: 2_000_000,
            fee_growth_inside0_last_x128: q128(3),
            fee_growth_inside1_last_x128: q128(4),
            tokens_owed0: 1_500_000,
            tokens_owed1: 250,
        };
        let result = value_position(&pool, &lower, &upper, &position, -60, 60, (6, 2));

        let expect = 2_000_000.0 * (1.0 - TICK_BASE.powi(-30));
        assert_close(result.qtty_token0, expect / 1e6);
        assert_close(result.qtty_token1, expect / 1e2);
        assert_close(result.price_token0, 1e4);
        assert_close(result.price_token1, 1e-4);
        assert_eq!(result.fees_uncollected_token0, 12.0);
        assert_eq!(result.fees_uncollected_token1, 0.0);
        assert_eq!(result.fees_owed_token0, 1.5);
        assert_eq!(result.fees_owed_token1, 2.5);
    }

    #[test]
    fn test_decimal_adjusted_price() {
        // USDC (6) / WETH (18)
        let pool = PoolGlobals {
            tick: 200_000,
            ..Default::default()
        };
        let result = value_position(
            &pool,
            &TickState::default(),
            &TickState::default(),
            &position(0),
            199_980,
            200_040,
            (6, 18),
        );
        assert_close(result.price_token0, tick_to_price(200_000) * 1e-12);
        assert_close(result.price_token0 * result.price_token1, 1.0);
        assert!(result.price_token1 > 1_000.0 && result.price_token1 < 5_000.0);
    }

    #[test]
    fn test_zero_decimals() {
        let pool = PoolGlobals {
            tick: 120,
            ..Default::default()
        };
        let result = value_position(
            &pool,
            &TickState::default(),
            &TickState::default(),
            &position(1_000),
            -60,
            60,
            (0, 0),
        );
        assert_eq!(result.price_token0, tick_to_price(120));
        assert!(result.price_token1.is_finite());
        assert_eq!(result.qtty_token0, 0.0);
        assert!(result.qtty_token1 > 0.0);
    }

    #[test]
    fn test_fees_never_negative() {
        let growth = [U256::ZERO, q128(1), q128(7), U256::MAX];
        for global in growth {
            for outside in growth {
                for inside in growth {
                    let pool = PoolGlobals {
                        fee_growth_global0_x128: global,
                        fee_growth_global1_x128: global,
                        tick: 10,
                    };
                    let tick = TickState {
                        fee_growth_outside0_x128: outside,
                        fee_growth_outside1_x128: outside,
                        ..Default::default()
                    };
                    let position = PositionRawState {
                        liquidity: 1_000,
                        fee_growth_inside0_last_x128: inside,
                        fee_growth_inside1_last_x128: inside,
                        ..Default::default()
                    };
                    let result =
                        value_position(&pool, &tick, &tick, &position, -60, 60, (18, 6));
                    assert!(result.fees_uncollected_token0 >= 0.0);
                    assert!(result.fees_uncollected_token1 >= 0.0);
                }
            }
        }
    }

    #[test]
    fn test_value_position_is_idempotent() {
        let pool = PoolGlobals {
            fee_growth_global0_x128: q128(9),
            fee_growth_global1_x128: q128(9),
            tick: -276_325,
        };
        let position = PositionRawState {
            liquidity: 99_225_286_851_746,
            fee_growth_inside0_last_x128: q128(2),
            ..Default::default()
        };
        let value = || {
            value_position(
                &pool,
                &TickState::default(),
                &TickState::default(),
                &position,
                -276_328,
                -276_322,
                (6, 6),
            )
        };
        assert_eq!(value(), value());
    }

    #[test]
    fn test_combine_and_idle() {
        let base = ValuationResult {
            qtty_token0: 1.0,
            qtty_token1: 2.0,
            price_token0: 4.0,
            price_token1: 0.25,
            fees_uncollected_token0: 0.5,
            fees_uncollected_token1: 0.25,
            fees_owed_token0: 0.1,
            fees_owed_token1: 0.2,
        };
        let limit = ValuationResult {
            qtty_token0: 3.0,
            price_token0: 6.0,
            price_token1: 0.75,
            fees_owed_token1: 0.3,
            ..Default::default()
        };
        let total = base.combine(&limit).with_idle(10.0, 20.0);
        assert_eq!(
            total,
            ValuationResult {
                qtty_token0: 14.0,
                qtty_token1: 22.0,
                price_token0: 5.0,
                price_token1: 0.5,
                fees_uncollected_token0: 0.5,
                fees_uncollected_token1: 0.25,
                fees_owed_token0: 0.1,
                fees_owed_token1: 0.5,
            }
        );
    }
}
