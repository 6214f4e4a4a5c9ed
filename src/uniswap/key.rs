//! Position keys.
//!
//! A pool stores positions in `mapping(bytes32 => Position.Info)` keyed by
//! `keccak256(abi.encodePacked(owner, tickLower, tickUpper))`. A key built any
//! other way reads an empty position instead of failing.

use alloy::primitives::{Address, B256, keccak256};

use crate::error::{Error, Result};

/// Smallest value of a Solidity `int24`.
pub const MIN_INT24: i32 = -(1 << 23);
/// Largest value of a Solidity `int24`.
pub const MAX_INT24: i32 = (1 << 23) - 1;

/// Computes the key a pool uses to index the position of `owner` over
/// `[tick_lower, tick_upper]`.
///
/// # Example
///
/// ```
/// use gammasdk::{address, uniswap::position_key};
///
/// let key = position_key(address!("0xd7b990543ea8e9bd0b9ae2deb9c52c4d0e660431"), -276328, -276322)?;
/// assert_eq!(
///     format!("{key:#x}"),
///     "0x03f0f38ca89a70f8b2c2ffe9ad6cc2e7ddaa35532a0183d677bc2460d5000bd1"
/// );
/// # Ok::<(), gammasdk::Error>(())
/// ```
pub fn position_key(owner: Address, tick_lower: i32, tick_upper: i32) -> Result<B256> {
    let mut packed = [0u8; 26];
    packed[..20].copy_from_slice(owner.as_slice());
    packed[20..23].copy_from_slice(&int24_be_bytes(tick_lower)?);
    packed[23..].copy_from_slice(&int24_be_bytes(tick_upper)?);
    Ok(keccak256(packed))
}

/// Big-endian two's complement encoding of an `int24`.
fn int24_be_bytes(tick: i32) -> Result<[u8; 3]> {
    if !(MIN_INT24..=MAX_INT24).contains(&tick) {
        return Err(Error::invalid(format!("tick {tick} does not fit an int24")));
    }
    let [_, a, b, c] = tick.to_be_bytes();
    Ok([a, b, c])
}
