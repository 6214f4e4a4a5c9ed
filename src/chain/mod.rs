//! EVM chain plumbing.
//!
//! This module wraps an Alloy provider into the two capabilities the rest of
//! the SDK needs: reading blocks and reading logs ([`ChainReader`]), plus
//! ERC-20 helpers and the [`ValuationContext`] that pins every contract read
//! of a computation to the same block height.
//!
//! # Submodules
//!
//! - [`blocks`]: find the block closest to a timestamp
//! - [`logs`]: paginate `eth_getLogs` into provider-sized chunks
//! - [`cache`]: explicit per-field cache with block-height invalidation
//!
//! # Examples
//!
//! ## Pin a block and read a balance
//!
//! ```no_run
//! use gammasdk::chain::{self, BlockTag, RpcChain, ValuationContext, erc20};
//! use gammasdk::Address;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let provider = chain::mainnet().await?;
//! let rpc = RpcChain::new(provider.clone());
//! let ctx = ValuationContext::pin(&rpc, BlockTag::Latest).await?;
//!
//! let token: Address = "0x...".parse()?;
//! let owner: Address = "0x...".parse()?;
//! let meta = erc20::token_meta(&provider, token).await?;
//! let balance = erc20::balance_of(&provider, &meta, owner, &ctx).await?;
//! println!("balance at block {}: {}", ctx.block(), balance);
//! # Ok(())
//! # }
//! ```

pub mod blocks;
pub mod cache;
pub mod logs;
#[cfg(test)]
pub(crate) mod testing;

use std::future::Future;

// reimport
pub use alloy::providers::ProviderBuilder;
use alloy::{
    eips::{BlockId, BlockNumberOrTag},
    network::Ethereum,
    primitives::U256,
    rpc::types::Log,
    transports::TransportError,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::{
    chain::logs::EventFilter,
    error::{Error, Result},
};

/// Default Ethereum mainnet RPC URL.
pub const DEFAULT_RPC_URL: &str = "https://eth.llamarpc.com";

/// Provider trait for the SDK.
///
/// Implemented by every Alloy provider that is cheap to clone and can move
/// between tasks.
pub trait Provider: alloy::providers::Provider<Ethereum> + Send + Clone + 'static {}

/// Dynamic provider type.
///
/// Use this when you need type erasure for providers.
pub type DynProvider = alloy::providers::DynProvider<Ethereum>;

impl<T> Provider for T where T: alloy::providers::Provider<Ethereum> + Send + Clone + 'static {}

/// Creates a provider for the default RPC endpoint.
#[inline(always)]
pub async fn mainnet() -> Result<impl Provider, TransportError> {
    mainnet_with_url(DEFAULT_RPC_URL).await
}

/// Creates a provider with a custom RPC URL.
///
/// # Example
///
/// ```no_run
/// use gammasdk::chain;
///
/// # async fn example() -> anyhow::Result<()> {
/// let provider = chain::mainnet_with_url("https://custom-rpc.example.com").await?;
/// # Ok(())
/// # }
/// ```
#[inline(always)]
pub async fn mainnet_with_url(url: &str) -> Result<impl Provider, TransportError> {
    let p = ProviderBuilder::new().connect(url).await?;
    Ok(p)
}

/// Block selector accepted by [`ChainReader::block`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum BlockTag {
    /// The chain head at the time of the call.
    #[display("latest")]
    Latest,
    /// A specific block height.
    #[display("{_0}")]
    Number(u64),
}

impl From<u64> for BlockTag {
    fn from(number: u64) -> Self {
        Self::Number(number)
    }
}

impl From<BlockTag> for BlockNumberOrTag {
    fn from(tag: BlockTag) -> Self {
        match tag {
            BlockTag::Latest => BlockNumberOrTag::Latest,
            BlockTag::Number(number) => BlockNumberOrTag::Number(number),
        }
    }
}

/// Snapshot of a block's height and timestamp.
///
/// Never cached: "latest" moves, so every call refetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Block {
    /// Block height.
    pub number: u64,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
}

impl Block {
    /// Returns the block timestamp as a UTC datetime.
    #[must_use]
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(i64::try_from(self.timestamp).ok()?, 0)
    }
}

/// Read-only access to blocks and logs.
///
/// This is the seam between the SDK's algorithms and the RPC transport:
/// [`RpcChain`] implements it over an Alloy provider and tests implement it
/// over an in-memory chain.
pub trait ChainReader: Sync {
    /// Fetches a block, failing with [`Error::NotFound`] when it does not exist.
    fn block(&self, tag: BlockTag) -> impl Future<Output = Result<Block>> + Send;

    /// Fetches every log matching `filter`, in chain order.
    fn logs(&self, filter: &EventFilter) -> impl Future<Output = Result<Vec<Log>>> + Send;
}

/// [`ChainReader`] over an Alloy provider.
#[derive(Debug, Clone)]
pub struct RpcChain<P>
where
    P: Provider,
{
    provider: P,
}

impl<P> RpcChain<P>
where
    P: Provider,
{
    /// Wraps a provider.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Returns the root provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }
}

impl<P> ChainReader for RpcChain<P>
where
    P: Provider,
{
    async fn block(&self, tag: BlockTag) -> Result<Block> {
        let block = self
            .provider
            .get_block_by_number(tag.into())
            .await?
            .ok_or(Error::NotFound(tag))?;
        Ok(Block {
            number: block.header.number,
            timestamp: block.header.timestamp,
        })
    }

    async fn logs(&self, filter: &EventFilter) -> Result<Vec<Log>> {
        let logs = self.provider.get_logs(&filter.to_filter()).await?;
        Ok(logs)
    }
}

/// The block height every read of one computation is pinned to.
///
/// Pool, token and position reads all take the context by argument so a
/// valuation can never mix state from two heights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValuationContext {
    block: u64,
}

impl ValuationContext {
    /// Pins reads to an explicit block height.
    #[must_use]
    pub const fn at(block: u64) -> Self {
        Self { block }
    }

    /// Resolves `tag` once (so "latest" is frozen) and pins to it.
    pub async fn pin<C: ChainReader>(chain: &C, tag: BlockTag) -> Result<Self> {
        let block = chain.block(tag).await?;
        Ok(Self::at(block.number))
    }

    /// The pinned height.
    #[must_use]
    #[inline]
    pub fn block(&self) -> u64 {
        self.block
    }

    /// The pinned height as an Alloy block identifier.
    #[must_use]
    #[inline]
    pub fn block_id(&self) -> BlockId {
        BlockId::number(self.block)
    }
}

/// ERC-20 bindings and scaled reads.
pub mod erc20 {
    use alloy::{
        primitives::{Address, U256},
        sol,
    };
    use rust_decimal::Decimal;

    use super::{Provider, ValuationContext, from_wei};
    use crate::error::Result;

    sol!(
        #[derive(Debug)]
        #[sol(rpc)]
        interface ERC20 {
            function decimals() external view returns (uint8);
            function symbol() external view returns (string);
            function totalSupply() external view returns (uint256);
            function balanceOf(address owner) external view returns (uint256);
        }
    );

    /// Token metadata that never changes for a deployed contract.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TokenMeta {
        /// Token contract address.
        pub address: Address,
        /// Number of decimals used to scale raw amounts.
        pub decimals: u8,
    }

    /// Reads a token's ticker symbol.
    pub async fn symbol<P: Provider>(provider: &P, token: Address) -> Result<String> {
        Ok(ERC20::new(token, provider.clone()).symbol().call().await?)
    }

    /// Reads a token's decimals.
    pub async fn token_meta<P: Provider>(provider: &P, token: Address) -> Result<TokenMeta> {
        let decimals = ERC20::new(token, provider.clone())
            .decimals()
            .call()
            .await?;
        Ok(TokenMeta {
            address: token,
            decimals,
        })
    }

    /// Raw balance of `owner` at the pinned block.
    pub async fn raw_balance_of<P: Provider>(
        provider: &P,
        token: Address,
        owner: Address,
        ctx: &ValuationContext,
    ) -> Result<U256> {
        Ok(ERC20::new(token, provider.clone())
            .balanceOf(owner)
            .call()
            .block(ctx.block_id())
            .await?)
    }

    /// Balance of `owner` at the pinned block, in token units.
    ///
    /// Fails for balances [`from_wei`] cannot represent, use
    /// [`raw_balance_of`] with [`to_units`](super::to_units) for those.
    pub async fn balance_of<P: Provider>(
        provider: &P,
        token: &TokenMeta,
        owner: Address,
        ctx: &ValuationContext,
    ) -> Result<Decimal> {
        let raw = raw_balance_of(provider, token.address, owner, ctx).await?;
        from_wei(raw, token.decimals.into())
    }

    /// Total supply at the pinned block, in token units.
    ///
    /// Same range limits as [`balance_of`].
    pub async fn total_supply<P: Provider>(
        provider: &P,
        token: &TokenMeta,
        ctx: &ValuationContext,
    ) -> Result<Decimal> {
        let raw = ERC20::new(token.address, provider.clone())
            .totalSupply()
            .call()
            .block(ctx.block_id())
            .await?;
        from_wei(raw, token.decimals.into())
    }
}

/// Converts a raw integer amount to a decimal amount in token units.
///
/// Fails when the amount or the scale does not fit a [`Decimal`]
/// (96-bit mantissa, scale up to 28).
///
/// # Example
///
/// ```
/// use gammasdk::chain::from_wei;
/// use gammasdk::U256;
/// use rust_decimal::dec;
///
/// let wei = U256::from(1_500_000_000_000_000_000u128);
/// assert_eq!(from_wei(wei, 18).unwrap(), dec!(1.5));
/// ```
pub fn from_wei(wei: U256, decimals: u32) -> Result<Decimal> {
    let mantissa = i128::try_from(wei)
        .map_err(|_| Error::invalid(format!("amount {wei} does not fit a decimal")))?;
    Decimal::try_from_i128_with_scale(mantissa, decimals)
        .map_err(|err| Error::invalid(format!("amount {wei} with {decimals} decimals: {err}")))
}

/// Lossy conversion of a 256-bit word to `f64`.
#[must_use]
#[inline]
pub fn u256_to_f64(value: U256) -> f64 {
    f64::from(value)
}

/// Raw integer amount in token units, as `f64`.
///
/// Unlike [`from_wei`] this never fails, whatever the amount or decimals.
#[must_use]
pub fn to_units(raw: U256, decimals: u8) -> f64 {
    scale_down(u256_to_f64(raw), decimals)
}

/// Divides a raw amount by `10^decimals`.
#[must_use]
#[inline]
pub fn scale_down(raw: f64, decimals: u8) -> f64 {
    raw / 10f64.powi(i32::from(decimals))
}
