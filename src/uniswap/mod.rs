//! Uniswap V3 pool and position reads.
//!
//! The [`Client`] reads pool accounting at a [`ValuationContext`] and feeds it
//! to the pure valuation functions in [`math`]. Pool tokens and token decimals
//! never change for a deployed contract and are cached for the lifetime of the
//! client; everything else is read at the pinned block on every call.
//!
//! # Examples
//!
//! ## Value a position
//!
//! ```no_run
//! use gammasdk::chain::{BlockTag, RpcChain, ValuationContext};
//! use gammasdk::{Address, uniswap};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = uniswap::Client::mainnet().await?;
//! let ctx = ValuationContext::pin(&RpcChain::new(client.provider().clone()), BlockTag::Latest).await?;
//!
//! let pool: Address = "0x...".parse()?;
//! let owner: Address = "0x...".parse()?;
//! let value = client.tvl_price_fees(pool, owner, -276328, -276322, &ctx).await?;
//! println!("{} token0 / {} token1", value.qtty_token0, value.qtty_token1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Read raw state
//!
//! ```no_run
//! use gammasdk::chain::ValuationContext;
//! use gammasdk::{Address, uniswap};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = uniswap::Client::mainnet().await?;
//! let ctx = ValuationContext::at(18_000_000);
//! let pool: Address = "0x...".parse()?;
//!
//! let globals = client.pool_globals(pool, &ctx).await?;
//! let lower = client.tick_state(pool, globals.tick - 60, &ctx).await?;
//! println!("tick {} gross liquidity below: {}", globals.tick, lower.liquidity_gross);
//! # Ok(())
//! # }
//! ```

pub mod contracts;
pub mod key;
pub mod math;

use alloy::{
    primitives::{Address, B256, aliases::I24},
    transports::TransportError,
};

pub use self::key::position_key;
use self::{
    contracts::IUniswapV3Pool::{self, IUniswapV3PoolInstance},
    math::{PoolGlobals, PositionRawState, RawPrices, TickState, ValuationResult},
};
use crate::{
    chain::{
        self, DynProvider, Provider, ValuationContext,
        cache::{FieldCache, Scope},
        erc20::{self, TokenMeta},
    },
    error::{Error, Result},
};

/// Converts an ABI `int24` to a tick.
pub(crate) fn tick_from_i24(tick: I24) -> Result<i32> {
    i32::try_from(tick).map_err(|_| Error::invalid(format!("tick {tick} does not fit an i32")))
}

/// Converts a tick to an ABI `int24`.
pub(crate) fn tick_to_i24(tick: i32) -> Result<I24> {
    I24::try_from(tick).map_err(|_| Error::invalid(format!("tick {tick} does not fit an int24")))
}

/// Client for Uniswap V3 pools.
///
/// # Example
///
/// ```no_run
/// use gammasdk::uniswap;
///
/// # async fn example() -> anyhow::Result<()> {
/// let client = uniswap::Client::mainnet_with_url("https://custom-rpc.example.com").await?;
/// # Ok(())
/// # }
/// ```
pub struct Client<P>
where
    P: Provider,
{
    provider: P,
    tokens: FieldCache<Address>,
    decimals: FieldCache<u8>,
}

impl Client<DynProvider> {
    /// Creates a client for mainnet.
    pub async fn mainnet() -> Result<Self, TransportError> {
        let provider = DynProvider::new(chain::mainnet().await?);
        Ok(Self::new(provider))
    }

    /// Creates a client for mainnet.
    pub async fn mainnet_with_url(url: &str) -> Result<Self, TransportError> {
        let provider = DynProvider::new(chain::mainnet_with_url(url).await?);
        Ok(Self::new(provider))
    }
}

impl<P> Client<P>
where
    P: Provider,
{
    /// Create a uniswap client.
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            tokens: FieldCache::new(),
            decimals: FieldCache::new(),
        }
    }

    /// Returns the root provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Returns the uniswap pool.
    pub fn pool(&self, address: Address) -> IUniswapV3PoolInstance<P> {
        IUniswapV3Pool::new(address, self.provider().clone())
    }

    /// Returns the pool's (token0, token1).
    pub async fn tokens(&self, pool: Address) -> Result<(Address, Address)> {
        tokio::try_join!(
            self.tokens.get_or_fetch(pool, "token0", Scope::Static, || async {
                Ok::<_, Error>(self.pool(pool).token0().call().await?)
            }),
            self.tokens.get_or_fetch(pool, "token1", Scope::Static, || async {
                Ok::<_, Error>(self.pool(pool).token1().call().await?)
            }),
        )
    }

    /// Returns a token's decimals, cached per token.
    pub async fn token_meta(&self, token: Address) -> Result<TokenMeta> {
        let decimals = self
            .decimals
            .get_or_fetch(token, "decimals", Scope::Static, || async {
                Ok::<_, Error>(erc20::token_meta(&self.provider, token).await?.decimals)
            })
            .await?;
        Ok(TokenMeta {
            address: token,
            decimals,
        })
    }

    /// Returns the factory that deployed the pool.
    pub async fn factory(&self, pool: Address) -> Result<Address> {
        Ok(self.pool(pool).factory().call().await?)
    }

    /// Returns the pool's swap fee, in hundredths of a basis point.
    pub async fn fee(&self, pool: Address) -> Result<u32> {
        let fee = self.pool(pool).fee().call().await?;
        Ok(fee.to::<u32>())
    }

    /// Returns the pool's tick spacing.
    pub async fn tick_spacing(&self, pool: Address) -> Result<i32> {
        let spacing = self.pool(pool).tickSpacing().call().await?;
        tick_from_i24(spacing)
    }

    /// Returns the liquidity in range at the pinned block.
    pub async fn liquidity(&self, pool: Address, ctx: &ValuationContext) -> Result<u128> {
        Ok(self
            .pool(pool)
            .liquidity()
            .call()
            .block(ctx.block_id())
            .await?)
    }

    /// Returns the pool's slot0.
    pub async fn slot0(
        &self,
        pool: Address,
        ctx: &ValuationContext,
    ) -> Result<IUniswapV3Pool::slot0Return> {
        let ret = self.pool(pool).slot0().call().block(ctx.block_id()).await?;
        Ok(ret)
    }

    /// Reads the fee growth accumulators and the current tick.
    pub async fn pool_globals(&self, pool: Address, ctx: &ValuationContext) -> Result<PoolGlobals> {
        let instance = self.pool(pool);
        let (fee_growth_global0_x128, fee_growth_global1_x128, slot0) = tokio::try_join!(
            async {
                Ok::<_, Error>(
                    instance
                        .feeGrowthGlobal0X128()
                        .call()
                        .block(ctx.block_id())
                        .await?,
                )
            },
            async {
                Ok::<_, Error>(
                    instance
                        .feeGrowthGlobal1X128()
                        .call()
                        .block(ctx.block_id())
                        .await?,
                )
            },
            self.slot0(pool, ctx),
        )?;
        Ok(PoolGlobals {
            fee_growth_global0_x128,
            fee_growth_global1_x128,
            tick: tick_from_i24(slot0.tick)?,
        })
    }

    /// Reads the accounting stored at `tick`.
    pub async fn tick_state(
        &self,
        pool: Address,
        tick: i32,
        ctx: &ValuationContext,
    ) -> Result<TickState> {
        let ret = self
            .pool(pool)
            .ticks(tick_to_i24(tick)?)
            .call()
            .block(ctx.block_id())
            .await?;
        Ok(TickState {
            liquidity_gross: ret.liquidityGross,
            liquidity_net: ret.liquidityNet,
            fee_growth_outside0_x128: ret.feeGrowthOutside0X128,
            fee_growth_outside1_x128: ret.feeGrowthOutside1X128,
        })
    }

    /// Reads the position stored under `key`.
    ///
    /// An unknown key reads as an empty position.
    pub async fn position_state(
        &self,
        pool: Address,
        key: B256,
        ctx: &ValuationContext,
    ) -> Result<PositionRawState> {
        let ret = self
            .pool(pool)
            .positions(key)
            .call()
            .block(ctx.block_id())
            .await?;
        Ok(PositionRawState {
            liquidity: ret.liquidity,
            fee_growth_inside0_last_x128: ret.feeGrowthInside0LastX128,
            fee_growth_inside1_last_x128: ret.feeGrowthInside1LastX128,
            tokens_owed0: ret.tokensOwed0,
            tokens_owed1: ret.tokensOwed1,
        })
    }

    /// Reads the position of `owner` over `[tick_lower, tick_upper]`.
    pub async fn position(
        &self,
        pool: Address,
        owner: Address,
        tick_lower: i32,
        tick_upper: i32,
        ctx: &ValuationContext,
    ) -> Result<PositionRawState> {
        let key = position_key(owner, tick_lower, tick_upper)?;
        self.position_state(pool, key, ctx).await
    }

    /// Prices at the current tick and at the range bounds, not decimal adjusted.
    pub async fn raw_prices(
        &self,
        pool: Address,
        tick_lower: i32,
        tick_upper: i32,
        ctx: &ValuationContext,
    ) -> Result<RawPrices> {
        let slot0 = self.slot0(pool, ctx).await?;
        Ok(RawPrices::new(
            tick_from_i24(slot0.tick)?,
            tick_lower,
            tick_upper,
        ))
    }

    /// Value locked, prices, uncollected and owed fees of one position range.
    ///
    /// Every read is made at `ctx`.
    pub async fn tvl_price_fees(
        &self,
        pool: Address,
        owner: Address,
        tick_lower: i32,
        tick_upper: i32,
        ctx: &ValuationContext,
    ) -> Result<ValuationResult> {
        let key = position_key(owner, tick_lower, tick_upper)?;
        let (token0, token1) = self.tokens(pool).await?;

        let (globals, lower, upper, position, meta0, meta1) = tokio::try_join!(
            self.pool_globals(pool, ctx),
            self.tick_state(pool, tick_lower, ctx),
            self.tick_state(pool, tick_upper, ctx),
            self.position_state(pool, key, ctx),
            self.token_meta(token0),
            self.token_meta(token1),
        )?;
        log::debug!(
            "valuing {owner} on {pool} [{tick_lower}, {tick_upper}] at block {}: liquidity {}",
            ctx.block(),
            position.liquidity
        );

        Ok(math::value_position(
            &globals,
            &lower,
            &upper,
            &position,
            tick_lower,
            tick_upper,
            (meta0.decimals, meta1.decimals),
        ))
    }
}
