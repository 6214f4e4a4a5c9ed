//! Gamma hypervisor vaults.
//!
//! A hypervisor manages two Uniswap V3 ranges for the same owner (itself): a
//! wide "base" range and a narrow "limit" range, plus whatever tokens it keeps
//! idle between rebalances. Valuing a hypervisor values both ranges at the
//! same block and adds the idle balances.
//!
//! # Example
//!
//! ```no_run
//! use gammasdk::chain::{BlockTag, RpcChain, ValuationContext};
//! use gammasdk::{Address, gamma};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = gamma::Client::mainnet().await?;
//! let ctx = ValuationContext::pin(&RpcChain::new(client.provider().clone()), BlockTag::Latest).await?;
//!
//! let hypervisor: Address = "0x...".parse()?;
//! let value = client.tvl_price_fees(hypervisor, &ctx).await?;
//! let supply = client.total_supply(hypervisor, &ctx).await?;
//! println!("{} token0 / {} token1 for {supply} shares", value.qtty_token0, value.qtty_token1);
//! # Ok(())
//! # }
//! ```

pub mod contracts;

use alloy::{
    primitives::{Address, U256},
    transports::TransportError,
};
use rust_decimal::Decimal;

use self::contracts::IHypervisor::{self, IHypervisorInstance};
use crate::{
    chain::{
        self, DynProvider, Provider, ValuationContext,
        cache::{FieldCache, Scope},
        erc20::{self, TokenMeta},
        from_wei, to_units,
    },
    error::{Error, Result},
    uniswap::{self, math::ValuationResult, tick_from_i24},
};

/// An inclusive tick range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TickRange {
    /// Lower tick.
    pub lower: i32,
    /// Upper tick.
    pub upper: i32,
}

/// The two ranges a hypervisor deploys liquidity into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ranges {
    /// Wide range holding most of the liquidity.
    pub base: TickRange,
    /// Narrow single-sided range placed after a rebalance.
    pub limit: TickRange,
}

/// Liquidity and token amounts of one hypervisor range, as reported by the vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangePosition {
    /// Liquidity held by the vault in the range.
    pub liquidity: u128,
    /// Token0 in the range, fees included.
    pub amount0: Decimal,
    /// Token1 in the range, fees included.
    pub amount1: Decimal,
}

/// Total token amounts managed by a hypervisor, deployed and idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TotalAmounts {
    /// Token0 across both ranges and idle.
    pub total0: Decimal,
    /// Token1 across both ranges and idle.
    pub total1: Decimal,
}

/// Client for Gamma hypervisors.
///
/// Wraps a [`uniswap::Client`] so pool tokens and decimals are cached once for
/// both ranges.
pub struct Client<P>
where
    P: Provider,
{
    uniswap: uniswap::Client<P>,
    pools: FieldCache<Address>,
    ranges: FieldCache<i32>,
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
    /// Create a gamma client.
    pub fn new(provider: P) -> Self {
        Self {
            uniswap: uniswap::Client::new(provider),
            pools: FieldCache::new(),
            ranges: FieldCache::new(),
        }
    }

    /// Returns the root provider.
    pub fn provider(&self) -> &P {
        self.uniswap.provider()
    }

    /// Returns the underlying uniswap client.
    pub fn uniswap(&self) -> &uniswap::Client<P> {
        &self.uniswap
    }

    /// Returns the hypervisor contract.
    pub fn hypervisor(&self, address: Address) -> IHypervisorInstance<P> {
        IHypervisor::new(address, self.provider().clone())
    }

    /// Returns the pool a hypervisor provides liquidity to.
    pub async fn pool(&self, hypervisor: Address) -> Result<Address> {
        self.pools
            .get_or_fetch(hypervisor, "pool", Scope::Static, || async {
                Ok::<_, Error>(self.hypervisor(hypervisor).pool().call().await?)
            })
            .await
    }

    /// Returns the metadata of the pool's (token0, token1).
    pub async fn tokens(&self, hypervisor: Address) -> Result<(TokenMeta, TokenMeta)> {
        let pool = self.pool(hypervisor).await?;
        let (token0, token1) = self.uniswap.tokens(pool).await?;
        tokio::try_join!(
            self.uniswap.token_meta(token0),
            self.uniswap.token_meta(token1)
        )
    }

    async fn range_bound(
        &self,
        hypervisor: Address,
        field: &'static str,
        ctx: &ValuationContext,
    ) -> Result<i32> {
        self.ranges
            .get_or_fetch(hypervisor, field, Scope::Block(ctx.block()), || async {
                let instance = self.hypervisor(hypervisor);
                let tick = match field {
                    "baseLower" => instance.baseLower().call().block(ctx.block_id()).await?,
                    "baseUpper" => instance.baseUpper().call().block(ctx.block_id()).await?,
                    "limitLower" => instance.limitLower().call().block(ctx.block_id()).await?,
                    _ => instance.limitUpper().call().block(ctx.block_id()).await?,
                };
                tick_from_i24(tick)
            })
            .await
    }

    /// Reads the pool tick the vault last observed.
    pub async fn current_tick(&self, hypervisor: Address, ctx: &ValuationContext) -> Result<i32> {
        let tick = self
            .hypervisor(hypervisor)
            .currentTick()
            .call()
            .block(ctx.block_id())
            .await?;
        tick_from_i24(tick)
    }

    /// Reads the base and limit ranges at the pinned block.
    pub async fn ranges(&self, hypervisor: Address, ctx: &ValuationContext) -> Result<Ranges> {
        let (base_lower, base_upper, limit_lower, limit_upper) = tokio::try_join!(
            self.range_bound(hypervisor, "baseLower", ctx),
            self.range_bound(hypervisor, "baseUpper", ctx),
            self.range_bound(hypervisor, "limitLower", ctx),
            self.range_bound(hypervisor, "limitUpper", ctx),
        )?;
        Ok(Ranges {
            base: TickRange {
                lower: base_lower,
                upper: base_upper,
            },
            limit: TickRange {
                lower: limit_lower,
                upper: limit_upper,
            },
        })
    }

    /// The base range as reported by the vault, in token units.
    ///
    /// Amounts go through [`from_wei`] and fail for tokens with more than 28
    /// decimals or amounts above 2^96 raw units. [`tvl_price_fees`](Self::tvl_price_fees)
    /// has no such limit.
    pub async fn base_position(
        &self,
        hypervisor: Address,
        ctx: &ValuationContext,
    ) -> Result<RangePosition> {
        let (meta0, meta1) = self.tokens(hypervisor).await?;
        let ret = self
            .hypervisor(hypervisor)
            .getBasePosition()
            .call()
            .block(ctx.block_id())
            .await?;
        Ok(RangePosition {
            liquidity: ret.liquidity,
            amount0: from_wei(ret.amount0, meta0.decimals.into())?,
            amount1: from_wei(ret.amount1, meta1.decimals.into())?,
        })
    }

    /// The limit range as reported by the vault, in token units.
    ///
    /// Same range limits as [`base_position`](Self::base_position).
    pub async fn limit_position(
        &self,
        hypervisor: Address,
        ctx: &ValuationContext,
    ) -> Result<RangePosition> {
        let (meta0, meta1) = self.tokens(hypervisor).await?;
        let ret = self
            .hypervisor(hypervisor)
            .getLimitPosition()
            .call()
            .block(ctx.block_id())
            .await?;
        Ok(RangePosition {
            liquidity: ret.liquidity,
            amount0: from_wei(ret.amount0, meta0.decimals.into())?,
            amount1: from_wei(ret.amount1, meta1.decimals.into())?,
        })
    }

    /// Total amounts as reported by the vault, in token units.
    ///
    /// Same range limits as [`base_position`](Self::base_position).
    pub async fn total_amounts(
        &self,
        hypervisor: Address,
        ctx: &ValuationContext,
    ) -> Result<TotalAmounts> {
        let (meta0, meta1) = self.tokens(hypervisor).await?;
        let ret = self
            .hypervisor(hypervisor)
            .getTotalAmounts()
            .call()
            .block(ctx.block_id())
            .await?;
        Ok(TotalAmounts {
            total0: from_wei(ret.total0, meta0.decimals.into())?,
            total1: from_wei(ret.total1, meta1.decimals.into())?,
        })
    }

    /// Outstanding vault shares.
    pub async fn total_supply(&self, hypervisor: Address, ctx: &ValuationContext) -> Result<Decimal> {
        let meta = self.uniswap.token_meta(hypervisor).await?;
        erc20::total_supply(self.provider(), &meta, ctx).await
    }

    /// Value locked, prices, uncollected and owed fees of the whole vault.
    ///
    /// Both ranges are valued with the hypervisor as position owner, combined,
    /// then the tokens it holds outside the pool are added.
    pub async fn tvl_price_fees(
        &self,
        hypervisor: Address,
        ctx: &ValuationContext,
    ) -> Result<ValuationResult> {
        let (pool, ranges, (meta0, meta1)) = tokio::try_join!(
            self.pool(hypervisor),
            self.ranges(hypervisor, ctx),
            self.tokens(hypervisor),
        )?;

        let (base, limit, idle0, idle1) = tokio::try_join!(
            self.uniswap.tvl_price_fees(
                pool,
                hypervisor,
                ranges.base.lower,
                ranges.base.upper,
                ctx
            ),
            self.uniswap.tvl_price_fees(
                pool,
                hypervisor,
                ranges.limit.lower,
                ranges.limit.upper,
                ctx
            ),
            erc20::raw_balance_of(self.provider(), meta0.address, hypervisor, ctx),
            erc20::raw_balance_of(self.provider(), meta1.address, hypervisor, ctx),
        )?;
        log::debug!(
            "hypervisor {hypervisor} at block {}: idle {idle0} / {idle1} raw",
            ctx.block()
        );

        Ok(vault_value(&base, &limit, (idle0, idle1), (meta0.decimals, meta1.decimals)))
    }
}

/// Combines both ranges and adds the idle raw balances in token units.
fn vault_value(
    base: &ValuationResult,
    limit: &ValuationResult,
    idle: (U256, U256),
    decimals: (u8, u8),
) -> ValuationResult {
    base.combine(limit)
        .with_idle(to_units(idle.0, decimals.0), to_units(idle.1, decimals.1))
}
