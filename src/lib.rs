//! # gammasdk
//!
//! A Rust SDK for on-chain analysis of [Uniswap V3](https://uniswap.org) liquidity
//! positions and [Gamma](https://gamma.xyz) hypervisor vaults.
//!
//! The SDK answers three questions about an EVM chain:
//! - **When**: which block was current at a given timestamp
//! - **What happened**: every event matching a filter over an arbitrarily large
//!   block range, fetched in provider-sized chunks
//! - **What is it worth**: value locked, prices and fees of a concentrated
//!   liquidity position at one consistent block height
//!
//! ## Quick Navigation
//!
//! | Module | Description | Common Use Cases |
//! |--------|-------------|------------------|
//! | [`chain`] | Provider plumbing | Pin a block, ERC-20 reads |
//! | [`chain::blocks`] | Block search | Block at a timestamp, average block time |
//! | [`chain::logs`] | Log pagination | Backfill events over millions of blocks |
//! | [`uniswap`] | Uniswap V3 | Pool state, position value, position keys |
//! | [`uniswap::math`] | Valuation | Amounts and fees from raw pool accounting |
//! | [`gamma`] | Gamma vaults | Hypervisor TVL, ranges, share supply |
//! | [`config`] | Settings | RPC endpoint, chunk size, search budget |
//!
//! ## Getting Started
//!
//! ### Installation
//!
//! Add to your `Cargo.toml`:
//! ```toml
//! [dependencies]
//! gammasdk = "0.1"
//! tokio = { version = "1", features = ["full"] }
//! anyhow = "1"
//! ```
//!
//! ### Find a block
//!
//! ```no_run
//! use gammasdk::chain::{self, RpcChain, blocks::BlockResolver};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let rpc = RpcChain::new(chain::mainnet().await?);
//!     let resolution = BlockResolver::new(&rpc).resolve(1_700_000_000).await?;
//!     println!("block {} (exact: {})", resolution.number(), resolution.is_exact());
//!     Ok(())
//! }
//! ```
//!
//! ### Stream events
//!
//! ```no_run
//! use futures::TryStreamExt;
//! use gammasdk::chain::{self, RpcChain, logs::{EventFilter, LogChunker}};
//! use gammasdk::address;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let rpc = RpcChain::new(chain::mainnet().await?);
//! let filter = EventFilter::new(12_370_000, 12_400_000)
//!     .address(address!("0x8ad599c3a0ff1de082011efddc58f1908eb6e6d8"));
//!
//! let mut logs = LogChunker::new(&rpc).stream(filter)?;
//! while let Some(log) = logs.try_next().await? {
//!     println!("{:?}", log.transaction_hash);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Value a Gamma vault
//!
//! ```no_run
//! use gammasdk::chain::{BlockTag, RpcChain, ValuationContext};
//! use gammasdk::{address, gamma};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = gamma::Client::mainnet().await?;
//! let ctx = ValuationContext::pin(&RpcChain::new(client.provider().clone()), BlockTag::Latest).await?;
//!
//! let value = client
//!     .tvl_price_fees(address!("0xa3ecb6e941e773c6568052a509a04cf455a752ad"), &ctx)
//!     .await?;
//! println!("{}", serde_json::to_string_pretty(&value)?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Consistency
//!
//! Every contract read takes a [`chain::ValuationContext`]. Resolve "latest"
//! once, then pass the same context to every read of one computation: a
//! valuation never mixes state from two heights. Nothing that depends on the
//! height is cached across heights.
//!
//! ## Error Handling
//!
//! Library functions return [`Result`]. Transport failures are propagated
//! unmodified; this crate never retries.
//!
//! ```no_run
//! use gammasdk::{Error, chain::{self, RpcChain, blocks::BlockResolver}};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let rpc = RpcChain::new(chain::mainnet().await?);
//! match BlockResolver::new(&rpc).resolve(0).await {
//!     Err(Error::InvalidArgument(reason)) => eprintln!("rejected: {reason}"),
//!     Err(err) => return Err(err.into()),
//!     Ok(resolution) => println!("{}", resolution.number()),
//! }
//! # Ok(())
//! # }
//! ```

pub mod chain;
pub mod config;
pub mod error;
pub mod gamma;
pub mod uniswap;

/// Re-exported primitive types from Alloy.
pub use alloy::primitives::{Address, B256, U256, address};
/// Re-exported decimal type from rust_decimal.
///
/// ERC-20 balances and supplies are returned as [`Decimal`] in token units.
pub use rust_decimal::{Decimal, dec};

pub use crate::error::{Error, Result};
