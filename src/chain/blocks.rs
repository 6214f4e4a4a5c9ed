//! Block lookup by timestamp.
//!
//! RPC nodes have no "block at time T" query, so [`BlockResolver`] walks the
//! chain following the observed block rate: each sample re-estimates the
//! seconds per block between the last two samples and jumps by the number of
//! blocks that separates the current timestamp from the target. Block
//! production is only roughly uniform, so this usually lands on the exact
//! block in a handful of queries where a bisection would need ~25.
//!
//! The search is bounded by wall-clock time rather than by query count. When
//! the budget runs out the closest block not past the target is returned as
//! [`Resolution::BestEffort`].
//!
//! # Example
//!
//! ```no_run
//! use gammasdk::chain::{self, RpcChain, blocks::BlockResolver};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let rpc = RpcChain::new(chain::mainnet().await?);
//! let resolution = BlockResolver::new(&rpc).resolve(1_672_531_200).await?;
//! if !resolution.is_exact() {
//!     println!("off by {}s", resolution.discrepancy());
//! }
//! println!("block {}", resolution.number());
//! # Ok(())
//! # }
//! ```

use std::{cmp::Ordering, time::Duration};

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use super::{Block, BlockTag, ChainReader};
use crate::error::{Error, Result};

/// Default wall-clock budget of a single [`BlockResolver::resolve`] call.
pub const DEFAULT_SEARCH_BUDGET: Duration = Duration::from_secs(15);

/// Share of the chain height covered by the first, rate-estimating jump.
const FIRST_STEP_RATIO: f64 = 0.85;

/// Outcome of a timestamp search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::IsVariant)]
pub enum Resolution {
    /// A block with exactly the target timestamp.
    Exact(Block),
    /// The search did not converge; `block` is the best sample taken.
    BestEffort {
        /// Latest sampled block not past the target. When every sample was
        /// past it, the block before the closest of them.
        block: Block,
        /// Timestamp that was searched for.
        target: u64,
        /// Number of block queries issued.
        queries: usize,
    },
}

impl Resolution {
    /// The resolved block.
    #[must_use]
    pub fn block(&self) -> Block {
        match self {
            Self::Exact(block) | Self::BestEffort { block, .. } => *block,
        }
    }

    /// The resolved block number.
    #[must_use]
    pub fn number(&self) -> u64 {
        self.block().number
    }

    /// Seconds between the target and the resolved block (target minus block).
    #[must_use]
    pub fn discrepancy(&self) -> i64 {
        match self {
            Self::Exact(_) => 0,
            Self::BestEffort { block, target, .. } => *target as i64 - block.timestamp as i64,
        }
    }
}

/// Finds blocks by timestamp.
#[derive(Debug)]
pub struct BlockResolver<'a, C> {
    chain: &'a C,
    budget: Duration,
}

impl<'a, C> BlockResolver<'a, C>
where
    C: ChainReader,
{
    /// Creates a resolver with the default 15 second budget.
    pub fn new(chain: &'a C) -> Self {
        Self {
            chain,
            budget: DEFAULT_SEARCH_BUDGET,
        }
    }

    /// Overrides the search budget.
    #[must_use]
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    /// Same as [`resolve`](Self::resolve) for a UTC datetime.
    pub async fn resolve_datetime(&self, at: DateTime<Utc>) -> Result<Resolution> {
        let timestamp = u64::try_from(at.timestamp())
            .map_err(|_| Error::invalid(format!("{at} is before the unix epoch")))?;
        self.resolve(timestamp).await
    }

    /// Finds the block whose timestamp is `target`.
    ///
    /// Fails with [`Error::InvalidArgument`] for a zero timestamp. Targets at
    /// or after the chain head resolve to the head.
    pub async fn resolve(&self, target: u64) -> Result<Resolution> {
        if target == 0 {
            return Err(Error::invalid("timestamp must be positive"));
        }

        let started = Instant::now();
        let latest = self.chain.block(BlockTag::Latest).await?;
        let mut queries = 1;

        if latest.timestamp == target {
            return Ok(Resolution::Exact(latest));
        }
        if latest.timestamp < target || latest.number == 0 {
            log::warn!(
                "timestamp {target} is not before the chain head {} ({}), using the head",
                latest.number,
                latest.timestamp
            );
            return Ok(Resolution::BestEffort {
                block: latest,
                target,
                queries,
            });
        }

        let first_step = (latest.number as f64 * FIRST_STEP_RATIO).ceil() as u64;
        let mut previous = self
            .chain
            .block(BlockTag::Number(latest.number - first_step))
            .await?;
        queries += 1;
        let mut best = latest;
        if previous.timestamp == target {
            return Ok(Resolution::Exact(previous));
        }
        if is_closer(&previous, &best, target) {
            best = previous;
        }

        let mut secs_per_block =
            latest.timestamp.abs_diff(previous.timestamp) as f64 / first_step as f64;
        if secs_per_block == 0.0 {
            secs_per_block = 1.0;
        }

        let mut current = latest;
        let mut step = blocks_between(current.timestamp, target, secs_per_block).max(1);
        let mut upward = false;
        let mut first_iteration = true;

        loop {
            // block 0 is never sampled
            while !upward && step >= current.number {
                if first_iteration && step > 1 {
                    step /= 2;
                } else {
                    upward = true;
                    step = (step / 2).max(1);
                }
            }
            first_iteration = false;

            let candidate = if upward {
                (current.number + step).min(latest.number)
            } else {
                current.number - step
            };
            let sample = self.chain.block(BlockTag::Number(candidate)).await?;
            queries += 1;

            let blocks = sample.number.abs_diff(previous.number);
            if blocks != 0 {
                let rate = sample.timestamp.abs_diff(previous.timestamp) as f64 / blocks as f64;
                if rate != 0.0 {
                    step = blocks_between(sample.timestamp, target, rate);
                }
            }

            current = sample;
            match current.timestamp.cmp(&target) {
                Ordering::Less => upward = true,
                Ordering::Greater => upward = false,
                Ordering::Equal => {
                    log::debug!(
                        "took {queries} queries to find block {} at timestamp {target}",
                        current.number
                    );
                    return Ok(Resolution::Exact(current));
                }
            }
            if is_closer(&current, &best, target) {
                best = current;
            }
            previous = current;

            if started.elapsed() >= self.budget {
                if best.timestamp > target && best.number > 0 {
                    best = self.chain.block(BlockTag::Number(best.number - 1)).await?;
                    queries += 1;
                }
                let resolution = Resolution::BestEffort {
                    block: best,
                    target,
                    queries,
                };
                log::warn!(
                    "could not find the exact block for timestamp {target}: took {queries} queries, closest is block {} ({}), difference {}s",
                    best.number,
                    best.timestamp,
                    resolution.discrepancy()
                );
                return Ok(resolution);
            }
        }
    }

    /// Mean seconds per block over the last `blocks_away` blocks.
    ///
    /// Returns 0 when `blocks_away` is 0.
    pub async fn average_block_time(&self, blocks_away: u64) -> Result<f64> {
        if blocks_away == 0 {
            return Ok(0.0);
        }
        let latest = self.chain.block(BlockTag::Latest).await?;
        let past_number = latest.number.checked_sub(blocks_away).ok_or_else(|| {
            Error::invalid(format!(
                "cannot look {blocks_away} blocks back from block {}",
                latest.number
            ))
        })?;
        let past = self.chain.block(BlockTag::Number(past_number)).await?;
        Ok((latest.timestamp - past.timestamp) as f64 / blocks_away as f64)
    }
}

/// Whether `sample` is a better answer for `target` than `best`.
///
/// Blocks not past the target win over blocks after it. Among those the
/// latest one wins, otherwise the one with the smaller gap.
fn is_closer(sample: &Block, best: &Block, target: u64) -> bool {
    match (sample.timestamp <= target, best.timestamp <= target) {
        (true, true) => sample.timestamp > best.timestamp,
        (true, false) => true,
        (false, true) => false,
        (false, false) => sample.timestamp < best.timestamp,
    }
}

/// Blocks needed to cover the distance between two timestamps, rounded up.
#[inline]
fn blocks_between(from: u64, to: u64, secs_per_block: f64) -> u64 {
    (from.abs_diff(to) as f64 / secs_per_block).ceil() as u64
}
