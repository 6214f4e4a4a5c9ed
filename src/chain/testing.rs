//! In-memory chain used by unit tests.

use std::{
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use alloy::{primitives::Address, rpc::types::Log, transports::TransportErrorKind};

use super::{Block, BlockTag, ChainReader, logs::EventFilter};
use crate::error::{Error, Result};

pub(crate) const GENESIS_TIMESTAMP: u64 = 1_600_000_000;

/// A chain whose blocks and logs live in vectors.
#[derive(Debug, Default)]
pub(crate) struct SyntheticChain {
    timestamps: Vec<u64>,
    /// Block numbers that carry exactly one log each.
    log_blocks: Vec<u64>,
    /// Ranges requested through `logs`, in call order.
    pub(crate) log_requests: Mutex<Vec<(u64, u64)>>,
    pub(crate) block_requests: AtomicUsize,
    /// Block numbers served by `block`, in call order.
    sampled: Mutex<Vec<u64>>,
    /// Simulated round trip of a `block` call.
    latency: Duration,
    /// `logs` fails for any range starting at or after this block.
    fail_from: Option<u64>,
}

impl SyntheticChain {
    /// Blocks `0..=head` produced every `block_time` seconds.
    pub(crate) fn constant(head: u64, block_time: u64) -> Self {
        Self::from_timestamps(
            (0..=head)
                .map(|n| GENESIS_TIMESTAMP + n * block_time)
                .collect(),
        )
    }

    pub(crate) fn from_timestamps(timestamps: Vec<u64>) -> Self {
        Self {
            timestamps,
            ..Default::default()
        }
    }

    pub(crate) fn with_logs_at(mut self, blocks: impl IntoIterator<Item = u64>) -> Self {
        self.log_blocks = blocks.into_iter().collect();
        self
    }

    pub(crate) fn failing_from(mut self, block: u64) -> Self {
        self.fail_from = Some(block);
        self
    }

    pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub(crate) fn timestamp(&self, number: u64) -> u64 {
        self.timestamps[number as usize]
    }

    pub(crate) fn requested_ranges(&self) -> Vec<(u64, u64)> {
        self.log_requests.lock().unwrap().clone()
    }

    pub(crate) fn sampled_blocks(&self) -> Vec<Block> {
        self.sampled
            .lock()
            .unwrap()
            .iter()
            .map(|&number| Block {
                number,
                timestamp: self.timestamp(number),
            })
            .collect()
    }
}

impl ChainReader for SyntheticChain {
    async fn block(&self, tag: BlockTag) -> Result<Block> {
        self.block_requests.fetch_add(1, Ordering::Relaxed);
        let head = self.timestamps.len() as u64 - 1;
        let number = match tag {
            BlockTag::Latest => head,
            BlockTag::Number(number) if number <= head => number,
            BlockTag::Number(_) => return Err(Error::NotFound(tag)),
        };
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.sampled.lock().unwrap().push(number);
        Ok(Block {
            number,
            timestamp: self.timestamp(number),
        })
    }

    async fn logs(&self, filter: &EventFilter) -> Result<Vec<Log>> {
        self.log_requests
            .lock()
            .unwrap()
            .push((filter.from_block, filter.to_block));
        if self.fail_from.is_some_and(|block| filter.from_block >= block) {
            return Err(Error::Rpc(TransportErrorKind::custom_str(
                "query returned more than 10000 results",
            )));
        }
        Ok(self
            .log_blocks
            .iter()
            .filter(|n| (filter.from_block..=filter.to_block).contains(*n))
            .map(|&n| Log {
                block_number: Some(n),
                inner: alloy::primitives::Log {
                    address: filter.addresses.first().copied().unwrap_or(Address::ZERO),
                    data: Default::default(),
                },
                ..Default::default()
            })
            .collect())
    }
}
