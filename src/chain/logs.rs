//! Paginated event log queries.
//!
//! Providers reject `eth_getLogs` calls spanning too many blocks or returning
//! too many entries, and neither limit is advertised. [`chunks`] splits a
//! block range into consecutive sub-ranges of at most `max_blocks` blocks and
//! [`LogChunker`] streams the logs of each sub-range in order, querying a
//! chunk only once the previous one has been fully consumed.
//!
//! # Example
//!
//! ```no_run
//! use futures::StreamExt;
//! use gammasdk::chain::{self, RpcChain, logs::{EventFilter, LogChunker}};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let rpc = RpcChain::new(chain::mainnet().await?);
//! let filter = EventFilter::new(12_369_621, 13_000_000).address("0x...".parse()?);
//!
//! let mut logs = LogChunker::new(&rpc)
//!     .max_blocks(5_000)
//!     .on_empty_chunk(|progress| println!("{progress}"))
//!     .stream(filter)?;
//! while let Some(log) = logs.next().await {
//!     println!("{:?}", log?.transaction_hash);
//! }
//! # Ok(())
//! # }
//! ```

use alloy::{
    primitives::{Address, B256},
    rpc::types::{Filter, Log},
};
use futures::{
    StreamExt, TryStreamExt,
    stream::{self, BoxStream},
};

use super::ChainReader;
use crate::error::{Error, Result};

/// Default block span of a single `eth_getLogs` query.
pub const DEFAULT_MAX_BLOCKS_PER_CHUNK: u64 = 5_000;

/// A log query over an inclusive block range.
///
/// Empty `addresses` or `topics` match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    /// First block of the range.
    pub from_block: u64,
    /// Last block of the range, inclusive.
    pub to_block: u64,
    /// Emitting contracts.
    pub addresses: Vec<Address>,
    /// Accepted event signatures (topic 0).
    pub topics: Vec<B256>,
}

impl EventFilter {
    /// Filter over `from_block..=to_block`.
    pub fn new(from_block: u64, to_block: u64) -> Self {
        Self {
            from_block,
            to_block,
            ..Default::default()
        }
    }

    /// Adds an emitting contract.
    #[must_use]
    pub fn address(mut self, address: Address) -> Self {
        self.addresses.push(address);
        self
    }

    /// Adds an accepted event signature.
    #[must_use]
    pub fn event_signature(mut self, topic: B256) -> Self {
        self.topics.push(topic);
        self
    }

    /// Number of blocks covered by the range.
    #[must_use]
    pub fn span(&self) -> u64 {
        self.to_block.saturating_sub(self.from_block) + 1
    }

    /// Fails when the range is reversed.
    pub fn validate(&self) -> Result<()> {
        if self.from_block > self.to_block {
            return Err(Error::invalid(format!(
                "from block {} is after to block {}",
                self.from_block, self.to_block
            )));
        }
        Ok(())
    }

    fn with_range(&self, from_block: u64, to_block: u64) -> Self {
        Self {
            from_block,
            to_block,
            addresses: self.addresses.clone(),
            topics: self.topics.clone(),
        }
    }

    /// Converts into an Alloy RPC filter.
    pub fn to_filter(&self) -> Filter {
        let mut filter = Filter::new()
            .from_block(self.from_block)
            .to_block(self.to_block);
        if !self.addresses.is_empty() {
            filter = filter.address(self.addresses.clone());
        }
        if !self.topics.is_empty() {
            filter = filter.event_signature(self.topics.clone());
        }
        filter
    }
}

/// Splits `filter` into consecutive filters of at most `max_blocks` blocks.
///
/// The chunks cover the filter's range exactly, in order, and the last one is
/// clipped to its `to_block`.
pub fn chunks(filter: &EventFilter, max_blocks: u64) -> Result<Chunks> {
    if max_blocks == 0 {
        return Err(Error::invalid("max blocks per chunk must be positive"));
    }
    filter.validate()?;
    Ok(Chunks {
        template: filter.clone(),
        next_from: Some(filter.from_block),
        max_blocks,
    })
}

/// Iterator returned by [`chunks`].
#[derive(Debug, Clone)]
pub struct Chunks {
    template: EventFilter,
    next_from: Option<u64>,
    max_blocks: u64,
}

impl Iterator for Chunks {
    type Item = EventFilter;

    fn next(&mut self) -> Option<Self::Item> {
        let from_block = self.next_from?;
        let to_block = from_block
            .saturating_add(self.max_blocks - 1)
            .min(self.template.to_block);
        self.next_from = (to_block < self.template.to_block).then(|| to_block + 1);
        Some(self.template.with_range(from_block, to_block))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.next_from.map_or(0, |from_block| {
            ((self.template.to_block - from_block) / self.max_blocks + 1) as usize
        });
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Chunks {}

/// Reported for every chunk that returned no logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
#[display("no matches from blocks {from_block} to {to_block} ({remaining} of {total} blocks left)")]
pub struct ChunkProgress {
    /// First block of the empty chunk.
    pub from_block: u64,
    /// Last block of the empty chunk.
    pub to_block: u64,
    /// Blocks left after this chunk.
    pub remaining: u64,
    /// Span of the whole query.
    pub total: u64,
}

type ProgressFn<'a> = Box<dyn FnMut(&ChunkProgress) + Send + 'a>;

/// Streams logs over arbitrarily large ranges, one chunk at a time.
pub struct LogChunker<'a, C> {
    chain: &'a C,
    max_blocks: u64,
    on_empty: Option<ProgressFn<'a>>,
}

impl<'a, C> LogChunker<'a, C>
where
    C: ChainReader,
{
    /// Chunker with [`DEFAULT_MAX_BLOCKS_PER_CHUNK`] blocks per query.
    pub fn new(chain: &'a C) -> Self {
        Self {
            chain,
            max_blocks: DEFAULT_MAX_BLOCKS_PER_CHUNK,
            on_empty: None,
        }
    }

    /// Sets the block span of each query.
    #[must_use]
    pub fn max_blocks(mut self, max_blocks: u64) -> Self {
        self.max_blocks = max_blocks;
        self
    }

    /// Registers a callback invoked for each chunk without logs.
    #[must_use]
    pub fn on_empty_chunk(mut self, callback: impl FnMut(&ChunkProgress) + Send + 'a) -> Self {
        self.on_empty = Some(Box::new(callback));
        self
    }

    /// Returns the logs matching `filter`, lazily.
    ///
    /// Arguments are validated before anything is queried. The stream ends
    /// after the first error; dropping it early leaves the remaining chunks
    /// unqueried.
    pub fn stream(self, filter: EventFilter) -> Result<BoxStream<'a, Result<Log>>> {
        let chunks = chunks(&filter, self.max_blocks)?;
        let state = Scan {
            chain: self.chain,
            chunks,
            on_empty: self.on_empty,
            to_block: filter.to_block,
            total: filter.to_block - filter.from_block,
        };

        let pages = stream::unfold(Some(state), |state| async move {
            let mut state = state?;
            let chunk = state.chunks.next()?;
            match state.chain.logs(&chunk).await {
                Ok(logs) => {
                    if logs.is_empty() {
                        state.report_empty(&chunk);
                    }
                    Some((Ok(logs), Some(state)))
                }
                Err(err) => Some((Err(err), None)),
            }
        });

        Ok(pages
            .map_ok(|logs| stream::iter(logs.into_iter().map(Ok)))
            .try_flatten()
            .boxed())
    }
}

struct Scan<'a, C> {
    chain: &'a C,
    chunks: Chunks,
    on_empty: Option<ProgressFn<'a>>,
    to_block: u64,
    total: u64,
}

impl<C> Scan<'_, C> {
    fn report_empty(&mut self, chunk: &EventFilter) {
        let progress = ChunkProgress {
            from_block: chunk.from_block,
            to_block: chunk.to_block,
            remaining: self.to_block - chunk.to_block,
            total: self.total,
        };
        log::debug!("{progress}");
        if let Some(callback) = self.on_empty.as_mut() {
            callback(&progress);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use alloy::primitives::{address, b256};

    use super::*;
    use crate::chain::testing::SyntheticChain;

    fn ranges(filter: &EventFilter, max_blocks: u64) -> Vec<(u64, u64)> {
        chunks(filter, max_blocks)
            .unwrap()
            .map(|chunk| (chunk.from_block, chunk.to_block))
            .collect()
    }

    #[test]
    fn test_chunks_cover_range() {
        let test_values = [
            (0, 0, 1),
            (0, 9, 1),
            (100, 100, 5_000),
            (100, 10_099, 5_000),
            (100, 10_100, 5_000),
            (12_369_621, 12_400_000, 7_777),
            (5, 17, 4),
        ];
        for (index, (from_block, to_block, max_blocks)) in test_values.into_iter().enumerate() {
            let filter = EventFilter::new(from_block, to_block);
            let ranges = ranges(&filter, max_blocks);

            assert_eq!(ranges.first().unwrap().0, from_block, "failed at {index}");
            assert_eq!(ranges.last().unwrap().1, to_block, "failed at {index}");
            for (from, to) in &ranges {
                assert!(from <= to, "failed at {index}");
                assert!(to - from < max_blocks, "failed at {index}");
            }
            for pair in ranges.windows(2) {
                assert_eq!(pair[0].1 + 1, pair[1].0, "failed at {index}");
            }
            assert_eq!(
                chunks(&filter, max_blocks).unwrap().len(),
                ranges.len(),
                "failed at {index}"
            );
        }
    }

    #[test]
    fn test_chunks_are_clipped() {
        let filter = EventFilter::new(5, 17);
        assert_eq!(ranges(&filter, 4), vec![(5, 8), (9, 12), (13, 16), (17, 17)]);
        assert_eq!(ranges(&filter, 100), vec![(5, 17)]);
    }

    #[test]
    fn test_chunks_keep_addresses_and_topics() {
        let pool = address!("0x8ad599c3a0ff1de082011efddc58f1908eb6e6d8");
        let swap = b256!("0xc42079f94a6350d7e6235f29174924f928cc2ac818eb64fed8004e115fbcca67");
        let filter = EventFilter::new(0, 99).address(pool).event_signature(swap);
        for chunk in chunks(&filter, 10).unwrap() {
            assert_eq!(chunk.addresses, vec![pool]);
            assert_eq!(chunk.topics, vec![swap]);
        }
    }

    #[test]
    fn test_chunks_are_deterministic() {
        let filter = EventFilter::new(1_000, 98_765);
        assert_eq!(ranges(&filter, 333), ranges(&filter, 333));
    }

    #[test]
    fn test_invalid_arguments() {
        assert!(
            chunks(&EventFilter::new(0, 10), 0)
                .unwrap_err()
                .is_invalid_argument()
        );
        assert!(
            chunks(&EventFilter::new(11, 10), 5)
                .unwrap_err()
                .is_invalid_argument()
        );

        let chain = SyntheticChain::constant(100, 12);
        assert!(
            LogChunker::new(&chain)
                .max_blocks(0)
                .stream(EventFilter::new(0, 10))
                .is_err()
        );
        assert!(chain.requested_ranges().is_empty());
    }

    #[test]
    fn test_span() {
        assert_eq!(EventFilter::new(10, 10).span(), 1);
        assert_eq!(EventFilter::new(10, 19).span(), 10);
    }

    #[tokio::test]
    async fn test_stream_yields_logs_in_order() {
        let chain = SyntheticChain::constant(100, 12).with_logs_at([3, 4, 25, 61, 99]);
        let logs: Vec<Log> = LogChunker::new(&chain)
            .max_blocks(10)
            .stream(EventFilter::new(0, 99))
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        let blocks: Vec<u64> = logs.iter().filter_map(|log| log.block_number).collect();
        assert_eq!(blocks, vec![3, 4, 25, 61, 99]);
        assert_eq!(chain.requested_ranges().len(), 10);
    }

    #[tokio::test]
    async fn test_stream_is_lazy() {
        let chain = SyntheticChain::constant(100, 12).with_logs_at([3, 4, 25]);
        let mut logs = LogChunker::new(&chain)
            .max_blocks(10)
            .stream(EventFilter::new(0, 99))
            .unwrap();
        assert!(chain.requested_ranges().is_empty());

        let first = logs.next().await.unwrap().unwrap();
        assert_eq!(first.block_number, Some(3));
        assert_eq!(chain.requested_ranges(), vec![(0, 9)]);

        // the second entry of the first chunk is served without a new query
        logs.next().await.unwrap().unwrap();
        assert_eq!(chain.requested_ranges(), vec![(0, 9)]);

        let third = logs.next().await.unwrap().unwrap();
        assert_eq!(third.block_number, Some(25));
        assert_eq!(chain.requested_ranges(), vec![(0, 9), (10, 19), (20, 29)]);

        drop(logs);
        assert_eq!(chain.requested_ranges().len(), 3);
    }

    #[tokio::test]
    async fn test_progress_reports_empty_chunks() {
        let chain = SyntheticChain::constant(100, 12).with_logs_at([15]);
        let reports = Arc::new(Mutex::new(vec![]));
        let sink = Arc::clone(&reports);
        let logs: Vec<Log> = LogChunker::new(&chain)
            .max_blocks(10)
            .on_empty_chunk(move |progress| sink.lock().unwrap().push(*progress))
            .stream(EventFilter::new(0, 29))
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(logs.len(), 1);

        let reports = reports.lock().unwrap();
        assert_eq!(
            *reports,
            vec![
                ChunkProgress {
                    from_block: 0,
                    to_block: 9,
                    remaining: 20,
                    total: 29
                },
                ChunkProgress {
                    from_block: 20,
                    to_block: 29,
                    remaining: 0,
                    total: 29
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_progress_callback_does_not_change_output() {
        let chain = SyntheticChain::constant(100, 12).with_logs_at([1, 50, 51, 90]);
        let filter = EventFilter::new(0, 99);
        let silent: Vec<Log> = LogChunker::new(&chain)
            .max_blocks(7)
            .stream(filter.clone())
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        let reported: Vec<Log> = LogChunker::new(&chain)
            .max_blocks(7)
            .on_empty_chunk(|_| {})
            .stream(filter)
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(silent, reported);
    }

    #[tokio::test]
    async fn test_stream_stops_on_error() {
        let chain = SyntheticChain::constant(100, 12)
            .with_logs_at([5])
            .failing_from(20);
        let mut logs = LogChunker::new(&chain)
            .max_blocks(10)
            .stream(EventFilter::new(0, 99))
            .unwrap();

        assert_eq!(logs.next().await.unwrap().unwrap().block_number, Some(5));
        assert!(logs.next().await.unwrap().unwrap_err().is_rpc());
        assert!(logs.next().await.is_none());
        assert_eq!(chain.requested_ranges(), vec![(0, 9), (10, 19), (20, 29)]);
    }
}
