use alloy::sol_types::SolEvent;
use clap::Parser;
use futures::TryStreamExt;
use gammasdk::{
    Address,
    chain::{
        self, BlockTag, ChainReader, RpcChain,
        logs::{DEFAULT_MAX_BLOCKS_PER_CHUNK, EventFilter, LogChunker},
    },
    uniswap::contracts::IUniswapV3Pool,
};
use indicatif::ProgressBar;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Uniswap V3 pool address.
    #[arg(
        short,
        long,
        default_value = "0x8ad599c3A0ff1De082011EFDDc58f1908eb6e6D8"
    )]
    contract_address: Address,
    /// First block to scan.
    #[arg(short, long, default_value_t = 12_370_624)]
    from_block: u64,
    /// Last block to scan, defaults to the chain head.
    #[arg(short, long)]
    to_block: Option<u64>,
    /// Blocks per eth_getLogs query.
    #[arg(short, long, default_value_t = DEFAULT_MAX_BLOCKS_PER_CHUNK)]
    max_blocks: u64,
    /// RPC url
    #[arg(short, long, default_value = chain::DEFAULT_RPC_URL)]
    rpc_url: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let _ = simple_logger::init_with_level(log::Level::Info);
    let args = Cli::parse();

    let rpc = RpcChain::new(chain::mainnet_with_url(&args.rpc_url).await?);
    let to_block = match args.to_block {
        Some(to_block) => to_block,
        None => rpc.block(BlockTag::Latest).await?.number,
    };

    let filter = EventFilter::new(args.from_block, to_block)
        .address(args.contract_address)
        .event_signature(IUniswapV3Pool::Swap::SIGNATURE_HASH);

    let pb = ProgressBar::new(filter.span());
    let empty_pb = pb.clone();
    let from_block = args.from_block;

    let mut logs = LogChunker::new(&rpc)
        .max_blocks(args.max_blocks)
        .on_empty_chunk(move |progress| empty_pb.set_position(progress.to_block - from_block))
        .stream(filter)?;

    let mut swaps = 0u64;
    let mut last_tick = None;
    while let Some(log) = logs.try_next().await? {
        let swap = IUniswapV3Pool::Swap::decode_log(&log.inner)?;
        if let Some(block) = log.block_number {
            pb.set_position(block - from_block);
        }
        swaps += 1;
        last_tick = Some(swap.tick);
    }
    pb.finish();

    println!("Swaps: {swaps}");
    if let Some(tick) = last_tick {
        println!("Last tick: {tick}");
    }

    Ok(())
}
