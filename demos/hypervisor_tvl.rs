use clap::Parser;
use gammasdk::{
    Address,
    chain::{BlockTag, RpcChain, ValuationContext, erc20},
    gamma,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Gamma hypervisor address.
    #[arg(
        short,
        long,
        default_value = "0xa3ecb6e941e773c6568052a509a04cf455a752ad"
    )]
    contract_address: Address,
    /// Block to value the vault at, defaults to the chain head.
    #[arg(short, long)]
    block: Option<u64>,
    /// RPC url
    #[arg(short, long, default_value = gammasdk::chain::DEFAULT_RPC_URL)]
    rpc_url: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let _ = simple_logger::init_with_level(log::Level::Debug);
    let args = Cli::parse();

    let client = gamma::Client::mainnet_with_url(&args.rpc_url).await?;
    let rpc = RpcChain::new(client.provider().clone());
    let tag = args.block.map_or(BlockTag::Latest, BlockTag::Number);
    let ctx = ValuationContext::pin(&rpc, tag).await?;

    let hypervisor = args.contract_address;
    let pool = client.pool(hypervisor).await?;
    let (meta0, meta1) = client.tokens(hypervisor).await?;
    let (symbol0, symbol1, fee, tick_spacing, current_tick) = tokio::try_join!(
        erc20::symbol(client.provider(), meta0.address),
        erc20::symbol(client.provider(), meta1.address),
        client.uniswap().fee(pool),
        client.uniswap().tick_spacing(pool),
        client.current_tick(hypervisor, &ctx),
    )?;
    let ranges = client.ranges(hypervisor, &ctx).await?;
    let (base, limit, totals, supply) = tokio::try_join!(
        client.base_position(hypervisor, &ctx),
        client.limit_position(hypervisor, &ctx),
        client.total_amounts(hypervisor, &ctx),
        client.total_supply(hypervisor, &ctx),
    )?;
    let value = client.tvl_price_fees(hypervisor, &ctx).await?;

    println!("Block: {}", ctx.block());
    println!("Pool: {pool} {symbol0}/{symbol1}, fee {fee}, tick spacing {tick_spacing}");
    println!("Current tick: {current_tick}");
    println!(
        "Base: [{}, {}] liquidity {} ({} / {})",
        ranges.base.lower, ranges.base.upper, base.liquidity, base.amount0, base.amount1
    );
    println!(
        "Limit: [{}, {}] liquidity {} ({} / {})",
        ranges.limit.lower, ranges.limit.upper, limit.liquidity, limit.amount0, limit.amount1
    );
    println!("Reported totals: {} / {}", totals.total0, totals.total1);
    println!("Shares: {supply}");
    println!("{}", serde_json::to_string_pretty(&value)?);

    Ok(())
}
