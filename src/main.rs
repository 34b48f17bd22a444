//! Pairscout - cross-venue pair discovery and flash-loan sizing.
//!
//! Two modes:
//! - `pairscout sync`: crawl every registered factory and persist any
//!   pairs the registry does not hold yet.
//! - `pairscout scan`: pull live reserves for every arbitrage-eligible
//!   token combination and print sized trade recommendations.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use alloy_primitives::Address;
use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use console::style;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod brain;
mod cartographer;
mod config;
mod registry;

use brain::{find_max_buy, Fee, PoolReserves, TradeDetails, TradeRecommendation};
use cartographer::{ChainReader, HttpChainReader, SyncEngine};
use config::Config;
use registry::{CandidateGroup, MarketRegistry, PairRow};

#[derive(Parser)]
#[command(name = "pairscout", about = "Cross-venue pair discovery and flash-loan sizing")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl registered factories and persist newly created pairs
    Sync,
    /// Size flash-loan arbitrage across every eligible pair combination
    Scan,
}

fn print_banner() {
    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!(
        "{}",
        style(" 🔭 PAIRSCOUT - Cross-Venue Pair Discovery & Loan Sizing").cyan().bold()
    );
    println!(
        "{}",
        style("    Constant-Product Venues | SQLite Registry | Closed-Form Sizing").cyan()
    );
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").cyan()
    );
    println!();
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pairscout=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    print_banner();

    let config = Config::from_env()?;
    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        error!("Please check your .env file");
        return Err(e);
    }
    config.print_summary();
    println!();

    match cli.command {
        Commands::Sync => run_sync(&config).await,
        Commands::Scan => run_scan(&config).await,
    }
}

// =============================================
// SYNC
// =============================================

async fn run_sync(config: &Config) -> Result<()> {
    println!("{}", style("═══ SYNC: THE CARTOGRAPHER ═══").blue().bold());
    println!();

    let registry = Arc::new(MarketRegistry::open(&config.db_path)?);
    let reader = Arc::new(HttpChainReader::new(config.rpc_url.clone()));
    let engine = SyncEngine::new(reader, Arc::clone(&registry), config.sync.clone());

    for row in &config.factories {
        engine.register_factory(row).await?;
    }
    let factories = engine.load_all_factories().await?;

    let mut total_registered = 0usize;
    let mut total_failed = 0usize;

    for factory in &factories {
        let address: Address = factory.contract_address.parse()?;
        println!(
            "{}",
            style(format!("Syncing {} ({})...", factory.name, factory.contract_address)).blue()
        );
        let start = Instant::now();

        let report = engine.sync(address).await?;
        total_registered += report.registered;
        total_failed += report.failed;

        println!(
            "{} {}: {} new pairs, {} failed, in {:?}",
            style("✓").green(),
            factory.name,
            report.registered,
            report.failed,
            start.elapsed()
        );
    }

    // Base-asset flags are idempotent updates; tokens synced for the
    // first time in this run get flagged here.
    for address in Config::base_token_addresses() {
        registry.mark_base_asset(address)?;
    }

    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").green()
    );
    println!("{}", style(" ✅ SYNC COMPLETE").green().bold());
    println!("  • Factories crawled: {}", factories.len());
    println!("  • Pairs registered:  {}", total_registered);
    println!("  • Indices failed:    {}", total_failed);
    if total_failed > 0 {
        println!("  • Failed indices are retried automatically on the next sync.");
    }
    Ok(())
}

// =============================================
// SCAN
// =============================================

async fn run_scan(config: &Config) -> Result<()> {
    println!("{}", style("═══ SCAN: THE BRAIN ═══").magenta().bold());
    println!();

    let registry = MarketRegistry::open(&config.db_path)?;
    let reader = HttpChainReader::new(config.rpc_url.clone());

    let groups = registry.candidate_pairs()?;
    println!(
        "{} {} arbitrage-eligible token combinations",
        style("✓").green(),
        groups.len()
    );
    println!();

    let mut scanned = 0usize;
    let mut recommendations = 0usize;

    for group in &groups {
        let Some((base_token, alt_token)) = orient_group(&registry, group)? else {
            warn!(
                token0 = %group.token0_address,
                token1 = %group.token1_address,
                "skipping combination with no flagged base asset"
            );
            continue;
        };

        // Every unordered 2-combination of venues quoting this pair.
        for (i, left) in group.pairs.iter().enumerate() {
            for right in group.pairs.iter().skip(i + 1) {
                scanned += 1;
                match size_combination(
                    &registry, &reader, base_token, alt_token, left, right,
                )
                .await
                {
                    Ok(Some(rec)) => {
                        recommendations += 1;
                        let ticker = registry
                            .pair_ticker(Address::from_str(&left.contract_address)?)?
                            .unwrap_or_else(|| "?/?".to_string());
                        println!(
                            "  {} {} | loan {} {:?} | profit {} {:?}",
                            style("💰").green(),
                            style(&ticker).cyan(),
                            rec.initial_loan,
                            rec.loan_asset,
                            rec.expected_profit,
                            rec.profit_asset
                        );
                        println!("{}", serde_json::to_string(&rec)?);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(
                            left = %left.contract_address,
                            right = %right.contract_address,
                            %e,
                            "combination skipped"
                        );
                    }
                }
            }
        }
    }

    println!();
    println!(
        "{}",
        style("═══════════════════════════════════════════════════════════════").green()
    );
    println!("{}", style(" ✅ SCAN COMPLETE").green().bold());
    println!("  • Combinations sized:  {}", scanned);
    println!("  • Recommendations:     {}", recommendations);
    if recommendations == 0 {
        println!(
            "{}",
            style("  No exploitable spread right now; the venues agree on price.").cyan()
        );
    }
    Ok(())
}

/// Decide which side of the token combination is the base asset.
/// Prefers token0 when both sides are flagged.
fn orient_group(
    registry: &MarketRegistry,
    group: &CandidateGroup,
) -> Result<Option<(Address, Address)>> {
    let token0 = Address::from_str(&group.token0_address)?;
    let token1 = Address::from_str(&group.token1_address)?;

    let token0_is_base = registry.token(token0)?.is_some_and(|t| t.is_base);
    if token0_is_base {
        return Ok(Some((token0, token1)));
    }
    let token1_is_base = registry.token(token1)?.is_some_and(|t| t.is_base);
    if token1_is_base {
        return Ok(Some((token1, token0)));
    }
    Ok(None)
}

/// Fetch live reserves for one venue pair, orient them into base/alt
/// roles and run the sizing pass.
async fn size_combination(
    registry: &MarketRegistry,
    reader: &HttpChainReader,
    base_token: Address,
    alt_token: Address,
    left: &PairRow,
    right: &PairRow,
) -> Result<Option<TradeRecommendation>> {
    let pool_a = fetch_pool(registry, reader, base_token, left).await?;
    let pool_b = fetch_pool(registry, reader, base_token, right).await?;

    let trade = match find_max_buy(&pool_a, &pool_b, true) {
        Ok(trade) => trade,
        Err(e) => {
            info!(
                left = %left.contract_address,
                right = %right.contract_address,
                %e,
                "sizing pass declined the combination"
            );
            TradeDetails::None
        }
    };

    Ok(TradeRecommendation::from_trade(base_token, alt_token, &trade))
}

async fn fetch_pool(
    registry: &MarketRegistry,
    reader: &HttpChainReader,
    base_token: Address,
    pair: &PairRow,
) -> Result<PoolReserves> {
    let address = Address::from_str(&pair.contract_address)?;
    let (reserve0, reserve1) = reader.pair_reserves(address).await?;

    let factory = registry
        .factory(Address::from_str(&pair.factory_address)?)?
        .ok_or_else(|| eyre::eyre!("pair {} references unknown factory", pair.contract_address))?;
    let fee = Fee::from_fraction(factory.fee)
        .map_err(|e| eyre::eyre!("factory {} has invalid fee: {e}", factory.name))?;

    // token0/token1 storage order vs base/alt role order.
    let base_is_token0 = pair.token0_address == registry::address_key(base_token);
    let (base, alt) = if base_is_token0 {
        (reserve0, reserve1)
    } else {
        (reserve1, reserve0)
    };
    Ok(PoolReserves::new(base, alt, fee))
}
