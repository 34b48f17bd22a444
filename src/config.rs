//! Runtime configuration.
//!
//! Everything comes from environment variables (with a `.env` file
//! honored) and falls back to the Polygon defaults the project was
//! built around. The venue list can additionally be overridden with a
//! TOML file via `FACTORIES_FILE`.

use alloy_primitives::Address;
use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::cartographer::SyncSettings;
use crate::registry::FactoryRow;

// ============================================
// KNOWN VENUES AND BASE ASSETS
// ============================================

/// Default venue set: the two Polygon constant-product exchanges the
/// crawler was written against.
pub fn default_factories() -> Vec<FactoryRow> {
    vec![
        FactoryRow {
            name: "Quickswap".to_string(),
            contract_address: "0x5757371414417b8C6CAad45bAeF941aBc7d3Ab32".to_string(),
            router_address: "0xa5E0829CaCEd8fFDD4De3c43696c57F7D7A678ff".to_string(),
            fee: 0.003,
        },
        FactoryRow {
            name: "Comethswap".to_string(),
            contract_address: "0x800b052609c355cA8103E06F022aA30647eAd60a".to_string(),
            router_address: "0x7dd75252cc324FD181fC4e79335b7d78A11a8019".to_string(),
            fee: 0.003,
        },
    ]
}

/// High-liquidity tokens a flash loan can realistically be taken in.
/// `(symbol, address)` pairs; every synced token matching one of these
/// addresses is flagged as a base asset.
pub const BASE_TOKENS: &[(&str, &str)] = &[
    ("MATIC", "0x0000000000000000000000000000000000001010"),
    ("WETH", "0x7ceB23fD6bC0adD59E62ac25578270cFf1b9f619"),
    ("USDC", "0x2791Bca1f2de4661ED88A30C99A7a9449Aa84174"),
    ("USDT", "0xc2132D05D31c914a87C6611C10748AEb04B58e8F"),
    ("DAI", "0x8f3Cf7ad23Cd3CaDbD9735AFf958023239c6A063"),
    ("BUSD", "0xdAb529f40E671A1D4bF91361c21bf9f0C9712ab7"),
];

/// Optional TOML override for the venue list.
#[derive(Debug, Deserialize, Serialize)]
pub struct FactoriesFile {
    pub factories: Vec<FactoryEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct FactoryEntry {
    pub name: String,
    pub contract_address: String,
    pub router_address: String,
    pub fee: f64,
}

impl From<FactoryEntry> for FactoryRow {
    fn from(entry: FactoryEntry) -> Self {
        FactoryRow {
            name: entry.name,
            contract_address: entry.contract_address,
            router_address: entry.router_address,
            fee: entry.fee,
        }
    }
}

// ============================================
// MAIN CONFIGURATION
// ============================================

#[derive(Debug, Clone)]
pub struct Config {
    /// JSON-RPC endpoint for all chain reads.
    pub rpc_url: String,

    /// SQLite registry location.
    pub db_path: String,

    /// Venues to crawl and scan.
    pub factories: Vec<FactoryRow>,

    /// Worker-pool tunables for the sync engine.
    pub sync: SyncSettings,
}

impl Config {
    /// Load configuration from environment variables and a `.env` file.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let factories = match env::var("FACTORIES_FILE") {
            Ok(path) => Self::load_factories_file(&path)
                .wrap_err_with(|| format!("failed to load factories from {path}"))?,
            Err(_) => default_factories(),
        };

        Ok(Self {
            rpc_url: env::var("RPC_URL")
                .unwrap_or_else(|_| "https://polygon-rpc.com".to_string()),
            db_path: env::var("DB_PATH").unwrap_or_else(|_| "./pairscout.db".to_string()),
            factories,
            sync: SyncSettings {
                concurrency: env::var("SYNC_CONCURRENCY")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
                backoff: Duration::from_millis(
                    env::var("SYNC_BACKOFF_MS")
                        .unwrap_or_else(|_| "1000".to_string())
                        .parse()
                        .unwrap_or(1000),
                ),
                error_budget: env::var("SYNC_ERROR_BUDGET")
                    .unwrap_or_else(|_| "100".to_string())
                    .parse()
                    .unwrap_or(100),
            },
        })
    }

    fn load_factories_file<P: AsRef<Path>>(path: P) -> Result<Vec<FactoryRow>> {
        let content = fs::read_to_string(path)?;
        let file: FactoriesFile = toml::from_str(&content)?;
        Ok(file.factories.into_iter().map(Into::into).collect())
    }

    /// Addresses of the recognized base assets.
    pub fn base_token_addresses() -> Vec<Address> {
        BASE_TOKENS
            .iter()
            .filter_map(|(_, addr)| Address::from_str(addr).ok())
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.rpc_url.is_empty() || self.rpc_url.contains("YOUR_API_KEY") {
            return Err(eyre::eyre!("Invalid RPC_URL - set a real endpoint"));
        }
        if self.factories.len() < 2 {
            return Err(eyre::eyre!(
                "Need at least two venues to arbitrage between (got {})",
                self.factories.len()
            ));
        }
        if self.sync.concurrency == 0 {
            return Err(eyre::eyre!("SYNC_CONCURRENCY must be at least 1"));
        }
        for factory in &self.factories {
            factory
                .contract_address
                .parse::<Address>()
                .map_err(|_| eyre::eyre!("Bad factory address: {}", factory.contract_address))?;
        }
        Ok(())
    }

    /// Print configuration summary.
    pub fn print_summary(&self) {
        println!("╔════════════════════════════════════════════════════════════╗");
        println!("║               PAIRSCOUT - CONFIGURATION                    ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ RPC URL:           {:<40}║", truncate(&self.rpc_url, 40));
        println!("║ Registry DB:       {:<40}║", truncate(&self.db_path, 40));
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ VENUES                                                     ║");
        for factory in &self.factories {
            println!(
                "║ • {:<12} fee {:<5} {:<38}║",
                factory.name,
                factory.fee,
                truncate(&factory.contract_address, 38)
            );
        }
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ SYNC                                                       ║");
        println!("║ • Workers:         {:<40}║", self.sync.concurrency);
        println!("║ • Backoff:         {:<40}║", format!("{:?}", self.sync.backoff));
        println!("║ • Error Budget:    {:<40}║", self.sync.error_budget);
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_url: "https://polygon-rpc.com".to_string(),
            db_path: "./pairscout.db".to_string(),
            factories: default_factories(),
            sync: SyncSettings::default(),
        }
    }
}

fn truncate(s: &str, width: usize) -> String {
    if s.len() <= width {
        format!("{s:<width$}")
    } else {
        format!("{}...", &s[..width.saturating_sub(3)])
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.factories.len(), 2);
        assert_eq!(config.sync.concurrency, 5);
    }

    #[test]
    fn base_tokens_all_parse() {
        assert_eq!(Config::base_token_addresses().len(), BASE_TOKENS.len());
    }

    #[test]
    fn factories_file_round_trip() {
        let toml = r#"
            [[factories]]
            name = "Quickswap"
            contract_address = "0x5757371414417b8C6CAad45bAeF941aBc7d3Ab32"
            router_address = "0xa5E0829CaCEd8fFDD4De3c43696c57F7D7A678ff"
            fee = 0.003
        "#;
        let file: FactoriesFile = toml::from_str(toml).unwrap();
        assert_eq!(file.factories.len(), 1);
        let row: FactoryRow = file.factories.into_iter().next().unwrap().into();
        assert_eq!(row.name, "Quickswap");
        assert_eq!(row.fee, 0.003);
    }

    #[test]
    fn lone_venue_fails_validation() {
        let mut config = Config::default();
        config.factories.truncate(1);
        assert!(config.validate().is_err());
    }
}
