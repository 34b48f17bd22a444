//! The Registry - persisted store of factories, tokens and pairs.
//!
//! SQLite is the single source of truth; everything in memory is a
//! read-through cache rebuildable from here. Addresses are stored as
//! lower-case hex strings, and every pair row references an
//! already-registered factory and two already-registered tokens.
//!
//! Connections are opened per call with a busy timeout; SQLite's own
//! locking plus the unique constraints make concurrent inserts from the
//! sync workers safe without any extra mutex.

use alloy_primitives::Address;
use rusqlite::{params, Connection, ErrorCode};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    /// Unique-constraint conflict: another writer got there first.
    #[error("duplicate registration")]
    Duplicate,
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Lower-case hex key for an address, the registry's canonical form.
pub fn address_key(address: Address) -> String {
    address.to_string().to_lowercase()
}

/// Sort two token addresses into the on-chain token0/token1 convention
/// (lower lexicographic address first).
pub fn address_sort_order(a: Address, b: Address) -> (Address, Address) {
    if address_key(a) < address_key(b) {
        (a, b)
    } else {
        (b, a)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FactoryRow {
    pub name: String,
    pub contract_address: String,
    pub router_address: String,
    pub fee: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TokenRow {
    pub decimals: u8,
    pub name: String,
    pub symbol: String,
    pub contract_address: String,
    pub is_base: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PairRow {
    pub pair_index: u64,
    pub decimals: u8,
    pub token0_address: String,
    pub token1_address: String,
    pub factory_address: String,
    pub contract_address: String,
}

/// Every pair sharing one unordered token combination, across venues.
#[derive(Debug, Clone)]
pub struct CandidateGroup {
    pub token0_address: String,
    pub token1_address: String,
    pub pairs: Vec<PairRow>,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS factories(
    name TEXT UNIQUE,
    contract_address TEXT UNIQUE NOT NULL,
    router_address TEXT UNIQUE NOT NULL,
    fee REAL NOT NULL
);
CREATE TABLE IF NOT EXISTS tokens(
    decimals INTEGER NOT NULL,
    name TEXT NOT NULL,
    symbol TEXT NOT NULL,
    contract_address TEXT UNIQUE NOT NULL,
    is_base INTEGER NOT NULL DEFAULT 0
);
CREATE TABLE IF NOT EXISTS pairs(
    pair_index INTEGER NOT NULL,
    decimals INTEGER NOT NULL,
    token0_address TEXT NOT NULL,
    token1_address TEXT NOT NULL,
    factory_address TEXT NOT NULL,
    contract_address TEXT UNIQUE NOT NULL,
    FOREIGN KEY (factory_address) REFERENCES factories (contract_address),
    FOREIGN KEY (token0_address) REFERENCES tokens (contract_address),
    FOREIGN KEY (token1_address) REFERENCES tokens (contract_address)
);
";

pub struct MarketRegistry {
    db_path: PathBuf,
}

impl MarketRegistry {
    /// Open (and if needed initialise) the registry database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let registry = Self {
            db_path: path.as_ref().to_path_buf(),
        };
        let conn = registry.connect()?;
        conn.execute_batch(SCHEMA)?;
        Ok(registry)
    }

    fn connect(&self) -> Result<Connection, RegistryError> {
        let conn = Connection::open(&self.db_path)?;
        conn.pragma_update(None, "busy_timeout", 200)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(conn)
    }

    // ============================================
    // Factories
    // ============================================

    /// Idempotent: re-registering a known factory address is a no-op.
    pub fn add_factory(&self, row: &FactoryRow) -> Result<(), RegistryError> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT OR IGNORE INTO factories(name, contract_address, router_address, fee)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                row.name,
                row.contract_address.to_lowercase(),
                row.router_address.to_lowercase(),
                row.fee
            ],
        )?;
        Ok(())
    }

    pub fn factory(&self, address: Address) -> Result<Option<FactoryRow>, RegistryError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT name, contract_address, router_address, fee
             FROM factories WHERE contract_address = ?1",
        )?;
        let mut rows = stmt.query_map(params![address_key(address)], factory_from_row)?;
        Ok(rows.next().transpose()?)
    }

    pub fn factories(&self) -> Result<Vec<FactoryRow>, RegistryError> {
        let conn = self.connect()?;
        let mut stmt =
            conn.prepare("SELECT name, contract_address, router_address, fee FROM factories")?;
        let rows = stmt.query_map([], factory_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // ============================================
    // Tokens
    // ============================================

    /// Idempotent: concurrent workers may race on first sighting of a
    /// token, the unique constraint resolves it.
    pub fn add_token(&self, row: &TokenRow) -> Result<(), RegistryError> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT OR IGNORE INTO tokens(decimals, name, symbol, contract_address, is_base)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                row.decimals,
                row.name,
                row.symbol,
                row.contract_address.to_lowercase(),
                row.is_base
            ],
        )?;
        Ok(())
    }

    pub fn token(&self, address: Address) -> Result<Option<TokenRow>, RegistryError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT decimals, name, symbol, contract_address, is_base
             FROM tokens WHERE contract_address = ?1",
        )?;
        let mut rows = stmt.query_map(params![address_key(address)], token_from_row)?;
        Ok(rows.next().transpose()?)
    }

    pub fn token_addresses(&self) -> Result<Vec<String>, RegistryError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT contract_address FROM tokens")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Flag an already-registered token as a recognized base asset.
    pub fn mark_base_asset(&self, address: Address) -> Result<(), RegistryError> {
        let conn = self.connect()?;
        conn.execute(
            "UPDATE tokens SET is_base = 1 WHERE contract_address = ?1",
            params![address_key(address)],
        )?;
        Ok(())
    }

    // ============================================
    // Pairs
    // ============================================

    /// Unlike factories and tokens, a duplicate pair insert is surfaced as
    /// `RegistryError::Duplicate` so the sync layer can log and move on.
    pub fn add_pair(&self, row: &PairRow) -> Result<(), RegistryError> {
        let conn = self.connect()?;
        let result = conn.execute(
            "INSERT INTO pairs(pair_index, decimals, token0_address, token1_address,
                               factory_address, contract_address)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                row.pair_index,
                row.decimals,
                row.token0_address.to_lowercase(),
                row.token1_address.to_lowercase(),
                row.factory_address.to_lowercase(),
                row.contract_address.to_lowercase()
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::ConstraintViolation =>
            {
                Err(RegistryError::Duplicate)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn pair(&self, address: Address) -> Result<Option<PairRow>, RegistryError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT pair_index, decimals, token0_address, token1_address,
                    factory_address, contract_address
             FROM pairs WHERE contract_address = ?1",
        )?;
        let mut rows = stmt.query_map(params![address_key(address)], pair_from_row)?;
        Ok(rows.next().transpose()?)
    }

    /// `(contract_address, pair_index)` for every pair of a factory; feeds
    /// the absent-index computation in the sync layer.
    pub fn pair_indices(&self, factory: Address) -> Result<Vec<(String, u64)>, RegistryError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT contract_address, pair_index FROM pairs WHERE factory_address = ?1",
        )?;
        let rows = stmt.query_map(params![address_key(factory)], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Arbitrage-eligible pairs: token combinations listed on two or more
    /// distinct factories where at least one side is a base asset, grouped
    /// by the unordered token combination.
    pub fn candidate_pairs(&self) -> Result<Vec<CandidateGroup>, RegistryError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT pair_index, decimals, token0_address, token1_address,
                    factory_address, contract_address
             FROM pairs
             WHERE token0_address || ';' || token1_address IN (
                 SELECT token0_address || ';' || token1_address AS slug FROM pairs
                 WHERE token0_address IN (SELECT contract_address FROM tokens WHERE is_base = 1)
                    OR token1_address IN (SELECT contract_address FROM tokens WHERE is_base = 1)
                 GROUP BY slug
                 HAVING COUNT(DISTINCT factory_address) > 1
             )
             ORDER BY token0_address, token1_address",
        )?;
        let rows = stmt.query_map([], pair_from_row)?;

        let mut groups: Vec<CandidateGroup> = Vec::new();
        for row in rows {
            let pair = row?;
            match groups.last_mut() {
                Some(group)
                    if group.token0_address == pair.token0_address
                        && group.token1_address == pair.token1_address =>
                {
                    group.pairs.push(pair);
                }
                _ => groups.push(CandidateGroup {
                    token0_address: pair.token0_address.clone(),
                    token1_address: pair.token1_address.clone(),
                    pairs: vec![pair],
                }),
            }
        }
        Ok(groups)
    }

    /// Human-readable `SYM0/SYM1` label for a pair, for logs and reports.
    pub fn pair_ticker(&self, address: Address) -> Result<Option<String>, RegistryError> {
        let Some(pair) = self.pair(address)? else {
            return Ok(None);
        };
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT group_concat(symbol, '/') FROM tokens
             WHERE contract_address = ?1 OR contract_address = ?2
             ORDER BY contract_address",
        )?;
        let ticker: Option<String> = stmt.query_row(
            params![pair.token0_address, pair.token1_address],
            |row| row.get(0),
        )?;
        Ok(ticker)
    }
}

fn factory_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FactoryRow> {
    Ok(FactoryRow {
        name: row.get(0)?,
        contract_address: row.get(1)?,
        router_address: row.get(2)?,
        fee: row.get(3)?,
    })
}

fn token_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TokenRow> {
    Ok(TokenRow {
        decimals: row.get(0)?,
        name: row.get(1)?,
        symbol: row.get(2)?,
        contract_address: row.get(3)?,
        is_base: row.get(4)?,
    })
}

fn pair_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PairRow> {
    Ok(PairRow {
        pair_index: row.get(0)?,
        decimals: row.get(1)?,
        token0_address: row.get(2)?,
        token1_address: row.get(3)?,
        factory_address: row.get(4)?,
        contract_address: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_registry() -> (TempDir, MarketRegistry) {
        let dir = TempDir::new().expect("tempdir");
        let registry = MarketRegistry::open(dir.path().join("test.db")).expect("open registry");
        (dir, registry)
    }

    fn factory(name: &str, addr: &str, router: &str) -> FactoryRow {
        FactoryRow {
            name: name.to_string(),
            contract_address: addr.to_string(),
            router_address: router.to_string(),
            fee: 0.003,
        }
    }

    fn token(symbol: &str, addr: &str, is_base: bool) -> TokenRow {
        TokenRow {
            decimals: 18,
            name: symbol.to_string(),
            symbol: symbol.to_string(),
            contract_address: addr.to_string(),
            is_base,
        }
    }

    fn pair(index: u64, t0: &str, t1: &str, factory: &str, addr: &str) -> PairRow {
        PairRow {
            pair_index: index,
            decimals: 18,
            token0_address: t0.to_string(),
            token1_address: t1.to_string(),
            factory_address: factory.to_string(),
            contract_address: addr.to_string(),
        }
    }

    const F1: &str = "0x00000000000000000000000000000000000000f1";
    const F2: &str = "0x00000000000000000000000000000000000000f2";
    const R1: &str = "0x00000000000000000000000000000000000000e1";
    const R2: &str = "0x00000000000000000000000000000000000000e2";
    const T0: &str = "0x00000000000000000000000000000000000000a0";
    const T1: &str = "0x00000000000000000000000000000000000000a1";
    const T2: &str = "0x00000000000000000000000000000000000000a2";

    #[test]
    fn factory_registration_is_idempotent() {
        let (_dir, registry) = test_registry();
        registry.add_factory(&factory("Quickswap", F1, R1)).unwrap();
        registry.add_factory(&factory("Quickswap", F1, R1)).unwrap();
        assert_eq!(registry.factories().unwrap().len(), 1);

        let loaded = registry.factory(F1.parse().unwrap()).unwrap().unwrap();
        assert_eq!(loaded.name, "Quickswap");
        assert_eq!(loaded.fee, 0.003);
    }

    #[test]
    fn addresses_are_stored_lower_case() {
        let (_dir, registry) = test_registry();
        registry
            .add_factory(&factory(
                "Quickswap",
                "0x00000000000000000000000000000000000000F1",
                R1,
            ))
            .unwrap();
        let loaded = registry.factory(F1.parse().unwrap()).unwrap().unwrap();
        assert_eq!(loaded.contract_address, F1);
    }

    #[test]
    fn duplicate_pair_is_reported() {
        let (_dir, registry) = test_registry();
        registry.add_factory(&factory("Quickswap", F1, R1)).unwrap();
        registry.add_token(&token("WETH", T0, true)).unwrap();
        registry.add_token(&token("ALT", T1, false)).unwrap();

        let row = pair(0, T0, T1, F1, "0x00000000000000000000000000000000000000aa");
        registry.add_pair(&row).unwrap();
        assert!(matches!(
            registry.add_pair(&row),
            Err(RegistryError::Duplicate)
        ));
    }

    #[test]
    fn pair_indices_are_scoped_to_the_factory() {
        let (_dir, registry) = test_registry();
        registry.add_factory(&factory("Quickswap", F1, R1)).unwrap();
        registry.add_factory(&factory("Comethswap", F2, R2)).unwrap();
        registry.add_token(&token("WETH", T0, true)).unwrap();
        registry.add_token(&token("ALT", T1, false)).unwrap();

        registry
            .add_pair(&pair(0, T0, T1, F1, "0x00000000000000000000000000000000000000b0"))
            .unwrap();
        registry
            .add_pair(&pair(4, T0, T1, F2, "0x00000000000000000000000000000000000000b1"))
            .unwrap();

        let indices = registry.pair_indices(F1.parse().unwrap()).unwrap();
        assert_eq!(indices.len(), 1);
        assert_eq!(indices[0].1, 0);
    }

    #[test]
    fn candidate_pairs_require_two_factories_and_a_base_token() {
        let (_dir, registry) = test_registry();
        registry.add_factory(&factory("Quickswap", F1, R1)).unwrap();
        registry.add_factory(&factory("Comethswap", F2, R2)).unwrap();
        registry.add_token(&token("WETH", T0, true)).unwrap();
        registry.add_token(&token("ALT", T1, false)).unwrap();
        registry.add_token(&token("OTHER", T2, false)).unwrap();

        // Same token combination on both factories, base side flagged.
        registry
            .add_pair(&pair(0, T0, T1, F1, "0x00000000000000000000000000000000000000c0"))
            .unwrap();
        registry
            .add_pair(&pair(0, T0, T1, F2, "0x00000000000000000000000000000000000000c1"))
            .unwrap();
        // Only listed on one factory: not arbitrage-eligible.
        registry
            .add_pair(&pair(1, T0, T2, F1, "0x00000000000000000000000000000000000000c2"))
            .unwrap();
        // Listed twice but with no base asset on either side.
        registry
            .add_pair(&pair(2, T1, T2, F1, "0x00000000000000000000000000000000000000c3"))
            .unwrap();
        registry
            .add_pair(&pair(1, T1, T2, F2, "0x00000000000000000000000000000000000000c4"))
            .unwrap();

        let groups = registry.candidate_pairs().unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].token0_address, T0);
        assert_eq!(groups[0].token1_address, T1);
        assert_eq!(groups[0].pairs.len(), 2);
    }

    #[test]
    fn pair_ticker_joins_symbols() {
        let (_dir, registry) = test_registry();
        registry.add_factory(&factory("Quickswap", F1, R1)).unwrap();
        registry.add_token(&token("WETH", T0, true)).unwrap();
        registry.add_token(&token("USDC", T1, true)).unwrap();
        let addr = "0x00000000000000000000000000000000000000d0";
        registry.add_pair(&pair(0, T0, T1, F1, addr)).unwrap();

        let ticker = registry.pair_ticker(addr.parse().unwrap()).unwrap();
        assert_eq!(ticker.as_deref(), Some("WETH/USDC"));
    }

    #[test]
    fn sort_order_matches_the_onchain_convention() {
        let low: Address = T0.parse().unwrap();
        let high: Address = T1.parse().unwrap();
        assert_eq!(address_sort_order(high, low), (low, high));
        assert_eq!(address_sort_order(low, high), (low, high));
    }
}
