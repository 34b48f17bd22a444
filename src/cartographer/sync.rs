//! Sync engine - incremental pair discovery across registered factories.
//!
//! For each factory the engine asks the chain how many pairs exist,
//! subtracts the indices the registry already holds, and fans the
//! remainder out to a small pool of workers. Workers share one error
//! budget; exceeding it stops every worker. A failed index is simply
//! left absent and gets picked up by the next sync run.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Address;
use futures::future::join_all;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::brain::Fee;
use crate::cartographer::reader::{ChainError, ChainReader};
use crate::registry::{
    address_key, address_sort_order, FactoryRow, MarketRegistry, PairRow, RegistryError, TokenRow,
};

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("factory {0} is not registered")]
    FactoryNotRegistered(Address),
    #[error("bad factory address: {0}")]
    BadAddress(String),
    #[error("invalid factory fee fraction: {0}")]
    InvalidFee(f64),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Tunables for a sync run. Defaults match what the public RPC
/// endpoints tolerate.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub concurrency: usize,
    pub backoff: Duration,
    pub error_budget: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            concurrency: 5,
            backoff: Duration::from_secs(1),
            error_budget: 100,
        }
    }
}

/// Outcome of one factory crawl.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SyncReport {
    pub registered: usize,
    pub failed: usize,
}

pub struct SyncEngine<R: ChainReader> {
    reader: Arc<R>,
    registry: Arc<MarketRegistry>,
    settings: SyncSettings,
    /// Factories this engine is allowed to crawl. Rebuilt from the
    /// registry by `load_all_factories`.
    factories: RwLock<HashSet<Address>>,
}

impl<R: ChainReader + 'static> SyncEngine<R> {
    pub fn new(reader: Arc<R>, registry: Arc<MarketRegistry>, settings: SyncSettings) -> Arc<Self> {
        Arc::new(Self {
            reader,
            registry,
            settings,
            factories: RwLock::new(HashSet::new()),
        })
    }

    // ============================================
    // Factory management
    // ============================================

    /// Persist a factory and start tracking it. The fee fraction must sit
    /// on the per-mille grid the pool contracts use.
    pub async fn register_factory(&self, row: &FactoryRow) -> Result<(), SyncError> {
        Fee::from_fraction(row.fee).map_err(|_| SyncError::InvalidFee(row.fee))?;
        let address: Address = row
            .contract_address
            .parse()
            .map_err(|_| SyncError::BadAddress(row.contract_address.clone()))?;

        self.registry.add_factory(row)?;
        self.factories.write().await.insert(address);
        info!(factory = %row.name, address = %address_key(address), "factory registered");
        Ok(())
    }

    /// Rebuild the tracked set from everything persisted in the registry.
    pub async fn load_all_factories(&self) -> Result<Vec<FactoryRow>, SyncError> {
        let rows = self.registry.factories()?;
        let mut tracked = self.factories.write().await;
        for row in &rows {
            if let Ok(address) = row.contract_address.parse::<Address>() {
                tracked.insert(address);
            }
        }
        info!(count = rows.len(), "factories loaded");
        Ok(rows)
    }

    async fn ensure_registered(&self, factory: Address) -> Result<(), SyncError> {
        if self.factories.read().await.contains(&factory) {
            Ok(())
        } else {
            Err(SyncError::FactoryNotRegistered(factory))
        }
    }

    // ============================================
    // Discovery
    // ============================================

    /// Factory enumeration positions the registry has no row for yet.
    pub async fn absent_pair_indices(&self, factory: Address) -> Result<Vec<u64>, SyncError> {
        self.ensure_registered(factory).await?;

        let on_chain = self.reader.pair_count(factory).await?;
        let known: HashSet<u64> = self
            .registry
            .pair_indices(factory)?
            .into_iter()
            .map(|(_, index)| index)
            .collect();

        Ok((0..on_chain).filter(|i| !known.contains(i)).collect())
    }

    /// Fetch one pair by factory index and persist it together with any
    /// tokens seen for the first time. Returns `false` when another
    /// worker or run registered the pair first.
    pub async fn register_pair_from_index(
        &self,
        factory: Address,
        index: u64,
    ) -> Result<bool, SyncError> {
        self.ensure_registered(factory).await?;

        let pair = self.reader.pair_at(factory, index).await?;
        let meta = self.reader.pair_meta(pair).await?;
        let (token0, token1) = address_sort_order(meta.token0, meta.token1);

        self.ensure_token(token0).await?;
        self.ensure_token(token1).await?;

        let row = PairRow {
            pair_index: index,
            decimals: meta.decimals,
            token0_address: address_key(token0),
            token1_address: address_key(token1),
            factory_address: address_key(factory),
            contract_address: address_key(pair),
        };
        match self.registry.add_pair(&row) {
            Ok(()) => Ok(true),
            Err(RegistryError::Duplicate) => {
                debug!(pair = %row.contract_address, "pair already registered");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Register a token on first sighting. New tokens come in unflagged;
    /// base assets are marked explicitly at configuration time.
    async fn ensure_token(&self, token: Address) -> Result<(), SyncError> {
        if self.registry.token(token)?.is_some() {
            return Ok(());
        }
        let meta = self.reader.token_metadata(token).await?;
        self.registry.add_token(&TokenRow {
            decimals: meta.decimals,
            name: meta.name,
            symbol: meta.symbol,
            contract_address: address_key(token),
            is_base: false,
        })?;
        Ok(())
    }

    /// Crawl a batch of indices with the configured worker pool. Indices
    /// that fail are counted, not retried; rate limits cost a backoff.
    pub async fn register_pair_batch(
        self: &Arc<Self>,
        factory: Address,
        indices: Vec<u64>,
    ) -> Result<SyncReport, SyncError> {
        self.ensure_registered(factory).await?;
        if indices.is_empty() {
            return Ok(SyncReport::default());
        }

        let queue = Arc::new(Mutex::new(indices.into_iter().collect::<VecDeque<u64>>()));
        let registered = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicUsize::new(0));
        let errors = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::with_capacity(self.settings.concurrency);
        for worker in 0..self.settings.concurrency {
            let engine = Arc::clone(self);
            let queue = Arc::clone(&queue);
            let registered = Arc::clone(&registered);
            let failed = Arc::clone(&failed);
            let errors = Arc::clone(&errors);

            handles.push(tokio::spawn(async move {
                loop {
                    if errors.load(Ordering::Relaxed) > engine.settings.error_budget {
                        warn!(worker, "error budget exhausted, stopping");
                        break;
                    }
                    let Some(index) = queue.lock().await.pop_front() else {
                        break;
                    };

                    match engine.register_pair_from_index(factory, index).await {
                        Ok(true) => {
                            let done = registered.fetch_add(1, Ordering::Relaxed) + 1;
                            if done % 100 == 0 {
                                info!(factory = %address_key(factory), done, "sync progress");
                            }
                        }
                        Ok(false) => {}
                        Err(e) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                            errors.fetch_add(1, Ordering::Relaxed);
                            if matches!(&e, SyncError::Chain(c) if c.is_rate_limit()) {
                                warn!(worker, index, "rate limited, backing off");
                                tokio::time::sleep(engine.settings.backoff).await;
                            } else {
                                error!(worker, index, %e, "pair registration failed");
                            }
                        }
                    }
                }
            }));
        }
        join_all(handles).await;

        Ok(SyncReport {
            registered: registered.load(Ordering::Relaxed),
            failed: failed.load(Ordering::Relaxed),
        })
    }

    /// Full incremental crawl of one factory.
    pub async fn sync(self: &Arc<Self>, factory: Address) -> Result<SyncReport, SyncError> {
        let absent = self.absent_pair_indices(factory).await?;
        info!(
            factory = %address_key(factory),
            absent = absent.len(),
            "starting factory sync"
        );
        let report = self.register_pair_batch(factory, absent).await?;
        info!(
            factory = %address_key(factory),
            registered = report.registered,
            failed = report.failed,
            "factory sync finished"
        );
        Ok(report)
    }
}
