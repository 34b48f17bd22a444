//! Chain reader - the read-only slice of the factory/pair/ERC-20 surface.
//!
//! Everything the crawler needs from the chain goes through the
//! `ChainReader` trait so the sync engine can be driven by a mock in
//! tests. The live implementation issues plain `eth_call`s; no signing,
//! no transactions.

use alloy_primitives::{Address, Bytes, U256};
use alloy_provider::{Provider, ProviderBuilder};
use alloy_rpc_types::TransactionRequest;
use alloy_sol_types::{sol, SolCall};
use async_trait::async_trait;
use thiserror::Error;
use tokio::try_join;

sol! {
    interface IUniswapV2Factory {
        function allPairsLength() external view returns (uint256);
        function allPairs(uint256 index) external view returns (address pair);
    }

    interface IUniswapV2Pair {
        function token0() external view returns (address);
        function token1() external view returns (address);
        function decimals() external view returns (uint8);
        function getReserves() external view returns (uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast);
    }

    interface IErc20 {
        function decimals() external view returns (uint8);
        function name() external view returns (string);
        function symbol() external view returns (string);
    }
}

#[derive(Debug, Error)]
pub enum ChainError {
    /// Upstream throttling; worth a backoff and another try.
    #[error("upstream rate limit")]
    RateLimited,
    #[error("rpc error: {0}")]
    Rpc(String),
    #[error("abi decode error: {0}")]
    Decode(String),
}

impl ChainError {
    /// Sort an opaque transport failure into the retryable bucket or not.
    /// Providers disagree on how they spell throttling, so this matches
    /// the common shapes.
    pub(crate) fn classify(message: String) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("429")
            || lower.contains("rate limit")
            || lower.contains("too many requests")
        {
            ChainError::RateLimited
        } else {
            ChainError::Rpc(message)
        }
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, ChainError::RateLimited)
    }
}

/// Static facts about a pair contract.
#[derive(Debug, Clone, Copy)]
pub struct PairMeta {
    pub decimals: u8,
    pub token0: Address,
    pub token1: Address,
}

/// ERC-20 metadata, fetched once per token on first sighting.
#[derive(Debug, Clone)]
pub struct TokenMetadata {
    pub decimals: u8,
    pub name: String,
    pub symbol: String,
}

#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Total number of pairs the factory has ever created.
    async fn pair_count(&self, factory: Address) -> Result<u64, ChainError>;

    /// Pair contract address at the factory's enumeration position.
    async fn pair_at(&self, factory: Address, index: u64) -> Result<Address, ChainError>;

    /// decimals/token0/token1 of a pair. Implementations fetch the three
    /// concurrently; if any read fails the whole operation fails.
    async fn pair_meta(&self, pair: Address) -> Result<PairMeta, ChainError>;

    /// Current `(reserve0, reserve1)` in token0/token1 order.
    async fn pair_reserves(&self, pair: Address) -> Result<(U256, U256), ChainError>;

    async fn token_metadata(&self, token: Address) -> Result<TokenMetadata, ChainError>;
}

/// Live reader over an HTTP JSON-RPC endpoint.
pub struct HttpChainReader {
    rpc_url: String,
}

impl HttpChainReader {
    pub fn new(rpc_url: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
        }
    }

    async fn eth_call(&self, to: Address, calldata: Vec<u8>) -> Result<Bytes, ChainError> {
        let provider = ProviderBuilder::new().connect_http(
            self.rpc_url
                .parse()
                .map_err(|e| ChainError::Rpc(format!("invalid rpc url: {e}")))?,
        );

        let tx = TransactionRequest::default().to(to).input(calldata.into());

        provider
            .call(tx)
            .await
            .map_err(|e| ChainError::classify(e.to_string()))
    }

    async fn token0_of(&self, pair: Address) -> Result<Address, ChainError> {
        let data = self
            .eth_call(pair, IUniswapV2Pair::token0Call {}.abi_encode())
            .await?;
        IUniswapV2Pair::token0Call::abi_decode_returns(&data)
            .map_err(|e| ChainError::Decode(e.to_string()))
    }

    async fn token1_of(&self, pair: Address) -> Result<Address, ChainError> {
        let data = self
            .eth_call(pair, IUniswapV2Pair::token1Call {}.abi_encode())
            .await?;
        IUniswapV2Pair::token1Call::abi_decode_returns(&data)
            .map_err(|e| ChainError::Decode(e.to_string()))
    }

    async fn pair_decimals(&self, pair: Address) -> Result<u8, ChainError> {
        let data = self
            .eth_call(pair, IUniswapV2Pair::decimalsCall {}.abi_encode())
            .await?;
        IUniswapV2Pair::decimalsCall::abi_decode_returns(&data)
            .map_err(|e| ChainError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ChainReader for HttpChainReader {
    async fn pair_count(&self, factory: Address) -> Result<u64, ChainError> {
        let data = self
            .eth_call(factory, IUniswapV2Factory::allPairsLengthCall {}.abi_encode())
            .await?;
        let count = IUniswapV2Factory::allPairsLengthCall::abi_decode_returns(&data)
            .map_err(|e| ChainError::Decode(e.to_string()))?;
        u64::try_from(count).map_err(|_| ChainError::Decode("pair count exceeds u64".into()))
    }

    async fn pair_at(&self, factory: Address, index: u64) -> Result<Address, ChainError> {
        let call = IUniswapV2Factory::allPairsCall {
            index: U256::from(index),
        };
        let data = self.eth_call(factory, call.abi_encode()).await?;
        IUniswapV2Factory::allPairsCall::abi_decode_returns(&data)
            .map_err(|e| ChainError::Decode(e.to_string()))
    }

    async fn pair_meta(&self, pair: Address) -> Result<PairMeta, ChainError> {
        let (decimals, token0, token1) = try_join!(
            self.pair_decimals(pair),
            self.token0_of(pair),
            self.token1_of(pair),
        )?;
        Ok(PairMeta {
            decimals,
            token0,
            token1,
        })
    }

    async fn pair_reserves(&self, pair: Address) -> Result<(U256, U256), ChainError> {
        let data = self
            .eth_call(pair, IUniswapV2Pair::getReservesCall {}.abi_encode())
            .await?;
        let reserves = IUniswapV2Pair::getReservesCall::abi_decode_returns(&data)
            .map_err(|e| ChainError::Decode(e.to_string()))?;
        Ok((
            U256::from(reserves.reserve0.to::<u128>()),
            U256::from(reserves.reserve1.to::<u128>()),
        ))
    }

    async fn token_metadata(&self, token: Address) -> Result<TokenMetadata, ChainError> {
        let decimals = async {
            let data = self
                .eth_call(token, IErc20::decimalsCall {}.abi_encode())
                .await?;
            IErc20::decimalsCall::abi_decode_returns(&data)
                .map_err(|e| ChainError::Decode(e.to_string()))
        };
        let name = async {
            let data = self.eth_call(token, IErc20::nameCall {}.abi_encode()).await?;
            IErc20::nameCall::abi_decode_returns(&data)
                .map_err(|e| ChainError::Decode(e.to_string()))
        };
        let symbol = async {
            let data = self
                .eth_call(token, IErc20::symbolCall {}.abi_encode())
                .await?;
            IErc20::symbolCall::abi_decode_returns(&data)
                .map_err(|e| ChainError::Decode(e.to_string()))
        };

        let (decimals, name, symbol) = try_join!(decimals, name, symbol)?;
        Ok(TokenMetadata {
            decimals,
            name,
            symbol,
        })
    }
}
