//! Market discovery: factory enumeration, chain reads and the sync
//! engine that keeps the registry caught up with what is on chain.

pub mod reader;
pub mod sync;

pub use reader::{ChainError, ChainReader, HttpChainReader, PairMeta, TokenMetadata};
pub use sync::{SyncEngine, SyncError, SyncReport, SyncSettings};
