//! # engine_net
//!
//! Message ingestion plumbing for the ECS engine.
//!
//! This crate provides:
//!
//! - [`message`]: Message IDs, typed message handles and the message registry.
//! - [`transaction`]: The signed transaction envelope and its content hash.
//! - [`replay`]: The bounded, expiring replay-protection cache.
//! - [`signature`]: The signature verification contract.
//! - [`shard`]: The shard feed contract and the epoch iterator over it.
//! - [`codec`]: MessagePack serialisation/deserialisation helpers.
//! - [`error`]: Network-layer error types.

pub mod codec;
pub mod error;
pub mod message;
pub mod replay;
pub mod shard;
pub mod signature;
pub mod transaction;

pub use codec::{decode, encode};
pub use error::NetError;
pub use message::{MessageEntry, MessageId, MessageRegistry, MessageType, MessageValue};
pub use replay::ReplayCache;
pub use shard::{
    Epoch, PageRequest, PageResponse, QueryTransactionsRequest, QueryTransactionsResponse,
    ShardFeed, ShardIterator, TxBatch, TxData,
};
pub use signature::{AcceptAll, SignatureVerifier};
pub use transaction::{Transaction, TxHash};
