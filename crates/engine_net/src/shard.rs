//! Shard feed and epoch iteration.
//!
//! A shard authority stores the canonical, ordered log of transactions per
//! epoch (tick). [`ShardFeed`] is the client side of its paged query API;
//! [`ShardIterator`] walks that log from a start tick, decodes every
//! transaction through the [`MessageRegistry`], and hands each epoch to a
//! callback as a batch.
//!
//! ```text
//! request(page key = start as u64 BE)
//!   └─ response: [epoch 12, epoch 13, ...] + continuation key
//!        └─ callback(batch, epoch, unix_timestamp)
//! ```

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::NetError;
use crate::message::{MessageId, MessageRegistry, MessageValue};
use crate::transaction::{Transaction, TxHash};

// ── Wire types ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub key: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryTransactionsRequest {
    pub namespace: String,
    pub page: Option<PageRequest>,
}

/// One transaction as stored by the shard: the message ID and the
/// wire-encoded [`Transaction`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxData {
    pub message_id: u64,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Epoch {
    pub epoch: u64,
    pub unix_timestamp: u64,
    pub txs: Vec<TxData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageResponse {
    pub key: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueryTransactionsResponse {
    pub epochs: Vec<Epoch>,
    /// Continuation; absent or empty when the log is exhausted.
    pub page: Option<PageResponse>,
}

/// Client side of a shard authority's transaction log.
pub trait ShardFeed: Send + Sync {
    /// Fetch the page of epochs starting at `request.page`.
    ///
    /// # Errors
    ///
    /// Implementations return [`NetError::Transport`] (or any other
    /// variant) on failure; the iterator propagates it unchanged.
    fn query_transactions(
        &self,
        request: &QueryTransactionsRequest,
    ) -> Result<QueryTransactionsResponse, NetError>;
}

impl<T: ShardFeed + ?Sized> ShardFeed for Arc<T> {
    fn query_transactions(
        &self,
        request: &QueryTransactionsRequest,
    ) -> Result<QueryTransactionsResponse, NetError> {
        (**self).query_transactions(request)
    }
}

/// Page key for a start tick: the tick as 8 big-endian bytes.
#[must_use]
pub fn page_key(tick: u64) -> Vec<u8> {
    tick.to_be_bytes().to_vec()
}

// ── Iterator ────────────────────────────────────────────────────────────────

/// One decoded transaction from an epoch.
#[derive(Clone)]
pub struct TxBatch {
    pub msg_id: MessageId,
    pub msg_value: MessageValue,
    pub tx: Transaction,
    pub hash: TxHash,
}

impl fmt::Debug for TxBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxBatch")
            .field("msg_id", &self.msg_id)
            .field("tx", &self.tx)
            .field("hash", &self.hash)
            .finish_non_exhaustive()
    }
}

pub struct ShardIterator<F> {
    messages: Arc<MessageRegistry>,
    namespace: String,
    feed: F,
}

impl<F: ShardFeed> ShardIterator<F> {
    pub fn new(messages: Arc<MessageRegistry>, namespace: impl Into<String>, feed: F) -> Self {
        Self {
            messages,
            namespace: namespace.into(),
            feed,
        }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Walk the log from `start` (default 0), invoking
    /// `callback(batch, epoch, unix_timestamp)` once per epoch.
    ///
    /// With `stop` set, epochs numbered above `stop` end the iteration
    /// without a callback, and iteration ends after delivering an epoch at or
    /// above `stop`.
    ///
    /// # Errors
    ///
    /// - [`NetError::InvalidRange`] if `start >= stop`, before any request.
    /// - [`NetError::UnknownMessage`] for a transaction whose message is not
    ///   registered.
    /// - [`NetError::Decode`] for a malformed transaction or body.
    /// - Feed and callback errors, unchanged.
    pub fn each<C>(&self, mut callback: C, start: Option<u64>, stop: Option<u64>) -> Result<(), NetError>
    where
        C: FnMut(Vec<TxBatch>, u64, u64) -> anyhow::Result<()>,
    {
        if let (Some(start), Some(stop)) = (start, stop) {
            if start >= stop {
                return Err(NetError::InvalidRange { start, stop });
            }
        }

        let mut request = QueryTransactionsRequest {
            namespace: self.namespace.clone(),
            page: Some(PageRequest {
                key: page_key(start.unwrap_or(0)),
            }),
        };

        loop {
            let response = self.feed.query_transactions(&request)?;
            debug!(epochs = response.epochs.len(), "fetched shard page");

            for epoch in response.epochs {
                if start.is_some_and(|start| epoch.epoch < start) {
                    trace!(epoch = epoch.epoch, "skipping epoch before start");
                    continue;
                }
                if stop.is_some_and(|stop| epoch.epoch > stop) {
                    return Ok(());
                }
                let batch = self.decode_epoch(&epoch)?;
                trace!(epoch = epoch.epoch, txs = batch.len(), "delivering epoch");
                callback(batch, epoch.epoch, epoch.unix_timestamp)?;
                if stop.is_some_and(|stop| epoch.epoch >= stop) {
                    return Ok(());
                }
            }

            match response.page {
                Some(page) if !page.key.is_empty() => {
                    request.page = Some(PageRequest { key: page.key });
                }
                _ => return Ok(()),
            }
        }
    }

    fn decode_epoch(&self, epoch: &Epoch) -> Result<Vec<TxBatch>, NetError> {
        epoch
            .txs
            .iter()
            .map(|data| {
                let entry = self
                    .messages
                    .get_wire(data.message_id)
                    .ok_or(NetError::UnknownMessage(data.message_id))?;
                let tx = Transaction::from_bytes(&data.payload)?;
                let msg_value = entry.decode(&tx.body)?;
                Ok(TxBatch {
                    msg_id: entry.id,
                    msg_value,
                    hash: tx.hash(),
                    tx,
                })
            })
            .collect()
    }
}
