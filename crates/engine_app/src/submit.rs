//! Transaction submission.
//!
//! A [`Submitter`] validates a transaction and, if accepted, queues it on the
//! world's inbox. Queued transactions become visible to systems at the next
//! tick boundary. Checks run in this order and the first failure wins:
//!
//! 1. the message ID is registered;
//! 2. the namespace matches the world's;
//! 3. the signature verifies (when verification is enabled);
//! 4. the creation time lies within one expiration window of "now", in
//!    either direction;
//! 5. the body decodes as the message's input type;
//! 6. the hash has not been accepted inside the replay window.
//!
//! The replay check is last so that a rejected transaction never occupies a
//! replay cache slot. Its entry is dated from the later of arrival and
//! creation time, so a hash stays a duplicate until the transaction itself
//! has gone stale.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use engine_net::{
    MessageId, MessageRegistry, ReplayCache, SignatureVerifier, Transaction, TxBatch, TxHash,
};
use tokio::sync::mpsc;
use tracing::debug;

/// Why a submission was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("message with ID {0} is not registered")]
    UnknownMessage(MessageId),

    #[error("transaction namespace '{got}' does not match world namespace '{expected}'")]
    NamespaceMismatch { expected: String, got: String },

    #[error("invalid signature for persona '{0}'")]
    InvalidSignature(String),

    #[error("transaction created at {timestamp}ms is older than the {window_ms}ms window (now {now}ms)")]
    Stale {
        timestamp: u64,
        now: u64,
        window_ms: u64,
    },

    #[error("transaction created at {timestamp}ms is more than {window_ms}ms ahead (now {now}ms)")]
    FromFuture {
        timestamp: u64,
        now: u64,
        window_ms: u64,
    },

    #[error("transaction {0} was already submitted")]
    Duplicate(TxHash),

    #[error("malformed message body: {0}")]
    Malformed(String),

    #[error("world is no longer accepting transactions")]
    Closed,
}

struct Shared {
    namespace: String,
    messages: Arc<MessageRegistry>,
    verifier: Option<Arc<dyn SignatureVerifier>>,
    replay: ReplayCache,
    expiration_ms: u64,
    inbox: mpsc::UnboundedSender<TxBatch>,
}

/// Cloneable handle for submitting transactions from any thread.
#[derive(Clone)]
pub struct Submitter {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Submitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Submitter")
            .field("namespace", &self.shared.namespace)
            .field("replay_entries", &self.shared.replay.len())
            .finish_non_exhaustive()
    }
}

impl Submitter {
    pub(crate) fn new(
        namespace: String,
        messages: Arc<MessageRegistry>,
        verifier: Option<Arc<dyn SignatureVerifier>>,
        replay: ReplayCache,
        expiration_ms: u64,
        inbox: mpsc::UnboundedSender<TxBatch>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                namespace,
                messages,
                verifier,
                replay,
                expiration_ms,
                inbox,
            }),
        }
    }

    /// Submit `tx` for message `id`, using the wall clock as "now".
    ///
    /// # Errors
    ///
    /// Returns the first [`Rejection`] the transaction fails.
    pub fn submit(&self, id: MessageId, tx: Transaction) -> Result<TxHash, Rejection> {
        self.submit_at(id, tx, now_ms())
    }

    /// Submit `tx` for message `id` as if it arrived at `now_ms`.
    ///
    /// # Errors
    ///
    /// Returns the first [`Rejection`] the transaction fails.
    pub fn submit_at(
        &self,
        id: MessageId,
        tx: Transaction,
        now_ms: u64,
    ) -> Result<TxHash, Rejection> {
        let result = self.validate(id, tx, now_ms);
        match &result {
            Ok(hash) => debug!(msg_id = id.0, %hash, "transaction accepted"),
            Err(reason) => debug!(msg_id = id.0, %reason, "transaction rejected"),
        }
        result
    }

    fn validate(&self, id: MessageId, tx: Transaction, now_ms: u64) -> Result<TxHash, Rejection> {
        let shared = &self.shared;
        let entry = shared
            .messages
            .get(id)
            .ok_or(Rejection::UnknownMessage(id))?;

        if tx.namespace != shared.namespace {
            return Err(Rejection::NamespaceMismatch {
                expected: shared.namespace.clone(),
                got: tx.namespace,
            });
        }

        if let Some(verifier) = &shared.verifier {
            if !verifier.verify(&tx) {
                return Err(Rejection::InvalidSignature(tx.persona_tag));
            }
        }

        if now_ms.saturating_sub(tx.timestamp) >= shared.expiration_ms {
            return Err(Rejection::Stale {
                timestamp: tx.timestamp,
                now: now_ms,
                window_ms: shared.expiration_ms,
            });
        }
        if tx.timestamp.saturating_sub(now_ms) > shared.expiration_ms {
            return Err(Rejection::FromFuture {
                timestamp: tx.timestamp,
                now: now_ms,
                window_ms: shared.expiration_ms,
            });
        }

        let msg_value = entry
            .decode(&tx.body)
            .map_err(|e| Rejection::Malformed(e.to_string()))?;

        let hash = tx.hash();
        if !shared.replay.check_and_insert(hash, now_ms.max(tx.timestamp)) {
            return Err(Rejection::Duplicate(hash));
        }

        shared
            .inbox
            .send(TxBatch {
                msg_id: id,
                msg_value,
                tx,
                hash,
            })
            .map_err(|_| Rejection::Closed)?;
        Ok(hash)
    }
}

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}
