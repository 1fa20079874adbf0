//! Transaction receipts.
//!
//! Every message a system handles yields one [`Receipt`] carrying either the
//! encoded reply or the handler's error. Receipts are grouped by the tick
//! that produced them and kept for a trailing window of ticks.

use std::collections::{BTreeMap, HashMap};

use engine_net::{MessageId, TxHash};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub message_id: MessageId,
    /// MessagePack-encoded reply; decode with `MessageType::decode_reply`.
    pub reply: Option<Vec<u8>>,
    pub errors: Vec<String>,
}

impl Receipt {
    pub(crate) fn success(tx_hash: TxHash, message_id: MessageId, reply: Vec<u8>) -> Self {
        Self {
            tx_hash,
            message_id,
            reply: Some(reply),
            errors: Vec::new(),
        }
    }

    pub(crate) fn failure(tx_hash: TxHash, message_id: MessageId, error: String) -> Self {
        Self {
            tx_hash,
            message_id,
            reply: None,
            errors: vec![error],
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Receipts of the last `size` ticks.
#[derive(Debug)]
pub struct ReceiptHistory {
    size: u64,
    ticks: BTreeMap<u64, Vec<Receipt>>,
    by_hash: HashMap<TxHash, (u64, usize)>,
}

impl ReceiptHistory {
    /// A history retaining `size` ticks (at least one).
    #[must_use]
    pub fn new(size: u64) -> Self {
        Self {
            size: size.max(1),
            ticks: BTreeMap::new(),
            by_hash: HashMap::new(),
        }
    }

    /// Store the receipts of `tick` and drop ticks that fell out of the
    /// window.
    pub fn record(&mut self, tick: u64, receipts: Vec<Receipt>) {
        for (i, receipt) in receipts.iter().enumerate() {
            self.by_hash.insert(receipt.tx_hash, (tick, i));
        }
        self.ticks.insert(tick, receipts);

        let oldest_kept = (tick + 1).saturating_sub(self.size);
        let kept = self.ticks.split_off(&oldest_kept);
        let expired = std::mem::replace(&mut self.ticks, kept);
        for receipts in expired.values() {
            for receipt in receipts {
                if self
                    .by_hash
                    .get(&receipt.tx_hash)
                    .is_some_and(|(t, _)| *t < oldest_kept)
                {
                    self.by_hash.remove(&receipt.tx_hash);
                }
            }
        }
    }

    /// Receipts produced by `tick`, if it is inside the window.
    #[must_use]
    pub fn for_tick(&self, tick: u64) -> Option<&[Receipt]> {
        self.ticks.get(&tick).map(Vec::as_slice)
    }

    /// The most recent receipt for `hash`, if inside the window.
    #[must_use]
    pub fn get(&self, hash: &TxHash) -> Option<&Receipt> {
        let (tick, index) = self.by_hash.get(hash)?;
        self.ticks.get(tick)?.get(*index)
    }

    /// Oldest tick still held.
    #[must_use]
    pub fn oldest_tick(&self) -> Option<u64> {
        self.ticks.keys().next().copied()
    }

    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.size
    }
}
