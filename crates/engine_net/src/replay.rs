//! Replay protection.
//!
//! [`ReplayCache`] remembers the hash of every accepted transaction for one
//! expiration window. A hash seen again inside the window is a replay; once
//! the window has passed the entry no longer counts and the same bytes are
//! accepted again.
//!
//! Memory is bounded: each entry is charged [`ENTRY_COST_BYTES`] against the
//! configured capacity and, when full, the oldest insertion is evicted first.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{trace, warn};

use crate::transaction::TxHash;

/// Smallest capacity the cache accepts, in KiB.
pub const MIN_CAPACITY_KB: usize = 512;

/// Bytes charged per entry: the 32-byte hash, the 8-byte arrival time, and
/// bookkeeping in both the map and the eviction queue.
pub const ENTRY_COST_BYTES: usize = 96;

#[derive(Debug)]
pub struct ReplayCache {
    entries: DashMap<TxHash, u64>,
    order: Mutex<VecDeque<(TxHash, u64)>>,
    max_entries: usize,
    ttl_ms: u64,
}

impl ReplayCache {
    /// Create a cache holding up to `capacity_kb` KiB of entries, each valid
    /// for `expiration` after arrival. Capacities below
    /// [`MIN_CAPACITY_KB`] are raised to it.
    #[must_use]
    pub fn new(capacity_kb: usize, expiration: Duration) -> Self {
        let capacity_kb = if capacity_kb < MIN_CAPACITY_KB {
            warn!(
                requested = capacity_kb,
                minimum = MIN_CAPACITY_KB,
                "replay cache capacity below minimum, clamping"
            );
            MIN_CAPACITY_KB
        } else {
            capacity_kb
        };
        Self {
            entries: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            max_entries: capacity_kb * 1024 / ENTRY_COST_BYTES,
            ttl_ms: u64::try_from(expiration.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Record `hash` as arriving at `now_ms`. Returns `true` if it was
    /// accepted, `false` if it is a replay of a live entry.
    ///
    /// Concurrent calls with the same hash accept exactly one.
    pub fn check_and_insert(&self, hash: TxHash, now_ms: u64) -> bool {
        match self.entries.entry(hash) {
            Entry::Occupied(mut occupied) => {
                if now_ms.saturating_sub(*occupied.get()) < self.ttl_ms {
                    trace!(%hash, "replay rejected");
                    return false;
                }
                occupied.insert(now_ms);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(now_ms);
            }
        }
        self.enqueue(hash, now_ms);
        true
    }

    /// Returns `true` if `hash` would be rejected at `now_ms`.
    #[must_use]
    pub fn contains(&self, hash: &TxHash, now_ms: u64) -> bool {
        self.entries
            .get(hash)
            .is_some_and(|arrived| now_ms.saturating_sub(*arrived) < self.ttl_ms)
    }

    /// Number of stored entries, expired ones included until evicted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries held at once.
    #[must_use]
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    fn enqueue(&self, hash: TxHash, arrived: u64) {
        let mut order = match self.order.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        order.push_back((hash, arrived));
        while self.entries.len() > self.max_entries {
            let Some((oldest, at)) = order.pop_front() else {
                break;
            };
            // A re-accepted hash leaves a stale queue record behind; only the
            // record matching the live arrival time evicts.
            if self
                .entries
                .remove_if(&oldest, |_, stored| *stored == at)
                .is_some()
            {
                trace!(hash = %oldest, "replay cache evicted entry");
            }
        }
        // Stale records would otherwise pile up under churn.
        if order.len() > self.max_entries.saturating_mul(2) {
            order.retain(|(h, at)| self.entries.get(h).is_some_and(|s| *s == *at));
        }
    }
}
