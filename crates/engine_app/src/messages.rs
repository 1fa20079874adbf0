//! The per-tick message buffer.

use std::collections::BTreeMap;

use engine_net::{MessageId, TxBatch};

/// Messages due in one tick, partitioned by message ID. Within a message ID
/// arrival order is preserved.
#[derive(Debug, Default)]
pub struct TickMessages {
    by_id: BTreeMap<MessageId, Vec<TxBatch>>,
    total: usize,
}

impl TickMessages {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, batch: TxBatch) {
        self.by_id.entry(batch.msg_id).or_default().push(batch);
        self.total += 1;
    }

    /// Instances of message `id`, in arrival order.
    #[must_use]
    pub fn get(&self, id: MessageId) -> &[TxBatch] {
        self.by_id.get(&id).map(Vec::as_slice).unwrap_or_default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.total
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }
}

impl Extend<TxBatch> for TickMessages {
    fn extend<I: IntoIterator<Item = TxBatch>>(&mut self, iter: I) {
        for batch in iter {
            self.push(batch);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use engine_net::Transaction;

    use super::*;

    fn batch(id: u32, persona: &str) -> TxBatch {
        let tx = Transaction::new(persona, "ns", 0, vec![]);
        TxBatch {
            msg_id: MessageId(id),
            msg_value: Arc::new(()),
            hash: tx.hash(),
            tx,
        }
    }

    #[test]
    fn test_partitioned_in_arrival_order() {
        let mut messages = TickMessages::new();
        messages.extend([batch(2, "a"), batch(1, "b"), batch(2, "c")]);
        assert_eq!(messages.len(), 3);
        let personas: Vec<&str> = messages
            .get(MessageId(2))
            .iter()
            .map(|b| b.tx.persona_tag.as_str())
            .collect();
        assert_eq!(personas, vec!["a", "c"]);
        assert!(messages.get(MessageId(9)).is_empty());
    }
}
