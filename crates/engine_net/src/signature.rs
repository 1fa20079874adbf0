//! Signature verification contract.
//!
//! How a signature is produced and checked is up to the embedder; the engine
//! only needs a yes or no per transaction. Any `Fn(&Transaction) -> bool`
//! closure is a verifier.

use crate::transaction::Transaction;

pub trait SignatureVerifier: Send + Sync {
    /// Returns `true` if `tx` carries a valid signature for its persona.
    fn verify(&self, tx: &Transaction) -> bool;
}

impl<F> SignatureVerifier for F
where
    F: Fn(&Transaction) -> bool + Send + Sync,
{
    fn verify(&self, tx: &Transaction) -> bool {
        self(tx)
    }
}

/// Accepts every signature.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl SignatureVerifier for AcceptAll {
    fn verify(&self, _tx: &Transaction) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_verifier() {
        let verifier = |tx: &Transaction| tx.signature == format!("signed:{}", tx.persona_tag);
        let good = Transaction::new("alice", "ns", 0, vec![]).with_signature("signed:alice");
        let bad = Transaction::new("alice", "ns", 0, vec![]).with_signature("signed:bob");
        assert!(verifier.verify(&good));
        assert!(!verifier.verify(&bad));
        assert!(AcceptAll.verify(&bad));
    }
}
