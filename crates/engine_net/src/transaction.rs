//! The transaction envelope.
//!
//! A [`Transaction`] wraps one encoded message body together with the
//! submitter's persona, the target namespace, a creation timestamp and a
//! signature. Its [`TxHash`] is a blake3 digest of every field and is the
//! key used for replay protection and receipts.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::codec;
use crate::error::NetError;

/// Content hash of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxHash(pub [u8; 32]);

impl TxHash {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// A signed request to run one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Identity of the submitter.
    pub persona_tag: String,
    /// The world this transaction targets.
    pub namespace: String,
    /// Creation time, milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// Opaque signature checked by a [`crate::SignatureVerifier`].
    pub signature: String,
    /// MessagePack-encoded message body.
    pub body: Vec<u8>,
}

impl Transaction {
    pub fn new(
        persona_tag: impl Into<String>,
        namespace: impl Into<String>,
        timestamp: u64,
        body: Vec<u8>,
    ) -> Self {
        Self {
            persona_tag: persona_tag.into(),
            namespace: namespace.into(),
            timestamp,
            signature: String::new(),
            body,
        }
    }

    #[must_use]
    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = signature.into();
        self
    }

    /// blake3 over every field, each length-prefixed so field boundaries
    /// cannot be shifted to produce a collision.
    #[must_use]
    pub fn hash(&self) -> TxHash {
        let timestamp = self.timestamp.to_be_bytes();
        let fields: [&[u8]; 5] = [
            self.persona_tag.as_bytes(),
            self.namespace.as_bytes(),
            &timestamp,
            self.signature.as_bytes(),
            &self.body,
        ];
        let mut hasher = blake3::Hasher::new();
        for field in fields {
            hasher.update(&(field.len() as u64).to_be_bytes());
            hasher.update(field);
        }
        TxHash(*hasher.finalize().as_bytes())
    }

    /// Wire encoding used by shard feeds.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Encode`] if serialisation fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, NetError> {
        codec::encode(self)
    }

    /// Parse the wire encoding.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Decode`] if `bytes` is not a transaction.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, NetError> {
        codec::decode(bytes)
    }
}
