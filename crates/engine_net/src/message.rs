//! Message types and the message registry.
//!
//! A message is a named request a client submits inside a [`Transaction`]
//! (see [`crate::transaction`]). Each registration yields a typed
//! [`MessageType`] handle the caller keeps around: it knows how to encode an
//! input, decode a reply, and identifies the message to the scheduler.
//!
//! The registry itself is type-erased. Each entry stores a decode function
//! producing a [`MessageValue`], so the submission pipeline and the shard
//! iterator can validate bodies without knowing the concrete types.
//!
//! [`Transaction`]: crate::transaction::Transaction

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::{Serialize, de::DeserializeOwned};
use tracing::info;

use crate::codec;
use crate::error::NetError;

/// Registration-ordered message identifier. The first message registered
/// gets ID 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct MessageId(pub u32);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A decoded message body of unknown concrete type.
pub type MessageValue = Arc<dyn Any + Send + Sync>;

type DecodeFn = Box<dyn Fn(&[u8]) -> Result<MessageValue, NetError> + Send + Sync>;

/// Typed handle to a registered message.
///
/// `In` is the body clients submit, `Out` the reply recorded in the receipt.
pub struct MessageType<In, Out> {
    id: MessageId,
    name: Arc<str>,
    _marker: PhantomData<fn(In) -> Out>,
}

impl<In, Out> Clone for MessageType<In, Out> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: Arc::clone(&self.name),
            _marker: PhantomData,
        }
    }
}

impl<In, Out> fmt::Debug for MessageType<In, Out> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageType")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

impl<In, Out> MessageType<In, Out>
where
    In: Serialize + DeserializeOwned + Send + Sync + 'static,
    Out: Serialize + DeserializeOwned,
{
    #[must_use]
    pub fn id(&self) -> MessageId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Encode a message body.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Encode`] if serialisation fails.
    pub fn encode(&self, input: &In) -> Result<Vec<u8>, NetError> {
        codec::encode(input)
    }

    /// Decode a message body.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Decode`] if `bytes` is not a valid `In`.
    pub fn decode(&self, bytes: &[u8]) -> Result<In, NetError> {
        codec::decode(bytes)
    }

    /// Encode a reply.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Encode`] if serialisation fails.
    pub fn encode_reply(&self, reply: &Out) -> Result<Vec<u8>, NetError> {
        codec::encode(reply)
    }

    /// Decode a reply taken from a receipt.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Decode`] if `bytes` is not a valid `Out`.
    pub fn decode_reply(&self, bytes: &[u8]) -> Result<Out, NetError> {
        codec::decode(bytes)
    }

    /// Borrow a type-erased value as this message's input type.
    #[must_use]
    pub fn downcast<'a>(&self, value: &'a MessageValue) -> Option<&'a In> {
        value.downcast_ref::<In>()
    }
}

/// One registry entry.
pub struct MessageEntry {
    pub id: MessageId,
    pub name: String,
    decode: DecodeFn,
}

impl MessageEntry {
    /// Decode a body into its registered input type.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Decode`] if the body is malformed.
    pub fn decode(&self, bytes: &[u8]) -> Result<MessageValue, NetError> {
        (self.decode)(bytes)
    }
}

impl fmt::Debug for MessageEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageEntry")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Registry of message types owned by a world. Frozen when the world starts.
#[derive(Debug, Default)]
pub struct MessageRegistry {
    entries: Vec<MessageEntry>,
    by_name: HashMap<String, MessageId>,
    frozen: bool,
}

impl MessageRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a message type under `name`.
    ///
    /// # Errors
    ///
    /// Fails if `name` is already registered or the registry is frozen.
    pub fn register<In, Out>(&mut self, name: &str) -> Result<MessageType<In, Out>, NetError>
    where
        In: Serialize + DeserializeOwned + Send + Sync + 'static,
        Out: Serialize + DeserializeOwned,
    {
        if self.frozen {
            return Err(NetError::RegistryFrozen(name.to_string()));
        }
        if self.by_name.contains_key(name) {
            return Err(NetError::DuplicateMessage(name.to_string()));
        }
        let id = MessageId(self.entries.len() as u32 + 1);
        let decode: DecodeFn = Box::new(|bytes: &[u8]| {
            let value: In = codec::decode(bytes)?;
            Ok(Arc::new(value) as MessageValue)
        });
        self.entries.push(MessageEntry {
            id,
            name: name.to_string(),
            decode,
        });
        self.by_name.insert(name.to_string(), id);
        info!(msg_name = name, msg_id = id.0, "registered message");
        Ok(MessageType {
            id,
            name: Arc::from(name),
            _marker: PhantomData,
        })
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    #[must_use]
    pub fn get(&self, id: MessageId) -> Option<&MessageEntry> {
        let index = (id.0 as usize).checked_sub(1)?;
        self.entries.get(index)
    }

    /// Look up an entry by a wire-level ID, which may be wider than
    /// [`MessageId`].
    #[must_use]
    pub fn get_wire(&self, id: u64) -> Option<&MessageEntry> {
        u32::try_from(id).ok().and_then(|id| self.get(MessageId(id)))
    }

    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<MessageId> {
        self.by_name.get(name).copied()
    }

    /// Decode `bytes` as the body of message `id`.
    ///
    /// # Errors
    ///
    /// [`NetError::UnknownMessage`] if `id` is not registered,
    /// [`NetError::Decode`] if the body is malformed.
    pub fn decode(&self, id: MessageId, bytes: &[u8]) -> Result<MessageValue, NetError> {
        self.get(id)
            .ok_or(NetError::UnknownMessage(u64::from(id.0)))?
            .decode(bytes)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MessageEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
