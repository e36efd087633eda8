//! Message - the unit of delivery
//!
//! An opaque payload handed from producers to the dispatcher. Identity is its
//! content; there is no generated ID.

use std::fmt;

use bytes::Bytes;

/// Immutable notification payload
///
/// Backed by [`Bytes`], so cloning into the queue is a reference-count bump.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Message(Bytes);

impl Message {
    /// Create a message from anything convertible into bytes
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self(body.into())
    }

    /// Raw payload
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consume the message, returning the underlying buffer
    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl From<&'static str> for Message {
    fn from(s: &'static str) -> Self {
        Self(Bytes::from_static(s.as_bytes()))
    }
}

impl From<String> for Message {
    fn from(s: String) -> Self {
        Self(Bytes::from(s))
    }
}

impl From<Vec<u8>> for Message {
    fn from(v: Vec<u8>) -> Self {
        Self(Bytes::from(v))
    }
}

impl From<Bytes> for Message {
    fn from(b: Bytes) -> Self {
        Self(b)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Message({:?})", String::from_utf8_lossy(&self.0))
    }
}
