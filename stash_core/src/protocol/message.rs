/**
 * The unit of delivery.
 *
 * Producers hand the dispatcher a fully formatted event (typically a JSON
 * document). The core never looks inside it: bytes go out exactly as they
 * came in, followed by the line terminator.
 */
use std::fmt;
use std::sync::Arc;

/**
 * Immutable, cheaply cloneable message payload.
 *
 * Backed by an `Arc<[u8]>` so a retry re-sends the very same bytes without
 * copying them.
 */
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Message {
    bytes: Arc<[u8]>,
}

impl Message {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl From<String> for Message {
    fn from(value: String) -> Self {
        Self {
            bytes: Arc::from(value.into_bytes()),
        }
    }
}

impl From<&str> for Message {
    fn from(value: &str) -> Self {
        Self {
            bytes: Arc::from(value.as_bytes()),
        }
    }
}

impl From<Vec<u8>> for Message {
    fn from(value: Vec<u8>) -> Self {
        Self {
            bytes: Arc::from(value),
        }
    }
}

impl From<&[u8]> for Message {
    fn from(value: &[u8]) -> Self {
        Self {
            bytes: Arc::from(value),
        }
    }
}

impl AsRef<[u8]> for Message {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Message")
            .field(&String::from_utf8_lossy(&self.bytes))
            .finish()
    }
}
