//! The mutation record and its opaque payload.

use crate::error::{CoreError, CoreResult};
use crate::types::{AccountId, DeviceId, Sequence, Timestamp};
use serde_json::Value;

/// An opaque structured document describing a change.
///
/// The engine never interprets payloads: it checks once that the bytes are a
/// JSON document and then preserves them byte-for-byte through the journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload(Vec<u8>);

impl Payload {
    /// Accepts serialized JSON bytes exactly as the device sent them.
    ///
    /// The bytes are parsed once to prove they are a JSON document; the
    /// parsed value is thrown away so key order, whitespace and number
    /// spelling survive untouched.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] if the bytes are empty, do not
    /// parse as JSON, or are a bare `null` (a payload is required).
    pub fn from_bytes(bytes: Vec<u8>) -> CoreResult<Self> {
        if bytes.trim_ascii().is_empty() {
            return Err(CoreError::invalid_input("payload is required"));
        }
        let value: Value = serde_json::from_slice(&bytes)
            .map_err(|e| CoreError::invalid_input(format!("payload is not valid JSON: {e}")))?;
        if value.is_null() {
            return Err(CoreError::invalid_input("payload is required"));
        }
        Ok(Self(bytes))
    }

    /// Wraps bytes read back from a checksummed journal frame.
    pub(crate) fn from_journal(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Returns the stored bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consumes the payload, returning the stored bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Returns the stored size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the payload holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parses the stored bytes back into a JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::JournalCorruption`] if the stored bytes are not
    /// JSON, which can only happen if the journal was altered.
    pub fn to_json(&self) -> CoreResult<Value> {
        serde_json::from_slice(&self.0)
            .map_err(|e| CoreError::journal_corruption(format!("stored payload is not JSON: {e}")))
    }
}

/// One validated mutation of a batch, before the store has ordered it.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationInput {
    /// Kind of business object targeted (opaque).
    pub entity_type: String,
    /// Identifier of the business object targeted (opaque).
    pub entity_id: String,
    /// Mutation verb (opaque, interpreted by clients).
    pub operation: String,
    /// The change itself.
    pub payload: Payload,
    /// Device-asserted time of the change. Advisory only.
    pub client_timestamp: Timestamp,
}

/// An immutable entry of the mutation log.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationRecord {
    /// Server-assigned position; the ordering key and pull cursor.
    pub sequence: Sequence,
    /// Owning account.
    pub account_id: AccountId,
    /// Kind of business object targeted.
    pub entity_type: String,
    /// Identifier of the business object targeted.
    pub entity_id: String,
    /// Mutation verb.
    pub operation: String,
    /// The change itself, exactly as pushed.
    pub payload: Payload,
    /// Originating device.
    pub device_id: DeviceId,
    /// Device-asserted time of the change.
    pub client_timestamp: Timestamp,
    /// Time the batch was appended. Informational; not the ordering key.
    pub server_timestamp: Timestamp,
}
