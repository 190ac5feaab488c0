//! Identifiers, sequence numbers and timestamps.

use crate::error::{CoreError, CoreResult};
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// Wall-clock instant, UTC. Persisted at microsecond precision.
pub type Timestamp = DateTime<Utc>;

/// Maximum length of a device identifier, in characters.
pub const MAX_DEVICE_ID_LEN: usize = 255;

/// Maximum length of a client batch identifier, in characters.
pub const MAX_BATCH_ID_LEN: usize = 128;

/// The account that owns a mutation.
///
/// Always taken from the caller's verified identity, never from a request
/// body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AccountId(Uuid);

impl AccountId {
    /// Wraps a UUID.
    #[must_use]
    pub const fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// Generates a random account id.
    #[must_use]
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    /// Builds an account id from its 16 raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Returns the raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    /// Returns the wrapped UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for AccountId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<Uuid> for AccountId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// The device a mutation originated from.
///
/// Only used to keep a device's own writes out of its pulls.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(Arc<str>);

impl DeviceId {
    /// Validates and wraps a device identifier.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] if the id is empty or longer than
    /// [`MAX_DEVICE_ID_LEN`] characters.
    pub fn parse(id: &str) -> CoreResult<Self> {
        if id.is_empty() {
            return Err(CoreError::invalid_input("deviceId is required"));
        }
        if id.chars().count() > MAX_DEVICE_ID_LEN {
            return Err(CoreError::invalid_input(format!(
                "deviceId exceeds {MAX_DEVICE_ID_LEN} characters"
            )));
        }
        Ok(Self(Arc::from(id)))
    }

    /// Wraps an identifier read back from the journal.
    pub(crate) fn from_journal(id: String) -> Self {
        Self(Arc::from(id))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Client-chosen identifier that makes a push idempotent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BatchId(String);

impl BatchId {
    /// Validates and wraps a batch identifier.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] if the id is empty or longer than
    /// [`MAX_BATCH_ID_LEN`] characters.
    pub fn parse(id: &str) -> CoreResult<Self> {
        if id.is_empty() {
            return Err(CoreError::invalid_input("batchId must not be empty"));
        }
        if id.chars().count() > MAX_BATCH_ID_LEN {
            return Err(CoreError::invalid_input(format!(
                "batchId exceeds {MAX_BATCH_ID_LEN} characters"
            )));
        }
        Ok(Self(id.to_owned()))
    }

    pub(crate) fn from_journal(id: String) -> Self {
        Self(id)
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Server-assigned position of a mutation in the whole store.
///
/// Sequence numbers are global (not per account), strictly increasing in
/// commit order and never reused. A pull cursor is a sequence number: "every
/// record up to and including this one has been seen". [`Sequence::ZERO`]
/// sits before the first record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Sequence(u64);

impl Sequence {
    /// The cursor before the first record.
    pub const ZERO: Sequence = Sequence(0);

    /// Creates a sequence number.
    #[must_use]
    pub const fn new(seq: u64) -> Self {
        Self(seq)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the following sequence number.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seq:{}", self.0)
    }
}

/// Returns the current time at the precision the journal keeps.
pub(crate) fn now_micros() -> Timestamp {
    truncate_micros(Utc::now())
}

/// Drops sub-microsecond precision.
pub(crate) fn truncate_micros(ts: Timestamp) -> Timestamp {
    DateTime::from_timestamp_micros(ts.timestamp_micros()).unwrap_or(ts)
}

/// Decodes a journal timestamp.
pub(crate) fn timestamp_from_micros(micros: i64) -> CoreResult<Timestamp> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| CoreError::journal_corruption(format!("timestamp out of range: {micros}")))
}
