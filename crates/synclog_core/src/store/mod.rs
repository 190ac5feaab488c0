//! The mutation store: the durable, append-only, server-held log.

mod index;
mod journal_store;

pub use journal_store::JournalStore;

use crate::error::CoreResult;
use crate::mutation::{MutationInput, MutationRecord};
use crate::types::{AccountId, BatchId, DeviceId, Sequence, Timestamp};

/// One push, ready to be appended.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Owning account of every mutation in the batch.
    pub account: AccountId,
    /// Device that pushed the batch.
    pub device: DeviceId,
    /// Optional client idempotency token.
    pub batch_id: Option<BatchId>,
    /// Mutations in push order.
    pub mutations: Vec<MutationInput>,
}

/// Outcome of an append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Appended {
    /// Sequences assigned to the batch, in push order.
    pub sequences: Vec<Sequence>,
    /// Acceptance time shared by the whole batch.
    pub server_timestamp: Timestamp,
    /// True when the batch had already been appended under the same
    /// `batch_id` and nothing new was written.
    pub replayed: bool,
}

/// The durable mutation log.
///
/// # Invariants
///
/// - `append` is all-or-nothing: either every mutation of the batch becomes
///   visible with contiguous sequences and one server timestamp, or none do
/// - sequences are strictly increasing in commit order and never reused by
///   visible records
/// - `query_after` never returns records of another account, records of the
///   excluded device, or records at or below `after`
pub trait MutationStore: Send + Sync {
    /// Appends a batch atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch could not be made durable; nothing of
    /// it is visible in that case.
    fn append(&self, batch: &Batch) -> CoreResult<Appended>;

    /// Returns up to `limit` records of `account` with sequence greater than
    /// `after`, excluding those pushed by `exclude_device`, ascending.
    ///
    /// # Errors
    ///
    /// Returns an error if a record cannot be read back.
    fn query_after(
        &self,
        account: &AccountId,
        after: Sequence,
        exclude_device: &DeviceId,
        limit: usize,
    ) -> CoreResult<Vec<MutationRecord>>;

    /// Returns the last committed sequence ([`Sequence::ZERO`] when empty).
    fn head(&self) -> Sequence;
}
