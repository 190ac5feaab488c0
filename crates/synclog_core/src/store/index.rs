//! In-memory index over committed journal frames.

use crate::journal::FrameRef;
use crate::store::Appended;
use crate::types::{AccountId, BatchId, DeviceId, Sequence, Timestamp};
use std::collections::HashMap;

/// Where one committed mutation lives.
#[derive(Debug, Clone)]
pub(crate) struct IndexEntry {
    pub(crate) sequence: Sequence,
    pub(crate) device_id: DeviceId,
    pub(crate) server_timestamp: Timestamp,
    pub(crate) offset: u64,
    pub(crate) len: u32,
}

/// Committed batches grouped by account.
///
/// Each account's entries are kept in ascending sequence order, so a cursor
/// lookup is a binary search.
#[derive(Debug, Default)]
pub(crate) struct StoreIndex {
    accounts: HashMap<AccountId, Vec<IndexEntry>>,
    batches: HashMap<(AccountId, BatchId), Appended>,
    head: Sequence,
    mutations: usize,
}

impl StoreIndex {
    /// Publishes a committed batch. `frames` must continue the log.
    pub(crate) fn insert_batch(
        &mut self,
        account: AccountId,
        device: &DeviceId,
        batch_id: Option<BatchId>,
        server_timestamp: Timestamp,
        frames: &[FrameRef],
    ) -> Appended {
        let entries = self.accounts.entry(account).or_default();
        entries.extend(frames.iter().map(|frame| IndexEntry {
            sequence: frame.sequence,
            device_id: device.clone(),
            server_timestamp,
            offset: frame.offset,
            len: frame.len,
        }));

        if let Some(last) = frames.last() {
            self.head = last.sequence;
        }
        self.mutations += frames.len();

        let appended = Appended {
            sequences: frames.iter().map(|f| f.sequence).collect(),
            server_timestamp,
            replayed: false,
        };
        if let Some(batch_id) = batch_id {
            self.batches.insert((account, batch_id), appended.clone());
        }
        appended
    }

    /// Returns the outcome of an earlier batch with this id.
    pub(crate) fn lookup_batch(&self, account: AccountId, batch_id: &BatchId) -> Option<Appended> {
        self.batches
            .get(&(account, batch_id.clone()))
            .map(|appended| Appended {
                replayed: true,
                ..appended.clone()
            })
    }

    /// Entries of `account` after the cursor, minus the excluded device.
    pub(crate) fn after(
        &self,
        account: &AccountId,
        after: Sequence,
        exclude_device: &DeviceId,
        limit: usize,
    ) -> Vec<IndexEntry> {
        let Some(entries) = self.accounts.get(account) else {
            return Vec::new();
        };
        let start = entries.partition_point(|e| e.sequence <= after);
        entries[start..]
            .iter()
            .filter(|e| &e.device_id != exclude_device)
            .take(limit)
            .cloned()
            .collect()
    }

    pub(crate) fn head(&self) -> Sequence {
        self.head
    }

    pub(crate) fn mutation_count(&self) -> usize {
        self.mutations
    }

    pub(crate) fn account_count(&self) -> usize {
        self.accounts.len()
    }
}
