//! Journal-backed mutation store.

use crate::config::StoreConfig;
use crate::dir::StoreDir;
use crate::error::{CoreError, CoreResult};
use crate::journal::{replay, FrameRef, JournalFrame};
use crate::mutation::MutationRecord;
use crate::store::index::{IndexEntry, StoreIndex};
use crate::store::{Appended, Batch, MutationStore};
use crate::types::{now_micros, AccountId, DeviceId, Sequence, Timestamp};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use synclog_storage::{FileBackend, InMemoryBackend, StorageBackend};

struct WriterState {
    next_sequence: Sequence,
}

/// A [`MutationStore`] persisted as a single append-only journal.
///
/// Appends are serialized by one writer lock; reads go through an in-memory
/// index of committed batches and never wait for the writer, only for the
/// backend while a batch is being written.
///
/// # Example
///
/// ```rust,no_run
/// use synclog_core::{JournalStore, MutationStore, StoreConfig};
///
/// let store = JournalStore::open("data/sync", StoreConfig::default())?;
/// println!("head: {}", store.head());
/// # Ok::<(), synclog_core::CoreError>(())
/// ```
pub struct JournalStore {
    backend: RwLock<Box<dyn StorageBackend>>,
    writer: Mutex<WriterState>,
    index: RwLock<StoreIndex>,
    poisoned: AtomicBool,
    config: StoreConfig,
    dir: Option<StoreDir>,
}

impl JournalStore {
    /// Opens the store in `path`, creating it if configured to.
    ///
    /// Takes an exclusive lock on the directory and replays the journal.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StoreLocked`] if another handle owns the
    /// directory, or a corruption error if the journal fails recovery.
    pub fn open(path: impl AsRef<Path>, config: StoreConfig) -> CoreResult<Self> {
        let dir = StoreDir::open(path.as_ref(), config.create_if_missing)?;
        let backend = FileBackend::open(&dir.journal_path())?;
        Self::build(Box::new(backend), config, Some(dir))
    }

    /// Opens an empty store that lives only in memory.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the signature matches the other constructors.
    pub fn open_in_memory() -> CoreResult<Self> {
        Self::with_backend(Box::new(InMemoryBackend::new()), StoreConfig::default())
    }

    /// Opens a store over an arbitrary backend, replaying what it holds.
    ///
    /// # Errors
    ///
    /// Returns a corruption error if the journal fails recovery.
    pub fn with_backend(backend: Box<dyn StorageBackend>, config: StoreConfig) -> CoreResult<Self> {
        Self::build(backend, config, None)
    }

    fn build(
        mut backend: Box<dyn StorageBackend>,
        config: StoreConfig,
        dir: Option<StoreDir>,
    ) -> CoreResult<Self> {
        let recovery = replay(backend.as_ref())?;

        let discarded = recovery.discarded_bytes();
        if discarded > 0 {
            if !config.repair_tail {
                return Err(CoreError::journal_corruption(format!(
                    "{discarded} bytes after the last committed batch at offset {}",
                    recovery.committed_len
                )));
            }
            tracing::warn!(
                discarded,
                committed_len = recovery.committed_len,
                "truncating unsealed journal tail"
            );
            backend.truncate(recovery.committed_len)?;
            backend.sync()?;
        }

        let mut index = StoreIndex::default();
        for batch in recovery.batches {
            index.insert_batch(
                batch.account_id,
                &batch.device_id,
                batch.batch_id,
                batch.server_timestamp,
                &batch.mutations,
            );
        }

        tracing::info!(
            path = ?dir.as_ref().map(StoreDir::path),
            mutations = index.mutation_count(),
            accounts = index.account_count(),
            head = recovery.last_sequence.as_u64(),
            "mutation store opened"
        );

        Ok(Self {
            backend: RwLock::new(backend),
            writer: Mutex::new(WriterState {
                next_sequence: recovery.last_sequence.next(),
            }),
            index: RwLock::new(index),
            poisoned: AtomicBool::new(false),
            config,
            dir,
        })
    }

    /// Directory of a file-backed store.
    #[must_use]
    pub fn path(&self) -> Option<PathBuf> {
        self.dir.as_ref().map(|d| d.path().to_path_buf())
    }

    /// Number of committed mutations across all accounts.
    #[must_use]
    pub fn mutation_count(&self) -> usize {
        self.index.read().mutation_count()
    }

    /// Number of accounts with at least one committed mutation.
    #[must_use]
    pub fn account_count(&self) -> usize {
        self.index.read().account_count()
    }

    /// Returns true if a failed rollback left the store refusing appends.
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::SeqCst)
    }

    fn read_record(
        backend: &dyn StorageBackend,
        account: AccountId,
        entry: IndexEntry,
    ) -> CoreResult<MutationRecord> {
        let bytes = backend.read_at(entry.offset, entry.len as usize)?;
        match JournalFrame::decode(entry.offset, &bytes)? {
            JournalFrame::Mutation {
                sequence,
                entity_type,
                entity_id,
                operation,
                client_timestamp,
                payload,
            } if sequence == entry.sequence => Ok(MutationRecord {
                sequence,
                account_id: account,
                entity_type,
                entity_id,
                operation,
                payload,
                device_id: entry.device_id,
                client_timestamp,
                server_timestamp: entry.server_timestamp,
            }),
            other => Err(CoreError::journal_corruption(format!(
                "expected mutation {} at offset {}, found {} frame",
                entry.sequence,
                entry.offset,
                other.frame_type().name()
            ))),
        }
    }
}

impl MutationStore for JournalStore {
    fn append(&self, batch: &Batch) -> CoreResult<Appended> {
        if self.is_poisoned() {
            return Err(CoreError::Poisoned);
        }

        let writer = self.writer.lock();

        if let Some(batch_id) = &batch.batch_id {
            if let Some(previous) = self.index.read().lookup_batch(batch.account, batch_id) {
                tracing::debug!(
                    account = %batch.account,
                    batch_id = batch_id.as_str(),
                    "batch already appended"
                );
                return Ok(previous);
            }
        }

        let server_timestamp = now_micros();
        if batch.mutations.is_empty() {
            return Ok(Appended {
                sequences: Vec::new(),
                server_timestamp,
                replayed: false,
            });
        }

        let first = writer.next_sequence;
        let (bytes, mut frames) = encode_batch(batch, first, server_timestamp)?;

        let mut scope = AppendScope::begin(self, writer)?;
        let base = scope.write(&bytes)?;
        for frame in &mut frames {
            frame.offset += base;
        }
        let appended = scope.commit(batch, server_timestamp, &frames);

        tracing::debug!(
            account = %batch.account,
            device = batch.device.as_str(),
            first = first.as_u64(),
            count = frames.len(),
            "batch committed"
        );
        Ok(appended)
    }

    fn query_after(
        &self,
        account: &AccountId,
        after: Sequence,
        exclude_device: &DeviceId,
        limit: usize,
    ) -> CoreResult<Vec<MutationRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let entries = self.index.read().after(account, after, exclude_device, limit);
        let backend = self.backend.read();
        entries
            .into_iter()
            .map(|entry| Self::read_record(&**backend, *account, entry))
            .collect()
    }

    fn head(&self) -> Sequence {
        self.index.read().head()
    }
}

impl std::fmt::Debug for JournalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JournalStore")
            .field("path", &self.path())
            .field("head", &self.head())
            .field("poisoned", &self.is_poisoned())
            .finish_non_exhaustive()
    }
}

/// Encodes a batch as `BatchBegin | Mutation* | BatchCommit`.
///
/// Frame offsets in the result are relative to the start of the bytes.
fn encode_batch(
    batch: &Batch,
    first: Sequence,
    server_timestamp: Timestamp,
) -> CoreResult<(Vec<u8>, Vec<FrameRef>)> {
    let count = u32::try_from(batch.mutations.len())
        .map_err(|_| CoreError::invalid_input("batch has too many mutations"))?;

    let mut bytes = JournalFrame::BatchBegin {
        account_id: batch.account,
        device_id: batch.device.clone(),
        batch_id: batch.batch_id.clone(),
        count,
        server_timestamp,
    }
    .encode()?;

    let mut frames = Vec::with_capacity(batch.mutations.len());
    let mut sequence = first;
    let mut last = first;
    for mutation in &batch.mutations {
        let frame = JournalFrame::Mutation {
            sequence,
            entity_type: mutation.entity_type.clone(),
            entity_id: mutation.entity_id.clone(),
            operation: mutation.operation.clone(),
            client_timestamp: mutation.client_timestamp,
            payload: mutation.payload.clone(),
        }
        .encode()?;
        let len = u32::try_from(frame.len())
            .map_err(|_| CoreError::invalid_input("mutation frame too large"))?;
        frames.push(FrameRef {
            sequence,
            offset: bytes.len() as u64,
            len,
        });
        bytes.extend_from_slice(&frame);
        last = sequence;
        sequence = sequence.next();
    }

    bytes.extend(JournalFrame::BatchCommit { first, last }.encode()?);
    Ok((bytes, frames))
}

/// An in-flight append.
///
/// Holds the writer lock and the journal size from before the append.
/// Dropping the scope without [`AppendScope::commit`] truncates the journal
/// back to that size, so a batch that failed half-way leaves nothing behind.
/// If the truncate itself fails the store is poisoned: the bytes on disk are
/// an unsealed batch that the next open will discard.
struct AppendScope<'a> {
    store: &'a JournalStore,
    writer: MutexGuard<'a, WriterState>,
    start: u64,
    committed: bool,
}

impl<'a> AppendScope<'a> {
    fn begin(store: &'a JournalStore, writer: MutexGuard<'a, WriterState>) -> CoreResult<Self> {
        let start = store.backend.read().size()?;
        Ok(Self {
            store,
            writer,
            start,
            committed: false,
        })
    }

    /// Writes the batch bytes and makes them durable. Returns their offset.
    fn write(&mut self, bytes: &[u8]) -> CoreResult<u64> {
        let mut backend = self.store.backend.write();
        let offset = backend.append(bytes)?;
        backend.flush()?;
        if self.store.config.sync_on_commit {
            backend.sync()?;
        }
        Ok(offset)
    }

    /// Publishes the written batch to readers.
    fn commit(mut self, batch: &Batch, server_timestamp: Timestamp, frames: &[FrameRef]) -> Appended {
        let appended = self.store.index.write().insert_batch(
            batch.account,
            &batch.device,
            batch.batch_id.clone(),
            server_timestamp,
            frames,
        );
        if let Some(last) = frames.last() {
            self.writer.next_sequence = last.sequence.next();
        }
        self.committed = true;
        appended
    }
}

impl Drop for AppendScope<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }

        let mut backend = self.store.backend.write();
        let rolled_back = backend
            .truncate(self.start)
            .and_then(|()| backend.sync());
        match rolled_back {
            Ok(()) => {
                tracing::warn!(size = self.start, "append failed, journal rolled back");
            }
            Err(e) => {
                self.store.poisoned.store(true, Ordering::SeqCst);
                tracing::error!(error = %e, size = self.start, "rollback failed, store poisoned");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::{MutationInput, Payload};
    use crate::types::BatchId;
    use serde_json::json;
    use synclog_storage::{StorageError, StorageResult};
    use tempfile::tempdir;

    fn input(n: u32) -> MutationInput {
        MutationInput {
            entity_type: "customer".into(),
            entity_id: format!("c-{n}"),
            operation: "update".into(),
            payload: Payload::from_bytes(json!({ "n": n }).to_string().into_bytes()).unwrap(),
            client_timestamp: now_micros(),
        }
    }

    fn batch(account: AccountId, device: &str, count: u32) -> Batch {
        Batch {
            account,
            device: DeviceId::parse(device).unwrap(),
            batch_id: None,
            mutations: (0..count).map(input).collect(),
        }
    }

    fn all(store: &JournalStore, account: &AccountId) -> Vec<MutationRecord> {
        let nobody = DeviceId::parse("nobody").unwrap();
        store
            .query_after(account, Sequence::ZERO, &nobody, usize::MAX)
            .unwrap()
    }

    #[test]
    fn sequences_are_contiguous_per_batch() {
        let store = JournalStore::open_in_memory().unwrap();
        let account = AccountId::new_v4();

        let a = store.append(&batch(account, "d1", 3)).unwrap();
        let b = store.append(&batch(account, "d2", 2)).unwrap();

        let seqs: Vec<u64> = a.sequences.iter().map(|s| s.as_u64()).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(b.sequences[0], Sequence::new(4));
        assert_eq!(store.head(), Sequence::new(5));

        let records = all(&store, &account);
        assert_eq!(records.len(), 5);
        assert!(records[..3]
            .iter()
            .all(|r| r.server_timestamp == a.server_timestamp));
        assert_eq!(records[1].entity_id, "c-1");
        assert_eq!(records[1].payload.to_json().unwrap(), json!({ "n": 1 }));
    }

    #[test]
    fn empty_batch_writes_nothing() {
        let backend = InMemoryBackend::new();
        let store =
            JournalStore::with_backend(Box::new(backend.clone()), StoreConfig::default()).unwrap();

        let appended = store.append(&batch(AccountId::new_v4(), "d1", 0)).unwrap();
        assert!(appended.sequences.is_empty());
        assert!(backend.data().is_empty());
        assert_eq!(store.head(), Sequence::ZERO);
    }

    #[test]
    fn failed_append_rolls_back() {
        let backend = InMemoryBackend::new();
        let store =
            JournalStore::with_backend(Box::new(backend.clone()), StoreConfig::default()).unwrap();
        let account = AccountId::new_v4();
        store.append(&batch(account, "d1", 1)).unwrap();
        let before = backend.data();

        backend.fail_appends(true);
        assert!(store.append(&batch(account, "d1", 4)).is_err());
        assert_eq!(backend.data(), before);
        assert_eq!(all(&store, &account).len(), 1);

        backend.fail_appends(false);
        let next = store.append(&batch(account, "d1", 1)).unwrap();
        assert_eq!(next.sequences, vec![Sequence::new(2)]);
    }

    #[derive(Clone, Default)]
    struct StuckBackend {
        inner: InMemoryBackend,
    }

    impl StorageBackend for StuckBackend {
        fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
            self.inner.read_at(offset, len)
        }
        fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
            self.inner.append(data)
        }
        fn flush(&mut self) -> StorageResult<()> {
            self.inner.flush()
        }
        fn sync(&mut self) -> StorageResult<()> {
            self.inner.sync()
        }
        fn size(&self) -> StorageResult<u64> {
            self.inner.size()
        }
        fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
            Err(StorageError::InvalidTruncate {
                requested: new_size,
                size: 0,
            })
        }
    }

    #[test]
    fn failed_rollback_poisons() {
        let backend = StuckBackend::default();
        let store =
            JournalStore::with_backend(Box::new(backend.clone()), StoreConfig::default()).unwrap();
        let account = AccountId::new_v4();

        backend.inner.fail_appends(true);
        assert!(store.append(&batch(account, "d1", 1)).is_err());
        assert!(store.is_poisoned());

        backend.inner.fail_appends(false);
        assert!(matches!(
            store.append(&batch(account, "d1", 1)),
            Err(CoreError::Poisoned)
        ));
        assert!(all(&store, &account).is_empty());
    }

    #[test]
    fn batch_id_replays_without_writing() {
        let backend = InMemoryBackend::new();
        let store =
            JournalStore::with_backend(Box::new(backend.clone()), StoreConfig::default()).unwrap();
        let account = AccountId::new_v4();
        let mut first = batch(account, "d1", 2);
        first.batch_id = Some(BatchId::parse("push-1").unwrap());

        let original = store.append(&first).unwrap();
        let size = backend.data().len();
        let again = store.append(&first).unwrap();

        assert!(again.replayed);
        assert_eq!(again.sequences, original.sequences);
        assert_eq!(again.server_timestamp, original.server_timestamp);
        assert_eq!(backend.data().len(), size);
        assert_eq!(all(&store, &account).len(), 2);

        // same id under another account is a different batch
        let mut other = first.clone();
        other.account = AccountId::new_v4();
        assert!(!store.append(&other).unwrap().replayed);
    }

    #[test]
    fn reopen_recovers_and_drops_torn_tail() {
        let backend = InMemoryBackend::new();
        let account = AccountId::new_v4();
        {
            let store =
                JournalStore::with_backend(Box::new(backend.clone()), StoreConfig::default())
                    .unwrap();
            let mut b = batch(account, "d1", 2);
            b.batch_id = Some(BatchId::parse("push-1").unwrap());
            store.append(&b).unwrap();
        }
        let committed = backend.data();
        let mut torn = committed.clone();
        torn.extend_from_slice(b"SLOG\x01\x00\x01");
        let backend = InMemoryBackend::with_data(torn);

        let store =
            JournalStore::with_backend(Box::new(backend.clone()), StoreConfig::default()).unwrap();
        assert_eq!(backend.data(), committed);
        assert_eq!(store.head(), Sequence::new(2));
        assert_eq!(all(&store, &account).len(), 2);

        let mut replay = batch(account, "d1", 2);
        replay.batch_id = Some(BatchId::parse("push-1").unwrap());
        assert!(store.append(&replay).unwrap().replayed);
        let next = store.append(&batch(account, "d1", 1)).unwrap();
        assert_eq!(next.sequences, vec![Sequence::new(3)]);
    }

    #[test]
    fn damaged_tail_without_repair_refuses_to_open() {
        let mut data = Vec::new();
        data.extend_from_slice(b"SLOG\x01\x00");
        let backend = InMemoryBackend::with_data(data);
        let result =
            JournalStore::with_backend(Box::new(backend), StoreConfig::new().repair_tail(false));
        assert!(matches!(result, Err(CoreError::JournalCorruption { .. })));
    }

    #[test]
    fn damaged_length_mid_journal_keeps_later_batches() {
        let backend = InMemoryBackend::new();
        {
            let store =
                JournalStore::with_backend(Box::new(backend.clone()), StoreConfig::default())
                    .unwrap();
            let account = AccountId::new_v4();
            store.append(&batch(account, "d1", 2)).unwrap();
            store.append(&batch(account, "d2", 3)).unwrap();
        }
        let mut damaged = backend.data();
        // length field of the very first frame
        damaged[7..11].copy_from_slice(&u32::MAX.to_le_bytes());
        let backend = InMemoryBackend::with_data(damaged.clone());

        let result =
            JournalStore::with_backend(Box::new(backend.clone()), StoreConfig::default());
        assert!(matches!(result, Err(CoreError::JournalCorruption { .. })));
        assert_eq!(backend.data(), damaged);
    }

    #[test]
    fn file_store_survives_reopen() {
        let temp = tempdir().unwrap();
        let account = AccountId::new_v4();
        {
            let store = JournalStore::open(temp.path(), StoreConfig::default()).unwrap();
            store.append(&batch(account, "d1", 3)).unwrap();
            assert!(matches!(
                JournalStore::open(temp.path(), StoreConfig::default()),
                Err(CoreError::StoreLocked)
            ));
        }

        let store = JournalStore::open(temp.path(), StoreConfig::default()).unwrap();
        assert_eq!(store.head(), Sequence::new(3));
        assert_eq!(store.mutation_count(), 3);
        assert_eq!(store.path().unwrap(), temp.path());
        let records = all(&store, &account);
        assert_eq!(records[2].entity_id, "c-2");
    }
}
