//! Journal replay at open time.

use crate::error::{CoreError, CoreResult};
use crate::journal::frame::{FrameType, JournalFrame};
use crate::journal::iterator::FrameIterator;
use crate::types::{AccountId, BatchId, DeviceId, Sequence, Timestamp};
use synclog_storage::StorageBackend;

/// Location of one committed mutation frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRef {
    /// Sequence number of the mutation.
    pub sequence: Sequence,
    /// Offset of the frame.
    pub offset: u64,
    /// Total frame length.
    pub len: u32,
}

/// A committed batch found during replay.
#[derive(Debug, Clone)]
pub struct RecoveredBatch {
    /// Owning account.
    pub account_id: AccountId,
    /// Pushing device.
    pub device_id: DeviceId,
    /// Client idempotency token, if any.
    pub batch_id: Option<BatchId>,
    /// Acceptance time.
    pub server_timestamp: Timestamp,
    /// The batch's mutation frames, in sequence order.
    pub mutations: Vec<FrameRef>,
}

/// Result of replaying a journal.
#[derive(Debug, Clone, Default)]
pub struct Recovery {
    /// Committed batches in commit order.
    pub batches: Vec<RecoveredBatch>,
    /// Highest committed sequence number ([`Sequence::ZERO`] if none).
    pub last_sequence: Sequence,
    /// Journal length up to the end of the last committed batch.
    pub committed_len: u64,
    /// Journal length as found.
    pub total_len: u64,
}

impl Recovery {
    /// Bytes after the last committed batch (torn or unsealed writes).
    #[must_use]
    pub fn discarded_bytes(&self) -> u64 {
        self.total_len - self.committed_len
    }

    /// Number of committed mutations.
    #[must_use]
    pub fn mutation_count(&self) -> usize {
        self.batches.iter().map(|b| b.mutations.len()).sum()
    }
}

struct OpenBatch {
    begin_offset: u64,
    count: u32,
    batch: RecoveredBatch,
}

/// Replays the journal, validating batch structure and sequence continuity.
///
/// Only sealed batches are returned. An unsealed trailing batch or a torn
/// trailing frame is left out and accounted for in
/// [`Recovery::discarded_bytes`]; the caller decides whether to truncate.
///
/// # Errors
///
/// Returns a corruption or checksum error for anything the recovery policy
/// in [`crate::journal`] classifies as fatal.
pub fn replay(backend: &dyn StorageBackend) -> CoreResult<Recovery> {
    let mut recovery = Recovery {
        total_len: backend.size()?,
        ..Recovery::default()
    };
    let mut open: Option<OpenBatch> = None;

    for item in FrameIterator::new(backend, 0)? {
        let located = item?;
        let offset = located.offset;

        match located.frame {
            JournalFrame::BatchBegin {
                account_id,
                device_id,
                batch_id,
                count,
                server_timestamp,
            } => {
                if let Some(current) = &open {
                    return Err(CoreError::journal_corruption(format!(
                        "batch at offset {offset} opened inside unsealed batch at offset {}",
                        current.begin_offset
                    )));
                }
                open = Some(OpenBatch {
                    begin_offset: offset,
                    count,
                    batch: RecoveredBatch {
                        account_id,
                        device_id,
                        batch_id,
                        server_timestamp,
                        mutations: Vec::with_capacity(count as usize),
                    },
                });
            }
            JournalFrame::Mutation { sequence, .. } => {
                let Some(current) = open.as_mut() else {
                    return Err(outside_batch(FrameType::Mutation, offset));
                };
                let expected = Sequence::new(
                    recovery.last_sequence.as_u64() + current.batch.mutations.len() as u64 + 1,
                );
                if sequence != expected {
                    return Err(CoreError::journal_corruption(format!(
                        "sequence gap at offset {offset}: expected {expected}, found {sequence}"
                    )));
                }
                current.batch.mutations.push(FrameRef {
                    sequence,
                    offset,
                    len: located.len,
                });
            }
            JournalFrame::BatchCommit { first, last } => {
                let Some(current) = open.take() else {
                    return Err(outside_batch(FrameType::BatchCommit, offset));
                };
                let frames = &current.batch.mutations;
                let sealed = frames.len() == current.count as usize
                    && frames.first().map(|f| f.sequence) == Some(first)
                    && frames.last().map(|f| f.sequence) == Some(last);
                if !sealed {
                    return Err(CoreError::journal_corruption(format!(
                        "commit at offset {offset} does not match batch at offset {}",
                        current.begin_offset
                    )));
                }
                recovery.last_sequence = last;
                recovery.committed_len = offset + u64::from(located.len);
                recovery.batches.push(current.batch);
            }
        }
    }

    Ok(recovery)
}

fn outside_batch(frame_type: FrameType, offset: u64) -> CoreError {
    CoreError::journal_corruption(format!(
        "{} frame at offset {offset} outside a batch",
        frame_type.name()
    ))
}
