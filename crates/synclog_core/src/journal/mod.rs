//! The mutation journal: durable, append-only storage of the mutation log.
//!
//! Every push becomes one *batch* of frames written with a single backend
//! append:
//!
//! ```text
//! BatchBegin | Mutation ... Mutation | BatchCommit
//! ```
//!
//! ## Frame Format
//!
//! ```text
//! | magic "SLOG" (4) | version (2) | type (1) | length (4) | payload (N) | crc32 (4) |
//! ```
//!
//! All integers are little-endian; the CRC-32 (IEEE) covers header and
//! payload.
//!
//! ## Recovery Policy
//!
//! ### Tolerated (treated as a clean end of log)
//!
//! - a truncated header or frame at the tail (torn write)
//! - a trailing batch without its `BatchCommit`
//!
//! Both are what a crash during an append leaves behind. The batch was never
//! acknowledged, so recovery truncates the journal back to the end of the
//! last committed batch.
//!
//! ### Fatal (the store refuses to open)
//!
//! - CRC mismatch, bad magic, unknown frame type, future version
//! - frames outside a batch, a batch opened inside another batch
//! - a committed batch whose sequence numbers do not continue the log or
//!   whose count disagrees with its `BatchBegin`
//!
//! These mean the bytes were damaged after they were acknowledged; serving
//! them would break the gap-free ordering contract.

mod frame;
mod iterator;
mod recovery;

pub use frame::{compute_crc32, FrameType, JournalFrame, JOURNAL_MAGIC, JOURNAL_VERSION};
pub use iterator::{FrameIterator, LocatedFrame};
pub use recovery::{replay, FrameRef, RecoveredBatch, Recovery};

pub(crate) use frame::{CRC_SIZE, HEADER_SIZE};
