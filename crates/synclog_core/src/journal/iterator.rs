//! Streaming iteration over journal frames.

use crate::error::{CoreError, CoreResult};
use crate::journal::frame::{parse_header, JournalFrame, CRC_SIZE, HEADER_SIZE, JOURNAL_MAGIC};
use synclog_storage::StorageBackend;

/// A decoded frame together with where it lives in the journal.
#[derive(Debug, Clone, PartialEq)]
pub struct LocatedFrame {
    /// Offset of the frame's first byte.
    pub offset: u64,
    /// Total frame length, envelope and checksum included.
    pub len: u32,
    /// The decoded frame.
    pub frame: JournalFrame,
}

/// Bytes read at a time while looking past a frame that overruns the journal.
const SCAN_CHUNK: usize = 64 * 1024;

/// Reads frames one at a time from a backend.
///
/// Memory use is bounded by the largest frame. A frame that is cut short by
/// the end of the journal ends iteration cleanly and is reported through
/// [`FrameIterator::torn_tail`]; a damaged frame yields an error and ends
/// iteration. A frame whose length runs past the end while an intact frame
/// still follows it is damage, not a torn write.
pub struct FrameIterator<'a> {
    backend: &'a dyn StorageBackend,
    offset: u64,
    end: u64,
    torn_tail: Option<u64>,
    finished: bool,
}

impl<'a> FrameIterator<'a> {
    /// Starts iterating at `start` (usually 0).
    ///
    /// # Errors
    ///
    /// Returns an error if the backend size cannot be read.
    pub fn new(backend: &'a dyn StorageBackend, start: u64) -> CoreResult<Self> {
        Ok(Self {
            backend,
            offset: start,
            end: backend.size()?,
            torn_tail: None,
            finished: false,
        })
    }

    /// Offset just past the last frame yielded.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Offset of an incomplete trailing frame, once iteration reached it.
    #[must_use]
    pub fn torn_tail(&self) -> Option<u64> {
        self.torn_tail
    }

    fn read_next(&mut self) -> CoreResult<Option<LocatedFrame>> {
        let remaining = self.end - self.offset;
        if remaining == 0 {
            return Ok(None);
        }
        if remaining < HEADER_SIZE as u64 {
            self.torn_tail = Some(self.offset);
            return Ok(None);
        }

        let header = self.backend.read_at(self.offset, HEADER_SIZE)?;
        let (_, payload_len) = parse_header(self.offset, &header)?;
        let total = HEADER_SIZE + payload_len + CRC_SIZE;
        if remaining < total as u64 {
            if let Some(next) = self.find_intact_frame(self.offset + 1)? {
                return Err(CoreError::journal_corruption(format!(
                    "frame at offset {} claims {total} bytes but an intact frame starts at offset {next}",
                    self.offset
                )));
            }
            self.torn_tail = Some(self.offset);
            return Ok(None);
        }

        let bytes = self.backend.read_at(self.offset, total)?;
        let frame = JournalFrame::decode(self.offset, &bytes)?;
        let located = LocatedFrame {
            offset: self.offset,
            // total <= remaining <= u64, and payload_len came from a u32
            len: total as u32,
            frame,
        };
        self.offset += total as u64;
        Ok(Some(located))
    }

    /// Offset of the first complete, checksummed frame in `from..end`.
    ///
    /// A torn write only ever leaves a prefix of one append behind, so
    /// nothing after the start of a torn frame can decode on its own.
    fn find_intact_frame(&self, from: u64) -> CoreResult<Option<u64>> {
        let overlap = JOURNAL_MAGIC.len() - 1;
        let mut pos = from;
        while pos < self.end {
            let chunk_len = usize::try_from(self.end - pos).map_or(SCAN_CHUNK, |n| n.min(SCAN_CHUNK));
            let chunk = self.backend.read_at(pos, chunk_len)?;
            for (i, window) in chunk.windows(JOURNAL_MAGIC.len()).enumerate() {
                let candidate = pos + i as u64;
                if *window == JOURNAL_MAGIC && self.is_intact_frame(candidate)? {
                    return Ok(Some(candidate));
                }
            }
            if chunk_len <= overlap {
                break;
            }
            // windows that straddle the chunk boundary are seen next round
            pos += (chunk_len - overlap) as u64;
        }
        Ok(None)
    }

    fn is_intact_frame(&self, at: u64) -> CoreResult<bool> {
        let remaining = self.end - at;
        if remaining < HEADER_SIZE as u64 {
            return Ok(false);
        }
        let header = self.backend.read_at(at, HEADER_SIZE)?;
        let Ok((_, payload_len)) = parse_header(at, &header) else {
            return Ok(false);
        };
        let total = HEADER_SIZE + payload_len + CRC_SIZE;
        if remaining < total as u64 {
            return Ok(false);
        }
        let bytes = self.backend.read_at(at, total)?;
        Ok(JournalFrame::decode(at, &bytes).is_ok())
    }
}

impl Iterator for FrameIterator<'_> {
    type Item = CoreResult<LocatedFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.read_next() {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
