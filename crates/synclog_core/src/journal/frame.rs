//! Journal frame types and their binary encoding.

use crate::error::{CoreError, CoreResult};
use crate::mutation::Payload;
use crate::types::{timestamp_from_micros, AccountId, BatchId, DeviceId, Sequence, Timestamp};

/// Magic bytes opening every frame.
pub const JOURNAL_MAGIC: [u8; 4] = *b"SLOG";

/// Current frame format version.
pub const JOURNAL_VERSION: u16 = 1;

/// magic (4) + version (2) + type (1) + length (4)
pub(crate) const HEADER_SIZE: usize = 11;

pub(crate) const CRC_SIZE: usize = 4;

/// Type tag of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    /// Opens a batch.
    BatchBegin = 1,
    /// One mutation of the open batch.
    Mutation = 2,
    /// Seals the open batch.
    BatchCommit = 3,
}

impl FrameType {
    /// Converts a byte to a frame type.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::BatchBegin),
            2 => Some(Self::Mutation),
            3 => Some(Self::BatchCommit),
            _ => None,
        }
    }

    /// Converts the frame type to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Upper-case name used by the CLI.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::BatchBegin => "BEGIN",
            Self::Mutation => "MUTATION",
            Self::BatchCommit => "COMMIT",
        }
    }
}

/// A decoded journal frame.
#[derive(Debug, Clone, PartialEq)]
pub enum JournalFrame {
    /// Opens a batch pushed by one device of one account.
    BatchBegin {
        /// Owning account of every mutation in the batch.
        account_id: AccountId,
        /// Device that pushed the batch.
        device_id: DeviceId,
        /// Client idempotency token, if one was sent.
        batch_id: Option<BatchId>,
        /// Number of mutation frames that follow.
        count: u32,
        /// Acceptance time shared by the whole batch.
        server_timestamp: Timestamp,
    },

    /// One mutation.
    Mutation {
        /// Assigned sequence number.
        sequence: Sequence,
        /// Kind of business object targeted.
        entity_type: String,
        /// Identifier of the business object targeted.
        entity_id: String,
        /// Mutation verb.
        operation: String,
        /// Device-asserted time of the change.
        client_timestamp: Timestamp,
        /// Opaque payload bytes.
        payload: Payload,
    },

    /// Seals a batch; only sealed batches are ever visible.
    BatchCommit {
        /// Sequence of the batch's first mutation.
        first: Sequence,
        /// Sequence of the batch's last mutation.
        last: Sequence,
    },
}

impl JournalFrame {
    /// Returns the frame type.
    #[must_use]
    pub fn frame_type(&self) -> FrameType {
        match self {
            Self::BatchBegin { .. } => FrameType::BatchBegin,
            Self::Mutation { .. } => FrameType::Mutation,
            Self::BatchCommit { .. } => FrameType::BatchCommit,
        }
    }

    /// Encodes the frame with its envelope and checksum.
    ///
    /// # Errors
    ///
    /// Returns an error if a field does not fit the format's `u32` lengths.
    pub fn encode(&self) -> CoreResult<Vec<u8>> {
        let payload = self.encode_payload()?;
        let len = u32::try_from(payload.len())
            .map_err(|_| CoreError::invalid_input("journal frame too large"))?;

        let mut data = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        data.extend_from_slice(&JOURNAL_MAGIC);
        data.extend_from_slice(&JOURNAL_VERSION.to_le_bytes());
        data.push(self.frame_type().as_byte());
        data.extend_from_slice(&len.to_le_bytes());
        data.extend_from_slice(&payload);

        let crc = compute_crc32(&data);
        data.extend_from_slice(&crc.to_le_bytes());
        Ok(data)
    }

    /// Decodes exactly one enveloped frame located at `offset`.
    ///
    /// # Errors
    ///
    /// Returns a corruption or checksum error if `bytes` is not one intact
    /// frame.
    pub fn decode(offset: u64, bytes: &[u8]) -> CoreResult<Self> {
        if bytes.len() < HEADER_SIZE + CRC_SIZE {
            return Err(CoreError::journal_corruption(format!(
                "short frame at offset {offset}"
            )));
        }
        let (frame_type, payload_len) = parse_header(offset, &bytes[..HEADER_SIZE])?;
        if HEADER_SIZE + payload_len + CRC_SIZE != bytes.len() {
            return Err(CoreError::journal_corruption(format!(
                "frame length mismatch at offset {offset}"
            )));
        }

        let body_end = HEADER_SIZE + payload_len;
        let stored = u32::from_le_bytes([
            bytes[body_end],
            bytes[body_end + 1],
            bytes[body_end + 2],
            bytes[body_end + 3],
        ]);
        let computed = compute_crc32(&bytes[..body_end]);
        if stored != computed {
            return Err(CoreError::ChecksumMismatch {
                offset,
                stored,
                computed,
            });
        }

        Self::decode_payload(frame_type, &bytes[HEADER_SIZE..body_end])
    }

    fn encode_payload(&self) -> CoreResult<Vec<u8>> {
        let mut w = FrameWriter::default();
        match self {
            Self::BatchBegin {
                account_id,
                device_id,
                batch_id,
                count,
                server_timestamp,
            } => {
                w.bytes(account_id.as_bytes());
                w.string(device_id.as_str())?;
                match batch_id {
                    Some(id) => {
                        w.u8(1);
                        w.string(id.as_str())?;
                    }
                    None => w.u8(0),
                }
                w.u32(*count);
                w.i64(server_timestamp.timestamp_micros());
            }
            Self::Mutation {
                sequence,
                entity_type,
                entity_id,
                operation,
                client_timestamp,
                payload,
            } => {
                w.u64(sequence.as_u64());
                w.string(entity_type)?;
                w.string(entity_id)?;
                w.string(operation)?;
                w.i64(client_timestamp.timestamp_micros());
                w.blob(payload.as_bytes())?;
            }
            Self::BatchCommit { first, last } => {
                w.u64(first.as_u64());
                w.u64(last.as_u64());
            }
        }
        Ok(w.0)
    }

    fn decode_payload(frame_type: FrameType, payload: &[u8]) -> CoreResult<Self> {
        let mut r = FrameReader::new(payload);
        let frame = match frame_type {
            FrameType::BatchBegin => {
                let account_id = AccountId::from_bytes(r.array16()?);
                let device_id = DeviceId::from_journal(r.string()?);
                let batch_id = match r.u8()? {
                    0 => None,
                    1 => Some(BatchId::from_journal(r.string()?)),
                    flag => {
                        return Err(CoreError::journal_corruption(format!(
                            "invalid batch id flag {flag}"
                        )))
                    }
                };
                let count = r.u32()?;
                let server_timestamp = timestamp_from_micros(r.i64()?)?;
                Self::BatchBegin {
                    account_id,
                    device_id,
                    batch_id,
                    count,
                    server_timestamp,
                }
            }
            FrameType::Mutation => Self::Mutation {
                sequence: Sequence::new(r.u64()?),
                entity_type: r.string()?,
                entity_id: r.string()?,
                operation: r.string()?,
                client_timestamp: timestamp_from_micros(r.i64()?)?,
                payload: Payload::from_journal(r.blob()?),
            },
            FrameType::BatchCommit => Self::BatchCommit {
                first: Sequence::new(r.u64()?),
                last: Sequence::new(r.u64()?),
            },
        };
        r.finish(frame_type)?;
        Ok(frame)
    }
}

/// Validates a frame header and returns its type and payload length.
pub(crate) fn parse_header(offset: u64, header: &[u8]) -> CoreResult<(FrameType, usize)> {
    if header[0..4] != JOURNAL_MAGIC {
        return Err(CoreError::journal_corruption(format!(
            "invalid magic at offset {offset}"
        )));
    }

    let version = u16::from_le_bytes([header[4], header[5]]);
    if version > JOURNAL_VERSION {
        return Err(CoreError::journal_corruption(format!(
            "unsupported version {version} at offset {offset}"
        )));
    }

    let frame_type = FrameType::from_byte(header[6]).ok_or_else(|| {
        CoreError::journal_corruption(format!(
            "unknown frame type {} at offset {offset}",
            header[6]
        ))
    })?;

    let len = u32::from_le_bytes([header[7], header[8], header[9], header[10]]) as usize;
    Ok((frame_type, len))
}

#[derive(Default)]
struct FrameWriter(Vec<u8>);

impl FrameWriter {
    fn u8(&mut self, v: u8) {
        self.0.push(v);
    }

    fn u32(&mut self, v: u32) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }

    fn u64(&mut self, v: u64) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }

    fn i64(&mut self, v: i64) {
        self.0.extend_from_slice(&v.to_le_bytes());
    }

    fn bytes(&mut self, v: &[u8]) {
        self.0.extend_from_slice(v);
    }

    fn blob(&mut self, v: &[u8]) -> CoreResult<()> {
        let len = u32::try_from(v.len())
            .map_err(|_| CoreError::invalid_input("field exceeds 4 GiB"))?;
        self.u32(len);
        self.bytes(v);
        Ok(())
    }

    fn string(&mut self, v: &str) -> CoreResult<()> {
        self.blob(v.as_bytes())
    }
}

struct FrameReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FrameReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> CoreResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| CoreError::journal_corruption("unexpected end of frame payload"))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> CoreResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> CoreResult<u32> {
        let mut b = [0u8; 4];
        b.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(b))
    }

    fn u64(&mut self) -> CoreResult<u64> {
        let mut b = [0u8; 8];
        b.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(b))
    }

    fn i64(&mut self) -> CoreResult<i64> {
        let mut b = [0u8; 8];
        b.copy_from_slice(self.take(8)?);
        Ok(i64::from_le_bytes(b))
    }

    fn array16(&mut self) -> CoreResult<[u8; 16]> {
        let mut b = [0u8; 16];
        b.copy_from_slice(self.take(16)?);
        Ok(b)
    }

    fn blob(&mut self) -> CoreResult<Vec<u8>> {
        let len = self.u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    fn string(&mut self) -> CoreResult<String> {
        String::from_utf8(self.blob()?)
            .map_err(|_| CoreError::journal_corruption("string field is not UTF-8"))
    }

    fn finish(&self, frame_type: FrameType) -> CoreResult<()> {
        if self.pos != self.buf.len() {
            return Err(CoreError::journal_corruption(format!(
                "{} trailing bytes in {} frame",
                self.buf.len() - self.pos,
                frame_type.name()
            )));
        }
        Ok(())
    }
}

/// Computes the CRC-32 (IEEE) of `data`.
pub fn compute_crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                crc = if crc & 1 != 0 {
                    (crc >> 1) ^ 0xEDB8_8320
                } else {
                    crc >> 1
                };
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        crc = (crc >> 8) ^ TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize];
    }
    !crc
}
