//! Dump-log command implementation.

use serde::Serialize;
use std::path::Path;
use synclog_core::journal::{FrameIterator, JournalFrame, LocatedFrame};
use synclog_core::JOURNAL_FILE;
use synclog_storage::{FileBackend, StorageBackend};

/// Journal frame representation for output.
#[derive(Debug, Serialize)]
pub struct FrameInfo {
    /// Offset in the journal file.
    pub offset: u64,
    /// Total frame size in bytes.
    pub size: u32,
    /// Frame type.
    pub frame_type: String,
    /// Account (batch begin only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    /// Pushing device (batch begin only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    /// Client batch id (batch begin only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    /// Number of mutations (batch begin only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    /// Sequence number, or the first sequence of a commit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    /// Last sequence of a commit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sequence: Option<u64>,
    /// `entityType/entityId` of a mutation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    /// Mutation verb.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    /// Payload size in bytes (mutation only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_size: Option<usize>,
}

impl From<LocatedFrame> for FrameInfo {
    fn from(located: LocatedFrame) -> Self {
        let mut info = FrameInfo {
            offset: located.offset,
            size: located.len,
            frame_type: located.frame.frame_type().name().to_string(),
            account: None,
            device: None,
            batch_id: None,
            count: None,
            sequence: None,
            last_sequence: None,
            entity: None,
            operation: None,
            payload_size: None,
        };

        match located.frame {
            JournalFrame::BatchBegin {
                account_id,
                device_id,
                batch_id,
                count,
                ..
            } => {
                info.account = Some(account_id.to_string());
                info.device = Some(device_id.as_str().to_string());
                info.batch_id = batch_id.map(|b| b.as_str().to_string());
                info.count = Some(count);
            }
            JournalFrame::Mutation {
                sequence,
                entity_type,
                entity_id,
                operation,
                payload,
                ..
            } => {
                info.sequence = Some(sequence.as_u64());
                info.entity = Some(format!("{entity_type}/{entity_id}"));
                info.operation = Some(operation);
                info.payload_size = Some(payload.len());
            }
            JournalFrame::BatchCommit { first, last } => {
                info.sequence = Some(first.as_u64());
                info.last_sequence = Some(last.as_u64());
            }
        }
        info
    }
}

/// Runs the dump-log command.
pub fn run(
    path: &Path,
    limit: Option<usize>,
    start_offset: u64,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let journal_path = path.join(JOURNAL_FILE);

    if !journal_path.exists() {
        return Err("Journal file not found".into());
    }

    let backend = FileBackend::open(&journal_path)?;
    let frames = read_frames(&backend, start_offset, limit)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&frames)?);
        }
        _ => {
            print_text_output(&frames);
        }
    }

    Ok(())
}

fn read_frames(
    backend: &dyn StorageBackend,
    start_offset: u64,
    limit: Option<usize>,
) -> Result<Vec<FrameInfo>, Box<dyn std::error::Error>> {
    let size = backend.size()?;
    if start_offset > size {
        return Err(format!("Offset {start_offset} is past the end of the journal ({size} bytes)").into());
    }

    let mut frames = Vec::new();
    for located in FrameIterator::new(backend, start_offset)?.take(limit.unwrap_or(usize::MAX)) {
        frames.push(FrameInfo::from(located?));
    }
    Ok(frames)
}

fn print_text_output(frames: &[FrameInfo]) {
    println!("{:>10}  {:<8}  {:>6}  DETAILS", "OFFSET", "TYPE", "SIZE");
    for frame in frames {
        let details = match frame.frame_type.as_str() {
            "BEGIN" => format!(
                "account={} device={} count={}{}",
                frame.account.as_deref().unwrap_or("-"),
                frame.device.as_deref().unwrap_or("-"),
                frame.count.unwrap_or(0),
                frame
                    .batch_id
                    .as_deref()
                    .map(|b| format!(" batch={b}"))
                    .unwrap_or_default()
            ),
            "MUTATION" => format!(
                "seq={} {} {} ({} bytes)",
                frame.sequence.unwrap_or(0),
                frame.operation.as_deref().unwrap_or("-"),
                frame.entity.as_deref().unwrap_or("-"),
                frame.payload_size.unwrap_or(0)
            ),
            _ => format!(
                "seq={}..={}",
                frame.sequence.unwrap_or(0),
                frame.last_sequence.unwrap_or(0)
            ),
        };
        println!(
            "{:>10}  {:<8}  {:>6}  {}",
            frame.offset, frame.frame_type, frame.size, details
        );
    }
    println!();
    println!("{} frames", frames.len());
}
