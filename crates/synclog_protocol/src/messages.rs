//! Request and response bodies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use synclog_core::{
    AccountId, CoreError, CoreResult, MutationRecord, PendingMutation, PullPage, PullQuery, PushCommand,
    PushReceipt, Sequence,
};

/// One mutation inside a push.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationPayload {
    /// Kind of business object, e.g. `"invoice"`.
    pub entity_type: String,
    /// Identifier of the business object.
    pub entity_id: String,
    /// Mutation verb, e.g. `"create"`.
    pub operation: String,
    /// Change description, kept as the exact JSON text the device sent.
    /// Absent and `null` both read as `None` and are rejected on push.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Box<RawValue>>,
    /// When the change happened on the device.
    pub client_timestamp: DateTime<Utc>,
}

/// Body of `POST /api/sync/push`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    /// Pushing device.
    pub device_id: String,
    /// Optional idempotency token for safe retries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    /// Mutations in device order.
    #[serde(default)]
    pub mutations: Vec<MutationPayload>,
}

impl PushRequest {
    /// Attaches the authenticated account.
    pub fn into_command(self, account: AccountId) -> PushCommand {
        PushCommand {
            account,
            device: self.device_id,
            batch_id: self.batch_id,
            mutations: self
                .mutations
                .into_iter()
                .map(|m| PendingMutation {
                    entity_type: m.entity_type,
                    entity_id: m.entity_id,
                    operation: m.operation,
                    payload: m
                        .payload
                        .map(|raw| raw.get().as_bytes().to_vec())
                        .unwrap_or_default(),
                    client_timestamp: m.client_timestamp,
                })
                .collect(),
        }
    }
}

/// Reply to a successful push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResponse {
    /// Number of mutations in the log for this push.
    pub synced: usize,
    /// Server acceptance time.
    pub timestamp: DateTime<Utc>,
    /// Present and true when the batch was already accepted earlier.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub replayed: bool,
}

impl From<PushReceipt> for PushResponse {
    fn from(receipt: PushReceipt) -> Self {
        Self {
            synced: receipt.synced,
            timestamp: receipt.timestamp,
            replayed: receipt.replayed,
        }
    }
}

/// Body of `POST /api/sync/pull`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    /// Requesting device.
    pub device_id: String,
    /// Cursor from the previous response; absent or null for the first pull.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>,
}

impl PullRequest {
    /// Attaches the authenticated account.
    pub fn into_query(self, account: AccountId) -> PullQuery {
        PullQuery {
            account,
            device: self.device_id,
            since: self.since.map(Sequence::new),
        }
    }
}

/// A stored mutation as delivered to a peer device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationEnvelope {
    /// Server-assigned sequence number.
    pub id: u64,
    /// Owning account.
    pub user_id: String,
    /// Kind of business object.
    pub entity_type: String,
    /// Identifier of the business object.
    pub entity_id: String,
    /// Mutation verb.
    pub operation: String,
    /// Change description, byte-for-byte as pushed.
    pub payload: Box<RawValue>,
    /// Device that pushed the mutation.
    pub device_id: String,
    /// Device-asserted time of the change.
    pub client_timestamp: DateTime<Utc>,
    /// Server acceptance time.
    pub server_timestamp: DateTime<Utc>,
}

impl MutationEnvelope {
    /// Builds the wire form of a stored record.
    ///
    /// # Errors
    ///
    /// Fails only if the stored payload is no longer UTF-8 JSON.
    pub fn from_record(record: MutationRecord) -> CoreResult<Self> {
        let text = String::from_utf8(record.payload.into_bytes()).map_err(|e| {
            CoreError::journal_corruption(format!("stored payload is not UTF-8: {e}"))
        })?;
        let payload = RawValue::from_string(text).map_err(|e| {
            CoreError::journal_corruption(format!("stored payload is not JSON: {e}"))
        })?;

        Ok(Self {
            id: record.sequence.as_u64(),
            user_id: record.account_id.to_string(),
            payload,
            entity_type: record.entity_type,
            entity_id: record.entity_id,
            operation: record.operation,
            device_id: record.device_id.as_str().to_owned(),
            client_timestamp: record.client_timestamp,
            server_timestamp: record.server_timestamp,
        })
    }
}

/// Reply to a pull.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    /// Records in ascending `id` order.
    pub mutations: Vec<MutationEnvelope>,
    /// Server time when the page was read.
    pub server_time: DateTime<Utc>,
    /// True when the page was full; pull again with `cursor`.
    pub has_more: bool,
    /// Value to send as `since` next time.
    pub cursor: u64,
}

impl PullResponse {
    /// Builds the wire form of a page.
    ///
    /// # Errors
    ///
    /// Fails only if a stored payload is no longer UTF-8 JSON.
    pub fn from_page(page: PullPage) -> CoreResult<Self> {
        Ok(Self {
            mutations: page
                .mutations
                .into_iter()
                .map(MutationEnvelope::from_record)
                .collect::<CoreResult<_>>()?,
            server_time: page.server_time,
            has_more: page.has_more,
            cursor: page.cursor.as_u64(),
        })
    }
}

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the server is serving.
    pub status: String,
}

impl HealthResponse {
    /// The healthy response.
    pub fn ok() -> Self {
        Self {
            status: "ok".into(),
        }
    }
}

/// Body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable description.
    pub error: String,
    /// Stable machine-readable code, e.g. `"invalid_request"`.
    pub code: String,
}

impl ErrorBody {
    /// Creates an error body.
    pub fn new(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
        }
    }
}
