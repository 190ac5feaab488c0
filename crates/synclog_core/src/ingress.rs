//! Push: accept a device's batch and append it atomically.

use crate::error::{CoreError, CoreResult};
use crate::mutation::{MutationInput, Payload};
use crate::store::{Batch, MutationStore};
use crate::types::{now_micros, truncate_micros, AccountId, BatchId, DeviceId, Timestamp};
use std::sync::Arc;

/// Maximum length of `entityType`, in characters.
pub const MAX_ENTITY_TYPE_LEN: usize = 50;
/// Maximum length of `entityId`, in characters.
pub const MAX_ENTITY_ID_LEN: usize = 255;
/// Maximum length of `operation`, in characters.
pub const MAX_OPERATION_LEN: usize = 20;

/// Bounds on what one push may carry.
#[derive(Debug, Clone)]
pub struct IngressLimits {
    /// Maximum number of mutations in one batch.
    pub max_batch: usize,
    /// Maximum serialized size of one payload.
    pub max_payload_bytes: usize,
}

impl Default for IngressLimits {
    fn default() -> Self {
        Self {
            max_batch: 500,
            max_payload_bytes: 1024 * 1024, // 1 MiB
        }
    }
}

impl IngressLimits {
    /// Sets the maximum batch size.
    #[must_use]
    pub const fn max_batch(mut self, value: usize) -> Self {
        self.max_batch = value;
        self
    }

    /// Sets the maximum payload size.
    #[must_use]
    pub const fn max_payload_bytes(mut self, value: usize) -> Self {
        self.max_payload_bytes = value;
        self
    }
}

/// A mutation as submitted by a device.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMutation {
    /// Kind of business object.
    pub entity_type: String,
    /// Identifier of the business object.
    pub entity_id: String,
    /// Mutation verb.
    pub operation: String,
    /// Change description as the serialized JSON the device sent; any
    /// document except `null`. Empty when the device sent none.
    pub payload: Vec<u8>,
    /// When the change happened on the device.
    pub client_timestamp: Timestamp,
}

/// One push from an authenticated device.
#[derive(Debug, Clone)]
pub struct PushCommand {
    /// Account resolved by the identity layer.
    pub account: AccountId,
    /// Pushing device.
    pub device: String,
    /// Optional idempotency token; a repeat is acknowledged without being
    /// appended again.
    pub batch_id: Option<String>,
    /// Mutations in device order.
    pub mutations: Vec<PendingMutation>,
}

/// Acknowledgement of a push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushReceipt {
    /// Number of mutations now in the log for this push.
    pub synced: usize,
    /// Server acceptance time of the batch.
    pub timestamp: Timestamp,
    /// True when the batch had already been accepted earlier.
    pub replayed: bool,
}

/// Validates pushes and hands them to the store as one batch.
///
/// Nothing reaches the store until the whole batch has been validated, so a
/// bad mutation anywhere in the batch rejects all of it.
pub struct Ingress {
    store: Arc<dyn MutationStore>,
    limits: IngressLimits,
}

impl Ingress {
    /// Creates an ingress over `store`.
    pub fn new(store: Arc<dyn MutationStore>, limits: IngressLimits) -> Self {
        Self { store, limits }
    }

    /// Returns the configured limits.
    #[must_use]
    pub fn limits(&self) -> &IngressLimits {
        &self.limits
    }

    /// Validates and appends a push.
    ///
    /// An empty batch is acknowledged with `synced = 0` and not stored.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] naming the first problem found,
    /// or the store's error if the append failed. In both cases none of the
    /// batch is visible.
    pub fn push(&self, command: PushCommand) -> CoreResult<PushReceipt> {
        let batch = match self.validate(command) {
            Ok(batch) => batch,
            Err(e) => {
                tracing::warn!(error = %e, "push rejected");
                return Err(e);
            }
        };

        if batch.mutations.is_empty() {
            return Ok(PushReceipt {
                synced: 0,
                timestamp: now_micros(),
                replayed: false,
            });
        }

        let appended = self.store.append(&batch)?;
        tracing::debug!(
            account = %batch.account,
            device = batch.device.as_str(),
            synced = appended.sequences.len(),
            replayed = appended.replayed,
            "push accepted"
        );

        Ok(PushReceipt {
            synced: appended.sequences.len(),
            timestamp: appended.server_timestamp,
            replayed: appended.replayed,
        })
    }

    fn validate(&self, command: PushCommand) -> CoreResult<Batch> {
        let device = DeviceId::parse(&command.device)?;
        let batch_id = command
            .batch_id
            .as_deref()
            .map(BatchId::parse)
            .transpose()?;

        if command.mutations.len() > self.limits.max_batch {
            return Err(CoreError::invalid_input(format!(
                "batch of {} mutations exceeds the limit of {}",
                command.mutations.len(),
                self.limits.max_batch
            )));
        }

        let mutations = command
            .mutations
            .into_iter()
            .enumerate()
            .map(|(i, m)| {
                self.validate_mutation(m)
                    .map_err(|e| CoreError::invalid_input(format!("mutation {i}: {}", reason(&e))))
            })
            .collect::<CoreResult<Vec<_>>>()?;

        Ok(Batch {
            account: command.account,
            device,
            batch_id,
            mutations,
        })
    }

    fn validate_mutation(&self, m: PendingMutation) -> CoreResult<MutationInput> {
        check_field("entityType", &m.entity_type, MAX_ENTITY_TYPE_LEN)?;
        check_field("entityId", &m.entity_id, MAX_ENTITY_ID_LEN)?;
        check_field("operation", &m.operation, MAX_OPERATION_LEN)?;

        let payload = Payload::from_bytes(m.payload)?;
        if payload.len() > self.limits.max_payload_bytes {
            return Err(CoreError::invalid_input(format!(
                "payload of {} bytes exceeds the limit of {}",
                payload.len(),
                self.limits.max_payload_bytes
            )));
        }

        Ok(MutationInput {
            entity_type: m.entity_type,
            entity_id: m.entity_id,
            operation: m.operation,
            payload,
            client_timestamp: truncate_micros(m.client_timestamp),
        })
    }
}

fn check_field(name: &str, value: &str, max: usize) -> CoreResult<()> {
    if value.is_empty() {
        return Err(CoreError::invalid_input(format!("{name} is required")));
    }
    if value.chars().count() > max {
        return Err(CoreError::invalid_input(format!(
            "{name} exceeds {max} characters"
        )));
    }
    Ok(())
}

fn reason(e: &CoreError) -> String {
    match e {
        CoreError::InvalidInput { message } => message.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::JournalStore;
    use crate::types::Sequence;
    use chrono::Utc;

    fn mutation(id: &str) -> PendingMutation {
        PendingMutation {
            entity_type: "customer".into(),
            entity_id: id.into(),
            operation: "create".into(),
            payload: br#"{"name":"Ada"}"#.to_vec(),
            client_timestamp: Utc::now(),
        }
    }

    fn setup() -> (Arc<JournalStore>, Ingress) {
        let store = Arc::new(JournalStore::open_in_memory().unwrap());
        let ingress = Ingress::new(store.clone(), IngressLimits::default());
        (store, ingress)
    }

    fn command(mutations: Vec<PendingMutation>) -> PushCommand {
        PushCommand {
            account: AccountId::new_v4(),
            device: "laptop".into(),
            batch_id: None,
            mutations,
        }
    }

    #[test]
    fn accepted_batch_reports_count() {
        let (store, ingress) = setup();
        let receipt = ingress
            .push(command(vec![mutation("c-1"), mutation("c-2")]))
            .unwrap();
        assert_eq!(receipt.synced, 2);
        assert!(!receipt.replayed);
        assert_eq!(store.head(), Sequence::new(2));
    }

    #[test]
    fn invalid_mutation_rejects_whole_batch() {
        let (store, ingress) = setup();
        let mut bad = mutation("c-2");
        bad.entity_type = String::new();

        let err = ingress
            .push(command(vec![mutation("c-1"), bad, mutation("c-3")]))
            .unwrap_err();
        assert!(err.is_client_error());
        assert_eq!(
            err.to_string(),
            "invalid input: mutation 1: entityType is required"
        );
        assert_eq!(store.head(), Sequence::ZERO);
    }

    #[test]
    fn field_limits() {
        let (_, ingress) = setup();

        let mut long_op = mutation("c-1");
        long_op.operation = "x".repeat(MAX_OPERATION_LEN + 1);
        let err = ingress.push(command(vec![long_op])).unwrap_err();
        assert!(err.to_string().contains("operation exceeds 20 characters"));

        let mut wide = mutation("c-1");
        wide.entity_type = "é".repeat(MAX_ENTITY_TYPE_LEN);
        assert!(ingress.push(command(vec![wide])).is_ok());

        let mut null = mutation("c-1");
        null.payload = b"null".to_vec();
        let err = ingress.push(command(vec![null])).unwrap_err();
        assert!(err.to_string().contains("mutation 0: payload is required"));

        let mut missing = mutation("c-1");
        missing.payload = Vec::new();
        let err = ingress.push(command(vec![mutation("c-0"), missing])).unwrap_err();
        assert!(err.to_string().contains("mutation 1: payload is required"));
    }

    #[test]
    fn batch_and_payload_size_limits() {
        let store = Arc::new(JournalStore::open_in_memory().unwrap());
        let ingress = Ingress::new(
            store,
            IngressLimits::default().max_batch(2).max_payload_bytes(16),
        );

        let err = ingress
            .push(command(vec![mutation("a"), mutation("b"), mutation("c")]))
            .unwrap_err();
        assert!(err.to_string().contains("exceeds the limit of 2"));

        let mut big = mutation("a");
        big.payload = br#"{"note":"far more than sixteen bytes"}"#.to_vec();
        let err = ingress.push(command(vec![big])).unwrap_err();
        assert!(err.to_string().contains("payload of"));
    }

    #[test]
    fn device_and_batch_id_checked() {
        let (_, ingress) = setup();

        let mut no_device = command(vec![mutation("c-1")]);
        no_device.device = String::new();
        assert!(ingress.push(no_device).unwrap_err().is_client_error());

        let mut empty_id = command(vec![mutation("c-1")]);
        empty_id.batch_id = Some(String::new());
        assert!(ingress.push(empty_id).unwrap_err().is_client_error());
    }

    #[test]
    fn empty_batch_is_noop() {
        let (store, ingress) = setup();
        let receipt = ingress.push(command(Vec::new())).unwrap();
        assert_eq!(receipt.synced, 0);
        assert_eq!(store.head(), Sequence::ZERO);
    }

    #[test]
    fn repeated_batch_id_is_replayed() {
        let (store, ingress) = setup();
        let mut push = command(vec![mutation("c-1")]);
        push.batch_id = Some("outbox-7".into());

        let first = ingress.push(push.clone()).unwrap();
        let second = ingress.push(push).unwrap();
        assert!(second.replayed);
        assert_eq!(second.synced, 1);
        assert_eq!(second.timestamp, first.timestamp);
        assert_eq!(store.head(), Sequence::new(1));
    }

    #[test]
    fn payload_reaches_the_store_as_sent() {
        let (store, ingress) = setup();
        let raw = br#"{"zeta":1,"amount":123456789012345678901234567890,"alpha":2}"#;
        let mut m = mutation("c-1");
        m.payload = raw.to_vec();
        let push = command(vec![m]);
        let account = push.account;
        ingress.push(push).unwrap();

        let other = DeviceId::parse("phone").unwrap();
        let records = store.query_after(&account, Sequence::ZERO, &other, 10).unwrap();
        assert_eq!(records[0].payload.as_bytes(), raw);
    }
}
