//! # synclog core
//!
//! The mutation-log synchronization engine.
//!
//! Devices belonging to one account converge on shared business records by
//! exchanging *mutations* through a server-held, append-only log instead of
//! exchanging whole records. This crate owns that log:
//!
//! - [`journal`] - the durable frame format and its crash-recovery policy
//! - [`JournalStore`] - the [`MutationStore`]: atomic batch append,
//!   server-assigned sequence numbers, account-scoped cursor queries
//! - [`Ingress`] - push: validate a device's batch and append it atomically
//! - [`Egress`] - pull: page through the peers' mutations after a cursor
//!
//! Identity (which account a request belongs to) and transport are supplied
//! by the caller; see `synclog_server`.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use chrono::Utc;
//! use synclog_core::*;
//!
//! let store: Arc<dyn MutationStore> = Arc::new(JournalStore::open_in_memory().unwrap());
//! let ingress = Ingress::new(Arc::clone(&store), IngressLimits::default());
//! let egress = Egress::new(store, DEFAULT_PAGE_SIZE);
//! let account = AccountId::new_v4();
//!
//! ingress
//!     .push(PushCommand {
//!         account,
//!         device: "laptop".into(),
//!         batch_id: None,
//!         mutations: vec![PendingMutation {
//!             entity_type: "invoice".into(),
//!             entity_id: "inv-1".into(),
//!             operation: "create".into(),
//!             payload: br#"{"total":120}"#.to_vec(),
//!             client_timestamp: Utc::now(),
//!         }],
//!     })
//!     .unwrap();
//!
//! let page = egress
//!     .pull(PullQuery { account, device: "phone".into(), since: None })
//!     .unwrap();
//! assert_eq!(page.mutations.len(), 1);
//! assert!(!page.has_more);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod dir;
mod egress;
mod error;
mod ingress;
pub mod journal;
mod mutation;
mod store;
mod types;

pub use config::StoreConfig;
pub use egress::{Egress, PullPage, PullQuery, DEFAULT_PAGE_SIZE};
pub use error::{CoreError, CoreResult};
pub use ingress::{
    Ingress, IngressLimits, PendingMutation, PushCommand, PushReceipt, MAX_ENTITY_ID_LEN,
    MAX_ENTITY_TYPE_LEN, MAX_OPERATION_LEN,
};
pub use mutation::{MutationInput, MutationRecord, Payload};
pub use store::{Appended, Batch, JournalStore, MutationStore};
pub use types::{AccountId, BatchId, DeviceId, Sequence, Timestamp};

/// Version of the synclog core crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// File name of the journal inside a store directory.
pub const JOURNAL_FILE: &str = "mutations.log";
