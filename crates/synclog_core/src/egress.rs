//! Pull: page through the mutations other devices pushed.

use crate::error::CoreResult;
use crate::mutation::MutationRecord;
use crate::store::MutationStore;
use crate::types::{now_micros, AccountId, DeviceId, Sequence, Timestamp};
use std::sync::Arc;

/// Records returned per pull unless configured otherwise.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// One pull from an authenticated device.
#[derive(Debug, Clone)]
pub struct PullQuery {
    /// Account resolved by the identity layer.
    pub account: AccountId,
    /// Requesting device; its own mutations are left out.
    pub device: String,
    /// Cursor from the previous page; `None` starts from the beginning.
    pub since: Option<Sequence>,
}

/// One page of a pull.
#[derive(Debug, Clone)]
pub struct PullPage {
    /// Records in ascending sequence order.
    pub mutations: Vec<MutationRecord>,
    /// Server time when the page was read.
    pub server_time: Timestamp,
    /// True when the page is full and more records may follow.
    pub has_more: bool,
    /// Cursor to send as `since` for the next page.
    pub cursor: Sequence,
}

/// Serves pull pages from a store.
///
/// The page size is server policy; clients only control the cursor.
pub struct Egress {
    store: Arc<dyn MutationStore>,
    page_size: usize,
}

impl Egress {
    /// Creates an egress returning at most `page_size` records per page.
    pub fn new(store: Arc<dyn MutationStore>, page_size: usize) -> Self {
        Self {
            store,
            page_size: page_size.max(1),
        }
    }

    /// Returns the page size.
    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Returns the next page for the requesting device.
    ///
    /// `has_more` is true exactly when the page is full, so a client that
    /// keeps pulling with the returned cursor until it is false has seen
    /// every peer record committed before its last call.
    ///
    /// # Errors
    ///
    /// Returns [`crate::CoreError::InvalidInput`] for a bad device id, or
    /// the store's read error.
    pub fn pull(&self, query: PullQuery) -> CoreResult<PullPage> {
        let device = DeviceId::parse(&query.device)?;
        let since = query.since.unwrap_or(Sequence::ZERO);
        let server_time = now_micros();

        let mutations = self
            .store
            .query_after(&query.account, since, &device, self.page_size)?;
        let has_more = mutations.len() == self.page_size;
        let cursor = mutations.last().map_or(since, |m| m.sequence);

        tracing::debug!(
            account = %query.account,
            device = device.as_str(),
            since = since.as_u64(),
            returned = mutations.len(),
            has_more,
            "pull served"
        );

        Ok(PullPage {
            mutations,
            server_time,
            has_more,
            cursor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingress::{Ingress, IngressLimits, PendingMutation, PushCommand};
    use crate::store::JournalStore;
    use chrono::Utc;
    use serde_json::json;

    fn push(ingress: &Ingress, account: AccountId, device: &str, n: usize) {
        let mutations = (0..n)
            .map(|i| PendingMutation {
                entity_type: "order".into(),
                entity_id: format!("{device}-{i}"),
                operation: "create".into(),
                payload: json!({ "i": i }).to_string().into_bytes(),
                client_timestamp: Utc::now(),
            })
            .collect();
        ingress
            .push(PushCommand {
                account,
                device: device.into(),
                batch_id: None,
                mutations,
            })
            .unwrap();
    }

    fn setup(page_size: usize) -> (Ingress, Egress) {
        let store: Arc<dyn MutationStore> = Arc::new(JournalStore::open_in_memory().unwrap());
        (
            Ingress::new(Arc::clone(&store), IngressLimits::default()),
            Egress::new(store, page_size),
        )
    }

    fn query(account: AccountId, device: &str, since: Option<Sequence>) -> PullQuery {
        PullQuery {
            account,
            device: device.into(),
            since,
        }
    }

    #[test]
    fn pages_until_drained() {
        let (ingress, egress) = setup(3);
        let account = AccountId::new_v4();
        push(&ingress, account, "a", 7);

        let mut since = None;
        let mut seen = Vec::new();
        loop {
            let page = egress.pull(query(account, "b", since)).unwrap();
            seen.extend(page.mutations.iter().map(|m| m.sequence.as_u64()));
            since = Some(page.cursor);
            if !page.has_more {
                break;
            }
        }
        assert_eq!(seen, (1..=7).collect::<Vec<_>>());
    }

    #[test]
    fn full_last_page_is_followed_by_empty_page() {
        let (ingress, egress) = setup(2);
        let account = AccountId::new_v4();
        push(&ingress, account, "a", 2);

        let page = egress.pull(query(account, "b", None)).unwrap();
        assert!(page.has_more);
        let next = egress.pull(query(account, "b", Some(page.cursor))).unwrap();
        assert!(next.mutations.is_empty());
        assert!(!next.has_more);
        assert_eq!(next.cursor, page.cursor);
    }

    #[test]
    fn own_mutations_are_excluded() {
        let (ingress, egress) = setup(DEFAULT_PAGE_SIZE);
        let account = AccountId::new_v4();
        push(&ingress, account, "a", 2);
        push(&ingress, account, "b", 1);

        let page = egress.pull(query(account, "a", None)).unwrap();
        assert_eq!(page.mutations.len(), 1);
        assert_eq!(page.mutations[0].device_id.as_str(), "b");
        assert_eq!(page.cursor, Sequence::new(3));
    }

    #[test]
    fn empty_device_rejected() {
        let (_, egress) = setup(DEFAULT_PAGE_SIZE);
        let err = egress.pull(query(AccountId::new_v4(), "", None)).unwrap_err();
        assert!(err.is_client_error());
    }

    #[test]
    fn zero_page_size_is_clamped() {
        let (_, egress) = setup(0);
        assert_eq!(egress.page_size(), 1);
    }
}
