//! End-to-end tests of push and pull over the journal store.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::thread;
use synclog_core::{
    AccountId, CoreError, Egress, Ingress, IngressLimits, JournalStore, MutationStore,
    PendingMutation, PullQuery, PushCommand, Sequence, StoreConfig, DEFAULT_PAGE_SIZE,
};
use synclog_storage::InMemoryBackend;
use tempfile::tempdir;

struct Harness {
    store: Arc<dyn MutationStore>,
    ingress: Ingress,
    egress: Egress,
}

impl Harness {
    fn over(store: Arc<dyn MutationStore>) -> Self {
        Self {
            ingress: Ingress::new(Arc::clone(&store), IngressLimits::default()),
            egress: Egress::new(Arc::clone(&store), DEFAULT_PAGE_SIZE),
            store,
        }
    }

    fn in_memory() -> Self {
        Self::over(Arc::new(JournalStore::open_in_memory().unwrap()))
    }

    fn push(&self, account: AccountId, device: &str, ids: &[&str]) -> Result<usize, CoreError> {
        self.ingress
            .push(PushCommand {
                account,
                device: device.into(),
                batch_id: None,
                mutations: ids.iter().map(|id| mutation(id)).collect(),
            })
            .map(|r| r.synced)
    }

    fn pull_all(&self, account: AccountId, device: &str) -> Vec<String> {
        let mut since = None;
        let mut ids = Vec::new();
        loop {
            let page = self
                .egress
                .pull(PullQuery {
                    account,
                    device: device.into(),
                    since,
                })
                .unwrap();
            ids.extend(page.mutations.into_iter().map(|m| m.entity_id));
            since = Some(page.cursor);
            if !page.has_more {
                return ids;
            }
        }
    }
}

fn mutation(id: &str) -> PendingMutation {
    PendingMutation {
        entity_type: "invoice".into(),
        entity_id: id.into(),
        operation: "update".into(),
        payload: json!({ "id": id, "total": 42 }).to_string().into_bytes(),
        client_timestamp: Utc::now(),
    }
}

#[test]
fn two_devices_converge() {
    let h = Harness::in_memory();
    let a1 = AccountId::new_v4();

    assert_eq!(h.push(a1, "d1", &["i-1", "i-2", "i-3"]).unwrap(), 3);

    let page = h
        .egress
        .pull(PullQuery {
            account: a1,
            device: "d2".into(),
            since: None,
        })
        .unwrap();
    let ids: Vec<_> = page.mutations.iter().map(|m| m.entity_id.as_str()).collect();
    assert_eq!(ids, ["i-1", "i-2", "i-3"]);
    assert!(!page.has_more);
    assert_eq!(page.mutations[0].payload.to_json().unwrap()["total"], 42);
    assert_eq!(page.mutations[0].account_id, a1);
    assert_eq!(page.mutations[0].device_id.as_str(), "d1");

    assert!(h.pull_all(a1, "d1").is_empty());

    let mut bad = mutation("i-5");
    bad.entity_type = String::new();
    let err = h
        .ingress
        .push(PushCommand {
            account: a1,
            device: "d1".into(),
            batch_id: None,
            mutations: vec![mutation("i-4"), bad],
        })
        .unwrap_err();
    assert!(err.is_client_error());
    assert_eq!(h.pull_all(a1, "d2").len(), 3);
}

#[test]
fn accounts_never_see_each_other() {
    let h = Harness::in_memory();
    let a1 = AccountId::new_v4();
    let a2 = AccountId::new_v4();

    h.push(a1, "shared-device-name", &["a1-x"]).unwrap();
    h.push(a2, "shared-device-name", &["a2-x"]).unwrap();

    assert_eq!(h.pull_all(a1, "other"), ["a1-x"]);
    assert_eq!(h.pull_all(a2, "other"), ["a2-x"]);
}

#[test]
fn cursor_only_sees_new_records() {
    let h = Harness::in_memory();
    let account = AccountId::new_v4();
    h.push(account, "d1", &["one"]).unwrap();

    let first = h
        .egress
        .pull(PullQuery {
            account,
            device: "d2".into(),
            since: None,
        })
        .unwrap();
    h.push(account, "d1", &["two"]).unwrap();
    let second = h
        .egress
        .pull(PullQuery {
            account,
            device: "d2".into(),
            since: Some(first.cursor),
        })
        .unwrap();

    assert_eq!(second.mutations.len(), 1);
    assert_eq!(second.mutations[0].entity_id, "two");
    assert!(second.mutations[0].sequence > first.cursor);
}

#[test]
fn storage_failure_leaves_no_records() {
    let backend = InMemoryBackend::new();
    let store = Arc::new(
        JournalStore::with_backend(Box::new(backend.clone()), StoreConfig::default()).unwrap(),
    );
    let h = Harness::over(store);
    let account = AccountId::new_v4();

    backend.fail_appends(true);
    let err = h.push(account, "d1", &["a", "b", "c"]).unwrap_err();
    assert!(!err.is_client_error());
    assert!(h.pull_all(account, "d2").is_empty());

    backend.fail_appends(false);
    h.push(account, "d1", &["d"]).unwrap();
    assert_eq!(h.pull_all(account, "d2"), ["d"]);
    assert_eq!(h.store.head(), Sequence::new(1));
}

#[test]
fn concurrent_pushes_stay_contiguous() {
    let h = Harness::in_memory();
    let account = AccountId::new_v4();
    let devices = ["d0", "d1", "d2", "d3"];

    thread::scope(|s| {
        for device in devices {
            let h = &h;
            s.spawn(move || {
                for round in 0..10 {
                    let ids: Vec<String> = (0..5).map(|i| format!("{device}-{round}-{i}")).collect();
                    let refs: Vec<&str> = ids.iter().map(String::as_str).collect();
                    h.push(account, device, &refs).unwrap();
                }
            });
        }
    });

    let records = h
        .store
        .query_after(
            &account,
            Sequence::ZERO,
            &synclog_core::DeviceId::parse("reader").unwrap(),
            usize::MAX,
        )
        .unwrap();
    assert_eq!(records.len(), 200);

    for (i, chunk) in records.chunks(5).enumerate() {
        assert_eq!(chunk[0].sequence, Sequence::new(i as u64 * 5 + 1));
        assert!(chunk.iter().all(|r| r.device_id == chunk[0].device_id));
        assert!(chunk
            .iter()
            .all(|r| r.server_timestamp == chunk[0].server_timestamp));
        assert!(chunk.windows(2).all(|w| w[1].sequence == w[0].sequence.next()));
    }
}

#[test]
fn reopened_store_keeps_serving() {
    let temp = tempdir().unwrap();
    let account = AccountId::new_v4();
    {
        let h = Harness::over(Arc::new(
            JournalStore::open(temp.path(), StoreConfig::default()).unwrap(),
        ));
        h.push(account, "d1", &["a", "b"]).unwrap();
    }

    let h = Harness::over(Arc::new(
        JournalStore::open(temp.path(), StoreConfig::default().sync_on_commit(false)).unwrap(),
    ));
    h.push(account, "d1", &["c"]).unwrap();
    assert_eq!(h.pull_all(account, "d2"), ["a", "b", "c"]);
    assert_eq!(h.store.head(), Sequence::new(3));
}
