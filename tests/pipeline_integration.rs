//! Integration tests for enumeration, collection and filtering.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use regfind::activate::LogActivator;
use regfind::pipeline::{
    stream_entries, CollectedStore, Enumerator, FilterEngine, FilteredView, KeyMatch, Presenter,
    SearchState, Session,
};
use regfind::store::{load_snapshot, KeyFaults, MemoryStore, StoredValue, ValueKind};
use regfind::Config;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const SNAPSHOT: &str = r#"{
    "roots": [
        {
            "name": "HKEY_CURRENT_USER",
            "keys": [
                {
                    "name": "Software",
                    "keys": [
                        {
                            "name": "Foo",
                            "values": [
                                {"name": "Bar", "type": "REG_SZ", "data": "hello world"},
                                {"name": "Count", "type": "REG_DWORD", "data": 1}
                            ]
                        }
                    ]
                },
                {
                    "name": "Environment",
                    "values": [
                        {"name": "Path", "type": "REG_EXPAND_SZ", "data": "C:\\bin"}
                    ]
                }
            ]
        },
        {
            "name": "HKEY_USERS",
            "values": [
                {"name": "Blob", "type": "REG_BINARY", "data": "DEAD"},
                {"name": "Names", "type": "REG_MULTI_SZ", "data": ["a", "b"]},
                {"name": "Big", "type": "REG_QWORD", "data": 4294967296}
            ]
        }
    ]
}"#;

fn write_snapshot(tmp: &TempDir) -> std::path::PathBuf {
    let path = tmp.path().join("store.json");
    std::fs::write(&path, SNAPSHOT).unwrap();
    path
}

fn roots(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| (*n).to_string()).collect()
}

/// Build a wide store: `roots` roots, each with `keys` keys of `values` values.
fn wide_store(roots: usize, keys: usize, values: usize) -> MemoryStore {
    let mut store = MemoryStore::new();
    for r in 0..roots {
        let root = store.add_root(format!("R{r}"));
        for k in 0..keys {
            let key = store.add_key(root, format!("K{k}"));
            for v in 0..values {
                store.add_value(
                    key,
                    StoredValue::new(format!("V{v}"), ValueKind::Dword, vec![1, 0, 0, 0]),
                );
            }
        }
    }
    store
}

/// Test that the combined stream equals the union of each root's walk.
#[tokio::test]
async fn test_stream_is_complete_across_roots() {
    let store = Arc::new(wide_store(3, 20, 5));
    let names = roots(&["R0", "R1", "R2"]);

    let mut expected = HashSet::new();
    for name in &names {
        let enumerator = Enumerator::new(Arc::clone(&store), name.as_str());
        for entry in enumerator.walk().unwrap() {
            expected.insert((entry.path().to_string(), entry.name().to_string()));
        }
    }

    let mut rx = stream_entries(&store, &names, &CancellationToken::new()).unwrap();
    let mut seen = Vec::new();
    while let Some(entry) = rx.recv().await {
        seen.push((entry.path().to_string(), entry.name().to_string()));
    }

    // 3 roots x (1 + 20 keys x (1 sentinel + 5 values))
    assert_eq!(seen.len(), 3 * (1 + 20 * 6));
    let unique: HashSet<_> = seen.into_iter().collect();
    assert_eq!(unique, expected);
}

/// Test that entries of one root arrive in traversal order.
#[tokio::test]
async fn test_stream_keeps_per_root_order() {
    let store = Arc::new(wide_store(2, 10, 3));
    let names = roots(&["R0", "R1"]);

    let walk_order = |root: &str| -> Vec<String> {
        Enumerator::new(Arc::clone(&store), root)
            .walk()
            .unwrap()
            .map(|e| format!("{}|{}", e.path(), e.name()))
            .collect()
    };
    let expected_r0 = walk_order("R0");

    let mut rx = stream_entries(&store, &names, &CancellationToken::new()).unwrap();
    let mut r0 = Vec::new();
    while let Some(entry) = rx.recv().await {
        if entry.path().starts_with("R0") {
            r0.push(format!("{}|{}", entry.path(), entry.name()));
        }
    }
    assert_eq!(r0, expected_r0);
}

/// Test that failing roots and subtrees do not stop the rest of the scan.
#[tokio::test]
async fn test_failures_stay_local() {
    let mut store = MemoryStore::new();
    let good = store.add_root("Good");
    let locked = store.add_key(good, "Locked");
    store.add_key(locked, "Secret");
    store.add_key(good, "Open");
    store.set_faults(
        locked,
        KeyFaults {
            stat: true,
            ..KeyFaults::default()
        },
    );
    let denied = store.add_root("Denied");
    store.set_faults(
        denied,
        KeyFaults {
            open: true,
            ..KeyFaults::default()
        },
    );

    let store = Arc::new(store);
    let mut rx = stream_entries(
        &store,
        &roots(&["Denied", "Missing", "Good"]),
        &CancellationToken::new(),
    )
    .unwrap();

    let mut paths = Vec::new();
    while let Some(entry) = rx.recv().await {
        paths.push(entry.path().to_string());
    }
    assert_eq!(paths, vec!["Good", "Good\\Open"]);
}

/// Test that a stream where every root is unavailable simply ends.
#[tokio::test]
async fn test_all_roots_unavailable() {
    let store = Arc::new(MemoryStore::new());
    let mut rx = stream_entries(
        &store,
        &roots(&["HKEY_CURRENT_USER", "HKEY_USERS"]),
        &CancellationToken::new(),
    )
    .unwrap();
    assert!(rx.recv().await.is_none());
}

/// Test that cancelling drops remaining work but keeps what was collected.
#[tokio::test]
async fn test_cancel_drops_remaining_work() {
    let store = Arc::new(wide_store(1, 2_000, 10));
    let cancel = CancellationToken::new();
    let mut rx = stream_entries(&store, &roots(&["R0"]), &cancel).unwrap();

    let collected = CollectedStore::new();
    for _ in 0..10 {
        collected.append(rx.recv().await.unwrap());
    }
    cancel.cancel();
    drop(rx);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let reads = store.read_attempts();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(store.read_attempts(), reads);
    assert!(reads < 2_000 * 10);
    assert_eq!(collected.len(), 10);
}

/// Test the snapshot file end to end: load, enumerate, render, filter.
#[tokio::test]
async fn test_snapshot_end_to_end() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(load_snapshot(write_snapshot(&tmp)).unwrap());

    let rx = stream_entries(
        &store,
        &roots(&["HKEY_CURRENT_USER", "HKEY_USERS"]),
        &CancellationToken::new(),
    )
    .unwrap();
    let collected = CollectedStore::new();
    let total = collected.collect(rx, CancellationToken::new()).await;
    assert_eq!(total, 11);
    assert!(collected.is_complete());

    let engine = FilterEngine::new(KeyMatch::Prefix);
    let snapshot = collected.snapshot();

    let hello = engine.filter(&snapshot, &SearchState::keyword("HELLO world"));
    assert_eq!(hello.len(), 1);
    assert_eq!(hello[0].path(), "HKEY_CURRENT_USER\\Software\\Foo");
    assert_eq!(hello[0].value(), "hello world");

    let values = |name: &str| -> String {
        snapshot
            .iter()
            .find(|e| e.name() == name)
            .map(|e| e.value().to_string())
            .unwrap()
    };
    assert_eq!(values("Count"), "0x00000001");
    assert_eq!(values("Blob"), "dead");
    assert_eq!(values("Names"), "a, b");
    assert_eq!(values("Big"), "0x0000000100000000");
    assert_eq!(values("Path"), "C:\\bin");

    let users = engine.filter(
        &snapshot,
        &SearchState::default().with_key_filter("HKEY_USERS"),
    );
    assert_eq!(users.len(), 4);

    let strings = engine.filter(
        &snapshot,
        &SearchState::default().with_type_filter("REG_SZ"),
    );
    assert_eq!(strings.len(), 1);
}

struct Latest(Arc<Mutex<Option<FilteredView>>>);

impl Presenter for Latest {
    fn on_filtered_view_changed(&mut self, view: FilteredView) {
        *self.0.lock() = Some(view);
    }
}

/// Test that a live session converges on the full filtered set.
#[tokio::test]
async fn test_session_converges() {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(load_snapshot(write_snapshot(&tmp)).unwrap());

    let latest = Arc::new(Mutex::new(None));
    let config = Config {
        roots: roots(&["HKEY_CURRENT_USER", "HKEY_USERS"]),
        quiet_period: Duration::from_millis(20),
        refresh_interval: Duration::from_millis(20),
        ..Config::default()
    };
    let session = Session::start(
        store,
        &config,
        Latest(Arc::clone(&latest)),
        Arc::new(LogActivator::new()),
    )
    .unwrap();

    session.set_keyword("software");
    session.wait_scan_complete().await;

    let mut view = None;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        let current = latest.lock().clone();
        if let Some(v) = current {
            if v.state.keyword == "software" && v.entries.len() == 4 {
                view = Some(v);
                break;
            }
        }
    }

    let view = view.expect("session should deliver a view over the full set");
    assert_eq!(view.entries.len(), 4);
    assert!(view.entries.iter().all(|e| e.path().contains("Software")));

    session.shutdown().await.unwrap();
}
