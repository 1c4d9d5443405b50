//! Scenario: a commit that cannot finish leaves no ledger line, no location
//! entry and no order change behind; leases on one order exclude each other
//! across independent store handles (as separate processes would hold them).

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::json;
use wb_schemas::{EventType, IndexedLocation, LedgerRecord, LocationFix, Order, OrderStatus};
use wb_store::{FileStore, LedgerStore, LocationIndex, OrderStore, Store};

fn order(id: &str, status: OrderStatus) -> Order {
    Order {
        order_id: id.to_string(),
        customer_id: "C1".to_string(),
        product_name: "Widget".to_string(),
        product_id: None,
        quantity: 5,
        status,
        created_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        delivered_at: None,
        gps_tracker_id: Some("GPS-1".to_string()),
        locations: Vec::new(),
        content_hash: "00".repeat(32),
        creation_transaction_id: format!("0x{}", "11".repeat(32)),
        qr_code: None,
        delivery_proof: None,
    }
}

fn record(order_id: &str, n: u32, prev_hash: Option<String>) -> LedgerRecord {
    LedgerRecord {
        transaction_id: format!("0x{:064x}", n),
        order_id: order_id.to_string(),
        event_type: EventType::LocationUpdated,
        timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 13, 0, n).unwrap(),
        payload: json!({"n": n}),
        prev_hash,
        record_hash: format!("{:064x}", n + 1000),
    }
}

fn location(order_id: &str, record_hash: &str) -> IndexedLocation {
    IndexedLocation {
        order_id: order_id.to_string(),
        fix: LocationFix {
            latitude: 40.7128,
            longitude: -74.006,
            gps_tracker_id: "GPS-1".to_string(),
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 13, 0, 0).unwrap(),
            signature: "ab".repeat(32),
        },
        record_hash: record_hash.to_string(),
    }
}

#[test]
fn failed_order_write_rolls_back_ledger_and_locations() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path()).unwrap();

    let first = record("ORD-1", 1, None);
    store
        .commit(&order("ORD-1", OrderStatus::Dispatched), &first, None)
        .unwrap();
    let ledger_before = std::fs::read(store.ledger_path()).unwrap();

    // A directory squatting on the temp path makes the order write fail.
    let blocker = dir.path().join("orders").join("ORD-1.json.tmp");
    std::fs::create_dir(&blocker).unwrap();

    let second = record("ORD-1", 2, Some(first.record_hash.clone()));
    let entry = location("ORD-1", &second.record_hash);
    let err = store
        .commit(&order("ORD-1", OrderStatus::InTransit), &second, Some(&entry))
        .unwrap_err();
    assert!(format!("{err:#}").contains("ORD-1.json.tmp"), "{err:#}");

    assert_eq!(std::fs::read(store.ledger_path()).unwrap(), ledger_before);
    assert!(store.query_locations("ORD-1").unwrap().is_empty());
    assert_eq!(
        store.load_order("ORD-1").unwrap().unwrap().status,
        OrderStatus::Dispatched
    );
    assert_eq!(
        store.head_hash("ORD-1").unwrap().as_deref(),
        Some(first.record_hash.as_str())
    );

    // Once the obstacle is gone the same commit goes through exactly once.
    std::fs::remove_dir(&blocker).unwrap();
    store
        .commit(&order("ORD-1", OrderStatus::InTransit), &second, Some(&entry))
        .unwrap();
    assert_eq!(store.query_ledger("ORD-1").unwrap(), vec![first, second.clone()]);
    assert_eq!(store.query_locations("ORD-1").unwrap(), vec![entry]);
    assert_eq!(
        store.head_hash("ORD-1").unwrap().as_deref(),
        Some(second.record_hash.as_str())
    );
}

#[test]
fn head_hash_sees_appends_from_another_handle() {
    let dir = tempfile::tempdir().unwrap();
    let a = FileStore::open(dir.path()).unwrap();
    let b = FileStore::open(dir.path()).unwrap();

    let r1 = record("ORD-1", 1, None);
    a.commit(&order("ORD-1", OrderStatus::Pending), &r1, None).unwrap();
    assert_eq!(b.head_hash("ORD-1").unwrap(), Some(r1.record_hash.clone()));

    let r2 = record("ORD-1", 2, Some(r1.record_hash.clone()));
    a.commit(&order("ORD-1", OrderStatus::Packed), &r2, None).unwrap();
    let other = record("ORD-2", 3, None);
    a.commit(&order("ORD-2", OrderStatus::Pending), &other, None).unwrap();

    assert_eq!(b.head_hash("ORD-1").unwrap(), Some(r2.record_hash));
    assert_eq!(b.head_hash("ORD-2").unwrap(), Some(other.record_hash));
    assert_eq!(b.head_hash("ORD-3").unwrap(), None);
}

#[test]
fn order_lease_excludes_a_second_store_handle() {
    let dir = tempfile::tempdir().unwrap();
    let a = FileStore::open(dir.path()).unwrap();
    let root = dir.path().to_path_buf();

    let held = a.lock_order("ORD-1").unwrap();

    let (tx, rx) = mpsc::channel();
    let waiter = thread::spawn(move || {
        let b = FileStore::open(&root).unwrap();
        let _lease = b.lock_order("ORD-1").unwrap();
        tx.send(()).unwrap();
    });

    assert!(
        rx.recv_timeout(Duration::from_millis(300)).is_err(),
        "second handle acquired a held order"
    );

    // Other orders are not blocked.
    let _other = a.lock_order("ORD-2").unwrap();

    drop(held);
    rx.recv_timeout(Duration::from_secs(10))
        .expect("lease should be acquired once released");
    waiter.join().unwrap();
}
