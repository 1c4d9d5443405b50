//! wb-ledger
//!
//! Append-only, per-order hash-chained transaction log.
//!
//! Every record carries `record_hash` over `(order_id, event_type, payload,
//! timestamp, prev_hash)` and `prev_hash` pointing at the previous record of
//! the same order. [`LedgerEngine::verify_record`] catches edited records;
//! [`LedgerEngine::verify_chain`] additionally catches deleted or reordered
//! ones.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Value};
use tracing::debug;
use wb_schemas::{EventType, LedgerRecord};
use wb_store::LedgerStore;

/// Appends and reads ledger records through a shared [`LedgerStore`].
#[derive(Debug)]
pub struct LedgerEngine<L: ?Sized> {
    store: Arc<L>,
}

impl<L: ?Sized> Clone for LedgerEngine<L> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<L: LedgerStore + ?Sized> LedgerEngine<L> {
    pub fn new(store: Arc<L>) -> Self {
        Self { store }
    }

    /// Build the next record for `order_id`, stamped now and linked to the
    /// order's current chain head, without storing it.
    ///
    /// The caller persists it (usually through `Store::commit`, together
    /// with the state change it describes) before preparing the next one
    /// for the same order.
    pub fn prepare(&self, order_id: &str, event_type: EventType, payload: Value) -> Result<LedgerRecord> {
        let prev_hash = self.store.head_hash(order_id)?;
        let timestamp = Utc::now();
        let record_hash =
            compute_record_hash(order_id, event_type, &payload, &timestamp, prev_hash.as_deref());

        Ok(LedgerRecord {
            transaction_id: wb_codec::new_transaction_id(),
            order_id: order_id.to_string(),
            event_type,
            timestamp,
            payload,
            prev_hash,
            record_hash,
        })
    }

    /// [`prepare`](Self::prepare) and store the record on its own.
    ///
    /// Callers must serialize appends for the same order; appends for
    /// different orders may run concurrently.
    pub fn append(&self, order_id: &str, event_type: EventType, payload: Value) -> Result<LedgerRecord> {
        let record = self.prepare(order_id, event_type, payload)?;
        self.store.append_ledger_record(&record)?;
        debug!(
            order_id,
            event_type = %event_type,
            transaction_id = %record.transaction_id,
            "ledger record appended"
        );
        Ok(record)
    }

    /// All records for `order_id`, oldest first. Empty when none exist.
    pub fn history_for(&self, order_id: &str) -> Result<LedgerHistory> {
        Ok(LedgerHistory {
            records: self.store.query_ledger(order_id)?,
        })
    }

    /// Recompute `record_hash` from the stored fields and compare.
    pub fn verify_record(&self, record: &LedgerRecord) -> bool {
        verify_record(record)
    }

    /// Walk the order's records checking both hashes and links.
    pub fn verify_chain(&self, order_id: &str) -> Result<ChainVerdict> {
        Ok(verify_chain(self.history_for(order_id)?.iter()))
    }
}

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

/// The exact projection hashed into `record_hash`.
///
/// `transaction_id` is deliberately outside the hash: it identifies the
/// record, it does not describe the event.
pub fn compute_record_hash(
    order_id: &str,
    event_type: EventType,
    payload: &Value,
    timestamp: &DateTime<Utc>,
    prev_hash: Option<&str>,
) -> String {
    let projection = json!({
        "order_id": order_id,
        "event_type": event_type.as_str(),
        "payload": payload,
        "timestamp": timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        "prev_hash": prev_hash,
    });
    wb_codec::content_hash(&projection)
}

/// Free-function form of [`LedgerEngine::verify_record`].
pub fn verify_record(record: &LedgerRecord) -> bool {
    let recomputed = compute_record_hash(
        &record.order_id,
        record.event_type,
        &record.payload,
        &record.timestamp,
        record.prev_hash.as_deref(),
    );
    recomputed == record.record_hash
}

/// Verify a sequence of records belonging to one order, in append order.
pub fn verify_chain<'a, I>(records: I) -> ChainVerdict
where
    I: IntoIterator<Item = &'a LedgerRecord>,
{
    let mut prev_hash: Option<&str> = None;
    let mut count = 0usize;

    for (index, rec) in records.into_iter().enumerate() {
        count += 1;

        if rec.prev_hash.as_deref() != prev_hash {
            return ChainVerdict::Broken {
                index,
                transaction_id: rec.transaction_id.clone(),
                reason: format!(
                    "prev_hash mismatch: expected {:?}, got {:?}",
                    prev_hash, rec.prev_hash
                ),
            };
        }

        if !verify_record(rec) {
            return ChainVerdict::Broken {
                index,
                transaction_id: rec.transaction_id.clone(),
                reason: format!("record_hash mismatch: stored {}", rec.record_hash),
            };
        }

        prev_hash = Some(rec.record_hash.as_str());
    }

    ChainVerdict::Intact { records: count }
}

/// Result of chain verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainVerdict {
    /// Every record verifies and links to its predecessor.
    Intact { records: usize },
    /// The chain breaks at `index` (0-based, append order).
    Broken {
        index: usize,
        transaction_id: String,
        reason: String,
    },
}

impl ChainVerdict {
    pub fn is_intact(&self) -> bool {
        matches!(self, ChainVerdict::Intact { .. })
    }
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

/// One order's records in append order. Iterate as often as needed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerHistory {
    records: Vec<LedgerRecord>,
}

impl LedgerHistory {
    pub fn iter(&self) -> std::slice::Iter<'_, LedgerRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn last(&self) -> Option<&LedgerRecord> {
        self.records.last()
    }

    pub fn into_vec(self) -> Vec<LedgerRecord> {
        self.records
    }
}

impl<'a> IntoIterator for &'a LedgerHistory {
    type Item = &'a LedgerRecord;
    type IntoIter = std::slice::Iter<'a, LedgerRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl IntoIterator for LedgerHistory {
    type Item = LedgerRecord;
    type IntoIter = std::vec::IntoIter<LedgerRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wb_store::MemoryStore;

    fn engine() -> LedgerEngine<MemoryStore> {
        LedgerEngine::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn first_record_has_no_prev_and_second_links_to_first() {
        let ledger = engine();
        let a = ledger
            .append("ORD-1", EventType::Created, json!({"customer_id": "C1"}))
            .unwrap();
        let b = ledger
            .append("ORD-1", EventType::Dispatched, json!({"gps_tracker_id": "GPS-1"}))
            .unwrap();

        assert!(a.prev_hash.is_none());
        assert_eq!(b.prev_hash.as_deref(), Some(a.record_hash.as_str()));
        assert!(wb_codec::is_transaction_id(&a.transaction_id));
        assert_ne!(a.transaction_id, b.transaction_id);
        assert!(ledger.verify_record(&a));
        assert!(ledger.verify_record(&b));
    }

    #[test]
    fn prepare_does_not_store() {
        let ledger = engine();
        let head = ledger.append("ORD-1", EventType::Created, json!({})).unwrap();
        let draft = ledger
            .prepare("ORD-1", EventType::Dispatched, json!({}))
            .unwrap();

        assert_eq!(draft.prev_hash.as_deref(), Some(head.record_hash.as_str()));
        assert!(verify_record(&draft));
        assert_eq!(ledger.history_for("ORD-1").unwrap().len(), 1);

        // Dropping a draft leaves the head where it was.
        let again = ledger
            .prepare("ORD-1", EventType::Dispatched, json!({}))
            .unwrap();
        assert_eq!(again.prev_hash, draft.prev_hash);
    }

    #[test]
    fn chains_are_per_order() {
        let ledger = engine();
        ledger.append("ORD-1", EventType::Created, json!({})).unwrap();
        let other = ledger.append("ORD-2", EventType::Created, json!({})).unwrap();
        assert!(other.prev_hash.is_none(), "ORD-2 must not link to ORD-1");
    }

    #[test]
    fn any_field_edit_breaks_record_hash() {
        let ledger = engine();
        let rec = ledger
            .append("ORD-1", EventType::Created, json!({"quantity": 5}))
            .unwrap();

        let mut edited = rec.clone();
        edited.payload = json!({"quantity": 50});
        assert!(!verify_record(&edited));

        let mut edited = rec.clone();
        edited.event_type = EventType::Delivered;
        assert!(!verify_record(&edited));

        let mut edited = rec.clone();
        edited.timestamp += chrono::Duration::seconds(1);
        assert!(!verify_record(&edited));

        let mut edited = rec.clone();
        edited.order_id = "ORD-2".into();
        assert!(!verify_record(&edited));

        let mut edited = rec;
        edited.prev_hash = Some("00".repeat(32));
        assert!(!verify_record(&edited));
    }

    #[test]
    fn empty_history_is_intact() {
        let ledger = engine();
        let h = ledger.history_for("ORD-none").unwrap();
        assert!(h.is_empty());
        assert_eq!(
            ledger.verify_chain("ORD-none").unwrap(),
            ChainVerdict::Intact { records: 0 }
        );
    }

    #[test]
    fn history_is_restartable() {
        let ledger = engine();
        for _ in 0..3 {
            ledger.append("ORD-1", EventType::StatusUpdated, json!({})).unwrap();
        }
        let h = ledger.history_for("ORD-1").unwrap();
        let first: Vec<_> = h.iter().map(|r| r.transaction_id.clone()).collect();
        let second: Vec<_> = (&h).into_iter().map(|r| r.transaction_id.clone()).collect();
        assert_eq!(first, second);
        assert_eq!(h.len(), 3);
    }
}
