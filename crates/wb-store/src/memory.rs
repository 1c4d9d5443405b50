use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use wb_schemas::{IndexedLocation, LedgerRecord, Order};

use crate::{LedgerStore, LocationIndex, OrderLease, OrderStore, Store};

/// In-process store. Used by tests and embedders that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    orders: HashMap<String, Order>,
    /// Insertion order of `orders`.
    order_ids: Vec<String>,
    ledger: Vec<LedgerRecord>,
    locations: Vec<IndexedLocation>,
}

impl Inner {
    fn put_order(&mut self, order: &Order) {
        if self
            .orders
            .insert(order.order_id.clone(), order.clone())
            .is_none()
        {
            self.order_ids.push(order.order_id.clone());
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock cannot leave a half-written record:
        // every mutation below is a single push/insert.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Total records across all orders.
    pub fn ledger_len(&self) -> usize {
        self.lock().ledger.len()
    }

    /// Overwrite a stored ledger record in place. Only for tamper tests.
    #[doc(hidden)]
    pub fn tamper_with_record<F: FnOnce(&mut LedgerRecord)>(&self, transaction_id: &str, f: F) -> bool {
        let mut inner = self.lock();
        match inner
            .ledger
            .iter_mut()
            .find(|r| r.transaction_id == transaction_id)
        {
            Some(rec) => {
                f(rec);
                true
            }
            None => false,
        }
    }

    /// Drop a stored ledger record. Only for tamper tests.
    #[doc(hidden)]
    pub fn remove_record(&self, transaction_id: &str) -> bool {
        let mut inner = self.lock();
        let before = inner.ledger.len();
        inner.ledger.retain(|r| r.transaction_id != transaction_id);
        inner.ledger.len() != before
    }
}

impl OrderStore for MemoryStore {
    fn load_order(&self, order_id: &str) -> Result<Option<Order>> {
        Ok(self.lock().orders.get(order_id).cloned())
    }

    fn save_order(&self, order: &Order) -> Result<()> {
        self.lock().put_order(order);
        Ok(())
    }

    fn list_orders(&self) -> Result<Vec<Order>> {
        let inner = self.lock();
        Ok(inner
            .order_ids
            .iter()
            .filter_map(|id| inner.orders.get(id).cloned())
            .collect())
    }
}

impl LedgerStore for MemoryStore {
    fn append_ledger_record(&self, record: &LedgerRecord) -> Result<()> {
        self.lock().ledger.push(record.clone());
        Ok(())
    }

    fn query_ledger(&self, order_id: &str) -> Result<Vec<LedgerRecord>> {
        Ok(self
            .lock()
            .ledger
            .iter()
            .filter(|r| r.order_id == order_id)
            .cloned()
            .collect())
    }

    fn head_hash(&self, order_id: &str) -> Result<Option<String>> {
        Ok(self
            .lock()
            .ledger
            .iter()
            .rev()
            .find(|r| r.order_id == order_id)
            .map(|r| r.record_hash.clone()))
    }
}

impl LocationIndex for MemoryStore {
    fn append_location(&self, entry: &IndexedLocation) -> Result<()> {
        self.lock().locations.push(entry.clone());
        Ok(())
    }

    fn query_locations(&self, order_id: &str) -> Result<Vec<IndexedLocation>> {
        Ok(self
            .lock()
            .locations
            .iter()
            .filter(|l| l.order_id == order_id)
            .cloned()
            .collect())
    }
}

impl Store for MemoryStore {
    /// In-process only: the service's per-order lock is the whole story.
    fn lock_order(&self, _order_id: &str) -> Result<OrderLease> {
        Ok(OrderLease::unguarded())
    }

    fn commit(
        &self,
        order: &Order,
        record: &LedgerRecord,
        location: Option<&IndexedLocation>,
    ) -> Result<()> {
        let mut inner = self.lock();
        inner.put_order(order);
        inner.ledger.push(record.clone());
        if let Some(entry) = location {
            inner.locations.push(entry.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use wb_schemas::{EventType, OrderStatus};

    fn order(id: &str) -> Order {
        Order {
            order_id: id.to_string(),
            customer_id: "C1".to_string(),
            product_name: "Widget".to_string(),
            product_id: None,
            quantity: 1,
            status: OrderStatus::Pending,
            created_at: Utc::now(),
            delivered_at: None,
            gps_tracker_id: None,
            locations: Vec::new(),
            content_hash: String::new(),
            creation_transaction_id: String::new(),
            qr_code: None,
            delivery_proof: None,
        }
    }

    fn record(id: &str, hash: &str) -> LedgerRecord {
        LedgerRecord {
            transaction_id: format!("0x{hash}"),
            order_id: id.to_string(),
            event_type: EventType::StatusUpdated,
            timestamp: Utc::now(),
            payload: json!({}),
            prev_hash: None,
            record_hash: hash.to_string(),
        }
    }

    #[test]
    fn head_hash_tracks_newest_record_per_order() {
        let store = MemoryStore::new();
        assert_eq!(store.head_hash("ORD-1").unwrap(), None);

        store.commit(&order("ORD-1"), &record("ORD-1", "aa"), None).unwrap();
        store.commit(&order("ORD-2"), &record("ORD-2", "bb"), None).unwrap();
        store.commit(&order("ORD-1"), &record("ORD-1", "cc"), None).unwrap();

        assert_eq!(store.head_hash("ORD-1").unwrap().as_deref(), Some("cc"));
        assert_eq!(store.head_hash("ORD-2").unwrap().as_deref(), Some("bb"));
        assert_eq!(store.list_orders().unwrap().len(), 2);
    }
}
