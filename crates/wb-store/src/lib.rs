//! wb-store
//!
//! Persistence contract for the order-ledger engine plus two reference
//! backends.
//!
//! # Contract
//! - `save_order` and `append_ledger_record` are durable before they return `Ok`.
//! - `append_ledger_record` is atomic: a record is either fully visible or absent.
//! - [`Store::commit`] is all or nothing across the order document, the
//!   ledger record and the location entry.
//! - Query results come back in append order.
//! - `load_order` returns `Ok(None)` for unknown ids; `Err` is reserved for
//!   infrastructure faults.
//!
//! [`Store::lock_order`] excludes other holders of the same order, including
//! other processes sharing a [`FileStore`] directory. In-process callers
//! still serialize through the service's per-order lock first.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use anyhow::Result;
use wb_schemas::{IndexedLocation, LedgerRecord, Order};

/// Order documents keyed by `order_id`.
pub trait OrderStore: Send + Sync {
    fn load_order(&self, order_id: &str) -> Result<Option<Order>>;
    /// Insert or replace.
    fn save_order(&self, order: &Order) -> Result<()>;
    /// All orders, oldest first.
    fn list_orders(&self) -> Result<Vec<Order>>;
}

/// Shared append-only ledger.
pub trait LedgerStore: Send + Sync {
    fn append_ledger_record(&self, record: &LedgerRecord) -> Result<()>;
    /// Records for `order_id`, in append order.
    fn query_ledger(&self, order_id: &str) -> Result<Vec<LedgerRecord>>;

    /// `record_hash` of the newest record for `order_id`.
    fn head_hash(&self, order_id: &str) -> Result<Option<String>> {
        Ok(self
            .query_ledger(order_id)?
            .pop()
            .map(|r| r.record_hash))
    }
}

/// Standalone location index.
pub trait LocationIndex: Send + Sync {
    fn append_location(&self, entry: &IndexedLocation) -> Result<()>;
    /// Entries for `order_id`, in append order.
    fn query_locations(&self, order_id: &str) -> Result<Vec<IndexedLocation>>;
}

/// Everything the order service needs from persistence.
pub trait Store: OrderStore + LedgerStore + LocationIndex {
    /// Exclusive hold on `order_id` until the lease drops.
    fn lock_order(&self, order_id: &str) -> Result<OrderLease>;

    /// Persist one accepted event: the updated order, its ledger record and
    /// the location entry it produced, if any. On `Err` none of them is
    /// visible.
    fn commit(
        &self,
        order: &Order,
        record: &LedgerRecord,
        location: Option<&IndexedLocation>,
    ) -> Result<()>;
}

/// Held for the length of one order operation. Dropping it releases the
/// order.
#[must_use = "the order is released as soon as the lease drops"]
pub struct OrderLease {
    _held: Option<Box<dyn Send>>,
}

impl OrderLease {
    /// A lease with nothing to release (single-process stores).
    pub fn unguarded() -> Self {
        Self { _held: None }
    }

    /// Keeps `held` alive until the lease drops.
    pub fn holding<T: Send + 'static>(held: T) -> Self {
        Self {
            _held: Some(Box::new(held)),
        }
    }
}

impl std::fmt::Debug for OrderLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderLease")
            .field("guarded", &self._held.is_some())
            .finish()
    }
}
