use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// One mutex per order id.
///
/// Two operations on the same order run one after the other; operations on
/// different orders never wait on each other beyond the brief map lookup.
#[derive(Debug, Default)]
pub struct OrderLocks {
    slots: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl OrderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock slot for `order_id`, created on first use.
    fn slot(&self, order_id: &str) -> Arc<Mutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(order_id.to_string()).or_default())
    }

    /// Run `f` while holding the order's lock. The slot is dropped from the
    /// map once nobody holds or waits on it.
    pub fn with_order<T>(&self, order_id: &str, f: impl FnOnce() -> T) -> T {
        // Declared first so it drops last, after our clone of the slot.
        let _checkout = Checkout {
            locks: self,
            order_id,
        };
        let slot = self.slot(order_id);
        // Operations never leave partial state behind, so a poisoned slot is safe to reuse.
        let _guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }

    /// Orders currently held or waited on.
    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Prunes the order's slot on drop when no other user holds a clone.
struct Checkout<'a> {
    locks: &'a OrderLocks,
    order_id: &'a str,
}

impl Drop for Checkout<'_> {
    fn drop(&mut self) {
        let mut slots = self
            .locks
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // New clones are only handed out under `slots`, so the count is stable here.
        if slots
            .get(self.order_id)
            .is_some_and(|s| Arc::strong_count(s) == 1)
        {
            slots.remove(self.order_id);
        }
    }
}
