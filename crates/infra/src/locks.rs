//! Per-document mutual exclusion.
//!
//! Every engine operation that reads an order and writes back something
//! derived from it (receipt, backorder, return) holds the order's lock from
//! load to commit. The store's version check still rejects writers that
//! bypass the engine.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use depotflow_core::CompanyId;
use depotflow_purchasing::PurchaseOrderId;

use crate::store::StoreError;

/// Lock scope: one purchase order of one company.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct DocumentKey {
    pub company_id: CompanyId,
    pub order_id: PurchaseOrderId,
}

impl DocumentKey {
    pub fn new(company_id: CompanyId, order_id: PurchaseOrderId) -> Self {
        Self {
            company_id,
            order_id,
        }
    }
}

/// Registry of keyed mutexes. Entries are dropped once nobody holds them.
#[derive(Debug, Default)]
pub struct DocumentLocks {
    cells: Mutex<HashMap<DocumentKey, Arc<Mutex<()>>>>,
}

impl DocumentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn acquire(&self, key: DocumentKey) -> Result<Arc<Mutex<()>>, StoreError> {
        let mut cells = self
            .cells
            .lock()
            .map_err(|_| StoreError::Unavailable("document lock registry poisoned".to_string()))?;
        Ok(cells.entry(key).or_default().clone())
    }

    fn release(&self, key: DocumentKey, cell: Arc<Mutex<()>>) {
        // Clones are only taken and dropped under the registry lock, so the
        // count is stable here.
        if let Ok(mut cells) = self.cells.lock() {
            // One reference in the map, one here: nobody else is waiting.
            let idle = Arc::strong_count(&cell) == 2
                && cells.get(&key).is_some_and(|c| Arc::ptr_eq(c, &cell));
            drop(cell);
            if idle {
                cells.remove(&key);
            }
        }
    }

    /// Run `f` while holding the lock of `key`.
    pub fn with_lock<T, E>(&self, key: DocumentKey, f: impl FnOnce() -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let cell = self.acquire(key)?;
        let result = {
            let _guard = cell
                .lock()
                .map_err(|_| StoreError::Unavailable(format!("lock of order {} poisoned", key.order_id)))?;
            f()
        };
        self.release(key, cell);
        result
    }

    /// Number of keys currently tracked.
    pub fn tracked(&self) -> usize {
        self.cells.lock().map(|c| c.len()).unwrap_or(0)
    }
}
