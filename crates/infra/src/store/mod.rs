//! Record store boundary.
//!
//! Orders, returns and inventory records are persisted as current state plus
//! version. One engine operation produces one [`Changeset`], committed all or
//! nothing.

pub mod changeset;
pub mod in_memory;
pub mod r#trait;

pub use changeset::{Changeset, Staged, expected_from};
pub use in_memory::InMemoryProcurementStore;
pub use r#trait::{ProcurementStore, StoreError};
