//! Infrastructure layer: the procurement engine and the adapters it runs on
//! (record store, sequence counters, document locks, configuration).

pub mod catalog;
pub mod engine;
pub mod error;
pub mod locks;
pub mod sequence;
pub mod settings;
pub mod store;

pub use engine::{
    Collaborators, NewPurchaseOrder, NewReturnRequest, ProcurementEngine, ReturnRevision,
};
pub use error::EngineError;
pub use settings::{EngineSettings, SequenceBackend};

#[cfg(test)]
mod test_support;

mod integration_tests;
