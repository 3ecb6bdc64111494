//! `depotflow-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod aggregate;
pub mod error;
pub mod id;
pub mod number;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult, FieldViolation};
pub use id::{AggregateId, CompanyId, ItemId, StatusId, StoreId, SupplierId, UserId};
pub use number::{DocumentNumber, NumberPrefix};
pub use value_object::ValueObject;
