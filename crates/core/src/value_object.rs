//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attributes; "changing"
/// one means building a new value. Document numbers are the canonical example
/// here: `PO-ACME-171026-3` is equal to any other `PO-ACME-171026-3`, no matter
/// which order carries it.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
