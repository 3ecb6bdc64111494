use std::collections::HashMap;
use std::sync::Mutex;

use depotflow_core::DocumentNumber;

use super::{SequenceAllocator, SequenceError, SequenceKey};

/// In-memory counter table.
///
/// One mutex guards every counter; allocation is a single increment under it.
#[derive(Debug, Default)]
pub struct InMemorySequenceAllocator {
    counters: Mutex<HashMap<SequenceKey, u32>>,
}

impl InMemorySequenceAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prime `key` from document numbers issued before the counter existed.
    ///
    /// The counter moves to the highest trailing sequence found, never
    /// backwards. Numbers without a numeric suffix are ignored.
    pub fn seed_from_existing<'a>(
        &self,
        key: &SequenceKey,
        numbers: impl IntoIterator<Item = &'a str>,
    ) -> Result<u32, SequenceError> {
        let highest = numbers
            .into_iter()
            .filter_map(DocumentNumber::trailing_sequence)
            .max()
            .unwrap_or(0);

        let mut counters = self
            .counters
            .lock()
            .map_err(|_| SequenceError::Unavailable("lock poisoned".to_string()))?;
        let counter = counters.entry(key.clone()).or_insert(0);
        *counter = (*counter).max(highest);
        Ok(*counter)
    }

    /// Last value handed out for `key` (0 if none).
    pub fn current(&self, key: &SequenceKey) -> Result<u32, SequenceError> {
        let counters = self
            .counters
            .lock()
            .map_err(|_| SequenceError::Unavailable("lock poisoned".to_string()))?;
        Ok(counters.get(key).copied().unwrap_or(0))
    }
}

impl SequenceAllocator for InMemorySequenceAllocator {
    fn next(&self, key: &SequenceKey) -> Result<u32, SequenceError> {
        let mut counters = self
            .counters
            .lock()
            .map_err(|_| SequenceError::Unavailable("lock poisoned".to_string()))?;
        let counter = counters.entry(key.clone()).or_insert(0);
        *counter = counter
            .checked_add(1)
            .ok_or_else(|| SequenceError::Exhausted(key.to_string()))?;
        Ok(*counter)
    }
}
