use std::sync::{Arc, Mutex, MutexGuard};

use tabular_contract::Dataset;

pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// The live dataset of a session, readable by its periodic save task.
///
/// Only the handle is swapped; datasets themselves are immutable.
#[derive(Debug, Clone, Default)]
pub struct SharedDataset {
    slot: Arc<Mutex<Option<Arc<Dataset>>>>,
}

impl SharedDataset {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self) -> Option<Arc<Dataset>> {
        lock_unpoisoned(&self.slot).clone()
    }

    pub fn set(&self, dataset: Arc<Dataset>) {
        *lock_unpoisoned(&self.slot) = Some(dataset);
    }

    pub fn clear(&self) -> Option<Arc<Dataset>> {
        lock_unpoisoned(&self.slot).take()
    }
}
