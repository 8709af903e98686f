use core::hash::Hash;
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::{Arc, OnceLock},
};

/// A memoizing map that runs at most one load per key at a time.
///
/// The first caller for a key runs the load; callers arriving while it runs
/// block on the same slot and receive a clone of its result. Successes that
/// pass `keep` are retained for the lifetime of the map. Failures, and
/// successes `keep` rejects, are handed to everyone who was waiting on them
/// and then forgotten, so the next caller loads again.
pub(crate) struct SingleFlight<K, T, E> {
    slots: Mutex<HashMap<K, Arc<OnceLock<Result<T, E>>>>>,
}

impl<K, T, E> Default for SingleFlight<K, T, E> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, T, E> SingleFlight<K, T, E>
where
    K: Eq + Hash + Clone,
    T: Clone,
    E: Clone,
{
    pub(crate) fn get_or_load(
        &self,
        key: &K,
        load: impl FnOnce() -> Result<T, E>,
        keep: impl FnOnce(&T) -> bool,
    ) -> Result<T, E> {
        // The map lock is never held while loading.
        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(key.clone()).or_default())
        };

        let result = slot.get_or_init(load).clone();

        if !result.as_ref().is_ok_and(keep) {
            let mut slots = self.slots.lock();
            if slots.get(key).is_some_and(|current| Arc::ptr_eq(current, &slot)) {
                slots.remove(key);
            }
        }
        result
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.slots.lock().len()
    }
}
