use crate::{Error, IdClient, Result, flight::SingleFlight};
use std::collections::HashMap;
use surrogate::{BusinessKey, EntityKind, object_id};

type CacheKey = (Vec<String>, bool);

/// Memoizes another client's lookups for the lifetime of the process.
///
/// There is one cache per entity kind, keyed by `(business key, create)`.
/// Concurrent calls for the same key are coalesced onto a single upstream
/// call and all observe its result. Mappings never change once created, so
/// present ids are never evicted. Failures and absences are handed to the
/// callers waiting on them and then forgotten.
///
/// Object ids are derived locally and random analysis ids go straight to the
/// wrapped client. Neither touches a cache.
pub struct CachingIdClient<C> {
    delegate: C,
    caches: HashMap<EntityKind, SingleFlight<CacheKey, Option<String>, Error>>,
}

impl<C: IdClient> CachingIdClient<C> {
    pub fn new(delegate: C) -> Self {
        let caches = EntityKind::ALL
            .into_iter()
            .filter(|kind| *kind != EntityKind::Object)
            .map(|kind| (kind, SingleFlight::default()))
            .collect();
        Self { delegate, caches }
    }

    pub const fn delegate(&self) -> &C {
        &self.delegate
    }
}

impl<C: IdClient> IdClient for CachingIdClient<C> {
    fn resolve(&self, key: &BusinessKey, create: bool) -> Result<Option<String>> {
        if key.kind() == EntityKind::Object {
            if let [analysis_id, file_name] = key.fields() {
                return Ok(Some(object_id(analysis_id, file_name)));
            }
        }

        match self.caches.get(&key.kind()) {
            Some(cache) => cache.get_or_load(
                &(key.fields().to_vec(), create),
                || self.delegate.resolve(key, create),
                Option::is_some,
            ),
            None => self.delegate.resolve(key, create),
        }
    }

    fn create_random_analysis_id(&self) -> Result<String> {
        self.delegate.create_random_analysis_id()
    }

    fn export(&self, kind: EntityKind) -> Result<String> {
        self.delegate.export(kind)
    }
}
