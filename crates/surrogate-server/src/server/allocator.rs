//! Get-or-create resolution of business keys.
//!
//! The store's uniqueness constraint is the only arbiter between racing
//! creators. [`Allocator::resolve`] never locks anything itself: it reads,
//! tries an insert, and on failure reads again until it observes the row that
//! won. Any number of allocators, in any number of processes, may share one
//! store.

use crate::server::{
    error::{Error, Result},
    store::{Inserted, Store},
};
use surrogate::{BusinessKey, EntityKind, validate_analysis_id};
use tracing::{debug, warn};
use uuid::Uuid;

/// Produces candidate analysis ids.
pub trait IdSource: Send + Sync + 'static {
    fn next_id(&self) -> String;
}

/// Time-ordered (version 7) UUIDs, which keep inserts close to the end of
/// the index.
#[derive(Clone, Copy, Debug, Default)]
pub struct UuidV7;

impl IdSource for UuidV7 {
    fn next_id(&self) -> String {
        Uuid::now_v7().to_string()
    }
}

pub struct Allocator<S, R = UuidV7> {
    store: S,
    ids: R,
    max_create_attempts: usize,
    max_random_attempts: usize,
}

impl<S: Store> Allocator<S> {
    pub const fn new(store: S, max_create_attempts: usize, max_random_attempts: usize) -> Self {
        Self::with_id_source(store, UuidV7, max_create_attempts, max_random_attempts)
    }
}

impl<S: Store, R: IdSource> Allocator<S, R> {
    pub const fn with_id_source(
        store: S,
        ids: R,
        max_create_attempts: usize,
        max_random_attempts: usize,
    ) -> Self {
        Self {
            store,
            ids,
            max_create_attempts,
            max_random_attempts,
        }
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Returns the id mapped to `key`, creating it first when `create` is set.
    ///
    /// `Ok(None)` means absent and not created. Lost insert races are retried
    /// up to the configured cap; reaching it is [`Error::Exhausted`].
    /// [`Error::Unavailable`] is returned as soon as the store reports it.
    #[tracing::instrument(level = "debug", skip(self, key), fields(kind = %key.kind()))]
    pub fn resolve(&self, key: &BusinessKey, release: &str, create: bool) -> Result<Option<String>> {
        if let Some(id) = self.store.find(key)? {
            return Ok(Some(id));
        }
        if !create {
            return Ok(None);
        }

        for attempt in 1..=self.max_create_attempts {
            match self.store.insert(key, release) {
                Ok(Inserted { id, rows: 1 }) => return Ok(Some(id)),
                Ok(Inserted { rows, .. }) => {
                    return Err(Error::Store(format!("insert changed {rows} rows, expected 1")));
                }
                Err(err @ Error::Unavailable(_)) => return Err(err),
                Err(Error::Conflict) => debug!(attempt, "Lost insert race"),
                // Treated as a race too; the re-read decides.
                Err(err) => warn!(attempt, %err, "Insert failed"),
            }

            if let Some(id) = self.store.find(key)? {
                return Ok(Some(id));
            }
        }

        Err(Error::Exhausted {
            kind: key.kind(),
            attempts: self.max_create_attempts,
        })
    }

    /// Resolves an analysis id.
    ///
    /// An empty `submitted` id with `create` mints a fresh random id; without
    /// `create` it is rejected. A missing id with `create = false` is
    /// [`Error::NotFound`].
    pub fn analysis_id(&self, submitted: &str, create: bool) -> Result<String> {
        let submitted = if submitted.is_empty() {
            if !create {
                return Err(Error::InvalidRequest {
                    reason: "submittedAnalysisId is required when create=false".to_string(),
                });
            }
            self.unused_candidate()?
        } else {
            validate_analysis_id(submitted)?;
            submitted.to_string()
        };

        self.resolve(&BusinessKey::analysis(submitted), "", create)?
            .ok_or(Error::NotFound {
                kind: EntityKind::Analysis,
            })
    }

    fn unused_candidate(&self) -> Result<String> {
        for _ in 0..self.max_random_attempts {
            let candidate = self.ids.next_id();
            if self.store.find(&BusinessKey::analysis(candidate.as_str()))?.is_none() {
                return Ok(candidate);
            }
            warn!(%candidate, "Random analysis id already exists");
        }
        Err(Error::RandomExhausted {
            attempts: self.max_random_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::store::SqliteStore;
    use core::time::Duration;
    use parking_lot::Mutex;
    use std::{
        collections::HashSet,
        io::Write,
        path::Path,
        sync::{
            Arc, Barrier,
            atomic::{AtomicUsize, Ordering},
        },
        thread,
    };
    use surrogate::{FormatError, validate_id};

    fn sqlite(path: &Path) -> SqliteStore {
        SqliteStore::open(path, 2, Duration::from_secs(10)).unwrap()
    }

    fn allocator(dir: &tempfile::TempDir) -> Allocator<SqliteStore> {
        Allocator::new(sqlite(&dir.path().join("ids.db")), 1000, 100)
    }

    #[test]
    fn creation_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let allocator = allocator(&dir);
        let key = BusinessKey::mutation("1", "100", "101", "A>G", "snv", "GRCh37");

        let id = allocator.resolve(&key, "ICGC22", true).unwrap().unwrap();
        validate_id(&id, EntityKind::Mutation).unwrap();
        for _ in 0..5 {
            assert_eq!(allocator.resolve(&key, "ICGC23", true).unwrap().as_deref(), Some(id.as_str()));
            assert_eq!(allocator.resolve(&key, "", false).unwrap().as_deref(), Some(id.as_str()));
        }
    }

    #[test]
    fn absence_then_creation() {
        let dir = tempfile::tempdir().unwrap();
        let allocator = allocator(&dir);
        let key = BusinessKey::specimen("SP-1", "P1");

        assert_eq!(allocator.resolve(&key, "", false).unwrap(), None);
        let created = allocator.resolve(&key, "", true).unwrap();
        assert!(created.is_some());
        assert_eq!(allocator.resolve(&key, "", false).unwrap(), created);
    }

    #[test]
    fn concurrent_allocators_converge_on_one_id() {
        const ALLOCATORS: usize = 8;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ids.db");
        // Create the schema before the race.
        drop(sqlite(&path));

        let barrier = Arc::new(Barrier::new(ALLOCATORS));
        let handles: Vec<_> = (0..ALLOCATORS)
            .map(|_| {
                let path = path.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let allocator = Allocator::new(sqlite(&path), 1000, 100);
                    barrier.wait();
                    let key = BusinessKey::donor("S1", "P1");
                    allocator.resolve(&key, "ICGC22", true).unwrap().unwrap()
                })
            })
            .collect();

        let ids: HashSet<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(ids.len(), 1, "{ids:?}");

        let mut export = Vec::new();
        sqlite(&path).export(EntityKind::Donor, &mut export).unwrap();
        assert_eq!(String::from_utf8(export).unwrap().lines().count(), 1);
    }

    /// A store where every insert loses a race that never becomes visible.
    #[derive(Default)]
    struct PhantomRace {
        inserts: AtomicUsize,
        failure: Option<Error>,
        rows: Option<usize>,
    }

    impl Store for PhantomRace {
        fn find(&self, _: &BusinessKey) -> Result<Option<String>> {
            Ok(None)
        }

        fn insert(&self, _: &BusinessKey, _: &str) -> Result<Inserted> {
            self.inserts.fetch_add(1, Ordering::SeqCst);
            match (&self.failure, self.rows) {
                (_, Some(rows)) => Ok(Inserted {
                    id: "DO1".to_string(),
                    rows,
                }),
                (Some(failure), None) => Err(failure.clone()),
                (None, None) => Err(Error::Conflict),
            }
        }

        fn export(&self, _: EntityKind, _: &mut dyn Write) -> Result<u64> {
            Ok(0)
        }
    }

    #[test]
    fn create_loop_is_bounded() {
        let allocator = Allocator::new(PhantomRace::default(), 7, 1);

        let err = allocator
            .resolve(&BusinessKey::file("f"), "", true)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Exhausted {
                kind: EntityKind::File,
                attempts: 7
            }
        ));
        assert_eq!(allocator.store().inserts.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn unexpected_store_errors_are_retried_like_races() {
        let allocator = Allocator::new(
            PhantomRace {
                failure: Some(Error::Store("disk I/O error".to_string())),
                ..PhantomRace::default()
            },
            3,
            1,
        );

        assert!(matches!(
            allocator.resolve(&BusinessKey::file("f"), "", true),
            Err(Error::Exhausted { attempts: 3, .. })
        ));
        assert_eq!(allocator.store().inserts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn busy_store_fails_fast() {
        let allocator = Allocator::new(
            PhantomRace {
                failure: Some(Error::Unavailable("database is locked".to_string())),
                ..PhantomRace::default()
            },
            1000,
            1,
        );

        assert!(matches!(
            allocator.resolve(&BusinessKey::file("f"), "", true),
            Err(Error::Unavailable(_))
        ));
        assert_eq!(allocator.store().inserts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn insert_touching_other_than_one_row_is_fatal() {
        let allocator = Allocator::new(
            PhantomRace {
                rows: Some(0),
                ..PhantomRace::default()
            },
            1000,
            1,
        );

        assert!(matches!(
            allocator.resolve(&BusinessKey::file("f"), "", true),
            Err(Error::Store(_))
        ));
        assert_eq!(allocator.store().inserts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn submitted_analysis_ids() {
        let dir = tempfile::tempdir().unwrap();
        let allocator = allocator(&dir);

        assert!(matches!(
            allocator.analysis_id("AN-1", false),
            Err(Error::NotFound {
                kind: EntityKind::Analysis
            })
        ));
        assert_eq!(allocator.analysis_id("AN-1", true).unwrap(), "AN-1");
        assert_eq!(allocator.analysis_id("AN-1", false).unwrap(), "AN-1");
        assert!(matches!(
            allocator.analysis_id("bad id!", true),
            Err(Error::Format(FormatError::AnalysisId { .. }))
        ));
        assert!(matches!(
            allocator.analysis_id("", false),
            Err(Error::InvalidRequest { .. })
        ));
    }

    #[test]
    fn random_analysis_ids_are_registered() {
        let dir = tempfile::tempdir().unwrap();
        let allocator = allocator(&dir);

        let first = allocator.analysis_id("", true).unwrap();
        let second = allocator.analysis_id("", true).unwrap();
        assert_ne!(first, second);
        validate_id(&first, EntityKind::Analysis).unwrap();
        assert_eq!(allocator.analysis_id(&first, false).unwrap(), first);
    }

    /// Replays a fixed list of candidates.
    struct Scripted(Mutex<Vec<&'static str>>);

    impl IdSource for Scripted {
        fn next_id(&self) -> String {
            self.0.lock().pop().unwrap_or("exhausted").to_string()
        }
    }

    #[test]
    fn colliding_candidates_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = sqlite(&dir.path().join("ids.db"));
        store.insert(&BusinessKey::analysis("taken"), "").unwrap();

        let allocator = Allocator::with_id_source(store, Scripted(Mutex::new(vec!["fresh", "taken"])), 10, 2);
        assert_eq!(allocator.analysis_id("", true).unwrap(), "fresh");
    }

    #[test]
    fn random_generation_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let store = sqlite(&dir.path().join("ids.db"));
        store.insert(&BusinessKey::analysis("taken"), "").unwrap();

        let allocator = Allocator::with_id_source(
            store,
            Scripted(Mutex::new(vec!["taken", "taken", "taken"])),
            10,
            3,
        );
        assert!(matches!(
            allocator.analysis_id("", true),
            Err(Error::RandomExhausted { attempts: 3 })
        ));
    }
}
