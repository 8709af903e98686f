use super::{ExportSource, HttpExportSource, lock::FileLock};
use crate::{Error, ExportConfig, Result};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use std::{
    collections::HashMap,
    fs,
    io::BufRead,
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
};
use surrogate::{BusinessKey, EntityKind, KEY_DELIMITER, format_id};
use tracing::{debug, info, warn};

const PROGRESS_EVERY: u64 = 1_000_000;

const CREATE_TABLE: &str = "
    PRAGMA journal_mode = OFF;
    PRAGMA synchronous = OFF;
    CREATE TABLE ids (
        key TEXT PRIMARY KEY NOT NULL,
        id  INTEGER NOT NULL
    ) WITHOUT ROWID;
";

struct CachePaths {
    db: PathBuf,
    lock: PathBuf,
    partial: PathBuf,
}

impl CachePaths {
    fn new(dir: &Path, kind: EntityKind) -> Self {
        Self {
            db: dir.join(format!("{kind}.db")),
            lock: dir.join(format!("{kind}.db.lock")),
            partial: dir.join(format!("{kind}.db.partial")),
        }
    }
}

/// Serves id lookups for whole entity kinds from local disk.
///
/// A kind is loaded on first access: under its file lock, an existing map is
/// verified and reused, otherwise the export is downloaded and a fresh map is
/// built. A map that fails verification is treated as corrupt, deleted, and
/// rebuilt. A failed download fails that lookup only; the kind stays unloaded
/// and the next lookup tries again.
///
/// Several processes may share one directory; only one of them ever builds a
/// given kind.
pub struct ExportIdCache<S = HttpExportSource> {
    dir: PathBuf,
    source: S,
    maps: HashMap<EntityKind, Mutex<Option<Connection>>>,
    closed: AtomicBool,
}

impl ExportIdCache {
    /// A cache downloading from the service described by `config`.
    pub fn new(dir: impl Into<PathBuf>, config: ExportConfig) -> Result<Self> {
        Ok(Self::with_source(dir, HttpExportSource::new(config)?))
    }
}

impl<S: ExportSource> ExportIdCache<S> {
    pub fn with_source(dir: impl Into<PathBuf>, source: S) -> Self {
        let maps = EntityKind::SEQUENCED
            .into_iter()
            .map(|kind| (kind, Mutex::new(None)))
            .collect();
        Self {
            dir: dir.into(),
            source,
            maps,
            closed: AtomicBool::new(false),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub const fn source(&self) -> &S {
        &self.source
    }

    /// Whether `kind`'s map is open.
    pub fn is_loaded(&self, kind: EntityKind) -> bool {
        self.maps
            .get(&kind)
            .is_some_and(|map| map.lock().is_some())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Looks up the id of `key`, loading its kind first if needed.
    pub fn get_id(&self, key: &BusinessKey) -> Result<Option<String>> {
        let kind = key.kind();
        let Some(map) = self.maps.get(&kind) else {
            return Err(Error::ExportNotSupported { kind });
        };
        if self.is_closed() {
            return Err(Error::Closed);
        }

        let mut map = map.lock();
        // Closing may have started while this thread waited.
        if self.is_closed() {
            return Err(Error::Closed);
        }
        let conn = match map.take() {
            Some(conn) => conn,
            None => self.load(kind)?,
        };
        let conn = map.insert(conn);

        let sequence: Option<i64> = conn
            .prepare_cached("SELECT id FROM ids WHERE key = ?1")
            .and_then(|mut stmt| stmt.query_row([key.joined()], |row| row.get(0)).optional())
            .map_err(|e| Error::cache(kind, e))?;

        match sequence {
            Some(sequence) => {
                let sequence = u64::try_from(sequence).map_err(|e| Error::cache(kind, e))?;
                Ok(Some(format_id(kind, sequence)?))
            }
            None => Ok(None),
        }
    }

    pub fn get_donor_id(&self, submitted_donor_id: &str, submitted_project_id: &str) -> Result<Option<String>> {
        self.get_id(&BusinessKey::donor(submitted_donor_id, submitted_project_id))
    }

    pub fn get_specimen_id(&self, submitted_specimen_id: &str, submitted_project_id: &str) -> Result<Option<String>> {
        self.get_id(&BusinessKey::specimen(submitted_specimen_id, submitted_project_id))
    }

    pub fn get_sample_id(&self, submitted_sample_id: &str, submitted_project_id: &str) -> Result<Option<String>> {
        self.get_id(&BusinessKey::sample(submitted_sample_id, submitted_project_id))
    }

    pub fn get_mutation_id(
        &self,
        chromosome: &str,
        chromosome_start: &str,
        chromosome_end: &str,
        mutation: &str,
        mutation_type: &str,
        assembly_version: &str,
    ) -> Result<Option<String>> {
        self.get_id(&BusinessKey::mutation(
            chromosome,
            chromosome_start,
            chromosome_end,
            mutation,
            mutation_type,
            assembly_version,
        ))
    }

    pub fn get_file_id(&self, submitted_file_id: &str) -> Result<Option<String>> {
        self.get_id(&BusinessKey::file(submitted_file_id))
    }

    pub fn get_project_id(&self, submitted_project_id: &str) -> Result<Option<String>> {
        self.get_id(&BusinessKey::project(submitted_project_id))
    }

    /// Closes every open map. Later lookups fail with [`Error::Closed`] and no
    /// new load starts; a load already running finishes first.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        for (kind, map) in &self.maps {
            if map.lock().take().is_some() {
                debug!("Closed {kind} cache");
            }
        }
        info!(dir = %self.dir.display(), "Export cache closed");
    }

    fn load(&self, kind: EntityKind) -> Result<Connection> {
        fs::create_dir_all(&self.dir).map_err(|e| Error::cache(kind, e))?;
        let paths = CachePaths::new(&self.dir, kind);

        info!(lock = %paths.lock.display(), "Acquiring {kind} cache lock");
        let lock = FileLock::acquire(&paths.lock).map_err(|e| Error::cache(kind, e))?;

        if paths.db.exists() {
            match open_verified(&paths.db, kind) {
                Ok(conn) => {
                    info!(db = %paths.db.display(), "{kind} cache present, skipping download");
                    return Ok(conn);
                }
                Err(err) => {
                    warn!(db = %paths.db.display(), %err, "{kind} cache failed verification, rebuilding");
                    fs::remove_file(&paths.db).map_err(|e| Error::cache(kind, e))?;
                }
            }
        }

        let rows = self.build(kind, &paths)?;
        drop(lock);
        info!(rows, db = %paths.db.display(), "Built {kind} cache");

        open_verified(&paths.db, kind)
    }

    fn build(&self, kind: EntityKind, paths: &CachePaths) -> Result<u64> {
        // Leftover of a build that crashed.
        let _ = fs::remove_file(&paths.partial);

        match self.write_map(kind, &paths.partial) {
            Ok(rows) => {
                fs::rename(&paths.partial, &paths.db).map_err(|e| Error::cache(kind, e))?;
                Ok(rows)
            }
            Err(err) => {
                let _ = fs::remove_file(&paths.partial);
                Err(err)
            }
        }
    }

    fn write_map(&self, kind: EntityKind, path: &Path) -> Result<u64> {
        let cache_err = |e: rusqlite::Error| Error::cache(kind, e);

        let mut conn = Connection::open(path).map_err(cache_err)?;
        conn.execute_batch(CREATE_TABLE).map_err(cache_err)?;

        let lines = self.source.open(kind)?.lines();
        let tx = conn.transaction().map_err(cache_err)?;
        let mut rows = 0;
        {
            let mut insert = tx
                .prepare("INSERT INTO ids (key, id) VALUES (?1, ?2)")
                .map_err(cache_err)?;
            for (index, line) in lines.enumerate() {
                let line = line.map_err(|e| Error::export(kind, e))?;
                if line.is_empty() {
                    continue;
                }
                let (sequence, key) = parse_line(kind, &line)
                    .map_err(|reason| Error::export(kind, format!("line {}: {reason}", index + 1)))?;
                insert.execute(params![key, sequence]).map_err(cache_err)?;

                rows += 1;
                if rows % PROGRESS_EVERY == 0 {
                    info!(rows, "Loading {kind} ids");
                }
            }
        }
        tx.commit().map_err(cache_err)?;
        conn.close().map_err(|(_, e)| cache_err(e))?;
        Ok(rows)
    }
}

/// Opens a built map read-only and checks it is structurally sound.
fn open_verified(path: &Path, kind: EntityKind) -> Result<Connection> {
    let cache_err = |e: rusqlite::Error| Error::cache(kind, e);

    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(cache_err)?;

    let status: String = conn
        .query_row("PRAGMA quick_check", [], |row| row.get(0))
        .map_err(cache_err)?;
    if status != "ok" {
        return Err(Error::cache(kind, format!("quick_check: {status}")));
    }

    let tables: i64 = conn
        .query_row(
            "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = 'ids'",
            [],
            |row| row.get(0),
        )
        .map_err(cache_err)?;
    if tables != 1 {
        return Err(Error::cache(kind, "missing ids table"));
    }
    Ok(conn)
}

/// Splits an export row into its sequence and tab-joined business key.
///
/// The key is the `arity` fields after the sequence; anything after that
/// (the release) is ignored.
fn parse_line(kind: EntityKind, line: &str) -> core::result::Result<(i64, String), String> {
    let mut fields = line.split(KEY_DELIMITER);
    let sequence = fields.next().unwrap_or_default();
    let sequence = sequence
        .parse::<u64>()
        .ok()
        .and_then(|s| i64::try_from(s).ok())
        .ok_or_else(|| format!("invalid sequence '{sequence}'"))?;

    let key: Vec<&str> = fields.take(kind.arity()).collect();
    if key.len() != kind.arity() {
        return Err(format!(
            "expected {} key fields, got {}",
            kind.arity(),
            key.len()
        ));
    }
    Ok((sequence, key.join(&KEY_DELIMITER.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{Compression, read::GzDecoder, write::GzEncoder};
    use std::{
        io::{BufReader, Cursor, Write},
        sync::{Arc, Barrier, atomic::AtomicUsize},
        thread,
    };

    /// Serves gzip exports from memory and counts downloads.
    #[derive(Default)]
    struct MemorySource {
        exports: HashMap<EntityKind, &'static str>,
        downloads: AtomicUsize,
    }

    impl MemorySource {
        fn with(exports: &[(EntityKind, &'static str)]) -> Self {
            Self {
                exports: exports.iter().copied().collect(),
                downloads: AtomicUsize::new(0),
            }
        }

        fn downloads(&self) -> usize {
            self.downloads.load(Ordering::SeqCst)
        }
    }

    impl ExportSource for MemorySource {
        fn open(&self, kind: EntityKind) -> Result<Box<dyn BufRead + Send>> {
            self.downloads.fetch_add(1, Ordering::SeqCst);
            let Some(tsv) = self.exports.get(&kind) else {
                return Err(Error::export(kind, "404 Not Found"));
            };
            let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
            encoder
                .write_all(tsv.as_bytes())
                .map_err(|e| Error::export(kind, e))?;
            let bytes = encoder.finish().map_err(|e| Error::export(kind, e))?;
            Ok(Box::new(BufReader::new(GzDecoder::new(Cursor::new(bytes)))))
        }
    }

    #[test]
    fn export_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ExportIdCache::with_source(
            dir.path(),
            MemorySource::with(&[(EntityKind::Donor, "42\tS1\tP1\n")]),
        );

        assert_eq!(cache.get_donor_id("S1", "P1").unwrap().as_deref(), Some("DO42"));
        assert_eq!(cache.get_donor_id("S1", "P2").unwrap(), None);
        assert_eq!(cache.source().downloads(), 1);

        assert!(dir.path().join("donor.db").exists());
        assert!(dir.path().join("donor.db.lock").exists());
        assert!(!dir.path().join("donor.db.partial").exists());
    }

    #[test]
    fn trailing_release_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ExportIdCache::with_source(
            dir.path(),
            MemorySource::with(&[
                (EntityKind::Sample, "7\tSA-a\tP1\tICGC22\n8\tSA-b\tP1\tICGC23\n"),
                (EntityKind::Mutation, "3\t1\t100\t101\tA>G\tsnv\tGRCh37\tICGC22\n"),
                (EntityKind::File, "9\treads.bam\n"),
            ]),
        );

        assert_eq!(cache.get_sample_id("SA-b", "P1").unwrap().as_deref(), Some("SA8"));
        assert_eq!(
            cache
                .get_mutation_id("1", "100", "101", "A>G", "snv", "GRCh37")
                .unwrap()
                .as_deref(),
            Some("MU3")
        );
        assert_eq!(cache.get_file_id("reads.bam").unwrap().as_deref(), Some("FI9"));
    }

    #[test]
    fn existing_map_is_reused_without_download() {
        let dir = tempfile::tempdir().unwrap();
        let exports = [(EntityKind::Project, "5\tPRJ-A\n")];
        {
            let cache = ExportIdCache::with_source(dir.path(), MemorySource::with(&exports));
            cache.get_project_id("PRJ-A").unwrap();
        }

        let cache = ExportIdCache::with_source(dir.path(), MemorySource::with(&exports));
        assert_eq!(cache.get_project_id("PRJ-A").unwrap().as_deref(), Some("PR5"));
        assert_eq!(cache.source().downloads(), 0);
    }

    #[test]
    fn corrupt_map_is_rebuilt() {
        let dir = tempfile::tempdir().unwrap();
        let exports = [(EntityKind::Donor, "42\tS1\tP1\n")];
        {
            let cache = ExportIdCache::with_source(dir.path(), MemorySource::with(&exports));
            cache.get_donor_id("S1", "P1").unwrap();
        }
        fs::write(dir.path().join("donor.db"), b"definitely not a database file").unwrap();

        let cache = ExportIdCache::with_source(dir.path(), MemorySource::with(&exports));
        assert_eq!(cache.get_donor_id("S1", "P1").unwrap().as_deref(), Some("DO42"));
        assert_eq!(cache.source().downloads(), 1);
    }

    #[test]
    fn empty_file_fails_verification() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("file.db"), b"").unwrap();

        let cache = ExportIdCache::with_source(dir.path(), MemorySource::with(&[(EntityKind::File, "1\tf\n")]));
        assert_eq!(cache.get_file_id("f").unwrap().as_deref(), Some("FI1"));
        assert_eq!(cache.source().downloads(), 1);
    }

    #[test]
    fn failed_download_only_affects_its_kind() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ExportIdCache::with_source(
            dir.path(),
            MemorySource::with(&[(EntityKind::Sample, "1\tS\tP\n")]),
        );

        let err = cache.get_donor_id("S1", "P1").unwrap_err();
        assert!(matches!(
            err,
            Error::Export {
                kind: EntityKind::Donor,
                ..
            }
        ));
        assert!(!cache.is_loaded(EntityKind::Donor));
        assert!(!dir.path().join("donor.db").exists());

        assert_eq!(cache.get_sample_id("S", "P").unwrap().as_deref(), Some("SA1"));

        // Still unloaded, so the next lookup downloads again.
        assert!(cache.get_donor_id("S1", "P1").is_err());
        assert_eq!(cache.source().downloads(), 3);
    }

    #[test]
    fn malformed_line_aborts_the_build() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ExportIdCache::with_source(
            dir.path(),
            MemorySource::with(&[(EntityKind::Donor, "1\tS1\tP1\nDO2\tS2\tP1\n")]),
        );

        match cache.get_donor_id("S1", "P1").unwrap_err() {
            Error::Export { message, .. } => assert!(message.starts_with("line 2"), "{message}"),
            other => panic!("expected export error, got {other:?}"),
        }
        assert!(!dir.path().join("donor.db").exists());
        assert!(!dir.path().join("donor.db.partial").exists());
    }

    #[test]
    fn closed_cache_refuses_lookups() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ExportIdCache::with_source(
            dir.path(),
            MemorySource::with(&[(EntityKind::Donor, "1\tS1\tP1\n")]),
        );
        cache.get_donor_id("S1", "P1").unwrap();

        cache.close();
        assert!(!cache.is_loaded(EntityKind::Donor));
        assert!(matches!(cache.get_donor_id("S1", "P1"), Err(Error::Closed)));
        assert!(matches!(cache.get_file_id("f"), Err(Error::Closed)));
        assert_eq!(cache.source().downloads(), 1);
    }

    #[test]
    fn unsequenced_kinds_are_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ExportIdCache::with_source(dir.path(), MemorySource::default());
        assert!(matches!(
            cache.get_id(&BusinessKey::analysis("AN1")),
            Err(Error::ExportNotSupported { .. })
        ));
    }

    #[test]
    fn concurrent_caches_build_once() {
        const THREADS: usize = 8;
        let dir = tempfile::tempdir().unwrap();
        let exports = [(EntityKind::Specimen, "11\tSP-a\tP1\n12\tSP-b\tP1\n")];
        // Two caches over one directory stand in for two processes.
        let caches = [
            Arc::new(ExportIdCache::with_source(dir.path(), MemorySource::with(&exports))),
            Arc::new(ExportIdCache::with_source(dir.path(), MemorySource::with(&exports))),
        ];
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|i| {
                let cache = Arc::clone(&caches[i % 2]);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    cache.get_specimen_id("SP-b", "P1").unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().as_deref(), Some("SP12"));
        }
        let downloads: usize = caches.iter().map(|c| c.source().downloads()).sum();
        assert_eq!(downloads, 1);
    }

    #[test]
    fn parse_line_takes_key_by_arity() {
        assert_eq!(
            parse_line(EntityKind::Donor, "42\tS1\tP1\tICGC22"),
            Ok((42, "S1\tP1".to_string()))
        );
        assert!(parse_line(EntityKind::Donor, "42\tS1").is_err());
        assert!(parse_line(EntityKind::File, "-1\tf").is_err());
    }
}
