use super::{Inserted, Store, schema::Table};
use crate::server::error::{Error, Result};
use core::time::Duration;
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{Connection, OptionalExtension, params_from_iter, types::ValueRef};
use std::{
    collections::HashMap,
    io::Write,
    path::Path,
    sync::atomic::{AtomicUsize, Ordering},
};
use surrogate::{Backing, BusinessKey, EntityKind, format_id};
use tracing::{debug, info};

const STATEMENT_CACHE_CAPACITY: usize = 32;

/// A SQLite-backed [`Store`] over a small pool of connections.
///
/// Connections are handed out round-robin, each behind its own mutex. The
/// database runs in WAL mode so readers never wait for the writer; writers
/// wait up to the busy timeout and then surface
/// [`Error::Unavailable`]. Any number of stores, in any number of processes,
/// may share one database file.
pub struct SqliteStore {
    connections: Box<[Mutex<Connection>]>,
    next_connection: AtomicUsize,
    tables: HashMap<EntityKind, Table>,
}

impl SqliteStore {
    /// Opens `pool_size` connections to `path`, creating the schema if needed.
    pub fn open(path: &Path, pool_size: usize, busy_timeout: Duration) -> Result<Self> {
        if pool_size == 0 {
            return Err(Error::InvalidRequest {
                reason: "pool size must be greater than 0".to_string(),
            });
        }

        let tables: HashMap<_, _> = EntityKind::ALL
            .into_iter()
            .filter_map(|kind| Table::new(kind).map(|table| (kind, table)))
            .collect();

        let connections = (0..pool_size)
            .map(|_| open_connection(path, busy_timeout))
            .collect::<Result<Vec<_>>>()?;

        let schema: String = tables.values().map(|table| table.create.as_str()).collect();
        connections[0].execute_batch(&schema)?;
        info!(path = %path.display(), pool_size, "Opened id store");

        Ok(Self {
            connections: connections.into_iter().map(Mutex::new).collect(),
            next_connection: AtomicUsize::new(0),
            tables,
        })
    }

    /// Returns the next pooled connection (round-robin), waiting for it if
    /// another request holds it.
    fn connection(&self) -> MutexGuard<'_, Connection> {
        let index = self.next_connection.fetch_add(1, Ordering::Relaxed) % self.connections.len();
        self.connections[index].lock()
    }

    fn table(&self, kind: EntityKind) -> Result<&Table> {
        self.tables.get(&kind).ok_or_else(|| Error::InvalidRequest {
            reason: format!("{kind} ids are not stored"),
        })
    }
}

fn open_connection(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
    conn.set_prepared_statement_cache_capacity(STATEMENT_CACHE_CAPACITY);
    Ok(conn)
}

/// Renders the stored id column as the public id.
fn render(kind: EntityKind, value: ValueRef<'_>) -> Result<String> {
    match (kind.backing(), value) {
        (Backing::Sequence, ValueRef::Integer(sequence)) => {
            let sequence = u64::try_from(sequence).map_err(|e| Error::Store(e.to_string()))?;
            Ok(format_id(kind, sequence)?)
        }
        (Backing::Identity, ValueRef::Text(id)) => Ok(String::from_utf8_lossy(id).into_owned()),
        (_, other) => Err(Error::Store(format!(
            "unexpected {:?} id for {kind}",
            other.data_type()
        ))),
    }
}

impl Store for SqliteStore {
    fn find(&self, key: &BusinessKey) -> Result<Option<String>> {
        let kind = key.kind();
        let table = self.table(kind)?;
        let conn = self.connection();
        let mut stmt = conn.prepare_cached(&table.find)?;
        stmt.query_row(params_from_iter(key.fields()), |row| {
            Ok(render(kind, row.get_ref(0)?))
        })
        .optional()?
        .transpose()
    }

    fn insert(&self, key: &BusinessKey, release: &str) -> Result<Inserted> {
        let kind = key.kind();
        let table = self.table(kind)?;
        let mut values: Vec<&str> = key.fields().iter().map(String::as_str).collect();
        if kind.takes_release() {
            values.push(release);
        }

        let conn = self.connection();
        let rows = conn.prepare_cached(&table.insert)?.execute(params_from_iter(&values))?;
        let id = match kind.backing() {
            Backing::Identity => values[0].to_string(),
            _ => render(kind, ValueRef::Integer(conn.last_insert_rowid()))?,
        };
        debug!(%kind, %id, rows, "Inserted mapping");
        Ok(Inserted { id, rows })
    }

    fn export(&self, kind: EntityKind, out: &mut dyn Write) -> Result<u64> {
        let table = self.table(kind)?;
        let conn = self.connection();
        let mut stmt = conn.prepare_cached(&table.export)?;
        let width = stmt.column_count();
        let mut rows = stmt.query([])?;

        let mut written = 0;
        while let Some(row) = rows.next()? {
            for column in 0..width {
                if column > 0 {
                    out.write_all(b"\t")?;
                }
                match row.get_ref(column)? {
                    ValueRef::Integer(n) => write!(out, "{n}")?,
                    ValueRef::Text(text) => out.write_all(text)?,
                    ValueRef::Null => {}
                    other => {
                        return Err(Error::Store(format!(
                            "unexpected {:?} in {kind} export",
                            other.data_type()
                        )));
                    }
                }
            }
            out.write_all(b"\n")?;
            written += 1;
        }
        Ok(written)
    }
}
