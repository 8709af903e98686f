//! Backing storage for id mappings.
//!
//! The allocator only needs three things from a store: look a key up, try to
//! insert it, and dump a kind in id order. Uniqueness of the business key is
//! enforced by the store itself; an insert that loses a race reports
//! [`Error::Conflict`](crate::server::error::Error::Conflict).

mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use crate::server::error::Result;
use std::io::Write;
use surrogate::{BusinessKey, EntityKind};

/// The outcome of a successful insert.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Inserted {
    /// The formatted id of the new row.
    pub id: String,
    /// Rows the statement changed.
    pub rows: usize,
}

pub trait Store: Send + Sync + 'static {
    /// The formatted id mapped to `key`, if any.
    fn find(&self, key: &BusinessKey) -> Result<Option<String>>;

    /// Inserts a row for `key`. `release` is stored only for kinds that
    /// carry one.
    fn insert(&self, key: &BusinessKey, release: &str) -> Result<Inserted>;

    /// Writes every mapping of `kind` as TSV rows in id order and returns the
    /// number of rows written.
    fn export(&self, kind: EntityKind, out: &mut dyn Write) -> Result<u64>;
}
