//! The bulk export cache.
//!
//! Each sequence-backed kind is mirrored into its own on-disk map built from
//! the service's gzip export. Files for kind `k` under the cache directory:
//!
//! - `k.db`: the map, a SQLite `WITHOUT ROWID` table from tab-joined business
//!   key to sequence, opened read-only once built.
//! - `k.db.lock`: advisory lock held by whichever process is verifying or
//!   building `k.db`.
//! - `k.db.partial`: a build in progress, renamed over `k.db` on success.

mod cache;
mod lock;
mod source;

pub use cache::*;
pub use source::*;
