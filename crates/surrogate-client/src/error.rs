//! Error types for id clients.
//!
//! `Error` is `Clone` so that one failed in-flight lookup can be handed to
//! every caller that was coalesced onto it by [`crate::CachingIdClient`].
//!
//! ## Error Cases
//! - `Identifier`: the service answered with a terminal status (401, 403, 500,
//!   any 4xx/5xx other than 404 and 503).
//! - `ExhaustedRetry`: retryable failures (503, timeouts, resets, malformed
//!   responses) outlasted the retry budget.
//! - `Transport`: a transport failure that is not worth retrying.
//! - `Format`: an id or business key broke its kind's format contract.
//! - `Absent`: a create call came back without an id.
//! - `Export` / `Cache`: the bulk export cache could not download or persist
//!   a kind.

use surrogate::{EntityKind, FormatError};

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Clone, Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Terminal protocol failure carrying the response body.
    #[error("identifier service returned {status}: {message}")]
    Identifier { status: u16, message: String },

    /// Every allowed attempt failed with a retryable cause.
    #[error("exhausted retries after {attempts} attempts, last failure: {cause}")]
    ExhaustedRetry { attempts: u32, cause: String },

    /// Non-retryable transport failure (connection refused, TLS, ...).
    #[error("transport error: {message}")]
    Transport { message: String },

    #[error(transparent)]
    Format(#[from] FormatError),

    /// A create call resolved to nothing.
    #[error("create returned no {kind} id")]
    Absent { kind: EntityKind },

    #[error("export of {kind} ids failed: {message}")]
    Export { kind: EntityKind, message: String },

    #[error("{kind} export cache error: {message}")]
    Cache { kind: EntityKind, message: String },

    #[error("{kind} ids cannot be exported by this client")]
    ExportNotSupported { kind: EntityKind },

    /// The client could not be constructed from its configuration.
    #[error("invalid client configuration: {reason}")]
    Config { reason: String },

    /// The export cache has been closed.
    #[error("export cache is closed")]
    Closed,
}

impl Error {
    /// Whether this failure was caused by retry exhaustion, as opposed to a
    /// failure the service reported outright.
    pub const fn is_exhausted(&self) -> bool {
        matches!(self, Self::ExhaustedRetry { .. })
    }

    pub(crate) fn cache(kind: EntityKind, err: impl std::fmt::Display) -> Self {
        Self::Cache {
            kind,
            message: err.to_string(),
        }
    }

    pub(crate) fn export(kind: EntityKind, err: impl std::fmt::Display) -> Self {
        Self::Export {
            kind,
            message: err.to_string(),
        }
    }
}
