//! Error types for the id service.
//!
//! Every handler returns [`Error`], whose [`IntoResponse`] impl picks the
//! status code clients act on:
//!
//! - `NotFound` → 404, absence on a read-only lookup.
//! - `InvalidRequest` / `Format` → 400.
//! - `Unavailable` → 503, the store is busy or locked; clients back off and
//!   retry.
//! - `Exhausted` / `RandomExhausted` / `Store` → 500, an operational alarm.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rusqlite::{ErrorCode, ffi};
use surrogate::{EntityKind, FormatError};
use tracing::error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Clone, Debug, thiserror::Error)]
pub enum Error {
    #[error("no {kind} id for the given key")]
    NotFound { kind: EntityKind },

    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error(transparent)]
    Format(#[from] FormatError),

    /// Another writer holds the database.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// An insert hit the business-key uniqueness constraint.
    #[error("business key already mapped")]
    Conflict,

    /// The create loop ran out of attempts without observing a row.
    #[error("gave up creating {kind} id after {attempts} attempts")]
    Exhausted { kind: EntityKind, attempts: usize },

    /// Every random analysis id candidate already existed.
    #[error("no unused analysis id after {attempts} candidates")]
    RandomExhausted { attempts: usize },

    #[error("store error: {0}")]
    Store(String),
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, _)
                if failure.code == ErrorCode::ConstraintViolation
                    && matches!(
                        failure.extended_code,
                        ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                    ) =>
            {
                Self::Conflict
            }
            rusqlite::Error::SqliteFailure(failure, _)
                if matches!(
                    failure.code,
                    ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
                ) =>
            {
                Self::Unavailable(err.to_string())
            }
            _ => Self::Store(err.to_string()),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Store(err.to_string())
    }
}

impl Error {
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::InvalidRequest { .. } | Self::Format(_) => StatusCode::BAD_REQUEST,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Conflict | Self::Exhausted { .. } | Self::RandomExhausted { .. } | Self::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() && status != StatusCode::SERVICE_UNAVAILABLE {
            error!(err = %self, "Request failed");
        }
        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_failure(code: i32) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(ffi::Error::new(code), None)
    }

    #[test]
    fn unique_violations_are_conflicts() {
        assert!(matches!(
            Error::from(sqlite_failure(ffi::SQLITE_CONSTRAINT_UNIQUE)),
            Error::Conflict
        ));
        assert!(matches!(
            Error::from(sqlite_failure(ffi::SQLITE_CONSTRAINT_PRIMARYKEY)),
            Error::Conflict
        ));
        // NOT NULL is a constraint violation but not a race.
        assert!(matches!(
            Error::from(sqlite_failure(ffi::SQLITE_CONSTRAINT_NOTNULL)),
            Error::Store(_)
        ));
    }

    #[test]
    fn busy_and_locked_are_unavailable() {
        assert!(matches!(
            Error::from(sqlite_failure(ffi::SQLITE_BUSY)),
            Error::Unavailable(_)
        ));
        assert!(matches!(
            Error::from(sqlite_failure(ffi::SQLITE_LOCKED)),
            Error::Unavailable(_)
        ));
    }

    #[test]
    fn statuses_follow_the_wire_contract() {
        let cases = [
            (
                Error::NotFound {
                    kind: EntityKind::Donor,
                },
                404,
            ),
            (
                Error::InvalidRequest {
                    reason: "x".to_string(),
                },
                400,
            ),
            (
                Error::Format(FormatError::Empty {
                    kind: EntityKind::Donor,
                }),
                400,
            ),
            (Error::Unavailable("busy".to_string()), 503),
            (
                Error::Exhausted {
                    kind: EntityKind::Donor,
                    attempts: 3,
                },
                500,
            ),
            (Error::RandomExhausted { attempts: 3 }, 500),
            (Error::Store("disk".to_string()), 500),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status().as_u16(), status);
        }
    }
}
