use crate::EntityKind;

/// A result type whose error defaults to [`FormatError`].
pub type Result<T, E = FormatError> = core::result::Result<T, E>;

/// Violations of the id format model or of a kind's business-key shape.
///
/// These are never silently corrected. Callers decide whether a malformed id
/// coming back from a server is fatal.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum FormatError {
    /// The id does not match the pattern compiled for its kind.
    #[error("ID '{id}' does not match pattern {pattern} for {kind}")]
    Pattern {
        kind: EntityKind,
        id: String,
        pattern: &'static str,
    },

    /// The id is not the canonical string form of a UUID.
    #[error("ID '{id}' does not conform to the string representation of UUID")]
    Uuid { id: String },

    /// A submitted analysis id is empty, too long, or contains characters
    /// outside `[A-Za-z0-9_-]`.
    #[error("submitted analysis id '{id}' must match {pattern}")]
    AnalysisId { id: String, pattern: &'static str },

    /// The id was empty.
    #[error("empty id for {kind}")]
    Empty { kind: EntityKind },

    /// The business key has the wrong number of fields for its kind.
    #[error("{kind} business key expects {expected} fields, got {actual}")]
    Arity {
        kind: EntityKind,
        expected: usize,
        actual: usize,
    },

    /// A business key field was empty.
    #[error("{kind} business key field '{field}' must not be empty")]
    EmptyField { kind: EntityKind, field: &'static str },

    /// A business key field contains a tab, carriage return or line feed,
    /// which would split export rows.
    #[error("{kind} business key field '{field}' must not contain tabs or line breaks")]
    Delimiter { kind: EntityKind, field: &'static str },

    /// The kind has no prefix, so it cannot be rendered from a sequence.
    #[error("{kind} ids are not sequence-backed")]
    NotSequenced { kind: EntityKind },

    /// The string does not name an entity kind.
    #[error("unknown entity kind '{0}'")]
    UnknownKind(String),
}
