//! The id format model.
//!
//! Sequence-backed kinds render as `prefix + decimal(sequence)` and validate
//! against `^prefix[0-9]+$`. Analysis ids are either submitted
//! (`[A-Za-z0-9_-]`, at most [`MAX_ANALYSIS_ID_LEN`] characters) or minted
//! UUIDs, which satisfy the same pattern. Object ids are always UUIDs.

use crate::{Backing, EntityKind, FormatError, Result};
use regex::Regex;
use std::{collections::HashMap, sync::LazyLock};
use uuid::Uuid;

/// Longest submitted analysis id accepted.
pub const MAX_ANALYSIS_ID_LEN: usize = 512;

/// Pattern every submitted analysis id must match.
pub const ANALYSIS_ID_PATTERN: &str = "^[A-Za-z0-9_-]{1,512}$";

const UUID_LEN: usize = 36;

static SEQUENCE_PATTERNS: LazyLock<HashMap<EntityKind, Regex>> = LazyLock::new(|| {
    EntityKind::SEQUENCED
        .into_iter()
        .map(|kind| {
            let regex = Regex::new(sequence_pattern(kind)).expect("sequence id pattern compiles");
            (kind, regex)
        })
        .collect()
});

static ANALYSIS_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(ANALYSIS_ID_PATTERN).expect("analysis id pattern compiles"));

const fn sequence_pattern(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Donor => "^DO[0-9]+$",
        EntityKind::Specimen => "^SP[0-9]+$",
        EntityKind::Sample => "^SA[0-9]+$",
        EntityKind::Mutation => "^MU[0-9]+$",
        EntityKind::File => "^FI[0-9]+$",
        EntityKind::Project => "^PR[0-9]+$",
        EntityKind::Analysis => ANALYSIS_ID_PATTERN,
        EntityKind::Object => "^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$",
    }
}

/// Renders the surrogate id of a sequence-backed kind.
///
/// Returns [`FormatError::NotSequenced`] for analysis and object kinds, whose
/// ids are not derived from a sequence.
///
/// ```
/// use surrogate::{EntityKind, format_id};
///
/// assert_eq!(format_id(EntityKind::Donor, 42).unwrap(), "DO42");
/// ```
pub fn format_id(kind: EntityKind, sequence: u64) -> Result<String> {
    match kind.prefix() {
        Some(prefix) => Ok(format!("{prefix}{sequence}")),
        None => Err(FormatError::NotSequenced { kind }),
    }
}

/// Checks an id against its kind's format contract.
#[cfg_attr(feature = "tracing", tracing::instrument(level = "trace"))]
pub fn validate_id(id: &str, kind: EntityKind) -> Result<()> {
    if id.is_empty() {
        return Err(FormatError::Empty { kind });
    }

    match kind.backing() {
        Backing::Sequence => {
            let matches = SEQUENCE_PATTERNS
                .get(&kind)
                .is_some_and(|pattern| pattern.is_match(id));
            if matches {
                Ok(())
            } else {
                Err(FormatError::Pattern {
                    kind,
                    id: id.to_string(),
                    pattern: sequence_pattern(kind),
                })
            }
        }
        Backing::Identity => validate_analysis_id(id),
        Backing::Derived => validate_uuid(id),
    }
}

/// Checks a submitted analysis id (character class and length).
pub fn validate_analysis_id(id: &str) -> Result<()> {
    if ANALYSIS_ID.is_match(id) {
        Ok(())
    } else {
        Err(FormatError::AnalysisId {
            id: id.to_string(),
            pattern: ANALYSIS_ID_PATTERN,
        })
    }
}

/// Checks that `id` is a hyphenated RFC-4122 UUID.
pub fn validate_uuid(id: &str) -> Result<()> {
    if id.len() == UUID_LEN && Uuid::try_parse(id).is_ok() {
        Ok(())
    } else {
        Err(FormatError::Uuid { id: id.to_string() })
    }
}

/// Recovers the sequence from a formatted id, if it belongs to `kind`.
pub fn parse_sequence(id: &str, kind: EntityKind) -> Option<u64> {
    id.strip_prefix(kind.prefix()?)?.parse().ok()
}
