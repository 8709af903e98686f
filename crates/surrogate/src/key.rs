use crate::{EntityKind, FormatError, Result};

/// Field delimiter used when a business key is flattened into a single string
/// (export rows, on-disk cache keys).
pub const KEY_DELIMITER: char = '\t';

/// Characters that separate fields and rows in exports.
pub const fn is_row_delimiter(c: char) -> bool {
    matches!(c, KEY_DELIMITER | '\n' | '\r')
}

/// The caller-submitted tuple that identifies an entity before it has a
/// surrogate id.
///
/// Fields are held in the kind's canonical order (see
/// [`EntityKind::key_params`]). The typed constructors (`donor`, `mutation`,
/// ...) cannot get the arity wrong; [`BusinessKey::new`] checks arity,
/// emptiness and row delimiters and is what untrusted input should go through.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BusinessKey {
    kind: EntityKind,
    fields: Vec<String>,
}

impl BusinessKey {
    /// Builds a key from raw fields, rejecting wrong arity and empty fields.
    pub fn new<I, S>(kind: EntityKind, fields: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        if fields.len() != kind.arity() {
            return Err(FormatError::Arity {
                kind,
                expected: kind.arity(),
                actual: fields.len(),
            });
        }
        if let Some((field, _)) = kind
            .key_params()
            .iter()
            .zip(&fields)
            .find(|(_, value)| value.is_empty())
        {
            return Err(FormatError::EmptyField { kind, field });
        }
        if let Some((field, _)) = kind
            .key_params()
            .iter()
            .zip(&fields)
            .find(|(_, value)| value.contains(is_row_delimiter))
        {
            return Err(FormatError::Delimiter { kind, field });
        }
        Ok(Self { kind, fields })
    }

    fn unchecked(kind: EntityKind, fields: Vec<String>) -> Self {
        debug_assert_eq!(fields.len(), kind.arity());
        Self { kind, fields }
    }

    pub fn donor(submitted_donor_id: impl Into<String>, submitted_project_id: impl Into<String>) -> Self {
        Self::unchecked(
            EntityKind::Donor,
            vec![submitted_donor_id.into(), submitted_project_id.into()],
        )
    }

    pub fn specimen(
        submitted_specimen_id: impl Into<String>,
        submitted_project_id: impl Into<String>,
    ) -> Self {
        Self::unchecked(
            EntityKind::Specimen,
            vec![submitted_specimen_id.into(), submitted_project_id.into()],
        )
    }

    pub fn sample(submitted_sample_id: impl Into<String>, submitted_project_id: impl Into<String>) -> Self {
        Self::unchecked(
            EntityKind::Sample,
            vec![submitted_sample_id.into(), submitted_project_id.into()],
        )
    }

    pub fn mutation(
        chromosome: impl Into<String>,
        chromosome_start: impl Into<String>,
        chromosome_end: impl Into<String>,
        mutation: impl Into<String>,
        mutation_type: impl Into<String>,
        assembly_version: impl Into<String>,
    ) -> Self {
        Self::unchecked(
            EntityKind::Mutation,
            vec![
                chromosome.into(),
                chromosome_start.into(),
                chromosome_end.into(),
                mutation.into(),
                mutation_type.into(),
                assembly_version.into(),
            ],
        )
    }

    pub fn file(submitted_file_id: impl Into<String>) -> Self {
        Self::unchecked(EntityKind::File, vec![submitted_file_id.into()])
    }

    pub fn project(submitted_project_id: impl Into<String>) -> Self {
        Self::unchecked(EntityKind::Project, vec![submitted_project_id.into()])
    }

    pub fn analysis(submitted_analysis_id: impl Into<String>) -> Self {
        Self::unchecked(EntityKind::Analysis, vec![submitted_analysis_id.into()])
    }

    pub fn object(analysis_id: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self::unchecked(EntityKind::Object, vec![analysis_id.into(), file_name.into()])
    }

    pub const fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// `(paramName, value)` pairs in canonical order, ready for a query string.
    pub fn query_pairs(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.kind
            .key_params()
            .iter()
            .copied()
            .zip(self.fields.iter().map(String::as_str))
    }

    /// The fields joined by [`KEY_DELIMITER`], the form used by export rows and
    /// the on-disk cache.
    pub fn joined(&self) -> String {
        self.fields.join(&KEY_DELIMITER.to_string())
    }

    /// The fields joined by an arbitrary delimiter.
    pub fn join_with(&self, delimiter: &str) -> String {
        self.fields.join(delimiter)
    }
}
