use crate::FormatError;
use core::{fmt, str::FromStr};

/// How the surrogate id of a kind is produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Backing {
    /// `prefix + decimal(sequence)`, the sequence assigned by the store.
    Sequence,
    /// The submitted (or freshly minted) id is itself the surrogate id.
    Identity,
    /// A pure function of the business key. Nothing is stored.
    Derived,
}

/// The fixed set of entity kinds that carry surrogate ids.
///
/// Each kind owns a stable prefix (sequence-backed kinds only), an ordered
/// business-key shape expressed as wire query parameter names, and a flag for
/// whether the submitting release travels alongside the key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum EntityKind {
    Donor,
    Specimen,
    Sample,
    Mutation,
    File,
    Project,
    Analysis,
    Object,
}

impl EntityKind {
    /// Every kind, in a stable order.
    pub const ALL: [Self; 8] = [
        Self::Donor,
        Self::Specimen,
        Self::Sample,
        Self::Mutation,
        Self::File,
        Self::Project,
        Self::Analysis,
        Self::Object,
    ];

    /// Kinds whose ids are `prefix + sequence` and which can be exported.
    pub const SEQUENCED: [Self; 6] = [
        Self::Donor,
        Self::Specimen,
        Self::Sample,
        Self::Mutation,
        Self::File,
        Self::Project,
    ];

    /// Lowercase name, also the first path segment on the wire.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Donor => "donor",
            Self::Specimen => "specimen",
            Self::Sample => "sample",
            Self::Mutation => "mutation",
            Self::File => "file",
            Self::Project => "project",
            Self::Analysis => "analysis",
            Self::Object => "object",
        }
    }

    /// Id prefix for sequence-backed kinds.
    pub const fn prefix(self) -> Option<&'static str> {
        match self {
            Self::Donor => Some("DO"),
            Self::Specimen => Some("SP"),
            Self::Sample => Some("SA"),
            Self::Mutation => Some("MU"),
            Self::File => Some("FI"),
            Self::Project => Some("PR"),
            Self::Analysis | Self::Object => None,
        }
    }

    pub const fn backing(self) -> Backing {
        match self {
            Self::Analysis => Backing::Identity,
            Self::Object => Backing::Derived,
            _ => Backing::Sequence,
        }
    }

    /// Business-key field names, in canonical order, as sent on the wire.
    pub const fn key_params(self) -> &'static [&'static str] {
        match self {
            Self::Donor => &["submittedDonorId", "submittedProjectId"],
            Self::Specimen => &["submittedSpecimenId", "submittedProjectId"],
            Self::Sample => &["submittedSampleId", "submittedProjectId"],
            Self::Mutation => &[
                "chromosome",
                "chromosomeStart",
                "chromosomeEnd",
                "mutation",
                "mutationType",
                "assemblyVersion",
            ],
            Self::File => &["submittedFileId"],
            Self::Project => &["submittedProjectId"],
            Self::Analysis => &["submittedAnalysisId"],
            Self::Object => &["analysisId", "fileName"],
        }
    }

    /// Number of fields in this kind's business key.
    pub const fn arity(self) -> usize {
        self.key_params().len()
    }

    /// Whether lookups for this kind carry a `release` query parameter.
    pub const fn takes_release(self) -> bool {
        matches!(
            self,
            Self::Donor | Self::Specimen | Self::Sample | Self::Mutation | Self::Project
        )
    }

    /// `/{kind}/id`
    pub const fn id_path(self) -> &'static str {
        match self {
            Self::Donor => "/donor/id",
            Self::Specimen => "/specimen/id",
            Self::Sample => "/sample/id",
            Self::Mutation => "/mutation/id",
            Self::File => "/file/id",
            Self::Project => "/project/id",
            Self::Analysis => "/analysis/id",
            Self::Object => "/object/id",
        }
    }

    /// `/{kind}/export`
    pub fn export_path(self) -> String {
        format!("/{}/export", self.name())
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EntityKind {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| FormatError::UnknownKind(s.to_string()))
    }
}
