use crate::{Error, Result};
use surrogate::{BusinessKey, EntityKind};

/// Resolves business keys to surrogate ids.
///
/// Implementors supply [`IdClient::resolve`] and
/// [`IdClient::create_random_analysis_id`]; every per-kind accessor is built on
/// top of them. Absence is `Ok(None)`, never an error. A `create_*` call that
/// still resolves to nothing is reported as [`Error::Absent`].
///
/// The trait is object safe so strategies can be chosen at runtime (see
/// [`crate::ClientStrategy`]).
pub trait IdClient: Send + Sync {
    /// Looks up the id mapped to `key`, allocating one first when `create` is
    /// set. Object keys ignore `create`; their ids always exist.
    fn resolve(&self, key: &BusinessKey, create: bool) -> Result<Option<String>>;

    /// Mints a fresh analysis id.
    fn create_random_analysis_id(&self) -> Result<String>;

    /// Downloads the full decompressed export of `kind` as TSV.
    fn export(&self, kind: EntityKind) -> Result<String> {
        Err(Error::ExportNotSupported { kind })
    }

    /// Resolves without creating.
    fn get(&self, key: &BusinessKey) -> Result<Option<String>> {
        self.resolve(key, false)
    }

    /// Resolves, creating if needed. Absence here is a contract violation.
    fn create(&self, key: &BusinessKey) -> Result<String> {
        self.resolve(key, true)?
            .ok_or(Error::Absent { kind: key.kind() })
    }

    fn get_donor_id(&self, submitted_donor_id: &str, submitted_project_id: &str) -> Result<Option<String>> {
        self.get(&BusinessKey::donor(submitted_donor_id, submitted_project_id))
    }

    fn create_donor_id(&self, submitted_donor_id: &str, submitted_project_id: &str) -> Result<String> {
        self.create(&BusinessKey::donor(submitted_donor_id, submitted_project_id))
    }

    fn get_specimen_id(&self, submitted_specimen_id: &str, submitted_project_id: &str) -> Result<Option<String>> {
        self.get(&BusinessKey::specimen(submitted_specimen_id, submitted_project_id))
    }

    fn create_specimen_id(&self, submitted_specimen_id: &str, submitted_project_id: &str) -> Result<String> {
        self.create(&BusinessKey::specimen(submitted_specimen_id, submitted_project_id))
    }

    fn get_sample_id(&self, submitted_sample_id: &str, submitted_project_id: &str) -> Result<Option<String>> {
        self.get(&BusinessKey::sample(submitted_sample_id, submitted_project_id))
    }

    fn create_sample_id(&self, submitted_sample_id: &str, submitted_project_id: &str) -> Result<String> {
        self.create(&BusinessKey::sample(submitted_sample_id, submitted_project_id))
    }

    #[allow(clippy::too_many_arguments)]
    fn get_mutation_id(
        &self,
        chromosome: &str,
        chromosome_start: &str,
        chromosome_end: &str,
        mutation: &str,
        mutation_type: &str,
        assembly_version: &str,
    ) -> Result<Option<String>> {
        self.get(&BusinessKey::mutation(
            chromosome,
            chromosome_start,
            chromosome_end,
            mutation,
            mutation_type,
            assembly_version,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn create_mutation_id(
        &self,
        chromosome: &str,
        chromosome_start: &str,
        chromosome_end: &str,
        mutation: &str,
        mutation_type: &str,
        assembly_version: &str,
    ) -> Result<String> {
        self.create(&BusinessKey::mutation(
            chromosome,
            chromosome_start,
            chromosome_end,
            mutation,
            mutation_type,
            assembly_version,
        ))
    }

    fn get_file_id(&self, submitted_file_id: &str) -> Result<Option<String>> {
        self.get(&BusinessKey::file(submitted_file_id))
    }

    fn create_file_id(&self, submitted_file_id: &str) -> Result<String> {
        self.create(&BusinessKey::file(submitted_file_id))
    }

    fn get_project_id(&self, submitted_project_id: &str) -> Result<Option<String>> {
        self.get(&BusinessKey::project(submitted_project_id))
    }

    fn create_project_id(&self, submitted_project_id: &str) -> Result<String> {
        self.create(&BusinessKey::project(submitted_project_id))
    }

    fn get_analysis_id(&self, submitted_analysis_id: &str) -> Result<Option<String>> {
        self.get(&BusinessKey::analysis(submitted_analysis_id))
    }

    fn create_analysis_id(&self, submitted_analysis_id: &str) -> Result<String> {
        self.create(&BusinessKey::analysis(submitted_analysis_id))
    }

    /// The deterministic id of `file_name` within `analysis_id`.
    fn object_id(&self, analysis_id: &str, file_name: &str) -> Result<String> {
        self.create(&BusinessKey::object(analysis_id, file_name))
    }
}

impl<C: IdClient + ?Sized> IdClient for Box<C> {
    fn resolve(&self, key: &BusinessKey, create: bool) -> Result<Option<String>> {
        (**self).resolve(key, create)
    }

    fn create_random_analysis_id(&self) -> Result<String> {
        (**self).create_random_analysis_id()
    }

    fn export(&self, kind: EntityKind) -> Result<String> {
        (**self).export(kind)
    }
}

impl<C: IdClient + ?Sized> IdClient for std::sync::Arc<C> {
    fn resolve(&self, key: &BusinessKey, create: bool) -> Result<Option<String>> {
        (**self).resolve(key, create)
    }

    fn create_random_analysis_id(&self) -> Result<String> {
        (**self).create_random_analysis_id()
    }

    fn export(&self, kind: EntityKind) -> Result<String> {
        (**self).export(kind)
    }
}
