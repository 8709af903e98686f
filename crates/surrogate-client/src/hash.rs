use crate::{IdClient, Result};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use surrogate::{Backing, BusinessKey, EntityKind, FormatError, format_id, object_id, validate_analysis_id};
use uuid::Uuid;

/// Delimiter between business-key fields before hashing.
pub const HASH_FIELD_DELIMITER: &str = ":";

/// Derives ids from business keys without any network or storage.
///
/// Sequence-backed ids are `prefix + decimal(first 8 bytes of
/// SHA-256(fields joined by ":"))`, so they satisfy the same format contract
/// as allocated ids but are not monotonic. Lookups never report absence and
/// creation returns the same value.
///
/// Analysis ids are the submitted id itself. With in-memory persistence,
/// `get_analysis_id` only reports ids this client created, which makes
/// "does it exist" checks meaningful in tests. That state dies with the
/// process.
#[derive(Debug, Default)]
pub struct HashIdClient {
    analysis_ids: Option<Mutex<HashSet<String>>>,
}

impl HashIdClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// A client that remembers the analysis ids it created.
    pub fn persisting() -> Self {
        Self {
            analysis_ids: Some(Mutex::new(HashSet::new())),
        }
    }

    pub const fn persists_in_memory(&self) -> bool {
        self.analysis_ids.is_some()
    }

    fn remember(&self, id: &str) {
        if let Some(ids) = &self.analysis_ids {
            ids.lock().insert(id.to_string());
        }
    }

    fn analysis_id(&self, submitted: &str, create: bool) -> Result<Option<String>> {
        if submitted.is_empty() {
            if create {
                return Err(FormatError::EmptyField {
                    kind: EntityKind::Analysis,
                    field: "submittedAnalysisId",
                }
                .into());
            }
            return Ok(None);
        }
        validate_analysis_id(submitted)?;

        if create {
            self.remember(submitted);
            return Ok(Some(submitted.to_string()));
        }
        let known = self
            .analysis_ids
            .as_ref()
            .is_none_or(|ids| ids.lock().contains(submitted));
        Ok(known.then(|| submitted.to_string()))
    }
}

/// The sequence a business key hashes to.
pub fn hash_sequence(key: &BusinessKey) -> u64 {
    let digest = Sha256::digest(key.join_with(HASH_FIELD_DELIMITER).as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(head)
}

impl IdClient for HashIdClient {
    fn resolve(&self, key: &BusinessKey, create: bool) -> Result<Option<String>> {
        let kind = key.kind();
        match (kind.backing(), key.fields()) {
            (Backing::Sequence, _) => Ok(Some(format_id(kind, hash_sequence(key))?)),
            (Backing::Identity, [submitted]) => self.analysis_id(submitted, create),
            (Backing::Derived, [analysis_id, file_name]) => Ok(Some(object_id(analysis_id, file_name))),
            (_, fields) => Err(FormatError::Arity {
                kind,
                expected: kind.arity(),
                actual: fields.len(),
            }
            .into()),
        }
    }

    fn create_random_analysis_id(&self) -> Result<String> {
        let id = Uuid::now_v7().to_string();
        self.remember(&id);
        Ok(id)
    }
}
