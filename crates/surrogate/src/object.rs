use uuid::Uuid;

/// Namespace under which object ids are derived.
///
/// Changing this changes every object id ever handed out.
pub const OBJECT_NAMESPACE: Uuid = Uuid::NAMESPACE_URL;

/// Derives the object id of `file_name` within `analysis_id`.
///
/// This is a version-5 UUID of `"{analysis_id}/{file_name}"`, so the same
/// inputs always map to the same id on every client and server.
///
/// ```
/// use surrogate::object_id;
///
/// assert_eq!(object_id("AN1", "reads.bam"), object_id("AN1", "reads.bam"));
/// assert_ne!(object_id("AN1", "reads.bam"), object_id("AN2", "reads.bam"));
/// ```
pub fn object_id(analysis_id: &str, file_name: &str) -> String {
    let name = format!("{analysis_id}/{file_name}");
    Uuid::new_v5(&OBJECT_NAMESPACE, name.as_bytes())
        .hyphenated()
        .to_string()
}
