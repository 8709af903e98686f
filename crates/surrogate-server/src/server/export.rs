use crate::server::{error::Result, store::Store};
use flate2::{Compression, write::GzEncoder};
use surrogate::EntityKind;
use tracing::info;

/// Dumps every mapping of `kind` as gzip-compressed TSV.
///
/// The archive is built in memory; exports are rare and bounded by the size
/// of one table.
pub fn gzip_export(store: &impl Store, kind: EntityKind) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    let rows = store.export(kind, &mut encoder)?;
    let archive = encoder.finish()?;
    info!(%kind, rows, bytes = archive.len(), "Exported ids");
    Ok(archive)
}
