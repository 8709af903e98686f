use crate::{Error, ExportConfig, Result, http::http_client};
use flate2::read::GzDecoder;
use reqwest::{StatusCode, blocking::Client};
use std::io::{BufRead, BufReader};
use surrogate::EntityKind;
use tracing::info;

/// Where bulk exports come from.
///
/// `open` returns the decompressed TSV of one kind as a line reader; the
/// caller owns streaming and parsing it.
pub trait ExportSource: Send + Sync {
    fn open(&self, kind: EntityKind) -> Result<Box<dyn BufRead + Send>>;
}

/// Streams `GET {service_url}/{kind}/export` through a gzip decoder.
pub struct HttpExportSource {
    http: Client,
    config: ExportConfig,
}

impl HttpExportSource {
    pub fn new(config: ExportConfig) -> Result<Self> {
        let http = http_client(
            config.auth_token.as_deref(),
            config.connect_timeout,
            config.read_timeout,
            true,
        )?;
        Ok(Self { http, config })
    }
}

impl ExportSource for HttpExportSource {
    fn open(&self, kind: EntityKind) -> Result<Box<dyn BufRead + Send>> {
        let url = format!("{}{}", self.config.base_url(), kind.export_path());
        info!(%url, "Downloading {kind} export");

        let response = self.http.get(&url).send().map_err(|e| Error::export(kind, e))?;
        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().unwrap_or_default();
            return Err(Error::export(kind, format!("{status}: {body}")));
        }
        Ok(Box::new(BufReader::new(GzDecoder::new(response))))
    }
}
