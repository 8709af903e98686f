//! Retrying HTTP resolution against the id service.
//!
//! One logical call is a loop over attempts sharing a single
//! [`RetryContext`]. Status codes are normalised as follows:
//!
//! - `200`: the body is the id, validated against its kind before returning.
//! - `404`: absence, `Ok(None)`.
//! - `503`: retryable.
//! - anything else: terminal [`Error::Identifier`] with the response body.
//!
//! Transport failures are classified by walking the error's source chain.
//! Timeouts, connection resets and malformed responses are retried under the
//! same policy as `503`; every other cause is a terminal [`Error::Transport`].

use crate::{ClientConfig, Error, IdClient, Result, Sleeper, ThreadSleeper};
use core::{fmt, time::Duration};
use flate2::read::GzDecoder;
use reqwest::{
    StatusCode,
    blocking::{Client, Response},
    header,
};
use std::{error::Error as StdError, io, io::Read};
use surrogate::{BusinessKey, EntityKind, RetryContext, validate_analysis_id, validate_id};
use tracing::{debug, info, warn};

/// Builds the blocking HTTP client shared by lookups and export downloads.
pub(crate) fn http_client(
    auth_token: Option<&str>,
    connect_timeout: Duration,
    read_timeout: Duration,
    strict_ssl_certificates: bool,
) -> Result<Client> {
    let mut headers = header::HeaderMap::new();
    if let Some(token) = auth_token {
        let mut value = header::HeaderValue::from_str(&format!("Bearer {token}")).map_err(|e| {
            Error::Config {
                reason: format!("auth token is not a valid header value: {e}"),
            }
        })?;
        value.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, value);
    }

    Client::builder()
        .default_headers(headers)
        .connect_timeout(connect_timeout)
        .timeout(read_timeout)
        .danger_accept_invalid_certs(!strict_ssl_certificates)
        .build()
        .map_err(|e| Error::Config {
            reason: e.to_string(),
        })
}

/// Retryable transport causes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TransportCause {
    Timeout,
    ConnectionReset,
    Protocol,
}

impl fmt::Display for TransportCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Timeout => "timeout",
            Self::ConnectionReset => "connection reset",
            Self::Protocol => "protocol error",
        })
    }
}

/// Finds the first retryable cause anywhere in `err`'s source chain.
pub(crate) fn retryable_cause(err: &(dyn StdError + 'static)) -> Option<TransportCause> {
    let mut next = Some(err);
    while let Some(err) = next {
        if let Some(err) = err.downcast_ref::<reqwest::Error>() {
            if err.is_timeout() {
                return Some(TransportCause::Timeout);
            }
            if err.is_body() || err.is_decode() {
                return Some(TransportCause::Protocol);
            }
        }
        if let Some(err) = err.downcast_ref::<hyper::Error>() {
            if err.is_timeout() {
                return Some(TransportCause::Timeout);
            }
            if err.is_parse() || err.is_parse_status() || err.is_incomplete_message() {
                return Some(TransportCause::Protocol);
            }
            if err.is_closed() || err.is_canceled() {
                return Some(TransportCause::ConnectionReset);
            }
        }
        if let Some(err) = err.downcast_ref::<io::Error>() {
            match err.kind() {
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => {
                    return Some(TransportCause::Timeout);
                }
                io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::UnexpectedEof => return Some(TransportCause::ConnectionReset),
                io::ErrorKind::InvalidData => return Some(TransportCause::Protocol),
                _ => {}
            }
        }
        next = err.source();
    }
    None
}

/// The outcome of one failed attempt.
enum Failure {
    Retryable(String),
    Terminal(Error),
}

impl Failure {
    fn classify(err: &(dyn StdError + 'static)) -> Self {
        match retryable_cause(err) {
            Some(cause) => Self::Retryable(format!("{cause}: {err}")),
            None => Self::Terminal(Error::Transport {
                message: err.to_string(),
            }),
        }
    }
}

/// Resolves ids against a remote id service.
///
/// Every call blocks the calling thread, including for retry backoff.
pub struct HttpIdClient<S = ThreadSleeper> {
    http: Client,
    config: ClientConfig,
    sleeper: S,
}

impl HttpIdClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::with_sleeper(config, ThreadSleeper)
    }
}

impl<S: Sleeper> HttpIdClient<S> {
    pub fn with_sleeper(config: ClientConfig, sleeper: S) -> Result<Self> {
        let http = http_client(
            config.auth_token.as_deref(),
            config.connect_timeout,
            config.read_timeout,
            config.strict_ssl_certificates,
        )?;
        Ok(Self {
            http,
            config,
            sleeper,
        })
    }

    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn query(&self, key: &BusinessKey, create: bool) -> Vec<(&'static str, String)> {
        let kind = key.kind();
        let mut query: Vec<_> = key
            .query_pairs()
            .map(|(param, value)| (param, value.to_string()))
            .collect();
        if kind.takes_release() {
            query.push(("release", self.config.release.clone()));
        }
        if kind != EntityKind::Object {
            query.push(("create", create.to_string()));
        }
        query
    }

    /// Runs one logical call. `read` consumes the body of a `200`.
    fn call<T>(
        &self,
        url: &str,
        query: &[(&str, String)],
        read: impl Fn(Response) -> core::result::Result<T, Failure>,
    ) -> Result<Option<T>> {
        let mut ctx = RetryContext::new(
            self.config.max_retries,
            self.config.wait_before_retry,
            self.config.retry_multiplier,
        );
        let mut attempts = 1;
        loop {
            let cause = match self.attempt(url, query, &read) {
                Ok(value) => return Ok(value),
                Err(Failure::Terminal(err)) => return Err(err),
                Err(Failure::Retryable(cause)) => cause,
            };

            if !ctx.can_retry() {
                return Err(Error::ExhaustedRetry { attempts, cause });
            }
            warn!(
                url,
                attempt = attempts,
                retries_left = ctx.attempts(),
                sleep_ms = u64::try_from(ctx.sleep().as_millis()).unwrap_or(u64::MAX),
                "Retryable failure: {cause}"
            );
            self.sleeper.sleep(ctx.sleep());
            ctx = ctx.next();
            attempts += 1;
        }
    }

    fn attempt<T>(
        &self,
        url: &str,
        query: &[(&str, String)],
        read: &impl Fn(Response) -> core::result::Result<T, Failure>,
    ) -> core::result::Result<Option<T>, Failure> {
        let response = self
            .http
            .get(url)
            .query(query)
            .send()
            .map_err(|e| Failure::classify(&e))?;

        let status = response.status();
        if self.config.request_logging {
            info!(url = %response.url(), %status, "Id request");
        } else {
            debug!(url = %response.url(), %status, "Id request");
        }

        match status {
            StatusCode::OK => read(response).map(Some),
            StatusCode::NOT_FOUND => Ok(None),
            StatusCode::SERVICE_UNAVAILABLE => Err(Failure::Retryable(format!(
                "{status}: {}",
                response.text().unwrap_or_default()
            ))),
            _ => Err(Failure::Terminal(Error::Identifier {
                status: status.as_u16(),
                message: response.text().unwrap_or_default(),
            })),
        }
    }
}

fn read_text(response: Response) -> core::result::Result<String, Failure> {
    response.text().map_err(|e| Failure::classify(&e))
}

fn read_gzip(response: Response) -> core::result::Result<String, Failure> {
    let mut text = String::new();
    GzDecoder::new(response)
        .read_to_string(&mut text)
        .map_err(|e| Failure::classify(&e))?;
    Ok(text)
}

impl<S: Sleeper> IdClient for HttpIdClient<S> {
    fn resolve(&self, key: &BusinessKey, create: bool) -> Result<Option<String>> {
        let kind = key.kind();
        if kind == EntityKind::Analysis {
            // Empty asks the service to mint one.
            if let Some(submitted) = key.fields().first().filter(|id| !id.is_empty()) {
                validate_analysis_id(submitted)?;
            }
        }

        let url = format!("{}{}", self.config.base_url(), kind.id_path());
        let id = self.call(&url, &self.query(key, create), read_text)?;
        match id {
            Some(id) => {
                validate_id(&id, kind)?;
                Ok(Some(id))
            }
            None => {
                debug!(%kind, key = %key.joined(), "Id not found");
                Ok(None)
            }
        }
    }

    fn create_random_analysis_id(&self) -> Result<String> {
        self.create(&BusinessKey::analysis(""))
    }

    fn export(&self, kind: EntityKind) -> Result<String> {
        if kind == EntityKind::Object {
            return Err(Error::ExportNotSupported { kind });
        }
        let url = format!("{}{}", self.config.base_url(), kind.export_path());
        self.call(&url, &[], read_gzip)?
            .ok_or_else(|| Error::export(kind, "export endpoint returned 404"))
    }
}
