use core::time::Duration;

/// Connection and retry settings for [`crate::HttpIdClient`].
#[derive(Clone, Debug, PartialEq)]
pub struct ClientConfig {
    /// Base URL of the id service, e.g. `https://ids.example.org`.
    pub service_url: String,
    /// Sent as the `release` parameter for kinds that carry one.
    pub release: String,
    /// Sent as `Authorization: Bearer <token>` when present.
    pub auth_token: Option<String>,
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    pub wait_before_retry: Duration,
    pub retry_multiplier: f64,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// Log every request and its status at `info` instead of `debug`.
    pub request_logging: bool,
    pub strict_ssl_certificates: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            service_url: "http://localhost:8080".to_string(),
            release: String::new(),
            auth_token: None,
            max_retries: 10,
            wait_before_retry: Duration::from_secs(15),
            retry_multiplier: 2.0,
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(5),
            request_logging: false,
            strict_ssl_certificates: true,
        }
    }
}

impl ClientConfig {
    pub fn new(service_url: impl Into<String>) -> Self {
        Self {
            service_url: service_url.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_release(mut self, release: impl Into<String>) -> Self {
        self.release = release.into();
        self
    }

    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    #[must_use]
    pub const fn with_retries(mut self, max_retries: u32, wait: Duration, multiplier: f64) -> Self {
        self.max_retries = max_retries;
        self.wait_before_retry = wait;
        self.retry_multiplier = multiplier;
        self
    }

    /// The service URL without trailing slashes.
    pub(crate) fn base_url(&self) -> &str {
        self.service_url.trim_end_matches('/')
    }
}

/// Settings for the bulk export source backing [`crate::ExportIdCache`].
///
/// Exports are large, so the read timeout is far longer than a lookup's.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportConfig {
    pub service_url: String,
    pub auth_token: Option<String>,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            service_url: "http://localhost:8080".to_string(),
            auth_token: None,
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(30 * 60),
        }
    }
}

impl ExportConfig {
    pub fn new(service_url: impl Into<String>) -> Self {
        Self {
            service_url: service_url.into(),
            ..Self::default()
        }
    }

    pub(crate) fn base_url(&self) -> &str {
        self.service_url.trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ClientConfig::default();
        assert_eq!(config.max_retries, 10);
        assert_eq!(config.wait_before_retry, Duration::from_secs(15));
        assert!((config.retry_multiplier - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.read_timeout, Duration::from_secs(5));
        assert!(config.strict_ssl_certificates);
        assert!(!config.request_logging);
    }

    #[test]
    fn base_url_drops_trailing_slashes() {
        assert_eq!(ClientConfig::new("http://ids:8080//").base_url(), "http://ids:8080");
        assert_eq!(ExportConfig::new("http://ids/").base_url(), "http://ids");
    }
}
