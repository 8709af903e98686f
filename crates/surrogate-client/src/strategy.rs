use crate::{CachingIdClient, ClientConfig, Error, HashIdClient, HttpIdClient, IdClient, Result};
use core::{fmt, str::FromStr};

/// Which [`IdClient`] implementation to build from configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientStrategy {
    /// Every call goes to the service.
    Remote,
    /// Calls go to the service once per key and are memoized.
    CachedRemote,
    /// Ids are derived locally from business keys.
    Hash { persist_in_memory: bool },
}

impl ClientStrategy {
    pub fn build(self, config: ClientConfig) -> Result<Box<dyn IdClient>> {
        Ok(match self {
            Self::Remote => Box::new(HttpIdClient::new(config)?),
            Self::CachedRemote => Box::new(CachingIdClient::new(HttpIdClient::new(config)?)),
            Self::Hash {
                persist_in_memory: false,
            } => Box::new(HashIdClient::new()),
            Self::Hash {
                persist_in_memory: true,
            } => Box::new(HashIdClient::persisting()),
        })
    }
}

impl fmt::Display for ClientStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Remote => "remote",
            Self::CachedRemote => "cached",
            Self::Hash {
                persist_in_memory: false,
            } => "hash",
            Self::Hash {
                persist_in_memory: true,
            } => "hash-persistent",
        })
    }
}

impl FromStr for ClientStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "remote" | "http" => Ok(Self::Remote),
            "cached" | "cached-remote" => Ok(Self::CachedRemote),
            "hash" => Ok(Self::Hash {
                persist_in_memory: false,
            }),
            "hash-persistent" => Ok(Self::Hash {
                persist_in_memory: true,
            }),
            other => Err(Error::Config {
                reason: format!(
                    "unknown client strategy '{other}', expected one of remote, cached, hash, hash-persistent"
                ),
            }),
        }
    }
}
