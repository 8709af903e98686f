//! # surrogate-client
//!
//! Ways of turning a business key into a surrogate id:
//!
//! - [`HttpIdClient`]: asks the id service, retrying `503`s and transient
//!   transport failures with exponential backoff.
//! - [`CachingIdClient`]: wraps another client, coalescing concurrent
//!   identical lookups and memoizing results.
//! - [`HashIdClient`]: derives ids from the key itself, no service needed.
//! - [`ExportIdCache`]: serves a whole kind from a local on-disk mirror of the
//!   service's bulk export.
//!
//! All clients implement [`IdClient`] and can be selected at runtime through
//! [`ClientStrategy`].
//!
//! ```no_run
//! use surrogate_client::{ClientConfig, ClientStrategy};
//!
//! let config = ClientConfig::new("http://localhost:8080").with_release("ICGC22");
//! let client = ClientStrategy::CachedRemote.build(config)?;
//! let donor = client.create_donor_id("DO-submitted-1", "PROJ-1")?;
//! assert!(donor.starts_with("DO"));
//! # Ok::<(), surrogate_client::Error>(())
//! ```

mod caching;
mod client;
mod config;
mod error;
mod export;
mod flight;
mod hash;
mod http;
mod sleep;
mod strategy;

pub use crate::caching::*;
pub use crate::client::*;
pub use crate::config::*;
pub use crate::error::*;
pub use crate::export::*;
pub use crate::hash::*;
pub use crate::http::HttpIdClient;
pub use crate::sleep::*;
pub use crate::strategy::*;
