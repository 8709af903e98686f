//! # surrogate
//!
//! Stable, opaque surrogate identifiers (`DO123456`, `MU42`, ...) for
//! biological entities that are known to their submitters only by a composite
//! *business key*.
//!
//! This crate holds the pieces shared by every producer and consumer of ids:
//!
//! - [`EntityKind`] - the fixed set of entity kinds, their prefixes and
//!   business-key shapes.
//! - [`BusinessKey`] - a validated, ordered tuple of submitted fields.
//! - [`format_id`] / [`validate_id`] - the id format model.
//! - [`RetryContext`] - the pure backoff state machine used by clients.
//! - [`object_id`] - deterministic object id derivation.
//!
//! Nothing in this crate performs I/O.
//!
//! ## Features
//!
//! - `tracing`: instrument validation and retry transitions.
//! - `serde`: derive `Serialize`/`Deserialize` for [`EntityKind`] and
//!   [`BusinessKey`].

mod error;
mod format;
mod key;
mod kind;
mod object;
mod retry;

pub use crate::error::*;
pub use crate::format::*;
pub use crate::key::*;
pub use crate::kind::*;
pub use crate::object::*;
pub use crate::retry::*;
