//! Server-side components of the surrogate id service.
//!
//! - [`allocator`] - get-or-create resolution and random analysis ids.
//! - [`store`] - the SQLite backing store and its schema.
//! - [`export`] - gzip TSV snapshots of one kind.
//! - [`service`] - the axum routes.
//! - [`config`] - CLI and environment configuration.
//! - [`telemetry`] - logging initialisation.

pub mod allocator;
pub mod config;
pub mod error;
pub mod export;
pub mod service;
pub mod store;
pub mod telemetry;
