//! HTTP surface of the id service.
//!
//! - [`handler`] - the axum [`Router`](axum::Router) and its handlers.

pub mod handler;
