//! # windgo_core
//!
//! Core domain logic for WindGo: models, persistence seams and the
//! authentication core.

pub mod auth;
pub mod chat;
pub mod clock;
pub mod migrate;
pub mod models;
pub mod store;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
