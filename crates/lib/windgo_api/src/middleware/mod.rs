//! Request middleware.

pub mod activity;
pub mod auth;
