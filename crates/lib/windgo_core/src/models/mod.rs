//! Domain models shared by the store, the auth core and the HTTP layer.

pub mod auth;
pub mod chat;
