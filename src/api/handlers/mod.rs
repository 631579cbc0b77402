//! Route handlers and the shared error-to-response mapping.

pub mod auth;
pub mod health;
pub mod me;
pub mod root;
pub mod users;

pub(crate) mod error;
