//! Authentication core: credential verification, token codec, session
//! mediation, provider sign-in, and the per-request access policy.

pub mod identity;
pub mod oauth;
pub mod policy;
pub mod session;
pub mod state;
pub mod types;

pub(crate) mod password;
pub(crate) mod storage;
pub(crate) mod token;
pub(crate) mod validate;
pub(crate) mod verify;
