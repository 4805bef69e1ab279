//! Credential checks and cookie sessions.

pub(crate) mod extractors;
pub mod password;
pub mod services;
pub mod session;
