//! Per-service call handlers and their wire views.

pub(crate) mod auth;
pub(crate) mod instance;
pub(crate) mod tokens;
pub(crate) mod users;

mod views;

#[cfg(test)]
pub(crate) mod fixtures;
