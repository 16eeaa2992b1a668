//! Authentication

mod access_token;
mod config;
mod errors;
mod password;
mod personal_token;
mod principal;
mod refresh;
mod secret;
mod service;

pub use access_token::*;
pub use config::*;
pub use errors::*;
pub use password::*;
pub use personal_token::*;
pub use principal::*;
pub use refresh::*;
pub use secret::*;
pub use service::*;
