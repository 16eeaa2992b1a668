//! User accounts.

mod errors;
mod service;
mod validation;

pub use errors::*;
pub use service::*;
pub use validation::*;
