//! Domain and persistence for the Portico gateway: storage, migrations,
//! credentials and accounts.

pub mod auth;
pub mod context;
pub mod database;
pub mod instance;
pub mod migration;
pub mod store;
pub mod users;

#[cfg(test)]
mod test;
