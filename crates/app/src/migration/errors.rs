//! Migration errors.

use thiserror::Error;

use crate::{migration::SchemaVersion, store::StoreError};

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("invalid schema version `{0}`")]
    InvalidVersion(String),

    #[error("schema is initialized but has no recorded version")]
    MissingVersion,

    #[error("recorded schema version {recorded} is newer than this build ({current})")]
    NewerThanCurrent {
        recorded: SchemaVersion,
        current: SchemaVersion,
    },

    #[error("failed to apply schema")]
    Store(#[from] StoreError),
}
