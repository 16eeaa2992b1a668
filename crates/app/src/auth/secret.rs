//! Process secret persistence.

use tracing::info;

use crate::{
    auth::{AuthServiceError, ProcessSecret},
    store::Store,
};

/// Instance setting holding the hex-encoded process secret.
pub const SECRET_KEY_SETTING: &str = "secret_key";

/// Load the instance secret, generating and persisting one on first start.
///
/// Concurrent first starts converge on whichever insert landed first.
///
/// # Errors
///
/// Returns an error when storage fails or the stored value is not a secret.
pub async fn load_or_create_secret(store: &Store) -> Result<ProcessSecret, AuthServiceError> {
    if let Some(stored) = store.instance_setting(SECRET_KEY_SETTING).await? {
        return ProcessSecret::from_hex(&stored).ok_or(AuthServiceError::InvalidSecret);
    }

    let candidate = ProcessSecret::generate();

    if store
        .insert_instance_setting(SECRET_KEY_SETTING, &candidate.to_hex())
        .await?
    {
        info!("generated new process secret");
        return Ok(candidate);
    }

    let stored = store
        .instance_setting(SECRET_KEY_SETTING)
        .await?
        .ok_or(AuthServiceError::InvalidSecret)?;

    ProcessSecret::from_hex(&stored).ok_or(AuthServiceError::InvalidSecret)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use testresult::TestResult;

    use crate::{
        store::{Store, cache::CacheConfig},
        test::TestDb,
    };

    use super::*;

    #[tokio::test]
    async fn secret_is_stable_across_loads() -> TestResult {
        let db = TestDb::migrated().await?;
        let store = Store::new(Arc::new(db.driver().clone()), CacheConfig::default());

        let first = load_or_create_secret(&store).await?;
        let second = load_or_create_secret(&store).await?;

        assert_eq!(first.as_bytes(), second.as_bytes());

        Ok(())
    }

    #[tokio::test]
    async fn corrupt_secret_is_an_error() -> TestResult {
        let db = TestDb::migrated().await?;
        let store = Store::new(Arc::new(db.driver().clone()), CacheConfig::default());

        store
            .insert_instance_setting(SECRET_KEY_SETTING, "not hex")
            .await?;

        assert!(matches!(
            load_or_create_secret(&store).await,
            Err(AuthServiceError::InvalidSecret)
        ));

        Ok(())
    }
}
