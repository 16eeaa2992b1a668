//! App Context

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::{
    auth::{
        AuthConfig, AuthService, AuthServiceError, AuthSettings, StoreAuthService,
        load_or_create_secret,
    },
    database::{self, DatabaseSettings},
    instance::{InstanceService, InstanceSettings, StoreInstanceService},
    migration::{MigrationError, MigrationOutcome, Migrator},
    store::{Store, cache::CacheConfig, sqlite::SqliteDriver},
    users::{StoreUsersService, UsersService},
};

#[derive(Debug, Error)]
pub enum AppInitError {
    #[error("failed to connect to database")]
    Database(#[source] sqlx::Error),

    #[error("failed to migrate database schema")]
    Migration(#[from] MigrationError),

    #[error("failed to load process secret")]
    Secret(#[source] AuthServiceError),
}

/// Everything needed to build an [`AppContext`].
#[derive(Debug, Clone, Default)]
pub struct AppSettings {
    pub database: DatabaseSettings,
    pub cache: CacheConfig,
    pub auth: AuthSettings,
    pub instance: InstanceSettings,
}

#[derive(Clone)]
pub struct AppContext {
    pub store: Arc<Store>,
    pub auth: Arc<dyn AuthService>,
    pub users: Arc<dyn UsersService>,
    pub instance: Arc<dyn InstanceService>,
}

impl AppContext {
    /// Connect, migrate, load the process secret and start background tasks.
    ///
    /// # Errors
    ///
    /// Returns an error when connecting, migrating or loading the secret fails.
    /// Nothing is served from a context that failed to initialize.
    pub async fn initialize(settings: AppSettings) -> Result<Self, AppInitError> {
        let pool = database::connect(&settings.database)
            .await
            .map_err(AppInitError::Database)?;

        let store = Arc::new(Store::new(
            Arc::new(SqliteDriver::new(pool)),
            settings.cache,
        ));

        match store.migrate(&Migrator::embedded()?).await? {
            MigrationOutcome::Bootstrapped { version } => {
                info!(%version, "database initialized");
            }
            MigrationOutcome::Upgraded { from, to, applied } => {
                info!(%from, %to, applied, "database migrated");
            }
            MigrationOutcome::UpToDate { version } => {
                info!(%version, "database schema is current");
            }
        }

        let secret = load_or_create_secret(&store)
            .await
            .map_err(AppInitError::Secret)?;

        let config = Arc::new(AuthConfig::new(secret, settings.auth));

        store.start();

        Ok(Self {
            auth: Arc::new(StoreAuthService::new(Arc::clone(&store), config)),
            users: Arc::new(StoreUsersService::new(
                Arc::clone(&store),
                settings.instance.allow_signup,
            )),
            instance: Arc::new(StoreInstanceService::new(
                Arc::clone(&store),
                settings.instance,
            )),
            store,
        })
    }

    /// Stop background tasks and close the pool.
    pub async fn shutdown(&self) {
        self.store.shutdown().await;
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use crate::{migration::CURRENT_SCHEMA_VERSION, store::Driver};

    use super::*;

    fn memory_settings() -> AppSettings {
        AppSettings {
            database: DatabaseSettings {
                url: "sqlite::memory:".to_string(),
                max_connections: 1,
                ..DatabaseSettings::default()
            },
            ..AppSettings::default()
        }
    }

    #[tokio::test]
    async fn fresh_backend_starts_initialized_at_latest_version() -> TestResult {
        let context = AppContext::initialize(memory_settings()).await?;

        assert!(context.store.driver().is_initialized().await?);
        assert_eq!(
            context.store.schema_version().await?,
            Some(CURRENT_SCHEMA_VERSION.to_string())
        );
        assert!(context.store.user_cache().sweeper_running());

        context.shutdown().await;

        assert!(!context.store.user_cache().sweeper_running());

        Ok(())
    }
}
