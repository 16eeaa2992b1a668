//! Storage layer: driver interface, identity cache and the store wrapper.

use std::{fmt, future::Future, sync::Arc, time::Duration};

use jiff::Timestamp;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

pub mod cache;
pub mod data;
mod driver;
mod errors;
pub mod records;
pub mod sqlite;

pub use driver::*;
pub use errors::*;

use crate::{
    migration::{MigrationError, MigrationOutcome, Migrator},
    store::{
        cache::{CacheConfig, TtlCache},
        data::{
            FindAccessToken, FindRefreshToken, FindUser, NewAccessToken, NewRefreshToken, NewUser,
            UpdateUser,
        },
        records::{AccessTokenRecord, RefreshTokenRecord, UserId, UserRecord},
    },
};

/// Retry schedule for transient storage faults.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(50),
        }
    }
}

/// Driver wrapper adding the identity cache, bounded retries and migrations.
pub struct Store {
    driver: Arc<dyn Driver>,
    users: TtlCache<UserId, UserRecord>,
    retry: RetryPolicy,
    migration_lock: Mutex<()>,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("cached_users", &self.users.len())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl Store {
    #[must_use]
    pub fn new(driver: Arc<dyn Driver>, cache: CacheConfig) -> Self {
        Self {
            driver,
            users: TtlCache::new(cache),
            retry: RetryPolicy::default(),
            migration_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    #[must_use]
    pub fn user_cache(&self) -> &TtlCache<UserId, UserRecord> {
        &self.users
    }

    /// Start the periodic cache sweep.
    pub fn start(&self) {
        self.users.spawn_sweeper();
    }

    /// Bring the schema up to date while holding the migration lock.
    ///
    /// # Errors
    ///
    /// Returns an error when any migration step fails; nothing is applied.
    pub async fn migrate(&self, migrator: &Migrator) -> Result<MigrationOutcome, MigrationError> {
        let _guard = self.migration_lock.lock().await;

        migrator.run(self.driver.as_ref()).await
    }

    /// Fetch a user, serving from the cache when possible.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no user has `id`.
    pub async fn get_user(&self, id: UserId) -> Result<UserRecord, StoreError> {
        if let Some(user) = self.users.get(&id) {
            return Ok(user);
        }

        // A write racing this read bumps the generation and the fill is skipped.
        let generation = self.users.generation();

        let user = self
            .retrying("list_users", || self.driver.list_users(FindUser::by_id(id)))
            .await?
            .into_iter()
            .next()
            .ok_or(StoreError::NotFound)?;

        self.users.set_if_unchanged(user.id, user.clone(), generation);

        Ok(user)
    }

    /// # Errors
    ///
    /// Returns an error when the storage query fails.
    pub async fn find_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserRecord>, StoreError> {
        let users = self
            .retrying("list_users", || {
                self.driver.list_users(FindUser::by_username(username))
            })
            .await?;

        Ok(users.into_iter().next())
    }

    /// # Errors
    ///
    /// Returns an error when the storage query fails.
    pub async fn list_users(&self, find: FindUser) -> Result<Vec<UserRecord>, StoreError> {
        self.retrying("list_users", || self.driver.list_users(find.clone()))
            .await
    }

    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyExists`] when the username is taken.
    pub async fn create_user(&self, user: NewUser) -> Result<UserRecord, StoreError> {
        let created = self.driver.create_user(user).await?;
        self.users.delete(&created.id);

        Ok(created)
    }

    /// Register a user, deciding the role and the registration gate in one
    /// storage write. Returns `None` when registration is closed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyExists`] when the username is taken.
    pub async fn sign_up_user(
        &self,
        user: NewUser,
        open_signup: bool,
    ) -> Result<Option<UserRecord>, StoreError> {
        let created = self.driver.sign_up_user(user, open_signup).await?;

        if let Some(user) = &created {
            self.users.delete(&user.id);
        }

        Ok(created)
    }

    /// Apply a partial update. The cache entry is dropped whether or not the
    /// write succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no user has `update.id`.
    pub async fn update_user(&self, update: UpdateUser) -> Result<UserRecord, StoreError> {
        let id = update.id;
        let result = self
            .retrying("update_user", || self.driver.update_user(update.clone()))
            .await;

        self.users.delete(&id);

        result
    }

    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no user has `id`.
    pub async fn delete_user(&self, id: UserId) -> Result<(), StoreError> {
        let result = self.driver.delete_user(id).await;
        self.users.delete(&id);

        result
    }

    /// # Errors
    ///
    /// Returns an error when the insert fails.
    pub async fn create_refresh_token(
        &self,
        token: NewRefreshToken,
    ) -> Result<RefreshTokenRecord, StoreError> {
        self.driver.create_refresh_token(token).await
    }

    /// # Errors
    ///
    /// Returns an error when the storage query fails.
    pub async fn find_refresh_token(
        &self,
        token_id: &str,
    ) -> Result<Option<RefreshTokenRecord>, StoreError> {
        let find = FindRefreshToken {
            token_id: Some(token_id.to_string()),
            ..FindRefreshToken::default()
        };

        let tokens = self
            .retrying("list_refresh_tokens", || {
                self.driver.list_refresh_tokens(find.clone())
            })
            .await?;

        Ok(tokens.into_iter().next())
    }

    /// Revoke one refresh token. Not retried: the boolean result decides the
    /// winner of a concurrent rotation.
    ///
    /// # Errors
    ///
    /// Returns an error when the update fails.
    pub async fn revoke_refresh_token(&self, token_id: &str) -> Result<bool, StoreError> {
        self.driver.revoke_refresh_token(token_id).await
    }

    /// # Errors
    ///
    /// Returns an error when the update fails.
    pub async fn revoke_user_refresh_tokens(&self, user_id: UserId) -> Result<u64, StoreError> {
        self.retrying("revoke_user_refresh_tokens", || {
            self.driver.revoke_user_refresh_tokens(user_id)
        })
        .await
    }

    /// # Errors
    ///
    /// Returns an error when the insert fails.
    pub async fn create_access_token(
        &self,
        token: NewAccessToken,
    ) -> Result<AccessTokenRecord, StoreError> {
        self.driver.create_access_token(token).await
    }

    /// # Errors
    ///
    /// Returns an error when the storage query fails.
    pub async fn find_access_token(
        &self,
        uuid: Uuid,
    ) -> Result<Option<AccessTokenRecord>, StoreError> {
        let find = FindAccessToken {
            uuid: Some(uuid),
            ..FindAccessToken::default()
        };

        let tokens = self
            .retrying("list_access_tokens", || {
                self.driver.list_access_tokens(find.clone())
            })
            .await?;

        Ok(tokens.into_iter().next())
    }

    /// # Errors
    ///
    /// Returns an error when the storage query fails.
    pub async fn list_access_tokens(
        &self,
        user_id: UserId,
    ) -> Result<Vec<AccessTokenRecord>, StoreError> {
        let find = FindAccessToken {
            user_id: Some(user_id),
            ..FindAccessToken::default()
        };

        self.retrying("list_access_tokens", || {
            self.driver.list_access_tokens(find.clone())
        })
        .await
    }

    /// # Errors
    ///
    /// Returns an error when the update fails.
    pub async fn touch_access_token(
        &self,
        uuid: Uuid,
        used_at: Timestamp,
    ) -> Result<(), StoreError> {
        self.retrying("touch_access_token", || {
            self.driver.touch_access_token(uuid, used_at)
        })
        .await
    }

    /// # Errors
    ///
    /// Returns an error when the delete fails.
    pub async fn delete_access_token(&self, uuid: Uuid) -> Result<bool, StoreError> {
        self.retrying("delete_access_token", || {
            self.driver.delete_access_token(uuid)
        })
        .await
    }

    /// # Errors
    ///
    /// Returns an error when the storage query fails.
    pub async fn instance_setting(&self, name: &str) -> Result<Option<String>, StoreError> {
        self.retrying("get_instance_setting", || {
            self.driver.get_instance_setting(name)
        })
        .await
    }

    /// Insert a setting only when it is absent; returns whether it was written.
    ///
    /// # Errors
    ///
    /// Returns an error when the insert fails.
    pub async fn insert_instance_setting(
        &self,
        name: &str,
        value: &str,
    ) -> Result<bool, StoreError> {
        self.driver.insert_instance_setting(name, value).await
    }

    /// # Errors
    ///
    /// Returns an error when the storage query fails.
    pub async fn schema_version(&self) -> Result<Option<String>, StoreError> {
        self.retrying("schema_version", || self.driver.schema_version())
            .await
    }

    /// Stop the cache sweeper and close the driver.
    pub async fn shutdown(&self) {
        self.users.shutdown().await;
        self.users.clear();
        self.driver.close().await;
    }

    async fn retrying<T, F, Fut>(&self, operation: &'static str, mut call: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let attempts = self.retry.attempts.max(1);
        let mut attempt = 1;

        loop {
            match call().await {
                Err(error) if error.is_transient() && attempt < attempts => {
                    warn!(operation, attempt, "transient storage error, retrying: {error}");

                    tokio::time::sleep(self.retry.backoff * attempt).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use testresult::TestResult;

    use crate::{
        store::records::{Role, UserStatus},
        test::TestDb,
    };

    use super::*;

    fn new_user(username: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            nickname: "before".to_string(),
            email: String::new(),
            role: Role::Regular,
            password_hash: "hash".to_string(),
        }
    }

    async fn store() -> TestResult<(TestDb, Store)> {
        let db = TestDb::migrated().await?;
        let store = Store::new(Arc::new(db.driver().clone()), CacheConfig::default());

        Ok((db, store))
    }

    #[tokio::test]
    async fn update_is_visible_with_a_cold_cache() -> TestResult {
        let (_db, store) = store().await?;
        let user = store.create_user(new_user("alice")).await?;

        store
            .update_user(UpdateUser {
                id: user.id,
                nickname: Some("after".to_string()),
                ..UpdateUser::default()
            })
            .await?;

        assert_eq!(store.get_user(user.id).await?.nickname, "after");

        Ok(())
    }

    #[tokio::test]
    async fn update_is_visible_with_a_warm_cache() -> TestResult {
        let (_db, store) = store().await?;
        let user = store.create_user(new_user("alice")).await?;

        assert_eq!(store.get_user(user.id).await?.nickname, "before");
        assert_eq!(store.user_cache().len(), 1);

        store
            .update_user(UpdateUser {
                id: user.id,
                nickname: Some("after".to_string()),
                ..UpdateUser::default()
            })
            .await?;

        assert_eq!(store.get_user(user.id).await?.nickname, "after");

        Ok(())
    }

    #[tokio::test]
    async fn delete_evicts_cached_user() -> TestResult {
        let (_db, store) = store().await?;
        let user = store.create_user(new_user("alice")).await?;

        store.get_user(user.id).await?;
        store.delete_user(user.id).await?;

        assert!(matches!(
            store.get_user(user.id).await,
            Err(StoreError::NotFound)
        ));

        Ok(())
    }

    fn user_row(nickname: &str) -> UserRecord {
        UserRecord {
            id: 1,
            username: "alice".to_string(),
            nickname: nickname.to_string(),
            email: String::new(),
            role: Role::Regular,
            status: UserStatus::Active,
            password_hash: "hash".to_string(),
            created_at: Timestamp::UNIX_EPOCH,
            updated_at: Timestamp::UNIX_EPOCH,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn read_racing_an_update_does_not_recache_the_old_row() -> TestResult {
        let (reading_tx, reading_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();

        let mut driver = MockDriver::new();
        let mut sequence = mockall::Sequence::new();

        // The first read fetches the old row, then stalls until the update
        // has been written and its invalidation has run.
        driver
            .expect_list_users()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(move |_| {
                _ = reading_tx.send(());
                _ = release_rx.recv();
                Ok(vec![user_row("before")])
            });
        driver
            .expect_list_users()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| Ok(vec![user_row("after")]));
        driver
            .expect_update_user()
            .times(1)
            .returning(|_| Ok(user_row("after")));

        let store = Arc::new(Store::new(Arc::new(driver), CacheConfig::default()));

        let reader = tokio::spawn({
            let store = Arc::clone(&store);
            async move { store.get_user(1).await }
        });

        tokio::task::spawn_blocking(move || reading_rx.recv()).await??;

        store
            .update_user(UpdateUser {
                id: 1,
                nickname: Some("after".to_string()),
                ..UpdateUser::default()
            })
            .await?;

        release_tx.send(())?;

        assert_eq!(reader.await??.nickname, "before");
        assert!(store.user_cache().is_empty(), "stale read must not be cached");
        assert_eq!(store.get_user(1).await?.nickname, "after");

        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried_up_to_the_limit() -> TestResult {
        let calls = Arc::new(AtomicU32::new(0));
        let mut driver = MockDriver::new();

        let counter = Arc::clone(&calls);
        driver.expect_get_instance_setting().returning(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Unavailable(sqlx::Error::PoolTimedOut))
        });

        let store = Store::new(Arc::new(driver), CacheConfig::default());
        let result = store.instance_setting("secret_key").await;

        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn retry_stops_after_a_success() -> TestResult {
        let calls = Arc::new(AtomicU32::new(0));
        let mut driver = MockDriver::new();

        let counter = Arc::clone(&calls);
        driver.expect_get_instance_setting().returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(StoreError::Unavailable(sqlx::Error::PoolTimedOut))
            } else {
                Ok(Some("0.10.0".to_string()))
            }
        });

        let store = Store::new(Arc::new(driver), CacheConfig::default());

        assert_eq!(
            store.instance_setting("schema_version").await?.as_deref(),
            Some("0.10.0")
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        Ok(())
    }

    #[tokio::test]
    async fn not_found_is_not_retried() -> TestResult {
        let mut driver = MockDriver::new();

        driver
            .expect_list_users()
            .times(1)
            .returning(|_| Ok(Vec::new()));

        let store = Store::new(Arc::new(driver), CacheConfig::default());

        assert!(matches!(store.get_user(7).await, Err(StoreError::NotFound)));

        Ok(())
    }
}
