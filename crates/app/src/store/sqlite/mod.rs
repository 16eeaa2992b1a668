//! SQLite storage driver.

use async_trait::async_trait;
use jiff::Timestamp;
use sqlx::{
    Executor, FromRow, QueryBuilder, Row, Sqlite, SqlitePool, query, query_as, query_scalar, raw_sql,
    sqlite::SqliteRow,
};
use tracing::debug;
use uuid::Uuid;

use crate::store::{
    Driver, StoreError,
    data::{
        FindAccessToken, FindRefreshToken, FindUser, NewAccessToken, NewRefreshToken, NewUser,
        UpdateUser,
    },
    records::{AccessTokenRecord, RefreshTokenRecord, Role, UserId, UserRecord, UserStatus},
};

const IS_INITIALIZED_SQL: &str = include_str!("sql/is_initialized.sql");
const RECORD_SCHEMA_VERSION_SQL: &str = include_str!("sql/record_schema_version.sql");
const GET_INSTANCE_SETTING_SQL: &str = include_str!("sql/get_instance_setting.sql");
const INSERT_INSTANCE_SETTING_SQL: &str = include_str!("sql/insert_instance_setting.sql");
const UPSERT_INSTANCE_SETTING_SQL: &str = include_str!("sql/upsert_instance_setting.sql");
const CREATE_USER_SQL: &str = include_str!("sql/create_user.sql");
const SIGN_UP_USER_SQL: &str = include_str!("sql/sign_up_user.sql");
const LIST_USERS_SQL: &str = include_str!("sql/list_users.sql");
const DELETE_USER_SQL: &str = include_str!("sql/delete_user.sql");
const CREATE_REFRESH_TOKEN_SQL: &str = include_str!("sql/create_refresh_token.sql");
const LIST_REFRESH_TOKENS_SQL: &str = include_str!("sql/list_refresh_tokens.sql");
const REVOKE_REFRESH_TOKEN_SQL: &str = include_str!("sql/revoke_refresh_token.sql");
const REVOKE_USER_REFRESH_TOKENS_SQL: &str = include_str!("sql/revoke_user_refresh_tokens.sql");
const CREATE_ACCESS_TOKEN_SQL: &str = include_str!("sql/create_access_token.sql");
const LIST_ACCESS_TOKENS_SQL: &str = include_str!("sql/list_access_tokens.sql");
const TOUCH_ACCESS_TOKEN_SQL: &str = include_str!("sql/touch_access_token.sql");
const DELETE_ACCESS_TOKEN_SQL: &str = include_str!("sql/delete_access_token.sql");

const SCHEMA_VERSION_SETTING: &str = "schema_version";

const USER_COLUMNS: &str =
    "id, username, nickname, email, role, status, password_hash, created_ts, updated_ts";

/// SQLite-backed implementation of [`Driver`].
#[derive(Debug, Clone)]
pub struct SqliteDriver {
    pool: SqlitePool,
}

impl SqliteDriver {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Driver for SqliteDriver {
    async fn is_initialized(&self) -> Result<bool, StoreError> {
        let tables: i64 = query_scalar(IS_INITIALIZED_SQL)
            .fetch_one(&self.pool)
            .await?;

        Ok(tables > 0)
    }

    async fn apply_schema(
        &self,
        statements: Vec<String>,
        version: String,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        for statement in &statements {
            (&mut *tx).execute(raw_sql(statement.as_str())).await?;
        }

        query(RECORD_SCHEMA_VERSION_SQL)
            .bind(&version)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        debug!(version = %version, scripts = statements.len(), "schema applied");

        Ok(())
    }

    async fn schema_version(&self) -> Result<Option<String>, StoreError> {
        if !self.is_initialized().await? {
            return Ok(None);
        }

        self.get_instance_setting(SCHEMA_VERSION_SETTING).await
    }

    async fn get_instance_setting(&self, name: &str) -> Result<Option<String>, StoreError> {
        query_scalar(GET_INSTANCE_SETTING_SQL)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)
    }

    async fn insert_instance_setting(
        &self,
        name: &str,
        value: &str,
    ) -> Result<bool, StoreError> {
        let rows_affected = query(INSERT_INSTANCE_SETTING_SQL)
            .bind(name)
            .bind(value)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(rows_affected > 0)
    }

    async fn upsert_instance_setting(&self, name: &str, value: &str) -> Result<(), StoreError> {
        query(UPSERT_INSTANCE_SETTING_SQL)
            .bind(name)
            .bind(value)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn create_user(&self, user: NewUser) -> Result<UserRecord, StoreError> {
        let now = Timestamp::now().as_second();

        query_as::<Sqlite, UserRecord>(CREATE_USER_SQL)
            .bind(user.username)
            .bind(user.nickname)
            .bind(user.email)
            .bind(user.role.as_str())
            .bind(user.password_hash)
            .bind(now)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::from)
    }

    async fn sign_up_user(
        &self,
        user: NewUser,
        open_signup: bool,
    ) -> Result<Option<UserRecord>, StoreError> {
        let now = Timestamp::now().as_second();

        query_as::<Sqlite, UserRecord>(SIGN_UP_USER_SQL)
            .bind(user.username)
            .bind(user.nickname)
            .bind(user.email)
            .bind(user.password_hash)
            .bind(now)
            .bind(open_signup)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)
    }

    async fn list_users(&self, find: FindUser) -> Result<Vec<UserRecord>, StoreError> {
        let mut builder = QueryBuilder::<Sqlite>::new(LIST_USERS_SQL);

        if let Some(id) = find.id {
            builder.push(" AND id = ").push_bind(id);
        }

        if let Some(username) = find.username {
            builder.push(" AND username = ").push_bind(username);
        }

        if let Some(role) = find.role {
            builder.push(" AND role = ").push_bind(role.as_str());
        }

        if let Some(status) = find.status {
            builder.push(" AND status = ").push_bind(status.as_str());
        }

        builder.push(" ORDER BY id ASC");

        // SQLite only accepts OFFSET after a LIMIT; -1 means unbounded.
        match (find.limit, find.offset) {
            (Some(limit), offset) => {
                builder.push(" LIMIT ").push_bind(i64::from(limit));
                builder
                    .push(" OFFSET ")
                    .push_bind(i64::from(offset.unwrap_or(0)));
            }
            (None, Some(offset)) => {
                builder.push(" LIMIT -1 OFFSET ").push_bind(i64::from(offset));
            }
            (None, None) => {}
        }

        builder
            .build_query_as::<UserRecord>()
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from)
    }

    async fn update_user(&self, update: UpdateUser) -> Result<UserRecord, StoreError> {
        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE user SET updated_ts = ");
        builder.push_bind(Timestamp::now().as_second());

        if let Some(username) = update.username {
            builder.push(", username = ").push_bind(username);
        }

        if let Some(nickname) = update.nickname {
            builder.push(", nickname = ").push_bind(nickname);
        }

        if let Some(email) = update.email {
            builder.push(", email = ").push_bind(email);
        }

        if let Some(role) = update.role {
            builder.push(", role = ").push_bind(role.as_str());
        }

        if let Some(status) = update.status {
            builder.push(", status = ").push_bind(status.as_str());
        }

        if let Some(password_hash) = update.password_hash {
            builder.push(", password_hash = ").push_bind(password_hash);
        }

        builder.push(" WHERE id = ").push_bind(update.id);
        builder.push(" RETURNING ").push(USER_COLUMNS);

        builder
            .build_query_as::<UserRecord>()
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::from)
    }

    async fn delete_user(&self, id: UserId) -> Result<(), StoreError> {
        let rows_affected = query(DELETE_USER_SQL)
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if rows_affected == 0 {
            return Err(StoreError::NotFound);
        }

        Ok(())
    }

    async fn create_refresh_token(
        &self,
        token: NewRefreshToken,
    ) -> Result<RefreshTokenRecord, StoreError> {
        query_as::<Sqlite, RefreshTokenRecord>(CREATE_REFRESH_TOKEN_SQL)
            .bind(token.token_id)
            .bind(token.user_id)
            .bind(token.created_at.as_second())
            .bind(token.expires_at.as_second())
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::from)
    }

    async fn list_refresh_tokens(
        &self,
        find: FindRefreshToken,
    ) -> Result<Vec<RefreshTokenRecord>, StoreError> {
        let mut builder = QueryBuilder::<Sqlite>::new(LIST_REFRESH_TOKENS_SQL);

        if let Some(token_id) = find.token_id {
            builder.push(" AND token_id = ").push_bind(token_id);
        }

        if let Some(user_id) = find.user_id {
            builder.push(" AND user_id = ").push_bind(user_id);
        }

        builder.push(" ORDER BY created_ts DESC");

        builder
            .build_query_as::<RefreshTokenRecord>()
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from)
    }

    async fn revoke_refresh_token(&self, token_id: &str) -> Result<bool, StoreError> {
        let rows_affected = query(REVOKE_REFRESH_TOKEN_SQL)
            .bind(token_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(rows_affected > 0)
    }

    async fn revoke_user_refresh_tokens(&self, user_id: UserId) -> Result<u64, StoreError> {
        let rows_affected = query(REVOKE_USER_REFRESH_TOKENS_SQL)
            .bind(user_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(rows_affected)
    }

    async fn create_access_token(
        &self,
        token: NewAccessToken,
    ) -> Result<AccessTokenRecord, StoreError> {
        query_as::<Sqlite, AccessTokenRecord>(CREATE_ACCESS_TOKEN_SQL)
            .bind(token.uuid.to_string())
            .bind(token.user_id)
            .bind(token.description)
            .bind(token.token_hash)
            .bind(token.created_at.as_second())
            .bind(token.expires_at.map(Timestamp::as_second))
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::from)
    }

    async fn list_access_tokens(
        &self,
        find: FindAccessToken,
    ) -> Result<Vec<AccessTokenRecord>, StoreError> {
        let mut builder = QueryBuilder::<Sqlite>::new(LIST_ACCESS_TOKENS_SQL);

        if let Some(uuid) = find.uuid {
            builder.push(" AND uuid = ").push_bind(uuid.to_string());
        }

        if let Some(user_id) = find.user_id {
            builder.push(" AND user_id = ").push_bind(user_id);
        }

        builder.push(" ORDER BY created_ts DESC");

        builder
            .build_query_as::<AccessTokenRecord>()
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from)
    }

    async fn touch_access_token(&self, uuid: Uuid, used_at: Timestamp) -> Result<(), StoreError> {
        query(TOUCH_ACCESS_TOKEN_SQL)
            .bind(used_at.as_second())
            .bind(uuid.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn delete_access_token(&self, uuid: Uuid) -> Result<bool, StoreError> {
        let rows_affected = query(DELETE_ACCESS_TOKEN_SQL)
            .bind(uuid.to_string())
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(rows_affected > 0)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

fn decode_timestamp(row: &SqliteRow, column: &str) -> sqlx::Result<Timestamp> {
    let seconds: i64 = row.try_get(column)?;

    Timestamp::from_second(seconds).map_err(|source| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(source),
    })
}

fn decode_optional_timestamp(row: &SqliteRow, column: &str) -> sqlx::Result<Option<Timestamp>> {
    let Some(seconds) = row.try_get::<Option<i64>, _>(column)? else {
        return Ok(None);
    };

    Timestamp::from_second(seconds)
        .map(Some)
        .map_err(|source| sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: Box::new(source),
        })
}

fn decode_parsed<T>(row: &SqliteRow, column: &str) -> sqlx::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.try_get(column)?;

    raw.parse::<T>().map_err(|source| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(source),
    })
}

impl<'r> FromRow<'r, SqliteRow> for UserRecord {
    fn from_row(row: &'r SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            nickname: row.try_get("nickname")?,
            email: row.try_get("email")?,
            role: decode_parsed::<Role>(row, "role")?,
            status: decode_parsed::<UserStatus>(row, "status")?,
            password_hash: row.try_get("password_hash")?,
            created_at: decode_timestamp(row, "created_ts")?,
            updated_at: decode_timestamp(row, "updated_ts")?,
        })
    }
}

impl<'r> FromRow<'r, SqliteRow> for RefreshTokenRecord {
    fn from_row(row: &'r SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            token_id: row.try_get("token_id")?,
            user_id: row.try_get("user_id")?,
            created_at: decode_timestamp(row, "created_ts")?,
            expires_at: decode_timestamp(row, "expires_ts")?,
            revoked: row.try_get("revoked")?,
        })
    }
}

impl<'r> FromRow<'r, SqliteRow> for AccessTokenRecord {
    fn from_row(row: &'r SqliteRow) -> sqlx::Result<Self> {
        Ok(Self {
            uuid: decode_parsed::<Uuid>(row, "uuid")?,
            user_id: row.try_get("user_id")?,
            description: row.try_get("description")?,
            token_hash: row.try_get("token_hash")?,
            created_at: decode_timestamp(row, "created_ts")?,
            expires_at: decode_optional_timestamp(row, "expires_ts")?,
            last_used_at: decode_optional_timestamp(row, "last_used_ts")?,
        })
    }
}
