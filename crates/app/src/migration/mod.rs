//! Schema migration engine.
//!
//! A fresh backend receives the full `LATEST` schema in one transaction. An
//! initialized backend receives every embedded script newer than its recorded
//! version, in numeric version order, also in one transaction whose last
//! statement records the new version.

use tracing::{debug, info};

mod errors;
mod version;

pub use errors::*;
pub use version::*;

use crate::store::Driver;

/// Schema version this build ships.
pub const CURRENT_SCHEMA_VERSION: SchemaVersion = SchemaVersion::new(0, 10, 0);

const LATEST_SQL: &str = include_str!("../../migrations/sqlite/LATEST.sql");

const EMBEDDED_SCRIPTS: &[(&str, &str, &str)] = &[
    (
        "0.9",
        "00__refresh_token.sql",
        include_str!("../../migrations/sqlite/0.9/00__refresh_token.sql"),
    ),
    (
        "0.10",
        "00__user_access_token.sql",
        include_str!("../../migrations/sqlite/0.10/00__user_access_token.sql"),
    ),
    (
        "0.10",
        "01__user_email.sql",
        include_str!("../../migrations/sqlite/0.10/01__user_email.sql"),
    ),
];

/// One versioned upgrade script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationScript {
    pub version: SchemaVersion,
    pub name: String,
    pub sql: String,
}

impl MigrationScript {
    /// # Errors
    ///
    /// Returns [`MigrationError::InvalidVersion`] when `version` does not parse.
    pub fn new(
        version: &str,
        name: impl Into<String>,
        sql: impl Into<String>,
    ) -> Result<Self, MigrationError> {
        Ok(Self {
            version: version.parse()?,
            name: name.into(),
            sql: sql.into(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Fresh backend, full schema applied.
    Bootstrapped { version: SchemaVersion },

    /// Incremental scripts applied.
    Upgraded {
        from: SchemaVersion,
        to: SchemaVersion,
        applied: usize,
    },

    /// Nothing to do.
    UpToDate { version: SchemaVersion },
}

#[derive(Debug, Clone)]
pub struct Migrator {
    latest: String,
    scripts: Vec<MigrationScript>,
    current: SchemaVersion,
}

impl Migrator {
    #[must_use]
    pub fn new(
        latest: impl Into<String>,
        mut scripts: Vec<MigrationScript>,
        current: SchemaVersion,
    ) -> Self {
        scripts.sort_by(|a, b| a.version.cmp(&b.version).then_with(|| a.name.cmp(&b.name)));

        Self {
            latest: latest.into(),
            scripts,
            current,
        }
    }

    /// Migrator over the scripts compiled into this build.
    ///
    /// # Errors
    ///
    /// Returns an error when an embedded script directory is not a version.
    pub fn embedded() -> Result<Self, MigrationError> {
        let scripts = EMBEDDED_SCRIPTS
            .iter()
            .map(|(version, name, sql)| MigrationScript::new(version, *name, *sql))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(LATEST_SQL, scripts, CURRENT_SCHEMA_VERSION))
    }

    #[must_use]
    pub fn current(&self) -> SchemaVersion {
        self.current
    }

    /// Scripts strictly newer than `recorded` and not newer than the current
    /// version, in application order.
    #[must_use]
    pub fn pending(&self, recorded: SchemaVersion) -> Vec<&MigrationScript> {
        self.scripts
            .iter()
            .filter(|script| script.version > recorded && script.version <= self.current)
            .collect()
    }

    /// Bring `driver` to the current schema version.
    ///
    /// # Errors
    ///
    /// Returns an error when the recorded version is unreadable or newer than
    /// this build, or when applying the schema fails. Failed applications are
    /// rolled back in full.
    pub async fn run(&self, driver: &dyn Driver) -> Result<MigrationOutcome, MigrationError> {
        if !driver.is_initialized().await? {
            info!(version = %self.current, "initializing fresh schema");

            driver
                .apply_schema(vec![self.latest.clone()], self.current.to_string())
                .await?;

            return Ok(MigrationOutcome::Bootstrapped {
                version: self.current,
            });
        }

        let recorded: SchemaVersion = driver
            .schema_version()
            .await?
            .ok_or(MigrationError::MissingVersion)?
            .parse()?;

        if recorded > self.current {
            return Err(MigrationError::NewerThanCurrent {
                recorded,
                current: self.current,
            });
        }

        if recorded == self.current {
            debug!(version = %recorded, "schema is up to date");
            return Ok(MigrationOutcome::UpToDate { version: recorded });
        }

        let pending = self.pending(recorded);

        // Version bumps without scripts leave the recorded version alone.
        if pending.is_empty() {
            debug!(version = %recorded, current = %self.current, "no pending migrations");
            return Ok(MigrationOutcome::UpToDate { version: recorded });
        }

        for script in &pending {
            info!(version = %script.version, script = script.name, "applying migration");
        }

        let statements = pending.iter().map(|script| script.sql.clone()).collect();

        driver
            .apply_schema(statements, self.current.to_string())
            .await?;

        info!(from = %recorded, to = %self.current, applied = pending.len(), "schema upgraded");

        Ok(MigrationOutcome::Upgraded {
            from: recorded,
            to: self.current,
            applied: pending.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use sqlx::query_scalar;
    use testresult::TestResult;

    use crate::{
        store::{Driver, MockDriver},
        test::TestDb,
    };

    use super::*;

    const BASELINE_0_8: &str = "
        CREATE TABLE instance_setting (name TEXT NOT NULL PRIMARY KEY, value TEXT NOT NULL);
        CREATE TABLE user (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            nickname TEXT NOT NULL DEFAULT '',
            role TEXT NOT NULL DEFAULT 'regular',
            status TEXT NOT NULL DEFAULT 'active',
            password_hash TEXT NOT NULL,
            created_ts INTEGER NOT NULL,
            updated_ts INTEGER NOT NULL
        );
    ";

    async fn table_exists(db: &TestDb, table: &str) -> Result<bool, sqlx::Error> {
        let count: i64 =
            query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(table)
                .fetch_one(db.pool())
                .await?;

        Ok(count > 0)
    }

    #[tokio::test]
    async fn fresh_backend_is_bootstrapped_at_current_version() -> TestResult {
        let db = TestDb::new().await?;
        let migrator = Migrator::embedded()?;

        assert!(!db.driver().is_initialized().await?);

        let outcome = migrator.run(db.driver()).await?;

        assert_eq!(
            outcome,
            MigrationOutcome::Bootstrapped {
                version: CURRENT_SCHEMA_VERSION
            }
        );
        assert!(db.driver().is_initialized().await?);
        assert_eq!(
            db.driver().schema_version().await?,
            Some(CURRENT_SCHEMA_VERSION.to_string())
        );

        Ok(())
    }

    #[tokio::test]
    async fn rerun_on_current_schema_is_a_no_op() -> TestResult {
        let db = TestDb::migrated().await?;
        let outcome = Migrator::embedded()?.run(db.driver()).await?;

        assert_eq!(
            outcome,
            MigrationOutcome::UpToDate {
                version: CURRENT_SCHEMA_VERSION
            }
        );

        Ok(())
    }

    #[tokio::test]
    async fn rerun_on_current_schema_performs_no_writes() -> TestResult {
        let mut driver = MockDriver::new();

        driver.expect_is_initialized().returning(|| Ok(true));
        driver
            .expect_schema_version()
            .returning(|| Ok(Some(CURRENT_SCHEMA_VERSION.to_string())));
        driver.expect_apply_schema().never();
        driver.expect_upsert_instance_setting().never();

        let outcome = Migrator::embedded()?.run(&driver).await?;

        assert!(matches!(outcome, MigrationOutcome::UpToDate { .. }));

        Ok(())
    }

    #[tokio::test]
    async fn older_version_without_pending_scripts_performs_no_writes() -> TestResult {
        let mut driver = MockDriver::new();

        driver.expect_is_initialized().returning(|| Ok(true));
        driver
            .expect_schema_version()
            .returning(|| Ok(Some("0.9.0".to_string())));
        driver.expect_apply_schema().never();
        driver.expect_upsert_instance_setting().never();

        let migrator = Migrator::new(
            "",
            vec![MigrationScript::new("0.9", "00__widget.sql", "CREATE TABLE widget (id INTEGER)")?],
            SchemaVersion::new(0, 10, 0),
        );

        let outcome = migrator.run(&driver).await?;

        assert_eq!(
            outcome,
            MigrationOutcome::UpToDate {
                version: SchemaVersion::new(0, 9, 0)
            }
        );

        Ok(())
    }

    #[tokio::test]
    async fn fresh_install_skips_incremental_scripts() -> TestResult {
        let mut driver = MockDriver::new();

        driver.expect_is_initialized().returning(|| Ok(false));
        driver
            .expect_apply_schema()
            .withf(|statements, version| {
                statements.len() == 1
                    && statements[0] == LATEST_SQL
                    && version == &CURRENT_SCHEMA_VERSION.to_string()
            })
            .times(1)
            .returning(|_, _| Ok(()));

        Migrator::embedded()?.run(&driver).await?;

        Ok(())
    }

    #[test]
    fn pending_orders_scripts_numerically() -> TestResult {
        let migrator = Migrator::new(
            "",
            vec![
                MigrationScript::new("0.10", "01__b.sql", "")?,
                MigrationScript::new("0.9", "00__a.sql", "")?,
                MigrationScript::new("0.10", "00__a.sql", "")?,
                MigrationScript::new("0.8", "00__old.sql", "")?,
                MigrationScript::new("0.11", "00__future.sql", "")?,
            ],
            SchemaVersion::new(0, 10, 0),
        );

        let pending: Vec<_> = migrator
            .pending("0.8".parse()?)
            .into_iter()
            .map(|script| format!("{}/{}", script.version, script.name))
            .collect();

        assert_eq!(
            pending,
            ["0.9.0/00__a.sql", "0.10.0/00__a.sql", "0.10.0/01__b.sql"]
        );

        Ok(())
    }

    #[tokio::test]
    async fn upgrade_applies_0_9_before_0_10() -> TestResult {
        let db = TestDb::new().await?;

        db.driver()
            .apply_schema(vec![BASELINE_0_8.to_string()], "0.8.0".to_string())
            .await?;

        // 0.10 alters a table that only 0.9 creates.
        let migrator = Migrator::new(
            "",
            vec![
                MigrationScript::new("0.10", "00__widget_size.sql", "ALTER TABLE widget ADD COLUMN size INTEGER")?,
                MigrationScript::new("0.9", "00__widget.sql", "CREATE TABLE widget (id INTEGER PRIMARY KEY)")?,
            ],
            SchemaVersion::new(0, 10, 0),
        );

        let outcome = migrator.run(db.driver()).await?;

        assert_eq!(
            outcome,
            MigrationOutcome::Upgraded {
                from: SchemaVersion::new(0, 8, 0),
                to: SchemaVersion::new(0, 10, 0),
                applied: 2,
            }
        );
        assert_eq!(db.driver().schema_version().await?.as_deref(), Some("0.10.0"));

        Ok(())
    }

    #[tokio::test]
    async fn failing_script_rolls_back_everything() -> TestResult {
        let db = TestDb::new().await?;

        db.driver()
            .apply_schema(vec![BASELINE_0_8.to_string()], "0.8.0".to_string())
            .await?;

        let migrator = Migrator::new(
            "",
            vec![
                MigrationScript::new("0.9", "00__widget.sql", "CREATE TABLE widget (id INTEGER PRIMARY KEY)")?,
                MigrationScript::new("0.10", "00__broken.sql", "ALTER TABLE missing ADD COLUMN size INTEGER")?,
            ],
            SchemaVersion::new(0, 10, 0),
        );

        assert!(migrator.run(db.driver()).await.is_err());
        assert!(!table_exists(&db, "widget").await?);
        assert_eq!(db.driver().schema_version().await?.as_deref(), Some("0.8.0"));

        Ok(())
    }

    #[tokio::test]
    async fn embedded_scripts_upgrade_a_0_8_backend() -> TestResult {
        let db = TestDb::new().await?;

        db.driver()
            .apply_schema(vec![BASELINE_0_8.to_string()], "0.8.0".to_string())
            .await?;

        Migrator::embedded()?.run(db.driver()).await?;

        assert!(table_exists(&db, "refresh_token").await?);
        assert!(table_exists(&db, "user_access_token").await?);

        let email_columns: i64 =
            query_scalar("SELECT COUNT(*) FROM pragma_table_info('user') WHERE name = 'email'")
                .fetch_one(db.pool())
                .await?;

        assert_eq!(email_columns, 1);

        Ok(())
    }

    #[tokio::test]
    async fn newer_recorded_version_is_rejected() -> TestResult {
        let mut driver = MockDriver::new();

        driver.expect_is_initialized().returning(|| Ok(true));
        driver
            .expect_schema_version()
            .returning(|| Ok(Some("1.0.0".to_string())));
        driver.expect_apply_schema().never();

        let result = Migrator::embedded()?.run(&driver).await;

        assert!(matches!(
            result,
            Err(MigrationError::NewerThanCurrent { .. })
        ));

        Ok(())
    }
}
