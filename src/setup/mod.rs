//! Identity and setup resolution for a connection target.
//!
//! A probe opens a one-off connection, reads `db_info`, and turns what it finds
//! into a durable `DbId` plus the capability flags a caller needs to decide what
//! to do next. Probe failures never surface as errors; they are described in
//! `status_text` with every flag cleared.

mod identity;

pub use identity::{DbId, DbTarget};

use crate::db::connection::{DbConnection, apply_statements};
use crate::db::models::DbInfoRow;
use crate::db::schema::{DATABASE_VERSION, SQLITE_INIT, SQLITE_SEED, SQLITE_TABLES};
use crate::error::StudyDbError;
use crate::global_properties::GlobalProperties;
use crate::utils::logging::debug_setup_status;
use serde::Serialize;
use sqlx::sqlite::SqliteConnection;
use std::time::Duration;
use tracing::{info, warn};

/// Capability flags and status text, as shown to an operator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SetupStatus {
    pub id: Option<DbId>,
    pub schema_version: i64,
    pub can_open: bool,
    pub can_install: bool,
    pub can_update: bool,
    pub can_uninstall: bool,
    pub can_unlock: bool,
    pub status_text: String,
}

/// Result of probing a `DbTarget`, holding the live seed connection when one
/// could be established.
#[derive(Debug)]
pub struct DbSetup {
    target: DbTarget,
    busy_timeout: Duration,
    status: SetupStatus,
    seed: Option<DbConnection>,
}

impl DbSetup {
    /// Identity from the global cache, without touching the database.
    pub fn cached_id(target: &DbTarget, globals: &GlobalProperties) -> Option<DbId> {
        globals
            .get(&target.identity_cache_key())
            .filter(|uuid| !uuid.trim().is_empty())
            .map(DbId::from)
    }

    pub async fn probe(
        target: DbTarget,
        globals: &GlobalProperties,
        busy_timeout: Duration,
    ) -> Self {
        let mut setup = Self {
            target,
            busy_timeout,
            status: SetupStatus::default(),
            seed: None,
        };
        setup.refresh(globals).await;
        setup
    }

    pub fn target(&self) -> &DbTarget {
        &self.target
    }

    pub fn status(&self) -> &SetupStatus {
        &self.status
    }

    pub fn id(&self) -> Option<&DbId> {
        self.status.id.as_ref()
    }

    pub fn can_open(&self) -> bool {
        self.status.can_open
    }

    pub fn can_install(&self) -> bool {
        self.status.can_install
    }

    pub fn can_update(&self) -> bool {
        self.status.can_update
    }

    pub fn can_uninstall(&self) -> bool {
        self.status.can_uninstall
    }

    pub fn can_unlock(&self) -> bool {
        self.status.can_unlock
    }

    pub fn status_text(&self) -> &str {
        &self.status.status_text
    }

    pub fn has_seed(&self) -> bool {
        self.seed.as_ref().is_some_and(DbConnection::is_connected)
    }

    pub(crate) fn take_seed(&mut self) -> Option<DbConnection> {
        self.seed.take()
    }

    /// Re-reads the database state and recomputes every flag.
    pub async fn refresh(&mut self, globals: &GlobalProperties) {
        let cache_key = self.target.identity_cache_key();
        self.status = SetupStatus {
            id: Self::cached_id(&self.target, globals),
            ..SetupStatus::default()
        };

        let file_path = self.target.file_path();
        if !file_path.is_file() {
            if let Some(seed) = self.seed.as_mut() {
                seed.abort();
            }
            self.seed = None;
            let host_exists = std::path::Path::new(&self.target.hostname).is_dir();
            self.status.can_install = host_exists;
            self.status.status_text = if host_exists {
                "Database is not installed".to_string()
            } else {
                format!("Host directory {} does not exist", self.target.hostname)
            };
            self.log_status();
            return;
        }

        let mut conn = match self.seed.take() {
            Some(conn) if conn.is_connected() => conn,
            _ => match DbConnection::open(
                self.target.connect_options(self.busy_timeout, false),
                self.target.database_name.clone(),
            )
            .await
            {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(db_target = %self.target, error = %e, "database probe failed to connect");
                    self.status.status_text = format!("Cannot connect to {}: {e}", self.target);
                    self.log_status();
                    return;
                }
            },
        };

        let info = match conn.session() {
            Ok(session) => read_info(session).await,
            Err(e) => Err(e),
        };

        match info {
            Ok(None) => {
                self.status.can_install = true;
                self.status.status_text = "Database is not installed".to_string();
            }
            Ok(Some(row)) => {
                let id = if row.uuid.trim().is_empty() {
                    DbId::from(self.target.hostname.as_str())
                } else {
                    globals.set(&cache_key, &row.uuid);
                    DbId::from(row.uuid)
                };
                self.status.id = Some(id);
                self.status.schema_version = row.version;
                self.status.can_uninstall = true;

                if row.locked {
                    self.status.can_unlock = true;
                    self.status.status_text =
                        "Database is locked by an interrupted install or update".to_string();
                } else if row.version > DATABASE_VERSION {
                    self.status.status_text = format!(
                        "Database version {} is newer than supported version {DATABASE_VERSION}",
                        row.version
                    );
                } else if row.version < DATABASE_VERSION {
                    self.status.can_update = true;
                    self.status.status_text = format!(
                        "Database version {} must be updated to {DATABASE_VERSION}",
                        row.version
                    );
                } else {
                    self.status.can_open = true;
                    self.status.status_text = "Database is ready".to_string();
                }
            }
            Err(e) => {
                warn!(db_target = %self.target, error = %e, "database probe query failed");
                self.status.status_text = format!("Cannot read database {}: {e}", self.target);
                self.log_status();
                return;
            }
        }

        self.seed = Some(conn);
        self.log_status();
    }

    /// Creates the schema, assigns a fresh identity and stamps the current version.
    pub async fn install(&mut self, globals: &GlobalProperties) -> Result<(), StudyDbError> {
        self.require(self.status.can_install, "install")?;
        let uuid = uuid::Uuid::new_v4().to_string();
        let mut conn = self.action_connection(true).await?;

        let result = match conn.session() {
            Ok(session) => run_install(session, &uuid).await,
            Err(e) => Err(e),
        };
        // Refresh reopens without create, so the seed never recreates a removed file.
        conn.close().await;
        self.finish_action("install", conn, globals, result).await
    }

    /// Re-applies the schema and stamps the current version.
    pub async fn update(&mut self, globals: &GlobalProperties) -> Result<(), StudyDbError> {
        self.require(self.status.can_update, "update")?;
        let mut conn = self.action_connection(false).await?;

        let result = match conn.session() {
            Ok(session) => run_update(session).await,
            Err(e) => Err(e),
        };
        self.finish_action("update", conn, globals, result).await
    }

    /// Clears the lock left behind by an interrupted install or update.
    pub async fn unlock(&mut self, globals: &GlobalProperties) -> Result<(), StudyDbError> {
        self.require(self.status.can_unlock, "unlock")?;
        let mut conn = self.action_connection(false).await?;

        let result = match conn.session() {
            Ok(session) => sqlx::query("UPDATE db_info SET locked = 0 WHERE id = 1")
                .execute(session)
                .await
                .map(|_| ())
                .map_err(StudyDbError::from),
            Err(e) => Err(e),
        };
        self.finish_action("unlock", conn, globals, result).await
    }

    /// Drops every table and forgets the cached identity.
    ///
    /// The caller must close the database in any registry that has it open first.
    pub async fn uninstall(&mut self, globals: &GlobalProperties) -> Result<(), StudyDbError> {
        self.require(self.status.can_uninstall, "uninstall")?;
        let mut conn = self.action_connection(false).await?;

        let result = match conn.session() {
            Ok(session) => run_uninstall(session).await,
            Err(e) => Err(e),
        };
        if result.is_ok() {
            globals.remove(&self.target.identity_cache_key());
        }
        self.finish_action("uninstall", conn, globals, result).await
    }

    fn require(&self, allowed: bool, action: &str) -> Result<(), StudyDbError> {
        if allowed {
            Ok(())
        } else {
            Err(StudyDbError::Setup(format!(
                "{action} is not available for {}: {}",
                self.target, self.status.status_text
            )))
        }
    }

    async fn action_connection(
        &mut self,
        create_if_missing: bool,
    ) -> Result<DbConnection, StudyDbError> {
        match self.seed.take() {
            Some(conn) if conn.is_connected() => Ok(conn),
            _ => {
                DbConnection::open(
                    self.target
                        .connect_options(self.busy_timeout, create_if_missing),
                    self.target.database_name.clone(),
                )
                .await
            }
        }
    }

    async fn finish_action(
        &mut self,
        action: &str,
        conn: DbConnection,
        globals: &GlobalProperties,
        result: Result<(), StudyDbError>,
    ) -> Result<(), StudyDbError> {
        match &result {
            Ok(()) => info!(db_target = %self.target, action, "database setup action completed"),
            Err(e) => warn!(db_target = %self.target, action, error = %e, "database setup action failed"),
        }
        self.seed = Some(conn);
        self.refresh(globals).await;
        result
    }

    fn log_status(&self) {
        debug_setup_status(&self.target, &self.status);
    }
}

async fn read_info(session: &mut SqliteConnection) -> Result<Option<DbInfoRow>, StudyDbError> {
    let tables: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'db_info'",
    )
    .fetch_one(&mut *session)
    .await?;
    if tables == 0 {
        return Ok(None);
    }

    let row = sqlx::query_as::<_, DbInfoRow>("SELECT uuid, version, locked FROM db_info WHERE id = 1")
        .fetch_optional(&mut *session)
        .await?;
    Ok(row)
}

async fn run_install(session: &mut SqliteConnection, uuid: &str) -> Result<(), StudyDbError> {
    apply_statements(session, SQLITE_INIT).await?;
    sqlx::query(
        r#"
        INSERT INTO db_info (id, uuid, version, locked)
        VALUES (1, ?, 0, 1)
        ON CONFLICT(id) DO UPDATE SET
            uuid = excluded.uuid,
            locked = 1
        "#,
    )
    .bind(uuid)
    .execute(&mut *session)
    .await?;
    apply_statements(session, SQLITE_SEED).await?;
    stamp_version(session).await
}

async fn run_update(session: &mut SqliteConnection) -> Result<(), StudyDbError> {
    sqlx::query("UPDATE db_info SET locked = 1 WHERE id = 1")
        .execute(&mut *session)
        .await?;
    apply_statements(session, SQLITE_INIT).await?;
    apply_statements(session, SQLITE_SEED).await?;
    stamp_version(session).await
}

async fn run_uninstall(session: &mut SqliteConnection) -> Result<(), StudyDbError> {
    for table in SQLITE_TABLES {
        let sql = format!("DROP TABLE IF EXISTS {table}");
        sqlx::query(&sql).execute(&mut *session).await?;
    }
    Ok(())
}

async fn stamp_version(session: &mut SqliteConnection) -> Result<(), StudyDbError> {
    sqlx::query("UPDATE db_info SET version = ?, locked = 0 WHERE id = 1")
        .bind(DATABASE_VERSION)
        .execute(&mut *session)
        .await?;
    Ok(())
}
