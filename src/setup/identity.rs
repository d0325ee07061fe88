use crate::config::{DEFAULT_DATABASE_NAME, DatabaseConfig};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous};
use std::{
    fmt,
    path::{Path, PathBuf},
    time::Duration,
};

const IDENTITY_CACHE_PREFIX: &str = "db_uuid_";
const DATABASE_FILE_EXTENSION: &str = "sqlite";

/// Durable database identity: the UUID recorded inside the database, or the
/// hostname when none has been recorded yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DbId(String);

impl DbId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DbId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for DbId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for DbId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Where to connect: a data directory (the "host") and a database name.
///
/// Different hostnames may reach the same database file; they resolve to the
/// same `DbId` once the database has been probed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DbTarget {
    pub hostname: String,
    pub database_name: String,
}

impl DbTarget {
    pub fn new(hostname: impl Into<String>, database_name: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            database_name: database_name.into(),
        }
    }

    pub fn from_config(cfg: &DatabaseConfig) -> Self {
        Self::new(cfg.hostname.clone(), cfg.database_name.clone())
    }

    pub fn file_path(&self) -> PathBuf {
        Path::new(&self.hostname).join(format!(
            "{}.{DATABASE_FILE_EXTENSION}",
            self.database_name
        ))
    }

    /// Global-property key under which this target's UUID is cached.
    ///
    /// The `_<name>` suffix is dropped only for `DEFAULT_DATABASE_NAME`, so keys
    /// stay stable when `database.database_name` is reconfigured.
    pub fn identity_cache_key(&self) -> String {
        if self.database_name == DEFAULT_DATABASE_NAME {
            format!("{IDENTITY_CACHE_PREFIX}{}", self.hostname)
        } else {
            format!(
                "{IDENTITY_CACHE_PREFIX}{}_{}",
                self.hostname, self.database_name
            )
        }
    }

    pub(crate) fn connect_options(
        &self,
        busy_timeout: Duration,
        create_if_missing: bool,
    ) -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .filename(self.file_path())
            .create_if_missing(create_if_missing)
            .busy_timeout(busy_timeout)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
    }
}

impl fmt::Display for DbTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.hostname, self.database_name)
    }
}
