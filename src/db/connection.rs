use crate::error::StudyDbError;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{ConnectOptions, Connection};
use std::fmt;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};
use tracing::{debug, warn};

pub type ConnectionId = u64;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// A reusable connection handle.
///
/// The handle outlives its session: release closes the session but keeps the
/// handle in its pool, and the next checkout reconnects it. The id is stable for
/// the life of the handle, which is what pool bookkeeping keys on.
pub struct DbConnection {
    id: ConnectionId,
    options: SqliteConnectOptions,
    database_name: String,
    session: Option<SqliteConnection>,
    revoked: Arc<AtomicBool>,
}

impl DbConnection {
    pub(crate) fn new(options: SqliteConnectOptions, database_name: impl Into<String>) -> Self {
        Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            options,
            database_name: database_name.into(),
            session: None,
            revoked: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Opens a session right away. Used for one-off probe connections.
    pub(crate) async fn open(
        options: SqliteConnectOptions,
        database_name: impl Into<String>,
    ) -> Result<Self, StudyDbError> {
        let mut conn = Self::new(options, database_name);
        conn.connect().await?;
        Ok(conn)
    }

    /// A fresh, unconnected handle to the same target with its own id.
    ///
    /// Clones never create a missing database file.
    pub(crate) fn clone_unconnected(&self) -> Self {
        Self::new(
            self.options.clone().create_if_missing(false),
            self.database_name.clone(),
        )
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The database this connection works in.
    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    pub(crate) fn set_database_name(&mut self, database_name: &str) {
        database_name.clone_into(&mut self.database_name);
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked.load(Ordering::Acquire)
    }

    pub(crate) fn revocation(&self) -> Arc<AtomicBool> {
        self.revoked.clone()
    }

    /// The live session, for running queries.
    pub fn session(&mut self) -> Result<&mut SqliteConnection, StudyDbError> {
        if self.is_revoked() {
            return Err(StudyDbError::ConnectionRevoked);
        }
        self.session.as_mut().ok_or(StudyDbError::NotConnected)
    }

    /// Connects if not already connected.
    pub(crate) async fn connect(&mut self) -> Result<(), StudyDbError> {
        if self.is_revoked() {
            return Err(StudyDbError::ConnectionRevoked);
        }
        if self.session.is_none() {
            let session = self.options.connect().await?;
            debug!(connection_id = self.id, database = %self.database_name, "connection opened");
            self.session = Some(session);
        }
        Ok(())
    }

    /// Graceful close of the session; the handle stays usable for a later connect.
    pub(crate) async fn close(&mut self) {
        if let Some(session) = self.session.take()
            && let Err(e) = session.close().await
        {
            warn!(connection_id = self.id, error = %e, "connection close failed");
        }
    }

    /// Drops the session without the close handshake.
    pub(crate) fn abort(&mut self) {
        if self.session.take().is_some() {
            debug!(connection_id = self.id, "connection aborted");
        }
    }
}

impl fmt::Debug for DbConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConnection")
            .field("id", &self.id)
            .field("database_name", &self.database_name)
            .field("connected", &self.session.is_some())
            .field("revoked", &self.is_revoked())
            .finish()
    }
}

/// Runs each `;`-separated statement of `sql` in order.
pub(crate) async fn apply_statements(
    conn: &mut SqliteConnection,
    sql: &str,
) -> Result<(), StudyDbError> {
    for stmt in sql.split(';') {
        let s = stmt.trim();
        if s.is_empty() {
            continue;
        }
        sqlx::query(s).execute(&mut *conn).await?;
    }
    Ok(())
}
