use super::auto_import;
use super::pool::{ConnectionPool, PoolStats};
use super::properties::{self, PropertyCache};
use super::reference::ReferenceData;
use super::{IdentityListener, RegistryHooks};
use crate::config::RegistryConfig;
use crate::db::connection::{ConnectionId, DbConnection};
use crate::error::{IsRetryable, StudyDbError};
use crate::setup::{DbId, DbTarget};
use ahash::AHashMap;
use ractor::{Actor, ActorProcessingErr, ActorRef, MessagingErr, RpcReplyPort};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Everything needed to register a probed database.
#[derive(Debug)]
pub struct OpenRequest {
    pub id: DbId,
    pub target: DbTarget,
    pub seed: DbConnection,
}

#[derive(Debug)]
pub enum RegistryMessage {
    /// Register a probed database; idempotent per id.
    Open(OpenRequest, RpcReplyPort<Result<(), StudyDbError>>),

    /// Hand out a connected handle for an open database.
    Checkout(DbId, RpcReplyPort<Result<DbConnection, StudyDbError>>),

    /// Return a handle. Fire-and-forget.
    Release(DbConnection),

    /// Flush properties, abort idle sessions and forget the database.
    ///
    /// Checked-out handles are revoked, not closed: their holder still owns the
    /// SQLite session until it releases or drops the handle, but every further
    /// `session()` or reconnect on it fails with `ConnectionRevoked`.
    Close(DbId, RpcReplyPort<()>),

    /// Close every open database.
    CloseAll(RpcReplyPort<()>),

    GetProperty(DbId, String, RpcReplyPort<Result<Option<String>, StudyDbError>>),

    SetProperty(DbId, String, String, RpcReplyPort<Result<(), StudyDbError>>),

    /// Flush dirty properties, optionally reloading the cache.
    SyncProperties(DbId, bool, RpcReplyPort<Result<(), StudyDbError>>),

    /// Delete properties matching a `LIKE` pattern; returns the row count.
    DeleteProperties(DbId, String, RpcReplyPort<Result<u64, StudyDbError>>),

    IsOpen(DbId, RpcReplyPort<bool>),

    OpenIds(RpcReplyPort<Vec<DbId>>),

    PoolStats(DbId, RpcReplyPort<Option<PoolStats>>),

    ReferenceData(RpcReplyPort<Option<Arc<ReferenceData>>>),
}

struct OpenDatabase {
    target: DbTarget,
    pool: ConnectionPool,
    properties: PropertyCache,
}

struct CheckedOut {
    db_id: DbId,
    revoked: Arc<AtomicBool>,
}

pub(super) struct RegistryState {
    config: RegistryConfig,
    importer: Option<Arc<dyn auto_import::AutoImporter>>,
    listeners: Vec<Arc<dyn IdentityListener>>,
    databases: AHashMap<DbId, OpenDatabase>,
    in_use: AHashMap<ConnectionId, CheckedOut>,
    reference: Option<Arc<ReferenceData>>,
}

pub(super) struct RegistryActor;

#[ractor::async_trait]
impl Actor for RegistryActor {
    type Msg = RegistryMessage;
    type State = RegistryState;
    type Arguments = (RegistryConfig, RegistryHooks);

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        (config, hooks): Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        info!(
            property_sync_interval_ms = config.property_sync_interval_ms,
            auto_import = hooks.importer.is_some() && config.auto_import_dir.is_some(),
            listeners = hooks.listeners.len(),
            "RegistryActor initialized"
        );
        Ok(RegistryState {
            config,
            importer: hooks.importer,
            listeners: hooks.listeners,
            databases: AHashMap::new(),
            in_use: AHashMap::new(),
            reference: None,
        })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            RegistryMessage::Open(request, reply) => {
                let res = state.open(request).await;
                let _ = reply.send(res);
            }
            RegistryMessage::Checkout(id, reply) => {
                let res = state.checkout(&id).await;
                if let Err(MessagingErr::SendErr(Ok(conn))) = reply.send(res) {
                    debug!(db_id = %id, connection_id = conn.id(), "checkout caller gone; releasing");
                    state.release(conn).await;
                }
            }
            RegistryMessage::Release(conn) => {
                state.release(conn).await;
            }
            RegistryMessage::Close(id, reply) => {
                state.close(&id).await;
                let _ = reply.send(());
            }
            RegistryMessage::CloseAll(reply) => {
                state.close_all().await;
                let _ = reply.send(());
            }
            RegistryMessage::GetProperty(id, name, reply) => {
                let res = state.get_property(&id, &name).await;
                let _ = reply.send(res);
            }
            RegistryMessage::SetProperty(id, name, value, reply) => {
                let res = state.set_property(&id, &name, &value).await;
                let _ = reply.send(res);
            }
            RegistryMessage::SyncProperties(id, reload, reply) => {
                let res = state.sync_properties(&id, reload).await;
                let _ = reply.send(res);
            }
            RegistryMessage::DeleteProperties(id, pattern, reply) => {
                let res = state.delete_properties(&id, &pattern).await;
                let _ = reply.send(res);
            }
            RegistryMessage::IsOpen(id, reply) => {
                let _ = reply.send(state.databases.contains_key(&id));
            }
            RegistryMessage::OpenIds(reply) => {
                let mut ids: Vec<DbId> = state.databases.keys().cloned().collect();
                ids.sort();
                let _ = reply.send(ids);
            }
            RegistryMessage::PoolStats(id, reply) => {
                let _ = reply.send(state.pool_stats(&id));
            }
            RegistryMessage::ReferenceData(reply) => {
                let _ = reply.send(state.reference.clone());
            }
        }
        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        state.close_all().await;
        info!("RegistryActor stopped");
        Ok(())
    }
}

impl RegistryState {
    fn database_mut(&mut self, id: &DbId) -> Result<&mut OpenDatabase, StudyDbError> {
        self.databases
            .get_mut(id)
            .ok_or_else(|| StudyDbError::NotOpen(id.clone()))
    }

    async fn open(&mut self, request: OpenRequest) -> Result<(), StudyDbError> {
        let OpenRequest {
            id,
            target,
            mut seed,
        } = request;

        if self.databases.contains_key(&id) {
            debug!(db_id = %id, db_target = %target, "database already open");
            seed.close().await;
            return Ok(());
        }

        if let Err(e) = seed.connect().await {
            warn!(db_id = %id, error = %e, "seed connection unusable; open refused");
            return Err(StudyDbError::Setup(format!(
                "Cannot connect to {target}: {e}"
            )));
        }

        if self.reference.is_none() {
            let loaded = match seed.session() {
                Ok(session) => ReferenceData::load(session).await,
                Err(e) => Err(e),
            };
            match loaded {
                Ok(data) => {
                    info!(
                        db_id = %id,
                        service_types = data.service_types.len(),
                        channel_bands = data.channel_bands.len(),
                        "reference data loaded"
                    );
                    self.reference = Some(Arc::new(data));
                }
                Err(e) => {
                    error!(db_id = %id, error = %e, "reference data load failed; open refused");
                    seed.close().await;
                    return Err(e);
                }
            }
        }

        seed.set_database_name(&target.database_name);
        info!(db_id = %id, db_target = %target, "database opened");
        self.databases.insert(
            id.clone(),
            OpenDatabase {
                target,
                pool: ConnectionPool::seeded(seed),
                properties: PropertyCache::default(),
            },
        );

        self.run_auto_import(&id).await;
        Ok(())
    }

    async fn checkout(&mut self, id: &DbId) -> Result<DbConnection, StudyDbError> {
        let db = self.database_mut(id)?;
        let mut conn = db.pool.take_or_clone();
        let database_name = db.target.database_name.clone();

        // Tracked before connecting so a failed reconnect still returns to the pool.
        self.in_use.insert(
            conn.id(),
            CheckedOut {
                db_id: id.clone(),
                revoked: conn.revocation(),
            },
        );

        if let Err(e) = conn.connect().await {
            warn!(db_id = %id, connection_id = conn.id(), error = %e, "checkout connect failed");
            self.release(conn).await;
            return Err(e);
        }

        conn.set_database_name(&database_name);
        debug!(db_id = %id, connection_id = conn.id(), "connection checked out");
        Ok(conn)
    }

    async fn release(&mut self, mut conn: DbConnection) {
        conn.close().await;

        let Some(entry) = self.in_use.remove(&conn.id()) else {
            debug!(connection_id = conn.id(), "released connection was not checked out");
            return;
        };
        match self.databases.get_mut(&entry.db_id) {
            Some(db) => {
                debug!(db_id = %entry.db_id, connection_id = conn.id(), "connection released");
                db.pool.put_back(conn);
            }
            None => {
                debug!(db_id = %entry.db_id, connection_id = conn.id(), "database closed; connection dropped");
            }
        }
    }

    async fn close(&mut self, id: &DbId) {
        if !self.databases.contains_key(id) {
            return;
        }

        if let Err(e) = self.sync_properties(id, false).await {
            warn!(db_id = %id, error = %e, "property flush on close failed");
        }

        let Some(mut db) = self.databases.remove(id) else {
            return;
        };

        let mut revoked = 0usize;
        self.in_use.retain(|_, entry| {
            if entry.db_id == *id {
                entry.revoked.store(true, Ordering::Release);
                revoked += 1;
                false
            } else {
                true
            }
        });

        let mut aborted = 0usize;
        for mut conn in db.pool.drain() {
            conn.abort();
            aborted += 1;
        }

        for listener in &self.listeners {
            listener.identity_closed(id);
        }

        info!(db_id = %id, revoked, aborted, "database closed");
    }

    async fn close_all(&mut self) {
        let mut ids: Vec<DbId> = self.databases.keys().cloned().collect();
        ids.sort();
        for id in ids {
            self.close(&id).await;
        }
    }

    async fn refresh_if_stale(&mut self, id: &DbId) -> Result<(), StudyDbError> {
        let interval = self.config.property_sync_interval();
        let stale = self
            .database_mut(id)?
            .properties
            .is_stale(Instant::now(), interval);
        if stale && let Err(e) = self.sync_properties(id, true).await {
            warn!(db_id = %id, error = %e, "property refresh failed; serving cached values");
        }
        Ok(())
    }

    async fn get_property(
        &mut self,
        id: &DbId,
        name: &str,
    ) -> Result<Option<String>, StudyDbError> {
        self.refresh_if_stale(id).await?;
        Ok(self
            .database_mut(id)?
            .properties
            .get(name)
            .map(str::to_string))
    }

    async fn set_property(
        &mut self,
        id: &DbId,
        name: &str,
        value: &str,
    ) -> Result<(), StudyDbError> {
        if self.database_mut(id)?.properties.set(name, value) {
            debug!(db_id = %id, property = name, "property changed");
        }
        self.refresh_if_stale(id).await
    }

    async fn sync_properties(&mut self, id: &DbId, reload: bool) -> Result<(), StudyDbError> {
        let now = Instant::now();
        let pending = {
            let db = self.database_mut(id)?;
            if !db.properties.has_dirty() && !reload {
                db.properties.mark_synced(now);
                return Ok(());
            }
            db.properties.dirty_entries()
        };

        let mut conn = match self.checkout(id).await {
            Ok(conn) => conn,
            Err(e) => {
                if let Some(db) = self.databases.get_mut(id) {
                    if reload {
                        db.properties.mark_stale();
                    } else {
                        db.properties.mark_synced(now);
                    }
                }
                return Err(e);
            }
        };

        let result = match conn.session() {
            Ok(session) => properties::write_and_reload(session, &pending, reload).await,
            Err(e) => Err(e),
        };
        self.release(conn).await;

        let db = self.database_mut(id)?;
        db.properties.mark_synced(now);
        match result {
            Ok(fresh) => {
                db.properties.clear_dirty();
                if let Some(values) = fresh {
                    db.properties.replace(values);
                }
                debug!(
                    db_id = %id,
                    written = pending.len(),
                    cached = db.properties.len(),
                    reload,
                    "properties synced"
                );
                Ok(())
            }
            Err(e) => {
                if e.is_retryable() {
                    warn!(db_id = %id, error = %e, "property sync failed; will retry later");
                } else {
                    error!(db_id = %id, error = %e, "property sync failed");
                }
                Err(e)
            }
        }
    }

    async fn delete_properties(&mut self, id: &DbId, pattern: &str) -> Result<u64, StudyDbError> {
        // Pending writes must land first or they would resurrect deleted rows.
        self.sync_properties(id, false).await?;

        let mut conn = self.checkout(id).await?;
        let result = match conn.session() {
            Ok(session) => properties::delete_like(session, pattern).await,
            Err(e) => Err(e),
        };
        self.release(conn).await;

        if let Some(db) = self.databases.get_mut(id) {
            db.properties.mark_stale();
        }
        match &result {
            Ok(deleted) => info!(db_id = %id, pattern, deleted, "properties deleted"),
            Err(e) => warn!(db_id = %id, pattern, error = %e, "property delete failed"),
        }
        result
    }

    async fn run_auto_import(&mut self, id: &DbId) {
        let (Some(importer), Some(dir)) =
            (self.importer.clone(), self.config.auto_import_dir.clone())
        else {
            return;
        };

        let mut conn = match self.checkout(id).await {
            Ok(conn) => conn,
            Err(e) => {
                warn!(db_id = %id, error = %e, "auto-import skipped; no connection");
                return;
            }
        };
        let result = match conn.session() {
            Ok(session) => auto_import::scan(session, &dir, importer.as_ref()).await,
            Err(e) => Err(e),
        };
        self.release(conn).await;

        match result {
            Ok(summary) => info!(
                db_id = %id,
                imported = summary.imported,
                skipped = summary.skipped,
                failed = summary.failed,
                "auto-import scan finished"
            ),
            Err(e) => error!(db_id = %id, error = %e, "auto-import scan aborted"),
        }
    }

    fn pool_stats(&self, id: &DbId) -> Option<PoolStats> {
        let db = self.databases.get(id)?;
        let in_use = self
            .in_use
            .values()
            .filter(|entry| entry.db_id == *id)
            .count();
        Some(PoolStats {
            idle: db.pool.idle_len(),
            in_use,
            created: db.pool.created(),
        })
    }
}
