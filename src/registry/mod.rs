//! Process-wide registry of open databases.
//!
//! One `RegistryActor` owns every pool, property cache and checkout record.
//! Its mailbox serializes all access, including the I/O done while handling a
//! message, so callers never observe half-updated bookkeeping.

mod actor;
pub mod auto_import;
pub mod pool;
pub mod properties;
pub mod reference;

pub use actor::{OpenRequest, RegistryMessage};
pub use auto_import::{AutoImporter, ScanSummary};
pub use pool::PoolStats;
pub use reference::ReferenceData;

use crate::config::RegistryConfig;
use crate::db::connection::DbConnection;
use crate::error::StudyDbError;
use crate::global_properties::GlobalProperties;
use crate::setup::{DbId, DbSetup, DbTarget};
use actor::RegistryActor;
use ractor::{Actor, ActorRef};
use std::sync::Arc;
use tracing::warn;

/// Something that keys its own state by database identity and must drop it on close.
pub trait IdentityListener: Send + Sync {
    fn identity_closed(&self, id: &DbId);
}

/// Collaborators plugged into a registry at spawn time.
#[derive(Clone, Default)]
pub struct RegistryHooks {
    importer: Option<Arc<dyn AutoImporter>>,
    listeners: Vec<Arc<dyn IdentityListener>>,
}

impl RegistryHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_importer(mut self, importer: Arc<dyn AutoImporter>) -> Self {
        self.importer = Some(importer);
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn IdentityListener>) -> Self {
        self.listeners.push(listener);
        self
    }
}

#[derive(Clone)]
pub struct RegistryHandle {
    actor: ActorRef<RegistryMessage>,
    globals: Arc<GlobalProperties>,
}

impl RegistryHandle {
    pub fn globals(&self) -> &Arc<GlobalProperties> {
        &self.globals
    }

    /// Registers a probed database and takes over its seed connection.
    ///
    /// Opening an id that is already open succeeds without changing anything.
    pub async fn open(&self, setup: &mut DbSetup) -> Result<(), StudyDbError> {
        if !setup.can_open() {
            return Err(StudyDbError::Setup(setup.status_text().to_string()));
        }
        let Some(id) = setup.id().cloned() else {
            return Err(StudyDbError::Setup(format!(
                "{} has no identity",
                setup.target()
            )));
        };
        let Some(seed) = setup.take_seed() else {
            return Err(StudyDbError::Setup(format!(
                "{} has no live connection",
                setup.target()
            )));
        };

        let request = OpenRequest {
            id,
            target: setup.target().clone(),
            seed,
        };
        ractor::call!(self.actor, RegistryMessage::Open, request)
            .map_err(|e| StudyDbError::RactorError(format!("RegistryActor Open RPC failed: {e}")))?
    }

    /// A connected handle for `id`. Hand it back with [`RegistryHandle::release`].
    pub async fn checkout(&self, id: &DbId) -> Result<DbConnection, StudyDbError> {
        ractor::call!(self.actor, RegistryMessage::Checkout, id.clone()).map_err(|e| {
            StudyDbError::RactorError(format!("RegistryActor Checkout RPC failed: {e}"))
        })?
    }

    pub fn release(&self, conn: DbConnection) {
        if let Err(e) = ractor::cast!(self.actor, RegistryMessage::Release(conn)) {
            warn!(error = %e, "RegistryActor Release cast failed; connection dropped");
        }
    }

    pub async fn close(&self, id: &DbId) -> Result<(), StudyDbError> {
        ractor::call!(self.actor, RegistryMessage::Close, id.clone())
            .map_err(|e| StudyDbError::RactorError(format!("RegistryActor Close RPC failed: {e}")))
    }

    pub async fn close_all(&self) -> Result<(), StudyDbError> {
        ractor::call!(self.actor, RegistryMessage::CloseAll).map_err(|e| {
            StudyDbError::RactorError(format!("RegistryActor CloseAll RPC failed: {e}"))
        })
    }

    /// Reads a property. `None` for `id` reads the global store.
    pub async fn get_property(
        &self,
        id: Option<&DbId>,
        name: &str,
    ) -> Result<Option<String>, StudyDbError> {
        let Some(id) = id else {
            return Ok(self.globals.get(name));
        };
        ractor::call!(
            self.actor,
            RegistryMessage::GetProperty,
            id.clone(),
            name.to_string()
        )
        .map_err(|e| StudyDbError::RactorError(format!("RegistryActor GetProperty RPC failed: {e}")))?
    }

    /// Writes a property. `None` for `id` writes the global store.
    pub async fn set_property(
        &self,
        id: Option<&DbId>,
        name: &str,
        value: &str,
    ) -> Result<(), StudyDbError> {
        let Some(id) = id else {
            self.globals.set(name, value);
            return Ok(());
        };
        ractor::call!(
            self.actor,
            RegistryMessage::SetProperty,
            id.clone(),
            name.to_string(),
            value.to_string()
        )
        .map_err(|e| StudyDbError::RactorError(format!("RegistryActor SetProperty RPC failed: {e}")))?
    }

    pub async fn sync_properties(&self, id: &DbId, reload: bool) -> Result<(), StudyDbError> {
        ractor::call!(self.actor, RegistryMessage::SyncProperties, id.clone(), reload).map_err(
            |e| StudyDbError::RactorError(format!("RegistryActor SyncProperties RPC failed: {e}")),
        )?
    }

    /// Deletes properties whose names match the SQL `LIKE` pattern.
    pub async fn delete_properties(
        &self,
        id: Option<&DbId>,
        pattern: &str,
    ) -> Result<u64, StudyDbError> {
        let Some(id) = id else {
            return Err(StudyDbError::GlobalPatternDelete);
        };
        ractor::call!(
            self.actor,
            RegistryMessage::DeleteProperties,
            id.clone(),
            pattern.to_string()
        )
        .map_err(|e| {
            StudyDbError::RactorError(format!("RegistryActor DeleteProperties RPC failed: {e}"))
        })?
    }

    pub async fn is_open(&self, id: &DbId) -> Result<bool, StudyDbError> {
        ractor::call!(self.actor, RegistryMessage::IsOpen, id.clone())
            .map_err(|e| StudyDbError::RactorError(format!("RegistryActor IsOpen RPC failed: {e}")))
    }

    pub async fn open_ids(&self) -> Result<Vec<DbId>, StudyDbError> {
        ractor::call!(self.actor, RegistryMessage::OpenIds)
            .map_err(|e| StudyDbError::RactorError(format!("RegistryActor OpenIds RPC failed: {e}")))
    }

    pub async fn pool_stats(&self, id: &DbId) -> Result<Option<PoolStats>, StudyDbError> {
        ractor::call!(self.actor, RegistryMessage::PoolStats, id.clone()).map_err(|e| {
            StudyDbError::RactorError(format!("RegistryActor PoolStats RPC failed: {e}"))
        })
    }

    /// Shared reference tables, once any database has been opened.
    pub async fn reference_data(&self) -> Result<Option<Arc<ReferenceData>>, StudyDbError> {
        ractor::call!(self.actor, RegistryMessage::ReferenceData).map_err(|e| {
            StudyDbError::RactorError(format!("RegistryActor ReferenceData RPC failed: {e}"))
        })
    }

    /// The open id for `target` according to the identity cache, without probing.
    pub async fn resolve_open(&self, target: &DbTarget) -> Result<Option<DbId>, StudyDbError> {
        let Some(id) = DbSetup::cached_id(target, &self.globals) else {
            return Ok(None);
        };
        Ok(self.is_open(&id).await?.then_some(id))
    }
}

/// Spawns a fresh registry actor.
pub async fn spawn(
    config: RegistryConfig,
    globals: Arc<GlobalProperties>,
    hooks: RegistryHooks,
) -> Result<RegistryHandle, StudyDbError> {
    let (actor, _jh) = Actor::spawn(None, RegistryActor, (config, hooks))
        .await
        .map_err(|e| StudyDbError::RactorError(format!("failed to spawn RegistryActor: {e}")))?;
    Ok(RegistryHandle { actor, globals })
}
