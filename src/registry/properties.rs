//! Per-database property cache and its backing `property` table.

use crate::db::models::PropertyRow;
use crate::error::StudyDbError;
use ahash::{AHashMap, AHashSet};
use sqlx::sqlite::SqliteConnection;
use std::time::{Duration, Instant};

/// In-memory view of one database's `property` table (no IO, no locks).
///
/// Writes land here first and stay dirty until the registry flushes them.
#[derive(Debug, Default)]
pub struct PropertyCache {
    values: AHashMap<String, String>,
    dirty: AHashSet<String>,
    last_sync: Option<Instant>,
}

impl PropertyCache {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Stores `value`; returns whether anything changed.
    pub fn set(&mut self, name: &str, value: &str) -> bool {
        if self.values.get(name).is_some_and(|v| v == value) {
            return false;
        }
        self.values.insert(name.to_string(), value.to_string());
        self.dirty.insert(name.to_string());
        true
    }

    /// Never synced, or last synced longer than `interval` ago.
    pub fn is_stale(&self, now: Instant, interval: Duration) -> bool {
        self.last_sync
            .is_none_or(|at| now.saturating_duration_since(at) > interval)
    }

    pub fn has_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Dirty entries as `(name, value)` pairs, ready to write.
    pub fn dirty_entries(&self) -> Vec<(String, String)> {
        self.dirty
            .iter()
            .filter_map(|name| {
                self.values
                    .get(name)
                    .map(|value| (name.clone(), value.clone()))
            })
            .collect()
    }

    pub fn clear_dirty(&mut self) {
        self.dirty.clear();
    }

    pub fn replace(&mut self, values: AHashMap<String, String>) {
        self.values = values;
    }

    pub fn mark_synced(&mut self, now: Instant) {
        self.last_sync = Some(now);
    }

    /// Forces the next access to sync.
    pub fn mark_stale(&mut self) {
        self.last_sync = None;
    }

    pub(crate) fn len(&self) -> usize {
        self.values.len()
    }
}

/// Writes `pending` as upserts under an exclusive lock and optionally reloads the table.
///
/// The returned map is only produced when every statement succeeded.
pub(crate) async fn write_and_reload(
    session: &mut SqliteConnection,
    pending: &[(String, String)],
    reload: bool,
) -> Result<Option<AHashMap<String, String>>, StudyDbError> {
    sqlx::query("BEGIN IMMEDIATE")
        .execute(&mut *session)
        .await?;

    match write_locked(session, pending, reload).await {
        Ok(fresh) => {
            sqlx::query("COMMIT").execute(&mut *session).await?;
            Ok(fresh)
        }
        Err(e) => {
            // Rollback failure leaves nothing more to do; the original error is what matters.
            let _ = sqlx::query("ROLLBACK").execute(&mut *session).await;
            Err(e)
        }
    }
}

async fn write_locked(
    session: &mut SqliteConnection,
    pending: &[(String, String)],
    reload: bool,
) -> Result<Option<AHashMap<String, String>>, StudyDbError> {
    for (name, value) in pending {
        let updated = sqlx::query("UPDATE property SET value = ? WHERE name = ?")
            .bind(value)
            .bind(name)
            .execute(&mut *session)
            .await?
            .rows_affected();
        if updated == 0 {
            sqlx::query("INSERT INTO property (name, value) VALUES (?, ?)")
                .bind(name)
                .bind(value)
                .execute(&mut *session)
                .await?;
        }
    }

    if !reload {
        return Ok(None);
    }

    let rows = sqlx::query_as::<_, PropertyRow>("SELECT name, value FROM property")
        .fetch_all(&mut *session)
        .await?;
    Ok(Some(
        rows.into_iter().map(|row| (row.name, row.value)).collect(),
    ))
}

/// Deletes every property whose name matches the SQL `LIKE` pattern.
pub(crate) async fn delete_like(
    session: &mut SqliteConnection,
    pattern: &str,
) -> Result<u64, StudyDbError> {
    let deleted = sqlx::query("DELETE FROM property WHERE name LIKE ?")
        .bind(pattern)
        .execute(&mut *session)
        .await?
        .rows_affected();
    Ok(deleted)
}
