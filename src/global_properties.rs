//! Process-global key/value store, independent of any database.
//!
//! Holds the identity cache (`db_uuid_*` keys) and serves property calls made
//! without a database id. Backed by a JSON file when a path is configured;
//! writes go through to the file on a best-effort basis.

use crate::error::StudyDbError;
use ahash::AHashMap;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::RwLock,
};
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct GlobalProperties {
    path: Option<PathBuf>,
    values: RwLock<AHashMap<String, String>>,
}

impl GlobalProperties {
    /// An in-memory store, never persisted.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Loads the store from `path`; a missing file starts empty.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StudyDbError> {
        let path = path.as_ref().to_path_buf();
        let values = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str::<BTreeMap<String, String>>(&text)?
                .into_iter()
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => AHashMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), count = values.len(), "global properties loaded");
        Ok(Self {
            path: Some(path),
            values: RwLock::new(values),
        })
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.read().get(key).cloned()
    }

    pub fn set(&self, key: &str, value: &str) {
        let changed = {
            let mut values = self.write();
            if values.get(key).is_some_and(|v| v == value) {
                false
            } else {
                values.insert(key.to_string(), value.to_string());
                true
            }
        };
        if changed {
            self.persist();
        }
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        let removed = self.write().remove(key);
        if removed.is_some() {
            self.persist();
        }
        removed
    }

    /// Writes the store to its file, if it has one.
    pub fn save(&self) -> Result<(), StudyDbError> {
        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };
        // Sorted so the file diffs cleanly.
        let snapshot: BTreeMap<String, String> = self
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let text = serde_json::to_string_pretty(&snapshot)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    fn persist(&self) {
        if let Err(e) = self.save() {
            warn!(error = %e, "failed to persist global properties");
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, AHashMap<String, String>> {
        self.values.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, AHashMap<String, String>> {
        self.values
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_path(tag: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before UNIX_EPOCH")
            .as_nanos();
        std::env::temp_dir().join(format!(
            "studydb-global-{tag}-{}-{nanos}.json",
            std::process::id()
        ))
    }

    #[test]
    fn in_memory_round_trip() {
        let props = GlobalProperties::in_memory();
        assert_eq!(props.get("missing"), None);
        props.set("k", "v");
        assert_eq!(props.get("k").as_deref(), Some("v"));
        assert_eq!(props.remove("k").as_deref(), Some("v"));
        assert_eq!(props.get("k"), None);
    }

    #[test]
    fn values_survive_reload_from_file() {
        let path = temp_path("reload");
        {
            let props = GlobalProperties::load(&path).expect("load empty");
            props.set("db_uuid_host", "1234");
        }
        let props = GlobalProperties::load(&path).expect("reload");
        assert_eq!(props.get("db_uuid_host").as_deref(), Some("1234"));
        let _ = std::fs::remove_file(&path);
    }
}
