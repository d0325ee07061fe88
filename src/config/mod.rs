mod admission;
mod basic;
mod database;
mod registry;

pub use admission::AdmissionConfig;
pub use basic::BasicConfig;
pub use database::{DEFAULT_DATABASE_NAME, DatabaseConfig};
pub use registry::RegistryConfig;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, sync::LazyLock};

/// Application configuration managed by Figment.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// Process-level settings (see `basic` table in studydb.toml).
    #[serde(default)]
    pub basic: BasicConfig,

    /// Default connection target (see `database` table in studydb.toml).
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Connection registry and property store settings.
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Admission gate limits for heavyweight tasks.
    #[serde(default)]
    pub admission: AdmissionConfig,
}

const DEFAULT_CONFIG_FILE: &str = "studydb.toml";
const ENV_PREFIX: &str = "STUDYDB_";

impl Config {
    /// Builds a Figment that merges defaults, an optional TOML file and `STUDYDB_*` env vars.
    ///
    /// Nested keys use a double underscore, e.g. `STUDYDB_REGISTRY__AUTO_IMPORT_DIR`.
    pub fn figment() -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));
        if PathBuf::from(DEFAULT_CONFIG_FILE).is_file() {
            figment = figment.merge(Toml::file(DEFAULT_CONFIG_FILE));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Loads configuration by merging defaults, `studydb.toml` if present, and the environment.
    pub fn from_optional_toml() -> Self {
        Self::figment().extract().unwrap_or_else(|err| {
            panic!("failed to extract configuration (defaults + optional studydb.toml): {err}")
        })
    }
}

/// Global, lazily-initialized configuration instance.
pub static CONFIG: LazyLock<Config> = LazyLock::new(Config::from_optional_toml);

#[cfg(test)]
mod tests {
    use super::*;
    use figment::providers::Toml;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.basic.loglevel, "info");
        assert_eq!(cfg.database.database_name, "studydb");
        assert_eq!(cfg.registry.property_sync_interval_ms, 600_000);
        assert!((cfg.admission.max_load - 1.001).abs() < f64::EPSILON);
        assert_eq!(cfg.admission.max_wait_ms, 2000);
    }

    #[test]
    fn toml_overrides_nested_tables() {
        let cfg: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::string(
                r#"
                [database]
                hostname = "/srv/studies"

                [registry]
                property_sync_interval_ms = 1000
                auto_import_dir = "/srv/import"
                "#,
            ))
            .extract()
            .expect("config extracts");

        assert_eq!(cfg.database.hostname, "/srv/studies");
        assert_eq!(cfg.database.database_name, "studydb");
        assert_eq!(cfg.registry.property_sync_interval_ms, 1000);
        assert_eq!(
            cfg.registry.auto_import_dir,
            Some(PathBuf::from("/srv/import"))
        );
        assert_eq!(cfg.admission.poll_interval_ms, 250);
    }
}
