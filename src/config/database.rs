use serde::{Deserialize, Serialize};

pub const DEFAULT_DATABASE_NAME: &str = "studydb";

/// Default connection target.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Data directory hosting the database files.
    /// TOML: `database.hostname`. Default: `.`.
    #[serde(default = "default_hostname")]
    pub hostname: String,

    /// Database name; the file is `<hostname>/<database_name>.sqlite`.
    /// Identity-cache keys omit the name only when it is the built-in
    /// `DEFAULT_DATABASE_NAME`, whatever this field is set to.
    /// TOML: `database.database_name`. Default: `studydb`.
    #[serde(default = "default_database_name")]
    pub database_name: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
            database_name: default_database_name(),
        }
    }
}

fn default_hostname() -> String {
    ".".to_string()
}

fn default_database_name() -> String {
    DEFAULT_DATABASE_NAME.to_string()
}
