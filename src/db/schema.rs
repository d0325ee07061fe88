//! SQL DDL for initializing a study database.
//! SQLite-first design; every statement is idempotent so updates can re-apply it.

/// Schema version this build knows how to open.
pub const DATABASE_VERSION: i64 = 1;

/// SQLite schema includes:
/// - `db_info` (single row: durable UUID, schema version, install/update lock flag)
/// - `property` (per-database key/value store)
/// - `import_index` (files already processed by the auto-import scan)
/// - `service_type`, `channel_band` (immutable reference tables)
pub const SQLITE_INIT: &str = r#"
-- ---------------------------------------------------------------------------
-- Identity and version (exactly one row, id = 1)
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS db_info (
    id INTEGER PRIMARY KEY NOT NULL CHECK (id = 1),
    uuid TEXT NOT NULL DEFAULT '',
    version INTEGER NOT NULL DEFAULT 0,
    locked INTEGER NOT NULL DEFAULT 0
);

-- ---------------------------------------------------------------------------
-- Per-database properties
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS property (
    name TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
);

-- ---------------------------------------------------------------------------
-- Auto-import index (one row per file name ever imported)
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS import_index (
    file_name TEXT PRIMARY KEY NOT NULL,
    mod_time INTEGER NOT NULL, -- ms since epoch
    length INTEGER NOT NULL
);

-- ---------------------------------------------------------------------------
-- Reference tables
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS service_type (
    service_type_key INTEGER PRIMARY KEY NOT NULL,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS channel_band (
    channel_band_key INTEGER PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    first_channel INTEGER NOT NULL,
    last_channel INTEGER NOT NULL
);
"#;

/// Reference rows written at install time.
pub const SQLITE_SEED: &str = r#"
INSERT OR IGNORE INTO service_type (service_type_key, name) VALUES
    (1, 'Digital TV full service'),
    (2, 'Digital TV Class A'),
    (3, 'Digital low power TV'),
    (21, 'FM full service'),
    (22, 'FM translator');

INSERT OR IGNORE INTO channel_band (channel_band_key, name, first_channel, last_channel) VALUES
    (1, 'VHF low', 2, 6),
    (2, 'VHF high', 7, 13),
    (3, 'UHF', 14, 36),
    (4, 'FM', 200, 300);
"#;

/// Tables removed by uninstall, in drop order.
pub const SQLITE_TABLES: &[&str] = &[
    "channel_band",
    "service_type",
    "import_index",
    "property",
    "db_info",
];
