//! Database module: connection handles, row models and schema.
//!
//! Layout:
//! - `connection.rs`: reusable connection handle checked out from the registry
//! - `models.rs`: Rust structs mirroring DB rows
//! - `schema.rs`: SQL DDL for initializing a study database (SQLite-first)

pub mod connection;
pub mod models;
pub mod schema;

pub use connection::{ConnectionId, DbConnection};
pub use models::{ChannelBand, DbInfoRow, ImportIndexRow, PropertyRow, ServiceType};
pub use schema::{DATABASE_VERSION, SQLITE_INIT};
