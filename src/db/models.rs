use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct DbInfoRow {
    pub uuid: String,
    pub version: i64,
    pub locked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct PropertyRow {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct ImportIndexRow {
    pub file_name: String,
    /// Modification time in milliseconds since the Unix epoch.
    pub mod_time: i64,
    pub length: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct ServiceType {
    pub service_type_key: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct ChannelBand {
    pub channel_band_key: i64,
    pub name: String,
    pub first_channel: i64,
    pub last_channel: i64,
}
