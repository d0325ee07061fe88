use crate::db::models::{ChannelBand, ServiceType};
use crate::error::StudyDbError;
use serde::Serialize;
use sqlx::sqlite::SqliteConnection;

/// Immutable reference tables, loaded once per process from the first database opened.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReferenceData {
    pub service_types: Vec<ServiceType>,
    pub channel_bands: Vec<ChannelBand>,
}

impl ReferenceData {
    pub(crate) async fn load(session: &mut SqliteConnection) -> Result<Self, StudyDbError> {
        let service_types = sqlx::query_as::<_, ServiceType>(
            "SELECT service_type_key, name FROM service_type ORDER BY service_type_key",
        )
        .fetch_all(&mut *session)
        .await?;

        let channel_bands = sqlx::query_as::<_, ChannelBand>(
            r#"
            SELECT channel_band_key, name, first_channel, last_channel
            FROM channel_band
            ORDER BY channel_band_key
            "#,
        )
        .fetch_all(&mut *session)
        .await?;

        Ok(Self {
            service_types,
            channel_bands,
        })
    }

    pub fn service_type(&self, key: i64) -> Option<&ServiceType> {
        self.service_types
            .iter()
            .find(|service| service.service_type_key == key)
    }

    /// The band containing `channel`, if any.
    pub fn band_for_channel(&self, channel: i64) -> Option<&ChannelBand> {
        self.channel_bands
            .iter()
            .find(|band| (band.first_channel..=band.last_channel).contains(&channel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ReferenceData {
        ReferenceData {
            service_types: vec![ServiceType {
                service_type_key: 21,
                name: "FM full service".to_string(),
            }],
            channel_bands: vec![
                ChannelBand {
                    channel_band_key: 2,
                    name: "VHF high".to_string(),
                    first_channel: 7,
                    last_channel: 13,
                },
                ChannelBand {
                    channel_band_key: 3,
                    name: "UHF".to_string(),
                    first_channel: 14,
                    last_channel: 36,
                },
            ],
        }
    }

    #[test]
    fn band_lookup_is_inclusive() {
        let data = sample();
        assert_eq!(data.band_for_channel(13).map(|b| b.name.as_str()), Some("VHF high"));
        assert_eq!(data.band_for_channel(14).map(|b| b.name.as_str()), Some("UHF"));
        assert!(data.band_for_channel(50).is_none());
    }

    #[test]
    fn service_lookup_by_key() {
        let data = sample();
        assert!(data.service_type(21).is_some());
        assert!(data.service_type(1).is_none());
    }
}
