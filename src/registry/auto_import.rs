//! Auto-import scan run each time a database is opened.
//!
//! Every regular file in the import directory is handed to the `AutoImporter`
//! unless `import_index` already records the same name, modification time and
//! length. Importer failures skip the file; index failures abort the scan.

use crate::db::models::ImportIndexRow;
use crate::error::StudyDbError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteConnection;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Imports one file into an open database. Supplied by the application.
#[async_trait]
pub trait AutoImporter: Send + Sync {
    async fn import_file(
        &self,
        session: &mut SqliteConnection,
        path: &Path,
    ) -> Result<(), StudyDbError>;
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanSummary {
    pub imported: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub(crate) async fn scan(
    session: &mut SqliteConnection,
    dir: &Path,
    importer: &dyn AutoImporter,
) -> Result<ScanSummary, StudyDbError> {
    let mut summary = ScanSummary::default();

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(dir = %dir.display(), "auto-import directory does not exist");
            return Ok(summary);
        }
        Err(e) => return Err(e.into()),
    };

    let mut files: Vec<(PathBuf, String, ImportIndexRow)> = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }
        let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
            warn!(path = %entry.path().display(), "skipping auto-import file with non UTF-8 name");
            continue;
        };
        let mod_time = DateTime::<Utc>::from(metadata.modified()?).timestamp_millis();
        let length = i64::try_from(metadata.len()).unwrap_or(i64::MAX);
        files.push((
            entry.path(),
            file_name.clone(),
            ImportIndexRow {
                file_name,
                mod_time,
                length,
            },
        ));
    }
    files.sort_by(|a, b| a.1.cmp(&b.1));

    for (path, file_name, current) in files {
        let indexed = sqlx::query_as::<_, ImportIndexRow>(
            "SELECT file_name, mod_time, length FROM import_index WHERE file_name = ?",
        )
        .bind(&file_name)
        .fetch_optional(&mut *session)
        .await?;

        if indexed
            .as_ref()
            .is_some_and(|row| row.mod_time == current.mod_time && row.length == current.length)
        {
            summary.skipped += 1;
            continue;
        }

        if let Err(e) = importer.import_file(&mut *session, &path).await {
            warn!(file = %path.display(), error = %e, "auto-import failed; file skipped");
            summary.failed += 1;
            continue;
        }

        sqlx::query(
            r#"
            INSERT INTO import_index (file_name, mod_time, length)
            VALUES (?, ?, ?)
            ON CONFLICT(file_name) DO UPDATE SET
                mod_time = excluded.mod_time,
                length = excluded.length
            "#,
        )
        .bind(&current.file_name)
        .bind(current.mod_time)
        .bind(current.length)
        .execute(&mut *session)
        .await?;

        info!(file = %path.display(), "auto-imported file");
        summary.imported += 1;
    }

    Ok(summary)
}
