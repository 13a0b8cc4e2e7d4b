//! Backup and restore.
//!
//! Exports every record (including archived ones) to a JSON file over the
//! restartable keyset scan, and restores a backup into an empty store.
//! These run off the request-serving path.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::models::{ApiDocument, DocMeta};
use crate::store::DocStore;

const EXPORT_BATCH: i64 = 100;

/// One record in a backup file. Raw bytes travel base-16 encoded so the
/// file stays valid JSON.
#[derive(Debug, Serialize, Deserialize)]
struct BackupRecord {
    id: String,
    raw_content_hex: String,
    meta: DocMeta,
}

/// Write all documents to `out` (default: a datestamped file in the current
/// directory). Returns the path written and the record count.
pub async fn backup_all(store: &DocStore, out: Option<PathBuf>) -> Result<(PathBuf, usize)> {
    let out = out.unwrap_or_else(|| {
        PathBuf::from(format!(
            "spec_registry_backup_{}.json",
            Utc::now().format("%Y%m%d")
        ))
    });

    let mut records: Vec<BackupRecord> = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = store
            .list_page(cursor.as_deref(), EXPORT_BATCH, false)
            .await?;
        if page.is_empty() {
            break;
        }
        cursor = page.last().map(|d| d.id.clone());
        for doc in page {
            records.push(BackupRecord {
                id: doc.id,
                raw_content_hex: hex::encode(&doc.raw_content),
                meta: doc.meta,
            });
        }
    }

    let file = std::fs::File::create(&out)
        .with_context(|| format!("Failed to create backup file: {}", out.display()))?;
    serde_json::to_writer_pretty(file, &records)?;
    Ok((out, records.len()))
}

/// Restore a backup file. Refuses to touch a non-empty store; restore
/// targets a fresh database only.
pub async fn restore_all(store: &DocStore, backup_file: &Path) -> Result<usize> {
    if store.count().await? > 0 {
        bail!("store is not empty; restore requires a fresh database");
    }

    let content = std::fs::read_to_string(backup_file)
        .with_context(|| format!("Failed to read backup file: {}", backup_file.display()))?;
    let records: Vec<BackupRecord> =
        serde_json::from_str(&content).with_context(|| "Failed to parse backup file")?;

    let mut restored = 0usize;
    for record in records {
        let raw_content = hex::decode(&record.raw_content_hex)
            .with_context(|| format!("Corrupt raw content for '{}'", record.id))?;
        let index = crate::metadata::storage_record(&raw_content);
        let doc = ApiDocument {
            id: record.id,
            raw_content,
            index,
            meta: record.meta,
        };
        store.put(&doc, true).await?;
        restored += 1;
    }
    Ok(restored)
}
