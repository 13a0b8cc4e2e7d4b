//! Document store adapter.
//!
//! A thin capability surface over SQLite consumed by the registration
//! controller. No validation or ownership rules live here; the adapter only
//! knows how to persist, look up, search, and aggregate records.
//!
//! Each query shape the controller needs is an explicit method
//! (match-by-id, match-by-slug-or-id, match-all-excluding-archived,
//! term-aggregation) rather than an ad-hoc query document.

use std::collections::{BTreeMap, HashMap};

use sqlx::{Row, SqlitePool};

use crate::models::{ApiDocument, DocMeta, IndexRecord, RefreshStatus};

/// Page size ceiling applied server-side regardless of caller request.
pub const MAX_PAGE_SIZE: i64 = 100;

/// Exact-match buckets ignore values longer than this, the way the original
/// keyword projection did; longer values only surface through the analyzed
/// fallback.
const EXACT_MAX_LEN: usize = 256;

/// Result of a `put`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    Stored,
    /// `create_only` was set and the id already exists.
    Conflict,
}

/// Handle to the backing document store. Cheap to clone; constructed once
/// at startup around the shared pool.
#[derive(Clone)]
pub struct DocStore {
    pool: SqlitePool,
}

impl DocStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn exists(&self, id: &str) -> Result<bool, sqlx::Error> {
        let found: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM documents WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(found)
    }

    pub async fn get(&self, id: &str) -> Result<Option<ApiDocument>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_doc(&r)).transpose()
    }

    /// Resolve either an id or a slug to the same record space. The id
    /// match wins on ambiguity.
    pub async fn get_by_slug_or_id(&self, token: &str) -> Result<Option<ApiDocument>, sqlx::Error> {
        if let Some(doc) = self.get(token).await? {
            return Ok(Some(doc));
        }
        let row = sqlx::query("SELECT * FROM documents WHERE slug = ?")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| row_to_doc(&r)).transpose()
    }

    /// Owning document id for a slug, if any. Used for uniqueness checks.
    pub async fn slug_owner(&self, slug: &str) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar("SELECT id FROM documents WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await
    }

    /// Persist a whole record atomically (row + full-text entry commit
    /// together or not at all).
    ///
    /// With `create_only`, the insert is conditional: exactly one of two
    /// concurrent creates for the same id wins, the other sees
    /// [`PutOutcome::Conflict`].
    pub async fn put(
        &self,
        doc: &ApiDocument,
        create_only: bool,
    ) -> Result<PutOutcome, sqlx::Error> {
        let tags_json = serde_json::to_string(&doc.index.tags).unwrap_or_else(|_| "[]".into());
        let fields_json = serde_json::to_string(&doc.index.fields).unwrap_or_else(|_| "{}".into());

        let mut tx = self.pool.begin().await?;

        if create_only {
            let res = sqlx::query(
                r#"
                INSERT OR IGNORE INTO documents
                    (id, raw_content, title, version, contact_name, description,
                     tags_json, fields_json, owner_username, slug, source_url,
                     last_refreshed_at, status, archived)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&doc.id)
            .bind(&doc.raw_content)
            .bind(&doc.index.title)
            .bind(&doc.index.version)
            .bind(&doc.index.contact_name)
            .bind(&doc.index.description)
            .bind(&tags_json)
            .bind(&fields_json)
            .bind(&doc.meta.owner_username)
            .bind(&doc.meta.slug)
            .bind(&doc.meta.source_url)
            .bind(doc.meta.last_refreshed_at)
            .bind(doc.meta.status.as_str())
            .bind(doc.meta.archived as i64)
            .execute(&mut *tx)
            .await?;

            if res.rows_affected() == 0 {
                tx.rollback().await?;
                return Ok(PutOutcome::Conflict);
            }
        } else {
            // Upsert on the id only. OR REPLACE would resolve a slug
            // uniqueness violation by deleting the other document's row;
            // here it surfaces as a constraint error and rolls back.
            sqlx::query(
                r#"
                INSERT INTO documents
                    (id, raw_content, title, version, contact_name, description,
                     tags_json, fields_json, owner_username, slug, source_url,
                     last_refreshed_at, status, archived)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    raw_content = excluded.raw_content,
                    title = excluded.title,
                    version = excluded.version,
                    contact_name = excluded.contact_name,
                    description = excluded.description,
                    tags_json = excluded.tags_json,
                    fields_json = excluded.fields_json,
                    owner_username = excluded.owner_username,
                    slug = excluded.slug,
                    source_url = excluded.source_url,
                    last_refreshed_at = excluded.last_refreshed_at,
                    status = excluded.status,
                    archived = excluded.archived
                "#,
            )
            .bind(&doc.id)
            .bind(&doc.raw_content)
            .bind(&doc.index.title)
            .bind(&doc.index.version)
            .bind(&doc.index.contact_name)
            .bind(&doc.index.description)
            .bind(&tags_json)
            .bind(&fields_json)
            .bind(&doc.meta.owner_username)
            .bind(&doc.meta.slug)
            .bind(&doc.meta.source_url)
            .bind(doc.meta.last_refreshed_at)
            .bind(doc.meta.status.as_str())
            .bind(doc.meta.archived as i64)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("DELETE FROM documents_fts WHERE document_id = ?")
            .bind(&doc.id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO documents_fts (document_id, text) VALUES (?, ?)")
            .bind(&doc.id)
            .bind(&doc.index.search_text)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(PutOutcome::Stored)
    }

    /// Physically remove a record. Returns false when the id is unknown.
    /// SQLite commits are immediately visible to subsequent reads.
    pub async fn delete(&self, id: &str) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let res = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM documents_fts WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(res.rows_affected() > 0)
    }

    /// Full-text search over the analyzed projection. Page size is clamped
    /// to [`MAX_PAGE_SIZE`] regardless of caller request; ordering is
    /// deterministic (rank, then id).
    pub async fn search(
        &self,
        query: &str,
        page_size: i64,
        offset: i64,
        exclude_archived: bool,
    ) -> Result<Vec<ApiDocument>, sqlx::Error> {
        let limit = page_size.clamp(1, MAX_PAGE_SIZE);
        let archived_cap = if exclude_archived { 0_i64 } else { 1_i64 };
        let rows = sqlx::query(
            r#"
            SELECT d.* FROM documents_fts
            JOIN documents d ON d.id = documents_fts.document_id
            WHERE documents_fts MATCH ? AND d.archived <= ?
            ORDER BY rank, d.id
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(query)
        .bind(archived_cap)
        .bind(limit)
        .bind(offset.max(0))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_doc).collect()
    }

    /// List a page of all documents, clamped like `search`.
    pub async fn list(
        &self,
        page_size: i64,
        offset: i64,
        exclude_archived: bool,
    ) -> Result<Vec<ApiDocument>, sqlx::Error> {
        let limit = page_size.clamp(1, MAX_PAGE_SIZE);
        let archived_cap = if exclude_archived { 0_i64 } else { 1_i64 };
        let rows = sqlx::query(
            "SELECT * FROM documents WHERE archived <= ? ORDER BY id LIMIT ? OFFSET ?",
        )
        .bind(archived_cap)
        .bind(limit)
        .bind(offset.max(0))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_doc).collect()
    }

    /// One page of the restartable export scan. Pass the last id of the
    /// previous page as `cursor` to resume; no lock is held between pages.
    pub async fn list_page(
        &self,
        cursor: Option<&str>,
        batch: i64,
        exclude_archived: bool,
    ) -> Result<Vec<ApiDocument>, sqlx::Error> {
        let archived_cap = if exclude_archived { 0_i64 } else { 1_i64 };
        let rows = sqlx::query(
            "SELECT * FROM documents WHERE id > ? AND archived <= ? ORDER BY id LIMIT ?",
        )
        .bind(cursor.unwrap_or(""))
        .bind(archived_cap)
        .bind(batch.max(1))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_doc).collect()
    }

    pub async fn count(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await
    }

    /// Distinct value -> count over the exact-match projection of `field`.
    ///
    /// When the exact projection yields no buckets (the field was only ever
    /// indexed analyzed, e.g. all its values exceed the keyword length cap),
    /// fall back to the tokenized projection of the same field.
    pub async fn aggregate(
        &self,
        field: &str,
        size: usize,
    ) -> Result<BTreeMap<String, u64>, sqlx::Error> {
        let rows = sqlx::query("SELECT fields_json FROM documents WHERE archived = 0")
            .fetch_all(&self.pool)
            .await?;

        let mut field_values: Vec<String> = Vec::new();
        for row in &rows {
            let fields_json: String = row.get("fields_json");
            let fields: BTreeMap<String, Vec<String>> =
                serde_json::from_str(&fields_json).unwrap_or_default();
            if let Some(values) = fields.get(field) {
                field_values.extend(values.iter().cloned());
            }
        }

        let mut counts: HashMap<String, u64> = HashMap::new();
        for v in field_values.iter().filter(|v| v.len() <= EXACT_MAX_LEN) {
            *counts.entry(v.clone()).or_insert(0) += 1;
        }

        if counts.is_empty() {
            // Analyzed fallback: lowercase terms of the same field.
            for v in &field_values {
                for token in v
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|t| !t.is_empty())
                {
                    *counts.entry(token.to_lowercase()).or_insert(0) += 1;
                }
            }
        }

        let mut buckets: Vec<(String, u64)> = counts.into_iter().collect();
        buckets.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        buckets.truncate(size);
        Ok(buckets.into_iter().collect())
    }
}

fn row_to_doc(row: &sqlx::sqlite::SqliteRow) -> Result<ApiDocument, sqlx::Error> {
    let tags_json: String = row.get("tags_json");
    let fields_json: String = row.get("fields_json");
    let status: String = row.get("status");
    let archived: i64 = row.get("archived");
    let slug: Option<String> = row.get("slug");

    Ok(ApiDocument {
        id: row.get("id"),
        raw_content: row.get("raw_content"),
        index: IndexRecord {
            title: row.get("title"),
            version: row.get("version"),
            contact_name: row.get("contact_name"),
            description: row.get("description"),
            tags: serde_json::from_str(&tags_json).unwrap_or_default(),
            fields: serde_json::from_str(&fields_json).unwrap_or_default(),
            // Not persisted as a column; reconstructed on demand when the
            // record is re-put.
            search_text: String::new(),
        },
        meta: DocMeta {
            owner_username: row.get("owner_username"),
            slug: slug.filter(|s| !s.is_empty()),
            source_url: row.get("source_url"),
            last_refreshed_at: row.get("last_refreshed_at"),
            status: RefreshStatus::parse(&status).unwrap_or(RefreshStatus::Registered),
            archived: archived != 0,
        },
    })
}
