//! Core data models used throughout Spec Registry.
//!
//! These types represent the registered documents, their ownership metadata,
//! and the validation results that flow through the registration pipeline.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Outcome classification of the most recent refresh attempt.
///
/// Stored on the document so staleness is observable even when the source
/// URL has been unreachable for a long time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshStatus {
    /// Registered but never refreshed.
    Registered,
    /// Last refresh fetched and validated a fresh copy.
    Ok,
    /// Last fetch succeeded but the body failed validation; prior content kept.
    InvalidUpstream,
    /// Source URL returned 404.
    NotFound,
    /// Fetch timed out.
    Timeout,
    /// Fetch failed at the connection level.
    ConnectionError,
    /// Source URL returned a non-404 4xx/5xx.
    UpstreamError,
}

impl RefreshStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshStatus::Registered => "registered",
            RefreshStatus::Ok => "ok",
            RefreshStatus::InvalidUpstream => "invalid_upstream",
            RefreshStatus::NotFound => "not_found",
            RefreshStatus::Timeout => "timeout",
            RefreshStatus::ConnectionError => "connection_error",
            RefreshStatus::UpstreamError => "upstream_error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "registered" => Some(RefreshStatus::Registered),
            "ok" => Some(RefreshStatus::Ok),
            "invalid_upstream" => Some(RefreshStatus::InvalidUpstream),
            "not_found" => Some(RefreshStatus::NotFound),
            "timeout" => Some(RefreshStatus::Timeout),
            "connection_error" => Some(RefreshStatus::ConnectionError),
            "upstream_error" => Some(RefreshStatus::UpstreamError),
            _ => None,
        }
    }
}

/// Ownership and lifecycle metadata, nested under the record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocMeta {
    /// Authenticated caller who registered the document.
    pub owner_username: String,
    /// Optional human-readable alias, globally unique when present.
    pub slug: Option<String>,
    /// Origin location used for refresh.
    pub source_url: String,
    /// Unix seconds of the last refresh attempt, successful or not.
    pub last_refreshed_at: Option<i64>,
    /// Last refresh outcome.
    pub status: RefreshStatus,
    /// Archived documents are excluded from default listing and search.
    pub archived: bool,
}

/// A registered API description document.
#[derive(Debug, Clone)]
pub struct ApiDocument {
    /// Deterministic 128-bit hex digest of `(title, version, contact_name)`.
    pub id: String,
    /// Original document bytes, stored verbatim.
    pub raw_content: Vec<u8>,
    /// Indexable projection derived from the raw document.
    pub index: IndexRecord,
    /// Ownership and lifecycle metadata.
    pub meta: DocMeta,
}

/// The indexable projection of a document.
///
/// Large nested schema/example bodies are excluded from `search_text` but
/// remain retrievable through `ApiDocument::raw_content`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexRecord {
    pub title: String,
    pub version: String,
    pub contact_name: String,
    pub description: String,
    pub tags: Vec<String>,
    /// Flattened field-path -> values map, the exact-match aggregation
    /// projection (the `.raw` side of the original dual mapping).
    pub fields: BTreeMap<String, Vec<String>>,
    /// Concatenated analyzed text fed to the full-text index.
    pub search_text: String,
}

/// A single structured schema violation.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaViolation {
    /// Human-readable reason.
    pub reason: String,
    /// JSON pointer into the offending document location.
    pub path: String,
    /// JSON pointer into the schema rule that was violated.
    pub schema_path: String,
}

/// Result of validating a raw document. Produced fresh on every call,
/// never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<SchemaViolation>,
}

impl ValidationReport {
    pub fn ok() -> Self {
        ValidationReport {
            valid: true,
            errors: Vec::new(),
        }
    }

    pub fn invalid(errors: Vec<SchemaViolation>) -> Self {
        ValidationReport {
            valid: false,
            errors,
        }
    }
}
