//! Refresh reconciliation.
//!
//! Re-fetches a document's source URL, classifies the outcome, and updates
//! the stored copy. Network failures are data here: they become a stored
//! status, never an error surfaced to the caller. Status and timestamp move
//! forward on every attempt so staleness stays observable, which also makes
//! refresh idempotent against an unreachable URL.

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use crate::fetch::{FetchFailure, Fetcher};
use crate::metadata;
use crate::models::RefreshStatus;
use crate::registry::RegistryError;
use crate::store::DocStore;

/// Outcome of one refresh attempt.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub status: RefreshStatus,
    /// True only when fresh content was fetched, validated, and stored.
    pub success: bool,
}

pub async fn refresh_document(
    store: &DocStore,
    fetcher: &dyn Fetcher,
    id: &str,
) -> Result<RefreshReport, RegistryError> {
    let mut doc = store
        .get(id)
        .await?
        .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;

    let url = doc.meta.source_url.clone();
    debug!(id = %id, url = %url, "refreshing document");

    let status = match fetcher.fetch(&url).await {
        Ok(outcome) if outcome.is_success() => {
            let report = metadata::validate(&outcome.body);
            if report.valid {
                doc.raw_content = outcome.body;
                RefreshStatus::Ok
            } else {
                // Keep the prior content; only record that upstream went bad.
                RefreshStatus::InvalidUpstream
            }
        }
        Ok(outcome) if outcome.status == 404 => RefreshStatus::NotFound,
        Ok(_) => RefreshStatus::UpstreamError,
        Err(FetchFailure::Timeout) => RefreshStatus::Timeout,
        Err(FetchFailure::Connection(_)) => RefreshStatus::ConnectionError,
    };

    doc.meta.status = status;
    doc.meta.last_refreshed_at = Some(Utc::now().timestamp());
    doc.index = metadata::storage_record(&doc.raw_content);

    // Persist unconditionally: the whole record commits in one write, so a
    // cancelled refresh leaves the previous committed state intact.
    store.put(&doc, false).await?;

    let success = status == RefreshStatus::Ok;
    info!(id = %id, status = status.as_str(), success, "refresh complete");
    Ok(RefreshReport { status, success })
}
