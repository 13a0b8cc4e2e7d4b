//! Registration controller.
//!
//! The single entry point used by the CLI and HTTP layers. Orchestrates
//! add/overwrite decisions, ownership checks, alias assignment and removal,
//! deletion, refresh, and the query/aggregation surface. Stateless between
//! calls: every operation round-trips through the store adapter, and
//! conditional checks re-read the current record immediately before the
//! write (read-verify-write, never blind overwrite).

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::fetch::Fetcher;
use crate::metadata::{self, MissingIdentityFields};
use crate::models::{ApiDocument, DocMeta, RefreshStatus, SchemaViolation, ValidationReport};
use crate::notify::{Notifier, RegistrationEvent};
use crate::refresh::{self, RefreshReport};
use crate::slug::{self, SlugError};
use crate::store::{DocStore, PutOutcome};

/// Machine-readable error kind; the HTTP layer maps these to status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Identity,
    Conflict,
    Ownership,
    NotFound,
    Store,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::Identity => "identity_error",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Ownership => "ownership_error",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Store => "store_unavailable",
        }
    }
}

/// Controller error taxonomy. Every operation returns either a success
/// payload or exactly one of these; nothing opaque crosses the controller
/// boundary.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("validation failed with {} violation(s)", .0.len())]
    Validation(Vec<SchemaViolation>),
    #[error(transparent)]
    Identity(#[from] MissingIdentityFields),
    #[error("{0}")]
    Conflict(String),
    #[error("user '{user}' is not the owner of '{id}'")]
    Ownership { user: String, id: String },
    #[error("no document found for '{0}'")]
    NotFound(String),
    #[error("{0}")]
    Slug(SlugError),
    #[error("document store unavailable: {0}")]
    Store(#[from] sqlx::Error),
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::Validation(_) => ErrorKind::Validation,
            RegistryError::Identity(_) => ErrorKind::Identity,
            RegistryError::Conflict(_) => ErrorKind::Conflict,
            RegistryError::Ownership { .. } => ErrorKind::Ownership,
            RegistryError::NotFound(_) => ErrorKind::NotFound,
            // Slug rule violations are caller-fixable input problems; a
            // taken slug is a race on shared state.
            RegistryError::Slug(SlugError::Taken(_)) => ErrorKind::Conflict,
            RegistryError::Slug(_) => ErrorKind::Validation,
            RegistryError::Store(_) => ErrorKind::Store,
        }
    }
}

/// Options for [`Registry::register`].
#[derive(Debug, Clone)]
pub struct RegisterOptions {
    /// Origin location recorded for later refresh.
    pub source_url: String,
    /// Permit overwriting an existing document with the same identity.
    pub allow_overwrite: bool,
    /// On overwrite, require the caller to match the stored owner.
    pub require_same_owner: bool,
    /// On overwrite, clear slug and refresh status instead of preserving
    /// them.
    pub reset_meta: bool,
    /// Run every gate, persist nothing.
    pub dry_run: bool,
}

impl Default for RegisterOptions {
    fn default() -> Self {
        Self {
            source_url: String::new(),
            allow_overwrite: false,
            require_same_owner: true,
            reset_meta: false,
            dry_run: false,
        }
    }
}

/// Outcome of a successful registration.
#[derive(Debug, Clone)]
pub struct Registration {
    pub id: String,
    /// True when this call created a new document (false for overwrite and
    /// dry-run).
    pub created: bool,
}

/// Options for [`Registry::get`].
#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    /// Restrict the returned document projection to these top-level fields.
    pub fields: Option<Vec<String>>,
    pub include_archived: bool,
    pub page_size: Option<i64>,
    pub offset: i64,
}

/// Result of a lookup: single matches return the bare record.
#[derive(Debug, Clone)]
pub enum GetResult {
    One(Value),
    Many(Vec<Value>),
}

/// The registration and reconciliation controller.
///
/// Holds its collaborators by dependency injection; all shared mutable
/// state lives in the store.
pub struct Registry {
    store: DocStore,
    fetcher: Arc<dyn Fetcher>,
    notifier: Arc<dyn Notifier>,
}

impl Registry {
    pub fn new(store: DocStore, fetcher: Arc<dyn Fetcher>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            fetcher,
            notifier,
        }
    }

    pub fn store(&self) -> &DocStore {
        &self.store
    }

    /// Validate a document without registering it.
    pub fn validate(&self, raw: &[u8]) -> ValidationReport {
        metadata::validate(raw)
    }

    /// Register a document.
    ///
    /// Gate order: schema validation, identity derivation, conditional
    /// create, then overwrite policy. Validation failure carries the full
    /// violation list and persists nothing.
    pub async fn register(
        &self,
        raw: &[u8],
        owner: &str,
        opts: &RegisterOptions,
    ) -> Result<Registration, RegistryError> {
        let report = metadata::validate(raw);
        if !report.valid {
            return Err(RegistryError::Validation(report.errors));
        }

        let id = metadata::derive_identity(raw)?;
        let index = metadata::storage_record(raw);

        if !self.store.exists(&id).await? {
            if opts.dry_run {
                return Ok(Registration { id, created: false });
            }
            let doc = ApiDocument {
                id: id.clone(),
                raw_content: raw.to_vec(),
                index: index.clone(),
                meta: DocMeta {
                    owner_username: owner.to_string(),
                    slug: None,
                    source_url: opts.source_url.clone(),
                    last_refreshed_at: None,
                    status: RefreshStatus::Registered,
                    archived: false,
                },
            };
            match self.store.put(&doc, true).await? {
                PutOutcome::Stored => {
                    info!(id = %id, owner = %owner, "registered new document");
                    self.notify_registered(&doc).await;
                    return Ok(Registration { id, created: true });
                }
                PutOutcome::Conflict if !opts.allow_overwrite => {
                    // Lost a race to a concurrent registrant.
                    return Err(RegistryError::Conflict(
                        "document already exists, not saved".to_string(),
                    ));
                }
                PutOutcome::Conflict => {
                    // Fall through to the overwrite path below.
                }
            }
        }

        if !opts.allow_overwrite {
            return Err(RegistryError::Conflict(
                "document already exists, not saved".to_string(),
            ));
        }

        // Re-read the current record immediately before the ownership check.
        let current = self
            .store
            .get(&id)
            .await?
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;

        if opts.require_same_owner && current.meta.owner_username != owner {
            return Err(RegistryError::Ownership {
                user: owner.to_string(),
                id: id.clone(),
            });
        }

        if opts.dry_run {
            return Ok(Registration { id, created: false });
        }

        let meta = if opts.reset_meta {
            DocMeta {
                owner_username: owner.to_string(),
                slug: None,
                source_url: opts.source_url.clone(),
                last_refreshed_at: None,
                status: RefreshStatus::Registered,
                archived: current.meta.archived,
            }
        } else {
            DocMeta {
                owner_username: owner.to_string(),
                source_url: opts.source_url.clone(),
                ..current.meta
            }
        };

        let doc = ApiDocument {
            id: id.clone(),
            raw_content: raw.to_vec(),
            index,
            meta,
        };
        self.store.put(&doc, false).await?;
        info!(id = %id, owner = %owner, "overwrote existing document");
        self.notify_registered(&doc).await;
        Ok(Registration { id, created: false })
    }

    /// Resolve `token` as a literal id, a slug, or the sentinel `"all"`.
    ///
    /// `"all"` lists documents (archived excluded by default). Single
    /// matches return the bare record rather than a one-element list.
    pub async fn get(&self, token: &str, opts: &GetOptions) -> Result<GetResult, RegistryError> {
        if token == "all" {
            let docs = self
                .store
                .list(
                    opts.page_size.unwrap_or(10),
                    opts.offset,
                    !opts.include_archived,
                )
                .await?;
            let mut values: Vec<Value> = docs
                .iter()
                .map(|d| doc_to_value(d, opts.fields.as_deref()))
                .collect();
            if values.len() == 1 {
                return Ok(GetResult::One(values.remove(0)));
            }
            return Ok(GetResult::Many(values));
        }

        let doc = self
            .store
            .get_by_slug_or_id(token)
            .await?
            .ok_or_else(|| RegistryError::NotFound(token.to_string()))?;
        if doc.meta.archived && !opts.include_archived {
            return Err(RegistryError::NotFound(token.to_string()));
        }
        Ok(GetResult::One(doc_to_value(&doc, opts.fields.as_deref())))
    }

    /// Full-text search over the indexed projection.
    pub async fn search(
        &self,
        query: &str,
        opts: &GetOptions,
    ) -> Result<Vec<Value>, RegistryError> {
        let docs = self
            .store
            .search(
                query,
                opts.page_size.unwrap_or(10),
                opts.offset,
                !opts.include_archived,
            )
            .await?;
        Ok(docs
            .iter()
            .map(|d| doc_to_value(d, opts.fields.as_deref()))
            .collect())
    }

    /// Assign (`Some`) or clear (`None`) the document's slug. Owner only.
    pub async fn set_alias(
        &self,
        id: &str,
        caller: &str,
        new_slug: Option<&str>,
    ) -> Result<(), RegistryError> {
        let mut doc = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;

        if doc.meta.owner_username != caller {
            return Err(RegistryError::Ownership {
                user: caller.to_string(),
                id: id.to_string(),
            });
        }

        doc.meta.slug = match new_slug {
            Some(candidate) => {
                let checked = slug::check_slug_available(&self.store, candidate, id).await?;
                Some(checked.map_err(RegistryError::Slug)?)
            }
            None => None,
        };

        // Rebuild the analyzed projection from the verbatim bytes so the
        // full-text entry survives the whole-record write.
        doc.index = metadata::storage_record(&doc.raw_content);
        self.store.put(&doc, false).await?;
        Ok(())
    }

    /// Remove the slug, requiring it to match what the caller last saw.
    /// A concurrent alias change surfaces as a conflict, never a clobber.
    pub async fn remove_alias(
        &self,
        id: &str,
        caller: &str,
        expected_slug: &str,
    ) -> Result<(), RegistryError> {
        let mut doc = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;

        if doc.meta.owner_username != caller {
            return Err(RegistryError::Ownership {
                user: caller.to_string(),
                id: id.to_string(),
            });
        }

        let stored = doc.meta.slug.as_deref().unwrap_or("");
        if stored != expected_slug {
            return Err(RegistryError::Conflict(format!(
                "document '{}' slug name is not '{}'",
                id, expected_slug
            )));
        }

        doc.meta.slug = None;
        doc.index = metadata::storage_record(&doc.raw_content);
        self.store.put(&doc, false).await?;
        Ok(())
    }

    /// Physically delete the record. Owner only; immediately visible.
    pub async fn delete(&self, id: &str, caller: &str) -> Result<(), RegistryError> {
        let doc = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;

        if doc.meta.owner_username != caller {
            return Err(RegistryError::Ownership {
                user: caller.to_string(),
                id: id.to_string(),
            });
        }

        if !self.store.delete(id).await? {
            return Err(RegistryError::NotFound(id.to_string()));
        }
        info!(id = %id, "deleted document");
        Ok(())
    }

    /// Distinct existing values for `field` with their counts.
    pub async fn get_tag_values(
        &self,
        field: &str,
        size: usize,
    ) -> Result<BTreeMap<String, u64>, RegistryError> {
        Ok(self.store.aggregate(field, size).await?)
    }

    /// Re-fetch the document's source URL and reconcile the stored copy.
    pub async fn refresh(&self, id: &str) -> Result<RefreshReport, RegistryError> {
        refresh::refresh_document(&self.store, self.fetcher.as_ref(), id).await
    }

    async fn notify_registered(&self, doc: &ApiDocument) {
        self.notifier
            .notify(&RegistrationEvent {
                id: doc.id.clone(),
                title: doc.index.title.clone(),
                description: doc.index.description.clone(),
                username: doc.meta.owner_username.clone(),
            })
            .await;
    }
}

/// Decode the verbatim bytes and attach `_id` and `_meta`, optionally
/// restricted to the requested top-level fields.
fn doc_to_value(doc: &ApiDocument, fields: Option<&[String]>) -> Value {
    let mut value: Value = serde_json::from_slice(&doc.raw_content).unwrap_or(Value::Null);

    if let (Some(fields), Some(map)) = (fields, value.as_object_mut()) {
        if !fields.iter().any(|f| f == "all") {
            map.retain(|k, _| fields.iter().any(|f| f == k));
        }
    }

    if let Some(map) = value.as_object_mut() {
        map.insert("_id".to_string(), Value::String(doc.id.clone()));
        map.insert(
            "_meta".to_string(),
            serde_json::to_value(&doc.meta).unwrap_or(Value::Null),
        );
    }
    value
}
