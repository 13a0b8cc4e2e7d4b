//! Integration tests for the store adapter and the backup/restore pass.

use serde_json::json;
use tempfile::TempDir;

use spec_registry::db;
use spec_registry::export;
use spec_registry::metadata;
use spec_registry::migrate;
use spec_registry::models::{ApiDocument, DocMeta, RefreshStatus};
use spec_registry::slug::{check_slug_available, SlugError};
use spec_registry::store::{DocStore, PutOutcome, MAX_PAGE_SIZE};

async fn setup() -> (TempDir, DocStore) {
    let tmp = TempDir::new().unwrap();
    let pool = db::connect(&tmp.path().join("registry.sqlite"))
        .await
        .unwrap();
    migrate::run_migrations(&pool).await.unwrap();
    (tmp, DocStore::new(pool))
}

fn make_doc(id: &str, title: &str, owner: &str) -> ApiDocument {
    let raw = serde_json::to_vec(&json!({
        "openapi": "3.0.0",
        "info": {
            "title": title,
            "version": "1.0",
            "contact": { "name": owner }
        },
        "paths": {}
    }))
    .unwrap();
    let index = metadata::storage_record(&raw);
    ApiDocument {
        id: id.to_string(),
        raw_content: raw,
        index,
        meta: DocMeta {
            owner_username: owner.to_string(),
            slug: None,
            source_url: format!("http://host/{}.json", id),
            last_refreshed_at: None,
            status: RefreshStatus::Registered,
            archived: false,
        },
    }
}

#[tokio::test]
async fn test_put_get_roundtrip() {
    let (_tmp, store) = setup().await;
    let doc = make_doc("doc1", "Example API", "alice");

    assert_eq!(store.put(&doc, true).await.unwrap(), PutOutcome::Stored);
    let loaded = store.get("doc1").await.unwrap().unwrap();
    assert_eq!(loaded.raw_content, doc.raw_content);
    assert_eq!(loaded.index.title, "Example API");
    assert_eq!(loaded.meta.owner_username, "alice");
    assert_eq!(loaded.meta.status, RefreshStatus::Registered);
}

#[tokio::test]
async fn test_conditional_create_single_winner() {
    let (_tmp, store) = setup().await;

    let first = make_doc("doc1", "First API", "alice");
    let second = make_doc("doc1", "Second API", "bob");

    assert_eq!(store.put(&first, true).await.unwrap(), PutOutcome::Stored);
    assert_eq!(store.put(&second, true).await.unwrap(), PutOutcome::Conflict);

    // The losing write left no trace, not even in the full-text index.
    let loaded = store.get("doc1").await.unwrap().unwrap();
    assert_eq!(loaded.index.title, "First API");
    assert!(store.search("second", 10, 0, true).await.unwrap().is_empty());
    assert_eq!(store.search("first", 10, 0, true).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_unconditional_put_replaces() {
    let (_tmp, store) = setup().await;

    store
        .put(&make_doc("doc1", "Old Title", "alice"), true)
        .await
        .unwrap();
    store
        .put(&make_doc("doc1", "New Title", "alice"), false)
        .await
        .unwrap();

    assert_eq!(store.count().await.unwrap(), 1);
    // Full-text entry follows the replacement.
    assert!(store.search("old", 10, 0, true).await.unwrap().is_empty());
    assert_eq!(store.search("new", 10, 0, true).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_delete_removes_row_and_fts() {
    let (_tmp, store) = setup().await;

    store
        .put(&make_doc("doc1", "Example API", "alice"), true)
        .await
        .unwrap();
    assert!(store.delete("doc1").await.unwrap());
    assert!(!store.delete("doc1").await.unwrap());

    assert!(store.get("doc1").await.unwrap().is_none());
    assert!(store.search("example", 10, 0, true).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_page_size_clamped() {
    let (_tmp, store) = setup().await;

    for i in 0..3 {
        store
            .put(&make_doc(&format!("doc{}", i), "Example API", "alice"), true)
            .await
            .unwrap();
    }

    // A request far beyond the ceiling still succeeds, bounded.
    let docs = store.list(MAX_PAGE_SIZE * 100, 0, true).await.unwrap();
    assert_eq!(docs.len(), 3);
    let docs = store.list(0, 0, true).await.unwrap();
    assert_eq!(docs.len(), 1);
}

#[tokio::test]
async fn test_list_page_restartable() {
    let (_tmp, store) = setup().await;

    for i in 0..5 {
        store
            .put(&make_doc(&format!("doc{}", i), "Example API", "alice"), true)
            .await
            .unwrap();
    }

    // Walk in batches of two, resuming from the last seen id each time.
    let mut seen: Vec<String> = Vec::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = store.list_page(cursor.as_deref(), 2, true).await.unwrap();
        if page.is_empty() {
            break;
        }
        cursor = Some(page.last().unwrap().id.clone());
        seen.extend(page.into_iter().map(|d| d.id));
    }
    assert_eq!(seen, vec!["doc0", "doc1", "doc2", "doc3", "doc4"]);
}

#[tokio::test]
async fn test_put_slug_collision_errors_without_deleting() {
    let (_tmp, store) = setup().await;

    let mut holder = make_doc("doc1", "First API", "alice");
    holder.meta.slug = Some("shared".to_string());
    store.put(&holder, true).await.unwrap();

    let mut intruder = make_doc("doc2", "Second API", "bob");
    store.put(&intruder, true).await.unwrap();

    // Writing doc2 with doc1's slug must fail the unique index, not
    // resolve it by removing doc1's row.
    intruder.meta.slug = Some("shared".to_string());
    assert!(store.put(&intruder, false).await.is_err());

    let holder = store.get("doc1").await.unwrap().unwrap();
    assert_eq!(holder.meta.slug.as_deref(), Some("shared"));
    let intruder = store.get("doc2").await.unwrap().unwrap();
    assert_eq!(intruder.meta.slug, None);
    // The failed write rolled back in full; both full-text entries remain.
    assert_eq!(store.search("first", 10, 0, true).await.unwrap().len(), 1);
    assert_eq!(store.search("second", 10, 0, true).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_slug_resolution_and_uniqueness() {
    let (_tmp, store) = setup().await;

    let mut doc = make_doc("doc1", "First API", "alice");
    doc.meta.slug = Some("myapi".to_string());
    store.put(&doc, true).await.unwrap();
    store
        .put(&make_doc("doc2", "Second API", "bob"), true)
        .await
        .unwrap();

    let by_slug = store.get_by_slug_or_id("myapi").await.unwrap().unwrap();
    assert_eq!(by_slug.id, "doc1");

    // Taken by another document, free for its current holder.
    assert_eq!(
        check_slug_available(&store, "myapi", "doc2").await.unwrap(),
        Err(SlugError::Taken("myapi".to_string()))
    );
    assert_eq!(
        check_slug_available(&store, "MyAPI", "doc1").await.unwrap(),
        Ok("myapi".to_string())
    );
}

#[tokio::test]
async fn test_aggregate_exact_buckets() {
    let (_tmp, store) = setup().await;

    store
        .put(&make_doc("doc1", "First API", "alice"), true)
        .await
        .unwrap();
    store
        .put(&make_doc("doc2", "Second API", "alice"), true)
        .await
        .unwrap();
    store
        .put(&make_doc("doc3", "Third API", "bob"), true)
        .await
        .unwrap();

    let buckets = store.aggregate("info.contact.name", 10).await.unwrap();
    assert_eq!(buckets.get("alice"), Some(&2));
    assert_eq!(buckets.get("bob"), Some(&1));

    // Unknown field aggregates to nothing.
    assert!(store.aggregate("info.nothing", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_aggregate_falls_back_to_analyzed_terms() {
    let (_tmp, store) = setup().await;

    // A description well past the exact-match length cap: the exact
    // projection has no buckets for it, so term counts take over.
    let long_description = format!("variant annotation service {}", "x".repeat(300));
    let raw = serde_json::to_vec(&json!({
        "openapi": "3.0.0",
        "info": {
            "title": "Example API",
            "version": "1.0",
            "description": long_description,
            "contact": { "name": "alice" }
        },
        "paths": {}
    }))
    .unwrap();
    let doc = ApiDocument {
        id: "doc1".to_string(),
        raw_content: raw.clone(),
        index: metadata::storage_record(&raw),
        meta: DocMeta {
            owner_username: "alice".to_string(),
            slug: None,
            source_url: "http://host/doc1.json".to_string(),
            last_refreshed_at: None,
            status: RefreshStatus::Registered,
            archived: false,
        },
    };
    store.put(&doc, true).await.unwrap();

    let buckets = store.aggregate("info.description", 10).await.unwrap();
    assert_eq!(buckets.get("variant"), Some(&1));
    assert_eq!(buckets.get("annotation"), Some(&1));
    assert!(!buckets.contains_key(&long_description));
}

#[tokio::test]
async fn test_aggregate_size_keeps_largest_buckets() {
    let (_tmp, store) = setup().await;

    for i in 0..3 {
        store
            .put(&make_doc(&format!("a{}", i), "First API", "alice"), true)
            .await
            .unwrap();
    }
    store
        .put(&make_doc("b0", "Second API", "bob"), true)
        .await
        .unwrap();

    let buckets = store.aggregate("info.contact.name", 1).await.unwrap();
    assert_eq!(buckets.len(), 1);
    assert_eq!(buckets.get("alice"), Some(&3));
}

#[tokio::test]
async fn test_backup_restore_roundtrip() {
    let (tmp, store) = setup().await;

    let mut doc = make_doc("doc1", "First API", "alice");
    doc.meta.slug = Some("firstapi".to_string());
    store.put(&doc, true).await.unwrap();
    store
        .put(&make_doc("doc2", "Second API", "bob"), true)
        .await
        .unwrap();

    let out = tmp.path().join("backup.json");
    let (path, exported) = export::backup_all(&store, Some(out.clone())).await.unwrap();
    assert_eq!(path, out);
    assert_eq!(exported, 2);

    // Restore into a fresh database.
    let (_tmp2, fresh) = setup().await;
    let restored = export::restore_all(&fresh, &out).await.unwrap();
    assert_eq!(restored, 2);

    let loaded = fresh.get("doc1").await.unwrap().unwrap();
    assert_eq!(loaded.raw_content, doc.raw_content);
    assert_eq!(loaded.meta.slug.as_deref(), Some("firstapi"));
    // The full-text index is rebuilt as part of the restore.
    assert_eq!(fresh.search("second", 10, 0, true).await.unwrap().len(), 1);

    // Restore refuses to run over existing data.
    assert!(export::restore_all(&fresh, &out).await.is_err());
}
