//! End-to-end ingestion: fresh insert, hash idempotence, same-file
//! replacement, and semantic arbitration.

mod common;

use std::sync::Mutex;

use tempfile::TempDir;

use agent_mem_knowledge::models::IngestStatus;

// Arbitration tests toggle AGENT_MEM_MOCK_ARBITRATE; keep them serial.
static ARBITRATE_ENV: Mutex<()> = Mutex::new(());

#[tokio::test]
async fn fresh_insert_creates_versioned_latest_row() {
    let Some(engine) = common::setup().await else {
        eprintln!("skipping: AGENT_MEM_TEST_DATABASE_URL not set");
        return;
    };
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let path = common::write_file(root, "docs/design.md", "# Title\n\nbody").await;

    let outcome = engine
        .ingester
        .ingest_file(&path, Some(root), "test-machine")
        .await
        .expect("ingest");
    assert_eq!(outcome.status, IngestStatus::Ok);
    let id = outcome.id.expect("new id");

    let project_id = common::project_id_for(root);
    let latest = engine
        .store
        .find_latest_by_relative_path(&project_id, "docs/design.md")
        .await
        .unwrap()
        .expect("latest row");
    assert_eq!(latest.id, id);
    assert_eq!(latest.version, 1);

    let rows = engine.store.fetch_observations(&[id]).await.unwrap();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.knowledge_type, "doc");
    // design.md resolves through the root-filename table.
    assert_eq!(row.doc_type, "architecture");
    assert!(row.is_latest);
    assert_eq!(row.version, 1);
    assert_eq!(row.title, "Title");
    assert_eq!(common::row_count(&engine.store, &project_id).await, 1);
}

#[tokio::test]
async fn unchanged_content_is_skipped() {
    let Some(engine) = common::setup().await else {
        eprintln!("skipping: AGENT_MEM_TEST_DATABASE_URL not set");
        return;
    };
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let path = common::write_file(root, "docs/progress/week.md", "# Week\n\nprogress notes").await;

    let first = engine
        .ingester
        .ingest_file(&path, Some(root), "m")
        .await
        .unwrap();
    assert_eq!(first.status, IngestStatus::Ok);

    let second = engine
        .ingester
        .ingest_file(&path, Some(root), "m")
        .await
        .unwrap();
    assert_eq!(second.status, IngestStatus::Skipped);
    assert_eq!(second.reason.as_deref(), Some("未变化"));

    let project_id = common::project_id_for(root);
    assert_eq!(common::row_count(&engine.store, &project_id).await, 1);
}

#[tokio::test]
async fn modified_file_replaces_and_bumps_version() {
    let Some(engine) = common::setup().await else {
        eprintln!("skipping: AGENT_MEM_TEST_DATABASE_URL not set");
        return;
    };
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let path = common::write_file(root, "docs/design/api.md", "# API\n\nversion one").await;

    let first = engine
        .ingester
        .ingest_file(&path, Some(root), "m")
        .await
        .unwrap();
    let old_id = first.id.expect("first id");

    common::write_file(root, "docs/design/api.md", "# API\n\nversion two, rewritten").await;
    let second = engine
        .ingester
        .ingest_file(&path, Some(root), "m")
        .await
        .unwrap();
    assert_eq!(second.status, IngestStatus::Ok);
    let new_id = second.id.expect("second id");
    assert_ne!(old_id, new_id);

    let project_id = common::project_id_for(root);
    assert_eq!(common::row_count(&engine.store, &project_id).await, 1);

    let latest = engine
        .store
        .find_latest_by_relative_path(&project_id, "docs/design/api.md")
        .await
        .unwrap()
        .expect("latest");
    assert_eq!(latest.id, new_id);
    assert_eq!(latest.version, 2);

    // The old row is physically gone, and its snapshot survives.
    assert!(engine
        .store
        .fetch_observations(&[old_id.clone()])
        .await
        .unwrap()
        .is_empty());
    let (snapshots,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM memory_versions WHERE knowledge_id = $1")
            .bind(&old_id)
            .fetch_one(engine.store.pool())
            .await
            .unwrap();
    assert_eq!(snapshots, 1);
}

#[tokio::test]
async fn semantic_duplicate_is_replaced_and_audited() {
    let Some(engine) = common::setup().await else {
        eprintln!("skipping: AGENT_MEM_TEST_DATABASE_URL not set");
        return;
    };
    let _guard = ARBITRATE_ENV.lock().unwrap_or_else(|e| e.into_inner());
    std::env::remove_var("AGENT_MEM_MOCK_ARBITRATE");

    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let body = "# Deploy Notes\n\nuse blue-green rollout with health checks";
    let path_a = common::write_file(root, "docs/design/a.md", body).await;
    let path_b = common::write_file(root, "docs/design/b.md", body).await;

    let first = engine
        .ingester
        .ingest_file(&path_a, Some(root), "m")
        .await
        .unwrap();
    let id_a = first.id.expect("id a");

    // Identical content in a different file: mock embeddings coincide, the
    // mock arbiter reads it as a replacement.
    let second = engine
        .ingester
        .ingest_file(&path_b, Some(root), "m")
        .await
        .unwrap();
    let id_b = second.id.expect("id b");

    let project_id = common::project_id_for(root);
    assert_eq!(common::row_count(&engine.store, &project_id).await, 1);
    assert!(engine
        .store
        .fetch_observations(&[id_a.clone()])
        .await
        .unwrap()
        .is_empty());

    let logs = engine
        .store
        .fetch_arbitrations(Some(&project_id), None, 10)
        .await
        .unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].action, "replace");
    assert_eq!(logs[0].candidate_id.as_deref(), Some(id_a.as_str()));
    assert_eq!(logs[0].new_id.as_deref(), Some(id_b.as_str()));
    assert!(logs[0].similarity.unwrap_or_default() >= 0.85);
}

#[tokio::test]
async fn conflicting_duplicate_deprecates_the_candidate() {
    let Some(engine) = common::setup().await else {
        eprintln!("skipping: AGENT_MEM_TEST_DATABASE_URL not set");
        return;
    };
    let _guard = ARBITRATE_ENV.lock().unwrap_or_else(|e| e.into_inner());
    std::env::set_var("AGENT_MEM_MOCK_ARBITRATE", "conflict");

    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let body = "# Cache Policy\n\nalways write through, never write back";
    let path_a = common::write_file(root, "docs/design/old.md", body).await;
    let path_b = common::write_file(root, "docs/design/new.md", body).await;

    let first = engine
        .ingester
        .ingest_file(&path_a, Some(root), "m")
        .await
        .unwrap();
    let id_a = first.id.expect("id a");
    let second = engine
        .ingester
        .ingest_file(&path_b, Some(root), "m")
        .await
        .unwrap();
    let id_b = second.id.expect("id b");

    std::env::remove_var("AGENT_MEM_MOCK_ARBITRATE");

    let project_id = common::project_id_for(root);
    assert_eq!(common::row_count(&engine.store, &project_id).await, 2);

    let rows = engine
        .store
        .fetch_observations(&[id_a.clone(), id_b.clone()])
        .await
        .unwrap();
    let old = rows.iter().find(|r| r.id == id_a).expect("old row");
    let new = rows.iter().find(|r| r.id == id_b).expect("new row");
    assert!(!old.is_latest);
    assert_eq!(old.status, "conflict");
    assert!(new.is_latest);
    assert_eq!(new.status, "active");

    let (superseded_by, reason): (Option<String>, Option<String>) = sqlx::query_as(
        "SELECT superseded_by, supersede_reason FROM knowledge WHERE id = $1",
    )
    .bind(&id_a)
    .fetch_one(engine.store.pool())
    .await
    .unwrap();
    assert_eq!(superseded_by.as_deref(), Some(id_b.as_str()));
    assert_eq!(reason.as_deref(), Some("conflict"));
}

#[tokio::test]
async fn below_threshold_candidates_are_never_touched() {
    let Some(engine) = common::setup_with(|settings| {
        // A threshold no candidate can reach: arbitration must not fire.
        settings.versioning.semantic_similarity_threshold = 1.01;
    })
    .await
    else {
        eprintln!("skipping: AGENT_MEM_TEST_DATABASE_URL not set");
        return;
    };
    let _guard = ARBITRATE_ENV.lock().unwrap_or_else(|e| e.into_inner());
    std::env::remove_var("AGENT_MEM_MOCK_ARBITRATE");

    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let body = "# Same Everywhere\n\nidentical content in two files";
    let path_a = common::write_file(root, "docs/design/one.md", body).await;
    let path_b = common::write_file(root, "docs/design/two.md", body).await;

    engine
        .ingester
        .ingest_file(&path_a, Some(root), "m")
        .await
        .unwrap();
    engine
        .ingester
        .ingest_file(&path_b, Some(root), "m")
        .await
        .unwrap();

    let project_id = common::project_id_for(root);
    assert_eq!(common::row_count(&engine.store, &project_id).await, 2);
    let logs = engine
        .store
        .fetch_arbitrations(Some(&project_id), None, 10)
        .await
        .unwrap();
    assert!(logs.is_empty());
}

#[tokio::test]
async fn dialogue_files_are_distilled_into_extracts() {
    let Some(engine) = common::setup().await else {
        eprintln!("skipping: AGENT_MEM_TEST_DATABASE_URL not set");
        return;
    };
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let transcript = "# Session\n\nuser: the deploy fails\nassistant: pin the image digest";
    let path = common::write_file(root, "chat_history/session-01.md", transcript).await;

    let outcome = engine
        .ingester
        .ingest_file(&path, Some(root), "m")
        .await
        .unwrap();
    assert_eq!(outcome.status, IngestStatus::Ok);
    let id = outcome.id.unwrap();

    let rows = engine.store.fetch_observations(&[id]).await.unwrap();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.knowledge_type, "dialogue_extract");
    // Mock mode distillation yields the structured failure record: the
    // solution carries the raw transcript and becomes the content.
    assert_eq!(row.summary, "对话提炼失败");
    assert_eq!(row.insight_type, "solution");
    assert!(row.content.contains("pin the image digest"));
    let structured = row.structured_content.as_ref().expect("structured");
    assert!(structured.get("problem").is_some());
    assert!(structured.get("solution").is_some());

    let (is_high_value, raw_content_path): (bool, Option<String>) =
        sqlx::query_as("SELECT is_high_value, raw_content_path FROM knowledge WHERE id = $1")
            .bind(&row.id)
            .fetch_one(engine.store.pool())
            .await
            .unwrap();
    assert!(is_high_value);
    assert_eq!(
        raw_content_path.as_deref(),
        Some(path.to_string_lossy().as_ref())
    );
}

#[tokio::test]
async fn project_record_is_upserted_on_ingest() {
    let Some(engine) = common::setup().await else {
        eprintln!("skipping: AGENT_MEM_TEST_DATABASE_URL not set");
        return;
    };
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let path = common::write_file(root, "notes/scratch.md", "# Scratch\n\nnote body").await;

    engine
        .ingester
        .ingest_file(&path, Some(root), "machine-7")
        .await
        .unwrap();

    let project_id = common::project_id_for(root);
    let record = engine
        .store
        .upsert_project("machine-7", &project_id, "", "", "")
        .await
        .unwrap();
    assert_eq!(record.owner_id, "machine-7");
    assert_eq!(record.project_key, project_id);
    assert!(!record.id.is_empty());
}
