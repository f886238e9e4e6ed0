//! Retrieval path: intent routing, time-ordered progress queries, and
//! timeline windows.

mod common;

use tempfile::TempDir;

use agent_mem_knowledge::SearchRequest;

#[tokio::test]
async fn progress_query_routes_to_progress_docs_in_time_order() {
    let Some(engine) = common::setup().await else {
        eprintln!("skipping: AGENT_MEM_TEST_DATABASE_URL not set");
        return;
    };
    let dir = TempDir::new().unwrap();
    let root = dir.path();

    let week1 = common::write_file(
        root,
        "docs/progress/week1.md",
        "# Week 1\n\nshipped the watcher",
    )
    .await;
    let week2 = common::write_file(
        root,
        "docs/progress/week2.md",
        "# Week 2\n\nshipped the search path",
    )
    .await;
    let arch = common::write_file(
        root,
        "docs/architecture/overview.md",
        "# Overview\n\nsystem structure",
    )
    .await;

    let id1 = engine
        .ingester
        .ingest_file(&week1, Some(root), "m")
        .await
        .unwrap()
        .id
        .unwrap();
    let id2 = engine
        .ingester
        .ingest_file(&week2, Some(root), "m")
        .await
        .unwrap()
        .id
        .unwrap();
    engine
        .ingester
        .ingest_file(&arch, Some(root), "m")
        .await
        .unwrap();

    // Spread the rows in time so the ordering is deterministic.
    sqlx::query("UPDATE knowledge SET updated_at = updated_at - INTERVAL '1 hour' WHERE id = $1")
        .bind(&id1)
        .execute(engine.store.pool())
        .await
        .unwrap();

    let project_id = common::project_id_for(root);
    let hits = engine
        .searcher
        .search(SearchRequest {
            query: "本周进度".to_string(),
            project_id: Some(project_id),
            limit: Some(10),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(hits.len(), 2, "only progress docs should match");
    assert!(hits.iter().all(|hit| hit.doc_type == "progress"));
    assert!(hits.iter().all(|hit| !hit.is_reranked));
    assert_eq!(hits[0].id, id2, "newest progress doc first");
    assert_eq!(hits[1].id, id1);
}

#[tokio::test]
async fn background_query_sees_architecture_docs() {
    let Some(engine) = common::setup().await else {
        eprintln!("skipping: AGENT_MEM_TEST_DATABASE_URL not set");
        return;
    };
    let dir = TempDir::new().unwrap();
    let root = dir.path();

    let arch = common::write_file(
        root,
        "docs/architecture/storage.md",
        "# Storage\n\npgvector layout",
    )
    .await;
    engine
        .ingester
        .ingest_file(&arch, Some(root), "m")
        .await
        .unwrap();

    let project_id = common::project_id_for(root);
    let hits = engine
        .searcher
        .search(SearchRequest {
            query: "存储结构说明".to_string(),
            project_id: Some(project_id),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].doc_type, "architecture");
    assert!(hits[0].score > 0.0);
}

#[tokio::test]
async fn routing_can_be_disabled_to_search_all_types() {
    let Some(engine) = common::setup().await else {
        eprintln!("skipping: AGENT_MEM_TEST_DATABASE_URL not set");
        return;
    };
    let dir = TempDir::new().unwrap();
    let root = dir.path();

    let progress = common::write_file(root, "docs/progress/p.md", "# P\n\nprogress body").await;
    let design = common::write_file(root, "docs/design/d.md", "# D\n\ndesign body").await;
    engine
        .ingester
        .ingest_file(&progress, Some(root), "m")
        .await
        .unwrap();
    engine
        .ingester
        .ingest_file(&design, Some(root), "m")
        .await
        .unwrap();

    let project_id = common::project_id_for(root);
    let hits = engine
        .searcher
        .search(SearchRequest {
            query: "anything at all".to_string(),
            project_id: Some(project_id),
            use_routing: Some(false),
            limit: Some(10),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(hits.len(), 2, "no doc-type filter without routing");
}

#[tokio::test]
async fn timeline_window_excludes_rows_outside_it() {
    let Some(engine) = common::setup().await else {
        eprintln!("skipping: AGENT_MEM_TEST_DATABASE_URL not set");
        return;
    };
    let dir = TempDir::new().unwrap();
    let root = dir.path();

    let a = common::write_file(root, "notes/a.md", "# A\n\nfirst entry").await;
    let b = common::write_file(root, "notes/b.md", "# B\n\nsecond entry").await;
    let c = common::write_file(root, "notes/c.md", "# C\n\nfar future entry").await;

    let id_a = engine
        .ingester
        .ingest_file(&a, Some(root), "m")
        .await
        .unwrap()
        .id
        .unwrap();
    let id_b = engine
        .ingester
        .ingest_file(&b, Some(root), "m")
        .await
        .unwrap()
        .id
        .unwrap();
    let id_c = engine
        .ingester
        .ingest_file(&c, Some(root), "m")
        .await
        .unwrap()
        .id
        .unwrap();

    // Push one row beyond the +3d edge of the window.
    sqlx::query(
        "UPDATE knowledge SET updated_at = updated_at + INTERVAL '4 days', \
         created_at = created_at + INTERVAL '4 days' WHERE id = $1",
    )
    .bind(&id_c)
    .execute(engine.store.pool())
    .await
    .unwrap();

    let anchor = engine
        .store
        .fetch_anchor(&id_a)
        .await
        .unwrap()
        .expect("anchor row");
    let window = chrono::Duration::days(3);
    let anchor_time = anchor.anchor_time();
    let project_id = common::project_id_for(root);

    let entries = engine
        .store
        .fetch_timeline(&project_id, anchor_time - window, anchor_time + window, 10)
        .await
        .unwrap();

    let ids: Vec<&str> = entries.iter().map(|entry| entry.id.as_str()).collect();
    assert!(ids.contains(&id_a.as_str()));
    assert!(ids.contains(&id_b.as_str()));
    assert!(!ids.contains(&id_c.as_str()), "row at +4d must not appear");
    // Ascending by anchor time.
    let times: Vec<_> = entries.iter().map(|entry| entry.anchor_time).collect();
    let mut sorted = times.clone();
    sorted.sort();
    assert_eq!(times, sorted);
}

#[tokio::test]
async fn keyword_and_bm25_search_find_latest_rows() {
    let Some(engine) = common::setup().await else {
        eprintln!("skipping: AGENT_MEM_TEST_DATABASE_URL not set");
        return;
    };
    let dir = TempDir::new().unwrap();
    let root = dir.path();

    let note = common::write_file(
        root,
        "notes/rollout.md",
        "# Rollout\n\nblue green rollout with canary checks",
    )
    .await;
    let id = engine
        .ingester
        .ingest_file(&note, Some(root), "m")
        .await
        .unwrap()
        .id
        .unwrap();
    let project_id = common::project_id_for(root);

    let keyword_hits = engine
        .store
        .search_by_keyword(&project_id, "canary", 5)
        .await
        .unwrap();
    assert_eq!(keyword_hits.len(), 1);
    assert_eq!(keyword_hits[0].id, id);

    let bm25_hits = engine
        .store
        .search_bm25(&project_id, "canary rollout", 5)
        .await
        .unwrap();
    assert_eq!(bm25_hits.len(), 1);
    assert_eq!(bm25_hits[0].id, id);
    assert!(bm25_hits[0].rank > 0.0);

    let none = engine
        .store
        .search_by_keyword(&project_id, "nonexistent-term", 5)
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn observations_fetch_drops_unknown_ids() {
    let Some(engine) = common::setup().await else {
        eprintln!("skipping: AGENT_MEM_TEST_DATABASE_URL not set");
        return;
    };
    let dir = TempDir::new().unwrap();
    let root = dir.path();

    let note = common::write_file(root, "notes/only.md", "# Only\n\nbody").await;
    let id = engine
        .ingester
        .ingest_file(&note, Some(root), "m")
        .await
        .unwrap()
        .id
        .unwrap();

    let rows = engine
        .store
        .fetch_observations(&[
            "does-not-exist".to_string(),
            id.clone(),
            "also-missing".to_string(),
        ])
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, id);
}
