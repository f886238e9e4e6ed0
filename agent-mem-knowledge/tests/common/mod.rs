//! Shared setup for the database-backed pipeline tests.
//!
//! The tests run the full pipeline against a real PostgreSQL with the
//! `vector` extension, using the mock embedder and `AGENT_MEM_LLM_MODE=mock`
//! so nothing leaves the machine. They skip (pass trivially) when
//! `AGENT_MEM_TEST_DATABASE_URL` is unset.

use std::sync::Arc;

use tokio::sync::OnceCell;

use agent_mem_core::{EmbeddingProviderKind, Settings};
use agent_mem_knowledge::{EmbedderClient, Ingester, KnowledgeStore, LlmClient, Searcher};

pub const TEST_DIM: usize = 16;

static SCHEMA_READY: OnceCell<()> = OnceCell::const_new();

pub struct TestEngine {
    pub store: KnowledgeStore,
    pub ingester: Arc<Ingester>,
    pub searcher: Arc<Searcher>,
}

pub fn test_database_url() -> Option<String> {
    std::env::var("AGENT_MEM_TEST_DATABASE_URL")
        .ok()
        .filter(|value| !value.trim().is_empty())
}

pub async fn setup() -> Option<TestEngine> {
    setup_with(|_| {}).await
}

/// Build an engine against the test database, or `None` to skip.
pub async fn setup_with(tweak: impl FnOnce(&mut Settings)) -> Option<TestEngine> {
    let url = test_database_url()?;
    std::env::set_var("AGENT_MEM_LLM_MODE", "mock");

    let mut settings = Settings::default();
    settings.embedding.provider = EmbeddingProviderKind::Mock;
    settings.embedding.dimension = TEST_DIM;
    settings.storage.database_url = url.clone();
    // Mock vectors are digest-derived, so unrelated texts still land around
    // 0.75 cosine similarity. Only identical content should trip arbitration.
    settings.versioning.semantic_similarity_threshold = 0.99;
    tweak(&mut settings);

    let store = KnowledgeStore::connect(&url).await.expect("connect test db");
    SCHEMA_READY
        .get_or_init(|| async {
            store
                .ensure_schema(TEST_DIM, true)
                .await
                .expect("ensure test schema");
        })
        .await;

    let llm = Arc::new(LlmClient::new(&settings));
    let embedder = Arc::new(EmbedderClient::new(&settings));
    let ingester = Arc::new(Ingester::new(
        settings.clone(),
        store.clone(),
        llm.clone(),
        embedder.clone(),
    ));
    let searcher = Arc::new(Searcher::new(
        settings.clone(),
        store.clone(),
        llm,
        embedder,
    ));
    Some(TestEngine {
        store,
        ingester,
        searcher,
    })
}

pub async fn row_count(store: &KnowledgeStore, project_id: &str) -> i64 {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM knowledge WHERE project_id = $1")
            .bind(project_id)
            .fetch_one(store.pool())
            .await
            .expect("count rows");
    count
}

/// Write a file under the project root, creating parents.
pub async fn write_file(root: &std::path::Path, relative: &str, content: &str) -> std::path::PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.expect("mkdir");
    }
    tokio::fs::write(&path, content).await.expect("write file");
    path
}

/// The project id the classifier derives for a root without `.project.yaml`.
pub fn project_id_for(root: &std::path::Path) -> String {
    root.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .expect("root basename")
}
