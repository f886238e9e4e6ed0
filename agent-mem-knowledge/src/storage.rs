//! Persistence over PostgreSQL + pgvector.
//!
//! The store owns the pool. Mutations that must be atomic (insert + the
//! replace/deprecate of what they supersede) run on a caller-provided
//! transaction; reads run on the pool and therefore never observe
//! uncommitted rows from an in-flight ingest.

use chrono::{DateTime, Utc};
use pgvector::Vector;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};

use crate::errors::{KnowledgeError, KnowledgeResult};
use crate::models::{
    AnchorRecord, BlockStatus, KnowledgeIngest, LatestRecord, Observation, OrderBy, SearchHit,
    SimilarCandidate, TimelineEntry,
};

/// A fully assembled row ready for insertion.
#[derive(Debug, Clone)]
pub struct NewBlock {
    pub id: String,
    pub data: KnowledgeIngest,
    pub embedding: Vec<f32>,
    pub version: i32,
    pub expires_at: Option<DateTime<Utc>>,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SearchParams {
    pub project_id: Option<String>,
    pub doc_types: Vec<String>,
    pub knowledge_types: Vec<String>,
    pub limit: i64,
    pub must_latest: bool,
    pub order_by: OrderBy,
    pub since: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct KeywordHit {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone)]
pub struct Bm25Hit {
    pub id: String,
    pub title: String,
    pub rank: f32,
}

#[derive(Debug, Clone)]
pub struct ProjectRecord {
    pub id: String,
    pub owner_id: String,
    pub project_key: String,
    pub project_name: String,
}

#[derive(Debug, Clone)]
pub struct ArbitrationInsert {
    pub project_id: String,
    pub candidate_id: String,
    pub new_id: String,
    pub action: String,
    pub similarity: f64,
    pub old_summary: String,
    pub new_summary: String,
    pub model: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ArbitrationRecord {
    pub id: i64,
    pub project_id: String,
    pub candidate_id: Option<String>,
    pub new_id: Option<String>,
    pub action: String,
    pub similarity: Option<f64>,
    pub old_summary: Option<String>,
    pub new_summary: Option<String>,
    pub model: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct KnowledgeStore {
    pool: PgPool,
}

impl KnowledgeStore {
    pub async fn connect(database_url: &str) -> KnowledgeResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn begin(&self) -> KnowledgeResult<Transaction<'static, Postgres>> {
        Ok(self.pool.begin().await?)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Idempotent schema ensurance. `reset` drops everything first, which
    /// is the only supported way to change the embedding dimension.
    pub async fn ensure_schema(&self, dimension: usize, reset: bool) -> KnowledgeResult<()> {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE EXTENSION IF NOT EXISTS pgcrypto")
            .execute(&self.pool)
            .await?;

        if reset {
            sqlx::query(
                "DROP TABLE IF EXISTS fragments, memories, memory_versions, \
                 memory_arbitrations, knowledge, projects CASCADE",
            )
            .execute(&self.pool)
            .await?;
        }

        if let Some(stored) = self.stored_embedding_dimension().await? {
            if stored > 0 && stored as usize != dimension {
                return Err(KnowledgeError::SchemaMismatch {
                    configured: dimension,
                    stored,
                });
            }
        }

        let schema = format!(
            r#"
CREATE TABLE IF NOT EXISTS projects (
  id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
  owner_id TEXT NOT NULL,
  project_key TEXT NOT NULL,
  project_name TEXT NOT NULL,
  machine_name TEXT,
  project_path TEXT,
  created_at TIMESTAMPTZ DEFAULT NOW(),
  updated_at TIMESTAMPTZ DEFAULT NOW(),
  UNIQUE(owner_id, project_key)
);

CREATE TABLE IF NOT EXISTS knowledge (
  id TEXT PRIMARY KEY,
  knowledge_type TEXT NOT NULL,
  doc_type TEXT,
  insight_type TEXT,
  source_type TEXT NOT NULL,
  raw_content_path TEXT,
  project_id TEXT NOT NULL,
  project_name TEXT,
  machine_id TEXT,
  file_path TEXT NOT NULL,
  relative_path TEXT NOT NULL,
  file_hash TEXT NOT NULL,
  title TEXT NOT NULL,
  content TEXT NOT NULL,
  summary TEXT,
  structured_content JSONB,
  category_l1 TEXT,
  category_l2 TEXT,
  category_l3 TEXT,
  tags JSONB,
  embedding VECTOR({dim}),
  related_ids JSONB,
  version INT NOT NULL DEFAULT 1,
  is_latest BOOLEAN NOT NULL DEFAULT TRUE,
  superseded_by TEXT,
  supersede_reason TEXT,
  status TEXT NOT NULL DEFAULT 'active',
  decay_rule TEXT,
  expires_at TIMESTAMPTZ,
  is_high_value BOOLEAN NOT NULL DEFAULT FALSE,
  reproducible BOOLEAN,
  applicable_to JSONB,
  created_at TIMESTAMPTZ NOT NULL,
  updated_at TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS memories (
  id TEXT PRIMARY KEY,
  project_id UUID REFERENCES projects(id) ON DELETE CASCADE,
  content_type TEXT NOT NULL,
  content TEXT NOT NULL,
  content_hash TEXT,
  ts BIGINT NOT NULL,
  summary TEXT,
  tags JSONB,
  chunk_count INT DEFAULT 1,
  embedding_done BOOLEAN DEFAULT FALSE,
  avg_embedding VECTOR({dim}),
  created_at TIMESTAMPTZ DEFAULT NOW(),
  updated_at TIMESTAMPTZ DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS fragments (
  id TEXT PRIMARY KEY,
  memory_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
  chunk_index INT NOT NULL,
  content TEXT NOT NULL,
  embedding VECTOR({dim}),
  ts TIMESTAMPTZ DEFAULT NOW(),
  UNIQUE(memory_id, chunk_index)
);

CREATE TABLE IF NOT EXISTS memory_versions (
  id BIGSERIAL PRIMARY KEY,
  knowledge_id TEXT NOT NULL,
  project_id TEXT NOT NULL,
  relative_path TEXT,
  title TEXT,
  content TEXT NOT NULL,
  summary TEXT,
  tags JSONB,
  embedding VECTOR({dim}),
  version INT NOT NULL,
  created_at TIMESTAMPTZ,
  replaced_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS memory_arbitrations (
  id BIGSERIAL PRIMARY KEY,
  project_id TEXT NOT NULL,
  candidate_id TEXT,
  new_id TEXT,
  action TEXT NOT NULL,
  similarity DOUBLE PRECISION,
  old_summary TEXT,
  new_summary TEXT,
  model TEXT,
  created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);
"#,
            dim = dimension
        );
        sqlx::raw_sql(&schema).execute(&self.pool).await?;

        let indexes = [
            "CREATE INDEX IF NOT EXISTS idx_knowledge_project_relpath ON knowledge(project_id, relative_path)",
            "CREATE INDEX IF NOT EXISTS idx_knowledge_latest ON knowledge(project_id, is_latest)",
            "CREATE INDEX IF NOT EXISTS idx_knowledge_doc_type ON knowledge(doc_type)",
            "CREATE INDEX IF NOT EXISTS idx_knowledge_knowledge_type ON knowledge(knowledge_type)",
            "CREATE INDEX IF NOT EXISTS idx_knowledge_updated ON knowledge((COALESCE(updated_at, created_at)) )",
            "CREATE INDEX IF NOT EXISTS idx_knowledge_tags_gin ON knowledge USING GIN (tags)",
            "CREATE INDEX IF NOT EXISTS idx_knowledge_embedding ON knowledge USING hnsw (embedding vector_cosine_ops)",
            "CREATE INDEX IF NOT EXISTS idx_knowledge_fts ON knowledge USING GIN (to_tsvector('simple', content))",
            "CREATE INDEX IF NOT EXISTS idx_fragments_embedding ON fragments USING hnsw (embedding vector_cosine_ops)",
            "CREATE INDEX IF NOT EXISTS idx_fragments_fts ON fragments USING GIN (to_tsvector('simple', content))",
            "CREATE INDEX IF NOT EXISTS idx_memory_versions_knowledge ON memory_versions(knowledge_id)",
            "CREATE INDEX IF NOT EXISTS idx_memory_arbitrations_project ON memory_arbitrations(project_id)",
        ];
        for statement in indexes {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Dimension of the stored `knowledge.embedding` column, if the table
    /// exists. pgvector keeps the dimension in the column's typmod.
    async fn stored_embedding_dimension(&self) -> KnowledgeResult<Option<i32>> {
        let row: Option<(i32,)> = sqlx::query_as(
            "SELECT atttypmod FROM pg_attribute \
             WHERE attrelid = to_regclass('public.knowledge') AND attname = 'embedding'",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(typmod,)| typmod))
    }

    pub async fn find_latest_by_relative_path(
        &self,
        project_id: &str,
        relative_path: &str,
    ) -> KnowledgeResult<Option<LatestRecord>> {
        let row: Option<(String, String, i32)> = sqlx::query_as(
            "SELECT id, file_hash, version FROM knowledge \
             WHERE project_id = $1 AND relative_path = $2 AND is_latest = TRUE \
             ORDER BY version DESC LIMIT 1",
        )
        .bind(project_id)
        .bind(relative_path)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(id, file_hash, version)| LatestRecord {
            id,
            file_hash,
            version,
        }))
    }

    pub async fn insert_block(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        block: &NewBlock,
    ) -> KnowledgeResult<()> {
        let data = &block.data;
        sqlx::query(
            r#"
INSERT INTO knowledge (
  id, knowledge_type, doc_type, insight_type, source_type, raw_content_path,
  project_id, project_name, machine_id, file_path, relative_path, file_hash,
  title, content, summary, structured_content, category_l1, category_l2, category_l3,
  tags, embedding, related_ids, version, is_latest, superseded_by, supersede_reason,
  status, decay_rule, expires_at, is_high_value, reproducible, applicable_to,
  created_at, updated_at
) VALUES (
  $1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,
  $21,$22,$23,$24,$25,$26,$27,$28,$29,$30,$31,$32,$33,$34
)"#,
        )
        .bind(&block.id)
        .bind(data.knowledge_type.as_str())
        .bind(nullable_str(&data.doc_type))
        .bind(nullable_str(&data.insight_type))
        .bind(data.source_type.as_str())
        .bind(nullable_str(&data.raw_content_path))
        .bind(&data.project_id)
        .bind(nullable_str(&data.project_name))
        .bind(nullable_str(&data.machine_id))
        .bind(&data.file_path)
        .bind(&data.relative_path)
        .bind(&data.file_hash)
        .bind(&data.title)
        .bind(&data.content)
        .bind(nullable_str(&data.summary))
        .bind(data.structured.clone())
        .bind(nullable_str(&data.category_l1))
        .bind(nullable_str(&data.category_l2))
        .bind(nullable_str(&data.category_l3))
        .bind(serde_json::to_value(&data.tags).unwrap_or_default())
        .bind(Vector::from(block.embedding.clone()))
        .bind(serde_json::to_value(&data.related_ids).unwrap_or_default())
        .bind(block.version)
        .bind(true)
        .bind(Option::<String>::None)
        .bind(Option::<String>::None)
        .bind(BlockStatus::Active.as_str())
        .bind(data.decay_rule.as_str())
        .bind(block.expires_at)
        .bind(data.is_high_value)
        .bind(data.reproducible)
        .bind(serde_json::to_value(&data.applicable_to).unwrap_or_default())
        .bind(block.now)
        .bind(block.now)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Physical removal. Geek mode: no tombstone is left behind.
    pub async fn delete_block(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        id: &str,
    ) -> KnowledgeResult<()> {
        sqlx::query("DELETE FROM knowledge WHERE id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    pub async fn deprecate_block(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        old_id: &str,
        new_id: &str,
        status: BlockStatus,
        reason: &str,
    ) -> KnowledgeResult<()> {
        sqlx::query(
            "UPDATE knowledge SET is_latest = FALSE, superseded_by = $1, status = $2, \
             supersede_reason = $3, updated_at = NOW() WHERE id = $4",
        )
        .bind(new_id)
        .bind(status.as_str())
        .bind(reason)
        .bind(old_id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Snapshot a row into `memory_versions` before it is replaced.
    pub async fn snapshot_version(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        knowledge_id: &str,
    ) -> KnowledgeResult<()> {
        sqlx::query(
            "INSERT INTO memory_versions \
             (knowledge_id, project_id, relative_path, title, content, summary, tags, \
              embedding, version, created_at, replaced_at) \
             SELECT id, project_id, relative_path, title, content, summary, tags, \
                    embedding, version, created_at, NOW() \
             FROM knowledge WHERE id = $1",
        )
        .bind(knowledge_id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn insert_arbitration(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        log: &ArbitrationInsert,
    ) -> KnowledgeResult<()> {
        sqlx::query(
            "INSERT INTO memory_arbitrations \
             (project_id, candidate_id, new_id, action, similarity, old_summary, new_summary, model) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8)",
        )
        .bind(&log.project_id)
        .bind(nullable_str(&log.candidate_id))
        .bind(nullable_str(&log.new_id))
        .bind(&log.action)
        .bind(log.similarity)
        .bind(nullable_str(&log.old_summary))
        .bind(nullable_str(&log.new_summary))
        .bind(nullable_str(&log.model))
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn fetch_arbitrations(
        &self,
        project_id: Option<&str>,
        memory_id: Option<&str>,
        limit: i64,
    ) -> KnowledgeResult<Vec<ArbitrationRecord>> {
        let mut sql = String::from(
            "SELECT id, project_id, candidate_id, new_id, action, similarity, \
             old_summary, new_summary, model, created_at \
             FROM memory_arbitrations WHERE TRUE",
        );
        let mut arg = 0;
        if project_id.is_some() {
            arg += 1;
            sql.push_str(&format!(" AND project_id = ${arg}"));
        }
        if memory_id.is_some() {
            arg += 1;
            sql.push_str(&format!(" AND (candidate_id = ${arg} OR new_id = ${arg})"));
        }
        arg += 1;
        sql.push_str(&format!(" ORDER BY created_at DESC LIMIT ${arg}"));

        let mut query = sqlx::query_as::<_, ArbitrationRecord>(&sql);
        if let Some(project_id) = project_id {
            query = query.bind(project_id.to_string());
        }
        if let Some(memory_id) = memory_id {
            query = query.bind(memory_id.to_string());
        }
        Ok(query.bind(limit).fetch_all(&self.pool).await?)
    }

    /// Filtered vector search. Cosine distance is converted to a
    /// similarity score (`1 - distance`) on the returned hits.
    pub async fn search_vector(
        &self,
        embedding: &[f32],
        params: &SearchParams,
    ) -> KnowledgeResult<Vec<SearchHit>> {
        let mut sql = String::from(
            "SELECT id, title, file_path, COALESCE(summary, '') AS summary, content, \
             COALESCE(doc_type, '') AS doc_type, knowledge_type, project_id, \
             (embedding <=> $1) AS distance \
             FROM knowledge WHERE embedding IS NOT NULL",
        );
        let mut arg = 1;
        if params.project_id.is_some() {
            arg += 1;
            sql.push_str(&format!(" AND project_id = ${arg}"));
        }
        if !params.doc_types.is_empty() {
            arg += 1;
            sql.push_str(&format!(" AND doc_type = ANY(${arg})"));
        }
        if !params.knowledge_types.is_empty() {
            arg += 1;
            sql.push_str(&format!(" AND knowledge_type = ANY(${arg})"));
        }
        if params.must_latest {
            sql.push_str(" AND is_latest = TRUE");
        }
        if params.since.is_some() {
            arg += 1;
            sql.push_str(&format!(" AND COALESCE(updated_at, created_at) >= ${arg}"));
        }
        match params.order_by {
            OrderBy::Relevance => sql.push_str(" ORDER BY embedding <=> $1 ASC"),
            OrderBy::TimeDesc => sql.push_str(" ORDER BY COALESCE(updated_at, created_at) DESC"),
        }
        arg += 1;
        sql.push_str(&format!(" LIMIT ${arg}"));

        let mut query =
            sqlx::query_as::<_, VectorRow>(&sql).bind(Vector::from(embedding.to_vec()));
        if let Some(project_id) = &params.project_id {
            query = query.bind(project_id);
        }
        if !params.doc_types.is_empty() {
            query = query.bind(&params.doc_types);
        }
        if !params.knowledge_types.is_empty() {
            query = query.bind(&params.knowledge_types);
        }
        if let Some(since) = params.since {
            query = query.bind(since);
        }
        let rows = query.bind(params.limit).fetch_all(&self.pool).await?;

        Ok(rows
            .into_iter()
            .map(|row| SearchHit {
                id: row.id,
                title: row.title,
                file_path: row.file_path,
                summary: row.summary,
                content: row.content,
                doc_type: row.doc_type,
                knowledge_type: row.knowledge_type,
                project_id: row.project_id,
                score: 1.0 - row.distance,
                is_reranked: false,
            })
            .collect())
    }

    /// Case-insensitive substring search over title/content/summary.
    pub async fn search_by_keyword(
        &self,
        project_id: &str,
        keyword: &str,
        limit: i64,
    ) -> KnowledgeResult<Vec<KeywordHit>> {
        let pattern = format!("%{}%", keyword);
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT id, title FROM knowledge \
             WHERE project_id = $1 AND is_latest = TRUE \
               AND (title ILIKE $2 OR content ILIKE $2 OR summary ILIKE $2) \
             ORDER BY COALESCE(updated_at, created_at) DESC LIMIT $3",
        )
        .bind(project_id)
        .bind(pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, title)| KeywordHit { id, title })
            .collect())
    }

    /// Lexical ranking via Postgres full-text search.
    pub async fn search_bm25(
        &self,
        project_id: &str,
        query_text: &str,
        limit: i64,
    ) -> KnowledgeResult<Vec<Bm25Hit>> {
        let rows: Vec<(String, String, f32)> = sqlx::query_as(
            "SELECT id, title, \
             ts_rank_cd(to_tsvector('simple', content), plainto_tsquery('simple', $2)) AS rank \
             FROM knowledge \
             WHERE project_id = $1 AND is_latest = TRUE \
               AND to_tsvector('simple', content) @@ plainto_tsquery('simple', $2) \
             ORDER BY rank DESC LIMIT $3",
        )
        .bind(project_id)
        .bind(query_text)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, title, rank)| Bm25Hit { id, title, rank })
            .collect())
    }

    /// Similarity probe for arbitration. Runs on the pool, so the
    /// caller's uncommitted insert is never its own candidate.
    pub async fn search_similar(
        &self,
        embedding: &[f32],
        project_id: &str,
        doc_type: &str,
        limit: i64,
    ) -> KnowledgeResult<Vec<SimilarCandidate>> {
        let mut sql = String::from(
            "SELECT id, content, COALESCE(summary, '') AS summary, \
             1 - (embedding <=> $1) AS similarity \
             FROM knowledge \
             WHERE project_id = $2 AND is_latest = TRUE AND embedding IS NOT NULL",
        );
        let mut arg = 2;
        if !doc_type.is_empty() {
            arg += 1;
            sql.push_str(&format!(" AND doc_type = ${arg}"));
        }
        arg += 1;
        sql.push_str(&format!(" ORDER BY embedding <=> $1 ASC LIMIT ${arg}"));

        let mut query = sqlx::query_as::<_, (String, String, String, f64)>(&sql)
            .bind(Vector::from(embedding.to_vec()))
            .bind(project_id);
        if !doc_type.is_empty() {
            query = query.bind(doc_type);
        }
        let rows = query.bind(limit).fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|(id, content, summary, similarity)| SimilarCandidate {
                id,
                content,
                summary,
                similarity,
            })
            .collect())
    }

    pub async fn fetch_anchor(&self, id: &str) -> KnowledgeResult<Option<AnchorRecord>> {
        let row: Option<(String, String, DateTime<Utc>, Option<DateTime<Utc>>)> = sqlx::query_as(
            "SELECT id, project_id, created_at, updated_at FROM knowledge WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(id, project_id, created_at, updated_at)| AnchorRecord {
            id,
            project_id,
            created_at,
            updated_at,
        }))
    }

    /// Rows inside `[start, end]`, ascending by their anchor time.
    pub async fn fetch_timeline(
        &self,
        project_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: i64,
    ) -> KnowledgeResult<Vec<TimelineEntry>> {
        let rows: Vec<(String, String, String, String, String, DateTime<Utc>)> = sqlx::query_as(
            "SELECT id, title, COALESCE(doc_type, '') AS doc_type, knowledge_type, \
             COALESCE(summary, '') AS summary, \
             COALESCE(updated_at, created_at) AS anchor_time \
             FROM knowledge \
             WHERE project_id = $1 AND COALESCE(updated_at, created_at) BETWEEN $2 AND $3 \
             ORDER BY anchor_time ASC LIMIT $4",
        )
        .bind(project_id)
        .bind(start)
        .bind(end)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(
                |(id, title, doc_type, knowledge_type, summary, anchor_time)| TimelineEntry {
                    id,
                    title,
                    doc_type,
                    knowledge_type,
                    summary,
                    anchor_time,
                },
            )
            .collect())
    }

    /// Full rows for an id set. Order is database order; the dispatcher
    /// restores the caller's order.
    pub async fn fetch_observations(&self, ids: &[String]) -> KnowledgeResult<Vec<Observation>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, ObservationRow>(
            "SELECT id, project_id, title, content, COALESCE(summary, '') AS summary, \
             COALESCE(doc_type, '') AS doc_type, knowledge_type, \
             COALESCE(insight_type, '') AS insight_type, file_path, relative_path, \
             tags, structured_content, related_ids, version, is_latest, status, \
             created_at, updated_at \
             FROM knowledge WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(ObservationRow::into_observation).collect())
    }

    pub async fn upsert_project(
        &self,
        owner_id: &str,
        project_key: &str,
        project_name: &str,
        machine_name: &str,
        project_path: &str,
    ) -> KnowledgeResult<ProjectRecord> {
        let row: (uuid::Uuid, String, String, String) = sqlx::query_as(
            "INSERT INTO projects (owner_id, project_key, project_name, machine_name, project_path) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (owner_id, project_key) \
             DO UPDATE SET project_name = EXCLUDED.project_name, \
                           machine_name = COALESCE(NULLIF(EXCLUDED.machine_name, ''), projects.machine_name), \
                           project_path = COALESCE(NULLIF(EXCLUDED.project_path, ''), projects.project_path), \
                           updated_at = NOW() \
             RETURNING id, owner_id, project_key, project_name",
        )
        .bind(owner_id)
        .bind(project_key)
        .bind(if project_name.is_empty() { project_key } else { project_name })
        .bind(nullable_str(machine_name))
        .bind(nullable_str(project_path))
        .fetch_one(&self.pool)
        .await?;
        Ok(ProjectRecord {
            id: row.0.to_string(),
            owner_id: row.1,
            project_key: row.2,
            project_name: row.3,
        })
    }
}

fn nullable_str(value: &str) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[derive(sqlx::FromRow)]
struct VectorRow {
    id: String,
    title: String,
    file_path: String,
    summary: String,
    content: String,
    doc_type: String,
    knowledge_type: String,
    project_id: String,
    distance: f64,
}

#[derive(sqlx::FromRow)]
struct ObservationRow {
    id: String,
    project_id: String,
    title: String,
    content: String,
    summary: String,
    doc_type: String,
    knowledge_type: String,
    insight_type: String,
    file_path: String,
    relative_path: String,
    tags: Option<serde_json::Value>,
    structured_content: Option<serde_json::Value>,
    related_ids: Option<serde_json::Value>,
    version: i32,
    is_latest: bool,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ObservationRow {
    fn into_observation(self) -> Observation {
        let tags = self
            .tags
            .and_then(|value| serde_json::from_value::<Vec<String>>(value).ok())
            .unwrap_or_default();
        Observation {
            id: self.id,
            project_id: self.project_id,
            title: self.title,
            content: self.content,
            summary: self.summary,
            doc_type: self.doc_type,
            knowledge_type: self.knowledge_type,
            insight_type: self.insight_type,
            file_path: self.file_path,
            relative_path: self.relative_path,
            tags,
            structured_content: self.structured_content,
            related_ids: self.related_ids,
            version: self.version,
            is_latest: self.is_latest,
            status: self.status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
