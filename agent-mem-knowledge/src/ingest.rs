//! The ingestion pipeline: classify → enrich → embed → persist.
//!
//! Everything after embedding runs inside one transaction, so a failure at
//! any stage leaves no partial row behind. Reads used for arbitration run
//! on the pool and therefore only see committed state.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use sqlx::{Postgres, Transaction};
use tracing::{debug, info};

use agent_mem_core::Settings;

use crate::classifier;
use crate::embeddings::EmbedderClient;
use crate::errors::KnowledgeResult;
use crate::llm::{ArbitrationDecision, LlmClient};
use crate::models::{
    is_valid_insight_type, BlockStatus, IngestOutcome, KnowledgeIngest, KnowledgeType, RelatedId,
    SourceType,
};
use crate::storage::{ArbitrationInsert, KnowledgeStore, NewBlock};
use crate::text::normalize_tags;

const SUMMARY_THRESHOLD_BYTES: usize = 800;
const SIMILAR_CANDIDATE_LIMIT: i64 = 3;

pub struct Ingester {
    settings: Settings,
    store: KnowledgeStore,
    llm: Arc<LlmClient>,
    embedder: Arc<EmbedderClient>,
}

impl Ingester {
    pub fn new(
        settings: Settings,
        store: KnowledgeStore,
        llm: Arc<LlmClient>,
        embedder: Arc<EmbedderClient>,
    ) -> Self {
        Self {
            settings,
            store,
            llm,
            embedder,
        }
    }

    pub fn store(&self) -> &KnowledgeStore {
        &self.store
    }

    /// Ingest one file end to end.
    pub async fn ingest_file(
        &self,
        file_path: &Path,
        project_root: Option<&Path>,
        machine_id: &str,
    ) -> KnowledgeResult<IngestOutcome> {
        let Some(mut data) =
            classifier::process_file(&self.settings, file_path, project_root, machine_id).await?
        else {
            return Ok(IngestOutcome::skipped("文件不在监控范围或为空"));
        };

        let existing = self
            .store
            .find_latest_by_relative_path(&data.project_id, &data.relative_path)
            .await?;
        if let Some(existing) = &existing {
            if existing.file_hash == data.file_hash {
                return Ok(IngestOutcome::skipped("未变化"));
            }
        }

        let root_hint = project_root
            .map(|root| root.to_string_lossy().to_string())
            .unwrap_or_default();
        self.store
            .upsert_project(
                &data.machine_id,
                &data.project_id,
                &data.project_name,
                &data.machine_id,
                &root_hint,
            )
            .await?;

        if data.source_type == SourceType::Dialogue {
            self.enrich_dialogue(&mut data).await;
        }

        if data.summary.is_empty() && data.content.len() > SUMMARY_THRESHOLD_BYTES {
            data.summary = self.llm.summarize(&data.content).await;
        }

        data.related_ids = self.resolve_relations(&data.content, &data.project_id).await;

        let embedding = self.embedder.embed_query(data.summary_or_content()).await?;

        let id = new_block_id();
        let version = existing.as_ref().map(|e| e.version + 1).unwrap_or(1);
        let now = Utc::now();
        let block = NewBlock {
            id: id.clone(),
            embedding,
            version,
            expires_at: data.decay_rule.expires_at(now),
            now,
            data,
        };

        let mut tx = self.store.begin().await?;
        self.store.insert_block(&mut tx, &block).await?;
        match &existing {
            Some(existing) => {
                // Same-file update: snapshot and physically remove the old
                // row. Arbitration is skipped, the source is the same.
                self.store.snapshot_version(&mut tx, &existing.id).await?;
                self.store.delete_block(&mut tx, &existing.id).await?;
            }
            None => {
                self.semantic_replace(&mut tx, &block).await?;
            }
        }
        tx.commit().await?;

        info!(
            id = %id,
            path = %block.data.relative_path,
            version,
            "knowledge block ingested"
        );
        Ok(IngestOutcome::ok(id))
    }

    /// Distill a dialogue transcript and fold the result into the block.
    async fn enrich_dialogue(&self, data: &mut KnowledgeIngest) {
        let distilled = self.llm.distill(&data.content, &data.project_id).await;
        data.summary = distilled.summary;
        data.knowledge_type = KnowledgeType::DialogueExtract;
        if is_valid_insight_type(&distilled.insight_type) {
            data.insight_type = distilled.insight_type.clone();
        }
        data.structured = Some(serde_json::json!({
            "problem": distilled.problem,
            "thinking": distilled.thinking,
            "solution": distilled.solution,
            "result": distilled.result,
        }));
        if !distilled.solution.is_empty() {
            data.content = distilled.solution;
        }
        data.is_high_value = true;
        let mut merged = data.tags.clone();
        merged.extend(distilled.tags);
        data.tags = normalize_tags(&merged);
        data.reproducible = Some(distilled.reproducible);
        data.applicable_to = distilled.applicable_to;
        data.raw_content_path = data.file_path.clone();
    }

    /// Resolve relation hints to existing block ids. Misses are dropped.
    async fn resolve_relations(&self, content: &str, project_id: &str) -> Vec<RelatedId> {
        let mut related = Vec::new();
        for hint in self.llm.extract_relations(content).await {
            let matches = match self
                .store
                .search_by_keyword(project_id, &hint.keyword, 1)
                .await
            {
                Ok(matches) => matches,
                Err(err) => {
                    debug!("relation keyword lookup failed for {:?}: {err}", hint.keyword);
                    continue;
                }
            };
            if let Some(hit) = matches.into_iter().next() {
                related.push(RelatedId {
                    id: hit.id,
                    relation_type: hint.relation_type,
                    keyword: hint.keyword,
                });
            }
        }
        related
    }

    /// Arbitrate against semantically similar blocks from other files.
    ///
    /// Candidates below the similarity threshold are never touched and
    /// never reach the LLM.
    async fn semantic_replace(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        block: &NewBlock,
    ) -> KnowledgeResult<()> {
        let candidates = self
            .store
            .search_similar(
                &block.embedding,
                &block.data.project_id,
                &block.data.doc_type,
                SIMILAR_CANDIDATE_LIMIT,
            )
            .await?;
        let threshold = self.settings.versioning.semantic_similarity_threshold;

        for candidate in candidates {
            if candidate.similarity < threshold {
                continue;
            }
            let decision = self
                .llm
                .arbitrate_conflict(&block.data.content, &candidate.content)
                .await;
            self.store
                .insert_arbitration(
                    tx,
                    &ArbitrationInsert {
                        project_id: block.data.project_id.clone(),
                        candidate_id: candidate.id.clone(),
                        new_id: block.id.clone(),
                        action: decision.as_str().to_string(),
                        similarity: candidate.similarity,
                        old_summary: candidate.summary.clone(),
                        new_summary: block.data.summary.clone(),
                        model: self.llm.arbitrate_model(),
                    },
                )
                .await?;
            match decision {
                ArbitrationDecision::Replace => {
                    self.store.snapshot_version(tx, &candidate.id).await?;
                    self.store.delete_block(tx, &candidate.id).await?;
                }
                ArbitrationDecision::Conflict => {
                    self.store
                        .deprecate_block(
                            tx,
                            &candidate.id,
                            &block.id,
                            BlockStatus::Conflict,
                            "conflict",
                        )
                        .await?;
                }
                ArbitrationDecision::Supplement | ArbitrationDecision::Unrelated => {}
            }
        }
        Ok(())
    }
}

/// Fresh 32-char hyphenless UUID.
pub fn new_block_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_ids_are_32_hex_chars() {
        let id = new_block_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, new_block_id());
    }
}
