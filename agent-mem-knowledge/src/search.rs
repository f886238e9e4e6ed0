//! Hybrid retrieval: intent routing → filtered vector search → optional
//! LLM rerank.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use agent_mem_core::Settings;

use crate::embeddings::EmbedderClient;
use crate::errors::{KnowledgeError, KnowledgeResult};
use crate::llm::LlmClient;
use crate::models::{OrderBy, SearchHit};
use crate::storage::{KnowledgeStore, SearchParams};
use crate::text::{truncate_chars, unique_strings};

const DEFAULT_LIMIT: usize = 5;
const RERANK_OVERFETCH: usize = 5;
const RERANK_DOC_CHARS: usize = 2000;

#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub query: String,
    pub project_id: Option<String>,
    pub doc_types: Vec<String>,
    pub knowledge_types: Vec<String>,
    pub limit: Option<usize>,
    pub use_routing: Option<bool>,
    pub use_rerank: Option<bool>,
}

pub struct Searcher {
    settings: Settings,
    store: KnowledgeStore,
    llm: Arc<LlmClient>,
    embedder: Arc<EmbedderClient>,
}

impl Searcher {
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

    pub async fn search(&self, request: SearchRequest) -> KnowledgeResult<Vec<SearchHit>> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(KnowledgeError::InvalidInput("query 不能为空".to_string()));
        }

        let limit = request.limit.filter(|l| *l > 0).unwrap_or(DEFAULT_LIMIT);
        let use_routing = request.use_routing.unwrap_or(true);
        let mut use_rerank = request.use_rerank.unwrap_or(self.settings.rerank.enabled);

        let mut doc_types = request.doc_types.clone();
        let mut knowledge_types = request.knowledge_types.clone();
        let mut must_latest = true;
        let mut time_filter_days = None;
        let mut order_by = OrderBy::Relevance;

        if use_routing {
            let route = self.llm.route_query(query).await;
            debug!(intent = route.intent.as_str(), "query routed");
            must_latest = route.must_latest;
            time_filter_days = route.time_filter_days;
            order_by = route.order_by;
            let (route_docs, route_knowledge) = split_route_types(&route.doc_types);
            doc_types.extend(route_docs);
            knowledge_types.extend(route_knowledge);
        }

        let vector = self.embedder.embed_query(query).await?;

        if order_by == OrderBy::TimeDesc {
            use_rerank = false;
        }
        let initial_limit = if use_rerank {
            limit * RERANK_OVERFETCH
        } else {
            limit
        };

        let params = SearchParams {
            project_id: request
                .project_id
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string),
            doc_types: unique_strings(&doc_types),
            knowledge_types: unique_strings(&knowledge_types),
            limit: initial_limit as i64,
            must_latest,
            order_by,
            since: time_filter_days.map(|days| Utc::now() - chrono::Duration::days(days)),
        };

        let rows = self.store.search_vector(&vector, &params).await?;

        if !use_rerank || rows.is_empty() {
            return Ok(trim_to(rows, limit));
        }

        let docs = build_rerank_docs(&rows);
        let Some(items) = self.llm.rerank(query, &docs, limit).await else {
            return Ok(trim_to(rows, limit));
        };
        if items.is_empty() {
            return Ok(trim_to(rows, limit));
        }

        let mut reranked: Vec<SearchHit> = items
            .into_iter()
            .filter_map(|item| {
                rows.get(item.index).map(|row| {
                    let mut hit = row.clone();
                    hit.score = item.relevance_score;
                    hit.is_reranked = true;
                    hit
                })
            })
            .collect();
        reranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(trim_to(reranked, limit))
    }
}

/// Route values mixing doc types with the two knowledge types; split them.
fn split_route_types(values: &[String]) -> (Vec<String>, Vec<String>) {
    let mut doc_types = Vec::new();
    let mut knowledge_types = Vec::new();
    for value in values {
        if value == "insight" || value == "dialogue_extract" {
            knowledge_types.push(value.clone());
        } else {
            doc_types.push(value.clone());
        }
    }
    (doc_types, knowledge_types)
}

/// `summary\ncontent`, truncated, as the reranker's document view.
fn build_rerank_docs(rows: &[SearchHit]) -> Vec<String> {
    rows.iter()
        .map(|row| {
            let text = format!("{}\n{}", row.summary.trim(), row.content.trim());
            truncate_chars(&text, RERANK_DOC_CHARS)
        })
        .collect()
}

fn trim_to(mut rows: Vec<SearchHit>, limit: usize) -> Vec<SearchHit> {
    rows.truncate(limit);
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str, score: f64) -> SearchHit {
        SearchHit {
            id: id.to_string(),
            title: String::new(),
            file_path: String::new(),
            summary: format!("summary of {id}"),
            content: format!("content of {id}"),
            doc_type: String::new(),
            knowledge_type: "doc".to_string(),
            project_id: "p".to_string(),
            score,
            is_reranked: false,
        }
    }

    #[test]
    fn route_types_are_split_into_doc_and_knowledge() {
        let values = vec![
            "architecture".to_string(),
            "insight".to_string(),
            "background".to_string(),
            "dialogue_extract".to_string(),
        ];
        let (docs, knowledge) = split_route_types(&values);
        assert_eq!(docs, vec!["architecture", "background"]);
        assert_eq!(knowledge, vec!["insight", "dialogue_extract"]);
    }

    #[test]
    fn rerank_docs_are_truncated() {
        let mut row = hit("a", 0.9);
        row.content = "x".repeat(5000);
        let docs = build_rerank_docs(&[row]);
        assert_eq!(docs.len(), 1);
        assert!(docs[0].chars().count() <= RERANK_DOC_CHARS);
        assert!(docs[0].starts_with("summary of a\n"));
    }

    #[test]
    fn trim_respects_limit() {
        let rows = vec![hit("a", 0.9), hit("b", 0.8), hit("c", 0.7)];
        assert_eq!(trim_to(rows.clone(), 2).len(), 2);
        assert_eq!(trim_to(rows, 10).len(), 3);
    }
}
