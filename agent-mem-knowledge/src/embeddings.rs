//! Text embedding with a TTL-bounded query cache and batched remote calls.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use md5::{Digest, Md5};
use serde::Deserialize;

use agent_mem_core::{EmbeddingProviderKind, Settings};

use crate::errors::{KnowledgeError, KnowledgeResult};
use crate::text::md5_hex;

const QUERY_CACHE_TTL: Duration = Duration::from_secs(30 * 60);
const QUERY_CACHE_MAX_ENTRIES: usize = 1000;
const REMOTE_BATCH_LIMIT: usize = 10;
const REMOTE_RETRIES: u32 = 3;

#[derive(Debug)]
struct CachedVector {
    value: Vec<f32>,
    expires: Instant,
}

/// Embedding client over the configured provider.
///
/// `mock` derives deterministic vectors from an MD5 digest and exists for
/// tests; `qwen` talks to the DashScope OpenAI-compatible batch endpoint;
/// `fastembed` is recognized but unimplemented and fails loudly.
#[derive(Debug)]
pub struct EmbedderClient {
    provider: EmbeddingProviderKind,
    model: String,
    dimension: usize,
    batch_size: usize,
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
    query_cache: Mutex<HashMap<String, CachedVector>>,
}

impl EmbedderClient {
    pub fn new(settings: &Settings) -> Self {
        Self {
            provider: settings.embedding.provider,
            model: settings.embedding.model.clone(),
            dimension: settings.embedding.dimension,
            batch_size: settings.embedding.batch_size,
            base_url: settings.llm.base_url.trim_end_matches('/').to_string(),
            api_key: settings.llm_api_key(),
            client: reqwest::Client::new(),
            query_cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embed a single text, consulting the query cache first.
    pub async fn embed_query(&self, text: &str) -> KnowledgeResult<Vec<f32>> {
        let key = self.cache_key(text);
        if let Some(cached) = self.cached_vector(&key) {
            return Ok(cached);
        }
        let texts = [text.to_string()];
        let mut vectors = self.embed(&texts).await?;
        let Some(vector) = vectors.pop() else {
            return Ok(vec![0.0; self.dimension]);
        };
        if !vector.is_empty() {
            self.store_vector(key, &vector);
        }
        Ok(vector)
    }

    /// Embed many texts in remote batches of at most ten.
    pub async fn embed_batch(&self, texts: &[String]) -> KnowledgeResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.embed(texts).await
    }

    async fn embed(&self, texts: &[String]) -> KnowledgeResult<Vec<Vec<f32>>> {
        match self.provider {
            EmbeddingProviderKind::Mock => Ok(texts
                .iter()
                .map(|text| self.normalize(self.mock_embed(text)))
                .collect()),
            EmbeddingProviderKind::Qwen => {
                if self.model.is_empty() {
                    return Err(KnowledgeError::Embedding("缺少向量模型配置".to_string()));
                }
                let batch_size = self.batch_size.clamp(1, REMOTE_BATCH_LIMIT);
                let mut result = Vec::with_capacity(texts.len());
                for chunk in texts.chunks(batch_size) {
                    let vectors = self.embed_remote_with_retry(chunk).await?;
                    if vectors.len() != chunk.len() {
                        return Err(KnowledgeError::Embedding(format!(
                            "向量数量不匹配: expected {}, got {}",
                            chunk.len(),
                            vectors.len()
                        )));
                    }
                    result.extend(vectors.into_iter().map(|vector| self.normalize(vector)));
                }
                Ok(result)
            }
            EmbeddingProviderKind::Fastembed => Err(KnowledgeError::UnsupportedProvider(
                "fastembed".to_string(),
            )),
        }
    }

    async fn embed_remote_with_retry(&self, chunk: &[String]) -> KnowledgeResult<Vec<Vec<f32>>> {
        let mut last_err = None;
        for attempt in 0..REMOTE_RETRIES {
            match self.embed_remote(chunk).await {
                Ok(vectors) => return Ok(vectors),
                Err(err) => {
                    last_err = Some(err);
                    tokio::time::sleep(Duration::from_millis(200 * (1 << attempt))).await;
                }
            }
        }
        Err(last_err.unwrap_or_else(|| KnowledgeError::Embedding("embedding failed".to_string())))
    }

    async fn embed_remote(&self, chunk: &[String]) -> KnowledgeResult<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);
        let body = EmbeddingsRequest {
            model: self.model.clone(),
            input: chunk.to_vec(),
            dimensions: Some(self.dimension),
        };
        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(KnowledgeError::Embedding(format!(
                "embedding request failed: {status} {text}"
            )));
        }
        let payload: EmbeddingsResponse = response.json().await?;
        let mut data: Vec<(usize, Vec<f32>)> = payload
            .data
            .into_iter()
            .map(|item| (item.index, item.embedding))
            .collect();
        data.sort_by_key(|(idx, _)| *idx);
        Ok(data.into_iter().map(|(_, vector)| vector).collect())
    }

    /// Force a vector to the configured dimension: truncate or zero-pad.
    fn normalize(&self, mut vector: Vec<f32>) -> Vec<f32> {
        if self.dimension == 0 || vector.len() == self.dimension {
            return vector;
        }
        vector.resize(self.dimension, 0.0);
        vector
    }

    /// Deterministic vector from the MD5 digest, tiled to the dimension.
    fn mock_embed(&self, text: &str) -> Vec<f32> {
        let mut hasher = Md5::new();
        hasher.update(text.as_bytes());
        let digest = hasher.finalize();
        let base: Vec<f32> = digest.iter().map(|&b| b as f32 / 255.0).collect();
        if self.dimension == 0 {
            return base;
        }
        (0..self.dimension).map(|i| base[i % base.len()]).collect()
    }

    fn cache_key(&self, text: &str) -> String {
        format!(
            "embed:{}",
            md5_hex(&format!(
                "{}|{}|{}|{}",
                self.provider.as_str(),
                self.model,
                self.dimension,
                text
            ))
        )
    }

    fn cached_vector(&self, key: &str) -> Option<Vec<f32>> {
        let mut cache = self.query_cache.lock().expect("embed cache poisoned");
        let now = Instant::now();
        match cache.get(key) {
            Some(entry) if entry.expires > now => Some(entry.value.clone()),
            Some(_) => {
                cache.remove(key);
                None
            }
            None => None,
        }
    }

    fn store_vector(&self, key: String, value: &[f32]) {
        let mut cache = self.query_cache.lock().expect("embed cache poisoned");
        let now = Instant::now();
        if cache.len() >= QUERY_CACHE_MAX_ENTRIES {
            cache.retain(|_, entry| entry.expires > now);
            if cache.len() >= QUERY_CACHE_MAX_ENTRIES {
                let target = QUERY_CACHE_MAX_ENTRIES - QUERY_CACHE_MAX_ENTRIES / 10;
                let excess = cache.len().saturating_sub(target);
                let doomed: Vec<String> = cache.keys().take(excess).cloned().collect();
                for key in doomed {
                    cache.remove(&key);
                }
            }
        }
        cache.insert(
            key,
            CachedVector {
                value: value.to_vec(),
                expires: now + QUERY_CACHE_TTL,
            },
        );
    }
}

// ── wire types ────────────────────────────────────────────────────

#[derive(Debug, serde::Serialize)]
struct EmbeddingsRequest {
    model: String,
    input: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}
