//! LLM capabilities with deterministic fallbacks.
//!
//! Every capability recovers locally when the remote call fails: a bad
//! response degrades retrieval quality, it never fails an ingest. Setting
//! `AGENT_MEM_LLM_MODE=mock` short-circuits all remote calls, which is how
//! the integration tests run the full pipeline offline.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::{debug, warn};

use agent_mem_core::Settings;

use crate::models::{is_valid_relation_type, OrderBy, RELATION_TYPES};
use crate::text::{md5_hex, normalize_tags, truncate_chars};

const LLM_CACHE_TTL: Duration = Duration::from_secs(30 * 60);
const LLM_CACHE_MAX_ENTRIES: usize = 500;

/// Relation hint extracted from content, to be resolved against the store.
#[derive(Debug, Clone, Deserialize)]
pub struct RelationHint {
    #[serde(default)]
    pub keyword: String,
    #[serde(default)]
    pub relation_type: String,
}

/// Retrieval intent of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryIntent {
    Progress,
    Decision,
    Howto,
    Debug,
    Background,
}

impl QueryIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Progress => "progress",
            Self::Decision => "decision",
            Self::Howto => "howto",
            Self::Debug => "debug",
            Self::Background => "background",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "progress" => Some(Self::Progress),
            "decision" => Some(Self::Decision),
            "howto" => Some(Self::Howto),
            "debug" => Some(Self::Debug),
            "background" => Some(Self::Background),
            _ => None,
        }
    }
}

/// Filter strategy derived from an intent. `doc_types` may carry knowledge
/// types (`insight`, `dialogue_extract`); the searcher splits them out.
#[derive(Debug, Clone)]
pub struct QueryRoute {
    pub intent: QueryIntent,
    pub doc_types: Vec<String>,
    pub must_latest: bool,
    pub time_filter_days: Option<i64>,
    pub order_by: OrderBy,
}

impl QueryRoute {
    pub fn for_intent(intent: QueryIntent) -> Self {
        let (doc_types, must_latest, time_filter_days, order_by): (&[&str], bool, Option<i64>, OrderBy) =
            match intent {
                QueryIntent::Progress => {
                    (&["progress", "issue"], false, Some(3), OrderBy::TimeDesc)
                }
                QueryIntent::Decision => (
                    &["architecture", "background", "insight", "dialogue_extract"],
                    false,
                    None,
                    OrderBy::Relevance,
                ),
                QueryIntent::Howto => (
                    &["deployment", "delivery", "implementation"],
                    true,
                    None,
                    OrderBy::Relevance,
                ),
                QueryIntent::Debug => {
                    (&["issue", "progress", "insight"], false, None, OrderBy::Relevance)
                }
                QueryIntent::Background => {
                    (&["background", "architecture"], false, None, OrderBy::Relevance)
                }
            };
        Self {
            intent,
            doc_types: doc_types.iter().map(|s| s.to_string()).collect(),
            must_latest,
            time_filter_days,
            order_by,
        }
    }
}

/// Structured extraction from a dialogue transcript.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DistilledDialogue {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub insight_type: String,
    #[serde(default)]
    pub problem: String,
    #[serde(default)]
    pub thinking: Vec<String>,
    #[serde(default)]
    pub solution: String,
    #[serde(default)]
    pub result: Vec<String>,
    #[serde(default)]
    pub reproducible: bool,
    #[serde(default)]
    pub applicable_to: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl DistilledDialogue {
    /// The structured record produced when distillation fails.
    pub fn failed(raw: &str) -> Self {
        Self {
            summary: "对话提炼失败".to_string(),
            insight_type: "solution".to_string(),
            solution: truncate_chars(raw, 2000),
            ..Self::default()
        }
    }
}

/// How a new block relates to an existing similar one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArbitrationDecision {
    Replace,
    Supplement,
    Conflict,
    Unrelated,
}

impl ArbitrationDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Replace => "replace",
            Self::Supplement => "supplement",
            Self::Conflict => "conflict",
            Self::Unrelated => "unrelated",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RerankItem {
    pub index: usize,
    pub relevance_score: f64,
}

struct CacheEntry<T> {
    value: T,
    expires: Instant,
}

/// TTL + capacity bounded cache. Values are cloned on both read and write
/// so callers never alias cache-owned data.
struct TtlCache<T: Clone> {
    entries: Mutex<HashMap<String, CacheEntry<T>>>,
}

impl<T: Clone> TtlCache<T> {
    fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn get(&self, key: &str) -> Option<T> {
        let mut entries = self.entries.lock().expect("llm cache poisoned");
        let now = Instant::now();
        match entries.get(key) {
            Some(entry) if entry.expires > now => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn set(&self, key: String, value: T) {
        let mut entries = self.entries.lock().expect("llm cache poisoned");
        let now = Instant::now();
        if entries.len() >= LLM_CACHE_MAX_ENTRIES {
            entries.retain(|_, entry| entry.expires > now);
            if entries.len() >= LLM_CACHE_MAX_ENTRIES {
                let target = LLM_CACHE_MAX_ENTRIES - LLM_CACHE_MAX_ENTRIES / 10;
                let excess = entries.len().saturating_sub(target);
                let doomed: Vec<String> = entries.keys().take(excess).cloned().collect();
                for key in doomed {
                    entries.remove(&key);
                }
            }
        }
        entries.insert(
            key,
            CacheEntry {
                value,
                expires: now + LLM_CACHE_TTL,
            },
        );
    }
}

/// Client for the six pipeline capabilities plus tag extraction.
pub struct LlmClient {
    settings: Settings,
    api_key: Option<String>,
    mock: bool,
    client: reqwest::Client,
    summary_cache: TtlCache<String>,
    tags_cache: TtlCache<Vec<String>>,
    route_cache: TtlCache<String>,
}

impl LlmClient {
    pub fn new(settings: &Settings) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_default();
        Self {
            settings: settings.clone(),
            api_key: settings.llm_api_key(),
            mock: Settings::llm_mock_mode(),
            client,
            summary_cache: TtlCache::new(),
            tags_cache: TtlCache::new(),
            route_cache: TtlCache::new(),
        }
    }

    /// Compress a document into a 3-5 sentence summary. Empty on failure.
    pub async fn summarize(&self, content: &str) -> String {
        if self.mock {
            return mock_summary(content);
        }
        let model = self.settings.llm.model_summary.trim().to_string();
        let key = cache_key("summary", &model, content);
        if let Some(cached) = self.summary_cache.get(&key) {
            return cached;
        }
        let prompt = format!(
            "请将以下文档内容压缩为 3-5 句摘要，突出核心结论。\n\n内容：\n{}",
            truncate_chars(content, 12000)
        );
        let Ok(raw) = self.chat(&model, &prompt, 0.2, 400).await else {
            return String::new();
        };
        let result = raw.trim().to_string();
        if !result.is_empty() {
            self.summary_cache.set(key, result.clone());
        }
        result
    }

    /// Extract 3-10 short tags; falls back to a lexical split.
    pub async fn extract_tags(&self, content: &str) -> Vec<String> {
        if self.mock {
            return fallback_tags(content);
        }
        let model = self.settings.llm.model_summary.trim().to_string();
        let key = cache_key("tags", &model, content);
        if let Some(cached) = self.tags_cache.get(&key) {
            return cached;
        }
        let prompt = format!(
            "请从以下文本中提取 3-10 个简短标签，输出 JSON 数组（字符串列表），不要输出其他内容。\n\n文本：\n{}",
            truncate_chars(content, 8000)
        );
        let result = match self.chat(&model, &prompt, 0.2, 200).await {
            Ok(raw) => {
                let cleaned = strip_code_fence(&raw);
                match serde_json::from_str::<Vec<String>>(cleaned) {
                    Ok(tags) => normalize_tags(&tags),
                    Err(_) => fallback_tags(&raw),
                }
            }
            Err(_) => fallback_tags(content),
        };
        if !result.is_empty() {
            self.tags_cache.set(key, result.clone());
        }
        result
    }

    /// Extract `{keyword, relation_type}` hints; empty on failure. Hints
    /// with unknown relation types or blank keywords are dropped.
    pub async fn extract_relations(&self, content: &str) -> Vec<RelationHint> {
        if self.mock {
            return Vec::new();
        }
        let model = self.settings.llm.model_relation.trim().to_string();
        let prompt = format!(
            "请从以下文档中识别它引用或依赖的其他主题关键词，输出 JSON 数组，每项为 \
             {{\"keyword\": \"...\", \"relation_type\": \"...\"}}，relation_type 只能取 {}。\
             不要输出其他内容。\n\n文档：\n{}",
            RELATION_TYPES.join("/"),
            truncate_chars(content, 8000)
        );
        let Ok(raw) = self.chat(&model, &prompt, 0.2, 300).await else {
            return Vec::new();
        };
        let cleaned = strip_code_fence(&raw);
        let Ok(hints) = serde_json::from_str::<Vec<RelationHint>>(cleaned) else {
            return Vec::new();
        };
        hints
            .into_iter()
            .filter(|hint| {
                !hint.keyword.trim().is_empty() && is_valid_relation_type(&hint.relation_type)
            })
            .collect()
    }

    /// Classify a query into a retrieval strategy.
    pub async fn route_query(&self, query: &str) -> QueryRoute {
        let intent = self.route_intent(query).await;
        QueryRoute::for_intent(intent)
    }

    async fn route_intent(&self, query: &str) -> QueryIntent {
        if self.mock {
            return fallback_intent(query);
        }
        let model = self.settings.llm.model_route.trim().to_string();
        let key = cache_key("route", &model, query);
        if let Some(cached) = self.route_cache.get(&key) {
            if let Some(intent) = QueryIntent::parse(&cached) {
                return intent;
            }
        }
        let prompt = format!(
            "判断下面检索问题的意图，只输出一个词：progress / decision / howto / debug / background。\n\n问题：{}",
            truncate_chars(query, 2000)
        );
        match self.chat(&model, &prompt, 0.1, 20).await {
            Ok(raw) => {
                let intent = QueryIntent::parse(&raw).unwrap_or_else(|| fallback_intent(query));
                self.route_cache.set(key, intent.as_str().to_string());
                intent
            }
            Err(_) => fallback_intent(query),
        }
    }

    /// Distill a dialogue transcript into a structured insight.
    pub async fn distill(&self, content: &str, project_id: &str) -> DistilledDialogue {
        if self.mock {
            return DistilledDialogue::failed(content);
        }
        let model = self.settings.llm.model_distill.trim().to_string();
        let prompt = format!(
            "你是知识提炼器。请从以下对话记录中提炼结构化知识，只输出 JSON：\n\
             {{\"summary\": \"3-5 句摘要\", \"insight_type\": \"solution/lesson/pattern/decision\", \
             \"problem\": \"...\", \"thinking\": [\"...\"], \"solution\": \"...\", \
             \"result\": [\"...\"], \"reproducible\": true, \"applicable_to\": [\"...\"], \
             \"tags\": [\"...\"]}}\n\n项目：{}\n\n对话：\n{}",
            project_id,
            truncate_chars(content, 12000)
        );
        let Ok(raw) = self.chat(&model, &prompt, 0.3, 1000).await else {
            return DistilledDialogue::failed(content);
        };
        let cleaned = strip_code_fence(&raw);
        match serde_json::from_str::<DistilledDialogue>(cleaned) {
            Ok(distilled) => distilled,
            Err(err) => {
                debug!("distill decode failed: {err}");
                DistilledDialogue::failed(content)
            }
        }
    }

    /// Decide how new content relates to an existing similar block.
    ///
    /// Mock mode uses a word-overlap heuristic (identical or heavily
    /// overlapping content reads as a replacement) and honors the
    /// `AGENT_MEM_MOCK_ARBITRATE` override so tests can force a branch.
    pub async fn arbitrate_conflict(
        &self,
        new_content: &str,
        old_content: &str,
    ) -> ArbitrationDecision {
        if self.mock {
            if let Ok(forced) = std::env::var("AGENT_MEM_MOCK_ARBITRATE") {
                if let Some(decision) = parse_arbitration(&forced) {
                    return decision;
                }
            }
            return mock_arbitrate(new_content, old_content);
        }
        let model = self.settings.llm.model_arbitrate.trim().to_string();
        let prompt = format!(
            "你是知识库管理员。判断新内容与已有内容的关系，只输出一个词：\n\
             REPLACE（新内容是旧内容的更新版本，应取代旧内容）\n\
             SUPPLEMENT（新内容是补充，两者都保留）\n\
             CONFLICT（两者矛盾，需要人工甄别）\n\
             UNRELATED（只是表述相似，主题无关）\n\n\
             【已有内容】\n{}\n\n【新内容】\n{}",
            truncate_chars(old_content, 4000),
            truncate_chars(new_content, 4000)
        );
        match self.chat(&model, &prompt, 0.1, 20).await {
            Ok(raw) => parse_arbitration(&raw).unwrap_or(ArbitrationDecision::Supplement),
            Err(_) => ArbitrationDecision::Supplement,
        }
    }

    /// Rerank documents against a query. `None` means "keep original order".
    pub async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_n: usize,
    ) -> Option<Vec<RerankItem>> {
        if self.mock || documents.is_empty() {
            return None;
        }
        let model = self.settings.rerank.model.trim();
        if model.is_empty() {
            warn!("rerank requested without a configured model");
            return None;
        }
        let top_n = if top_n == 0 {
            self.settings.rerank.top_n
        } else {
            top_n
        };
        let url = format!(
            "{}/rerank",
            self.settings.llm.base_url.trim_end_matches('/')
        );
        let body = RerankRequest {
            model: model.to_string(),
            query: query.to_string(),
            documents: documents.to_vec(),
            top_n,
        };
        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                warn!("rerank request failed: {err}");
                return None;
            }
        };
        if !response.status().is_success() {
            warn!("rerank returned {}", response.status());
            return None;
        }
        let payload: RerankResponse = match response.json().await {
            Ok(payload) => payload,
            Err(err) => {
                warn!("rerank decode failed: {err}");
                return None;
            }
        };
        let mut items: Vec<RerankItem> = payload
            .results
            .into_iter()
            .map(|item| RerankItem {
                index: item.index,
                relevance_score: item.relevance_score,
            })
            .collect();
        items.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        if items.is_empty() {
            None
        } else {
            Some(items)
        }
    }

    /// The model used for arbitration, recorded in the audit log.
    pub fn arbitrate_model(&self) -> String {
        if self.mock {
            "mock".to_string()
        } else {
            self.settings.llm.model_arbitrate.clone()
        }
    }

    async fn chat(
        &self,
        model: &str,
        prompt: &str,
        temperature: f64,
        max_tokens: u32,
    ) -> Result<String, String> {
        if model.is_empty() {
            return Err("缺少模型配置".to_string());
        }
        let url = format!(
            "{}/chat/completions",
            self.settings.llm.base_url.trim_end_matches('/')
        );
        let body = ChatCompletionsRequest {
            model: model.to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature,
            max_tokens,
        };
        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await.map_err(|err| err.to_string())?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(format!("llm request failed: {status} {text}"));
        }
        let payload: ChatCompletionsResponse =
            response.json().await.map_err(|err| err.to_string())?;
        payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| "llm response missing content".to_string())
    }
}

fn cache_key(prefix: &str, model: &str, content: &str) -> String {
    format!("{prefix}:{}", md5_hex(&format!("{model}|{content}")))
}

/// Unwrap a ```-fenced answer down to its payload.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }
    let inner = trimmed.trim_matches('`').trim();
    inner.strip_prefix("json").map(str::trim).unwrap_or(inner)
}

fn parse_arbitration(raw: &str) -> Option<ArbitrationDecision> {
    let upper = raw.trim().to_uppercase();
    if upper.contains("REPLACE") {
        Some(ArbitrationDecision::Replace)
    } else if upper.contains("CONFLICT") {
        Some(ArbitrationDecision::Conflict)
    } else if upper.contains("UNRELATED") {
        Some(ArbitrationDecision::Unrelated)
    } else if upper.contains("SUPPLEMENT") {
        Some(ArbitrationDecision::Supplement)
    } else {
        None
    }
}

fn mock_arbitrate(new_content: &str, old_content: &str) -> ArbitrationDecision {
    if new_content.trim() == old_content.trim() {
        return ArbitrationDecision::Replace;
    }
    let old_words: std::collections::HashSet<&str> = old_content.split_whitespace().collect();
    let new_words: Vec<&str> = new_content.split_whitespace().collect();
    if new_words.is_empty() || old_words.is_empty() {
        return ArbitrationDecision::Supplement;
    }
    let overlap = new_words.iter().filter(|w| old_words.contains(**w)).count();
    if overlap as f64 / new_words.len() as f64 > 0.5 {
        ArbitrationDecision::Replace
    } else {
        ArbitrationDecision::Supplement
    }
}

/// First three non-empty lines, joined. Deterministic mock summary.
fn mock_summary(content: &str) -> String {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(3)
        .collect::<Vec<_>>()
        .join("；")
}

fn fallback_tags(content: &str) -> Vec<String> {
    let candidates: Vec<String> = content
        .split(|c: char| !c.is_alphanumeric())
        .filter(|item| item.chars().count() >= 2)
        .take(10)
        .map(str::to_string)
        .collect();
    normalize_tags(&candidates)
}

fn fallback_intent(query: &str) -> QueryIntent {
    let q = query.to_lowercase();
    const PROGRESS: [&str; 6] = ["进度", "本周", "周报", "progress", "status", "最近"];
    const DEBUG: [&str; 8] = ["报错", "错误", "异常", "排查", "bug", "error", "fail", "debug"];
    const HOWTO: [&str; 7] = ["如何", "怎么", "怎样", "部署", "how to", "how do", "deploy"];
    const DECISION: [&str; 7] = ["为什么", "决策", "选型", "架构", "方案", "decision", "architecture"];

    if PROGRESS.iter().any(|kw| q.contains(kw)) {
        QueryIntent::Progress
    } else if DEBUG.iter().any(|kw| q.contains(kw)) {
        QueryIntent::Debug
    } else if HOWTO.iter().any(|kw| q.contains(kw)) {
        QueryIntent::Howto
    } else if DECISION.iter().any(|kw| q.contains(kw)) {
        QueryIntent::Decision
    } else {
        QueryIntent::Background
    }
}

// ── wire types ────────────────────────────────────────────────────

#[derive(Debug, serde::Serialize)]
struct ChatCompletionsRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, serde::Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, serde::Serialize)]
struct RerankRequest {
    model: String,
    query: String,
    documents: Vec<String>,
    top_n: usize,
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Debug, Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_table_matches_intents() {
        let route = QueryRoute::for_intent(QueryIntent::Progress);
        assert_eq!(route.doc_types, vec!["progress", "issue"]);
        assert!(!route.must_latest);
        assert_eq!(route.time_filter_days, Some(3));
        assert_eq!(route.order_by, OrderBy::TimeDesc);

        let route = QueryRoute::for_intent(QueryIntent::Howto);
        assert!(route.must_latest);
        assert_eq!(route.order_by, OrderBy::Relevance);

        let route = QueryRoute::for_intent(QueryIntent::Decision);
        assert!(route.doc_types.contains(&"insight".to_string()));
        assert!(route.doc_types.contains(&"dialogue_extract".to_string()));
    }

    #[test]
    fn fallback_intent_keywords() {
        assert_eq!(fallback_intent("本周进度如何"), QueryIntent::Progress);
        assert_eq!(fallback_intent("部署时报错了"), QueryIntent::Debug);
        assert_eq!(fallback_intent("如何部署到生产"), QueryIntent::Howto);
        assert_eq!(fallback_intent("为什么选 Postgres"), QueryIntent::Decision);
        assert_eq!(fallback_intent("项目背景"), QueryIntent::Background);
    }

    #[test]
    fn fallback_tags_filter_short_tokens() {
        let tags = fallback_tags("db, a, cache layer!! x");
        assert_eq!(tags, vec!["db", "cache", "layer"]);

        let many = fallback_tags(&"word ".repeat(30));
        assert_eq!(many, vec!["word"]);
    }

    #[test]
    fn strip_code_fence_variants() {
        assert_eq!(strip_code_fence("[1, 2]"), "[1, 2]");
        assert_eq!(strip_code_fence("```json\n[1, 2]\n```"), "[1, 2]");
        assert_eq!(strip_code_fence("```\n{\"a\": 1}\n```"), "{\"a\": 1}");
    }

    #[test]
    fn arbitration_parsing() {
        assert_eq!(parse_arbitration(" REPLACE "), Some(ArbitrationDecision::Replace));
        assert_eq!(parse_arbitration("conflict"), Some(ArbitrationDecision::Conflict));
        assert_eq!(parse_arbitration("UNRELATED."), Some(ArbitrationDecision::Unrelated));
        assert_eq!(parse_arbitration("supplement"), Some(ArbitrationDecision::Supplement));
        assert_eq!(parse_arbitration("dunno"), None);
    }

    #[test]
    fn mock_arbitrate_heuristic() {
        assert_eq!(
            mock_arbitrate("same text here", "same text here"),
            ArbitrationDecision::Replace
        );
        assert_eq!(
            mock_arbitrate("alpha beta gamma delta", "alpha beta gamma epsilon"),
            ArbitrationDecision::Replace
        );
        assert_eq!(
            mock_arbitrate("entirely different topic", "alpha beta gamma"),
            ArbitrationDecision::Supplement
        );
    }

    #[test]
    fn distill_failure_record_truncates_solution() {
        let raw = "x".repeat(3000);
        let failed = DistilledDialogue::failed(&raw);
        assert_eq!(failed.summary, "对话提炼失败");
        assert_eq!(failed.insight_type, "solution");
        assert_eq!(failed.solution.chars().count(), 2000);
        assert!(!failed.reproducible);
    }

    #[test]
    fn ttl_cache_isolates_values() {
        let cache: TtlCache<Vec<String>> = TtlCache::new();
        cache.set("k".to_string(), vec!["a".to_string()]);
        let mut first = cache.get("k").unwrap();
        first.push("mutated".to_string());
        assert_eq!(cache.get("k").unwrap(), vec!["a".to_string()]);
    }

    #[test]
    fn ttl_cache_bounds_capacity() {
        let cache: TtlCache<String> = TtlCache::new();
        for i in 0..LLM_CACHE_MAX_ENTRIES {
            cache.set(format!("k{i}"), "v".to_string());
        }
        cache.set("one-more".to_string(), "v".to_string());
        let len = cache.entries.lock().unwrap().len();
        assert!(len <= LLM_CACHE_MAX_ENTRIES - LLM_CACHE_MAX_ENTRIES / 10 + 1);
    }

    #[test]
    fn mock_summary_takes_first_three_lines() {
        let content = "\n# Title\n\nfirst\nsecond\nthird\nfourth";
        assert_eq!(mock_summary(content), "# Title；first；second");
    }
}
