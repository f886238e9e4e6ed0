use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of knowledge a block carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeType {
    Doc,
    Insight,
    DialogueExtract,
}

impl KnowledgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Doc => "doc",
            Self::Insight => "insight",
            Self::DialogueExtract => "dialogue_extract",
        }
    }
}

impl FromStr for KnowledgeType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "doc" => Ok(Self::Doc),
            "insight" => Ok(Self::Insight),
            "dialogue_extract" => Ok(Self::DialogueExtract),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for KnowledgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    File,
    Dialogue,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Dialogue => "dialogue",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockStatus {
    Active,
    Deprecated,
    Conflict,
}

impl BlockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Deprecated => "deprecated",
            Self::Conflict => "conflict",
        }
    }
}

/// Expiration policy attached at ingest time, keyed on doc type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecayRule {
    None,
    Time30d,
    VersionOnly,
}

impl DecayRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Time30d => "time_30d",
            Self::VersionOnly => "version_only",
        }
    }

    pub fn for_doc_type(doc_type: &str) -> Self {
        match doc_type {
            "progress" => Self::Time30d,
            "deployment" | "delivery" => Self::VersionOnly,
            _ => Self::None,
        }
    }

    pub fn expires_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Time30d => Some(now + chrono::Duration::days(30)),
            _ => None,
        }
    }
}

/// Result ordering for vector search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderBy {
    Relevance,
    TimeDesc,
}

pub const RELATION_TYPES: [&str; 5] =
    ["based_on", "references", "implements", "validates", "supersedes"];

pub fn is_valid_relation_type(value: &str) -> bool {
    RELATION_TYPES.contains(&value)
}

pub fn is_valid_insight_type(value: &str) -> bool {
    matches!(value, "solution" | "lesson" | "pattern" | "decision")
}

/// A resolved relation to another block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelatedId {
    pub id: String,
    #[serde(rename = "type")]
    pub relation_type: String,
    pub keyword: String,
}

/// Pipeline state carried from classification to persistence.
#[derive(Debug, Clone)]
pub struct KnowledgeIngest {
    pub project_id: String,
    pub project_name: String,
    pub machine_id: String,
    pub file_path: String,
    pub relative_path: String,
    pub raw_content_path: String,
    pub file_hash: String,
    pub title: String,
    pub content: String,
    pub summary: String,
    pub structured: Option<serde_json::Value>,
    pub knowledge_type: KnowledgeType,
    pub doc_type: String,
    pub insight_type: String,
    pub source_type: SourceType,
    pub category_l1: String,
    pub category_l2: String,
    pub category_l3: String,
    pub tags: Vec<String>,
    pub related_ids: Vec<RelatedId>,
    pub decay_rule: DecayRule,
    pub is_high_value: bool,
    pub reproducible: Option<bool>,
    pub applicable_to: Vec<String>,
}

impl KnowledgeIngest {
    /// Text fed to the embedder: the summary when present, else the body.
    pub fn summary_or_content(&self) -> &str {
        if self.summary.trim().is_empty() {
            &self.content
        } else {
            &self.summary
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    Ok,
    Skipped,
}

impl IngestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Skipped => "skipped",
        }
    }
}

/// Outcome of one ingest attempt.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub status: IngestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl IngestOutcome {
    pub fn ok(id: String) -> Self {
        Self {
            status: IngestStatus::Ok,
            reason: None,
            id: Some(id),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            status: IngestStatus::Skipped,
            reason: Some(reason.into()),
            id: None,
        }
    }
}

/// The latest row for a `(project_id, relative_path)` pair.
#[derive(Debug, Clone)]
pub struct LatestRecord {
    pub id: String,
    pub file_hash: String,
    pub version: i32,
}

/// One retrieval result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub title: String,
    pub file_path: String,
    pub summary: String,
    #[serde(skip_serializing)]
    pub content: String,
    pub doc_type: String,
    pub knowledge_type: String,
    pub project_id: String,
    pub score: f64,
    #[serde(skip_serializing_if = "is_false")]
    pub is_reranked: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// A semantically similar block considered during arbitration.
#[derive(Debug, Clone)]
pub struct SimilarCandidate {
    pub id: String,
    pub content: String,
    pub summary: String,
    pub similarity: f64,
}

/// Full block detail returned by `get_observations`.
#[derive(Debug, Clone, Serialize)]
pub struct Observation {
    pub id: String,
    pub project_id: String,
    pub title: String,
    pub content: String,
    pub summary: String,
    pub doc_type: String,
    pub knowledge_type: String,
    pub insight_type: String,
    pub file_path: String,
    pub relative_path: String,
    pub tags: Vec<String>,
    pub structured_content: Option<serde_json::Value>,
    pub related_ids: Option<serde_json::Value>,
    pub version: i32,
    pub is_latest: bool,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A row in a timeline window.
#[derive(Debug, Clone, Serialize)]
pub struct TimelineEntry {
    pub id: String,
    pub title: String,
    pub doc_type: String,
    pub knowledge_type: String,
    pub summary: String,
    pub anchor_time: DateTime<Utc>,
}

/// The anchor row a timeline window is centered on.
#[derive(Debug, Clone)]
pub struct AnchorRecord {
    pub id: String,
    pub project_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl AnchorRecord {
    pub fn anchor_time(&self) -> DateTime<Utc> {
        self.updated_at.unwrap_or(self.created_at)
    }
}
