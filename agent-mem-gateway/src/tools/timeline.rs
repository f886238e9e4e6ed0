use serde::Deserialize;
use serde_json::{json, Value};

use agent_mem_knowledge::SearchRequest;

use crate::state::AppState;
use crate::tools::Tool;

const DEFAULT_DAYS: i64 = 3;
const DEFAULT_LIMIT: i64 = 10;

#[derive(Debug, Deserialize)]
struct TimelineInput {
    project_id: Option<String>,
    anchor_id: Option<String>,
    query: Option<String>,
    days: Option<i64>,
    limit: Option<i64>,
}

pub struct TimelineTool;

#[async_trait::async_trait]
impl Tool for TimelineTool {
    fn name(&self) -> &str {
        "mem.timeline"
    }

    fn description(&self) -> &str {
        "按时间窗口获取上下文列表"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "project_id": {"type": "string"},
                "anchor_id": {"type": "string"},
                "query": {"type": "string", "description": "无 anchor_id 时用于定位锚点"},
                "days": {"type": "integer", "minimum": 1},
                "limit": {"type": "integer", "minimum": 1}
            },
            "additionalProperties": false
        })
    }

    async fn execute(&self, args: Value, state: &AppState) -> Result<String, String> {
        let input: TimelineInput = serde_json::from_value(args).map_err(|e| e.to_string())?;

        let mut anchor_id = input
            .anchor_id
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_string();
        if anchor_id.is_empty() {
            if let Some(query) = input.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
                let hits = state
                    .searcher
                    .search(SearchRequest {
                        query: query.to_string(),
                        project_id: input.project_id.clone(),
                        limit: Some(1),
                        use_routing: Some(true),
                        ..Default::default()
                    })
                    .await
                    .map_err(|e| e.to_string())?;
                if let Some(first) = hits.first() {
                    anchor_id = first.id.clone();
                }
            }
        }
        if anchor_id.is_empty() {
            return Ok("[]".to_string());
        }

        let Some(anchor) = state
            .store
            .fetch_anchor(&anchor_id)
            .await
            .map_err(|e| e.to_string())?
        else {
            return Ok("[]".to_string());
        };

        let days = input.days.filter(|d| *d > 0).unwrap_or(DEFAULT_DAYS);
        let limit = input.limit.filter(|l| *l > 0).unwrap_or(DEFAULT_LIMIT);
        let project_id = input
            .project_id
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| anchor.project_id.clone());

        let anchor_time = anchor.anchor_time();
        let window = chrono::Duration::days(days);
        let entries = state
            .store
            .fetch_timeline(&project_id, anchor_time - window, anchor_time + window, limit)
            .await
            .map_err(|e| e.to_string())?;
        serde_json::to_string_pretty(&entries).map_err(|e| e.to_string())
    }
}
