use serde::Deserialize;
use serde_json::{json, Value};

use agent_mem_knowledge::SearchRequest;

use crate::state::AppState;
use crate::tools::Tool;

#[derive(Debug, Deserialize)]
struct SearchInput {
    query: String,
    project_id: Option<String>,
    #[serde(default)]
    doc_types: Vec<String>,
    #[serde(default)]
    knowledge_types: Vec<String>,
    limit: Option<usize>,
    use_routing: Option<bool>,
    use_rerank: Option<bool>,
}

pub struct SearchTool;

#[async_trait::async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "mem.search"
    }

    fn description(&self) -> &str {
        "语义检索知识索引（默认使用意图路由）"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "检索问题"},
                "project_id": {"type": "string"},
                "doc_types": {"type": "array", "items": {"type": "string"}},
                "knowledge_types": {"type": "array", "items": {"type": "string"}},
                "limit": {"type": "integer", "minimum": 1},
                "use_routing": {"type": "boolean"},
                "use_rerank": {"type": "boolean"}
            },
            "required": ["query"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, args: Value, state: &AppState) -> Result<String, String> {
        let input: SearchInput = serde_json::from_value(args).map_err(|e| e.to_string())?;
        let request = SearchRequest {
            query: input.query,
            project_id: input.project_id,
            doc_types: input.doc_types,
            knowledge_types: input.knowledge_types,
            limit: input.limit,
            use_routing: input.use_routing,
            use_rerank: input.use_rerank,
        };
        let hits = state
            .searcher
            .search(request)
            .await
            .map_err(|e| e.to_string())?;
        serde_json::to_string_pretty(&hits).map_err(|e| e.to_string())
    }
}
