use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use agent_mem_knowledge::classifier::load_project_meta;
use agent_mem_knowledge::parser::ensure_front_matter;
use agent_mem_knowledge::paths::{append_suffix, auto_relative_path, safe_resolve_path};
use agent_mem_knowledge::text::normalize_tags;
use agent_mem_knowledge::IngestStatus;

use crate::state::AppState;
use crate::tools::Tool;

#[derive(Debug, Deserialize)]
struct WriteMemoryInput {
    project_root: String,
    relative_path: Option<String>,
    content: String,
    knowledge_type: Option<String>,
    insight_type: Option<String>,
    tags: Option<Vec<String>>,
    overwrite: Option<bool>,
}

#[derive(Debug, Serialize)]
struct WriteMemoryOutput {
    status: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    file_path: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    relative_path: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    project_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    ingest_status: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    reason: String,
}

pub struct WriteMemoryTool;

#[async_trait::async_trait]
impl Tool for WriteMemoryTool {
    fn name(&self) -> &str {
        "mem.write_memory"
    }

    fn description(&self) -> &str {
        "写入结构化记忆并触发入库"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "project_root": {"type": "string", "description": "项目根目录"},
                "relative_path": {"type": "string", "description": "相对路径，可选"},
                "content": {"type": "string", "description": "Markdown 内容"},
                "knowledge_type": {"type": "string", "description": "doc/insight/dialogue_extract"},
                "insight_type": {"type": "string", "description": "solution/lesson/pattern/decision"},
                "tags": {"type": "array", "items": {"type": "string"}},
                "overwrite": {"type": "boolean", "description": "覆盖已有文件"}
            },
            "required": ["project_root", "content"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, args: Value, state: &AppState) -> Result<String, String> {
        let input: WriteMemoryInput = serde_json::from_value(args).map_err(|e| e.to_string())?;
        if input.project_root.trim().is_empty() {
            return Err("project_root 必填".to_string());
        }
        if input.content.trim().is_empty() {
            return Err("content 不能为空".to_string());
        }

        let knowledge_type = input.knowledge_type.unwrap_or_default();
        let insight_type = input.insight_type.unwrap_or_default();

        let relative_path = match input.relative_path.as_deref().map(str::trim) {
            Some(path) if !path.is_empty() => path.to_string(),
            _ => auto_relative_path(&input.content, &knowledge_type, &insight_type),
        };

        let resolved = safe_resolve_path(&input.project_root, &relative_path)
            .map_err(|e| e.to_string())?;
        let mut target = resolved.target;
        let mut relative = resolved.relative;
        if target.exists() && !input.overwrite.unwrap_or(false) {
            target = append_suffix(&target);
            relative = target
                .strip_prefix(&resolved.root)
                .map(|rel| rel.to_string_lossy().replace('\\', "/"))
                .unwrap_or(relative);
        }

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| e.to_string())?;
        }
        let tags = normalize_tags(&input.tags.unwrap_or_default());
        let final_content =
            ensure_front_matter(&input.content, &knowledge_type, &insight_type, &tags);
        tokio::fs::write(&target, final_content)
            .await
            .map_err(|e| e.to_string())?;

        let project = load_project_meta(&state.settings, &resolved.root).await;
        let mut output = WriteMemoryOutput {
            status: "ok".to_string(),
            file_path: target.to_string_lossy().to_string(),
            relative_path: relative,
            project_id: project.project_id,
            ingest_status: String::new(),
            reason: String::new(),
        };

        match state
            .ingester
            .ingest_file(&target, Some(resolved.root.as_path()), &state.machine_id())
            .await
        {
            Ok(outcome) => {
                output.ingest_status = outcome.status.as_str().to_string();
                output.reason = outcome.reason.unwrap_or_default();
                if outcome.status == IngestStatus::Ok {
                    output.reason = String::new();
                }
            }
            Err(err) => {
                output.ingest_status = "error".to_string();
                output.reason = err.to_string();
            }
        }

        serde_json::to_string_pretty(&output).map_err(|e| e.to_string())
    }
}
