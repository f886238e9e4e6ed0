use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::state::AppState;
use crate::tools::Tool;

#[derive(Debug, Deserialize)]
struct GetObservationsInput {
    ids: Vec<String>,
}

pub struct GetObservationsTool;

#[async_trait::async_trait]
impl Tool for GetObservationsTool {
    fn name(&self) -> &str {
        "mem.get_observations"
    }

    fn description(&self) -> &str {
        "批量获取完整记忆详情"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "ids": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["ids"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, args: Value, state: &AppState) -> Result<String, String> {
        // A bare array is accepted as shorthand for {"ids": [...]}.
        let ids = if args.is_array() {
            serde_json::from_value::<Vec<String>>(args).map_err(|e| e.to_string())?
        } else {
            let input: GetObservationsInput =
                serde_json::from_value(args).map_err(|e| e.to_string())?;
            input.ids
        };
        if ids.is_empty() {
            return Ok("[]".to_string());
        }

        let rows = state
            .store
            .fetch_observations(&ids)
            .await
            .map_err(|e| e.to_string())?;
        let ordered = order_observations(rows, &ids);
        serde_json::to_string_pretty(&ordered).map_err(|e| e.to_string())
    }
}

/// Restore the caller's order; missing ids are dropped, not reordered.
fn order_observations(
    rows: Vec<agent_mem_knowledge::Observation>,
    ids: &[String],
) -> Vec<agent_mem_knowledge::Observation> {
    let mut by_id: HashMap<String, _> = rows
        .into_iter()
        .map(|row| (row.id.clone(), row))
        .collect();
    ids.iter().filter_map(|id| by_id.remove(id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_mem_knowledge::Observation;

    fn observation(id: &str) -> Observation {
        Observation {
            id: id.to_string(),
            project_id: "p".to_string(),
            title: String::new(),
            content: String::new(),
            summary: String::new(),
            doc_type: String::new(),
            knowledge_type: "doc".to_string(),
            insight_type: String::new(),
            file_path: String::new(),
            relative_path: String::new(),
            tags: Vec::new(),
            structured_content: None,
            related_ids: None,
            version: 1,
            is_latest: true,
            status: "active".to_string(),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn output_order_matches_input_order() {
        let rows = vec![observation("a"), observation("b"), observation("c")];
        let ids = vec!["c".to_string(), "a".to_string(), "b".to_string()];
        let ordered = order_observations(rows, &ids);
        let got: Vec<&str> = ordered.iter().map(|row| row.id.as_str()).collect();
        assert_eq!(got, vec!["c", "a", "b"]);
    }

    #[test]
    fn missing_ids_are_dropped_not_reordered() {
        let rows = vec![observation("a"), observation("b")];
        let ids = vec![
            "missing".to_string(),
            "b".to_string(),
            "a".to_string(),
            "gone".to_string(),
        ];
        let ordered = order_observations(rows, &ids);
        let got: Vec<&str> = ordered.iter().map(|row| row.id.as_str()).collect();
        assert_eq!(got, vec!["b", "a"]);
    }
}
