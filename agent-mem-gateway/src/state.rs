use std::sync::Arc;

use agent_mem_knowledge::{Ingester, KnowledgeStore, Searcher, Settings};

/// Shared handles for tool execution.
pub struct AppState {
    pub settings: Settings,
    pub store: KnowledgeStore,
    pub ingester: Arc<Ingester>,
    pub searcher: Arc<Searcher>,
}

impl AppState {
    /// Machine identity attached to tool-initiated ingests.
    pub fn machine_id(&self) -> String {
        std::env::var("HOST_ID").unwrap_or_else(|_| "agent-mem".to_string())
    }
}
