pub mod get_observations;
pub mod search;
pub mod timeline;
pub mod write_memory;

use serde_json::Value;

use crate::state::AppState;

pub use get_observations::GetObservationsTool;
pub use search::SearchTool;
pub use timeline::TimelineTool;
pub use write_memory::WriteMemoryTool;

/// Trait that all memory tools implement.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Name of the tool (must match regex `^[a-zA-Z0-9_.-]{1,64}$`)
    fn name(&self) -> &str;

    /// Description of what the tool does
    fn description(&self) -> &str;

    /// JSON Schema for the tool's input
    fn input_schema(&self) -> Value;

    /// Execute the tool; returns a JSON document as a string.
    async fn execute(&self, args: Value, state: &AppState) -> Result<String, String>;
}

/// The four memory tools, dispatched by name.
pub struct ToolManager {
    tools: Vec<Box<dyn Tool>>,
}

impl Default for ToolManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolManager {
    pub fn new() -> Self {
        let tools: Vec<Box<dyn Tool>> = vec![
            Box::new(WriteMemoryTool),
            Box::new(SearchTool),
            Box::new(GetObservationsTool),
            Box::new(TimelineTool),
        ];
        Self { tools }
    }

    pub fn get_tools(&self) -> Vec<&dyn Tool> {
        self.tools.iter().map(|t| t.as_ref()).collect()
    }

    pub async fn execute(
        &self,
        name: &str,
        args: Value,
        state: &AppState,
    ) -> Result<String, String> {
        for tool in &self.tools {
            if tool.name() == name {
                return tool.execute(args, state).await;
            }
        }
        Err(format!("Unknown tool: {}", name))
    }
}
