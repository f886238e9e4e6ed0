//! Tool dispatcher and server for agent-mem.

pub mod server;
pub mod state;
pub mod tools;

pub use state::AppState;
pub use tools::{Tool, ToolManager};
