//! Shared configuration types for agent-mem.

pub mod config;

pub use config::{
    ConfigError, EmbeddingProviderKind, EmbeddingSettings, LlmSettings, ProjectSettings,
    RerankSettings, Settings, StorageSettings, VersioningSettings, WatcherSettings,
};
