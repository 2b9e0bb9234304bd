pub mod config_providers;
pub mod in_memory_store;

/// Re-export commonly used types from adapters
pub use config_providers::FileConfigProvider;
pub use in_memory_store::InMemoryWorkQueueStore;
