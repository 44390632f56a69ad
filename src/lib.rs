// Agents Monitor core
// Session lifecycle store for AI coding agents running in embedded terminals

pub mod bridge;
pub mod cli;
pub mod core;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use crate::core::{AgentType, Config, Session, SessionQuery, SessionStatus, SortOrder};
pub use crate::store::{SessionPersistence, SessionStoreHandle, StoreError};

// Error handling
pub use anyhow::{Error, Result};
