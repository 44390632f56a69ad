pub mod pty;
pub mod resolver;

use std::path::PathBuf;

use async_trait::async_trait;
use uuid::Uuid;

use crate::core::AgentType;

pub use pty::PtyBridge;
pub use resolver::AgentResolver;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("executable not found for {0}")]
    ExecutableNotFound(&'static str),
    #[error("process spawn failed: {0}")]
    SpawnFailed(String),
    #[error("no backing process for session {0}")]
    NoProcess(Uuid),
    #[error("PTY error: {0}")]
    Pty(String),
    #[error("signal delivery failed for session {0}")]
    Signal(Uuid),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Out-of-band events pushed from the bridge toward the store. Chunks for
/// one session arrive in production order; different sessions have no
/// relative ordering guarantee.
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    Output { session_id: Uuid, bytes: Vec<u8> },
    Ended { session_id: Uuid },
}

/// Opaque service boundary over the per-session child processes. The store
/// never touches a process table directly; it only issues these commands
/// and consumes `BridgeEvent`s.
#[async_trait]
pub trait TerminalBridge: Send + Sync {
    /// Spawn the agent process for a session and return its pid.
    async fn spawn(
        &self,
        session_id: Uuid,
        agent_type: AgentType,
        working_directory: PathBuf,
        override_executable: Option<String>,
    ) -> Result<i32, BridgeError>;

    async fn write(&self, session_id: Uuid, data: &[u8]) -> Result<(), BridgeError>;

    async fn resize(&self, session_id: Uuid, rows: u16, cols: u16) -> Result<(), BridgeError>;

    /// Stop the process without killing it (pause).
    async fn suspend(&self, session_id: Uuid) -> Result<(), BridgeError>;

    /// Continue a suspended process (resume).
    async fn resume(&self, session_id: Uuid) -> Result<(), BridgeError>;

    async fn terminate(&self, session_id: Uuid) -> Result<(), BridgeError>;
}

/// Bridge that backs no real process. Used for non-terminal agent types
/// and as the collaborator in store tests.
#[derive(Debug, Default)]
pub struct NullBridge;

#[async_trait]
impl TerminalBridge for NullBridge {
    async fn spawn(
        &self,
        _session_id: Uuid,
        _agent_type: AgentType,
        _working_directory: PathBuf,
        _override_executable: Option<String>,
    ) -> Result<i32, BridgeError> {
        Ok(0)
    }

    async fn write(&self, _session_id: Uuid, _data: &[u8]) -> Result<(), BridgeError> {
        Ok(())
    }

    async fn resize(&self, _session_id: Uuid, _rows: u16, _cols: u16) -> Result<(), BridgeError> {
        Ok(())
    }

    async fn suspend(&self, _session_id: Uuid) -> Result<(), BridgeError> {
        Ok(())
    }

    async fn resume(&self, _session_id: Uuid) -> Result<(), BridgeError> {
        Ok(())
    }

    async fn terminate(&self, _session_id: Uuid) -> Result<(), BridgeError> {
        Ok(())
    }
}
