pub mod buffer;
pub mod config;
pub mod filter;
pub mod session;

pub use buffer::{AttachHandle, AttachState, TerminalAttachment, TerminalBuffer, DEFAULT_BUFFER_CAP};
pub use config::Config;
pub use filter::{FilterCache, FilteredSessions, SessionQuery, SortOrder};
pub use session::{
    AgentType, Message, MessageRole, MetricsDelta, Session, SessionMetrics, SessionStatus,
    SessionSummary, ToolCall, ToolCallStatus,
};
