use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// One tracked agent run. The store owns the canonical copy; everything the
/// CLI or a front-end sees is a clone obtained through store operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: Uuid,
    pub name: String,
    pub status: SessionStatus,
    pub agent_type: AgentType,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default)]
    pub metrics: SessionMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub is_external_process: bool,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_terminal_output",
        deserialize_with = "deserialize_terminal_output",
        default
    )]
    pub terminal_output: Option<Vec<u8>>,
}

// Raw terminal bytes are kept as base64 in the persisted JSON so the
// documents stay valid UTF-8 regardless of what the agent printed.
fn serialize_terminal_output<S>(data: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match data {
        Some(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
        None => serializer.serialize_none(),
    }
}

fn deserialize_terminal_output<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    match opt {
        Some(s) => STANDARD
            .decode(&s)
            .map(Some)
            .map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

impl Session {
    pub fn new(name: String, agent_type: AgentType) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            status: SessionStatus::Waiting,
            agent_type,
            started_at: Utc::now(),
            ended_at: None,
            messages: Vec::new(),
            tool_calls: Vec::new(),
            metrics: SessionMetrics::default(),
            working_directory: None,
            process_id: None,
            error_message: None,
            is_external_process: false,
            terminal_output: None,
        }
    }

    /// Move to a new status, maintaining the `ended_at` invariant:
    /// set exactly once when entering a terminal state, cleared on retry.
    pub fn set_status(&mut self, status: SessionStatus) {
        self.status = status;
        if status.is_terminal() {
            if self.ended_at.is_none() {
                self.ended_at = Some(Utc::now());
            }
            self.process_id = None;
        } else {
            self.ended_at = None;
        }
    }

    pub fn duration_secs(&self) -> f64 {
        let end = self.ended_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds() as f64 / 1000.0
    }

    pub fn formatted_duration(&self) -> String {
        let secs = self.duration_secs();
        if secs < 60.0 {
            format!("{:.0}s", secs)
        } else if secs < 3600.0 {
            format!("{}m {}s", (secs / 60.0) as i32, (secs % 60.0) as i32)
        } else {
            let hours = (secs / 3600.0) as i32;
            let mins = ((secs % 3600.0) / 60.0) as i32;
            format!("{}h {}m", hours, mins)
        }
    }
}

/// Light projection of a session for list views, without the message,
/// tool-call and terminal-output payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: Uuid,
    pub name: String,
    pub status: SessionStatus,
    pub agent_type: AgentType,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metrics: SessionMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub is_external_process: bool,
}

impl From<&Session> for SessionSummary {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id,
            name: session.name.clone(),
            status: session.status,
            agent_type: session.agent_type,
            started_at: session.started_at,
            ended_at: session.ended_at,
            metrics: session.metrics.clone(),
            working_directory: session.working_directory.clone(),
            error_message: session.error_message.clone(),
            is_external_process: session.is_external_process,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Waiting,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    /// Terminal states: once entered, the session only leaves via `retry`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Live states drive the active/other partition in filtered views.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Running | Self::Waiting)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Waiting => "Waiting",
            Self::Running => "Running",
            Self::Paused => "Paused",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "waiting" => Ok(Self::Waiting),
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            other => Err(format!("unknown session status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentType {
    #[serde(alias = "Claude Code", alias = "claudeCode")]
    ClaudeCode,
    #[serde(alias = "codex")]
    Codex,
    #[serde(alias = "Custom Agent", alias = "custom")]
    Custom,
}

impl AgentType {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::ClaudeCode => "Claude Code",
            Self::Codex => "Codex",
            Self::Custom => "Custom Agent",
        }
    }

    pub fn default_executable(&self) -> &'static str {
        match self {
            Self::ClaudeCode => "claude",
            Self::Codex => "codex",
            Self::Custom => "agent",
        }
    }

    /// Executable names probed during resolution, most specific first.
    pub fn executable_names(&self) -> Vec<&'static str> {
        match self {
            Self::ClaudeCode => vec!["claude", "claude-code", "claude_code"],
            Self::Codex => vec!["codex", "openai-codex"],
            Self::Custom => vec!["agent"],
        }
    }

    pub fn default_args(&self) -> Vec<&'static str> {
        match self {
            Self::ClaudeCode => vec![],
            Self::Codex => vec!["--no-alt-screen"],
            Self::Custom => vec![],
        }
    }

    /// Whether sessions of this agent get a PTY-backed terminal attached.
    pub fn is_terminal_based(&self) -> bool {
        matches!(self, Self::ClaudeCode | Self::Codex)
    }
}

impl std::str::FromStr for AgentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "claude" | "claude-code" | "claudecode" => Ok(Self::ClaudeCode),
            "codex" => Ok(Self::Codex),
            "custom" | "agent" => Ok(Self::Custom),
            other => Err(format!("unknown agent type '{}'", other)),
        }
    }
}

/// Role-tagged content chunk; insertion order is significant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_use_id: Option<Uuid>,
}

impl Message {
    pub fn new(role: MessageRole, content: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content,
            timestamp: Utc::now(),
            tool_use_id: None,
        }
    }

    pub fn user(content: String) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: String) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    pub fn system(content: String) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn tool(content: String, tool_use_id: Uuid) -> Self {
        Self {
            tool_use_id: Some(tool_use_id),
            ..Self::new(MessageRole::Tool, content)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Tool,
}

/// One tool invocation inside a session, with its own sub-lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    pub id: Uuid,
    pub name: String,
    pub input: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub status: ToolCallStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolCall {
    pub fn new(name: String, input: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            input,
            output: None,
            started_at: Utc::now(),
            completed_at: None,
            status: ToolCallStatus::Running,
            error: None,
        }
    }

    pub fn complete(&mut self, output: String) {
        self.output = Some(output);
        self.completed_at = Some(Utc::now());
        self.status = ToolCallStatus::Completed;
    }

    pub fn fail(&mut self, error: String) {
        self.error = Some(error);
        self.completed_at = Some(Utc::now());
        self.status = ToolCallStatus::Failed;
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.completed_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }

    pub fn formatted_duration(&self) -> String {
        match self.duration_ms() {
            Some(ms) if ms < 1000 => format!("{}ms", ms),
            Some(ms) => format!("{:.2}s", ms as f64 / 1000.0),
            None => "...".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolCallStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Monotonically accumulating counters. Nothing here ever decreases
/// except through an explicit `reset`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetrics {
    #[serde(default)]
    pub total_tokens: i64,
    #[serde(default)]
    pub input_tokens: i64,
    #[serde(default)]
    pub output_tokens: i64,
    #[serde(default)]
    pub cache_read_tokens: i64,
    #[serde(default)]
    pub cache_write_tokens: i64,
    #[serde(default)]
    pub api_calls: i32,
    #[serde(default)]
    pub tool_call_count: i32,
    #[serde(default)]
    pub error_count: i32,
}

impl SessionMetrics {
    pub fn apply(&mut self, delta: &MetricsDelta) {
        self.input_tokens += delta.input_tokens;
        self.output_tokens += delta.output_tokens;
        self.total_tokens += delta.input_tokens + delta.output_tokens;
        self.cache_read_tokens += delta.cache_read_tokens;
        self.cache_write_tokens += delta.cache_write_tokens;
        self.api_calls += delta.api_calls;
        self.error_count += delta.errors;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn formatted_tokens(&self) -> String {
        let total = self.total_tokens;
        if total >= 1_000_000 {
            format!("{:.1}M", total as f64 / 1_000_000.0)
        } else if total >= 1_000 {
            format!("{:.1}K", total as f64 / 1_000.0)
        } else {
            total.to_string()
        }
    }
}

/// Increment applied to a session's metrics in one store operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsDelta {
    #[serde(default)]
    pub input_tokens: i64,
    #[serde(default)]
    pub output_tokens: i64,
    #[serde(default)]
    pub cache_read_tokens: i64,
    #[serde(default)]
    pub cache_write_tokens: i64,
    #[serde(default)]
    pub api_calls: i32,
    #[serde(default)]
    pub errors: i32,
}
