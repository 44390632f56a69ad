use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::bridge::{AgentResolver, PtyBridge};
use crate::core::{AgentType, SessionQuery, SessionStatus, SortOrder};
use crate::store::{SessionDirWatcher, SessionPersistence, SessionStoreHandle};
use crate::utils::path::{canonicalize_path, shorten_path_for_display};
use crate::{Config, Result, Session};

/// Load the persisted sessions and spawn a store wired to a PTY bridge.
async fn open_store(config: &Config) -> Result<SessionStoreHandle> {
    let persistence = SessionPersistence::new(config.storage.sessions_dir.clone());
    let sessions = persistence.load_all().await?;
    tracing::debug!("Loaded {} persisted sessions", sessions.len());

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let bridge = Arc::new(PtyBridge::new(event_tx));
    Ok(SessionStoreHandle::spawn(
        persistence,
        bridge,
        config.terminal.buffer_cap,
        sessions,
        event_rx,
    ))
}

fn parse_agent(agent: &str) -> Result<AgentType> {
    agent.parse::<AgentType>().map_err(crate::Error::msg)
}

fn parse_session_id(session_id: &str) -> Result<Uuid> {
    Uuid::parse_str(session_id)
        .map_err(|e| crate::Error::msg(format!("invalid session id '{}': {}", session_id, e)))
}

pub async fn run_session(
    config: Config,
    agent: String,
    dir: Option<PathBuf>,
    name: Option<String>,
) -> Result<()> {
    let agent_type = parse_agent(&agent)?;

    if AgentResolver::resolve(agent_type, config.override_for(agent_type)).is_none() {
        anyhow::bail!(
            "No executable found for {}. Install it or set an override in the config.",
            agent_type.display_name()
        );
    }

    let working_dir = canonicalize_path(&dir.unwrap_or(PathBuf::from(".")))?;
    let store = open_store(&config).await?;

    let session = store
        .create(
            agent_type,
            Some(working_dir.to_string_lossy().to_string()),
            name,
        )
        .await?;
    println!("Session: {} ({})", session.name, session.id);
    println!("Directory: {}", working_dir.display());

    store.start(session.id).await?;
    let mut handle = store.attach(session.id).await?;

    let mut stdout = std::io::stdout();
    stdout.write_all(&handle.replay)?;
    stdout.flush()?;

    // Forward local stdin to the agent's terminal.
    let input_store = store.clone();
    let session_id = session.id;
    tokio::spawn(async move {
        let mut stdin = tokio::io::stdin();
        let mut buf = [0u8; 1024];
        loop {
            match stdin.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    if input_store
                        .write_input(session_id, buf[..n].to_vec())
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    let mut poll = tokio::time::interval(tokio::time::Duration::from_millis(250));
    loop {
        tokio::select! {
            chunk = handle.live.recv() => {
                match chunk {
                    Ok(bytes) => {
                        stdout.write_all(&bytes)?;
                        stdout.flush()?;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("Dropped {} output chunks, terminal may be incomplete", n);
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            _ = poll.tick() => {
                let Some(current) = store.session(session.id).await? else { break };
                if current.status.is_terminal() {
                    println!();
                    println!("Session ended: {}", current.status);
                    if let Some(error) = current.error_message {
                        println!("Error: {}", error);
                    }
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                println!("Cancelling session...");
                store.cancel(session.id).await?;
                break;
            }
        }
    }

    Ok(())
}

pub async fn list_sessions(
    config: Config,
    search: Option<String>,
    status: Option<String>,
    sort: String,
) -> Result<()> {
    let status = status
        .map(|s| s.parse::<SessionStatus>())
        .transpose()
        .map_err(crate::Error::msg)?;
    let sort = sort.parse::<SortOrder>().map_err(crate::Error::msg)?;

    let store = open_store(&config).await?;
    let result = store
        .filtered(SessionQuery {
            search: search.unwrap_or_default(),
            status,
            sort,
        })
        .await?;

    if result.is_empty() {
        println!("No sessions match.");
        return Ok(());
    }

    if !result.active.is_empty() {
        println!("Active ({}):", result.active.len());
        for session in &result.active {
            print_session_row(session);
        }
    }
    if !result.other.is_empty() {
        if !result.active.is_empty() {
            println!();
        }
        println!("Past ({}):", result.other.len());
        for session in &result.other {
            print_session_row(session);
        }
    }

    Ok(())
}

fn print_session_row(session: &Session) {
    let dir = session
        .working_directory
        .as_deref()
        .map(shorten_path_for_display)
        .unwrap_or_else(|| "-".to_string());
    println!(
        "  {}  {:<9} {:<12} {:<24} {:>8} {:>7}  {}",
        session.id,
        session.status,
        session.agent_type.display_name(),
        truncate(&session.name, 24),
        session.formatted_duration(),
        session.metrics.formatted_tokens(),
        dir
    );
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let prefix: String = s.chars().take(max - 1).collect();
        format!("{}…", prefix)
    }
}

pub async fn new_session(
    config: Config,
    agent: String,
    dir: Option<PathBuf>,
    name: Option<String>,
) -> Result<()> {
    let agent_type = parse_agent(&agent)?;
    let working_dir = dir
        .map(|d| canonicalize_path(&d))
        .transpose()?
        .map(|d| d.to_string_lossy().to_string());

    let store = open_store(&config).await?;
    let session = store.create(agent_type, working_dir, name).await?;

    println!("Created session {} ({})", session.name, session.id);
    println!("Status: {}", session.status);
    Ok(())
}

pub async fn show_session(config: Config, session_id: String) -> Result<()> {
    let id = parse_session_id(&session_id)?;
    let store = open_store(&config).await?;

    let Some(session) = store.session(id).await? else {
        anyhow::bail!("No session with id {}", id);
    };

    println!("{} ({})", session.name, session.id);
    println!("  Agent:     {}", session.agent_type.display_name());
    println!("  Status:    {}", session.status);
    println!("  Started:   {}", session.started_at.to_rfc3339());
    if let Some(ended) = session.ended_at {
        println!("  Ended:     {}", ended.to_rfc3339());
    }
    println!("  Duration:  {}", session.formatted_duration());
    if let Some(dir) = &session.working_directory {
        println!("  Directory: {}", shorten_path_for_display(dir));
    }
    if let Some(pid) = session.process_id {
        println!("  Process:   {}", pid);
    }
    if session.is_external_process {
        println!("  External:  yes");
    }
    if let Some(error) = &session.error_message {
        println!("  Error:     {}", error);
    }

    println!(
        "  Metrics:   {} tokens, {} API calls, {} tool calls, {} errors",
        session.metrics.formatted_tokens(),
        session.metrics.api_calls,
        session.metrics.tool_call_count,
        session.metrics.error_count
    );
    println!("  Messages:  {}", session.messages.len());

    if !session.tool_calls.is_empty() {
        println!("  Tool calls:");
        for call in &session.tool_calls {
            println!(
                "    {:<12} {:<30} {}",
                call.name,
                truncate(&call.input, 30),
                call.formatted_duration()
            );
        }
    }

    match &session.terminal_output {
        Some(output) => println!("  Terminal:  {} bytes of retained output", output.len()),
        None => println!("  Terminal:  no output retained"),
    }

    Ok(())
}

pub async fn pause_session(config: Config, session_id: String) -> Result<()> {
    let id = parse_session_id(&session_id)?;
    let store = open_store(&config).await?;
    store.pause(id).await?;
    println!("Paused {}", id);
    Ok(())
}

pub async fn resume_session(config: Config, session_id: String) -> Result<()> {
    let id = parse_session_id(&session_id)?;
    let store = open_store(&config).await?;
    store.resume(id).await?;
    println!("Resumed {}", id);
    Ok(())
}

pub async fn cancel_session(config: Config, session_id: String) -> Result<()> {
    let id = parse_session_id(&session_id)?;
    let store = open_store(&config).await?;
    store.cancel(id).await?;
    println!("Cancelled {}", id);
    Ok(())
}

pub async fn retry_session(config: Config, session_id: String) -> Result<()> {
    let id = parse_session_id(&session_id)?;
    let store = open_store(&config).await?;
    store.retry(id).await?;
    println!("Retrying {}", id);
    Ok(())
}

pub async fn clear_completed(config: Config) -> Result<()> {
    let store = open_store(&config).await?;
    let removed = store.clear_completed().await?;
    println!("Removed {} finished sessions", removed);
    Ok(())
}

pub async fn resolve_agent(config: Config, agent: String, path: Option<String>) -> Result<()> {
    let agent_type = parse_agent(&agent)?;
    let override_path = path.as_deref().or_else(|| config.override_for(agent_type));

    match AgentResolver::resolve(agent_type, override_path) {
        Some(resolved) => {
            println!("{}: {}", agent_type.display_name(), resolved.display());
            Ok(())
        }
        None => anyhow::bail!("No executable found for {}", agent_type.display_name()),
    }
}

/// Poll the store's revision counter and reprint the list whenever
/// something changed, including sessions discovered by the directory
/// watcher.
pub async fn watch_sessions(config: Config) -> Result<()> {
    let store = open_store(&config).await?;
    let _watcher = SessionDirWatcher::spawn(config.storage.sessions_dir.clone(), store.clone())?;

    println!(
        "Watching {} (Ctrl+C to stop)",
        config.storage.sessions_dir.display()
    );

    let mut last_revision = None;
    let mut poll = tokio::time::interval(tokio::time::Duration::from_millis(500));
    loop {
        tokio::select! {
            _ = poll.tick() => {
                let revision = store.revision().await?;
                if last_revision == Some(revision) {
                    continue;
                }
                last_revision = Some(revision);

                let result = store.filtered(SessionQuery::default()).await?;
                println!();
                println!(
                    "-- {} active, {} past --",
                    result.active.len(),
                    result.other.len()
                );
                for session in result.active.iter().chain(result.other.iter()) {
                    print_session_row(session);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        }
    }

    Ok(())
}
