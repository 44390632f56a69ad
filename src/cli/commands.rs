use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "agentsmon")]
#[command(about = "Monitor and control AI coding agent sessions", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a session, spawn the agent and stream its terminal
    Run {
        /// Agent to run (claude, codex, custom)
        agent: String,
        /// Working directory for the agent (defaults to the current directory)
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Display name for the session
        #[arg(short, long)]
        name: Option<String>,
    },
    /// List sessions, partitioned into active and past
    List {
        /// Case-insensitive text filter (name, directory, messages, tool input)
        #[arg(short, long)]
        search: Option<String>,
        /// Only show sessions with this status
        #[arg(long)]
        status: Option<String>,
        /// Sort order: newest, oldest, name or status
        #[arg(long, default_value = "newest")]
        sort: String,
    },
    /// Create a session without starting it
    New {
        /// Agent type (claude, codex, custom)
        agent: String,
        /// Working directory for the agent
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Display name for the session
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Show one session in detail
    Show {
        /// Session ID
        session_id: String,
    },
    /// Pause a running session (suspends the agent process)
    Pause {
        session_id: String,
    },
    /// Resume a paused session
    Resume {
        session_id: String,
    },
    /// Cancel a running or waiting session
    Cancel {
        session_id: String,
    },
    /// Retry a failed session with its original agent and directory
    Retry {
        session_id: String,
    },
    /// Remove all completed, failed and cancelled sessions
    ClearCompleted,
    /// Resolve the executable an agent type would launch
    Resolve {
        /// Agent type (claude, codex, custom)
        agent: String,
        /// Candidate path to check before the usual search
        #[arg(long)]
        path: Option<String>,
    },
    /// Follow the session directory and print changes as they happen
    Watch,
}
