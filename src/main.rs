use clap::Parser;
use tracing_subscriber::EnvFilter;

use agentsmon::cli::{handlers, Cli, Commands};
use agentsmon::{Config, Result};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("agentsmon=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Run { agent, dir, name } => {
            handlers::run_session(config, agent, dir, name).await
        }
        Commands::List {
            search,
            status,
            sort,
        } => handlers::list_sessions(config, search, status, sort).await,
        Commands::New { agent, dir, name } => {
            handlers::new_session(config, agent, dir, name).await
        }
        Commands::Show { session_id } => handlers::show_session(config, session_id).await,
        Commands::Pause { session_id } => handlers::pause_session(config, session_id).await,
        Commands::Resume { session_id } => handlers::resume_session(config, session_id).await,
        Commands::Cancel { session_id } => handlers::cancel_session(config, session_id).await,
        Commands::Retry { session_id } => handlers::retry_session(config, session_id).await,
        Commands::ClearCompleted => handlers::clear_completed(config).await,
        Commands::Resolve { agent, path } => handlers::resolve_agent(config, agent, path).await,
        Commands::Watch => handlers::watch_sessions(config).await,
    }
}
