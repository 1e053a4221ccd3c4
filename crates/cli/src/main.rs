mod config;
mod fetch;
mod output;
mod watch;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "brewfeed",
    version,
    about = "brewfeed CLI - follow the beer activity feed"
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every subcommand.
#[derive(Debug, Clone, Args)]
pub struct GlobalArgs {
    /// Path to brewfeed.toml (default: ~/.config/brewfeed/brewfeed.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the server URL
    #[arg(long, global = true)]
    pub server: Option<String>,

    /// Override the API token
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// Override the user id
    #[arg(long, global = true)]
    pub user: Option<String>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow the feed live until interrupted
    Watch(FeedArgs),

    /// Fetch the current feed window once
    Fetch(FeedArgs),

    /// Show the resolved configuration
    Config,
}

#[derive(Debug, Clone, Args)]
pub struct FeedArgs {
    /// Only show items whose beer, user, bar or country contains this text
    #[arg(short, long)]
    pub search: Option<String>,

    /// Print one JSON object per item instead of text
    #[arg(long)]
    pub json: bool,
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let mut filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::WARN.into());
    if let Ok(directive) = format!("brewfeed={level}").parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.global.verbose);

    let result = match config::resolve(&cli.global) {
        Ok(resolved) => match cli.command {
            Commands::Watch(args) => watch::run_watch(&resolved.config, &args).await,
            Commands::Fetch(args) => fetch::run_fetch(&resolved.config, &args).await,
            Commands::Config => config::show_config(&resolved),
        },
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
