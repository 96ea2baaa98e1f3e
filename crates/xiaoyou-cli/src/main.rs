use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use tracing_subscriber::EnvFilter;

use xiaoyou::config::ChatConfig;
use xiaoyou::session::ChatSession;

mod prompt;
mod render;
mod session;

use prompt::cliclack::CliclackPrompt;
use session::Session;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Access token (can also be set via XIAOYOU_TOKEN environment variable)
    #[arg(long)]
    token: Option<String>,

    /// Answer service base URL (can also be set via XIAOYOU_BASE_URL environment variable)
    #[arg(long)]
    base_url: Option<String>,

    /// Allow plain http, e.g. for a local test server
    #[arg(long)]
    insecure: bool,

    /// Ask a single question, print the answer and exit
    #[arg(short, long)]
    query: Option<String>,
}

fn load_config(cli: &Cli) -> Result<ChatConfig> {
    let mut config = ChatConfig::load_with_token(cli.token.clone())
        .context("Failed to load configuration (pass --token or set XIAOYOU_TOKEN)")?;
    if let Some(base_url) = &cli.base_url {
        config = config.with_base_url(base_url.as_str());
    }
    if cli.insecure {
        config = config.with_insecure_http(true);
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so they never interleave with rendered answers
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let chat = ChatSession::connect(config)?;
    let mut session = Session::new(chat, Box::new(CliclackPrompt::new()));

    match cli.query {
        Some(query) => session.headless_start(&query).await,
        None => {
            println!(
                "小优 CLI {}",
                style("- type \"exit\" to end the session").dim()
            );
            session.start().await
        }
    }
}
