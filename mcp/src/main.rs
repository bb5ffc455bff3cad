use std::path::PathBuf;

use clap::Parser;
use gsc_mcp_runtime::{DEFAULT_API_URL, McpCommands, McpRuntimeConfig, run};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "gsc-mcp",
    version,
    about = "Google Search Console MCP server over stdio"
)]
struct Cli {
    /// Service account key file (falls back to GOOGLE_APPLICATION_CREDENTIALS)
    #[arg(short, long)]
    credentials: Option<PathBuf>,

    /// Search Console API base URL
    #[arg(long, env = "GSC_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<McpCommands>,
}

fn init_tracing(verbose: bool, log_json: bool) {
    let default_filter = if verbose {
        "gsc_mcp=debug,gsc_mcp_runtime=debug"
    } else {
        "gsc_mcp=info,gsc_mcp_runtime=info"
    };
    // stdout carries the protocol; logs go to stderr.
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(log_json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!log_json).then(|| fmt::layer().with_writer(std::io::stderr)))
        .init();
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let config = McpRuntimeConfig {
        credentials_path: cli.credentials,
        api_url: cli.api_url,
    };
    let code = run(config, cli.command.unwrap_or_default()).await;
    std::process::exit(code);
}
