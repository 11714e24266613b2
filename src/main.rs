//! rewrite-proxy
//!
//! A transparent HTTP reverse proxy that rewrites one literal substring in
//! textual responses, keeping charset and compression intact.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ http::server ──▶ http::request (director) ──▶ Upstream
//!                                                                │
//!     Client ◀── http::server ◀── rewrite::transformer ◀─────────┘
//!                                   │ compression → charset → text
//!                                   │ → charset → compression
//! ```

use std::path::PathBuf;

use clap::Parser;

use rewrite_proxy::config::{load_config, ConfigOverrides};
use rewrite_proxy::lifecycle;
use rewrite_proxy::observability::logging;

#[derive(Parser)]
#[command(name = "rewrite-proxy", version)]
#[command(about = "Reverse proxy that replaces a literal in textual responses", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Upstream base URL or host
    #[arg(short, long)]
    upstream: Option<String>,

    /// Substring to look for
    #[arg(short, long)]
    search: Option<String>,

    /// Substring to replace it with
    #[arg(short, long)]
    replace: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let overrides = ConfigOverrides {
        port: cli.port,
        upstream: cli.upstream,
        search: cli.search,
        replace: cli.replace,
        log_level: cli.log_level,
    };
    let config = load_config(cli.config.as_deref(), overrides)?;

    logging::init_logging(&config.observability.log_level);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        listen_port = config.listener.port,
        upstream = %config.upstream.url,
        "rewrite-proxy starting"
    );

    lifecycle::start(config).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
