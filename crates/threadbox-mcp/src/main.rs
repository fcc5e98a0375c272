//! ThreadBox MCP server binary.
//!
//! Runs the ThreadBox tool set over stdio. All diagnostics go to stderr so
//! stdout stays clean for the MCP transport.
//!
//! ```bash
//! threadbox-mcp --data-path /var/lib/threadbox
//! ```

use std::path::PathBuf;

use clap::Parser;
use threadbox::ThreadBox;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// ThreadBox MCP Server - versioned artefact storage for AI agents
#[derive(Parser, Debug)]
#[command(name = "threadbox-mcp")]
#[command(about = "MCP server providing a versioned virtual filesystem")]
struct Args {
    /// Directory holding the database file; defaults to ~/.threadbox/data
    #[arg(long = "data-path", value_name = "DIR")]
    data_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Log to stderr so stdout stays reserved for MCP stdio.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();
    let data_dir = args
        .data_path
        .unwrap_or_else(ThreadBox::default_data_dir);

    tracing::info!(data_dir = %data_dir.display(), "starting ThreadBox MCP server");

    let store = ThreadBox::open(&data_dir)?;
    threadbox_mcp::serve_stdio(store).await?;

    tracing::info!("ThreadBox MCP server shutting down");
    Ok(())
}
