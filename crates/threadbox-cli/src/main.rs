//! ThreadBox CLI
//!
//! Usage:
//!   threadbox --mcp-server              Run the MCP tool loop over stdio
//!   threadbox --dump                    Print a JSON summary of all sessions
//!   threadbox --session <id> --zip      Export one session as a ZIP archive
//!
//! `--data-path <dir>` overrides the data directory (default:
//! ~/.threadbox/data). Diagnostics always go to stderr; stdout carries only
//! the requested output.

use std::path::PathBuf;

use clap::Parser;
use threadbox::ThreadBox;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// ThreadBox - versioned virtual filesystem for AI agent artefacts
#[derive(Parser, Debug)]
#[command(name = "threadbox")]
#[command(about = "Versioned virtual filesystem for AI agent artefacts")]
struct Args {
    /// Run the MCP tool loop over standard streams
    #[arg(long = "mcp-server")]
    mcp_server: bool,

    /// Print a JSON summary of all sessions to stdout
    #[arg(long)]
    dump: bool,

    /// Export the given session as a ZIP archive (requires --session)
    #[arg(long)]
    zip: bool,

    /// Session identifier for --zip
    #[arg(long, value_name = "ID")]
    session: Option<String>,

    /// Directory holding the database file; defaults to ~/.threadbox/data
    #[arg(long = "data-path", value_name = "DIR")]
    data_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Log to stderr; stdout is reserved for --dump/--zip output and the
    // MCP stdio transport.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let data_dir = args
        .data_path
        .clone()
        .unwrap_or_else(ThreadBox::default_data_dir);

    if args.mcp_server {
        tracing::info!(data_dir = %data_dir.display(), "starting ThreadBox MCP server");
        let store = ThreadBox::open(&data_dir)?;
        threadbox_mcp::serve_stdio(store).await?;
        return Ok(());
    }

    if args.dump {
        let store = ThreadBox::open(&data_dir)?;
        let sessions = store.dump_sessions().await?;
        println!("{}", serde_json::to_string_pretty(&sessions)?);
        return Ok(());
    }

    if args.zip {
        let Some(session) = args.session.as_deref() else {
            anyhow::bail!("--zip requires --session <id>");
        };
        let store = ThreadBox::open(&data_dir)?;
        let archive = store.export_session_zip(Some(session), None).await?;
        println!("{}", archive.display());
        return Ok(());
    }

    anyhow::bail!("no mode selected; use --mcp-server, --dump, or --session <id> --zip")
}
