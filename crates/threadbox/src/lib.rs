//! ThreadBox: a versioned virtual filesystem for AI agent artefacts.
//!
//! ThreadBox stores per-session filesystem trees in a single SQLite
//! database. Writes append immutable numbered versions instead of replacing
//! content, directories materialise automatically, and sessions are fully
//! disjoint namespaces. The engine is exposed to agents through an MCP tool
//! server (see the `threadbox-mcp` crate) and to operators through a small
//! CLI (`threadbox-cli`).

mod db;
mod error;
mod store;
mod types;
mod zip;

pub mod path;

pub use db::Database;
pub use error::StorageError;
pub use store::ThreadBox;
pub use types::{
    DirectoryListing, FileVersion, NodeKind, SessionFile, SessionSummary, VirtualEntry,
};
pub use zip::ZipBuilder;
