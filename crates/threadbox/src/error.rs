//! Error types for storage operations.

use thiserror::Error;

/// Errors surfaced by the storage engine and its persistence adapter.
///
/// Messages are single sentences that include the offending path where one
/// exists; the tool dispatcher forwards them verbatim as error payloads.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Empty, malformed, or traversing input path.
    #[error("invalid path: {0}")]
    InvalidPath(String),
    /// Bad rename target.
    #[error("invalid name: {0}")]
    InvalidName(String),
    /// Required source node missing.
    #[error("not found: {0}")]
    NotFound(String),
    /// Rename/move destination occupied.
    #[error("already exists: {0}")]
    AlreadyExists(String),
    /// Writing bytes onto a directory node.
    #[error("is a directory: {0}")]
    IsDirectory(String),
    /// Listing a path that is not a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),
    /// Relocating a directory (intentionally unsupported).
    #[error("unsupported node kind: {0}")]
    UnsupportedKind(String),
    /// Relocating the root, or a node onto its own path.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    /// Content decoding failure (e.g. invalid base64 in a write).
    #[error("decode error: {0}")]
    Decode(String),
    /// Underlying SQLite failure.
    #[error("storage backend error: {0}")]
    Backend(#[from] rusqlite::Error),
    /// Host filesystem failure (archive export, database directory).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The engine's database handle has been released.
    #[error("storage engine is closed")]
    Closed,
}
