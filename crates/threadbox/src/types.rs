//! Value-copied snapshots returned by the storage engine.
//!
//! Callers never hold references into storage; every operation hands back
//! owned copies of the rows it touched.

use serde::{Deserialize, Serialize};

/// Whether a node is a file or a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Directory,
}

impl NodeKind {
    /// Parse the database representation.
    pub(crate) fn from_db(value: &str) -> Option<Self> {
        match value {
            "file" => Some(NodeKind::File),
            "directory" => Some(NodeKind::Directory),
            _ => None,
        }
    }
}

/// Snapshot of a single node.
///
/// `version` is the latest version number for files and `None` for
/// directories. `content` is populated only by operations documented to
/// return bytes (reads); listings and writes omit it.
#[derive(Debug, Clone)]
pub struct VirtualEntry {
    /// Opaque node identifier, stable across renames and moves.
    pub id: String,
    /// Owning session; the empty string is the default session.
    pub session: String,
    /// Canonical absolute virtual path.
    pub path: String,
    /// Basename of `path` (the root's name is `/`).
    pub name: String,
    /// Canonical parent path, `None` only for the root.
    pub parent_path: Option<String>,
    pub kind: NodeKind,
    /// Creation instant, milliseconds since the Unix epoch.
    pub created_at: i64,
    /// Last-modified instant, milliseconds since the Unix epoch.
    pub updated_at: i64,
    /// Latest version number for files; `None` for directories.
    pub version: Option<i64>,
    /// Latest content bytes, when the operation includes them.
    pub content: Option<Vec<u8>>,
}

/// One immutable snapshot of a file node's bytes.
#[derive(Debug, Clone)]
pub struct FileVersion {
    /// Opaque version identifier.
    pub id: String,
    /// Identifier of the owning file node.
    pub node_id: String,
    /// Version number, starting at 1 with no gaps.
    pub version: i64,
    pub content: Vec<u8>,
    /// Creation instant, milliseconds since the Unix epoch.
    pub created_at: i64,
}

/// Result of listing a directory: children partitioned by kind, each
/// partition ordered by name.
#[derive(Debug, Clone)]
pub struct DirectoryListing {
    /// Canonical path of the listed directory.
    pub path: String,
    /// Session the listing was taken in.
    pub session: String,
    pub directories: Vec<VirtualEntry>,
    pub files: Vec<VirtualEntry>,
}

/// Per-session summary for the `--dump` CLI output.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// Number of file nodes in the session.
    pub file_count: usize,
    /// Every node in the session, ordered by path.
    pub files: Vec<SessionFile>,
}

/// One node in a [`SessionSummary`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionFile {
    pub path: String,
    pub is_directory: bool,
    /// Latest version number; `None` for directories.
    pub version: Option<i64>,
    /// Size in bytes of the latest content; 0 for directories.
    pub size: u64,
}
