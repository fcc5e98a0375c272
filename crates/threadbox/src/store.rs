//! The ThreadBox storage engine.
//!
//! An append-only, versioned virtual filesystem over SQLite. Nodes (files
//! and directories) live in a per-session tree rooted at `/`; file content
//! is stored as immutable numbered versions. Nodes are never deleted and
//! versions are never rewritten.
//!
//! Every mutating operation runs as one IMMEDIATE transaction through the
//! persistence adapter, so the version sequence per path stays linear even
//! under concurrent callers, and partial work is never visible.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::Database;
use crate::error::StorageError;
use crate::path;
use crate::types::{
    DirectoryListing, FileVersion, NodeKind, SessionFile, SessionSummary, VirtualEntry,
};
use crate::zip::ZipBuilder;

const NODE_COLUMNS: &str =
    "id, session, path, name, parent_path, kind, created_at, updated_at, latest_version";

/// Versioned virtual filesystem engine.
///
/// Each instance owns its database handle exclusively; open independent
/// engines over distinct database files rather than sharing one.
#[derive(Clone)]
pub struct ThreadBox {
    db: Database,
}

impl std::fmt::Debug for ThreadBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadBox").finish_non_exhaustive()
    }
}

impl ThreadBox {
    /// Open the engine over `data_dir/threadbox.db`, creating both as
    /// needed.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::open(data_dir.as_ref().join("threadbox.db"))?;
        Ok(Self { db })
    }

    /// Open an engine over a private in-memory database. Intended for tests.
    pub fn in_memory() -> Result<Self, StorageError> {
        Ok(Self {
            db: Database::in_memory()?,
        })
    }

    /// The default data directory: `~/.threadbox/data`, falling back to the
    /// system temporary directory when no home directory is known.
    pub fn default_data_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(".threadbox")
            .join("data")
    }

    /// Release the database handle. Subsequent operations fail with
    /// [`StorageError::Closed`].
    pub async fn close(&self) -> Result<(), StorageError> {
        self.db.close().await
    }

    /// Write `content` to `path`, materialising missing ancestor
    /// directories and appending a new version.
    ///
    /// A fresh path gets version 1; an existing file gets its latest version
    /// plus one. Writing onto a directory fails with
    /// [`StorageError::IsDirectory`]. The returned snapshot omits content.
    pub async fn write_file(
        &self,
        path: &str,
        content: Vec<u8>,
        session: Option<&str>,
    ) -> Result<VirtualEntry, StorageError> {
        let session = normalize_session(session);
        let path = path::normalize(path)?;

        self.db
            .write_transaction(move |tx| {
                ensure_root(tx, &session)?;
                if let Some(parent) = path::parent(&path) {
                    ensure_directory_chain(tx, &session, &parent)?;
                }

                let now = now_millis();
                match lookup_node(tx, &session, &path)? {
                    None => {
                        let id = new_id();
                        tx.execute(
                            "INSERT INTO nodes (id, session, path, name, parent_path, kind,
                             created_at, updated_at, latest_version)
                             VALUES (?1, ?2, ?3, ?4, ?5, 'file', ?6, ?6, 1)",
                            params![
                                id,
                                session,
                                path,
                                path::basename(&path),
                                path::parent(&path),
                                now
                            ],
                        )?;
                        insert_version(tx, &id, 1, &content, now)?;
                    }
                    Some(node) if node.kind == NodeKind::Directory => {
                        return Err(StorageError::IsDirectory(path.clone()));
                    }
                    Some(node) => {
                        let next = node.version.unwrap_or(0) + 1;
                        tx.execute(
                            "UPDATE nodes SET latest_version = ?1, updated_at = ?2 WHERE id = ?3",
                            params![next, now, node.id],
                        )?;
                        insert_version(tx, &node.id, next, &content, now)?;
                    }
                }

                lookup_node(tx, &session, &path)?
                    .ok_or_else(|| StorageError::NotFound(path.clone()))
            })
            .await
    }

    /// Read the latest version of the file at `path`.
    ///
    /// Returns `None` when no node exists there or the node is a directory;
    /// the caller decides whether that is an error. The snapshot includes
    /// the content bytes.
    pub async fn read_file(
        &self,
        path: &str,
        session: Option<&str>,
    ) -> Result<Option<VirtualEntry>, StorageError> {
        let session = normalize_session(session);
        let path = path::normalize(path)?;

        self.db
            .read(move |conn| {
                let Some(mut node) = lookup_node(conn, &session, &path)? else {
                    return Ok(None);
                };
                if node.kind != NodeKind::File {
                    return Ok(None);
                }
                let Some(version) = node.version else {
                    return Ok(None);
                };
                let content: Vec<u8> = conn.query_row(
                    "SELECT content FROM file_versions WHERE node_id = ?1 AND version = ?2",
                    params![node.id, version],
                    |row| row.get(0),
                )?;
                node.content = Some(content);
                Ok(Some(node))
            })
            .await
    }

    /// List the children of the directory at `path`, partitioned by kind
    /// and ordered by name within each partition. Content is omitted.
    ///
    /// Listing `/` in a session that has never been written to materialises
    /// the root and returns empty lists; any other missing or non-directory
    /// path fails with [`StorageError::NotADirectory`].
    pub async fn list_directory(
        &self,
        path: &str,
        session: Option<&str>,
    ) -> Result<DirectoryListing, StorageError> {
        let session = normalize_session(session);
        let path = path::normalize(path)?;

        self.db
            .write_transaction(move |tx| {
                match lookup_node(tx, &session, &path)? {
                    Some(node) if node.kind == NodeKind::Directory => {}
                    Some(_) => return Err(StorageError::NotADirectory(path.clone())),
                    None if path == "/" => ensure_root(tx, &session)?,
                    None => return Err(StorageError::NotADirectory(path.clone())),
                }

                let mut stmt = tx.prepare(&format!(
                    "SELECT {NODE_COLUMNS} FROM nodes
                     WHERE session = ?1 AND parent_path = ?2
                     ORDER BY name ASC"
                ))?;
                let rows = stmt.query_map(params![session, path], entry_from_row)?;

                let mut directories = Vec::new();
                let mut files = Vec::new();
                for row in rows {
                    let entry = row?;
                    match entry.kind {
                        NodeKind::Directory => directories.push(entry),
                        NodeKind::File => files.push(entry),
                    }
                }

                Ok(DirectoryListing {
                    path: path.clone(),
                    session: session.clone(),
                    directories,
                    files,
                })
            })
            .await
    }

    /// Rename the file at `path` to `new_name` within its directory.
    ///
    /// The node keeps its identity and version history. The root cannot be
    /// renamed.
    pub async fn rename_node(
        &self,
        path: &str,
        new_name: &str,
        session: Option<&str>,
    ) -> Result<VirtualEntry, StorageError> {
        let session = normalize_session(session);
        let path = path::normalize(path)?;
        let new_name = path::normalize_name(new_name)?;

        let Some(parent) = path::parent(&path) else {
            return Err(StorageError::InvalidOperation(
                "the root directory cannot be renamed".to_string(),
            ));
        };
        let target = path::join(&parent, &new_name);

        self.db
            .write_transaction(move |tx| relocate(tx, &session, &path, &target))
            .await
    }

    /// Move the file at `path` into `new_directory`, keeping its basename.
    ///
    /// Missing destination directories are materialised. The node keeps its
    /// identity and version history.
    pub async fn move_node(
        &self,
        path: &str,
        new_directory: &str,
        session: Option<&str>,
    ) -> Result<VirtualEntry, StorageError> {
        let session = normalize_session(session);
        let path = path::normalize(path)?;
        let new_directory = path::normalize(new_directory)?;

        let target = path::join(&new_directory, &path::basename(&path));
        if target == path {
            return Err(StorageError::InvalidOperation(format!(
                "{path} is already at that location"
            )));
        }

        self.db
            .write_transaction(move |tx| relocate(tx, &session, &path, &target))
            .await
    }

    /// All versions of the file at `path`, newest first, content included.
    /// An absent node yields an empty list.
    pub async fn get_file_history(
        &self,
        path: &str,
        session: Option<&str>,
    ) -> Result<Vec<FileVersion>, StorageError> {
        let session = normalize_session(session);
        let path = path::normalize(path)?;

        self.db
            .read(move |conn| {
                let Some(node) = lookup_node(conn, &session, &path)? else {
                    return Ok(Vec::new());
                };
                let mut stmt = conn.prepare(
                    "SELECT id, node_id, version, content, created_at
                     FROM file_versions WHERE node_id = ?1
                     ORDER BY version DESC",
                )?;
                let versions = stmt
                    .query_map(params![node.id], |row| {
                        Ok(FileVersion {
                            id: row.get(0)?,
                            node_id: row.get(1)?,
                            version: row.get(2)?,
                            content: row.get(3)?,
                            created_at: row.get(4)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(versions)
            })
            .await
    }

    /// Export every file in the session (latest versions, ordered by path)
    /// as a ZIP archive written under `destination` and return the created
    /// file's absolute path.
    ///
    /// `destination` defaults to the host's temporary directory and is
    /// created if missing.
    pub async fn export_session_zip(
        &self,
        session: Option<&str>,
        destination: Option<&Path>,
    ) -> Result<PathBuf, StorageError> {
        let session = normalize_session(session);

        let query_session = session.clone();
        let members: Vec<(String, Vec<u8>)> = self
            .db
            .read(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT n.path, v.content FROM nodes n
                     JOIN file_versions v
                       ON v.node_id = n.id AND v.version = n.latest_version
                     WHERE n.session = ?1 AND n.kind = 'file'
                     ORDER BY n.path ASC",
                )?;
                let rows = stmt
                    .query_map(params![query_session], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        let mut builder = ZipBuilder::new();
        for (path, content) in &members {
            builder.add(path.trim_start_matches('/'), content);
        }
        let archive = builder.finish();

        let dir = match destination {
            Some(dir) => dir.to_path_buf(),
            None => std::env::temp_dir(),
        };
        tokio::fs::create_dir_all(&dir).await?;

        let filename = format!(
            "threadbox-session-{}-{}.zip",
            safe_session_name(&session),
            compact_timestamp()
        );
        let mut out = dir.join(filename);
        if !out.is_absolute() {
            out = std::env::current_dir()?.join(out);
        }
        tokio::fs::write(&out, archive).await?;

        tracing::debug!(
            session = %session,
            members = members.len(),
            path = %out.display(),
            "exported session archive"
        );
        Ok(out)
    }

    /// Summarise every session in the store: file counts plus one entry per
    /// node, ordered by path. Backs the CLI `--dump` output.
    pub async fn dump_sessions(&self) -> Result<BTreeMap<String, SessionSummary>, StorageError> {
        self.db
            .read(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT n.session, n.path, n.kind, n.latest_version,
                            COALESCE(LENGTH(v.content), 0)
                     FROM nodes n
                     LEFT JOIN file_versions v
                       ON v.node_id = n.id AND v.version = n.latest_version
                     ORDER BY n.session ASC, n.path ASC",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<i64>>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                })?;

                let mut sessions: BTreeMap<String, SessionSummary> = BTreeMap::new();
                for row in rows {
                    let (session, path, kind, version, size) = row?;
                    let is_directory = kind == "directory";
                    let summary = sessions.entry(session).or_default();
                    if !is_directory {
                        summary.file_count += 1;
                    }
                    summary.files.push(SessionFile {
                        path,
                        is_directory,
                        version,
                        size: size.max(0) as u64,
                    });
                }
                Ok(sessions)
            })
            .await
    }
}

/// Shared relocation routine for rename and move. Runs inside the caller's
/// transaction; only file nodes may relocate.
fn relocate(
    conn: &Connection,
    session: &str,
    from: &str,
    to: &str,
) -> Result<VirtualEntry, StorageError> {
    if from == "/" {
        return Err(StorageError::InvalidOperation(
            "the root directory cannot be moved".to_string(),
        ));
    }

    let node =
        lookup_node(conn, session, from)?.ok_or_else(|| StorageError::NotFound(from.to_string()))?;
    if node.kind != NodeKind::File {
        return Err(StorageError::UnsupportedKind(format!(
            "{from} is a directory; only files can be renamed or moved"
        )));
    }

    let new_parent =
        path::parent(to).ok_or_else(|| StorageError::InvalidPath(to.to_string()))?;
    if lookup_node(conn, session, to)?.is_some() {
        return Err(StorageError::AlreadyExists(to.to_string()));
    }

    ensure_directory_chain(conn, session, &new_parent)?;

    conn.execute(
        "UPDATE nodes SET path = ?1, name = ?2, parent_path = ?3, updated_at = ?4 WHERE id = ?5",
        params![to, path::basename(to), new_parent, now_millis(), node.id],
    )?;
    lookup_node(conn, session, to)?.ok_or_else(|| StorageError::NotFound(to.to_string()))
}

/// Create the session root if it does not exist yet.
fn ensure_root(conn: &Connection, session: &str) -> Result<(), StorageError> {
    if lookup_node(conn, session, "/")?.is_none() {
        let now = now_millis();
        conn.execute(
            "INSERT INTO nodes (id, session, path, name, parent_path, kind,
             created_at, updated_at, latest_version)
             VALUES (?1, ?2, '/', '/', NULL, 'directory', ?3, ?3, NULL)",
            params![new_id(), session, now],
        )?;
    }
    Ok(())
}

/// Walk the segments of `dir_path` shallow-to-deep, inserting a directory
/// node for each ancestor that does not exist yet. An ancestor that exists
/// as a file fails the walk.
fn ensure_directory_chain(
    conn: &Connection,
    session: &str,
    dir_path: &str,
) -> Result<(), StorageError> {
    ensure_root(conn, session)?;
    if dir_path == "/" {
        return Ok(());
    }

    let mut current = String::new();
    let mut parent = "/".to_string();
    for segment in path::split(dir_path) {
        current.push('/');
        current.push_str(segment);
        match lookup_node(conn, session, &current)? {
            Some(node) if node.kind == NodeKind::Directory => {}
            Some(_) => return Err(StorageError::NotADirectory(current.clone())),
            None => {
                let now = now_millis();
                conn.execute(
                    "INSERT INTO nodes (id, session, path, name, parent_path, kind,
                     created_at, updated_at, latest_version)
                     VALUES (?1, ?2, ?3, ?4, ?5, 'directory', ?6, ?6, NULL)",
                    params![new_id(), session, current, segment, parent, now],
                )?;
            }
        }
        parent.clone_from(&current);
    }
    Ok(())
}

fn insert_version(
    conn: &Connection,
    node_id: &str,
    version: i64,
    content: &[u8],
    now: i64,
) -> Result<(), StorageError> {
    conn.execute(
        "INSERT INTO file_versions (id, node_id, version, content, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![new_id(), node_id, version, content, now],
    )?;
    Ok(())
}

fn lookup_node(
    conn: &Connection,
    session: &str,
    path: &str,
) -> Result<Option<VirtualEntry>, StorageError> {
    conn.query_row(
        &format!("SELECT {NODE_COLUMNS} FROM nodes WHERE session = ?1 AND path = ?2"),
        params![session, path],
        entry_from_row,
    )
    .optional()
    .map_err(Into::into)
}

fn entry_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<VirtualEntry> {
    let kind_text: String = row.get(5)?;
    let kind = NodeKind::from_db(&kind_text).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            rusqlite::types::Type::Text,
            format!("unknown node kind: {kind_text}").into(),
        )
    })?;
    Ok(VirtualEntry {
        id: row.get(0)?,
        session: row.get(1)?,
        path: row.get(2)?,
        name: row.get(3)?,
        parent_path: row.get(4)?,
        kind,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
        version: row.get(8)?,
        content: None,
    })
}

/// Trimmed session identifier; `None` means the default (empty) session.
fn normalize_session(session: Option<&str>) -> String {
    session.map(str::trim).unwrap_or("").to_string()
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Archive-filename-safe session name: anything outside `[A-Za-z0-9_-]`
/// becomes `-`, and the empty session maps to `default`.
fn safe_session_name(session: &str) -> String {
    if session.is_empty() {
        return "default".to_string();
    }
    session
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Current UTC instant as `YYYYMMDDTHHMMSSZ` (ISO 8601 basic format, safe in
/// filenames on every platform).
fn compact_timestamp() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let days = secs / 86_400;
    let time_of_day = secs % 86_400;
    let hours = time_of_day / 3_600;
    let minutes = (time_of_day % 3_600) / 60;
    let seconds = time_of_day % 60;
    let (year, month, day) = days_to_ymd(days);

    format!("{year:04}{month:02}{day:02}T{hours:02}{minutes:02}{seconds:02}Z")
}

/// Convert days since the Unix epoch to a calendar date (proleptic
/// Gregorian, civil-calendar algorithm).
fn days_to_ymd(days: u64) -> (i64, u32, u32) {
    let z = days as i64 + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let year = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let year = if month <= 2 { year + 1 } else { year };
    (year, month, day)
}
