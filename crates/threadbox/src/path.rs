//! Path algebra for virtual paths.
//!
//! All engine operations canonicalise user-supplied paths through
//! [`normalize`] before touching storage, so every path persisted in the
//! database starts with `/`, contains no empty or `..` segments, and carries
//! no trailing slash (except the root itself). The functions here are pure
//! string manipulation with no I/O.

use crate::error::StorageError;

/// Canonicalise a user-supplied virtual path.
///
/// Surrounding whitespace is trimmed, runs of `/` collapse into one, a
/// leading `/` is added if missing, and a trailing `/` is stripped unless the
/// result is the root. Empty input and `..` segments are rejected.
///
/// Normalisation is idempotent: `normalize(normalize(p)) == normalize(p)`.
pub fn normalize(input: &str) -> Result<String, StorageError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(StorageError::InvalidPath("path is empty".to_string()));
    }

    let mut segments = Vec::new();
    for segment in trimmed.split('/') {
        if segment.is_empty() {
            continue;
        }
        if segment == ".." {
            return Err(StorageError::InvalidPath(format!(
                "{trimmed} contains a parent directory segment"
            )));
        }
        segments.push(segment);
    }

    if segments.is_empty() {
        Ok("/".to_string())
    } else {
        Ok(format!("/{}", segments.join("/")))
    }
}

/// Validate a single path component, e.g. a rename target.
///
/// The trimmed name must be non-empty, must not contain `/`, and must not be
/// `.` or `..`.
pub fn normalize_name(input: &str) -> Result<String, StorageError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(StorageError::InvalidName("name is empty".to_string()));
    }
    if trimmed.contains('/') {
        return Err(StorageError::InvalidName(format!(
            "{trimmed} contains a path separator"
        )));
    }
    if trimmed == "." || trimmed == ".." {
        return Err(StorageError::InvalidName(format!(
            "{trimmed} is a reserved name"
        )));
    }
    Ok(trimmed.to_string())
}

/// The final component of a canonical path. The root's basename is `/`.
pub fn basename(path: &str) -> String {
    if path == "/" {
        return "/".to_string();
    }
    match path.rfind('/') {
        Some(idx) => path[idx + 1..].to_string(),
        None => path.to_string(),
    }
}

/// The parent of a canonical path, or `None` for the root.
pub fn parent(path: &str) -> Option<String> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/".to_string()),
        Some(idx) => Some(path[..idx].to_string()),
        None => None,
    }
}

/// Join a parent path and a child name into a canonical path.
pub fn join(parent: &str, name: &str) -> String {
    if parent.is_empty() || parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// The segments of a canonical path. The root has no segments.
pub fn split(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}
