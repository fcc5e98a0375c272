//! End-to-end scenarios against an on-disk database.

use tempfile::TempDir;
use threadbox::{StorageError, ThreadBox};

fn open_store() -> (ThreadBox, TempDir) {
    let tmp = TempDir::new().expect("create temp dir");
    let store = ThreadBox::open(tmp.path()).expect("open store");
    (store, tmp)
}

#[tokio::test]
async fn test_versioned_overwrite() {
    let (store, _tmp) = open_store();

    let first = store
        .write_file("/docs/readme.md", b"V1".to_vec(), None)
        .await
        .expect("write V1");
    assert_eq!(first.version, Some(1));

    let second = store
        .write_file("/docs/readme.md", b"V2".to_vec(), None)
        .await
        .expect("write V2");
    assert_eq!(second.version, Some(2));

    let read = store
        .read_file("/docs/readme.md", None)
        .await
        .expect("read")
        .expect("file exists");
    assert_eq!(read.content.as_deref(), Some(b"V2".as_slice()));
    assert_eq!(read.version, Some(2));

    let history = store
        .get_file_history("/docs/readme.md", None)
        .await
        .expect("history");
    assert_eq!(history.len(), 2);
    assert_eq!(
        history.iter().map(|v| v.version).collect::<Vec<_>>(),
        vec![2, 1]
    );
    assert_eq!(history[0].content, b"V2");
    assert_eq!(history[1].content, b"V1");
}

#[tokio::test]
async fn test_session_isolation() {
    let (store, _tmp) = open_store();

    store
        .write_file("/shared.txt", b"Alpha".to_vec(), Some("alpha"))
        .await
        .expect("write alpha");
    store
        .write_file("/shared.txt", b"Beta".to_vec(), Some("beta"))
        .await
        .expect("write beta");

    let alpha = store
        .read_file("/shared.txt", Some("alpha"))
        .await
        .expect("read alpha")
        .expect("alpha exists");
    assert_eq!(alpha.content.as_deref(), Some(b"Alpha".as_slice()));

    let beta = store
        .read_file("/shared.txt", Some("beta"))
        .await
        .expect("read beta")
        .expect("beta exists");
    assert_eq!(beta.content.as_deref(), Some(b"Beta".as_slice()));
}

#[tokio::test]
async fn test_directory_listing() {
    let (store, _tmp) = open_store();

    store
        .write_file("/dir/a.txt", b"A".to_vec(), None)
        .await
        .expect("write a.txt");
    store
        .write_file("/dir/nested/b.txt", b"B".to_vec(), None)
        .await
        .expect("write b.txt");

    let listing = store.list_directory("/dir", None).await.expect("list /dir");
    assert_eq!(listing.directories.len(), 1);
    assert_eq!(listing.directories[0].name, "nested");
    assert_eq!(listing.files.len(), 1);
    assert_eq!(listing.files[0].name, "a.txt");
    assert_eq!(listing.files[0].version, Some(1));
}

#[tokio::test]
async fn test_rename_conflict_leaves_originals_intact() {
    let (store, _tmp) = open_store();

    store
        .write_file("/a.txt", b"A".to_vec(), None)
        .await
        .expect("write a");
    store
        .write_file("/b.txt", b"B".to_vec(), None)
        .await
        .expect("write b");

    let err = store
        .rename_node("/a.txt", "b.txt", None)
        .await
        .expect_err("destination occupied");
    assert!(matches!(err, StorageError::AlreadyExists(_)));

    for (path, content) in [("/a.txt", b"A".as_slice()), ("/b.txt", b"B".as_slice())] {
        let read = store
            .read_file(path, None)
            .await
            .expect("read")
            .expect("exists");
        assert_eq!(read.content.as_deref(), Some(content));
    }
}

#[tokio::test]
async fn test_move_keeps_node_identity() {
    let (store, _tmp) = open_store();

    let original = store
        .write_file("/drafts/idea.md", b"draft".to_vec(), None)
        .await
        .expect("write");

    let moved = store
        .move_node("/drafts/idea.md", "/archive", None)
        .await
        .expect("move");
    assert_eq!(moved.path, "/archive/idea.md");
    assert_eq!(moved.id, original.id);

    assert!(store
        .read_file("/drafts/idea.md", None)
        .await
        .expect("read old path")
        .is_none());

    let read = store
        .read_file("/archive/idea.md", None)
        .await
        .expect("read new path")
        .expect("exists");
    assert_eq!(read.content.as_deref(), Some(b"draft".as_slice()));
    assert_eq!(read.id, original.id);
}

#[tokio::test]
async fn test_zip_export_contains_session_files() {
    let (store, tmp) = open_store();

    store
        .write_file("/docs/readme.md", b"export me".to_vec(), Some("s1"))
        .await
        .expect("write");

    let out_dir = tmp.path().join("exports");
    let archive_path = store
        .export_session_zip(Some("s1"), Some(&out_dir))
        .await
        .expect("export");

    assert!(archive_path.is_absolute());
    let archive_name = archive_path
        .file_name()
        .and_then(|n| n.to_str())
        .expect("archive filename");
    assert!(archive_name.starts_with("threadbox-session-s1-"));
    assert!(archive_name.ends_with(".zip"));

    let bytes = std::fs::read(&archive_path).expect("read archive");
    let members = decode_stored_zip(&bytes);
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].0, "docs/readme.md");
    assert_eq!(members[0].1, b"export me");
}

#[tokio::test]
async fn test_persistence_across_reopen() {
    let tmp = TempDir::new().expect("create temp dir");

    {
        let store = ThreadBox::open(tmp.path()).expect("open store");
        store
            .write_file("/keep.txt", b"kept".to_vec(), None)
            .await
            .expect("write");
        store.close().await.expect("close");
    }

    let store = ThreadBox::open(tmp.path()).expect("reopen store");
    let read = store
        .read_file("/keep.txt", None)
        .await
        .expect("read")
        .expect("survives reopen");
    assert_eq!(read.content.as_deref(), Some(b"kept".as_slice()));
}

#[tokio::test]
async fn test_parent_chain_exists_for_every_node() {
    let (store, _tmp) = open_store();

    store
        .write_file("/x/y/z/file.txt", b"deep".to_vec(), Some("chain"))
        .await
        .expect("write");
    store
        .move_node("/x/y/z/file.txt", "/moved/here", Some("chain"))
        .await
        .expect("move");

    // Every ancestor of every written path must be listable as a directory.
    for dir in ["/", "/x", "/x/y", "/x/y/z", "/moved", "/moved/here"] {
        store
            .list_directory(dir, Some("chain"))
            .await
            .unwrap_or_else(|e| panic!("ancestor {dir} should be a directory: {e}"));
    }
}

/// Decode a store-method ZIP produced by the engine: walk local file
/// headers and return `(name, content)` pairs.
fn decode_stored_zip(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut members = Vec::new();
    let mut at = 0;
    while at + 4 <= bytes.len() {
        let signature = u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        if signature != 0x0403_4b50 {
            break;
        }
        let size = u32::from_le_bytes([
            bytes[at + 18],
            bytes[at + 19],
            bytes[at + 20],
            bytes[at + 21],
        ]) as usize;
        let name_len =
            u16::from_le_bytes([bytes[at + 26], bytes[at + 27]]) as usize;
        let extra_len =
            u16::from_le_bytes([bytes[at + 28], bytes[at + 29]]) as usize;
        let name_start = at + 30;
        let data_start = name_start + name_len + extra_len;
        let name = String::from_utf8(bytes[name_start..name_start + name_len].to_vec())
            .expect("member name is UTF-8");
        let content = bytes[data_start..data_start + size].to_vec();
        members.push((name, content));
        at = data_start + size;
    }
    members
}
