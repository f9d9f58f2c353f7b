use std::time::Duration;

use bytes::Bytes;
use futures::stream::{self, StreamExt};

use cloud_drive::content_store::{content_hash, ContentStore, ContentStoreError, LocalStore};

#[tokio::test]
async fn test_local_store_put_get() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    let data = Bytes::from("hello world");
    let blob = store.put("alice", data.clone()).await.unwrap();

    assert!(blob.stored_id.starts_with("alice/"));
    assert_eq!(blob.size, 11);
    assert_eq!(blob.hash, content_hash(b"hello world"));

    let retrieved = store.get(&blob.stored_id).await.unwrap();
    assert_eq!(retrieved, data);
}

#[tokio::test]
async fn test_known_sha256() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    let blob = store.put("alice", Bytes::from("abc")).await.unwrap();
    assert_eq!(
        blob.hash,
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}

#[tokio::test]
async fn test_chunked_stream_hashes_whole_content() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    let chunks = vec![
        Ok::<_, std::io::Error>(Bytes::from("hello ")),
        Ok(Bytes::from("wor")),
        Ok(Bytes::from("ld")),
    ];
    let blob = store
        .put_stream("alice", stream::iter(chunks).boxed())
        .await
        .unwrap();

    assert_eq!(blob.size, 11);
    assert_eq!(blob.hash, content_hash(b"hello world"));
}

#[tokio::test]
async fn test_same_content_gets_distinct_keys() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    let a = store.put("alice", Bytes::from("same")).await.unwrap();
    let b = store.put("alice", Bytes::from("same")).await.unwrap();

    assert_ne!(a.stored_id, b.stored_id);
    assert_eq!(a.hash, b.hash);

    store.delete(&a.stored_id).await.unwrap();
    assert_eq!(store.get(&b.stored_id).await.unwrap(), Bytes::from("same"));
}

#[tokio::test]
async fn test_failed_stream_leaves_nothing_behind() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    let chunks = vec![
        Ok(Bytes::from("partial")),
        Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "client went away")),
    ];
    let result = store.put_stream("alice", stream::iter(chunks).boxed()).await;
    assert!(result.is_err());

    let owner_dir = dir.path().join("alice");
    let leftovers = std::fs::read_dir(&owner_dir)
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn test_dropped_upload_leaves_nothing_behind() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    // One chunk, then a client that never finishes
    let body = stream::iter(vec![Ok(Bytes::from("partial"))])
        .chain(stream::pending::<Result<Bytes, std::io::Error>>())
        .boxed();
    let result = tokio::time::timeout(
        Duration::from_millis(100),
        store.put_stream("alice", body),
    )
    .await;
    assert!(result.is_err());

    let owner_dir = dir.path().join("alice");
    let leftovers = std::fs::read_dir(&owner_dir)
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(leftovers, 0);
}

#[tokio::test]
async fn test_local_store_exists_and_delete() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    assert!(!store.exists("alice/missing").await.unwrap());

    let blob = store.put("alice", Bytes::from("data")).await.unwrap();
    assert!(store.exists(&blob.stored_id).await.unwrap());

    store.delete(&blob.stored_id).await.unwrap();
    assert!(!store.exists(&blob.stored_id).await.unwrap());

    // Deleting again is not an error
    store.delete(&blob.stored_id).await.unwrap();
}

#[tokio::test]
async fn test_open_missing_blob() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    let result = store.open("alice/nope").await;
    assert!(matches!(result, Err(ContentStoreError::NotFound(_))));
}

#[tokio::test]
async fn test_copy_is_physical() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    let original = store.put("alice", Bytes::from("payload")).await.unwrap();
    let copy = store.copy(&original.stored_id, "alice").await.unwrap();

    assert_ne!(copy.stored_id, original.stored_id);
    assert_eq!(copy.hash, original.hash);

    store.delete(&original.stored_id).await.unwrap();
    assert_eq!(store.get(&copy.stored_id).await.unwrap(), Bytes::from("payload"));
}

#[tokio::test]
async fn test_path_traversal_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();

    assert!(store.get("../etc/passwd").await.is_err());
    assert!(store.put("../escape", Bytes::from("x")).await.is_err());
}
