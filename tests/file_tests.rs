mod common;

use bytes::Bytes;
use chrono::Utc;

use cloud_drive::content_store::{content_hash, ContentStore};
use cloud_drive::drive::{DriveError, Upload};
use cloud_drive::storage::{self, models::FileVersion};

use common::{body, read_all, setup, upload, upload_file};

#[tokio::test]
async fn test_upload_and_download() {
    let t = setup();
    let docs = t.drive.create_folder("alice", "Docs", None, None).await.unwrap();

    let outcome = upload(&t.drive, "alice", Some(&docs.id), "q1.pdf", b"%PDF-1.7 report").await;
    assert!(!outcome.versioned);
    let file = outcome.file;
    assert_eq!(file.display_name, "q1.pdf");
    assert_eq!(file.mime_type, "application/pdf");
    assert_eq!(file.size_bytes, 15);
    assert_eq!(file.content_hash, content_hash(b"%PDF-1.7 report"));
    assert!(file.stored_name.starts_with("alice/"));

    let download = t.drive.open_file("alice", &file.id).await.unwrap();
    assert_eq!(download.size, 15);
    assert_eq!(read_all(download).await, b"%PDF-1.7 report");
}

#[tokio::test]
async fn test_upload_keeps_reported_mime_type() {
    let t = setup();
    let outcome = t
        .drive
        .upload(
            "alice",
            Upload {
                folder_id: None,
                file_name: "notes".to_string(),
                mime_type: Some("text/markdown".to_string()),
                body: body(b"# notes"),
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome.file.mime_type, "text/markdown");
    assert_eq!(outcome.file.folder_id, None);
}

#[tokio::test]
async fn test_upload_into_missing_folder() {
    let t = setup();
    let result = t
        .drive
        .upload(
            "alice",
            Upload {
                folder_id: Some("no-such-folder".to_string()),
                file_name: "a.txt".to_string(),
                mime_type: None,
                body: body(b"a"),
            },
        )
        .await;
    assert!(matches!(result, Err(DriveError::NotFound)));
}

#[tokio::test]
async fn test_same_name_same_content_versions() {
    let t = setup();
    let first = upload_file(&t.drive, "alice", None, "a.txt", b"hello").await;

    let second = upload(&t.drive, "alice", None, "a.txt", b"hello").await;
    assert!(second.versioned);
    assert_eq!(second.file.id, first.id);
    assert_eq!(second.file.stored_name, first.stored_name);

    let files = t.drive.list_files("alice", None, None).unwrap();
    assert_eq!(files.len(), 1);

    let versions = t.drive.list_versions("alice", &first.id).unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].version_number, 1);
    assert_eq!(versions[0].content_hash, first.content_hash);
}

#[tokio::test]
async fn test_same_name_new_content_is_new_file() {
    let t = setup();
    let first = upload_file(&t.drive, "alice", None, "a.txt", b"hello").await;
    let second = upload(&t.drive, "alice", None, "a.txt", b"world").await;

    assert!(!second.versioned);
    assert_ne!(second.file.id, first.id);
    assert_eq!(t.drive.list_files("alice", None, None).unwrap().len(), 2);
    assert!(t.drive.list_versions("alice", &first.id).unwrap().is_empty());
}

#[tokio::test]
async fn test_same_content_other_folder_is_new_file() {
    let t = setup();
    let docs = t.drive.create_folder("alice", "Docs", None, None).await.unwrap();
    upload_file(&t.drive, "alice", None, "a.txt", b"hello").await;

    let outcome = upload(&t.drive, "alice", Some(&docs.id), "a.txt", b"hello").await;
    assert!(!outcome.versioned);
}

#[tokio::test]
async fn test_rename_records_version() {
    let t = setup();
    let file = upload_file(&t.drive, "alice", None, "draft.txt", b"text").await;

    let renamed = t.drive.rename_file("alice", &file.id, "final.txt").await.unwrap();
    assert_eq!(renamed.display_name, "final.txt");
    assert_eq!(renamed.stored_name, file.stored_name);

    let versions = t.drive.list_versions("alice", &file.id).unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].display_name, "draft.txt");

    // Renaming to the current name is a no-op
    t.drive.rename_file("alice", &file.id, "final.txt").await.unwrap();
    assert_eq!(t.drive.list_versions("alice", &file.id).unwrap().len(), 1);
}

#[tokio::test]
async fn test_restore_version() {
    let t = setup();
    let file = upload_file(&t.drive, "alice", None, "a.txt", b"current").await;

    // An older revision whose bytes differ from the live ones
    let old_blob = t.store.put("alice", Bytes::from("older bytes")).await.unwrap();
    let version = FileVersion {
        id: "v-old".to_string(),
        file_id: file.id.clone(),
        version_number: 1,
        display_name: "a-old.txt".to_string(),
        stored_name: old_blob.stored_id.clone(),
        size_bytes: old_blob.size,
        mime_type: "text/plain".to_string(),
        content_hash: old_blob.hash.clone(),
        created_at: Utc::now(),
    };
    let write_txn = t.db.begin_write().unwrap();
    storage::versions::append(&write_txn, &version).unwrap();
    write_txn.commit().unwrap();

    let restored = t.drive.restore_version("alice", &file.id, "v-old").await.unwrap();
    assert_eq!(restored.id, file.id);
    assert_eq!(restored.display_name, "a-old.txt");
    assert_eq!(restored.content_hash, content_hash(b"older bytes"));
    assert_ne!(restored.stored_name, old_blob.stored_id);

    let download = t.drive.open_file("alice", &file.id).await.unwrap();
    assert_eq!(read_all(download).await, b"older bytes");

    // The pre-restore state became the newest version
    let versions = t.drive.list_versions("alice", &file.id).unwrap();
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[0].version_number, 2);
    assert_eq!(versions[0].content_hash, content_hash(b"current"));
    assert_eq!(versions[0].stored_name, file.stored_name);

    // The restored version keeps its own blob
    assert!(t.store.exists(&old_blob.stored_id).await.unwrap());

    // Restoring the snapshot undoes the restore
    let undone = t
        .drive
        .restore_version("alice", &file.id, &versions[0].id)
        .await
        .unwrap();
    assert_eq!(undone.display_name, "a.txt");
    assert_eq!(undone.content_hash, file.content_hash);
    let download = t.drive.open_file("alice", &file.id).await.unwrap();
    assert_eq!(read_all(download).await, b"current");
    assert_eq!(t.drive.list_versions("alice", &file.id).unwrap().len(), 3);
}

#[tokio::test]
async fn test_restore_missing_version() {
    let t = setup();
    let file = upload_file(&t.drive, "alice", None, "a.txt", b"x").await;
    let other = upload_file(&t.drive, "alice", None, "b.txt", b"y").await;
    t.drive.rename_file("alice", &other.id, "c.txt").await.unwrap();
    let other_version = t.drive.list_versions("alice", &other.id).unwrap().remove(0);

    let unknown = t.drive.restore_version("alice", &file.id, "nope").await;
    assert!(matches!(unknown, Err(DriveError::NotFound)));

    // A version of another file is not found under this one
    let mismatched = t
        .drive
        .restore_version("alice", &file.id, &other_version.id)
        .await;
    assert!(matches!(mismatched, Err(DriveError::NotFound)));
}

#[tokio::test]
async fn test_restore_with_missing_blob() {
    let t = setup();
    let file = upload_file(&t.drive, "alice", None, "a.txt", b"x").await;
    t.drive.rename_file("alice", &file.id, "b.txt").await.unwrap();
    let version = t.drive.list_versions("alice", &file.id).unwrap().remove(0);
    t.store.delete(&version.stored_name).await.unwrap();

    let result = t.drive.restore_version("alice", &file.id, &version.id).await;
    assert!(matches!(result, Err(DriveError::BlobMissing(_))));
    assert_eq!(t.drive.list_versions("alice", &file.id).unwrap().len(), 1);
}

#[tokio::test]
async fn test_move_file() {
    let t = setup();
    let docs = t.drive.create_folder("alice", "Docs", None, None).await.unwrap();
    let file = upload_file(&t.drive, "alice", None, "a.txt", b"a").await;

    let moved = t.drive.move_file("alice", &file.id, Some(&docs.id)).await.unwrap();
    assert_eq!(moved.folder_id.as_deref(), Some(docs.id.as_str()));
    assert!(t.drive.list_files("alice", None, None).unwrap().is_empty());
    assert_eq!(t.drive.list_files("alice", Some(&docs.id), None).unwrap().len(), 1);

    // Name already taken at the destination
    let twin = upload_file(&t.drive, "alice", None, "a.txt", b"other").await;
    let result = t.drive.move_file("alice", &twin.id, Some(&docs.id)).await;
    assert!(matches!(result, Err(DriveError::Conflict(_))));
}

#[tokio::test]
async fn test_copy_file_is_independent() {
    let t = setup();
    let docs = t.drive.create_folder("alice", "Docs", None, None).await.unwrap();
    let file = upload_file(&t.drive, "alice", None, "a.txt", b"payload").await;

    let copy = t.drive.copy_file("alice", &file.id, Some(&docs.id)).await.unwrap();
    assert_ne!(copy.id, file.id);
    assert_ne!(copy.stored_name, file.stored_name);
    assert_eq!(copy.content_hash, file.content_hash);

    t.drive.delete_file("alice", &file.id).await.unwrap();
    let download = t.drive.open_file("alice", &copy.id).await.unwrap();
    assert_eq!(read_all(download).await, b"payload");

    let again = t.drive.copy_file("alice", &copy.id, Some(&docs.id)).await;
    assert!(matches!(again, Err(DriveError::Conflict(_))));
}

#[tokio::test]
async fn test_copy_file_with_missing_blob() {
    let t = setup();
    let docs = t.drive.create_folder("alice", "Docs", None, None).await.unwrap();
    let file = upload_file(&t.drive, "alice", None, "a.txt", b"x").await;
    t.store.delete(&file.stored_name).await.unwrap();

    let result = t.drive.copy_file("alice", &file.id, Some(&docs.id)).await;
    assert!(matches!(result, Err(DriveError::BlobMissing(_))));
}

#[tokio::test]
async fn test_delete_file_releases_blobs() {
    let t = setup();
    let file = upload_file(&t.drive, "alice", None, "a.txt", b"x").await;
    t.drive.rename_file("alice", &file.id, "b.txt").await.unwrap();

    t.drive.delete_file("alice", &file.id).await.unwrap();

    assert!(!t.store.exists(&file.stored_name).await.unwrap());
    assert!(matches!(
        t.drive.get_file("alice", &file.id),
        Err(DriveError::NotFound)
    ));
    assert!(matches!(
        t.drive.delete_file("alice", &file.id).await,
        Err(DriveError::NotFound)
    ));
    let read_txn = t.db.begin_read().unwrap();
    assert!(storage::versions::list(&read_txn, &file.id)
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_missing_blob_reported() {
    let t = setup();
    let file = upload_file(&t.drive, "alice", None, "a.txt", b"x").await;
    t.store.delete(&file.stored_name).await.unwrap();

    assert!(matches!(
        t.drive.open_file("alice", &file.id).await,
        Err(DriveError::BlobMissing(_))
    ));
    assert!(matches!(
        t.drive.stat_file("alice", &file.id).await,
        Err(DriveError::BlobMissing(_))
    ));
}

#[tokio::test]
async fn test_files_private_to_owner() {
    let t = setup();
    let file = upload_file(&t.drive, "alice", None, "a.txt", b"x").await;

    assert!(matches!(
        t.drive.open_file("bob", &file.id).await,
        Err(DriveError::NotFound)
    ));
    assert!(matches!(
        t.drive.rename_file("bob", &file.id, "mine.txt").await,
        Err(DriveError::NotFound)
    ));

    // A direct grant lets the recipient read
    t.drive.share_with_user("alice", &file.id, "bob").unwrap();
    let download = t.drive.open_file("bob", &file.id).await.unwrap();
    assert_eq!(read_all(download).await, b"x");
    assert!(t.drive.stat_file("bob", &file.id).await.is_ok());
    assert!(matches!(
        t.drive.delete_file("bob", &file.id).await,
        Err(DriveError::NotFound)
    ));
}
