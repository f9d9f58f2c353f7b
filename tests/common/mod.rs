#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use tokio::io::AsyncReadExt;

use cloud_drive::config::SyncConfig;
use cloud_drive::content_store::{ByteStream, LocalStore};
use cloud_drive::drive::{Download, Drive, Upload, UploadOutcome};
use cloud_drive::storage::models::FileRecord;
use cloud_drive::storage::Database;
use cloud_drive::sync::SyncHub;

pub struct TestDrive {
    pub _dir: tempfile::TempDir,
    pub db: Database,
    pub store: Arc<LocalStore>,
    pub sync: Arc<SyncHub>,
    pub drive: Drive,
}

pub fn setup() -> TestDrive {
    setup_with(SyncConfig::default(), Duration::from_secs(30))
}

pub fn setup_with(sync_config: SyncConfig, bulk_timeout: Duration) -> TestDrive {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(dir.path().join("data")).unwrap();
    let store = Arc::new(LocalStore::new(dir.path().join("uploads")).unwrap());
    let sync = Arc::new(SyncHub::new(db.clone(), &sync_config));
    let drive = Drive::new(db.clone(), store.clone(), Arc::clone(&sync), bulk_timeout);
    TestDrive {
        _dir: dir,
        db,
        store,
        sync,
        drive,
    }
}

pub fn body(data: &'static [u8]) -> ByteStream<'static> {
    stream::once(async move { Ok::<_, std::io::Error>(Bytes::from_static(data)) }).boxed()
}

pub async fn upload(
    drive: &Drive,
    owner: &str,
    folder_id: Option<&str>,
    name: &str,
    data: &'static [u8],
) -> UploadOutcome {
    drive
        .upload(
            owner,
            Upload {
                folder_id: folder_id.map(str::to_string),
                file_name: name.to_string(),
                mime_type: None,
                body: body(data),
            },
        )
        .await
        .unwrap()
}

pub async fn upload_file(
    drive: &Drive,
    owner: &str,
    folder_id: Option<&str>,
    name: &str,
    data: &'static [u8],
) -> FileRecord {
    upload(drive, owner, folder_id, name, data).await.file
}

pub async fn read_all(download: Download) -> Vec<u8> {
    let mut reader = download.reader;
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await.unwrap();
    buf
}
