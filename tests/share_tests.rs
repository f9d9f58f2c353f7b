mod common;

use chrono::{TimeDelta, Utc};

use cloud_drive::drive::{DriveError, NewShare, ShareView};
use cloud_drive::storage;

use common::{read_all, setup, upload_file};

fn download_count(t: &common::TestDrive, token: &str) -> u32 {
    let read_txn = t.db.begin_read().unwrap();
    storage::shares::by_token(&read_txn, token)
        .unwrap()
        .expect("share should exist")
        .download_count
}

#[tokio::test]
async fn test_resolve_share_streams_file() {
    let t = setup();
    let file = upload_file(&t.drive, "alice", None, "q1.pdf", b"%PDF").await;
    let share = t.drive.create_share("alice", &file.id, NewShare::default()).unwrap();

    assert_eq!(share.token.len(), 64);
    assert_eq!(share.expires_at, None);
    assert_eq!(share.max_downloads, None);

    let download = t.drive.resolve_share(&share.token, None).await.unwrap();
    assert_eq!(download.file.id, file.id);
    assert_eq!(read_all(download).await, b"%PDF");
    assert_eq!(download_count(&t, &share.token), 1);
}

#[tokio::test]
async fn test_unknown_token() {
    let t = setup();
    let result = t.drive.resolve_share("not-a-token", None).await;
    assert!(matches!(result, Err(DriveError::NotFound)));
}

#[tokio::test]
async fn test_download_limit() {
    let t = setup();
    let file = upload_file(&t.drive, "alice", None, "a.txt", b"a").await;
    let share = t
        .drive
        .create_share(
            "alice",
            &file.id,
            NewShare {
                max_downloads: Some(2),
                ..Default::default()
            },
        )
        .unwrap();

    t.drive.resolve_share(&share.token, None).await.unwrap();
    t.drive.resolve_share(&share.token, None).await.unwrap();
    let third = t.drive.resolve_share(&share.token, None).await;
    assert!(matches!(third, Err(DriveError::LimitExceeded)));
    assert_eq!(download_count(&t, &share.token), 2);
}

#[tokio::test]
async fn test_expired_share() {
    let t = setup();
    let file = upload_file(&t.drive, "alice", None, "a.txt", b"a").await;
    let share = t
        .drive
        .create_share(
            "alice",
            &file.id,
            NewShare {
                expires_in_days: Some(1),
                ..Default::default()
            },
        )
        .unwrap();
    let expires_at = share.expires_at.expect("expiry should be set");
    assert!(expires_at > Utc::now() + TimeDelta::hours(23));

    let mut expired = share.clone();
    expired.expires_at = Some(Utc::now() - TimeDelta::minutes(1));
    let write_txn = t.db.begin_write().unwrap();
    storage::shares::update(&write_txn, &expired).unwrap();
    write_txn.commit().unwrap();

    let result = t.drive.resolve_share(&share.token, None).await;
    assert!(matches!(result, Err(DriveError::Expired)));
    assert_eq!(download_count(&t, &share.token), 0);
}

#[tokio::test]
async fn test_non_positive_options_mean_unlimited() {
    let t = setup();
    let file = upload_file(&t.drive, "alice", None, "a.txt", b"a").await;
    let share = t
        .drive
        .create_share(
            "alice",
            &file.id,
            NewShare {
                password: Some("   ".to_string()),
                expires_in_days: Some(0),
                max_downloads: Some(0),
            },
        )
        .unwrap();

    assert_eq!(share.expires_at, None);
    assert_eq!(share.max_downloads, None);
    assert_eq!(share.password_hash, None);
}

#[tokio::test]
async fn test_password_protected_share() {
    let t = setup();
    let file = upload_file(&t.drive, "alice", None, "a.txt", b"secret").await;
    let share = t
        .drive
        .create_share(
            "alice",
            &file.id,
            NewShare {
                password: Some("hunter2".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
    let hash = share.password_hash.clone().expect("password should be hashed");
    assert!(!hash.contains("hunter2"));

    let view = ShareView::from(share.clone());
    assert!(view.has_password);

    let missing = t.drive.resolve_share(&share.token, None).await;
    assert!(matches!(missing, Err(DriveError::PasswordRequired)));

    let wrong = t.drive.resolve_share(&share.token, Some("hunter3")).await;
    assert!(matches!(wrong, Err(DriveError::PasswordIncorrect)));
    assert_eq!(download_count(&t, &share.token), 0);

    let download = t
        .drive
        .resolve_share(&share.token, Some("hunter2"))
        .await
        .unwrap();
    assert_eq!(read_all(download).await, b"secret");
    assert_eq!(download_count(&t, &share.token), 1);
}

#[tokio::test]
async fn test_share_requires_ownership() {
    let t = setup();
    let file = upload_file(&t.drive, "alice", None, "a.txt", b"a").await;

    let result = t.drive.create_share("bob", &file.id, NewShare::default());
    assert!(matches!(result, Err(DriveError::NotFound)));

    let share = t.drive.create_share("alice", &file.id, NewShare::default()).unwrap();
    assert!(matches!(
        t.drive.delete_share("bob", &share.id),
        Err(DriveError::Unauthorized)
    ));

    assert_eq!(t.drive.list_shares("alice", &file.id).unwrap().len(), 1);
    t.drive.delete_share("alice", &share.id).unwrap();
    assert!(t.drive.list_shares("alice", &file.id).unwrap().is_empty());
    assert!(matches!(
        t.drive.resolve_share(&share.token, None).await,
        Err(DriveError::NotFound)
    ));
}

#[tokio::test]
async fn test_deleting_file_drops_shares() {
    let t = setup();
    let file = upload_file(&t.drive, "alice", None, "a.txt", b"a").await;
    let share = t.drive.create_share("alice", &file.id, NewShare::default()).unwrap();
    t.drive.share_with_user("alice", &file.id, "bob").unwrap();

    t.drive.delete_file("alice", &file.id).await.unwrap();

    assert!(matches!(
        t.drive.resolve_share(&share.token, None).await,
        Err(DriveError::NotFound)
    ));
    assert!(t.drive.shared_with_me("bob").unwrap().is_empty());
}

#[tokio::test]
async fn test_direct_grants() {
    let t = setup();
    let file = upload_file(&t.drive, "alice", None, "a.txt", b"granted").await;

    let grant = t.drive.share_with_user("alice", &file.id, "bob").unwrap();
    assert_eq!(grant.shared_by_user_id, "alice");
    assert_eq!(grant.shared_with_user_id, "bob");

    assert!(matches!(
        t.drive.share_with_user("alice", &file.id, "bob"),
        Err(DriveError::Conflict(_))
    ));
    assert!(matches!(
        t.drive.share_with_user("alice", &file.id, "alice"),
        Err(DriveError::Validation(_))
    ));
    assert!(matches!(
        t.drive.share_with_user("alice", &file.id, "  "),
        Err(DriveError::Validation(_))
    ));

    let shared = t.drive.shared_with_me("bob").unwrap();
    assert_eq!(shared.len(), 1);
    assert_eq!(shared[0].file.id, file.id);
    assert_eq!(shared[0].share_id, grant.id);

    let access = t.drive.grant_access("bob", &grant.id).unwrap();
    assert_eq!(access.file.display_name, "a.txt");
    assert!(matches!(
        t.drive.grant_access("carol", &grant.id),
        Err(DriveError::Unauthorized)
    ));

    let download = t.drive.resolve_for_user(&file.id, "bob").await.unwrap();
    assert_eq!(read_all(download).await, b"granted");
    assert!(matches!(
        t.drive.resolve_for_user(&file.id, "carol").await,
        Err(DriveError::Unauthorized)
    ));

    assert_eq!(t.drive.list_grants("alice", &file.id).unwrap().len(), 1);
}

#[tokio::test]
async fn test_revoke_grant() {
    let t = setup();
    let file = upload_file(&t.drive, "alice", None, "a.txt", b"a").await;
    let to_bob = t.drive.share_with_user("alice", &file.id, "bob").unwrap();
    let to_carol = t.drive.share_with_user("alice", &file.id, "carol").unwrap();

    // Strangers cannot revoke
    assert!(matches!(
        t.drive.revoke_grant("dave", &file.id, &to_bob.id),
        Err(DriveError::Unauthorized)
    ));

    // The recipient can drop their own grant
    t.drive.revoke_grant("bob", &file.id, &to_bob.id).unwrap();
    assert!(matches!(
        t.drive.resolve_for_user(&file.id, "bob").await,
        Err(DriveError::Unauthorized)
    ));

    // The owner can revoke any grant
    t.drive.revoke_grant("alice", &file.id, &to_carol.id).unwrap();
    assert!(t.drive.list_grants("alice", &file.id).unwrap().is_empty());

    assert!(matches!(
        t.drive.revoke_grant("alice", &file.id, &to_carol.id),
        Err(DriveError::NotFound)
    ));
}
