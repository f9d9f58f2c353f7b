mod admin;
mod files;
mod folders;
mod shares;
mod sync;

pub use admin::{admin_purge, create_session, health};
pub use files::{
    copy_file, delete_file, download_file, get_file, head_file, list_files, list_versions,
    move_file, rename_file, restore_version, upload_file,
};
pub use folders::{
    breadcrumb, copy_folder, create_folder, delete_folder, list_folders, move_folder,
    update_folder,
};
pub use shares::{
    create_share, delete_share, download_granted, download_share, list_shares,
    list_user_shares, revoke_user_share, share_with_user, shared_with_me, user_share_access,
};
pub use sync::{list_sync_events, record_sync_event, sync_changes, sync_socket};
