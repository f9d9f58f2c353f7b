use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::AppState;

const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Room for multipart boundaries and part headers on top of the file itself
    let upload_limit = usize::try_from(state.config.max_upload_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    let mut router = Router::new()
        // Files
        .route("/api/files", get(handlers::list_files))
        .route(
            "/api/files/upload",
            post(handlers::upload_file).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/api/files/:id",
            get(handlers::get_file)
                .put(handlers::rename_file)
                .delete(handlers::delete_file),
        )
        .route(
            "/api/files/:id/download",
            get(handlers::download_file).head(handlers::head_file),
        )
        .route("/api/files/:id/move", post(handlers::move_file))
        .route("/api/files/:id/copy", post(handlers::copy_file))
        .route("/api/files/:id/versions", get(handlers::list_versions))
        .route(
            "/api/files/:id/versions/:version_id/restore",
            post(handlers::restore_version),
        )
        // Folders
        .route(
            "/api/folders",
            get(handlers::list_folders).post(handlers::create_folder),
        )
        .route("/api/folders/breadcrumb/:id", get(handlers::breadcrumb))
        .route(
            "/api/folders/:id",
            axum::routing::put(handlers::update_folder).delete(handlers::delete_folder),
        )
        .route("/api/folders/:id/move", post(handlers::move_folder))
        .route("/api/folders/:id/copy", post(handlers::copy_folder))
        // Public share links
        .route("/api/shares/files/:id/share", post(handlers::create_share))
        .route("/api/shares/files/:id/shares", get(handlers::list_shares))
        .route("/api/shares/:share_id", delete(handlers::delete_share))
        .route("/share/:token", get(handlers::download_share))
        // Direct grants
        .route(
            "/api/user-shares/files/:id/share-with-user",
            post(handlers::share_with_user),
        )
        .route(
            "/api/user-shares/files/:id/share-with-user/:share_id",
            delete(handlers::revoke_user_share),
        )
        .route(
            "/api/user-shares/files/:id/shared-with",
            get(handlers::list_user_shares),
        )
        .route(
            "/api/user-shares/files/:id/download",
            get(handlers::download_granted),
        )
        .route("/api/user-shares/shared-with-me", get(handlers::shared_with_me))
        .route(
            "/api/user-shares/shared/:share_id/access",
            get(handlers::user_share_access),
        )
        // Sync
        .route("/api/sync/changes", get(handlers::sync_changes))
        .route(
            "/api/sync/events",
            get(handlers::list_sync_events).post(handlers::record_sync_event),
        )
        .route("/api/sync/ws", get(handlers::sync_socket))
        // Internal
        .route("/_internal/health", get(handlers::health));

    // Test-only routes
    if state.config.test_mode {
        tracing::warn!("Test mode enabled: purge and session routes are available.");
        router = router
            .route("/admin/purge", delete(handlers::admin_purge))
            .route("/_internal/sessions", post(handlers::create_session));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
