use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Json;
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;

use crate::api::auth::{session_token, CurrentUser};
use crate::api::response::{ApiError, AppJson, AppQuery, JSend};
use crate::auth::authenticate;
use crate::storage::models::{SessionRecord, SyncEventRecord};
use crate::sync::{CatchUp, ClientEvent, ClientMessage, ConnectionHandle, ServerMessage, SyncFailure};
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct SinceParams {
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SocketParams {
    #[serde(default)]
    pub token: Option<String>,
}

// ============================================================================
// HTTP
// ============================================================================

/// Files and folders changed after `since`.
pub async fn sync_changes(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    AppQuery(params): AppQuery<SinceParams>,
) -> Result<Json<JSend<CatchUp>>, ApiError> {
    Ok(JSend::success(
        state.sync.catch_up(&user.user_id, params.since)?,
    ))
}

pub async fn list_sync_events(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    AppQuery(params): AppQuery<SinceParams>,
) -> Result<Json<JSend<Vec<SyncEventRecord>>>, ApiError> {
    Ok(JSend::success(
        state.sync.events_since(&user.user_id, params.since)?,
    ))
}

pub async fn record_sync_event(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    AppJson(event): AppJson<ClientEvent>,
) -> Result<Json<JSend<SyncEventRecord>>, ApiError> {
    if event.event_type.trim().is_empty() {
        return Err(ApiError::bad_request("type is required"));
    }
    Ok(JSend::success(
        state.sync.record_client_event(&user.user_id, event)?,
    ))
}

// ============================================================================
// WebSocket
// ============================================================================

/// Upgrade to the real-time channel. The session must have been active more
/// recently than the socket idle timeout.
pub async fn sync_socket(
    State(state): State<Arc<AppState>>,
    AppQuery(params): AppQuery<SocketParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let token = params
        .token
        .filter(|t| !t.is_empty())
        .or_else(|| session_token(&headers))
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;
    let session = authenticate(
        &state.db,
        &token,
        state.config.session.socket_inactivity_timeout,
    )?;

    Ok(ws.on_upgrade(move |socket| run_socket(state, socket, session)))
}

async fn run_socket(state: Arc<AppState>, socket: WebSocket, session: SessionRecord) {
    let registry = state.sync.registry();
    let (handle, mut outbound) = registry.register(&session.user_id, &session.token);
    tracing::info!(connection_id = %handle.id, user_id = %session.user_id, "Sync connection opened");

    let (mut sink, mut inbound) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(msg) = outbound.recv().await {
            let text = match serde_json::to_string(&msg) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(event = msg.kind(), "Failed to encode sync message: {}", e);
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = inbound.next().await {
        match frame {
            Ok(Message::Text(text)) => handle_client_frame(&state, &handle, &text),
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    registry.unregister(&session.user_id, &handle.id);
    writer.abort();
    tracing::info!(connection_id = %handle.id, user_id = %session.user_id, "Sync connection closed");
}

fn handle_client_frame(state: &AppState, handle: &ConnectionHandle, text: &str) {
    let reply = match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::SyncRequest(req)) => {
            match state.sync.catch_up(&handle.owner_id, req.last_sync) {
                Ok(catch_up) => ServerMessage::SyncResponse(catch_up),
                Err(e) => {
                    tracing::error!(connection_id = %handle.id, "Catch-up query failed: {}", e);
                    ServerMessage::SyncError(SyncFailure {
                        message: "Sync failed".to_string(),
                    })
                }
            }
        }
        Err(e) => ServerMessage::SyncError(SyncFailure {
            message: format!("Invalid message: {e}"),
        }),
    };
    handle.try_send(reply);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::net::TcpListener;
    use tokio_tungstenite::{connect_async, tungstenite};

    use crate::api::create_router;
    use crate::testutil::{bearer_for, test_state};

    type Client = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    async fn serve(state: Arc<AppState>) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, create_router(state)).await.unwrap();
        });
        addr
    }

    async fn next_reply(ws: &mut Client) -> ServerMessage {
        let frame = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match ws.next().await {
                    Some(Ok(tungstenite::Message::Text(text))) => return text,
                    Some(Ok(_)) => continue,
                    other => panic!("socket ended: {other:?}"),
                }
            }
        })
        .await
        .unwrap();
        serde_json::from_str(&frame).unwrap()
    }

    #[tokio::test]
    async fn test_socket_answers_sync_requests() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let bearer = bearer_for(&state, "alice");
        let token = bearer.trim_start_matches("Bearer ");
        let docs = state
            .drive
            .create_folder("alice", "Docs", None, None)
            .await
            .unwrap();

        let addr = serve(Arc::clone(&state)).await;
        let (mut ws, _) = connect_async(format!("ws://{addr}/api/sync/ws?token={token}"))
            .await
            .unwrap();

        ws.send(tungstenite::Message::Text(
            r#"{"event":"sync:request","data":{"lastSync":null}}"#.into(),
        ))
        .await
        .unwrap();
        match next_reply(&mut ws).await {
            ServerMessage::SyncResponse(catch_up) => {
                assert_eq!(catch_up.folders.len(), 1);
                assert_eq!(catch_up.folders[0].id, docs.id);
                assert!(catch_up.files.is_empty());
            }
            other => panic!("unexpected message: {}", other.kind()),
        }

        ws.send(tungstenite::Message::Text("not json".into()))
            .await
            .unwrap();
        match next_reply(&mut ws).await {
            ServerMessage::SyncError(failure) => {
                assert!(failure.message.starts_with("Invalid message"));
            }
            other => panic!("unexpected message: {}", other.kind()),
        }

        ws.close(None).await.unwrap();
    }

    #[tokio::test]
    async fn test_socket_requires_session() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let addr = serve(state).await;

        let result = connect_async(format!("ws://{addr}/api/sync/ws?token=bogus")).await;
        match result {
            Err(tungstenite::Error::Http(response)) => {
                assert_eq!(response.status().as_u16(), 401);
            }
            other => panic!("expected an HTTP rejection, got {:?}", other.map(|_| ())),
        }
    }
}
