use axum::{
    Json,
    Extension,
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use tracing::error;
use uuid::Uuid;

use parley_gateway::router::{Destination, conversation_key};
use parley_types::api::{Claims, UploadQuery, UploadResponse};
use parley_types::models::{FileInfo, Message, MessageKind, timestamp_now};

use crate::auth::AppState;

/// 50 MB upload limit for files
const MAX_FILE_SIZE: usize = 50 * 1024 * 1024;

/// POST /upload?target=...&filename=... — accepts raw bytes, stores them
/// under the upload directory, then constructs a file message and routes it
/// exactly like a live send (room broadcast or two-party delivery).
pub async fn upload_file(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    bytes: Bytes,
) -> Result<impl IntoResponse, StatusCode> {
    if bytes.is_empty() || query.target.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    if bytes.len() > MAX_FILE_SIZE {
        return Err(StatusCode::PAYLOAD_TOO_LARGE);
    }

    // Strip any path components to keep uploads inside the upload dir.
    let original_name = std::path::Path::new(&query.filename)
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or(StatusCode::BAD_REQUEST)?
        .to_string();

    let mime = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();

    tokio::fs::create_dir_all(&state.upload_dir).await.map_err(|e| {
        error!("Failed to create upload directory: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let stored_name = format!("{}-{}", Uuid::new_v4(), original_name);
    let path = state.upload_dir.join(&stored_name);
    tokio::fs::write(&path, &bytes).await.map_err(|e| {
        error!("Failed to write upload {}: {}", path.display(), e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let file = FileInfo {
        url: format!("/uploads/{stored_name}"),
        name: original_name,
        mime,
    };

    let message = match Destination::parse(&query.target) {
        Destination::Room(room) => Message {
            id: Uuid::new_v4(),
            kind: MessageKind::File,
            from: claims.username.clone(),
            to: None,
            room: Some(room),
            convo_id: None,
            body: None,
            file: Some(file.clone()),
            timestamp: timestamp_now(),
        },
        Destination::Direct(to) => Message {
            id: Uuid::new_v4(),
            kind: MessageKind::File,
            from: claims.username.clone(),
            convo_id: Some(conversation_key(&claims.username, &to)),
            to: Some(to),
            room: None,
            body: None,
            file: Some(file.clone()),
            timestamp: timestamp_now(),
        },
    };

    state.gateway.store.append(&message).await.map_err(|e| {
        error!("Failed to persist file message: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    state.gateway.router.deliver(&message).await;

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            url: file.url,
            name: file.name,
            mime: file.mime,
        }),
    ))
}
