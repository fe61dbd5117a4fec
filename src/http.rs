//! HTTP transport
//!
//! Routes:
//! - `GET /alive`
//! - `POST /upload-image` (multipart, field `file`; optional `session_id`)
//! - `GET|POST /analyse-object?session_id=...`
//! - `GET /get-3d-model?session_id=...`

use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tokio::net::TcpListener;

use crate::api::{ApiFailure, AppState};

/// Largest accepted upload
pub const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Default, Deserialize)]
pub struct SessionQuery {
    pub session_id: Option<String>,
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/alive", get(alive))
        .route(
            "/upload-image",
            axum::routing::post(upload_image).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/analyse-object", get(analyse_object).post(analyse_object))
        .route("/get-3d-model", get(get_3d_model))
        .with_state(state)
}

/// Serve until the listener fails
pub async fn serve(state: AppState, bind_addr: &str) -> std::io::Result<()> {
    let listener = TcpListener::bind(bind_addr).await?;
    tracing::info!("HTTP server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state)).await
}

async fn alive(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.alive())
}

async fn upload_image(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiFailure> {
    let mut session = query.session_id;
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiFailure::bad_request(format!("Malformed upload: {}", e)))?
    {
        match field.name() {
            Some("session_id") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiFailure::bad_request(format!("Malformed session id: {}", e)))?;
                session = Some(text);
            }
            Some("file") => {
                let file_name = field.file_name().unwrap_or("upload.jpg").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiFailure::bad_request(format!("Malformed upload: {}", e)))?;
                upload = Some((file_name, bytes.to_vec()));
            }
            _ => {}
        }
    }

    let (file_name, bytes) = upload.ok_or_else(|| ApiFailure::bad_request("No file field in upload"))?;
    let response = state.upload_image(session.as_deref(), &file_name, &bytes).await?;
    Ok(Json(response))
}

async fn analyse_object(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Result<impl IntoResponse, ApiFailure> {
    let session = required_session(query)?;
    let response = state.analyse(&session).await?;
    Ok(Json(response))
}

async fn get_3d_model(
    State(state): State<AppState>,
    Query(query): Query<SessionQuery>,
) -> Result<impl IntoResponse, ApiFailure> {
    let session = required_session(query)?;
    let model = state.model(&session).await?;

    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", model.file_name))
        .map_err(|e| ApiFailure::internal(e.to_string()))?;
    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("model/obj")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        model.bytes,
    ))
}

fn required_session(query: SessionQuery) -> Result<String, ApiFailure> {
    query
        .session_id
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ApiFailure::bad_request("Missing session_id"))
}
