use std::io;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use futures::TryStreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::debug;

use stash_core::StashError;

use crate::auth::RequireApiKey;
use crate::error::ServerResult;
use crate::state::AppState;

pub const DEFAULT_PAGE_LIMIT: usize = 100;
pub const MAX_PAGE_LIMIT: usize = 1000;

/// Downloads are immutable, so clients may cache them for 30 days.
pub const DOWNLOAD_CACHE_CONTROL: &str = "max-age=2592000";

/// Raw `limit` / `offset` query parameters.
///
/// Values that do not parse or fall out of range are ignored in favour of
/// the defaults.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub limit: Option<String>,
    pub offset: Option<String>,
}

impl ListParams {
    pub fn resolve(&self) -> (usize, usize) {
        let limit = self
            .limit
            .as_deref()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|l| (1..=MAX_PAGE_LIMIT).contains(l))
            .unwrap_or(DEFAULT_PAGE_LIMIT);
        let offset = self
            .offset
            .as_deref()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        (limit, offset)
    }
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `PUT /upload`: the raw request body is the asset.
pub async fn upload(
    _auth: RequireApiKey,
    State(state): State<AppState>,
    body: Body,
) -> ServerResult<(StatusCode, Json<Value>)> {
    let stream = body.into_data_stream().map_err(io::Error::other);
    let outcome = state.store.ingest(StreamReader::new(stream)).await?;

    if outcome.is_new_upload {
        Ok((
            StatusCode::CREATED,
            Json(json!({ "success": true, "asset": outcome.record })),
        ))
    } else {
        Ok((
            StatusCode::OK,
            Json(json!({ "success": true, "asset": outcome.record, "deduped": true })),
        ))
    }
}

/// `GET /assets?limit&offset`
pub async fn list(
    _auth: RequireApiKey,
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ServerResult<Json<Value>> {
    let (limit, offset) = params.resolve();
    let page = state.store.list(limit, offset).await?;
    Ok(Json(json!({
        "success": true,
        "total": page.total,
        "limit": page.limit,
        "offset": page.offset,
        "assets": page.assets,
    })))
}

/// `GET /assets/{name}`: public, streams the bytes.
pub async fn download(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ServerResult<Response> {
    let download = state.store.retrieve(&name).await?;
    let disposition = HeaderValue::from_str(&format!("inline; filename={}", download.file_name))
        .map_err(|_| StashError::InvalidIdentifier(name.clone()))?;
    let content_type = HeaderValue::from_str(&download.media_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    debug!(name = %name, size = download.size, "serving download");

    let headers = [
        (CONTENT_TYPE, content_type),
        (CONTENT_LENGTH, HeaderValue::from(download.size)),
        (CONTENT_DISPOSITION, disposition),
        (CACHE_CONTROL, HeaderValue::from_static(DOWNLOAD_CACHE_CONTROL)),
    ];
    let body = Body::from_stream(ReaderStream::new(download.reader));
    Ok((headers, body).into_response())
}

/// `DELETE /assets/{id}`
pub async fn delete(
    _auth: RequireApiKey,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ServerResult<Json<Value>> {
    state.store.delete(&id).await?;
    Ok(Json(json!({ "success": true })))
}
