//! Viewer-triggered admission endpoint.
//!
//! `GET /start?uri=/hls/public-<id>_<quality>.m3u8` answers 204 without
//! waiting on any transcoding; the player retries the playlist until the
//! first segments land on disk.

use super::AppState;
use crate::application::dispatcher::DispatchError;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use tracing::error;

#[derive(Debug, Deserialize)]
pub struct StartQuery {
    pub uri: String,
}

pub async fn start(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StartQuery>,
) -> StatusCode {
    match state.dispatch.request_rendition(&query.uri).await {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(DispatchError::InvalidUri(e)) => {
            error!("invalid viewer uri {}: {}", query.uri, e);
            StatusCode::BAD_REQUEST
        }
        Err(DispatchError::UnknownStream(_)) => StatusCode::NOT_FOUND,
        Err(e) => {
            error!("dispatch failed for {}: {}", query.uri, e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
