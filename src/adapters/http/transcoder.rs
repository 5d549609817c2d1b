//! Service-to-service transcoder endpoints.

use super::AppState;
use crate::application::publish::PublishError;
use crate::application::transcode::TranscodeError;
use crate::domain::stream::{Quality, SourceInfo};
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use tracing::error;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub user_id: String,
    pub source: String,
}

/// 200 once the encoder process has been spawned, not once it produces
/// output.
pub async fn start(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartRequest>,
) -> StatusCode {
    match state.transcoder.start(&req.user_id, &req.source).await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            error!("failed to start transcoding for {}: {}", req.user_id, e);
            match e.downcast_ref::<TranscodeError>() {
                Some(TranscodeError::AlreadyRunning(_)) => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            }
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopRequest {
    pub user_id: String,
}

pub async fn stop(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StopRequest>,
) -> StatusCode {
    match state.transcoder.stop(&req.user_id).await {
        Ok(true) => StatusCode::OK,
        Ok(false) => StatusCode::NOT_FOUND,
        Err(e) => {
            error!("failed to stop transcoding for {}: {}", req.user_id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceInfoRequest {
    pub user_id: String,
    pub width: u32,
    pub height: u32,
    pub display_aspect_ratio: String,
    pub qualities: Vec<Quality>,
}

/// Best-effort metadata push from the encoder tier.
pub async fn set_source_info(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SourceInfoRequest>,
) -> StatusCode {
    let info = SourceInfo {
        width: req.width,
        height: req.height,
        display_aspect_ratio: req.display_aspect_ratio,
    };
    match state
        .publish
        .set_source_info(&req.user_id, info, &req.qualities)
        .await
    {
        Ok(()) => StatusCode::OK,
        Err(PublishError::Rejected(_)) => StatusCode::NOT_FOUND,
        Err(e) => {
            error!("failed to set source info for {}: {}", req.user_id, e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
