//! Publish lifecycle webhooks, invoked by the ingest relay.
//!
//! The relay posts an urlencoded `name` field and continues only on 200;
//! any validation failure answers 403 with no state mutated.

use super::AppState;
use crate::application::publish::PublishError;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Form;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error};

#[derive(Debug, Deserialize)]
pub struct PublishPayload {
    pub name: String,
}

fn status_for(err: &PublishError) -> StatusCode {
    match err {
        PublishError::Rejected(_) => StatusCode::FORBIDDEN,
        PublishError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub async fn on_publish(
    State(state): State<Arc<AppState>>,
    Form(payload): Form<PublishPayload>,
) -> StatusCode {
    match state.publish.publish_start(&payload.name).await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            debug!("publish rejected for {}: {}", payload.name, e);
            status_for(&e)
        }
    }
}

pub async fn on_publish_done(
    State(state): State<Arc<AppState>>,
    Form(payload): Form<PublishPayload>,
) -> StatusCode {
    match state.publish.publish_stop(&payload.name).await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            debug!("publish stop rejected for {}: {}", payload.name, e);
            status_for(&e)
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct OrigenQuery {
    pub id: String,
}

/// Service-internal stream key lookup.
pub async fn origen(
    State(state): State<Arc<AppState>>,
    Query(query): Query<OrigenQuery>,
) -> Result<String, StatusCode> {
    match state.publish.stream_key(&query.id).await {
        Ok(Some(key)) => Ok(key),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            error!("stream key lookup failed for {}: {}", query.id, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
