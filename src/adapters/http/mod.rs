//! HTTP inbound adapter.
//!
//! Three surfaces share one router: the relay's publish lifecycle webhooks,
//! the service-to-service transcoder endpoints and the viewer-facing
//! admission endpoint. Request verification/signing sits in front of this
//! service and is not handled here.

pub mod publish;
pub mod transcoder;
pub mod viewer;

use crate::application::dispatcher::DispatchService;
use crate::application::publish::PublishService;
use crate::ports::transcoder::Transcoder;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

pub struct AppState {
    pub publish: PublishService,
    pub dispatch: DispatchService,
    pub transcoder: Arc<dyn Transcoder>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/stream/on_publish", post(publish::on_publish))
        .route("/api/stream/on_publish_done", post(publish::on_publish_done))
        .route("/api/stream/set_source_info", post(transcoder::set_source_info))
        .route("/api/user/origen", get(publish::origen))
        .route("/api/transcoder/start", post(transcoder::start))
        .route("/api/transcoder/stop", post(transcoder::stop))
        .route("/start", get(viewer::start))
        .with_state(state)
}
