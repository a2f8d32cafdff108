mod export;
mod middleware;
mod render_view;

pub use middleware::RequestContext;

use std::sync::Arc;

use axum::{
    Router,
    http::StatusCode,
    middleware as axum_middleware,
    routing::{get, post},
};

use crate::application::{export::ExportService, gate::RenderGateService};

use middleware::{log_responses, set_request_context};

#[derive(Clone)]
pub struct RouterState {
    pub export: Arc<ExportService>,
    pub gate: Arc<RenderGateService>,
    pub watermark_text: String,
}

pub fn build_router(state: RouterState) -> Router {
    Router::new()
        .route("/export", post(export::export))
        .route("/render-view/{kind}", get(render_view::render_view))
        .route("/healthz", get(healthz))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}

async fn healthz() -> StatusCode {
    StatusCode::NO_CONTENT
}
