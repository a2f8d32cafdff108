use std::str::FromStr;

use axum::{
    extract::{Path, Query, State, rejection::QueryRejection},
    http::{HeaderName, HeaderValue, StatusCode},
    response::Response,
};
use metrics::counter;
use tracing::warn;

use crate::application::gate::{GateError, RenderStatus, TicketQuery};
use crate::domain::documents::DocumentKind;
use crate::presentation::views::{
    GateErrorTemplate, PrintTemplate, PrintView, render_template_response,
};

use super::RouterState;

static RENDER_STATUS_HEADER: HeaderName = HeaderName::from_static("x-render-status");

/// Print view navigated to by the headless engine. Every outcome answers
/// HTTP 200; the gate's verdict travels in the page marker and the
/// `x-render-status` header.
pub async fn render_view(
    State(state): State<RouterState>,
    Path(kind_slug): Path<String>,
    query: Result<Query<TicketQuery>, QueryRejection>,
) -> Response {
    let kind = match DocumentKind::from_str(&kind_slug) {
        Ok(kind) => kind,
        Err(_) => return gate_failure_page(RenderStatus::NotFound),
    };

    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => {
            warn!(
                target = "mindprint::gate",
                op = "render_view",
                kind = %kind,
                error = %rejection,
                "Render ticket query malformed"
            );
            return gate_failure_page(RenderStatus::Unauthorized);
        }
    };

    // Safe after authorize: the flag was covered by the verified signature.
    let watermark = query.watermark().unwrap_or(false);

    match state.gate.authorize(kind, &query).await {
        Ok(document) => {
            let overlay = watermark.then(|| state.watermark_text.clone());
            let view = PrintView::new(&document, overlay);
            with_status_header(
                render_template_response(
                    "infra::http::render_view",
                    PrintTemplate { view },
                    StatusCode::OK,
                ),
                RenderStatus::Ok,
            )
        }
        Err(err) => {
            counter!("mindprint_gate_rejected_total", "kind" => kind.as_str()).increment(1);
            if let GateError::Repo(repo_err) = &err {
                warn!(
                    target = "mindprint::gate",
                    op = "render_view",
                    kind = %kind,
                    error = %repo_err,
                    "Document store failure during render authorization"
                );
            }
            gate_failure_page(err.render_status())
        }
    }
}

fn gate_failure_page(status: RenderStatus) -> Response {
    with_status_header(
        render_template_response(
            "infra::http::render_view",
            GateErrorTemplate::for_status(status),
            StatusCode::OK,
        ),
        status,
    )
}

fn with_status_header(mut response: Response, status: RenderStatus) -> Response {
    response.headers_mut().insert(
        RENDER_STATUS_HEADER.clone(),
        HeaderValue::from_static(status.as_str()),
    );
    response
}
