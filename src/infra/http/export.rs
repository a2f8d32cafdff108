use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{AUTHORIZATION, CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;

use crate::application::{
    error::{ErrorReport, ExportError},
    export::{ExportOutput, ExportRequest},
    identity::IdentityError,
};
use crate::domain::documents::DocumentKind;

use super::RouterState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportBody {
    pub document_kind: DocumentKind,
    pub document_id: String,
}

pub async fn export(
    State(state): State<RouterState>,
    headers: HeaderMap,
    payload: Result<Json<ExportBody>, JsonRejection>,
) -> Response {
    let body = match payload {
        Ok(Json(body)) => body,
        Err(rejection) => return bad_request(rejection),
    };

    let token = match bearer_token(&headers) {
        Some(token) => token,
        None => {
            return ExportError::AuthenticationFailed(IdentityError::InvalidToken).into_response();
        }
    };

    let request = ExportRequest {
        kind: body.document_kind,
        document_id: body.document_id,
        bearer_token: token,
    };

    match state.export.export(request).await {
        Ok(output) => pdf_response(output),
        Err(err) => err.into_response(),
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_string())
}

fn bad_request(rejection: JsonRejection) -> Response {
    let mut response = (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "error": "INVALID_REQUEST",
            "message": "Request body must name a documentKind and documentId.",
        })),
    )
        .into_response();
    ErrorReport::from_error(
        "infra::http::export",
        StatusCode::BAD_REQUEST,
        &rejection,
    )
    .attach(&mut response);
    response
}

fn pdf_response(output: ExportOutput) -> Response {
    let disposition = format!("attachment; filename=\"{}\"", output.filename);
    let mut response = output.pdf.into_response();
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/pdf"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(CONTENT_DISPOSITION, value);
    }
    response
}
