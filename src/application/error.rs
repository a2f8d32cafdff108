//! Error taxonomy for the export pipeline.
//!
//! Quota and authentication failures are classified locally and returned as
//! structured, user-actionable JSON; engine-level failures surface as opaque
//! 500s whose diagnostic detail travels only in the attached `ErrorReport`
//! for the logging middleware, never in the response body.

use std::error::Error as StdError;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::application::engine::EngineError;
use crate::application::identity::IdentityError;
use crate::application::repos::RepoError;
use crate::application::ticket::TicketError;
use crate::application::usage::QuotaExceeded;
use crate::domain::accounts::Plan;
use crate::infra::error::InfraError;

/// Internal diagnostic record attached to failed responses and consumed by
/// the response-logging middleware.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("authentication failed")]
    AuthenticationFailed(#[source] IdentityError),
    #[error("daily export limit of {limit} reached for plan {plan}")]
    QuotaExceeded { plan: Plan, limit: u32 },
    #[error("document is owned by another account")]
    OwnershipMismatch,
    #[error("document not found")]
    DocumentNotFound,
    #[error("render view reported an authorization failure")]
    RenderAuthorizationFailed,
    #[error("render timed out")]
    RenderTimeout { elapsed_ms: u64 },
    #[error("render engine failure")]
    Engine(#[source] EngineError),
    #[error("ticket failure during render hop")]
    Ticket(#[source] TicketError),
    #[error(transparent)]
    Repo(RepoError),
    #[error("identity provider unavailable")]
    IdentityUnavailable(#[source] IdentityError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl ExportError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::AuthenticationFailed(_) => StatusCode::UNAUTHORIZED,
            Self::QuotaExceeded { .. } => StatusCode::PAYMENT_REQUIRED,
            Self::OwnershipMismatch | Self::RenderAuthorizationFailed => StatusCode::FORBIDDEN,
            Self::DocumentNotFound => StatusCode::NOT_FOUND,
            Self::RenderTimeout { .. }
            | Self::Engine(_)
            | Self::Ticket(_)
            | Self::Repo(_)
            | Self::IdentityUnavailable(_)
            | Self::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for the response body.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed(_) => "AUTHENTICATION_FAILED",
            Self::QuotaExceeded { .. } => "EXPORT_LIMIT_REACHED",
            Self::OwnershipMismatch => "FORBIDDEN",
            Self::RenderAuthorizationFailed => "RENDER_AUTHORIZATION_FAILED",
            Self::DocumentNotFound => "DOCUMENT_NOT_FOUND",
            Self::RenderTimeout { .. }
            | Self::Engine(_)
            | Self::Ticket(_)
            | Self::Repo(_)
            | Self::IdentityUnavailable(_)
            | Self::Unexpected(_) => "RENDER_FAILED",
        }
    }

    fn public_body(&self) -> serde_json::Value {
        match self {
            Self::AuthenticationFailed(_) => json!({
                "error": self.code(),
                "message": "Please sign in again.",
            }),
            Self::QuotaExceeded { plan, limit } => json!({
                "error": self.code(),
                "message": "Daily export limit reached. Upgrade your plan to export more documents.",
                "plan": plan.as_str(),
                "limit": limit,
            }),
            Self::OwnershipMismatch => json!({
                "error": self.code(),
                "message": "This document belongs to another account.",
            }),
            Self::RenderAuthorizationFailed => json!({
                "error": self.code(),
                "message": "The document could not be rendered.",
            }),
            Self::DocumentNotFound => json!({
                "error": self.code(),
                "message": "Document not found.",
            }),
            _ => json!({
                "error": self.code(),
                "message": "PDF export failed. Please try again.",
            }),
        }
    }
}

impl From<QuotaExceeded> for ExportError {
    fn from(err: QuotaExceeded) -> Self {
        Self::QuotaExceeded {
            plan: err.plan,
            limit: err.limit,
        }
    }
}

impl From<RepoError> for ExportError {
    fn from(err: RepoError) -> Self {
        Self::Repo(err)
    }
}

impl IntoResponse for ExportError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let report = ErrorReport::from_error("application::error::ExportError", status, &self);
        let mut response = (status, Json(self.public_body())).into_response();
        report.attach(&mut response);
        response
    }
}

/// Top-level application error for startup and serving paths.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_body_carries_plan_and_limit() {
        let err = ExportError::QuotaExceeded {
            plan: Plan::Free,
            limit: 1,
        };
        assert_eq!(err.status_code(), StatusCode::PAYMENT_REQUIRED);
        let body = err.public_body();
        assert_eq!(body["error"], "EXPORT_LIMIT_REACHED");
        assert_eq!(body["plan"], "FREE");
        assert_eq!(body["limit"], 1);
    }

    #[test]
    fn engine_failures_are_opaque() {
        let err = ExportError::Engine(EngineError::Cli {
            exit_code: Some(9),
            stderr: "chrome exploded with secret=abc".into(),
        });
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = err.public_body().to_string();
        assert!(!body.contains("secret"));
        assert!(!body.contains("exploded"));
    }

    #[test]
    fn ticket_failures_surface_as_generic_render_failure() {
        let err = ExportError::Ticket(TicketError::InvalidSignature);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code(), "RENDER_FAILED");
    }
}
