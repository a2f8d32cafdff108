use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;

use crate::application::error::ErrorReport;
use crate::application::gate::RenderStatus;
use crate::domain::documents::DocumentRecord;

#[derive(Debug, Error)]
#[error("template rendering failed")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl IntoResponse for TemplateRenderError {
    fn into_response(self) -> Response {
        let mut response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
        ErrorReport::from_error(self.source, StatusCode::INTERNAL_SERVER_ERROR, &self.error)
            .attach(&mut response);
        response
    }
}

pub fn render_template<T: Template>(
    source: &'static str,
    template: T,
) -> Result<Html<String>, TemplateRenderError> {
    template
        .render()
        .map(Html)
        .map_err(|error| TemplateRenderError { source, error })
}

pub fn render_template_response<T: Template>(
    source: &'static str,
    template: T,
    status: StatusCode,
) -> Response {
    match render_template(source, template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

/// One rendered line of a document body. Blank source lines become visual
/// spacers so generated documents keep their paragraph rhythm in print.
#[derive(Clone)]
pub struct ParagraphView {
    pub text: String,
}

impl ParagraphView {
    pub fn is_spacer(&self) -> bool {
        self.text.is_empty()
    }
}

#[derive(Clone)]
pub struct PrintView {
    pub title: String,
    pub kind_label: &'static str,
    pub paragraphs: Vec<ParagraphView>,
    /// Watermark overlay text; `None` for watermark-free exports.
    pub watermark: Option<String>,
}

impl PrintView {
    pub fn new(document: &DocumentRecord, watermark: Option<String>) -> Self {
        let paragraphs = document
            .body
            .lines()
            .map(|line| ParagraphView {
                text: line.trim_end().to_string(),
            })
            .collect();
        Self {
            title: document.title.clone(),
            kind_label: document.kind.display_name(),
            paragraphs,
            watermark,
        }
    }
}

#[derive(Template)]
#[template(path = "print/document.html")]
pub struct PrintTemplate {
    pub view: PrintView,
}

/// Gate failure page. Always served with HTTP 200 so the headless engine
/// never sees a transport error; the outcome travels in the status marker.
#[derive(Template)]
#[template(path = "print/error.html")]
pub struct GateErrorTemplate {
    pub status: &'static str,
    pub heading: &'static str,
    pub message: &'static str,
}

impl GateErrorTemplate {
    pub fn for_status(status: RenderStatus) -> Self {
        match status {
            RenderStatus::NotFound => Self {
                status: status.as_str(),
                heading: "Not found",
                message: "The requested document does not exist.",
            },
            RenderStatus::Error => Self {
                status: status.as_str(),
                heading: "Render failed",
                message: "The document could not be loaded. Try again shortly.",
            },
            RenderStatus::Unauthorized | RenderStatus::Ok => Self {
                status: RenderStatus::Unauthorized.as_str(),
                heading: "Unauthorized",
                message: "This page requires a valid render ticket.",
            },
        }
    }
}
