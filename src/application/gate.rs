//! Authorization gate for the document print views.
//!
//! The render-view endpoint is navigated to by the headless engine, an
//! independent HTTP client with no session context. The only credential it
//! carries is the capability ticket in the query string, so the gate checks
//! the ticket before anything else and never touches the document store for
//! an invalid ticket.

use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::application::repos::{DocumentsRepo, RepoError};
use crate::application::ticket::{TicketCodec, TicketError};
use crate::domain::documents::{DocumentKind, DocumentRecord};

/// Query-string shape of a capability ticket as presented to the gate.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketQuery {
    pub document_id: String,
    pub exp: i64,
    pub wm: String,
    pub sig: String,
}

impl TicketQuery {
    pub fn watermark(&self) -> Result<bool, TicketError> {
        match self.wm.as_str() {
            "1" => Ok(true),
            "0" => Ok(false),
            _ => Err(TicketError::Malformed("watermark flag must be 0 or 1")),
        }
    }
}

/// Outcome the gate communicates to the render hop. The page always renders
/// with HTTP 200; this status travels as an `x-render-status` header and a
/// `render-status` meta marker so the orchestrator does not have to trust
/// substring search alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStatus {
    Ok,
    Unauthorized,
    NotFound,
    /// The gate itself failed (document store outage). Distinct from
    /// `NotFound` so an infra failure never reads as a missing document.
    Error,
}

impl RenderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Unauthorized => "unauthorized",
            Self::NotFound => "not-found",
            Self::Error => "error",
        }
    }
}

/// The marker element embedded in every gated page.
pub fn status_marker(status: RenderStatus) -> String {
    format!(r#"<meta name="render-status" content="{}">"#, status.as_str())
}

/// Inspect rendered page text for the gate's outcome. The structured marker
/// is authoritative; the legacy sentinel substrings are kept as a fallback
/// so pages from older deployments are still rejected.
pub fn detect_render_status(page_text: &str) -> RenderStatus {
    for status in [
        RenderStatus::Unauthorized,
        RenderStatus::NotFound,
        RenderStatus::Error,
        RenderStatus::Ok,
    ] {
        if page_text.contains(&status_marker(status)) {
            return status;
        }
    }

    let lowered = page_text.to_lowercase();
    if lowered.contains("not found") {
        return RenderStatus::NotFound;
    }
    if lowered.contains("unauthorized") || lowered.contains("forbidden") {
        return RenderStatus::Unauthorized;
    }
    RenderStatus::Ok
}

#[derive(Debug, Error)]
pub enum GateError {
    #[error("ticket rejected: {0}")]
    Unauthorized(#[source] TicketError),
    #[error("document not found")]
    NotFound,
    #[error(transparent)]
    Repo(RepoError),
}

impl GateError {
    pub fn render_status(&self) -> RenderStatus {
        match self {
            Self::Unauthorized(_) => RenderStatus::Unauthorized,
            Self::NotFound => RenderStatus::NotFound,
            Self::Repo(_) => RenderStatus::Error,
        }
    }
}

/// Server-side check a print view performs before revealing content.
#[derive(Clone)]
pub struct RenderGateService {
    codec: TicketCodec,
    documents: Arc<dyn DocumentsRepo>,
}

impl RenderGateService {
    pub fn new(codec: TicketCodec, documents: Arc<dyn DocumentsRepo>) -> Self {
        Self { codec, documents }
    }

    /// Verify the ticket, then fetch the document it names. Fail closed:
    /// any ticket failure returns `Unauthorized` without querying the
    /// document store, so an invalid ticket can never probe for existence.
    pub async fn authorize(
        &self,
        kind: DocumentKind,
        query: &TicketQuery,
    ) -> Result<DocumentRecord, GateError> {
        let watermark = query.watermark().map_err(GateError::Unauthorized)?;
        self.codec
            .verify(kind, &query.document_id, query.exp, watermark, &query.sig)
            .map_err(|err| {
                warn!(
                    target = "mindprint::gate",
                    op = "gate::authorize",
                    result = "rejected",
                    kind = %kind,
                    error = %err,
                    "Capability ticket rejected"
                );
                GateError::Unauthorized(err)
            })?;

        let document = self
            .documents
            .fetch_document(kind, &query.document_id)
            .await
            .map_err(GateError::Repo)?
            .ok_or(GateError::NotFound)?;

        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ticket::TICKET_TTL_SECONDS;
    use crate::config::SigningSecret;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use time::OffsetDateTime;

    struct CountingDocuments {
        document: Option<DocumentRecord>,
        fetches: AtomicUsize,
    }

    impl CountingDocuments {
        fn with(document: Option<DocumentRecord>) -> Arc<Self> {
            Arc::new(Self {
                document,
                fetches: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl DocumentsRepo for CountingDocuments {
        async fn fetch_document(
            &self,
            _kind: DocumentKind,
            _document_id: &str,
        ) -> Result<Option<DocumentRecord>, RepoError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.document.clone())
        }
    }

    fn sample_document() -> DocumentRecord {
        DocumentRecord {
            id: "doc-1".into(),
            kind: DocumentKind::Resume,
            owner_account_id: "acct-1".into(),
            title: "Senior Engineer".into(),
            body: "First paragraph.\n\nSecond paragraph.".into(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    fn codec() -> TicketCodec {
        TicketCodec::new(SigningSecret::for_tests("0123456789abcdef0123456789abcdef"))
    }

    fn query_for(codec: &TicketCodec, watermark: bool) -> TicketQuery {
        let ticket = codec
            .mint(DocumentKind::Resume, "doc-1", TICKET_TTL_SECONDS, watermark)
            .expect("mint");
        TicketQuery {
            document_id: ticket.document_id,
            exp: ticket.expires_at_unix,
            wm: if watermark { "1".into() } else { "0".into() },
            sig: ticket.signature,
        }
    }

    #[tokio::test]
    async fn valid_ticket_yields_document() {
        let codec = codec();
        let documents = CountingDocuments::with(Some(sample_document()));
        let gate = RenderGateService::new(codec.clone(), documents.clone());

        let document = gate
            .authorize(DocumentKind::Resume, &query_for(&codec, true))
            .await
            .expect("authorized");
        assert_eq!(document.id, "doc-1");
        assert_eq!(documents.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn forged_signature_never_touches_store() {
        let codec = codec();
        let documents = CountingDocuments::with(Some(sample_document()));
        let gate = RenderGateService::new(codec.clone(), documents.clone());

        let mut query = query_for(&codec, true);
        query.sig = hex::encode([0u8; 32]);
        let err = gate
            .authorize(DocumentKind::Resume, &query)
            .await
            .expect_err("forged");
        assert!(matches!(
            err,
            GateError::Unauthorized(TicketError::InvalidSignature)
        ));
        assert_eq!(documents.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn tampered_watermark_flag_is_unauthorized() {
        let codec = codec();
        let documents = CountingDocuments::with(Some(sample_document()));
        let gate = RenderGateService::new(codec.clone(), documents.clone());

        let mut query = query_for(&codec, true);
        query.wm = "0".into();
        let err = gate
            .authorize(DocumentKind::Resume, &query)
            .await
            .expect_err("tampered");
        assert!(matches!(err, GateError::Unauthorized(_)));
        assert_eq!(documents.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_document_is_not_found() {
        let codec = codec();
        let gate = RenderGateService::new(codec.clone(), CountingDocuments::with(None));

        let err = gate
            .authorize(DocumentKind::Resume, &query_for(&codec, false))
            .await
            .expect_err("missing");
        assert!(matches!(err, GateError::NotFound));
    }

    struct FailingDocuments;

    #[async_trait]
    impl DocumentsRepo for FailingDocuments {
        async fn fetch_document(
            &self,
            _kind: DocumentKind,
            _document_id: &str,
        ) -> Result<Option<DocumentRecord>, RepoError> {
            Err(RepoError::Persistence("connection reset".into()))
        }
    }

    #[tokio::test]
    async fn store_failure_renders_as_error_not_missing_document() {
        let codec = codec();
        let gate = RenderGateService::new(codec.clone(), Arc::new(FailingDocuments));

        let err = gate
            .authorize(DocumentKind::Resume, &query_for(&codec, false))
            .await
            .expect_err("store down");
        assert!(matches!(err, GateError::Repo(_)));
        assert_eq!(err.render_status(), RenderStatus::Error);
    }

    #[test]
    fn marker_detection_prefers_structured_signal() {
        let page = format!("<html>{}<h1>All good</h1></html>", status_marker(RenderStatus::Ok));
        assert_eq!(detect_render_status(&page), RenderStatus::Ok);

        let page = format!("<html>{}</html>", status_marker(RenderStatus::NotFound));
        assert_eq!(detect_render_status(&page), RenderStatus::NotFound);

        let page = format!("<html>{}</html>", status_marker(RenderStatus::Error));
        assert_eq!(detect_render_status(&page), RenderStatus::Error);
    }

    #[test]
    fn sentinel_substrings_still_reject() {
        assert_eq!(
            detect_render_status("<h1>Unauthorized</h1>"),
            RenderStatus::Unauthorized
        );
        assert_eq!(
            detect_render_status("<h1>NOT FOUND</h1>"),
            RenderStatus::NotFound
        );
        assert_eq!(
            detect_render_status("<p>forbidden</p>"),
            RenderStatus::Unauthorized
        );
        assert_eq!(detect_render_status("<p>hello</p>"), RenderStatus::Ok);
    }
}
