//! End-to-end export orchestration.
//!
//! One request, one pass through the state machine: authenticate, resolve
//! entitlement, check quota, mint a capability ticket, drive the headless
//! engine through the gated print view, capture the PDF, then commit usage.
//! The engine session is owned by this function and dropped on every exit
//! path. At most one render attempt per request; the quota is committed
//! only after a successful capture.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use metrics::{counter, histogram};
use tracing::{info, warn};
use url::Url;

use crate::application::engine::{EngineError, RenderEngine};
use crate::application::entitlements::EntitlementResolver;
use crate::application::error::ExportError;
use crate::application::gate::{RenderStatus, detect_render_status};
use crate::application::identity::{IdentityError, IdentityVerifier};
use crate::application::repos::{AccountsRepo, DocumentsRepo};
use crate::application::ticket::{TICKET_TTL_SECONDS, TicketCodec};
use crate::application::usage::UsageMeter;
use crate::domain::accounts::AccountRecord;
use crate::domain::documents::DocumentKind;

/// Stages of the export state machine, used for structured logging. A
/// failure in any stage short-circuits to the terminal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportStage {
    Authenticating,
    ResolvingEntitlement,
    CheckingQuota,
    MintingTicket,
    LaunchingRender,
    Navigating,
    Capturing,
    CommittingUsage,
    Done,
}

impl ExportStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Authenticating => "authenticating",
            Self::ResolvingEntitlement => "resolving_entitlement",
            Self::CheckingQuota => "checking_quota",
            Self::MintingTicket => "minting_ticket",
            Self::LaunchingRender => "launching_render",
            Self::Navigating => "navigating",
            Self::Capturing => "capturing",
            Self::CommittingUsage => "committing_usage",
            Self::Done => "done",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub kind: DocumentKind,
    pub document_id: String,
    pub bearer_token: String,
}

#[derive(Debug)]
pub struct ExportOutput {
    pub pdf: Bytes,
    pub filename: &'static str,
    pub watermarked: bool,
}

#[derive(Clone)]
pub struct ExportService {
    identity: Arc<dyn IdentityVerifier>,
    accounts: Arc<dyn AccountsRepo>,
    documents: Arc<dyn DocumentsRepo>,
    entitlements: EntitlementResolver,
    usage: UsageMeter,
    codec: TicketCodec,
    engine: Arc<dyn RenderEngine>,
    base_url: Url,
}

impl ExportService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        identity: Arc<dyn IdentityVerifier>,
        accounts: Arc<dyn AccountsRepo>,
        documents: Arc<dyn DocumentsRepo>,
        entitlements: EntitlementResolver,
        usage: UsageMeter,
        codec: TicketCodec,
        engine: Arc<dyn RenderEngine>,
        base_url: Url,
    ) -> Self {
        Self {
            identity,
            accounts,
            documents,
            entitlements,
            usage,
            codec,
            engine,
            base_url,
        }
    }

    pub async fn export(&self, request: ExportRequest) -> Result<ExportOutput, ExportError> {
        let started_at = Instant::now();
        let result = self.run(&request).await;

        match &result {
            Ok(output) => {
                counter!("mindprint_export_total", "kind" => request.kind.as_str()).increment(1);
                histogram!("mindprint_render_ms")
                    .record(started_at.elapsed().as_millis() as f64);
                info!(
                    target = "mindprint::export",
                    op = "export",
                    result = "ok",
                    kind = %request.kind,
                    document_id = %request.document_id,
                    watermarked = output.watermarked,
                    pdf_bytes = output.pdf.len(),
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    "Export completed"
                );
            }
            Err(err) => {
                counter!("mindprint_export_rejected_total", "reason" => err.code()).increment(1);
                warn!(
                    target = "mindprint::export",
                    op = "export",
                    result = "error",
                    kind = %request.kind,
                    document_id = %request.document_id,
                    error = %err,
                    elapsed_ms = started_at.elapsed().as_millis() as u64,
                    "Export failed"
                );
            }
        }

        result
    }

    async fn run(&self, request: &ExportRequest) -> Result<ExportOutput, ExportError> {
        self.trace(ExportStage::Authenticating, request);
        let caller = self
            .identity
            .verify_bearer(&request.bearer_token)
            .await
            .map_err(|err| match err {
                IdentityError::InvalidToken => ExportError::AuthenticationFailed(err),
                IdentityError::Unavailable(_) => ExportError::IdentityUnavailable(err),
            })?;

        self.trace(ExportStage::ResolvingEntitlement, request);
        let account = self
            .accounts
            .fetch_account(&caller.account_id)
            .await?
            .unwrap_or_else(|| AccountRecord::unseen(&caller.account_id));
        let entitlement = self.entitlements.resolve(&account, caller.email.as_deref());

        self.trace(ExportStage::CheckingQuota, request);
        let today = self.usage.today();
        self.usage.check_quota(&account, &entitlement, today)?;

        // Cheap pre-flight against the document store so missing or foreign
        // documents fail before a browser is ever launched. The gate
        // re-checks existence at render time.
        let document = self
            .documents
            .fetch_document(request.kind, &request.document_id)
            .await?
            .ok_or(ExportError::DocumentNotFound)?;
        if document.owner_account_id != caller.account_id {
            return Err(ExportError::OwnershipMismatch);
        }

        self.trace(ExportStage::MintingTicket, request);
        let ticket = self
            .codec
            .mint(
                request.kind,
                &request.document_id,
                TICKET_TTL_SECONDS,
                entitlement.watermark_enabled,
            )
            .map_err(ExportError::Ticket)?;
        let print_url = self.print_url(request.kind, &ticket.query_string())?;

        self.trace(ExportStage::LaunchingRender, request);
        let mut session = self
            .engine
            .acquire()
            .await
            .map_err(map_engine_error)?;

        self.trace(ExportStage::Navigating, request);
        session.navigate(&print_url).await.map_err(map_engine_error)?;

        // Navigation success does not imply semantic success: the gate
        // answers HTTP 200 with an error page when the ticket or document
        // is bad. Inspect the page before taking its PDF; both come from
        // the same load, so the PDF cannot describe a different render.
        let page_text = session.page_text().await.map_err(map_engine_error)?;
        match detect_render_status(&page_text) {
            RenderStatus::Ok => {}
            RenderStatus::NotFound => return Err(ExportError::DocumentNotFound),
            RenderStatus::Unauthorized => return Err(ExportError::RenderAuthorizationFailed),
            RenderStatus::Error => {
                return Err(ExportError::Unexpected(
                    "render view reported a document store failure".to_string(),
                ));
            }
        }

        self.trace(ExportStage::Capturing, request);
        let pdf = session.capture_pdf().await.map_err(map_engine_error)?;
        drop(session);

        self.trace(ExportStage::CommittingUsage, request);
        self.usage.commit(&caller.account_id).await?;

        self.trace(ExportStage::Done, request);
        Ok(ExportOutput {
            pdf,
            filename: request.kind.export_filename(),
            watermarked: ticket.watermark,
        })
    }

    fn print_url(&self, kind: DocumentKind, ticket_query: &str) -> Result<Url, ExportError> {
        let mut url = self
            .base_url
            .join(kind.print_path())
            .map_err(|err| ExportError::Unexpected(format!("invalid print url: {err}")))?;
        url.set_query(Some(ticket_query));
        Ok(url)
    }

    fn trace(&self, stage: ExportStage, request: &ExportRequest) {
        info!(
            target = "mindprint::export",
            op = "export",
            stage = stage.as_str(),
            kind = %request.kind,
            document_id = %request.document_id,
            "Export stage"
        );
    }
}

fn map_engine_error(err: EngineError) -> ExportError {
    match err {
        EngineError::Timeout { elapsed_ms } => ExportError::RenderTimeout { elapsed_ms },
        other => ExportError::Engine(other),
    }
}
