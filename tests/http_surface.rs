//! End-to-end tests over the HTTP router with in-memory collaborators.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use bytes::Bytes;
use http_body_util::BodyExt;
use time::{Date, OffsetDateTime};
use tower::ServiceExt;
use url::Url;

use mindprint::application::engine::{EngineError, EngineSession, RenderEngine};
use mindprint::application::entitlements::EntitlementResolver;
use mindprint::application::export::ExportService;
use mindprint::application::gate::RenderGateService;
use mindprint::application::identity::{CallerIdentity, IdentityError, IdentityVerifier};
use mindprint::application::repos::{AccountsRepo, DocumentsRepo, RepoError};
use mindprint::application::ticket::{TICKET_TTL_SECONDS, TicketCodec};
use mindprint::application::usage::UsageMeter;
use mindprint::config::SigningSecret;
use mindprint::domain::accounts::{AccountRecord, Plan, UsageWindow};
use mindprint::domain::documents::{DocumentKind, DocumentRecord};
use mindprint::infra::http::{RouterState, build_router};

const SECRET: &str = "0123456789abcdef0123456789abcdef";
const WATERMARK_TEXT: &str = "MindPrint Preview";

#[derive(Default)]
struct MemoryAccounts {
    records: Mutex<HashMap<String, AccountRecord>>,
}

impl MemoryAccounts {
    fn insert(&self, account: AccountRecord) {
        self.records
            .lock()
            .expect("lock")
            .insert(account.account_id.clone(), account);
    }
}

#[async_trait]
impl AccountsRepo for MemoryAccounts {
    async fn fetch_account(&self, account_id: &str) -> Result<Option<AccountRecord>, RepoError> {
        Ok(self.records.lock().expect("lock").get(account_id).cloned())
    }

    async fn advance_usage(&self, account_id: &str, today: Date) -> Result<u32, RepoError> {
        let mut records = self.records.lock().expect("lock");
        let record = records
            .entry(account_id.to_string())
            .or_insert_with(|| AccountRecord::unseen(account_id));
        let count = match record.usage {
            Some(window) if window.date == today => window.count + 1,
            _ => 1,
        };
        record.usage = Some(UsageWindow { date: today, count });
        Ok(count)
    }
}

#[derive(Default)]
struct MemoryDocuments {
    records: Mutex<HashMap<String, DocumentRecord>>,
}

impl MemoryDocuments {
    fn insert(&self, document: DocumentRecord) {
        self.records
            .lock()
            .expect("lock")
            .insert(document.id.clone(), document);
    }
}

#[async_trait]
impl DocumentsRepo for MemoryDocuments {
    async fn fetch_document(
        &self,
        kind: DocumentKind,
        document_id: &str,
    ) -> Result<Option<DocumentRecord>, RepoError> {
        Ok(self
            .records
            .lock()
            .expect("lock")
            .get(document_id)
            .filter(|document| document.kind == kind)
            .cloned())
    }
}

struct StaticIdentity {
    identity: Option<CallerIdentity>,
}

#[async_trait]
impl IdentityVerifier for StaticIdentity {
    async fn verify_bearer(&self, _token: &str) -> Result<CallerIdentity, IdentityError> {
        self.identity.clone().ok_or(IdentityError::InvalidToken)
    }
}

/// Engine that answers navigation with a well-formed gate success page and
/// hands back a fixed PDF payload.
struct HappyEngine;

struct HappySession {
    navigated: bool,
}

#[async_trait]
impl RenderEngine for HappyEngine {
    async fn acquire(&self) -> Result<Box<dyn EngineSession>, EngineError> {
        Ok(Box::new(HappySession { navigated: false }))
    }
}

#[async_trait]
impl EngineSession for HappySession {
    async fn navigate(&mut self, _url: &Url) -> Result<(), EngineError> {
        self.navigated = true;
        Ok(())
    }

    async fn page_text(&mut self) -> Result<String, EngineError> {
        assert!(self.navigated, "page_text before navigation");
        Ok(r#"<html><head><meta name="render-status" content="ok"></head></html>"#.to_string())
    }

    async fn capture_pdf(&mut self) -> Result<Bytes, EngineError> {
        Ok(Bytes::from_static(b"%PDF-1.7 integration"))
    }
}

struct Harness {
    router: Router,
    accounts: Arc<MemoryAccounts>,
    codec: TicketCodec,
}

fn harness(identity: Option<CallerIdentity>) -> Harness {
    let accounts = Arc::new(MemoryAccounts::default());
    let documents = Arc::new(MemoryDocuments::default());

    documents.insert(DocumentRecord {
        id: "doc-1".into(),
        kind: DocumentKind::Resume,
        owner_account_id: "acct-1".into(),
        title: "Senior Engineer".into(),
        body: "Summary line.\n\nExperience line.".into(),
        updated_at: OffsetDateTime::now_utc(),
    });

    let codec = TicketCodec::new(SigningSecret::for_tests(SECRET));
    let export = Arc::new(ExportService::new(
        Arc::new(StaticIdentity { identity }),
        accounts.clone(),
        documents.clone(),
        EntitlementResolver::new(Vec::new()),
        UsageMeter::new(accounts.clone(), chrono_tz::UTC),
        codec.clone(),
        Arc::new(HappyEngine),
        Url::parse("http://127.0.0.1:3000").expect("base url"),
    ));
    let gate = Arc::new(RenderGateService::new(codec.clone(), documents));

    let router = build_router(RouterState {
        export,
        gate,
        watermark_text: WATERMARK_TEXT.to_string(),
    });

    Harness {
        router,
        accounts,
        codec,
    }
}

fn caller() -> CallerIdentity {
    CallerIdentity {
        account_id: "acct-1".into(),
        email: None,
    }
}

fn export_request(body: &str, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/export")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).expect("request")
}

async fn body_bytes(response: axum::response::Response) -> Bytes {
    response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes()
}

#[tokio::test]
async fn healthz_answers_no_content() {
    let harness = harness(Some(caller()));
    let response = harness
        .router
        .oneshot(Request::get("/healthz").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn export_returns_pdf_attachment() {
    let harness = harness(Some(caller()));
    let response = harness
        .router
        .oneshot(export_request(
            r#"{"documentKind":"resume","documentId":"doc-1"}"#,
            Some("token"),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/pdf"
    );
    assert_eq!(
        response.headers().get(header::CONTENT_DISPOSITION).unwrap(),
        "attachment; filename=\"resume.pdf\""
    );
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-store"
    );
    let body = body_bytes(response).await;
    assert!(body.starts_with(b"%PDF"));
}

#[tokio::test]
async fn export_without_bearer_is_unauthorized() {
    let harness = harness(Some(caller()));
    let response = harness
        .router
        .oneshot(export_request(
            r#"{"documentKind":"resume","documentId":"doc-1"}"#,
            None,
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value =
        serde_json::from_slice(&body_bytes(response).await).expect("json");
    assert_eq!(body["error"], "AUTHENTICATION_FAILED");
}

#[tokio::test]
async fn export_over_quota_is_payment_required() {
    let harness = harness(Some(caller()));
    let today = mindprint::util::timezone::today_in(chrono_tz::UTC);
    let mut account = AccountRecord::unseen("acct-1");
    account.usage = Some(UsageWindow {
        date: today,
        count: 1,
    });
    harness.accounts.insert(account);

    let response = harness
        .router
        .oneshot(export_request(
            r#"{"documentKind":"resume","documentId":"doc-1"}"#,
            Some("token"),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let body: serde_json::Value =
        serde_json::from_slice(&body_bytes(response).await).expect("json");
    assert_eq!(body["error"], "EXPORT_LIMIT_REACHED");
    assert_eq!(body["plan"], Plan::Free.as_str());
    assert_eq!(body["limit"], 1);
}

#[tokio::test]
async fn export_rejects_unknown_document_kind() {
    let harness = harness(Some(caller()));
    let response = harness
        .router
        .oneshot(export_request(
            r#"{"documentKind":"thesis","documentId":"doc-1"}"#,
            Some("token"),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn render_view_with_valid_ticket_serves_watermarked_page() {
    let harness = harness(Some(caller()));
    let ticket = harness
        .codec
        .mint(DocumentKind::Resume, "doc-1", TICKET_TTL_SECONDS, true)
        .expect("mint");

    let uri = format!("/render-view/resume?{}", ticket.query_string());
    let response = harness
        .router
        .oneshot(Request::get(uri.as_str()).body(Body::empty()).expect("request"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("x-render-status").unwrap(), "ok");
    let html = String::from_utf8(body_bytes(response).await.to_vec()).expect("utf8");
    assert!(html.contains(r#"<meta name="render-status" content="ok">"#));
    assert!(html.contains("Senior Engineer"));
    assert!(html.contains(WATERMARK_TEXT));
}

#[tokio::test]
async fn render_view_without_watermark_flag_omits_overlay() {
    let harness = harness(Some(caller()));
    let ticket = harness
        .codec
        .mint(DocumentKind::Resume, "doc-1", TICKET_TTL_SECONDS, false)
        .expect("mint");

    let uri = format!("/render-view/resume?{}", ticket.query_string());
    let response = harness
        .router
        .oneshot(Request::get(uri.as_str()).body(Body::empty()).expect("request"))
        .await
        .expect("response");

    assert_eq!(response.headers().get("x-render-status").unwrap(), "ok");
    let html = String::from_utf8(body_bytes(response).await.to_vec()).expect("utf8");
    assert!(!html.contains(r#"<div class="watermark-overlay">"#));
}

#[tokio::test]
async fn render_view_with_tampered_signature_answers_200_unauthorized() {
    let harness = harness(Some(caller()));
    let ticket = harness
        .codec
        .mint(DocumentKind::Resume, "doc-1", TICKET_TTL_SECONDS, true)
        .expect("mint");

    let uri = format!(
        "/render-view/resume?documentId=doc-1&exp={}&wm=1&sig={}",
        ticket.expires_at_unix,
        hex::encode([0u8; 32]),
    );
    let response = harness
        .router
        .oneshot(Request::get(uri.as_str()).body(Body::empty()).expect("request"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("x-render-status").unwrap(),
        "unauthorized"
    );
    let html = String::from_utf8(body_bytes(response).await.to_vec()).expect("utf8");
    assert!(html.contains(r#"<meta name="render-status" content="unauthorized">"#));
    assert!(!html.contains("Senior Engineer"));
}

#[tokio::test]
async fn render_view_for_unknown_kind_answers_200_not_found() {
    let harness = harness(Some(caller()));
    let response = harness
        .router
        .oneshot(
            Request::get("/render-view/thesis?documentId=doc-1&exp=1&wm=1&sig=00")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("x-render-status").unwrap(),
        "not-found"
    );
}

#[tokio::test]
async fn render_view_with_missing_query_answers_200_unauthorized() {
    let harness = harness(Some(caller()));
    let response = harness
        .router
        .oneshot(
            Request::get("/render-view/resume")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("x-render-status").unwrap(),
        "unauthorized"
    );
}
