//! Headless render-engine collaborator.
//!
//! The engine is a black box that loads a URL once and hands back both the
//! page's textual content and its rendered PDF bytes. Both outputs come
//! from that single load, so inspecting the text and then capturing the PDF
//! cannot observe two different renders. A session is acquired per export
//! request and owned by the orchestrator; dropping it on any exit path
//! tears the engine down, and sessions are never pooled or reused.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to launch render engine: {0}")]
    Launch(String),
    #[error("navigation timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },
    #[error("render engine exited with {exit_code:?}: {stderr}")]
    Cli {
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("render engine produced unusable output: {0}")]
    Output(String),
}

#[async_trait]
pub trait RenderEngine: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn EngineSession>, EngineError>;
}

#[async_trait]
pub trait EngineSession: Send {
    /// Load the URL once, within the engine's configured timeout, rendering
    /// both the page text and its PDF from that load.
    async fn navigate(&mut self, url: &Url) -> Result<(), EngineError>;

    /// Textual content of the navigated page.
    async fn page_text(&mut self) -> Result<String, EngineError>;

    /// PDF bytes of the page rendered by `navigate`. Never triggers a
    /// second load.
    async fn capture_pdf(&mut self) -> Result<Bytes, EngineError>;
}
