//! Headless Chromium adapter for the render engine.
//!
//! Each session runs Chromium as a short-lived subprocess against a private
//! temporary profile directory. The process inherits no cookies or ambient
//! browser state, so the capability ticket in the navigated URL is the only
//! credential in play. A session loads its page exactly once: the same
//! invocation dumps the DOM and prints the PDF, so the text the caller
//! inspects and the PDF it receives always describe one render, and the
//! ticket is spent on a single request. Dropping the session removes the
//! profile directory; `kill_on_drop` reaps any process still running when a
//! timeout fires.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    process::Stdio,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use bytes::Bytes;
use metrics::histogram;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{info, warn};
use url::Url;

use crate::application::engine::{EngineError, EngineSession, RenderEngine};
use crate::config::EngineSettings;

/// Let the page's virtual clock run this far ahead so deferred rendering
/// work settles before the DOM is dumped or printed.
const VIRTUAL_TIME_BUDGET_MS: u32 = 10_000;

#[derive(Debug, Clone)]
pub struct ChromiumEngine {
    chromium_path: PathBuf,
    navigation_timeout: Duration,
}

impl ChromiumEngine {
    pub fn new(settings: &EngineSettings) -> Self {
        Self {
            chromium_path: settings.chromium_path.clone(),
            navigation_timeout: settings.navigation_timeout,
        }
    }
}

#[async_trait]
impl RenderEngine for ChromiumEngine {
    async fn acquire(&self) -> Result<Box<dyn EngineSession>, EngineError> {
        let profile_dir = TempDir::new()
            .map_err(|err| EngineError::Launch(format!("failed to create profile dir: {err}")))?;
        Ok(Box::new(ChromiumSession {
            chromium_path: self.chromium_path.clone(),
            navigation_timeout: self.navigation_timeout,
            profile_dir,
            dom_cache: None,
            pdf_cache: None,
        }))
    }
}

struct ChromiumSession {
    chromium_path: PathBuf,
    navigation_timeout: Duration,
    profile_dir: TempDir,
    dom_cache: Option<String>,
    pdf_cache: Option<Bytes>,
}

impl ChromiumSession {
    fn base_command(&self) -> Command {
        let mut command = Command::new(&self.chromium_path);
        command
            .arg("--headless=new")
            .arg("--no-sandbox")
            .arg("--disable-setuid-sandbox")
            .arg("--disable-gpu")
            .arg(format!(
                "--user-data-dir={}",
                self.profile_dir.path().display()
            ))
            .arg(format!("--virtual-time-budget={VIRTUAL_TIME_BUDGET_MS}"))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    async fn run(&self, mut command: Command) -> Result<std::process::Output, EngineError> {
        let started_at = Instant::now();
        let child = command.spawn().map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                EngineError::Launch(format!(
                    "chromium executable not found at {}",
                    self.chromium_path.display()
                ))
            } else {
                EngineError::Launch(err.to_string())
            }
        })?;

        let output = tokio::time::timeout(self.navigation_timeout, child.wait_with_output())
            .await
            .map_err(|_| EngineError::Timeout {
                elapsed_ms: started_at.elapsed().as_millis() as u64,
            })?
            .map_err(|err| EngineError::Launch(err.to_string()))?;

        if !output.status.success() {
            let exit_code = output.status.code();
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            warn!(
                target = "mindprint::engine",
                op = "engine::run",
                result = "error",
                exit_code = exit_code.map(i64::from).unwrap_or(-1),
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                stderr = %stderr,
                "Chromium invocation failed"
            );
            return Err(EngineError::Cli { exit_code, stderr });
        }

        Ok(output)
    }
}

#[async_trait]
impl EngineSession for ChromiumSession {
    /// One Chromium invocation both dumps the DOM and prints the PDF, so
    /// `page_text` and `capture_pdf` describe the same render.
    async fn navigate(&mut self, url: &Url) -> Result<(), EngineError> {
        let started_at = Instant::now();
        let pdf_path = self.profile_dir.path().join("capture.pdf");
        let mut command = self.base_command();
        command
            .arg("--dump-dom")
            .arg(format!("--print-to-pdf={}", pdf_path.display()))
            .arg("--no-pdf-header-footer")
            .arg(url.as_str());

        let output = self.run(command).await?;
        let dom = String::from_utf8_lossy(&output.stdout).into_owned();
        if dom.trim().is_empty() {
            return Err(EngineError::Output("empty DOM dump".to_string()));
        }
        let pdf = read_pdf(&pdf_path).await?;

        histogram!("mindprint_engine_capture_ms")
            .record(started_at.elapsed().as_millis() as f64);
        info!(
            target = "mindprint::engine",
            op = "engine::navigate",
            result = "ok",
            path = url.path(),
            dom_bytes = dom.len(),
            pdf_bytes = pdf.len(),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "Page rendered"
        );

        self.dom_cache = Some(dom);
        self.pdf_cache = Some(pdf);
        Ok(())
    }

    async fn page_text(&mut self) -> Result<String, EngineError> {
        self.dom_cache
            .clone()
            .ok_or_else(|| EngineError::Output("no page navigated".to_string()))
    }

    async fn capture_pdf(&mut self) -> Result<Bytes, EngineError> {
        self.pdf_cache
            .clone()
            .ok_or_else(|| EngineError::Output("no page navigated".to_string()))
    }
}

async fn read_pdf(path: &Path) -> Result<Bytes, EngineError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|err| EngineError::Output(format!("failed to read captured PDF: {err}")))?;
    if !bytes.starts_with(b"%PDF") {
        return Err(EngineError::Output(
            "captured file is not a PDF document".to_string(),
        ));
    }
    Ok(Bytes::from(bytes))
}
