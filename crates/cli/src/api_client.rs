//! HTTP client for the gangway daemon.

use anyhow::{Context, Result};
use futures::StreamExt;
use gangway_core::manifest::{CheckRequest, CheckResponse};
use gangway_core::STATUS_OK;
use reqwest::multipart::{Form, Part};
use reqwest::{StatusCode, Url};
use std::io::Write;

pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    token: String,
}

impl ApiClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).context("invalid server URL")?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            token: token.to_string(),
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).context("failed to build API URL")
    }

    /// `POST /check`: ask which destinations are stale on the server.
    pub async fn check(&self, request: &CheckRequest) -> Result<CheckResponse> {
        let url = self.url("/check")?;
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(request)
            .send()
            .await
            .context("check request")?;
        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("check failed ({status}): {}", body.trim());
        }
        response.json().await.context("parsing check response")
    }

    /// `POST /deploy`: submit manifest and archive, stream the log to `out`,
    /// and succeed only when the sentinel closes the stream.
    pub async fn deploy(
        &self,
        manifest_json: Vec<u8>,
        archive: Vec<u8>,
        out: &mut dyn Write,
    ) -> Result<()> {
        let form = Form::new()
            .part(
                "manifest",
                Part::bytes(manifest_json).mime_str("application/json")?,
            )
            .part(
                "archive",
                Part::bytes(archive).mime_str("application/octet-stream")?,
            );
        let url = self.url("/deploy")?;
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await
            .context("deploy request")?;
        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("deployment failed ({status}): {}", body.trim());
        }
        stream_and_check(response, out, "deployment failed (see output above)").await
    }

    /// `POST /rollback`: restore the previous snapshot for `name`.
    pub async fn rollback(&self, name: &str, out: &mut dyn Write) -> Result<()> {
        let url = self.url("/rollback")?;
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await
            .context("rollback request")?;
        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("rollback failed ({status}): {}", body.trim());
        }
        stream_and_check(response, out, "rollback failed (see output above)").await
    }
}

/// Print the streamed log and report success only if the stream's final
/// line is the sentinel.
async fn stream_and_check(
    response: reqwest::Response,
    out: &mut dyn Write,
    err_msg: &str,
) -> Result<()> {
    let mut scanner = LineScanner::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("reading response stream")?;
        for line in scanner.push(&chunk) {
            writeln!(out, "{line}")?;
        }
    }
    let result = scanner.finish();
    for line in &result.ready {
        writeln!(out, "{line}")?;
    }
    if result.ok {
        return Ok(());
    }
    // Sentinel absent: the withheld last line is real content, show it.
    if let Some(last) = &result.last {
        writeln!(out, "{last}")?;
    }
    anyhow::bail!("{err_msg}")
}

/// Line scanner with a one-line lag.
///
/// Every complete line except the most recent is released immediately; the
/// most recent is withheld until the stream closes, because only the *final*
/// line may count as the sentinel. A sentinel-looking line mid-stream is
/// released like any other and cannot fake success.
pub struct LineScanner {
    buf: Vec<u8>,
    prev: Option<String>,
}

/// What the scanner saw once the stream closed.
pub struct ScanResult {
    /// Lines displaced while handling a trailing partial line.
    pub ready: Vec<String>,
    /// The final line of the stream.
    pub last: Option<String>,
    /// Whether the final line was the sentinel.
    pub ok: bool,
}

impl LineScanner {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            prev: None,
        }
    }

    /// Feed a chunk; returns the lines ready to print.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut ready = Vec::new();
        self.buf.extend_from_slice(chunk);
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            let mut line = String::from_utf8_lossy(&raw[..raw.len() - 1]).into_owned();
            if line.ends_with('\r') {
                line.pop();
            }
            if let Some(prev) = self.prev.replace(line) {
                ready.push(prev);
            }
        }
        ready
    }

    /// Close the stream; a trailing unterminated line counts as the last.
    pub fn finish(mut self) -> ScanResult {
        let mut ready = Vec::new();
        if !self.buf.is_empty() {
            let tail = String::from_utf8_lossy(&self.buf).into_owned();
            if let Some(prev) = self.prev.replace(tail) {
                ready.push(prev);
            }
        }
        let last = self.prev;
        let ok = last.as_deref() == Some(STATUS_OK);
        ScanResult { ready, last, ok }
    }
}

impl Default for LineScanner {
    fn default() -> Self {
        Self::new()
    }
}
