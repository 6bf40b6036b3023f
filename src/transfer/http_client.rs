//! # HTTP Transfer Client
//!
//! Implementazione di `TransferClient` basata su `reqwest`.
//!
//! ## Responsabilità:
//! - Codifica il file come body multipart (campo `file`) in streaming
//! - Riporta il progresso upload leggendo il file a blocchi
//! - Applica il tetto di timeout sull'intero scambio (upload + elaborazione + download)
//! - Normalizza gli errori in `TransferError` (Network, Timeout, Server, Decode)
//! - Interroga l'endpoint di stato del servizio (`GET /api/status`)
//!
//! ## Formato errori del servizio:
//! ```json
//! { "detail": "model unavailable" }
//! ```

use super::{resolve_filename, ProgressSink, TransferClient, TransferFuture, TransferOutcome};
use crate::config::Config;
use crate::error::TransferError;
use crate::file_manager::SourceFile;
use futures::{FutureExt, TryStreamExt};
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Response};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

/// Read size for the streamed upload body
const UPLOAD_CHUNK_SIZE: usize = 256 * 1024;

/// Longest non-JSON error body still shown to the user as detail
const MAX_PLAIN_DETAIL_LEN: usize = 512;

/// Response of the service status endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub status: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default)]
    pub confidence_threshold: Option<f64>,
}

/// Transfer client talking to the analysis service over HTTP
#[derive(Clone)]
pub struct HttpTransferClient {
    http: Client,
    endpoint: String,
    status_endpoint: String,
    timeout: Duration,
}

impl HttpTransferClient {
    pub fn new(config: &Config) -> Result<Self, TransferError> {
        Self::with_endpoints(config.process_video_url(), config.status_url(), config.timeout())
    }

    pub fn with_endpoints(
        endpoint: impl Into<String>,
        status_endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, TransferError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransferError::Network(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
            status_endpoint: status_endpoint.into(),
            timeout,
        })
    }

    /// Query the service status endpoint
    pub async fn status(&self) -> Result<ServiceStatus, TransferError> {
        let secs = self.timeout.as_secs();
        let response = self
            .http
            .get(&self.status_endpoint)
            .send()
            .await
            .map_err(|e| classify_send_error(e, secs))?;

        let response = ensure_success(response).await?;
        response
            .json::<ServiceStatus>()
            .await
            .map_err(|e| classify_body_error(e, secs))
    }

    async fn exchange(
        http: Client,
        endpoint: String,
        file: SourceFile,
        progress: ProgressSink,
        secs: u64,
    ) -> Result<TransferOutcome, TransferError> {
        let body = upload_body(&file, progress.clone()).await?;
        let part = Part::stream_with_length(body, file.size)
            .file_name(file.name.clone())
            .mime_str(&file.media_type)
            .map_err(|e| TransferError::Network(format!("invalid media type {}: {}", file.media_type, e)))?;
        let form = Form::new().part("file", part);

        info!("Uploading {} ({} bytes) to {}", file.name, file.size, endpoint);
        let response = http
            .post(&endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| classify_send_error(e, secs))?;

        // Every byte has left by the time the server answers
        progress.report(100);

        let response = ensure_success(response).await?;
        let filename = resolve_filename(
            response
                .headers()
                .get(CONTENT_DISPOSITION)
                .and_then(|v| v.to_str().ok()),
        );
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());

        if let Some(ref ct) = content_type {
            if ct.starts_with("application/json") || ct.starts_with("text/") {
                return Err(TransferError::Decode(format!("expected a video payload, got {}", ct)));
            }
        }

        let payload = response.bytes().await.map_err(|e| classify_body_error(e, secs))?;
        if payload.is_empty() {
            return Err(TransferError::Decode("empty response body".to_string()));
        }

        debug!("Received {} bytes as {}", payload.len(), filename);
        Ok(TransferOutcome {
            payload: Arc::new(Vec::from(payload)),
            filename,
            content_type,
        })
    }
}

impl TransferClient for HttpTransferClient {
    fn upload(&self, file: SourceFile, progress: ProgressSink) -> TransferFuture {
        let http = self.http.clone();
        let endpoint = self.endpoint.clone();
        let timeout = self.timeout;
        let secs = timeout.as_secs();

        async move {
            match tokio::time::timeout(timeout, Self::exchange(http, endpoint, file, progress, secs)).await {
                Ok(result) => result,
                Err(_) => {
                    warn!("Transfer exceeded {:?}", timeout);
                    Err(TransferError::Timeout { secs })
                }
            }
        }
        .boxed()
    }
}

/// Stream the file from disk, reporting bytes read as progress
async fn upload_body(file: &SourceFile, progress: ProgressSink) -> Result<Body, TransferError> {
    let reader = tokio::fs::File::open(&file.path)
        .await
        .map_err(|e| TransferError::Network(format!("cannot read {}: {}", file.path.display(), e)))?;
    let total = file.size;

    progress.report_bytes(0, total.max(1));

    let stream = futures::stream::try_unfold((reader, 0u64, progress), move |(mut reader, sent, progress)| async move {
        let mut chunk = vec![0u8; UPLOAD_CHUNK_SIZE];
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok::<_, std::io::Error>(None);
        }
        chunk.truncate(n);
        let sent = sent + n as u64;
        progress.report_bytes(sent, total);
        Ok(Some((chunk, (reader, sent, progress))))
    })
    .inspect_err(|e| warn!("Upload stream failed: {}", e));

    Ok(Body::wrap_stream(stream))
}

/// Turn a non-success response into `TransferError::Server`
async fn ensure_success(response: Response) -> Result<Response, TransferError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());
    let text = response.text().await.unwrap_or_default();
    let detail = extract_detail(&text, content_type.as_deref());
    warn!("Service responded {}: {}", status, detail.as_deref().unwrap_or("no detail"));
    Err(TransferError::Server {
        status: status.as_u16(),
        detail,
    })
}

/// Pull a human-readable detail out of an error body.
///
/// Only the `detail` field of a JSON body or a short `text/plain` body qualifies;
/// markup such as a proxy's error page never does.
pub fn extract_detail(body: &str, content_type: Option<&str>) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(value) => match &value["detail"] {
            serde_json::Value::String(detail) => Some(detail.clone()),
            serde_json::Value::Array(items) => {
                let messages: Vec<&str> = items
                    .iter()
                    .filter_map(|item| item["msg"].as_str())
                    .collect();
                (!messages.is_empty()).then(|| messages.join("; "))
            }
            _ => None,
        },
        Err(_) if is_plain_text(content_type) && trimmed.len() <= MAX_PLAIN_DETAIL_LEN && !trimmed.contains('<') => {
            Some(trimmed.to_string())
        }
        Err(_) => None,
    }
}

fn is_plain_text(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|ct| ct.split(';').next())
        .map_or(false, |mime| mime.trim().eq_ignore_ascii_case("text/plain"))
}

fn classify_send_error(e: reqwest::Error, secs: u64) -> TransferError {
    if e.is_timeout() {
        TransferError::Timeout { secs }
    } else {
        TransferError::Network(e.to_string())
    }
}

fn classify_body_error(e: reqwest::Error, secs: u64) -> TransferError {
    if e.is_timeout() {
        TransferError::Timeout { secs }
    } else {
        TransferError::Decode(e.to_string())
    }
}
