//! # Preview Materialization
//!
//! La preview del risultato è un'operazione asincrona che termina con
//! "pronta" (`PreviewInfo`) oppure "errore" (`PreviewError`).
//!
//! ## Renderer disponibili:
//! - `ContainerProbe`: riconosce la firma del container (MP4/MOV `ftyp`, AVI `RIFF`, Matroska/WebM EBML)
//! - `FfprobePreview`: scrive il payload in un file temporaneo e legge durata,
//!   risoluzione e codec con `ffprobe`
//!
//! Il file temporaneo vive solo per la durata del probe e viene rimosso su ogni
//! percorso di uscita (successo, errore o cancellazione).

use super::LocalReference;
use crate::args;
use crate::error::PreviewError;
use crate::platform::PlatformCommands;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;
use tracing::debug;

/// Pending preview materialization
pub type PreviewFuture = BoxFuture<'static, Result<PreviewInfo, PreviewError>>;

/// Renders a retrieved payload into something previewable
pub trait PreviewRenderer: Send + Sync {
    fn render(&self, reference: LocalReference) -> PreviewFuture;
}

/// What a successful preview learned about the video
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviewInfo {
    pub container: String,
    pub duration_secs: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub codec: Option<String>,
}

impl PreviewInfo {
    fn container_only(container: &str) -> Self {
        Self {
            container: container.to_string(),
            duration_secs: None,
            width: None,
            height: None,
            codec: None,
        }
    }

    pub fn describe(&self) -> String {
        let mut parts = vec![self.container.clone()];
        if let (Some(w), Some(h)) = (self.width, self.height) {
            parts.push(format!("{}x{}", w, h));
        }
        if let Some(ref codec) = self.codec {
            parts.push(codec.clone());
        }
        if let Some(duration) = self.duration_secs {
            parts.push(format!("{:.1}s", duration));
        }
        parts.join(", ")
    }
}

/// Identify the container from its leading bytes
pub fn detect_container(bytes: &[u8]) -> Option<&'static str> {
    if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" {
        return Some(if &bytes[8..12] == b"qt  " { "mov" } else { "mp4" });
    }
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"AVI " {
        return Some("avi");
    }
    if bytes.len() >= 4 && bytes[0..4] == [0x1A, 0x45, 0xDF, 0xA3] {
        let head = &bytes[..bytes.len().min(64)];
        return Some(if head.windows(4).any(|w| w == b"webm") { "webm" } else { "matroska" });
    }
    None
}

/// Signature-based preview, no external tools
#[derive(Debug, Default, Clone, Copy)]
pub struct ContainerProbe;

impl PreviewRenderer for ContainerProbe {
    fn render(&self, reference: LocalReference) -> PreviewFuture {
        async move {
            match detect_container(reference.bytes()) {
                Some(container) => Ok(PreviewInfo::container_only(container)),
                None => Err(PreviewError::Unrecognized(format!(
                    "{} bytes without a known video signature",
                    reference.len()
                ))),
            }
        }
        .boxed()
    }
}

/// Preview through `ffprobe`
#[derive(Debug, Default, Clone)]
pub struct FfprobePreview {
    scratch_dir: Option<PathBuf>,
}

impl FfprobePreview {
    pub fn new(scratch_dir: Option<PathBuf>) -> Self {
        Self { scratch_dir }
    }

    async fn probe(scratch_dir: Option<PathBuf>, reference: LocalReference) -> Result<PreviewInfo, PreviewError> {
        let container = detect_container(reference.bytes()).unwrap_or("unknown");

        let scratch = tokio::task::spawn_blocking(move || -> std::io::Result<NamedTempFile> {
            let mut temp = match scratch_dir {
                Some(dir) => NamedTempFile::new_in(dir)?,
                None => NamedTempFile::new()?,
            };
            temp.write_all(reference.bytes())?;
            temp.flush()?;
            Ok(temp)
        })
        .await
        .map_err(|e| PreviewError::Probe(e.to_string()))?
        .map_err(|e| PreviewError::Probe(format!("cannot stage payload: {}", e)))?;

        let ffprobe_cmd = PlatformCommands::instance().get_command("ffprobe");
        let probe_args = args![
            "-v", "quiet",
            "-print_format", "json",
            "-show_format",
            "-show_streams",
            scratch.path().display(),
        ];

        let output = tokio::process::Command::new(ffprobe_cmd)
            .args(&probe_args)
            .output()
            .await
            .map_err(|e| PreviewError::Probe(format!("failed to execute ffprobe: {}", e)))?;

        if !output.status.success() {
            return Err(PreviewError::Unrecognized(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let info: serde_json::Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| PreviewError::Probe(format!("unreadable ffprobe output: {}", e)))?;
        debug!("ffprobe finished for {}", scratch.path().display());

        parse_probe_output(&info, container)
    }
}

impl PreviewRenderer for FfprobePreview {
    fn render(&self, reference: LocalReference) -> PreviewFuture {
        Self::probe(self.scratch_dir.clone(), reference).boxed()
    }
}

/// Extract the first video stream from `ffprobe -print_format json` output
pub fn parse_probe_output(info: &serde_json::Value, container: &str) -> Result<PreviewInfo, PreviewError> {
    let format = &info["format"];
    let duration_secs = format["duration"].as_str().and_then(|d| d.parse::<f64>().ok());

    let video_stream = info["streams"]
        .as_array()
        .and_then(|streams| streams.iter().find(|s| s["codec_type"] == "video"))
        .ok_or_else(|| PreviewError::Unrecognized("no video stream".to_string()))?;

    Ok(PreviewInfo {
        container: container.to_string(),
        duration_secs,
        width: video_stream["width"].as_u64().map(|w| w as u32),
        height: video_stream["height"].as_u64().map(|h| h as u32),
        codec: video_stream["codec_name"].as_str().map(|c| c.to_string()),
    })
}
