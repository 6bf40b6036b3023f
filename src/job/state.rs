//! # Job State Types
//!
//! Stati del job, snapshot osservabili e descrizione dei fallimenti.
//!
//! ## Stati:
//! - `Idle`: nessun upload in corso (file eventualmente allegato)
//! - `Invalid`: file rifiutato in validazione, nessun file allegato
//! - `Uploading`: invio in corso, `progress_percent` 0-100 non decrescente
//! - `Processing`: tutti i byte inviati, in attesa della risposta del servizio
//! - `Ready`: risultato materializzato e scaricabile
//! - `Error`: fallimento con messaggio e classe di retry
//!
//! ## Snapshot:
//! Ogni transizione emette un `JobSnapshot` completo; `result` ed `error`
//! non sono mai valorizzati insieme.

use crate::error::{FailureClass, FailureKind, PreviewError, TransferError};
use crate::file_manager::SourceFile;
use crate::result::{LocalReference, PreviewInfo};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Lifecycle state of the active job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Idle,
    Invalid,
    Uploading,
    Processing,
    Ready,
    Error,
}

impl JobStatus {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Invalid => "Invalid",
            Self::Uploading => "Uploading",
            Self::Processing => "Processing",
            Self::Ready => "Ready",
            Self::Error => "Error",
        }
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Uploading | Self::Processing)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a job is in Error or Invalid
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl JobFailure {
    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Validation,
            message: message.into(),
        }
    }

    pub fn class(&self) -> FailureClass {
        self.kind.class()
    }
}

impl From<&TransferError> for JobFailure {
    fn from(err: &TransferError) -> Self {
        Self {
            kind: err.kind(),
            message: err.user_message(),
        }
    }
}

impl From<&PreviewError> for JobFailure {
    fn from(err: &PreviewError) -> Self {
        Self {
            kind: FailureKind::Preview,
            message: err.user_message(),
        }
    }
}

/// Outcome of the automatic download fired on entering Ready
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DownloadOutcome {
    Saved { path: PathBuf },
    Failed { message: String },
}

/// Retrieved payload of a finished job: reference plus suggested name
#[derive(Debug, Clone)]
pub struct ResultHandle {
    pub(crate) reference: LocalReference,
    pub(crate) filename: String,
    pub(crate) preview: Option<PreviewInfo>,
}

impl ResultHandle {
    pub fn reference(&self) -> &LocalReference {
        &self.reference
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn preview(&self) -> Option<&PreviewInfo> {
        self.preview.as_ref()
    }

    fn summary(&self) -> ResultSummary {
        ResultSummary {
            filename: self.filename.clone(),
            size_bytes: self.reference.len() as u64,
            reference_id: self.reference.short_id().to_string(),
            preview: self.preview.clone(),
        }
    }
}

/// Serializable view of a `ResultHandle`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultSummary {
    pub filename: String,
    pub size_bytes: u64,
    pub reference_id: String,
    pub preview: Option<PreviewInfo>,
}

/// Everything a presentation layer needs to render the job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSnapshot {
    pub generation: u64,
    pub status: JobStatus,
    pub file: Option<SourceFile>,
    pub progress_percent: Option<u8>,
    pub result: Option<ResultSummary>,
    pub error: Option<JobFailure>,
    pub download_available: bool,
    pub auto_download: Option<DownloadOutcome>,
}

impl JobSnapshot {
    pub(crate) fn build(
        generation: u64,
        status: JobStatus,
        file: Option<&SourceFile>,
        progress: Option<u8>,
        result: Option<&ResultHandle>,
        failure: Option<&JobFailure>,
        download_available: bool,
        auto_download: Option<&DownloadOutcome>,
    ) -> Self {
        let shows_error = matches!(status, JobStatus::Error | JobStatus::Invalid);
        Self {
            generation,
            status,
            file: file.cloned(),
            progress_percent: if status.is_in_flight() { progress } else { None },
            result: if status == JobStatus::Ready { result.map(ResultHandle::summary) } else { None },
            error: if shows_error { failure.cloned() } else { None },
            download_available,
            auto_download: auto_download.cloned(),
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.message.as_str())
    }
}
