//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore custom dell'applicazione.
//!
//! ## Responsabilità:
//! - Definisce `TransferError` per i fallimenti dello scambio upload/risultato
//! - Definisce `PreviewError` e `ResultError` per il ciclo di vita del risultato
//! - Definisce `JobError` per i comandi rifiutati dalla state machine
//! - Classifica ogni fallimento (`FailureKind`) e decide il tipo di retry (`FailureClass`)
//! - Produce messaggi leggibili e mai vuoti per l'utente
//!
//! ## Categorie di errori:
//! - `Validation`: file troppo grande, non raggiunge mai la rete
//! - `Network`: nessuna risposta dal servizio
//! - `Timeout`: superato il tetto di 5 minuti sull'intero scambio
//! - `Server`: il servizio ha risposto con uno status di errore (detail opzionale)
//! - `Decode`: body della risposta inutilizzabile come payload video
//! - `Preview`: payload scaricato ma non renderizzabile
//!
//! ## Esempio:
//! ```rust,ignore
//! let err = TransferError::Server { status: 500, detail: Some("model unavailable".into()) };
//! assert_eq!(err.user_message(), "model unavailable");
//! ```

use serde::Serialize;

/// Message shown when a failure carries no usable detail
pub const GENERIC_FAILURE_MESSAGE: &str = "Failed to process video. Please try again.";

/// Failures of a single upload-and-await-result exchange
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TransferError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {secs} seconds")]
    Timeout { secs: u64 },

    #[error("Server error {status}: {}", .detail.as_deref().unwrap_or("no detail"))]
    Server { status: u16, detail: Option<String> },

    #[error("Decode error: {0}")]
    Decode(String),
}

impl TransferError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Network(_) => FailureKind::Network,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::Server { .. } => FailureKind::Server,
            Self::Decode(_) => FailureKind::Decode,
        }
    }

    /// Human-readable message for the Error state
    pub fn user_message(&self) -> String {
        match self {
            Self::Network(cause) if cause.trim().is_empty() => GENERIC_FAILURE_MESSAGE.to_string(),
            Self::Network(cause) => format!("Could not reach the analysis service: {}", cause),
            Self::Timeout { secs } => format!("Request timed out after {} seconds", secs),
            Self::Server { detail: Some(detail), .. } if !detail.trim().is_empty() => detail.clone(),
            Self::Server { .. } => GENERIC_FAILURE_MESSAGE.to_string(),
            Self::Decode(cause) => format!("Received an unusable video payload: {}", cause),
        }
    }
}

/// Failures while materializing a preview from a retrieved payload
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PreviewError {
    #[error("unrecognized video container: {0}")]
    Unrecognized(String),

    #[error("probe failed: {0}")]
    Probe(String),

    #[error("reference has been released")]
    Released,
}

impl PreviewError {
    pub fn user_message(&self) -> String {
        format!("Failed to load video preview: {}", self)
    }
}

/// Failures of the result lifecycle (download, release)
#[derive(thiserror::Error, Debug)]
pub enum ResultError {
    #[error("local reference has been released")]
    Released,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Commands rejected by the job state machine
#[derive(thiserror::Error, Debug)]
pub enum JobError {
    #[error("Please select a video file first")]
    NoFileStaged,

    #[error("Cannot {action} while job is {state}")]
    InvalidState { state: String, action: String },

    #[error("No result available for download")]
    NoResult,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Result error: {0}")]
    Result(#[from] ResultError),
}

/// Classification of everything that can put a job into Error or Invalid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    Network,
    Timeout,
    Server,
    Decode,
    Preview,
}

impl FailureKind {
    pub fn class(&self) -> FailureClass {
        match self {
            Self::Preview => FailureClass::Preview,
            _ => FailureClass::Upload,
        }
    }
}

/// What `retry()` re-issues for a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Back to Idle with the file attached, ready for a new submit
    Upload,
    /// Re-run preview materialization from the retained reference
    Preview,
}
