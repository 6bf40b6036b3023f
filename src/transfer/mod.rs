//! # Transfer Module
//!
//! Modulo che isola lo scambio di rete dal resto del client:
//! - `TransferClient`: interfaccia con un solo metodo, indipendente dallo stack HTTP
//! - `ProgressSink`: callback di progresso upload (byte inviati / totali → percentuale intera)
//! - `http_client`: implementazione con `reqwest` (multipart, timeout, normalizzazione errori)
//! - `filename`: risoluzione del nome suggerito dalla risposta
//!
//! Lo scambio è un future `'static`: farne il drop cancella l'operazione.

pub mod filename;
pub mod http_client;

pub use filename::{default_filename, resolve_filename};
pub use http_client::{HttpTransferClient, ServiceStatus};

use crate::error::TransferError;
use crate::file_manager::SourceFile;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;

/// Pending upload-and-await-result exchange. Dropping it cancels the transfer.
pub type TransferFuture = BoxFuture<'static, Result<TransferOutcome, TransferError>>;

/// Payload and suggested name of a processed video
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    pub payload: Arc<Vec<u8>>,
    pub filename: String,
    pub content_type: Option<String>,
}

/// Performs exactly one upload-and-await-result exchange per call
pub trait TransferClient: Send + Sync {
    fn upload(&self, file: SourceFile, progress: ProgressSink) -> TransferFuture;
}

/// Upload progress callback, receives integer percentages
#[derive(Clone)]
pub struct ProgressSink {
    callback: Arc<dyn Fn(u8) + Send + Sync>,
}

impl ProgressSink {
    pub fn new(callback: impl Fn(u8) + Send + Sync + 'static) -> Self {
        Self {
            callback: Arc::new(callback),
        }
    }

    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    /// Report a raw percentage
    pub fn report(&self, percent: u8) {
        (self.callback)(percent.min(100));
    }

    /// Report bytes sent out of `total`
    pub fn report_bytes(&self, sent: u64, total: u64) {
        self.report(percent_of(sent, total));
    }
}

impl fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressSink").finish_non_exhaustive()
    }
}

/// Rounded integer percentage, 100 for an empty total
pub fn percent_of(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let sent = sent.min(total) as u128;
    let total = total as u128;
    ((sent * 100 + total / 2) / total) as u8
}
