//! # JSON Output Module
//!
//! Questo modulo gestisce l'output strutturato in JSON per consumatori programmatici.
//!
//! ## Responsabilità:
//! - Traduce le transizioni del job in eventi JSON, uno per riga su stdout
//! - Lascia stderr ai log di `tracing`, così stdout contiene solo JSON
//!
//! ## Tipi di messaggi:
//! - `selected`: file selezionato (nome, dimensione, media type)
//! - `invalid`: file rifiutato in validazione
//! - `progress`: percentuale di upload
//! - `processing`: upload completato, analisi in corso
//! - `ready`: risultato disponibile
//! - `downloaded`: esito del salvataggio su disco
//! - `preview`: preview materializzata
//! - `error`: fallimento con messaggio per l'utente
//! - `status`: stato del servizio remoto (`--check-status`)
//!
//! ## Esempio:
//! ```text
//! {"type":"selected","name":"site.mp4","size":13002342,"media_type":"video/mp4"}
//! {"type":"progress","percent":42}
//! {"type":"ready","filename":"out.mp4","size":12448102,"reference_id":"9f2c41d07ab3e611"}
//! ```

use crate::error::FailureKind;
use crate::job::{DownloadOutcome, JobSnapshot, JobStatus};
use crate::result::PreviewInfo;
use crate::transfer::ServiceStatus;
use serde::Serialize;
use std::path::PathBuf;

/// Tipo di messaggio JSON
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JsonMessage {
    /// File selezionato per un nuovo job
    Selected { name: String, size: u64, media_type: String },

    /// File rifiutato prima dell'upload
    Invalid { message: String },

    /// Avanzamento dell'upload
    Progress { percent: u8 },

    /// Tutti i byte inviati, in attesa del servizio
    Processing,

    /// Risultato pronto per il download
    Ready { filename: String, size: u64, reference_id: String },

    /// Esito del salvataggio
    Downloaded {
        saved: bool,
        path: Option<PathBuf>,
        message: Option<String>,
    },

    /// Preview materializzata
    Preview {
        #[serde(flatten)]
        info: PreviewInfo,
    },

    /// Errore con messaggio per l'utente
    Error {
        kind: FailureKind,
        message: String,
        download_available: bool,
    },

    /// Stato del servizio
    Status {
        reachable: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        service: Option<ServiceStatus>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl JsonMessage {
    /// Emette il messaggio JSON su stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    pub fn downloaded(outcome: &DownloadOutcome) -> Self {
        match outcome {
            DownloadOutcome::Saved { path } => Self::Downloaded {
                saved: true,
                path: Some(path.clone()),
                message: None,
            },
            DownloadOutcome::Failed { message } => Self::Downloaded {
                saved: false,
                path: None,
                message: Some(message.clone()),
            },
        }
    }

    pub fn status(result: Result<ServiceStatus, String>) -> Self {
        match result {
            Ok(service) => Self::Status {
                reachable: true,
                service: Some(service),
                message: None,
            },
            Err(message) => Self::Status {
                reachable: false,
                service: None,
                message: Some(message),
            },
        }
    }

    /// Messaggi che descrivono il passaggio da `previous` a `current`
    pub fn from_transition(previous: Option<&JobSnapshot>, current: &JobSnapshot) -> Vec<Self> {
        let mut messages = Vec::new();
        let new_job = previous.map_or(true, |p| p.generation != current.generation);
        let previous = if new_job { None } else { previous };
        let status_changed = previous.map_or(true, |p| p.status != current.status);

        if new_job {
            if let Some(ref file) = current.file {
                messages.push(Self::Selected {
                    name: file.name.clone(),
                    size: file.size,
                    media_type: file.media_type.clone(),
                });
            }
        }

        match current.status {
            JobStatus::Invalid if status_changed => {
                if let Some(message) = current.error_message() {
                    messages.push(Self::Invalid {
                        message: message.to_string(),
                    });
                }
            }
            JobStatus::Uploading => {
                if let Some(percent) = current.progress_percent {
                    if previous.and_then(|p| p.progress_percent) != Some(percent) || status_changed {
                        messages.push(Self::Progress { percent });
                    }
                }
            }
            JobStatus::Processing if status_changed => {
                if previous.map_or(false, |p| p.progress_percent != Some(100)) {
                    messages.push(Self::Progress { percent: 100 });
                }
                messages.push(Self::Processing);
            }
            JobStatus::Ready => {
                if let Some(ref result) = current.result {
                    if status_changed {
                        messages.push(Self::Ready {
                            filename: result.filename.clone(),
                            size: result.size_bytes,
                            reference_id: result.reference_id.clone(),
                        });
                    }
                    let had_preview = previous
                        .and_then(|p| p.result.as_ref())
                        .map_or(false, |r| r.preview.is_some());
                    if let (Some(info), false) = (result.preview.as_ref(), had_preview) {
                        messages.push(Self::Preview { info: info.clone() });
                    }
                }
            }
            JobStatus::Error if status_changed => {
                if let Some(ref failure) = current.error {
                    messages.push(Self::Error {
                        kind: failure.kind,
                        message: failure.message.clone(),
                        download_available: current.download_available,
                    });
                }
            }
            _ => {}
        }

        if let Some(ref outcome) = current.auto_download {
            if previous.and_then(|p| p.auto_download.as_ref()) != Some(outcome) {
                messages.push(Self::downloaded(outcome));
            }
        }

        messages
    }
}

/// Emits JSON lines for a stream of snapshots
#[derive(Debug, Default)]
pub struct JsonRenderer {
    last: Option<JobSnapshot>,
}

impl JsonRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render(&mut self, snapshot: &JobSnapshot) {
        for message in JsonMessage::from_transition(self.last.as_ref(), snapshot) {
            message.emit();
        }
        self.last = Some(snapshot.clone());
    }
}
