//! # Media Analyzer Client Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare del client di analisi video
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per altri consumatori
//!
//! ## Architettura dei moduli:
//! - `config`: Gestione configurazione e validazione parametri
//! - `error`: Tipi di errore e classificazione dei fallimenti
//! - `file_manager`: Metadati del file sorgente e media type dichiarato
//! - `transfer`: Upload multipart verso il servizio e recupero del risultato
//! - `result`: Riferimento locale al risultato, download e preview
//! - `job`: Macchina a stati del job
//! - `progress` / `json_output`: Rendering degli snapshot per terminale o JSON
//!
//! ## Utilizzo:
//! ```rust,ignore
//! use media_analyzer_client::{Config, ContainerProbe, HttpTransferClient, JobStateMachine, ResultManager};
//!
//! let config = Config::default();
//! let client = Arc::new(HttpTransferClient::new(&config)?);
//! let results = ResultManager::new(config.resolved_output_dir(), Arc::new(ContainerProbe));
//! let mut job = JobStateMachine::new(config, client, results);
//! job.select_path(&path).await?;
//! job.submit()?;
//! let snapshot = job.run_until_settled().await;
//! ```

pub mod config;
pub mod error;
pub mod file_manager;
pub mod job;
pub mod json_output;
pub mod platform;
pub mod progress;
pub mod result;
pub mod transfer;
pub mod utils;

pub use config::Config;
pub use error::{FailureClass, FailureKind, JobError, PreviewError, ResultError, TransferError};
pub use file_manager::{FileManager, SourceFile};
pub use job::{DownloadOutcome, JobSnapshot, JobStateMachine, JobStatus};
pub use result::{ContainerProbe, FfprobePreview, LocalReference, PreviewRenderer, ResultManager};
pub use transfer::{HttpTransferClient, ProgressSink, TransferClient, TransferOutcome};
