//! # Job Module
//!
//! Modulo che governa il ciclo di vita di un singolo job di analisi video.
//!
//! ## Struttura:
//! - `state`: stati, snapshot e descrizione dei fallimenti
//! - `machine`: la macchina a stati che orchestra upload, risultato e preview
//!
//! ## Garanzie:
//! - Un solo job attivo alla volta; un nuovo file sostituisce il precedente
//! - Callback di operazioni superate non modificano mai il job corrente
//! - Il download automatico avviene al massimo una volta per job

pub mod machine;
pub mod state;

pub use machine::{JobStateMachine, RequestToken};
pub use state::{DownloadOutcome, JobFailure, JobSnapshot, JobStatus, ResultHandle, ResultSummary};
