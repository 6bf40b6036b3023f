//! # Job State Machine
//!
//! Orchestratore del singolo job video: selezione file, upload, elaborazione
//! remota, risultato, preview, errori e retry.
//!
//! ## Modello di esecuzione:
//! - Tutte le mutazioni avvengono su `&mut self`, da un solo task logico
//! - Upload e preview girano in task separati e restituiscono eventi su un canale
//! - Ogni evento porta il `RequestToken` dell'operazione che lo ha generato;
//!   eventi con token superato vengono scartati
//! - Selezionare un nuovo file cancella le operazioni in corso e rilascia il risultato
//!
//! ## Effetti di transizione:
//! - Entrando in `Ready` il download automatico parte una sola volta per job
//! - La preview parte dopo `Ready`; un suo errore non invalida il risultato scaricabile
//!
//! ## Esempio:
//! ```rust,ignore
//! let mut machine = JobStateMachine::new(config, client, results);
//! let mut snapshots = machine.subscribe();
//! machine.select_path(Path::new("site.mp4")).await?;
//! machine.submit()?;
//! let last = machine.run_until_settled().await;
//! ```

use super::state::{DownloadOutcome, JobFailure, JobSnapshot, JobStatus, ResultHandle};
use crate::config::Config;
use crate::error::{FailureClass, JobError, PreviewError, TransferError};
use crate::file_manager::{FileManager, SourceFile};
use crate::result::{PreviewInfo, ResultManager};
use crate::transfer::{ProgressSink, TransferClient, TransferOutcome};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Identifies one asynchronous operation issued by the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestToken(u64);

#[derive(Debug)]
enum JobEvent {
    Progress(u8),
    TransferFinished(Result<TransferOutcome, TransferError>),
    PreviewFinished(Result<PreviewInfo, PreviewError>),
}

#[derive(Debug)]
struct TaggedEvent {
    token: RequestToken,
    event: JobEvent,
}

/// An operation running in its own task
struct InFlight {
    token: RequestToken,
    task: JoinHandle<()>,
}

impl InFlight {
    fn cancel(self) {
        self.task.abort();
    }
}

/// Tracks a single video job from file selection to downloadable result
pub struct JobStateMachine {
    config: Config,
    client: Arc<dyn TransferClient>,
    results: ResultManager,
    generation: u64,
    next_token: u64,
    status: JobStatus,
    file: Option<SourceFile>,
    progress: Option<u8>,
    result: Option<ResultHandle>,
    failure: Option<JobFailure>,
    auto_download_fired: bool,
    auto_download: Option<DownloadOutcome>,
    upload: Option<InFlight>,
    preview: Option<InFlight>,
    events_tx: mpsc::UnboundedSender<TaggedEvent>,
    events_rx: mpsc::UnboundedReceiver<TaggedEvent>,
    listeners: Vec<mpsc::UnboundedSender<JobSnapshot>>,
}

impl JobStateMachine {
    pub fn new(config: Config, client: Arc<dyn TransferClient>, results: ResultManager) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            config,
            client,
            results,
            generation: 0,
            next_token: 0,
            status: JobStatus::Idle,
            file: None,
            progress: None,
            result: None,
            failure: None,
            auto_download_fired: false,
            auto_download: None,
            upload: None,
            preview: None,
            events_tx,
            events_rx,
            listeners: Vec::new(),
        }
    }

    /// Receive a snapshot on every transition
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<JobSnapshot> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.push(tx);
        rx
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn result_handle(&self) -> Option<&ResultHandle> {
        self.result.as_ref()
    }

    pub fn results(&self) -> &ResultManager {
        &self.results
    }

    /// True while an upload or a preview has not reported back
    pub fn is_busy(&self) -> bool {
        self.upload.is_some() || self.preview.is_some()
    }

    pub fn snapshot(&self) -> JobSnapshot {
        let download_available = self
            .result
            .as_ref()
            .map_or(false, |handle| self.results.is_live(&handle.reference));

        JobSnapshot::build(
            self.generation,
            self.status,
            self.file.as_ref(),
            self.progress,
            self.result.as_ref(),
            self.failure.as_ref(),
            download_available,
            self.auto_download.as_ref(),
        )
    }

    /// Stage `file` as a new job, superseding whatever came before.
    ///
    /// Files above the size limit never reach Uploading: the job goes to Invalid
    /// with no file attached.
    pub fn select_file(&mut self, file: SourceFile) -> JobStatus {
        self.supersede();

        if file.size > self.config.max_file_size {
            warn!(
                "Rejected {}: {} exceeds limit of {}",
                file.name,
                FileManager::format_size(file.size),
                FileManager::format_size(self.config.max_file_size)
            );
            self.failure = Some(JobFailure::validation(format!(
                "File exceeds size limit (max {})",
                FileManager::format_size(self.config.max_file_size)
            )));
            self.file = None;
            self.status = JobStatus::Invalid;
        } else {
            if !file.is_accepted_type() {
                warn!("{} is not an MP4, AVI or MOV video, sending it anyway", file.name);
            }
            debug!("Staged {} ({} bytes)", file.name, file.size);
            self.file = Some(file);
            self.status = JobStatus::Idle;
        }

        self.emit();
        self.status
    }

    /// Read `path` metadata and stage it
    pub async fn select_path(&mut self, path: &Path) -> Result<JobStatus, JobError> {
        let file = FileManager::source_file(path).await?;
        Ok(self.select_file(file))
    }

    /// Start uploading the staged file.
    ///
    /// Calls while a transfer is already running are ignored.
    pub fn submit(&mut self) -> Result<(), JobError> {
        match self.status {
            JobStatus::Uploading | JobStatus::Processing => {
                debug!("Submit ignored, transfer already in flight");
                return Ok(());
            }
            JobStatus::Idle | JobStatus::Invalid => {}
            other => {
                return Err(JobError::InvalidState {
                    state: other.to_string(),
                    action: "submit".to_string(),
                })
            }
        }

        let file = self.file.clone().ok_or(JobError::NoFileStaged)?;
        let token = self.issue_token();

        let sink = {
            let tx = self.events_tx.clone();
            ProgressSink::new(move |percent| {
                let _ = tx.send(TaggedEvent {
                    token,
                    event: JobEvent::Progress(percent),
                });
            })
        };

        info!("Uploading {} ({})", file.name, FileManager::format_size(file.size));
        let operation = self.client.upload(file, sink);
        let tx = self.events_tx.clone();
        let task = tokio::spawn(async move {
            let result = operation.await;
            let _ = tx.send(TaggedEvent {
                token,
                event: JobEvent::TransferFinished(result),
            });
        });

        self.upload = Some(InFlight { token, task });
        self.status = JobStatus::Uploading;
        self.progress = Some(0);
        self.failure = None;
        self.emit();
        Ok(())
    }

    /// Upload progress hook. Values are clamped to 0..=100 and never move backwards.
    pub fn on_progress(&mut self, percent: i64) {
        if self.status != JobStatus::Uploading {
            return;
        }

        let percent = percent.clamp(0, 100) as u8;
        let current = self.progress.unwrap_or(0);
        if percent <= current {
            return;
        }

        self.progress = Some(percent);
        if percent == 100 {
            debug!("Upload complete, awaiting analysis");
            self.status = JobStatus::Processing;
        }
        self.emit();
    }

    /// Re-issue the failed operation.
    ///
    /// Upload-level failures return to Idle with the file still attached;
    /// preview-level failures re-run the preview from the retained result.
    pub fn retry(&mut self) -> Result<(), JobError> {
        let class = match (&self.status, &self.failure) {
            (JobStatus::Error, Some(failure)) => failure.class(),
            _ => {
                return Err(JobError::InvalidState {
                    state: self.status.to_string(),
                    action: "retry".to_string(),
                })
            }
        };

        match class {
            FailureClass::Upload => {
                info!("Retrying: job back to Idle for a new submit");
                self.failure = None;
                self.progress = None;
                self.status = JobStatus::Idle;
                self.emit();
            }
            FailureClass::Preview => {
                info!("Retrying preview without re-uploading");
                self.failure = None;
                self.status = JobStatus::Ready;
                self.emit();
                self.start_preview();
            }
        }
        Ok(())
    }

    /// Save the retained result again under its suggested name
    pub async fn download(&self) -> Result<PathBuf, JobError> {
        let handle = self.result.as_ref().ok_or(JobError::NoResult)?;
        Ok(self.results.trigger_download(&handle.reference, &handle.filename).await?)
    }

    /// Wait for the next event from an in-flight operation and apply it.
    ///
    /// Returns false when nothing is in flight.
    pub async fn next_event(&mut self) -> bool {
        if !self.is_busy() {
            return false;
        }
        match self.events_rx.recv().await {
            Some(tagged) => {
                self.handle_event(tagged).await;
                true
            }
            None => false,
        }
    }

    /// Apply events until neither upload nor preview is pending
    pub async fn run_until_settled(&mut self) -> JobSnapshot {
        while self.next_event().await {}
        self.snapshot()
    }

    /// Cancel everything and release the result, as when the owner goes away
    pub fn shutdown(&mut self) {
        self.cancel_in_flight();
        self.results.release_all();
        self.result = None;
        self.listeners.clear();
    }

    async fn handle_event(&mut self, tagged: TaggedEvent) {
        let TaggedEvent { token, event } = tagged;
        let upload_token = self.upload.as_ref().map(|op| op.token);
        let preview_token = self.preview.as_ref().map(|op| op.token);

        match event {
            JobEvent::Progress(percent) if upload_token == Some(token) => {
                self.on_progress(i64::from(percent));
            }
            JobEvent::TransferFinished(result) if upload_token == Some(token) => {
                self.upload = None;
                self.finish_transfer(result).await;
            }
            JobEvent::PreviewFinished(result) if preview_token == Some(token) => {
                self.preview = None;
                self.finish_preview(result);
            }
            stale => {
                debug!("Discarded stale event {:?} for {:?}", stale, token);
            }
        }
    }

    async fn finish_transfer(&mut self, result: Result<TransferOutcome, TransferError>) {
        match result {
            Ok(outcome) => {
                if self.progress != Some(100) {
                    self.progress = Some(100);
                    self.status = JobStatus::Processing;
                    self.emit();
                }

                let reference = self.results.materialize(&outcome.payload).await;
                info!(
                    "Result ready: {} ({})",
                    outcome.filename,
                    FileManager::format_size(reference.len() as u64)
                );
                self.result = Some(ResultHandle {
                    reference,
                    filename: outcome.filename,
                    preview: None,
                });
                self.failure = None;
                self.status = JobStatus::Ready;
                self.fire_auto_download().await;
                self.emit();

                if self.config.preview {
                    self.start_preview();
                }
            }
            Err(e) => {
                warn!("Transfer failed: {}", e);
                self.failure = Some(JobFailure::from(&e));
                self.progress = None;
                self.status = JobStatus::Error;
                self.emit();
            }
        }
    }

    /// Entry effect of Ready, fires at most once per job
    async fn fire_auto_download(&mut self) {
        if !self.config.auto_download || self.auto_download_fired {
            return;
        }
        let Some(ref handle) = self.result else {
            return;
        };
        self.auto_download_fired = true;

        let outcome = match self.results.trigger_download(&handle.reference, &handle.filename).await {
            Ok(path) => DownloadOutcome::Saved { path },
            Err(e) => {
                warn!("Automatic download failed: {}", e);
                DownloadOutcome::Failed {
                    message: format!("Failed to download video: {}", e),
                }
            }
        };
        self.auto_download = Some(outcome);
    }

    fn start_preview(&mut self) {
        let operation = match self.result {
            Some(ref handle) => self.results.preview(&handle.reference),
            None => return,
        };
        if let Some(previous) = self.preview.take() {
            previous.cancel();
        }

        let token = self.issue_token();
        let tx = self.events_tx.clone();
        let task = tokio::spawn(async move {
            let result = operation.await;
            let _ = tx.send(TaggedEvent {
                token,
                event: JobEvent::PreviewFinished(result),
            });
        });
        self.preview = Some(InFlight { token, task });
    }

    fn finish_preview(&mut self, result: Result<PreviewInfo, PreviewError>) {
        match result {
            Ok(info) => {
                debug!("Preview ready: {}", info.describe());
                if let Some(ref mut handle) = self.result {
                    handle.preview = Some(info);
                }
                if self.status == JobStatus::Ready {
                    self.emit();
                }
            }
            Err(e) => {
                warn!("Preview failed: {}", e);
                self.failure = Some(JobFailure::from(&e));
                self.status = JobStatus::Error;
                self.emit();
            }
        }
    }

    /// Start a new job generation: cancel pending work, release the old result
    fn supersede(&mut self) {
        self.cancel_in_flight();
        if let Some(handle) = self.result.take() {
            self.results.release(&handle.reference);
        }
        self.generation += 1;
        self.file = None;
        self.progress = None;
        self.failure = None;
        self.auto_download_fired = false;
        self.auto_download = None;
    }

    fn cancel_in_flight(&mut self) {
        if let Some(upload) = self.upload.take() {
            debug!("Cancelling upload {:?}", upload.token);
            upload.cancel();
        }
        if let Some(preview) = self.preview.take() {
            preview.cancel();
        }
    }

    fn issue_token(&mut self) -> RequestToken {
        self.next_token += 1;
        RequestToken(self.next_token)
    }

    fn emit(&mut self) {
        let snapshot = self.snapshot();
        debug!(
            generation = snapshot.generation,
            status = %snapshot.status,
            progress = ?snapshot.progress_percent,
            "Job transition"
        );
        self.listeners.retain(|tx| tx.send(snapshot.clone()).is_ok());
    }
}

impl Drop for JobStateMachine {
    fn drop(&mut self) {
        self.cancel_in_flight();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::result::{PreviewFuture, PreviewRenderer};
    use crate::transfer::TransferFuture;
    use futures::FutureExt;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tokio_test::assert_ok;

    const MIB: u64 = 1024 * 1024;

    enum Script {
        Succeed { progress: Vec<u8>, filename: &'static str },
        Fail(TransferError),
        Hang,
    }

    /// Transfer client that plays back scripted exchanges
    #[derive(Default)]
    struct ScriptedClient {
        scripts: Mutex<VecDeque<Script>>,
        calls: AtomicUsize,
        sinks: Mutex<Vec<ProgressSink>>,
    }

    impl ScriptedClient {
        fn with(scripts: Vec<Script>) -> Arc<Self> {
            Arc::new(Self {
                scripts: Mutex::new(scripts.into()),
                ..Default::default()
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl TransferClient for ScriptedClient {
        fn upload(&self, _file: SourceFile, progress: ProgressSink) -> TransferFuture {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.sinks.lock().unwrap().push(progress.clone());
            let script = self.scripts.lock().unwrap().pop_front().unwrap_or(Script::Hang);

            async move {
                match script {
                    Script::Succeed { progress: steps, filename } => {
                        for step in steps {
                            progress.report(step);
                            tokio::task::yield_now().await;
                        }
                        let mut payload = vec![0x00, 0x00, 0x00, 0x18];
                        payload.extend_from_slice(b"ftypmp42annotated-video");
                        Ok(TransferOutcome {
                            payload: Arc::new(payload),
                            filename: filename.to_string(),
                            content_type: Some("video/mp4".to_string()),
                        })
                    }
                    Script::Fail(e) => Err(e),
                    Script::Hang => futures::future::pending().await,
                }
            }
            .boxed()
        }
    }

    /// Preview renderer failing its first `failures` calls
    struct FlakyPreview {
        failures: AtomicUsize,
        calls: AtomicUsize,
    }

    impl FlakyPreview {
        fn failing(failures: usize) -> Arc<Self> {
            Arc::new(Self {
                failures: AtomicUsize::new(failures),
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl PreviewRenderer for FlakyPreview {
        fn render(&self, _reference: crate::result::LocalReference) -> PreviewFuture {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let fail = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            async move {
                if fail {
                    Err(PreviewError::Unrecognized("decoder rejected stream".to_string()))
                } else {
                    Ok(PreviewInfo {
                        container: "mp4".to_string(),
                        duration_secs: Some(4.0),
                        width: Some(640),
                        height: Some(360),
                        codec: Some("h264".to_string()),
                    })
                }
            }
            .boxed()
        }
    }

    struct Harness {
        machine: JobStateMachine,
        client: Arc<ScriptedClient>,
        preview: Arc<FlakyPreview>,
        snapshots: mpsc::UnboundedReceiver<JobSnapshot>,
        dir: TempDir,
    }

    impl Harness {
        fn new(scripts: Vec<Script>, preview_failures: usize) -> Self {
            let dir = TempDir::new().unwrap();
            let client = ScriptedClient::with(scripts);
            let preview = FlakyPreview::failing(preview_failures);
            let results = ResultManager::new(dir.path(), preview.clone());
            let config = Config {
                output_dir: Some(dir.path().to_path_buf()),
                ..Default::default()
            };
            let mut machine = JobStateMachine::new(config, client.clone(), results);
            let snapshots = machine.subscribe();
            Self {
                machine,
                client,
                preview,
                snapshots,
                dir,
            }
        }

        fn drain(&mut self) -> Vec<JobSnapshot> {
            let mut seen = Vec::new();
            while let Ok(snapshot) = self.snapshots.try_recv() {
                seen.push(snapshot);
            }
            seen
        }

        fn downloaded_files(&self) -> Vec<String> {
            let mut names: Vec<String> = std::fs::read_dir(self.dir.path())
                .unwrap()
                .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
                .collect();
            names.sort();
            names
        }
    }

    fn video(size: u64) -> SourceFile {
        SourceFile::new("/videos/site.mp4", size)
    }

    #[tokio::test]
    async fn test_oversized_file_is_invalid_and_never_uploaded() {
        let mut h = Harness::new(vec![], 0);

        let status = h.machine.select_file(video(500 * MIB + 1));
        assert_eq!(status, JobStatus::Invalid);

        let snapshot = h.machine.snapshot();
        assert!(snapshot.file.is_none());
        assert!(snapshot.error_message().unwrap().starts_with("File exceeds size limit"));
        assert_eq!(snapshot.error.unwrap().kind, FailureKind::Validation);

        assert!(matches!(h.machine.submit(), Err(JobError::NoFileStaged)));
        assert_eq!(h.client.calls(), 0);
    }

    #[tokio::test]
    async fn test_file_at_limit_is_accepted() {
        let mut h = Harness::new(vec![], 0);
        assert_eq!(h.machine.select_file(video(500 * MIB)), JobStatus::Idle);
        assert!(h.machine.snapshot().file.is_some());
    }

    #[tokio::test]
    async fn test_submit_without_file_reports_no_file() {
        let mut h = Harness::new(vec![], 0);
        assert!(matches!(h.machine.submit(), Err(JobError::NoFileStaged)));
        assert_eq!(h.machine.status(), JobStatus::Idle);
    }

    #[tokio::test]
    async fn test_successful_job_reaches_ready_with_one_auto_download() {
        let mut h = Harness::new(
            vec![Script::Succeed {
                progress: vec![0, 25, 50, 75, 100],
                filename: "out.mp4",
            }],
            0,
        );

        h.machine.select_file(video(10 * MIB));
        assert_ok!(h.machine.submit());
        let last = h.machine.run_until_settled().await;

        assert_eq!(last.status, JobStatus::Ready);
        let result = last.result.as_ref().unwrap();
        assert_eq!(result.filename, "out.mp4");
        assert_eq!(result.preview.as_ref().unwrap().codec.as_deref(), Some("h264"));
        assert_eq!(h.machine.result_handle().unwrap().filename(), "out.mp4");
        assert!(last.error.is_none());
        assert!(last.download_available);

        assert_eq!(h.downloaded_files(), vec!["out.mp4".to_string()]);
        assert_eq!(
            last.auto_download,
            Some(DownloadOutcome::Saved {
                path: h.dir.path().join("out.mp4")
            })
        );
        assert_eq!(h.client.calls(), 1);
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_reaches_100_before_ready() {
        let mut h = Harness::new(
            vec![Script::Succeed {
                progress: vec![0, 10, 5, 60, 40, 100, 100],
                filename: "out.mp4",
            }],
            0,
        );

        h.machine.select_file(video(MIB));
        assert_ok!(h.machine.submit());
        h.machine.run_until_settled().await;

        let snapshots = h.drain();
        let progress: Vec<u8> = snapshots
            .iter()
            .filter(|s| s.status.is_in_flight())
            .filter_map(|s| s.progress_percent)
            .collect();
        assert_eq!(progress, vec![0, 10, 60, 100]);

        let first_ready = snapshots.iter().position(|s| s.status == JobStatus::Ready).unwrap();
        let before = &snapshots[first_ready - 1];
        assert_eq!(before.status, JobStatus::Processing);
        assert_eq!(before.progress_percent, Some(100));
    }

    #[tokio::test]
    async fn test_progress_reaches_100_even_if_client_stops_short() {
        let mut h = Harness::new(
            vec![Script::Succeed {
                progress: vec![30],
                filename: "out.mp4",
            }],
            0,
        );

        h.machine.select_file(video(MIB));
        assert_ok!(h.machine.submit());
        h.machine.run_until_settled().await;

        let snapshots = h.drain();
        let first_ready = snapshots.iter().position(|s| s.status == JobStatus::Ready).unwrap();
        assert_eq!(snapshots[first_ready - 1].progress_percent, Some(100));
    }

    #[tokio::test]
    async fn test_on_progress_clamps_out_of_range_values() {
        let mut h = Harness::new(vec![Script::Hang], 0);
        h.machine.select_file(video(MIB));
        assert_ok!(h.machine.submit());

        h.machine.on_progress(-20);
        assert_eq!(h.machine.snapshot().progress_percent, Some(0));

        h.machine.on_progress(42);
        h.machine.on_progress(17);
        assert_eq!(h.machine.snapshot().progress_percent, Some(42));

        h.machine.on_progress(250);
        let snapshot = h.machine.snapshot();
        assert_eq!(snapshot.status, JobStatus::Processing);
        assert_eq!(snapshot.progress_percent, Some(100));
    }

    #[tokio::test]
    async fn test_server_error_detail_becomes_message() {
        let mut h = Harness::new(
            vec![Script::Fail(TransferError::Server {
                status: 500,
                detail: Some("model unavailable".to_string()),
            })],
            0,
        );

        h.machine.select_file(video(MIB));
        assert_ok!(h.machine.submit());
        let last = h.machine.run_until_settled().await;

        assert_eq!(last.status, JobStatus::Error);
        assert_eq!(last.error_message(), Some("model unavailable"));
        assert!(last.result.is_none());
        assert!(!last.download_available);
    }

    #[tokio::test]
    async fn test_timeout_is_reported_as_timeout() {
        let mut h = Harness::new(vec![Script::Fail(TransferError::Timeout { secs: 300 })], 0);

        h.machine.select_file(video(MIB));
        assert_ok!(h.machine.submit());
        let last = h.machine.run_until_settled().await;

        let error = last.error.unwrap();
        assert_eq!(error.kind, FailureKind::Timeout);
        assert!(error.message.contains("timed out"));
    }

    #[tokio::test]
    async fn test_unusable_payload_never_materializes() {
        let mut h = Harness::new(
            vec![Script::Fail(TransferError::Decode("expected a video payload, got text/html".to_string()))],
            0,
        );

        h.machine.select_file(video(MIB));
        assert_ok!(h.machine.submit());
        let last = h.machine.run_until_settled().await;

        assert_eq!(last.status, JobStatus::Error);
        let error = last.error.as_ref().unwrap();
        assert_eq!(error.kind, FailureKind::Decode);
        assert!(error.message.starts_with("Received an unusable video payload"));
        assert!(last.result.is_none());
        assert!(!last.download_available);
        assert!(h.machine.results().active().is_none());
        assert!(h.machine.result_handle().is_none());
        assert_eq!(h.preview.calls.load(Ordering::SeqCst), 0);
        assert!(h.downloaded_files().is_empty());
    }

    #[tokio::test]
    async fn test_upload_retry_returns_to_idle_with_file() {
        let mut h = Harness::new(
            vec![
                Script::Fail(TransferError::Network("connection refused".to_string())),
                Script::Succeed {
                    progress: vec![100],
                    filename: "out.mp4",
                },
            ],
            0,
        );

        h.machine.select_file(video(MIB));
        assert_ok!(h.machine.submit());
        h.machine.run_until_settled().await;
        assert_eq!(h.machine.status(), JobStatus::Error);

        assert_ok!(h.machine.retry());
        let snapshot = h.machine.snapshot();
        assert_eq!(snapshot.status, JobStatus::Idle);
        assert_eq!(snapshot.file.as_ref().unwrap().name, "site.mp4");
        assert!(snapshot.error.is_none());

        assert_ok!(h.machine.submit());
        let last = h.machine.run_until_settled().await;
        assert_eq!(last.status, JobStatus::Ready);
        assert_eq!(h.client.calls(), 2);
    }

    #[tokio::test]
    async fn test_preview_failure_keeps_download_available() {
        let mut h = Harness::new(
            vec![Script::Succeed {
                progress: vec![100],
                filename: "out.mp4",
            }],
            1,
        );

        h.machine.select_file(video(MIB));
        assert_ok!(h.machine.submit());
        let last = h.machine.run_until_settled().await;

        assert_eq!(last.status, JobStatus::Error);
        let error = last.error.as_ref().unwrap();
        assert_eq!(error.kind, FailureKind::Preview);
        assert!(error.message.starts_with("Failed to load video preview"));
        assert!(last.result.is_none());
        assert!(last.download_available);

        std::fs::remove_file(h.dir.path().join("out.mp4")).unwrap();
        let saved = h.machine.download().await.unwrap();
        assert_eq!(saved, h.dir.path().join("out.mp4"));
        assert!(saved.exists());
    }

    #[tokio::test]
    async fn test_preview_retry_does_not_reupload_or_redownload() {
        let mut h = Harness::new(
            vec![Script::Succeed {
                progress: vec![100],
                filename: "out.mp4",
            }],
            1,
        );

        h.machine.select_file(video(MIB));
        assert_ok!(h.machine.submit());
        h.machine.run_until_settled().await;
        assert_eq!(h.machine.status(), JobStatus::Error);

        std::fs::remove_file(h.dir.path().join("out.mp4")).unwrap();

        assert_ok!(h.machine.retry());
        let last = h.machine.run_until_settled().await;

        assert_eq!(last.status, JobStatus::Ready);
        assert!(last.result.as_ref().unwrap().preview.is_some());
        assert_eq!(h.client.calls(), 1);
        assert_eq!(h.preview.calls.load(Ordering::SeqCst), 2);
        // Auto-download is a once-per-job effect
        assert!(h.downloaded_files().is_empty());
    }

    #[tokio::test]
    async fn test_submit_while_uploading_is_ignored() {
        let mut h = Harness::new(vec![Script::Hang], 0);
        h.machine.select_file(video(MIB));
        assert_ok!(h.machine.submit());
        assert_ok!(h.machine.submit());
        assert_ok!(h.machine.submit());

        tokio::task::yield_now().await;
        assert_eq!(h.client.calls(), 1);
        assert_eq!(h.machine.status(), JobStatus::Uploading);
    }

    #[tokio::test]
    async fn test_new_selection_ignores_superseded_job() {
        let mut h = Harness::new(
            vec![
                Script::Hang,
                Script::Succeed {
                    progress: vec![0, 100],
                    filename: "second.mp4",
                },
            ],
            0,
        );

        h.machine.select_file(SourceFile::new("/videos/first.mp4", MIB));
        assert_ok!(h.machine.submit());
        tokio::task::yield_now().await;
        let first_generation = h.machine.snapshot().generation;

        h.machine.select_file(SourceFile::new("/videos/second.mp4", MIB));
        let second_generation = h.machine.snapshot().generation;
        assert!(second_generation > first_generation);
        assert!(!h.machine.is_busy());
        h.drain();

        // A late callback from the first job must not move the new one
        let stale_sink = h.client.sinks.lock().unwrap()[0].clone();
        stale_sink.report(80);

        assert_ok!(h.machine.submit());
        let last = h.machine.run_until_settled().await;
        assert_eq!(last.status, JobStatus::Ready);
        assert_eq!(last.result.unwrap().filename, "second.mp4");

        let snapshots = h.drain();
        assert!(snapshots.iter().all(|s| s.generation == second_generation));
        assert!(snapshots.iter().all(|s| s.progress_percent != Some(80)));
        assert_eq!(h.downloaded_files(), vec!["second.mp4".to_string()]);
    }

    #[tokio::test]
    async fn test_new_selection_releases_previous_result() {
        let mut h = Harness::new(
            vec![Script::Succeed {
                progress: vec![100],
                filename: "out.mp4",
            }],
            0,
        );

        h.machine.select_file(video(MIB));
        assert_ok!(h.machine.submit());
        h.machine.run_until_settled().await;
        let reference = h.machine.result_handle().unwrap().reference().clone();
        assert!(h.machine.results().is_live(&reference));

        h.machine.select_file(video(2 * MIB));
        assert!(!h.machine.results().is_live(&reference));
        let snapshot = h.machine.snapshot();
        assert_eq!(snapshot.status, JobStatus::Idle);
        assert!(snapshot.result.is_none());
        assert!(!snapshot.download_available);
    }

    #[tokio::test]
    async fn test_retry_only_from_error() {
        let mut h = Harness::new(vec![], 0);
        assert!(matches!(h.machine.retry(), Err(JobError::InvalidState { .. })));

        h.machine.select_file(video(600 * MIB));
        assert!(h.machine.retry().is_err());
    }

    #[tokio::test]
    async fn test_shutdown_releases_everything() {
        let mut h = Harness::new(
            vec![Script::Succeed {
                progress: vec![100],
                filename: "out.mp4",
            }],
            0,
        );
        h.machine.select_file(video(MIB));
        assert_ok!(h.machine.submit());
        h.machine.run_until_settled().await;

        h.machine.shutdown();
        assert!(h.machine.results().active().is_none());
        assert!(matches!(h.machine.download().await, Err(JobError::NoResult)));
    }
}
