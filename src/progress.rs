//! # Progress Rendering Module
//!
//! Questo modulo traduce gli snapshot del job in feedback visivo sul terminale.
//!
//! ## Responsabilità:
//! - Barra di progresso `indicatif` (0-100) durante l'upload
//! - Spinner durante l'analisi remota ("Analyzing video - this may take a few minutes")
//! - Messaggi finali per risultato pronto, download, preview ed errori
//!
//! ## Visual feedback:
//! ```text
//! Selected: site.mp4 (12.40 MB)
//! ⠋ [00:00:04] [========================================] 100% Uploading site.mp4
//! ⠙ Analyzing video - this may take a few minutes
//! ✅ Ready: out.mp4 (11.87 MB)
//! 💾 Saved to /home/user/Downloads/out.mp4
//! ```
//!
//! ## Esempio:
//! ```rust,ignore
//! let mut renderer = ProgressRenderer::new();
//! while let Some(snapshot) = snapshots.recv().await {
//!     renderer.render(&snapshot);
//! }
//! ```

use crate::file_manager::FileManager;
use crate::job::{DownloadOutcome, JobSnapshot, JobStatus};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

pub const PROCESSING_MESSAGE: &str = "Analyzing video - this may take a few minutes";

/// Factory for the bars used by the renderer
pub struct ProgressManager;

impl ProgressManager {
    /// Percent bar for the upload phase
    pub fn upload_bar(message: &str) -> ProgressBar {
        let bar = ProgressBar::new(100);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        bar.set_style(style);
        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));
        bar
    }

    /// Spinner for indeterminate progress
    pub fn spinner(message: &str) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        spinner.set_style(style);
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner
    }
}

/// Renders job snapshots as terminal progress
pub struct ProgressRenderer {
    bar: Option<ProgressBar>,
    spinner: Option<ProgressBar>,
    last: Option<JobSnapshot>,
    hidden: bool,
}

impl Default for ProgressRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressRenderer {
    pub fn new() -> Self {
        Self {
            bar: None,
            spinner: None,
            last: None,
            hidden: false,
        }
    }

    /// Renderer drawing nothing, bars still track state
    pub fn hidden() -> Self {
        Self {
            hidden: true,
            ..Self::new()
        }
    }

    pub fn render(&mut self, snapshot: &JobSnapshot) {
        for line in transition_lines(self.last.as_ref(), snapshot) {
            self.println(&line);
        }

        match snapshot.status {
            JobStatus::Uploading => {
                self.finish_spinner();
                let name = snapshot.file.as_ref().map_or("video", |f| f.name.as_str());
                let bar = match self.bar.take() {
                    Some(bar) => bar,
                    None => self.make(ProgressManager::upload_bar(&format!("Uploading {}", name))),
                };
                bar.set_position(u64::from(snapshot.progress_percent.unwrap_or(0)));
                self.bar = Some(bar);
            }
            JobStatus::Processing => {
                if let Some(bar) = self.bar.take() {
                    bar.set_position(100);
                    bar.finish_with_message("Upload complete");
                }
                if self.spinner.is_none() {
                    self.spinner = Some(self.make(ProgressManager::spinner(PROCESSING_MESSAGE)));
                }
            }
            _ => {
                if let Some(bar) = self.bar.take() {
                    bar.abandon();
                }
                self.finish_spinner();
            }
        }

        self.last = Some(snapshot.clone());
    }

    /// Upload bar position, if a bar is showing
    pub fn bar_position(&self) -> Option<u64> {
        self.bar.as_ref().map(|bar| bar.position())
    }

    pub fn is_spinning(&self) -> bool {
        self.spinner.is_some()
    }

    fn make(&self, bar: ProgressBar) -> ProgressBar {
        if self.hidden {
            bar.set_draw_target(ProgressDrawTarget::hidden());
        }
        bar
    }

    fn finish_spinner(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }

    fn println(&self, line: &str) {
        if self.hidden {
            return;
        }
        match self.bar.as_ref().or(self.spinner.as_ref()) {
            Some(bar) => bar.println(line),
            None => eprintln!("{}", line),
        }
    }
}

/// Human-readable lines for the change from `previous` to `current`
pub fn transition_lines(previous: Option<&JobSnapshot>, current: &JobSnapshot) -> Vec<String> {
    let mut lines = Vec::new();
    let new_job = previous.map_or(true, |p| p.generation != current.generation);
    let entered = |status: JobStatus| {
        current.status == status && (new_job || previous.map_or(true, |p| p.status != status))
    };

    if new_job {
        if let Some(ref file) = current.file {
            lines.push(format!("Selected: {} ({})", file.name, FileManager::format_size(file.size)));
        }
    }

    if entered(JobStatus::Invalid) || entered(JobStatus::Error) {
        if let Some(message) = current.error_message() {
            lines.push(format!("❌ {}", message));
        }
        if current.status == JobStatus::Error && current.download_available {
            lines.push("The processed video is still available for download".to_string());
        }
    }

    if current.status == JobStatus::Ready {
        if let Some(ref result) = current.result {
            let was_ready = !new_job && previous.map_or(false, |p| p.status == JobStatus::Ready);
            if !was_ready {
                lines.push(format!(
                    "✅ Ready: {} ({})",
                    result.filename,
                    FileManager::format_size(result.size_bytes)
                ));
            }

            let had_preview = !new_job
                && previous
                    .and_then(|p| p.result.as_ref())
                    .map_or(false, |r| r.preview.is_some());
            if let (Some(preview), false) = (result.preview.as_ref(), had_preview) {
                lines.push(format!("🎞  Preview: {}", preview.describe()));
            }
        }
    }

    let previous_download = if new_job { None } else { previous.and_then(|p| p.auto_download.as_ref()) };
    if current.auto_download.as_ref() != previous_download {
        match current.auto_download {
            Some(DownloadOutcome::Saved { ref path }) => lines.push(format!("💾 Saved to {}", path.display())),
            Some(DownloadOutcome::Failed { ref message }) => lines.push(format!("⚠️  {}", message)),
            None => {}
        }
    }

    lines
}
