//! # Media Analyzer - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing` (sempre su stderr)
//! - Caricamento della configurazione da file e sovrascrittura con i flag
//! - Esecuzione di un job: selezione, upload, attesa del risultato, download
//! - Retry su richiesta dell'utente, mai automatico
//!
//! ## Flusso di esecuzione:
//! 1. Parsa gli argomenti CLI
//! 2. Configura il logging (INFO o DEBUG a seconda del flag verbose, `RUST_LOG` ha la precedenza)
//! 3. Carica `~/.media-analyzer/config.json` (o `--config`) e applica i flag
//! 4. Con `--check-status` interroga il servizio ed esce
//! 5. Altrimenti seleziona il video, lo invia e attende che il job si stabilizzi
//! 6. In caso di errore, da terminale interattivo chiede "Retry? [y/N]"
//!
//! ## Esempio di utilizzo:
//! ```bash
//! media-analyze site.mp4 --server http://gpu-box:8000 --output ./results --verbose
//! media-analyze --check-status --json
//! ```

use anyhow::Result;
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use media_analyzer_client::json_output::{JsonMessage, JsonRenderer};
use media_analyzer_client::platform::PlatformCommands;
use media_analyzer_client::progress::ProgressRenderer;
use media_analyzer_client::{
    Config, ContainerProbe, DownloadOutcome, FailureClass, FfprobePreview, HttpTransferClient, JobSnapshot,
    JobStateMachine, JobStatus, PreviewRenderer, ResultManager,
};

#[derive(Parser)]
#[command(name = "media-analyze")]
#[command(about = "Upload a video to the analysis service and download the annotated result")]
struct Args {
    /// Video file to analyze (MP4, AVI, MOV)
    video: Option<PathBuf>,

    /// Base URL of the analysis service
    #[arg(short, long)]
    server: Option<String>,

    /// Directory where the processed video is saved (default: Downloads)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Ceiling for the whole upload and processing exchange, in seconds
    #[arg(short, long)]
    timeout_secs: Option<u64>,

    /// Config file (default: ~/.media-analyzer/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Emit line-delimited JSON events on stdout
    #[arg(long)]
    json: bool,

    /// Don't save the result automatically when it is ready
    #[arg(long)]
    no_auto_download: bool,

    /// Skip the preview of the processed video
    #[arg(long)]
    no_preview: bool,

    /// Query the service status and exit
    #[arg(long)]
    check_status: bool,

    /// Write the effective configuration back to the config file
    #[arg(long)]
    save_config: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Presentation of snapshots, terminal or JSON
enum Renderer {
    Terminal(ProgressRenderer),
    Json(JsonRenderer),
}

impl Renderer {
    fn render(&mut self, snapshot: &JobSnapshot) {
        match self {
            Self::Terminal(renderer) => renderer.render(snapshot),
            Self::Json(renderer) => renderer.render(snapshot),
        }
    }

    fn flush(&mut self, snapshots: &mut mpsc::UnboundedReceiver<JobSnapshot>) {
        while let Ok(snapshot) = snapshots.try_recv() {
            self.render(&snapshot);
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Logs go to stderr so that stdout stays clean for --json
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if args.verbose { "debug" } else { "info" }));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = args.config.clone().or_else(Config::default_path);
    let config = load_config(&args, config_path.as_deref()).await?;

    if args.save_config {
        if let Some(ref path) = config_path {
            config.save_to_file(path).await?;
            info!("Saved configuration to {}", path.display());
        }
    }

    let client = Arc::new(HttpTransferClient::new(&config)?);

    if args.check_status {
        return Ok(check_status(&client, config.json_output).await);
    }

    let video = args
        .video
        .ok_or_else(|| anyhow::anyhow!("Please select a video file first"))?;

    let renderer: Arc<dyn PreviewRenderer> = if !config.preview {
        Arc::new(ContainerProbe)
    } else if PlatformCommands::instance().is_command_available("ffprobe").await {
        debug!("Using ffprobe for previews");
        Arc::new(FfprobePreview::default())
    } else {
        debug!("ffprobe not found, previews limited to container detection");
        Arc::new(ContainerProbe)
    };

    let output_dir = config.resolved_output_dir();
    info!("Results will be saved to {}", output_dir.display());
    let results = ResultManager::new(output_dir, renderer);

    let json = config.json_output;
    let auto_download = config.auto_download;
    let mut machine = JobStateMachine::new(config, client, results);
    let mut snapshots = machine.subscribe();
    let mut view = if json {
        Renderer::Json(JsonRenderer::new())
    } else {
        Renderer::Terminal(ProgressRenderer::new())
    };

    let status = machine.select_path(&video).await?;
    view.flush(&mut snapshots);
    if status == JobStatus::Invalid {
        return Ok(ExitCode::FAILURE);
    }

    machine.submit()?;
    let interactive = std::io::stdin().is_terminal() && !json;

    let code = loop {
        if !drive(&mut machine, &mut snapshots, &mut view).await {
            warn!("Interrupted, cancelling the job");
            machine.shutdown();
            break ExitCode::from(130);
        }

        let snapshot = machine.snapshot();
        match snapshot.status {
            JobStatus::Ready => {
                save_if_needed(&machine, &snapshot, auto_download, interactive, &mut view).await;
                break ExitCode::SUCCESS;
            }
            JobStatus::Error => {
                if interactive && ask("Retry? [y/N] ", false).await {
                    let class = snapshot.error.as_ref().map(|e| e.class());
                    machine.retry()?;
                    if class == Some(FailureClass::Upload) {
                        machine.submit()?;
                    }
                    view.flush(&mut snapshots);
                    continue;
                }
                if snapshot.download_available {
                    save_if_needed(&machine, &snapshot, auto_download, interactive, &mut view).await;
                }
                break ExitCode::FAILURE;
            }
            other => {
                debug!("Job settled in {}", other);
                break ExitCode::FAILURE;
            }
        }
    };

    machine.shutdown();
    Ok(code)
}

/// Resolve the effective configuration: file first, then command-line flags
async fn load_config(args: &Args, path: Option<&std::path::Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => Config::from_file(path).await?,
        None => Config::default(),
    };

    if let Some(ref server) = args.server {
        config.server_url = server.clone();
    }
    if let Some(timeout) = args.timeout_secs {
        config.timeout_secs = timeout;
    }
    if let Some(ref output_dir) = args.output {
        if !output_dir.exists() {
            tokio::fs::create_dir_all(output_dir).await?;
            info!("Created output directory: {}", output_dir.display());
        }
        config.output_dir = Some(output_dir.clone());
    }
    if args.json {
        config.json_output = true;
    }
    if args.no_auto_download {
        config.auto_download = false;
    }
    if args.no_preview {
        config.preview = false;
    }

    config.validate()?;
    Ok(config)
}

/// Apply job events until nothing is in flight. Returns false on Ctrl-C.
async fn drive(
    machine: &mut JobStateMachine,
    snapshots: &mut mpsc::UnboundedReceiver<JobSnapshot>,
    view: &mut Renderer,
) -> bool {
    view.flush(snapshots);
    loop {
        let progressed = tokio::select! {
            progressed = machine.next_event() => progressed,
            _ = tokio::signal::ctrl_c() => return false,
        };
        view.flush(snapshots);
        if !progressed {
            return true;
        }
    }
}

/// Offer a manual save when the automatic one did not happen
async fn save_if_needed(
    machine: &JobStateMachine,
    snapshot: &JobSnapshot,
    auto_download: bool,
    interactive: bool,
    view: &mut Renderer,
) {
    if matches!(snapshot.auto_download, Some(DownloadOutcome::Saved { .. })) {
        return;
    }
    let wanted = if auto_download {
        // Automatic save failed, try once more
        true
    } else {
        interactive && ask("Save the processed video? [Y/n] ", true).await
    };
    if !wanted {
        return;
    }

    let outcome = match machine.download().await {
        Ok(path) => DownloadOutcome::Saved { path },
        Err(e) => DownloadOutcome::Failed {
            message: format!("Failed to download video: {}", e),
        },
    };
    match view {
        Renderer::Json(_) => JsonMessage::downloaded(&outcome).emit(),
        Renderer::Terminal(_) => match outcome {
            DownloadOutcome::Saved { path } => eprintln!("💾 Saved to {}", path.display()),
            DownloadOutcome::Failed { message } => eprintln!("⚠️  {}", message),
        },
    }
}

/// Ask a yes/no question on the terminal
async fn ask(prompt: &'static str, default: bool) -> bool {
    let answer = tokio::task::spawn_blocking(move || {
        eprint!("{}", prompt);
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).map(|_| line)
    })
    .await;

    match answer {
        Ok(Ok(line)) => match line.trim().to_lowercase().as_str() {
            "" => default,
            "y" | "yes" => true,
            _ => false,
        },
        _ => false,
    }
}

async fn check_status(client: &HttpTransferClient, json: bool) -> ExitCode {
    match client.status().await {
        Ok(status) => {
            if json {
                JsonMessage::status(Ok(status)).emit();
            } else {
                println!("Service: {}", status.status);
                if let Some(ref model) = status.model {
                    println!("Model: {}", model);
                }
                if let Some(ref device) = status.device {
                    println!("Device: {}", device);
                }
                if let Some(threshold) = status.confidence_threshold {
                    println!("Confidence threshold: {:.2}", threshold);
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            if json {
                JsonMessage::status(Err(e.user_message())).emit();
            } else {
                eprintln!("❌ {}", e.user_message());
            }
            ExitCode::FAILURE
        }
    }
}
