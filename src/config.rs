//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione del client.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` con tutti i parametri del workflow upload/risultato
//! - Fornisce validazione robusta dei parametri di input
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//! - Fornisce valori di default sensati per tutti i parametri
//!
//! ## Parametri di configurazione:
//! - `server_url`: URL base del servizio di analisi (default: "http://localhost:8000")
//! - `timeout_secs`: Tetto sull'intero scambio upload + elaborazione + download (default: 300)
//! - `max_file_size`: Dimensione massima accettata per il file sorgente (default: 500 MiB)
//! - `output_dir`: Directory dove salvare il risultato (default: None = cartella Download)
//! - `auto_download`: Salva automaticamente il risultato appena pronto (default: true)
//! - `preview`: Materializza una preview del risultato (default: true)
//! - `json_output`: Emette eventi JSON su stdout (default: false)
//!
//! ## Validazione:
//! - Controlla che server_url sia http:// o https://
//! - Controlla che timeout_secs e max_file_size siano > 0
//! - Controlla che output_dir, se specificata, esista e sia una directory
//!
//! ## Esempio:
//! ```rust,ignore
//! let config = Config {
//!     server_url: "http://analysis.local:8000".to_string(),
//!     timeout_secs: 120,
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Maximum accepted source file size (500 MiB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 500 * 1024 * 1024;

/// Ceiling on the whole upload/process/download exchange
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Configuration for the analysis client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the analysis service
    pub server_url: String,
    /// Timeout for the whole exchange, in seconds
    pub timeout_secs: u64,
    /// Maximum source file size in bytes
    pub max_file_size: u64,
    /// Directory for downloaded results (None = user download directory)
    pub output_dir: Option<PathBuf>,
    /// Save the result automatically once it is ready
    pub auto_download: bool,
    /// Materialize a preview of the result
    pub preview: bool,
    /// Output progress and status as JSON for programmatic use
    pub json_output: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8000".to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            output_dir: None,
            auto_download: true,
            preview: true,
            json_output: false,
        }
    }
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if !(self.server_url.starts_with("http://") || self.server_url.starts_with("https://")) {
            return Err(anyhow::anyhow!("Server URL must start with http:// or https://: {}", self.server_url));
        }

        if self.timeout_secs == 0 {
            return Err(anyhow::anyhow!("Timeout must be greater than 0 seconds"));
        }

        if self.max_file_size == 0 {
            return Err(anyhow::anyhow!("Maximum file size must be greater than 0"));
        }

        if let Some(ref output_dir) = self.output_dir {
            if !output_dir.exists() {
                return Err(anyhow::anyhow!("Output path does not exist: {}", output_dir.display()));
            }
            if !output_dir.is_dir() {
                return Err(anyhow::anyhow!("Output path is not a directory: {}", output_dir.display()));
            }
        }

        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Upload endpoint derived from the base URL
    pub fn process_video_url(&self) -> String {
        format!("{}/api/process-video", self.server_url.trim_end_matches('/'))
    }

    /// Status endpoint derived from the base URL
    pub fn status_url(&self) -> String {
        format!("{}/api/status", self.server_url.trim_end_matches('/'))
    }

    /// Directory where results are saved
    pub fn resolved_output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .or_else(dirs::download_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Default location of the config file (`~/.media-analyzer/config.json`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".media-analyzer").join("config.json"))
    }

    /// Load configuration from file
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}
