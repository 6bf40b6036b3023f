//! # File Management Module
//!
//! Questo modulo gestisce la selezione del file sorgente da inviare al servizio.
//!
//! ## Responsabilità:
//! - Costruisce `SourceFile` (path, nome, dimensione, media type dichiarato) da un path
//! - Determina il media type dal filtro di accettazione (solo indicativo, non vincolante)
//! - Formattazione human-readable delle dimensioni
//!
//! ## Formati accettati:
//! - **Video**: MP4, AVI, MOV (più MKV, accettato anche dal servizio)
//! - Altri file vengono comunque accettati come `application/octet-stream`
//!
//! ## Esempio:
//! ```rust,ignore
//! let file = FileManager::source_file(Path::new("clip.mp4")).await?;
//! println!("Selected: {} ({})", file.name, FileManager::format_size(file.size));
//! ```

use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Fallback media type for files outside the accept filter
pub const OCTET_STREAM: &str = "application/octet-stream";

/// A file picked for submission. Immutable once accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFile {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    pub media_type: String,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>, size: u64) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "video".to_string());
        let media_type = FileManager::media_type(&path).unwrap_or(OCTET_STREAM).to_string();

        Self {
            path,
            name,
            size,
            media_type,
        }
    }

    /// Whether the file passes the picker's accept filter
    pub fn is_accepted_type(&self) -> bool {
        self.media_type != OCTET_STREAM
    }
}

/// Manages source file discovery and formatting
pub struct FileManager;

impl FileManager {
    /// Build a `SourceFile` from the file system metadata of `path`
    pub async fn source_file(path: &Path) -> std::io::Result<SourceFile> {
        let metadata = fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Not a regular file: {}", path.display()),
            ));
        }
        Ok(SourceFile::new(path, metadata.len()))
    }

    /// Declared media type for the accepted video extensions
    pub fn media_type(path: &Path) -> Option<&'static str> {
        let ext = path.extension()?.to_string_lossy().to_lowercase();
        match ext.as_str() {
            "mp4" | "m4v" => Some("video/mp4"),
            "avi" => Some("video/x-msvideo"),
            "mov" => Some("video/quicktime"),
            "mkv" => Some("video/x-matroska"),
            _ => None,
        }
    }

    /// Get human-readable file size
    pub fn format_size(size: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = size as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", size as u64, UNITS[unit_index])
        } else {
            format!("{:.2} {}", size, UNITS[unit_index])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_media_types() {
        assert_eq!(FileManager::media_type(Path::new("a.MP4")), Some("video/mp4"));
        assert_eq!(FileManager::media_type(Path::new("a.avi")), Some("video/x-msvideo"));
        assert_eq!(FileManager::media_type(Path::new("a.mov")), Some("video/quicktime"));
        assert_eq!(FileManager::media_type(Path::new("a.mkv")), Some("video/x-matroska"));
        assert_eq!(FileManager::media_type(Path::new("a.txt")), None);
        assert_eq!(FileManager::media_type(Path::new("noext")), None);
    }

    #[test]
    fn test_source_file_metadata() {
        let file = SourceFile::new("/videos/site.mov", 2048);
        assert_eq!(file.name, "site.mov");
        assert_eq!(file.media_type, "video/quicktime");
        assert!(file.is_accepted_type());

        let other = SourceFile::new("/videos/notes.bin", 1);
        assert_eq!(other.media_type, OCTET_STREAM);
        assert!(!other.is_accepted_type());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(FileManager::format_size(512), "512 B");
        assert_eq!(FileManager::format_size(1536), "1.50 KB");
        assert_eq!(FileManager::format_size(500 * 1024 * 1024), "500.00 MB");
    }

    #[tokio::test]
    async fn test_source_file_from_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clip.mp4");
        tokio::fs::write(&path, vec![0u8; 4096]).await.unwrap();

        let file = FileManager::source_file(&path).await.unwrap();
        assert_eq!(file.size, 4096);
        assert_eq!(file.name, "clip.mp4");

        assert!(FileManager::source_file(dir.path()).await.is_err());
        assert!(FileManager::source_file(&dir.path().join("missing.mp4")).await.is_err());
    }
}
