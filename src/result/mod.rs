//! # Result Lifecycle Module
//!
//! Questo modulo possiede il riferimento locale al payload video restituito dal servizio.
//!
//! ## Responsabilità:
//! - `materialize()`: crea un riferimento riutilizzabile al payload (idempotente)
//! - `trigger_download()`: salva il payload su disco con il nome suggerito
//! - `preview()`: avvia la materializzazione della preview tramite un `PreviewRenderer`
//! - `release()`: invalida il riferimento e libera la memoria bufferizzata
//!
//! ## Idempotenza:
//! - Il riferimento è identificato dallo SHA-256 del contenuto
//! - Materializzare di nuovo lo stesso payload restituisce lo stesso riferimento,
//!   senza duplicare lo storage sottostante
//!
//! ## Download:
//! - Scrittura su file temporaneo nella directory di output, poi rename atomico
//! - Il file temporaneo viene rimosso su qualsiasi percorso di errore
//!
//! ## Esempio:
//! ```rust,ignore
//! let mut results = ResultManager::new(output_dir, Arc::new(ContainerProbe));
//! let reference = results.materialize(&outcome.payload).await;
//! let saved = results.trigger_download(&reference, &outcome.filename).await?;
//! results.release(&reference);
//! ```

pub mod preview;

pub use preview::{ContainerProbe, FfprobePreview, PreviewFuture, PreviewInfo, PreviewRenderer};

use crate::error::{PreviewError, ResultError};
use futures::FutureExt;
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Local, in-memory reference to a retrieved payload
#[derive(Clone)]
pub struct LocalReference {
    id: String,
    data: Arc<Vec<u8>>,
}

impl LocalReference {
    pub fn new(data: Arc<Vec<u8>>) -> Self {
        let id = content_digest(&data);
        Self { id, data }
    }

    /// Like `new`, with the digest computed on the blocking pool
    pub async fn hashed(data: Arc<Vec<u8>>) -> Self {
        let bytes = Arc::clone(&data);
        match tokio::task::spawn_blocking(move || content_digest(&bytes)).await {
            Ok(id) => Self { id, data },
            Err(e) => {
                debug!("Digest task failed ({}), hashing inline", e);
                Self::new(data)
            }
        }
    }

    /// Content digest identifying the payload
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn short_id(&self) -> &str {
        &self.id[..16]
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// True when both references point at the same buffer
    pub fn shares_storage_with(&self, other: &LocalReference) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl PartialEq for LocalReference {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for LocalReference {}

impl fmt::Debug for LocalReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalReference")
            .field("id", &self.short_id())
            .field("len", &self.data.len())
            .finish()
    }
}

fn content_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Owns the local reference of the active job's result
pub struct ResultManager {
    output_dir: PathBuf,
    active: Option<LocalReference>,
    renderer: Arc<dyn PreviewRenderer>,
}

impl ResultManager {
    pub fn new(output_dir: impl Into<PathBuf>, renderer: Arc<dyn PreviewRenderer>) -> Self {
        Self {
            output_dir: output_dir.into(),
            active: None,
            renderer,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn active(&self) -> Option<&LocalReference> {
        self.active.as_ref()
    }

    /// Whether `reference` is still the live, unreleased reference
    pub fn is_live(&self, reference: &LocalReference) -> bool {
        self.active.as_ref().map_or(false, |active| active == reference)
    }

    /// Produce a reusable local reference to `payload`.
    ///
    /// Materializing the same payload again returns the existing reference.
    /// A different payload releases the previous reference first.
    pub async fn materialize(&mut self, payload: &Arc<Vec<u8>>) -> LocalReference {
        if let Some(ref active) = self.active {
            if Arc::ptr_eq(&active.data, payload) {
                return active.clone();
            }
        }

        let candidate = LocalReference::hashed(Arc::clone(payload)).await;
        if let Some(ref active) = self.active {
            if *active == candidate {
                debug!("Payload {} already materialized", active.short_id());
                return active.clone();
            }
        }

        self.release_all();
        debug!("Materialized {} ({} bytes)", candidate.short_id(), candidate.len());
        self.active = Some(candidate.clone());
        candidate
    }

    /// Invalidate `reference`. Returns false when it was not live.
    pub fn release(&mut self, reference: &LocalReference) -> bool {
        if self.is_live(reference) {
            self.release_all();
            true
        } else {
            false
        }
    }

    /// Drop whatever reference is live
    pub fn release_all(&mut self) {
        if let Some(previous) = self.active.take() {
            debug!("Released {} ({} bytes)", previous.short_id(), previous.len());
        }
    }

    /// Save the payload to `output_dir/filename`
    pub async fn trigger_download(&self, reference: &LocalReference, filename: &str) -> Result<PathBuf, ResultError> {
        if !self.is_live(reference) {
            return Err(ResultError::Released);
        }

        let target = self.output_dir.join(download_name(filename));
        let dir = self.output_dir.clone();
        let data = Arc::clone(&reference.data);
        let destination = target.clone();

        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            std::fs::create_dir_all(&dir)?;
            let mut temp = NamedTempFile::new_in(&dir)?;
            temp.write_all(&data)?;
            temp.flush()?;
            temp.persist(&destination).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))??;

        info!("Saved result to {}", target.display());
        Ok(target)
    }

    /// Start preview materialization for `reference`
    pub fn preview(&self, reference: &LocalReference) -> PreviewFuture {
        if !self.is_live(reference) {
            return futures::future::ready(Err(PreviewError::Released)).boxed();
        }
        self.renderer.render(reference.clone())
    }
}

/// Strip any directory part from a suggested name
fn download_name(filename: &str) -> String {
    let base = Path::new(filename)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    if base.trim().is_empty() {
        crate::transfer::default_filename()
    } else {
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager(dir: &TempDir) -> ResultManager {
        ResultManager::new(dir.path(), Arc::new(ContainerProbe))
    }

    fn payload(bytes: &[u8]) -> Arc<Vec<u8>> {
        Arc::new(bytes.to_vec())
    }

    #[tokio::test]
    async fn test_materialize_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut results = manager(&dir);
        let data = payload(b"\x00\x00\x00\x18ftypmp42");

        let first = results.materialize(&data).await;
        let second = results.materialize(&data).await;
        assert_eq!(first, second);
        assert!(first.shares_storage_with(&second));

        // Same bytes in a different buffer still resolve to the stored one
        let copy = payload(b"\x00\x00\x00\x18ftypmp42");
        let third = results.materialize(&copy).await;
        assert_eq!(third, first);
        assert!(third.shares_storage_with(&first));
        assert!(!third.shares_storage_with(&LocalReference::new(copy)));
    }

    #[tokio::test]
    async fn test_hashed_matches_inline_digest() {
        let data = payload(b"annotated video bytes");
        let hashed = LocalReference::hashed(Arc::clone(&data)).await;
        let inline = LocalReference::new(Arc::clone(&data));
        assert_eq!(hashed.id(), inline.id());
        assert_eq!(hashed.id().len(), 64);
        assert!(hashed.shares_storage_with(&inline));
    }

    #[tokio::test]
    async fn test_new_payload_replaces_previous() {
        let dir = TempDir::new().unwrap();
        let mut results = manager(&dir);

        let old = results.materialize(&payload(b"first")).await;
        let new = results.materialize(&payload(b"second")).await;
        assert_ne!(old, new);
        assert!(!results.is_live(&old));
        assert!(results.is_live(&new));
    }

    #[tokio::test]
    async fn test_release() {
        let dir = TempDir::new().unwrap();
        let mut results = manager(&dir);
        let reference = results.materialize(&payload(b"bytes")).await;

        assert!(results.release(&reference));
        assert!(!results.release(&reference));
        assert!(results.active().is_none());
    }

    #[tokio::test]
    async fn test_trigger_download_writes_file() {
        let dir = TempDir::new().unwrap();
        let mut results = manager(&dir);
        let reference = results.materialize(&payload(b"annotated video")).await;

        let saved = results.trigger_download(&reference, "out.mp4").await.unwrap();
        assert_eq!(saved, dir.path().join("out.mp4"));
        assert_eq!(tokio::fs::read(&saved).await.unwrap(), b"annotated video");

        // Downloading again overwrites instead of leaving temporaries behind
        results.trigger_download(&reference, "out.mp4").await.unwrap();
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_download_name_is_confined_to_output_dir() {
        let dir = TempDir::new().unwrap();
        let mut results = manager(&dir);
        let reference = results.materialize(&payload(b"x")).await;

        let saved = results.trigger_download(&reference, "../escape.mp4").await.unwrap();
        assert_eq!(saved, dir.path().join("escape.mp4"));

        let generated = results.trigger_download(&reference, "").await.unwrap();
        assert!(generated.file_name().unwrap().to_string_lossy().starts_with("processed_"));
    }

    #[tokio::test]
    async fn test_released_reference_cannot_be_used() {
        let dir = TempDir::new().unwrap();
        let mut results = manager(&dir);
        let reference = results.materialize(&payload(b"x")).await;
        results.release(&reference);

        let err = results.trigger_download(&reference, "out.mp4").await.unwrap_err();
        assert!(matches!(err, ResultError::Released));

        let preview = results.preview(&reference).await;
        assert_eq!(preview, Err(PreviewError::Released));
    }
}
