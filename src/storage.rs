//! Filesystem-backed screenshot storage.
//!
//! Screenshots live under `{root}/base`, `{root}/current` and `{root}/diff`.
//! Filenames are validated before any path is built, and the resolved path
//! is re-checked to still sit under the kind directory.

use crate::{RunnerError, ScreenshotKind, StorageAdapter};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Reject path separators and parent references outright; replace the
/// remaining unsafe characters with `_` so one logical ID always maps to
/// the same safe filename.
pub fn sanitize_filename(input: &str) -> Result<String, RunnerError> {
    if input.is_empty() {
        return Err(RunnerError::InvalidFilename(
            "filename is empty".to_string(),
        ));
    }

    if input.contains('/') || input.contains('\\') || input.contains("..") {
        return Err(RunnerError::InvalidFilename(format!(
            "'{input}' contains a path separator or parent reference"
        )));
    }

    let sanitized: String = input
        .chars()
        .map(|c| match c {
            ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    Ok(sanitized)
}

pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the kind directory if needed and return its absolute path.
    /// Creation is idempotent and tolerates concurrent "already exists"
    /// races.
    async fn ensure_dir(&self, kind: ScreenshotKind) -> Result<PathBuf, RunnerError> {
        let dir = self.root.join(kind.dir_name());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| RunnerError::Storage(format!("Failed to create {}: {e}", dir.display())))?;

        dir.canonicalize()
            .map_err(|e| RunnerError::Storage(format!("Failed to resolve {}: {e}", dir.display())))
    }

    /// Build the target path for a validated filename and assert it still
    /// resolves under the kind directory.
    fn resolve(dir: &Path, filename: &str) -> Result<(String, PathBuf), RunnerError> {
        let safe = sanitize_filename(filename)?;
        let candidate = dir.join(&safe);

        if !candidate.starts_with(dir) {
            return Err(RunnerError::InvalidFilename(format!(
                "'{filename}' escapes the storage directory"
            )));
        }

        Ok((safe, candidate))
    }
}

#[async_trait]
impl StorageAdapter for FsStorage {
    async fn write(
        &self,
        kind: ScreenshotKind,
        filename: &str,
        bytes: &[u8],
    ) -> Result<(), RunnerError> {
        let dir = self.ensure_dir(kind).await?;
        let (safe, path) = Self::resolve(&dir, filename)?;

        // Atomic write: temp file in the same directory, then rename over
        // the target.
        let tmp = dir.join(format!(".{safe}.{}.tmp", Uuid::new_v4()));

        if let Err(e) = tokio::fs::write(&tmp, bytes).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(RunnerError::Storage(format!(
                "Failed to write {}: {e}",
                tmp.display()
            )));
        }

        match tokio::fs::rename(&tmp, &path).await {
            Ok(()) => Ok(()),
            Err(rename_err) => {
                // Rename unsupported on this filesystem: fall back to a
                // direct overwrite and drop the temp file.
                debug!(
                    "Rename to {} failed ({rename_err}), falling back to direct write",
                    path.display()
                );
                let result = tokio::fs::write(&path, bytes).await;
                let _ = tokio::fs::remove_file(&tmp).await;
                result.map_err(|e| {
                    RunnerError::Storage(format!("Failed to write {}: {e}", path.display()))
                })
            }
        }
    }

    async fn read(&self, kind: ScreenshotKind, filename: &str) -> Result<Vec<u8>, RunnerError> {
        let dir = self.ensure_dir(kind).await?;
        let (_, path) = Self::resolve(&dir, filename)?;

        tokio::fs::read(&path)
            .await
            .map_err(|e| RunnerError::Storage(format!("Failed to read {}: {e}", path.display())))
    }

    async fn readable_path(
        &self,
        kind: ScreenshotKind,
        filename: &str,
    ) -> Result<PathBuf, RunnerError> {
        let dir = self.ensure_dir(kind).await?;
        let (_, path) = Self::resolve(&dir, filename)?;
        Ok(path)
    }

    async fn exists(&self, kind: ScreenshotKind, filename: &str) -> Result<bool, RunnerError> {
        let dir = self.ensure_dir(kind).await?;
        let (_, path) = Self::resolve(&dir, filename)?;

        match tokio::fs::metadata(&path).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(RunnerError::Storage(format!(
                "Failed to stat {}: {e}",
                path.display()
            ))),
        }
    }

    async fn list(&self, kind: ScreenshotKind) -> Result<Vec<String>, RunnerError> {
        let dir = self.ensure_dir(kind).await?;
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| RunnerError::Storage(format!("Failed to list {}: {e}", dir.display())))?;

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| RunnerError::Storage(e.to_string()))?
        {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.ends_with(".png") {
                names.push(name);
            }
        }

        names.sort();
        Ok(names)
    }

    /// Clear the regenerated buckets. Baselines are never touched.
    async fn cleanup(&self) -> Result<(), RunnerError> {
        for kind in [ScreenshotKind::Current, ScreenshotKind::Diff] {
            let dir = self.root.join(kind.dir_name());
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    warn!("Failed to clear {}: {e}", dir.display());
                    return Err(RunnerError::Storage(format!(
                        "Failed to clear {}: {e}",
                        dir.display()
                    )));
                }
            }
        }
        Ok(())
    }
}
