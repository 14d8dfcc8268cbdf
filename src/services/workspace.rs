use crate::api::error::AppError;
use crate::config::UploadConfig;
use crate::utils::validation::sanitize_filename;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Owns the temporary directory tree where partial uploads accumulate.
#[derive(Debug, Clone)]
pub struct TempWorkspace {
    base_dir: PathBuf,
    vary_by_session: bool,
    tmp_suffix: String,
    lifetime: Duration,
    scan_limit: usize,
}

/// Outcome of a full sweep over the base directory and its session directories.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub directories_scanned: usize,
    pub garbage_removed: usize,
    pub sessions_removed: usize,
}

impl TempWorkspace {
    pub fn new(
        base_dir: impl Into<PathBuf>,
        vary_by_session: bool,
        tmp_suffix: impl Into<String>,
        lifetime: Duration,
        scan_limit: usize,
    ) -> Self {
        Self {
            base_dir: base_dir.into(),
            vary_by_session,
            tmp_suffix: tmp_suffix.into(),
            lifetime,
            scan_limit,
        }
    }

    pub fn from_config(config: &UploadConfig) -> Self {
        Self::new(
            config.tmp_dir.clone(),
            config.vary_by_session,
            config.tmp_suffix.clone(),
            config.tmp_file_lifetime(),
            config.gc_scan_limit,
        )
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    pub fn tmp_suffix(&self) -> &str {
        &self.tmp_suffix
    }

    /// Computes the directory for an upload and creates it if missing.
    ///
    /// A failed creation is only logged; the subsequent garbage collection or
    /// chunk write reports it to the client.
    pub async fn resolve_directory(&self, session_key: Option<&str>) -> PathBuf {
        let dir = self.directory_for(session_key);
        if let Err(e) = tokio::fs::create_dir_all(&dir).await {
            tracing::warn!("Failed to create temporary directory {:?}: {}", dir, e);
        }
        dir
    }

    fn directory_for(&self, session_key: Option<&str>) -> PathBuf {
        if !self.vary_by_session {
            return self.base_dir.clone();
        }
        match session_key.map(sanitize_filename) {
            // A key reduced to dots would point at the base dir or its parent.
            Some(segment) if !segment.trim_matches('.').trim().is_empty() => {
                self.base_dir.join(segment)
            }
            _ => self.base_dir.clone(),
        }
    }

    fn is_candidate(&self, name: &str) -> bool {
        name.ends_with(&self.tmp_suffix)
    }

    /// Deletes every suffixed entry of `dir` whose modification time is older
    /// than `max_age`. Directories are removed recursively. At most
    /// `scan_limit` suffixed entries are inspected per run; the rest wait for
    /// the next one. Returns the number of entries removed.
    pub async fn collect_garbage(&self, dir: &Path, max_age: Duration) -> Result<usize, AppError> {
        let unavailable = |source| AppError::DirectoryUnavailable {
            path: dir.to_path_buf(),
            source,
        };

        let mut entries = tokio::fs::read_dir(dir).await.map_err(unavailable)?;
        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let mut scanned = 0usize;
        let mut removed = 0usize;
        while let Some(entry) = entries.next_entry().await.map_err(unavailable)? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !self.is_candidate(name) {
                continue;
            }

            // Only suffixed entries count toward the bound.
            scanned += 1;
            if scanned > self.scan_limit {
                tracing::warn!(
                    "Garbage collection in {:?} stopped after {} candidates",
                    dir,
                    self.scan_limit
                );
                break;
            }

            // Entries may vanish between listing and inspection.
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            let Ok(modified) = metadata.modified() else {
                continue;
            };
            if modified >= cutoff {
                continue;
            }

            let path = entry.path();
            let result = if metadata.is_dir() {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            };
            match result {
                Ok(()) => {
                    tracing::debug!("Removed stale temp entry {:?}", path);
                    removed += 1;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Failed to remove stale temp entry {:?}: {}", path, e),
            }
        }

        if removed > 0 {
            tracing::info!("🧹 Removed {} stale temp entries from {:?}", removed, dir);
        }
        Ok(removed)
    }

    /// Collects garbage in the base directory and every session directory,
    /// then removes session directories left empty for longer than the
    /// lifetime. A missing base directory means there is nothing to sweep.
    pub async fn sweep(&self) -> Result<SweepReport, AppError> {
        let mut report = SweepReport::default();

        match tokio::fs::metadata(&self.base_dir).await {
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(report),
            _ => {}
        }

        report.garbage_removed += self.collect_garbage(&self.base_dir, self.lifetime).await?;
        report.directories_scanned += 1;

        let mut entries = tokio::fs::read_dir(&self.base_dir)
            .await
            .map_err(|source| AppError::DirectoryUnavailable {
                path: self.base_dir.clone(),
                source,
            })?;

        let cutoff = SystemTime::now()
            .checked_sub(self.lifetime)
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let mut visited = 0usize;
        while let Ok(Some(entry)) = entries.next_entry().await {
            visited += 1;
            if visited > self.scan_limit {
                break;
            }
            let Ok(file_type) = entry.file_type().await else {
                continue;
            };
            let name = entry.file_name();
            if !file_type.is_dir() || name.to_str().is_some_and(|n| self.is_candidate(n)) {
                continue;
            }

            let session_dir = entry.path();
            match self.collect_garbage(&session_dir, self.lifetime).await {
                Ok(n) => {
                    report.garbage_removed += n;
                    report.directories_scanned += 1;
                }
                Err(e) => {
                    tracing::warn!("Skipping session directory {:?}: {}", session_dir, e);
                    continue;
                }
            }

            if is_empty_dir(&session_dir).await
                && modified_before(&session_dir, cutoff).await
                && tokio::fs::remove_dir(&session_dir).await.is_ok()
            {
                tracing::debug!("Removed idle session directory {:?}", session_dir);
                report.sessions_removed += 1;
            }
        }

        Ok(report)
    }
}

async fn is_empty_dir(dir: &Path) -> bool {
    match tokio::fs::read_dir(dir).await {
        Ok(mut entries) => matches!(entries.next_entry().await, Ok(None)),
        Err(_) => false,
    }
}

async fn modified_before(path: &Path, cutoff: SystemTime) -> bool {
    tokio::fs::metadata(path)
        .await
        .and_then(|m| m.modified())
        .is_ok_and(|modified| modified < cutoff)
}
