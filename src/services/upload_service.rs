use crate::api::error::AppError;
use crate::services::chunk_writer::{BodySource, write_chunk};
use crate::services::completion::{CompletionHandler, CompletionResult};
use crate::services::workspace::TempWorkspace;
use crate::utils::keyed_mutex::PathLocks;
use crate::utils::validation::{parse_disposition_filename, sanitize_filename};
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

/// Where a logical upload stands after a request has been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPhase {
    /// More chunks are expected.
    Receiving,
    /// The last chunk is on disk and the completion handler is running.
    Finalizing,
    /// The completion handler returned and the temp artifact is gone.
    Completed,
    /// A stage failed; the request is answered with an error.
    Failed,
}

/// One chunk request, decoupled from the HTTP layer.
#[derive(Debug)]
pub struct UploadRequest {
    pub chunk_index: u64,
    pub total_chunks: u64,
    pub raw_file_name: String,
    pub content_type: String,
    pub content_disposition: Option<String>,
    pub session_key: Option<String>,
    pub body: BodySource,
}

impl UploadRequest {
    /// A single-shot upload: one chunk, no chunking parameters.
    pub fn single(raw_file_name: impl Into<String>, body: BodySource) -> Self {
        Self {
            chunk_index: 0,
            total_chunks: 0,
            raw_file_name: raw_file_name.into(),
            content_type: mime::APPLICATION_OCTET_STREAM.to_string(),
            content_disposition: None,
            session_key: None,
            body,
        }
    }

    pub fn is_first_chunk(&self) -> bool {
        self.chunk_index == 0
    }

    /// True for the final chunk. With `total_chunks` of 0 or 1 every request
    /// is final.
    pub fn is_last_chunk(&self) -> bool {
        self.chunk_index.saturating_add(1) >= self.total_chunks
    }

    /// Name handed to the completion handler: the `Content-Disposition`
    /// filename when present, otherwise the name as sent by the client.
    pub fn display_name(&self) -> &str {
        self.content_disposition
            .as_deref()
            .and_then(parse_disposition_filename)
            .unwrap_or(&self.raw_file_name)
    }
}

#[derive(Debug)]
pub struct UploadOutcome {
    pub phase: UploadPhase,
    pub bytes_written: u64,
    pub result: CompletionResult,
}

pub struct UploadService {
    workspace: TempWorkspace,
    locks: PathLocks,
    completion: Arc<dyn CompletionHandler>,
}

impl UploadService {
    pub fn new(workspace: TempWorkspace, completion: Arc<dyn CompletionHandler>) -> Self {
        Self {
            workspace,
            locks: PathLocks::new(),
            completion,
        }
    }

    pub fn workspace(&self) -> &TempWorkspace {
        &self.workspace
    }

    pub fn locks(&self) -> &PathLocks {
        &self.locks
    }

    /// Writes one chunk and, when it is the last one, finalizes the upload.
    pub async fn receive(&self, req: UploadRequest) -> Result<UploadOutcome, AppError> {
        if req.total_chunks > 0 && req.chunk_index >= req.total_chunks {
            return Err(AppError::BadRequest(format!(
                "Chunk index {} out of range for {} chunks",
                req.chunk_index, req.total_chunks
            )));
        }

        let dir = self
            .workspace
            .resolve_directory(req.session_key.as_deref())
            .await;
        self.workspace
            .collect_garbage(&dir, self.workspace.lifetime())
            .await?;

        let file_name = sanitize_filename(&req.raw_file_name);
        if file_name.is_empty() {
            tracing::warn!(
                "File name {:?} sanitized to nothing, write will target {:?}",
                req.raw_file_name,
                dir
            );
        }
        let target = dir.join(&file_name);

        let is_first = req.is_first_chunk();
        let is_last = req.is_last_chunk();
        let display_name = req.display_name().to_string();

        // Held through finalization so a retried chunk cannot append to an
        // artifact that is being handed off or deleted.
        let guard = self.locks.lock(&target).await;

        tracing::debug!(
            "Writing chunk {}/{} of {:?} ({} body, {})",
            req.chunk_index + 1,
            req.total_chunks.max(1),
            target,
            req.body.framing(),
            req.content_type
        );
        let bytes_written = match write_chunk(&target, is_first, req.body).await {
            Ok(n) => n,
            Err(e) => {
                tracing::error!(
                    "Upload of {:?} entered {:?} phase: {}",
                    target,
                    UploadPhase::Failed,
                    e
                );
                return Err(e);
            }
        };

        if !is_last {
            return Ok(UploadOutcome {
                phase: UploadPhase::Receiving,
                bytes_written,
                result: CompletionResult::ok(),
            });
        }

        tracing::info!(
            "📦 Last chunk of {:?} received ({:?}), handing off as {:?}",
            target,
            UploadPhase::Finalizing,
            display_name
        );

        // Finalization runs on its own task so a caller that stops waiting
        // (request timeout, client disconnect) cannot skip the deletion.
        let completion = self.completion.clone();
        let finalize = tokio::spawn(async move {
            let callback = completion.on_complete(&target, &display_name).await;

            // The artifact goes away before any callback error reaches the client.
            remove_artifact(&target).await;
            drop(guard);
            (display_name, callback)
        });
        let (display_name, callback) = finalize
            .await
            .map_err(|e| AppError::Internal(format!("Finalization task failed: {}", e)))?;

        match callback {
            Ok(result) => {
                tracing::info!("✅ Upload {:?} completed", display_name);
                Ok(UploadOutcome {
                    phase: UploadPhase::Completed,
                    bytes_written,
                    result: result.unwrap_or_default(),
                })
            }
            Err(e) => {
                tracing::error!("❌ Completion of {:?} failed: {:?}", display_name, e);
                Err(AppError::CallbackFailure(e))
            }
        }
    }
}

async fn remove_artifact(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove temp artifact {:?}: {}", path, e),
    }
}
