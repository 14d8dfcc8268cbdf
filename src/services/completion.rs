use crate::services::file_store::FileRecordStore;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// JSON body returned to the uploader.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionResult {
    pub success: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CompletionResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            extra: Map::new(),
        }
    }

    /// Adds a field next to `success`. A `success` key sets the flag instead,
    /// so the serialized object never carries it twice.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        if key == "success" {
            if let Some(flag) = value.as_bool() {
                self.success = flag;
            }
            return self;
        }
        self.extra.insert(key.to_string(), value);
        self
    }
}

impl Default for CompletionResult {
    fn default() -> Self {
        Self::ok()
    }
}

/// Invoked once per upload after its last chunk has been written.
///
/// `temp_path` is deleted as soon as this returns, whether it succeeded or
/// not, so implementations must move or copy the bytes they want to keep.
/// Returning `None` answers the client with `{"success": true}`.
#[async_trait]
pub trait CompletionHandler: Send + Sync {
    async fn on_complete(
        &self,
        temp_path: &Path,
        original_name: &str,
    ) -> anyhow::Result<Option<CompletionResult>>;
}

/// Adapts an async closure into a [`CompletionHandler`].
pub struct FnCompletion<F>(pub F);

#[async_trait]
impl<F, Fut> CompletionHandler for FnCompletion<F>
where
    F: Fn(PathBuf, String) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Option<CompletionResult>>> + Send,
{
    async fn on_complete(
        &self,
        temp_path: &Path,
        original_name: &str,
    ) -> anyhow::Result<Option<CompletionResult>> {
        (self.0)(temp_path.to_path_buf(), original_name.to_string()).await
    }
}

/// Moves finished uploads into the record store and hands back links to
/// download or delete them.
pub struct StoreCompletion {
    store: Arc<dyn FileRecordStore>,
    base_download_url: String,
    base_delete_url: String,
}

impl StoreCompletion {
    pub fn new(
        store: Arc<dyn FileRecordStore>,
        base_download_url: impl Into<String>,
        base_delete_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            base_download_url: base_download_url.into(),
            base_delete_url: base_delete_url.into(),
        }
    }
}

fn join_url(base: &str, id: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), id)
}

#[async_trait]
impl CompletionHandler for StoreCompletion {
    async fn on_complete(
        &self,
        temp_path: &Path,
        original_name: &str,
    ) -> anyhow::Result<Option<CompletionResult>> {
        let record = self.store.persist(temp_path, original_name).await?;

        Ok(Some(
            CompletionResult::ok()
                .with("id", record.id.clone())
                .with("name", record.name)
                .with("size", record.size)
                .with("downloadUrl", join_url(&self.base_download_url, &record.id))
                .with("deleteUrl", join_url(&self.base_delete_url, &record.id)),
        ))
    }
}
