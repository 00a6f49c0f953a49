//! File uploads and downloads

use std::path::{Path, PathBuf};

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::api::{FileInfo, FileUploadResponse, OpenWebUiClient};
use crate::error::{ChatDroidError, StoreResult};
use crate::file_utils::{
    format_file_size, is_file_size_valid, mime_type_for_path, DEFAULT_MAX_UPLOAD_MB,
};

/// Progress of a single upload
#[derive(Debug, Clone, PartialEq)]
pub enum UploadProgress {
    Starting,
    /// Percent complete
    Uploading(u8),
    Success(FileUploadResponse),
    Error(String),
}

impl UploadProgress {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success(_) | Self::Error(_))
    }
}

#[derive(Debug, Clone)]
pub struct FileRepository {
    client: OpenWebUiClient,
    max_upload_mb: u64,
}

impl FileRepository {
    pub fn new(client: OpenWebUiClient) -> Self {
        Self {
            client,
            max_upload_mb: DEFAULT_MAX_UPLOAD_MB,
        }
    }

    pub fn with_max_upload_mb(mut self, max_upload_mb: u64) -> Self {
        self.max_upload_mb = max_upload_mb;
        self
    }

    /// Upload a file, reporting progress on the returned stream
    ///
    /// The stream ends after `Success` or `Error`. Missing files and files
    /// over the size limit fail before any network traffic.
    pub fn upload(&self, path: impl Into<PathBuf>) -> ReceiverStream<UploadProgress> {
        let (tx, rx) = mpsc::channel(4);
        let repo = self.clone();
        let path = path.into();

        tokio::spawn(async move {
            if tx.send(UploadProgress::Starting).await.is_err() {
                return;
            }
            let outcome = match repo.check_upload(&path).await {
                Ok(()) => {
                    if tx.send(UploadProgress::Uploading(0)).await.is_err() {
                        return;
                    }
                    repo.client
                        .upload_file(&path, mime_type_for_path(&path))
                        .await
                }
                Err(e) => Err(e),
            };

            let last = match outcome {
                Ok(response) => {
                    tracing::info!("Uploaded {} as {}", path.display(), response.id);
                    UploadProgress::Success(response)
                }
                Err(e) => {
                    tracing::warn!("Upload of {} failed: {}", path.display(), e);
                    UploadProgress::Error(e.to_string())
                }
            };
            let _ = tx.send(last).await;
        });

        ReceiverStream::new(rx)
    }

    async fn check_upload(&self, path: &Path) -> StoreResult<()> {
        let metadata = tokio::fs::metadata(path).await.map_err(|e| {
            ChatDroidError::File(format!("Cannot read {}: {}", path.display(), e))
        })?;
        if !metadata.is_file() {
            return Err(ChatDroidError::File(format!(
                "{} is not a regular file",
                path.display()
            )));
        }
        if !is_file_size_valid(metadata.len(), self.max_upload_mb) {
            return Err(ChatDroidError::File(format!(
                "File size {} exceeds the {} MB limit",
                format_file_size(metadata.len()),
                self.max_upload_mb
            )));
        }
        Ok(())
    }

    pub async fn list(&self) -> StoreResult<Vec<FileInfo>> {
        self.client.list_files().await
    }

    pub async fn get(&self, file_id: &str) -> StoreResult<FileInfo> {
        self.client.get_file(file_id).await
    }

    pub async fn delete(&self, file_id: &str) -> StoreResult<()> {
        self.client.delete_file(file_id).await
    }

    /// Save a file's content to `dest`, returning the bytes written
    pub async fn download(&self, file_id: &str, dest: &Path) -> StoreResult<u64> {
        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        self.client.download_file(file_id, dest).await
    }
}
