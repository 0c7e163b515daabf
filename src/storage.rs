use std::path::Path;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

use crate::error::AppError;
use crate::model::PortfolioConfig;

/// Errors crossing the privileged-process boundary.
#[derive(Debug, Clone, Error)]
pub enum StorageError {
    /// The requested remote object does not exist. Callers must be able to
    /// distinguish this from transport failures.
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("upload failed for {key}: {message}")]
    Upload { key: String, message: String },
    #[error("download failed for {key}: {message}")]
    Download { key: String, message: String },
    #[error("delete failed for {key}: {message}")]
    Delete { key: String, message: String },
    #[error("storage connection failed: {0}")]
    Connection(String),
}

impl From<StorageError> for AppError {
    fn from(error: StorageError) -> Self {
        let code = match &error {
            StorageError::NotFound(_) => "STORAGE/NOT_FOUND",
            StorageError::Upload { .. } => "STORAGE/UPLOAD",
            StorageError::Download { .. } => "STORAGE/DOWNLOAD",
            StorageError::Delete { .. } => "STORAGE/DELETE",
            StorageError::Connection(_) => "STORAGE/CONNECTION",
        };
        AppError::new(code, error.to_string())
    }
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../bindings/")]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub url: String,
    #[ts(type = "number")]
    pub size: u64,
}

/// Progress event for a single in-flight upload, keyed by storage key.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../bindings/")]
#[serde(rename_all = "camelCase")]
pub struct UploadProgress {
    pub key: String,
    #[ts(type = "number")]
    pub transferred: u64,
    #[ts(type = "number")]
    pub total: u64,
}

pub type ProgressHandler = Arc<dyn Fn(UploadProgress) + Send + Sync + 'static>;

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../bindings/")]
#[serde(rename_all = "camelCase")]
pub struct DeleteFailure {
    pub key: String,
    pub error: String,
}

/// Per-key outcome of a batch delete. Any non-empty `failed` set must be
/// treated as a whole-operation failure by callers.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../bindings/")]
#[serde(rename_all = "camelCase")]
pub struct DeleteBatchOutcome {
    pub succeeded: Vec<String>,
    pub failed: Vec<DeleteFailure>,
}

impl DeleteBatchOutcome {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// The privileged shell operations the configuration core depends on.
///
/// The Electron/Tauri side owns credentials and byte transfer; this core only
/// sees these signatures. Implementations must report a missing remote
/// configuration as [`StorageError::NotFound`], never as a generic failure.
pub trait StorageBridge: Send + Sync {
    fn upload_file<'a>(
        &'a self,
        path: &'a Path,
        key: &'a str,
        content_type: &'a str,
    ) -> BoxFuture<'a, StorageResult<UploadResult>>;

    fn upload_file_with_progress<'a>(
        &'a self,
        path: &'a Path,
        key: &'a str,
        content_type: &'a str,
        on_progress: ProgressHandler,
    ) -> BoxFuture<'a, StorageResult<UploadResult>>;

    /// Overwrite the remote configuration document in full.
    fn upload_configuration<'a>(
        &'a self,
        config: &'a PortfolioConfig,
    ) -> BoxFuture<'a, StorageResult<()>>;

    fn download_configuration(&self) -> BoxFuture<'_, StorageResult<PortfolioConfig>>;

    fn delete_file<'a>(&'a self, key: &'a str) -> BoxFuture<'a, StorageResult<()>>;

    fn delete_files<'a>(
        &'a self,
        keys: &'a [String],
    ) -> BoxFuture<'a, StorageResult<DeleteBatchOutcome>>;

    fn test_connection(&self) -> BoxFuture<'_, StorageResult<bool>>;
}

/// Replace any character outside `[a-zA-Z0-9.-]` before use as a storage key.
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Storage key for an uploaded image blob.
pub fn image_object_key(filename: &str) -> String {
    format!("images/{}", sanitize_filename(filename))
}
