#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::FutureExt;

use biffcross_lib::error::{AppError, AppResult};
use biffcross_lib::loader::{ConfigFetcher, ConfigLoader, FetchResponse, LoaderSettings};
use biffcross_lib::model::PortfolioConfig;
use biffcross_lib::session::ConfigSession;
use biffcross_lib::storage::{
    DeleteBatchOutcome, DeleteFailure, ProgressHandler, StorageBridge, StorageError,
    StorageResult, UploadResult,
};

/// Scripted read-side transport. Responses are consumed in order; the last
/// one repeats once the script runs out. Requested URLs are recorded.
pub struct FakeFetcher {
    script: Mutex<VecDeque<AppResult<FetchResponse>>>,
    last: Mutex<Option<AppResult<FetchResponse>>>,
    pub urls: Mutex<Vec<String>>,
}

impl FakeFetcher {
    pub fn new(script: Vec<AppResult<FetchResponse>>) -> Self {
        FakeFetcher {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            urls: Mutex::new(Vec::new()),
        }
    }

    pub fn always_body(body: impl Into<String>) -> Self {
        Self::new(vec![Ok(FetchResponse {
            status: 200,
            body: body.into(),
        })])
    }

    pub fn always_status(status: u16) -> Self {
        Self::new(vec![Ok(FetchResponse {
            status,
            body: String::new(),
        })])
    }

    pub fn requests(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

impl ConfigFetcher for FakeFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, AppResult<FetchResponse>> {
        self.urls.lock().unwrap().push(url.to_string());
        let next = {
            let mut script = self.script.lock().unwrap();
            match script.pop_front() {
                Some(response) => {
                    *self.last.lock().unwrap() = Some(clone_result(&response));
                    response
                }
                None => self
                    .last
                    .lock()
                    .unwrap()
                    .as_ref()
                    .map(clone_result)
                    .unwrap_or_else(|| Err(AppError::new("TEST/EMPTY", "no scripted response"))),
            }
        };
        async move { next }.boxed()
    }
}

fn clone_result(result: &AppResult<FetchResponse>) -> AppResult<FetchResponse> {
    match result {
        Ok(response) => Ok(FetchResponse {
            status: response.status,
            body: response.body.clone(),
        }),
        Err(err) => Err(err.clone()),
    }
}

/// A fetcher that serves whatever document a [`MemoryBridge`] currently
/// holds, so loader and bridge see the same "remote".
pub struct BridgeFetcher {
    pub bridge: Arc<MemoryBridge>,
}

impl ConfigFetcher for BridgeFetcher {
    fn fetch<'a>(&'a self, _url: &'a str) -> BoxFuture<'a, AppResult<FetchResponse>> {
        let body = self.bridge.remote_document();
        async move {
            match body {
                Some(body) => Ok(FetchResponse { status: 200, body }),
                None => Ok(FetchResponse {
                    status: 404,
                    body: String::new(),
                }),
            }
        }
        .boxed()
    }
}

/// In-memory stand-in for the privileged shell + bucket. Holds the stored
/// configuration bytes and the set of image blob keys, with switchable
/// failure injection.
#[derive(Default)]
pub struct MemoryBridge {
    document: Mutex<Option<String>>,
    blobs: Mutex<HashSet<String>>,
    failing_delete_keys: Mutex<HashSet<String>>,
    fail_uploads: AtomicBool,
}

impl MemoryBridge {
    pub fn new() -> Arc<Self> {
        Arc::new(MemoryBridge::default())
    }

    pub fn remote_document(&self) -> Option<String> {
        self.document.lock().unwrap().clone()
    }

    pub fn remote_config(&self) -> Option<PortfolioConfig> {
        self.remote_document()
            .map(|body| serde_json::from_str(&body).expect("remote document parses"))
    }

    pub fn seed_blob(&self, key: &str) {
        self.blobs.lock().unwrap().insert(key.to_string());
    }

    pub fn has_blob(&self, key: &str) -> bool {
        self.blobs.lock().unwrap().contains(key)
    }

    pub fn fail_delete_of(&self, key: &str) {
        self.failing_delete_keys
            .lock()
            .unwrap()
            .insert(key.to_string());
    }

    pub fn fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }
}

impl StorageBridge for MemoryBridge {
    fn upload_file<'a>(
        &'a self,
        _path: &'a Path,
        key: &'a str,
        _content_type: &'a str,
    ) -> BoxFuture<'a, StorageResult<UploadResult>> {
        async move {
            if self.fail_uploads.load(Ordering::SeqCst) {
                return Err(StorageError::Upload {
                    key: key.to_string(),
                    message: "injected failure".into(),
                });
            }
            self.blobs.lock().unwrap().insert(key.to_string());
            Ok(UploadResult {
                url: format!("https://bucket.test/{key}"),
                size: 0,
            })
        }
        .boxed()
    }

    fn upload_file_with_progress<'a>(
        &'a self,
        path: &'a Path,
        key: &'a str,
        content_type: &'a str,
        _on_progress: ProgressHandler,
    ) -> BoxFuture<'a, StorageResult<UploadResult>> {
        self.upload_file(path, key, content_type)
    }

    fn upload_configuration<'a>(
        &'a self,
        config: &'a PortfolioConfig,
    ) -> BoxFuture<'a, StorageResult<()>> {
        async move {
            if self.fail_uploads.load(Ordering::SeqCst) {
                return Err(StorageError::Upload {
                    key: "portfolio-config.json".into(),
                    message: "injected failure".into(),
                });
            }
            let body = config.to_pretty_json().map_err(|err| StorageError::Upload {
                key: "portfolio-config.json".into(),
                message: err.to_string(),
            })?;
            *self.document.lock().unwrap() = Some(body);
            Ok(())
        }
        .boxed()
    }

    fn download_configuration(&self) -> BoxFuture<'_, StorageResult<PortfolioConfig>> {
        async move {
            let body = self
                .remote_document()
                .ok_or_else(|| StorageError::NotFound("portfolio-config.json".into()))?;
            serde_json::from_str(&body).map_err(|err| StorageError::Download {
                key: "portfolio-config.json".into(),
                message: err.to_string(),
            })
        }
        .boxed()
    }

    fn delete_file<'a>(&'a self, key: &'a str) -> BoxFuture<'a, StorageResult<()>> {
        async move {
            if self.failing_delete_keys.lock().unwrap().contains(key) {
                return Err(StorageError::Delete {
                    key: key.to_string(),
                    message: "injected failure".into(),
                });
            }
            self.blobs.lock().unwrap().remove(key);
            Ok(())
        }
        .boxed()
    }

    fn delete_files<'a>(
        &'a self,
        keys: &'a [String],
    ) -> BoxFuture<'a, StorageResult<DeleteBatchOutcome>> {
        async move {
            let mut outcome = DeleteBatchOutcome::default();
            for key in keys {
                match self.delete_file(key).await {
                    Ok(()) => outcome.succeeded.push(key.clone()),
                    Err(err) => outcome.failed.push(DeleteFailure {
                        key: key.clone(),
                        error: err.to_string(),
                    }),
                }
            }
            Ok(outcome)
        }
        .boxed()
    }

    fn test_connection(&self) -> BoxFuture<'_, StorageResult<bool>> {
        async move { Ok(true) }.boxed()
    }
}

pub fn settings() -> LoaderSettings {
    LoaderSettings {
        base_delay: std::time::Duration::from_millis(1),
        ..LoaderSettings::new("https://bucket.test")
    }
}

/// A session whose loader reads from and whose bridge writes to the same
/// in-memory remote.
pub fn session_over(bridge: Arc<MemoryBridge>) -> ConfigSession {
    let fetcher = Arc::new(BridgeFetcher {
        bridge: bridge.clone(),
    });
    let loader = ConfigLoader::new(settings(), fetcher);
    ConfigSession::new(loader, bridge)
}

/// Load a session against an empty remote: it adopts the default document
/// (dirty) which the first save will persist.
pub async fn loaded_session(bridge: Arc<MemoryBridge>) -> ConfigSession {
    let mut session = session_over(bridge);
    session.load().await.expect("load default session");
    session
}
