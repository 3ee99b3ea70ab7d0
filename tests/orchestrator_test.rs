use async_trait::async_trait;
use file_gallery_client::config::{ClientConfig, ExpiryCheck};
use file_gallery_client::models::{
    FileItem, FileUploadPreSignedUrlResponse, FileUploadUrlRequest, UploadFile, UploadResponse,
    UploadStrategy,
};
use file_gallery_client::services::api_client::{GalleryApi, ProgressCallback};
use file_gallery_client::services::upload_service::{UploadOutcome, UploadPhase, UploadState};
use file_gallery_client::utils::headers::decode_header_value;
use file_gallery_client::{AppState, GalleryError, create_app_with_api};
use reqwest::StatusCode;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct MockGalleryApi {
    files: Mutex<Vec<FileItem>>,
    calls: Mutex<Vec<&'static str>>,
    fail_list: bool,
    fail_multipart: bool,
    fail_presign: bool,
    fail_put: bool,
    /// Percentages reported by the fake storage transfer
    progress_steps: Vec<u8>,
    presigned_headers: HashMap<String, String>,
    expires_at: Option<String>,
    seen_requests: Mutex<Vec<FileUploadUrlRequest>>,
    seen_put_headers: Mutex<Option<HashMap<String, String>>>,
    /// When set, the storage transfer signals `entered` and waits for `release`
    gate: Option<(Arc<Notify>, Arc<Notify>)>,
}

impl MockGalleryApi {
    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| **c == call).count()
    }
}

fn server_error() -> GalleryError {
    GalleryError::Server {
        status: StatusCode::BAD_REQUEST,
        message: "File type not permitted".to_string(),
    }
}

#[async_trait]
impl GalleryApi for MockGalleryApi {
    async fn list_files(&self) -> file_gallery_client::Result<Vec<FileItem>> {
        self.record("list_files");
        if self.fail_list {
            return Err(GalleryError::Server {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "boom".to_string(),
            });
        }
        Ok(self.files.lock().unwrap().clone())
    }

    async fn upload_multipart(&self, file: &UploadFile) -> file_gallery_client::Result<UploadResponse> {
        self.record("upload_multipart");
        if self.fail_multipart {
            return Err(server_error());
        }
        let key = format!("0001-{}", file.name);
        self.files.lock().unwrap().push(FileItem {
            key: key.clone(),
            url: format!("http://cdn.local/{}", key),
            thumbnail_url: None,
        });
        Ok(UploadResponse { key })
    }

    async fn request_presigned_url(
        &self,
        request: &FileUploadUrlRequest,
    ) -> file_gallery_client::Result<FileUploadPreSignedUrlResponse> {
        self.record("request_presigned_url");
        self.seen_requests.lock().unwrap().push(request.clone());
        if self.fail_presign {
            return Err(server_error());
        }
        Ok(FileUploadPreSignedUrlResponse {
            key: format!("0002-{}", request.filename),
            method: "PUT".to_string(),
            url: "http://storage.local/bucket/0002".to_string(),
            headers: self.presigned_headers.clone(),
            expires_at: self
                .expires_at
                .clone()
                .unwrap_or_else(|| "2999-01-01T00:00:00Z".to_string()),
        })
    }

    async fn put_to_presigned_url(
        &self,
        _file: &UploadFile,
        presigned: &FileUploadPreSignedUrlResponse,
        on_progress: ProgressCallback,
    ) -> file_gallery_client::Result<()> {
        self.record("put_to_presigned_url");
        *self.seen_put_headers.lock().unwrap() = Some(presigned.headers.clone());

        if let Some((entered, release)) = &self.gate {
            entered.notify_one();
            release.notified().await;
        }

        for step in &self.progress_steps {
            on_progress(*step);
        }

        if self.fail_put {
            return Err(GalleryError::Storage {
                status: StatusCode::FORBIDDEN,
                message: "Request has expired".to_string(),
            });
        }
        on_progress(100);
        Ok(())
    }
}

fn setup(api: MockGalleryApi) -> (Arc<MockGalleryApi>, AppState) {
    setup_with_config(api, ClientConfig::default())
}

fn setup_with_config(api: MockGalleryApi, config: ClientConfig) -> (Arc<MockGalleryApi>, AppState) {
    let api = Arc::new(api);
    let app = create_app_with_api(config, api.clone());
    (api, app)
}

fn png() -> UploadFile {
    UploadFile::new("a.png", "image/png", vec![7u8; 1024])
}

fn record_states(app: &AppState) -> Arc<Mutex<Vec<UploadState>>> {
    let states = Arc::new(Mutex::new(Vec::new()));
    let sink = states.clone();
    app.uploads
        .observe(move |state| sink.lock().unwrap().push(state.clone()));
    states
}

fn assert_idle(app: &AppState) {
    let state = app.uploads.state();
    assert_eq!(state.phase, UploadPhase::Idle);
    assert_eq!(state.progress, 0);
    assert_eq!(state.file_name, None);
    assert!(!app.uploads.is_uploading());
}

#[tokio::test]
async fn test_empty_listing_shows_empty_state() {
    let (api, app) = setup(MockGalleryApi::default());

    let files = app.gallery.load().await.unwrap();

    assert!(files.is_empty());
    assert!(app.gallery.is_empty());
    assert_eq!(app.gallery.view().error, None);
    assert_eq!(api.count("list_files"), 1);
}

#[tokio::test]
async fn test_failed_listing_records_error_and_empties_collection() {
    let (_api, app) = setup(MockGalleryApi {
        fail_list: true,
        ..Default::default()
    });

    assert!(app.gallery.load().await.is_err());

    let view = app.gallery.view();
    assert!(view.files.is_empty());
    assert!(!view.loading);
    assert!(view.error.unwrap().starts_with("Failed to load files"));
}

#[tokio::test]
async fn test_multipart_upload_refreshes_once() {
    let (api, app) = setup(MockGalleryApi::default());

    let receipt = app.uploads.submit(png(), UploadStrategy::Multipart).await.unwrap();

    assert_eq!(receipt.key, "0001-a.png");
    assert_eq!(receipt.strategy, UploadStrategy::Multipart);
    assert_eq!(api.calls(), vec!["upload_multipart", "list_files"]);
    assert_eq!(app.gallery.files().len(), 1);
    assert_eq!(app.gallery.view().error, None);

    assert_idle(&app);
    assert_eq!(
        app.uploads.state().outcome,
        Some(UploadOutcome::Succeeded {
            key: "0001-a.png".to_string()
        })
    );
}

#[tokio::test]
async fn test_multipart_failure_skips_refresh() {
    let (api, app) = setup(MockGalleryApi {
        fail_multipart: true,
        ..Default::default()
    });

    let err = app
        .uploads
        .submit(png(), UploadStrategy::Multipart)
        .await
        .unwrap_err();

    assert!(matches!(err, GalleryError::Server { .. }));
    assert_eq!(api.count("list_files"), 0);
    assert_idle(&app);
    assert_eq!(
        app.gallery.view().error.as_deref(),
        Some("Failed to upload file. Please try again.")
    );
    assert!(matches!(
        app.uploads.state().outcome,
        Some(UploadOutcome::Failed { .. })
    ));
}

#[tokio::test]
async fn test_presigned_upload_runs_handshake_in_order() {
    let (api, app) = setup(MockGalleryApi {
        progress_steps: vec![10, 35, 35, 80],
        ..Default::default()
    });
    let states = record_states(&app);

    let receipt = app.uploads.submit(png(), UploadStrategy::Presigned).await.unwrap();

    assert_eq!(receipt.key, "0002-a.png");
    assert_eq!(
        api.calls(),
        vec!["request_presigned_url", "put_to_presigned_url", "list_files"]
    );

    let request = api.seen_requests.lock().unwrap()[0].clone();
    assert_eq!(request.filename, "a.png");
    assert_eq!(request.content_type, "image/png");
    assert_eq!(request.size_bytes, 1024);

    let progress: Vec<u8> = states
        .lock()
        .unwrap()
        .iter()
        .filter(|s| s.is_uploading())
        .map(|s| s.progress)
        .collect();
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(*progress.last().unwrap(), 100);

    assert_idle(&app);
}

#[tokio::test]
async fn test_progress_never_moves_backwards() {
    let (_api, app) = setup(MockGalleryApi {
        progress_steps: vec![50, 20, 60],
        ..Default::default()
    });
    let states = record_states(&app);

    app.uploads.submit(png(), UploadStrategy::Presigned).await.unwrap();

    let progress: Vec<u8> = states
        .lock()
        .unwrap()
        .iter()
        .filter(|s| s.is_uploading())
        .map(|s| s.progress)
        .collect();
    assert_eq!(progress, vec![0, 50, 50, 60, 100]);
}

#[tokio::test]
async fn test_presign_failure_stops_before_transfer() {
    let (api, app) = setup(MockGalleryApi {
        fail_presign: true,
        ..Default::default()
    });

    let err = app
        .uploads
        .submit(png(), UploadStrategy::Presigned)
        .await
        .unwrap_err();

    assert!(matches!(err, GalleryError::Server { .. }));
    assert_eq!(api.count("put_to_presigned_url"), 0);
    assert_eq!(api.count("list_files"), 0);
    assert_idle(&app);
}

#[tokio::test]
async fn test_storage_rejection_propagates_and_resets() {
    let (api, app) = setup(MockGalleryApi {
        fail_put: true,
        progress_steps: vec![40],
        ..Default::default()
    });

    let err = app
        .uploads
        .submit(png(), UploadStrategy::Presigned)
        .await
        .unwrap_err();

    assert!(matches!(err, GalleryError::Storage { status, .. } if status == StatusCode::FORBIDDEN));
    assert_eq!(api.count("list_files"), 0);
    assert_idle(&app);
    assert_eq!(
        app.gallery.view().error.as_deref(),
        Some("Failed to upload file to storage. Please try again.")
    );
}

#[tokio::test]
async fn test_presigned_headers_are_encoded_before_transfer() {
    let headers = HashMap::from([
        ("Content-Type".to_string(), "image/png".to_string()),
        ("x-amz-meta-original-name".to_string(), "café".to_string()),
    ]);
    let (api, app) = setup(MockGalleryApi {
        presigned_headers: headers,
        ..Default::default()
    });

    app.uploads.submit(png(), UploadStrategy::Presigned).await.unwrap();

    let sent = api.seen_put_headers.lock().unwrap().clone().unwrap();
    assert_eq!(sent["Content-Type"], "image/png");
    let encoded = &sent["x-amz-meta-original-name"];
    assert_ne!(encoded, "café");
    assert!(encoded.chars().all(|c| (c as u32) <= 0xFF));
    assert_eq!(decode_header_value(encoded).as_deref(), Some("café"));
}

#[tokio::test]
async fn test_refresh_failure_does_not_fail_upload() {
    let (api, app) = setup(MockGalleryApi {
        fail_list: true,
        ..Default::default()
    });

    let receipt = app.uploads.submit(png(), UploadStrategy::Multipart).await;

    assert!(receipt.is_ok());
    assert_eq!(api.count("list_files"), 1);
    assert!(app.gallery.view().error.is_some());
    assert_idle(&app);
}

#[tokio::test]
async fn test_second_submission_is_rejected_while_uploading() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let (api, app) = setup(MockGalleryApi {
        gate: Some((entered.clone(), release.clone())),
        ..Default::default()
    });

    let uploads = app.uploads.clone();
    let first = tokio::spawn(async move { uploads.submit(png(), UploadStrategy::Presigned).await });

    entered.notified().await;
    assert!(app.uploads.is_uploading());
    assert_eq!(app.uploads.state().file_name.as_deref(), Some("a.png"));

    let second = app.uploads.submit(png(), UploadStrategy::Multipart).await;
    assert!(matches!(second, Err(GalleryError::UploadInProgress)));
    assert!(app.uploads.is_uploading());

    release.notify_one();
    assert!(first.await.unwrap().is_ok());
    assert_eq!(api.count("upload_multipart"), 0);
    assert_idle(&app);
}

#[tokio::test]
async fn test_cancellation_mid_transfer() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let (api, app) = setup(MockGalleryApi {
        gate: Some((entered.clone(), release)),
        ..Default::default()
    });

    let cancel = CancellationToken::new();
    let uploads = app.uploads.clone();
    let token = cancel.clone();
    let handle = tokio::spawn(async move {
        uploads
            .submit_with_cancel(png(), UploadStrategy::Presigned, token)
            .await
    });

    entered.notified().await;
    cancel.cancel();

    let result = handle.await.unwrap();
    assert!(matches!(result, Err(GalleryError::Cancelled)));
    assert_eq!(api.count("list_files"), 0);
    assert_idle(&app);
    assert_eq!(app.uploads.state().outcome, Some(UploadOutcome::Cancelled));
    assert_eq!(app.gallery.view().error, None);
}

#[tokio::test]
async fn test_cancelled_token_prevents_any_call() {
    let (api, app) = setup(MockGalleryApi::default());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = app
        .uploads
        .submit_with_cancel(png(), UploadStrategy::Multipart, cancel)
        .await;

    assert!(matches!(result, Err(GalleryError::Cancelled)));
    assert!(api.calls().is_empty());
    assert_idle(&app);
}

#[tokio::test]
async fn test_dropped_submission_still_resets_state() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let (_api, app) = setup(MockGalleryApi {
        gate: Some((entered, release)),
        ..Default::default()
    });

    let result = tokio::time::timeout(
        Duration::from_millis(50),
        app.uploads.submit(png(), UploadStrategy::Presigned),
    )
    .await;

    assert!(result.is_err());
    assert_idle(&app);
    assert_eq!(app.uploads.state().outcome, Some(UploadOutcome::Cancelled));
}

#[tokio::test]
async fn test_expired_presigned_url_is_rejected_when_enforced() {
    let config = ClientConfig {
        expiry_check: ExpiryCheck::Enforce {
            skew: Duration::from_secs(5),
        },
        ..ClientConfig::default()
    };
    let (api, app) = setup_with_config(
        MockGalleryApi {
            expires_at: Some("2000-01-01T00:00:00Z".to_string()),
            ..Default::default()
        },
        config,
    );

    let err = app
        .uploads
        .submit(png(), UploadStrategy::Presigned)
        .await
        .unwrap_err();

    assert!(matches!(err, GalleryError::PresignedUrlExpired { .. }));
    assert_eq!(api.count("put_to_presigned_url"), 0);
    assert_idle(&app);
}

#[tokio::test]
async fn test_expiry_is_ignored_by_default() {
    let (api, app) = setup(MockGalleryApi {
        expires_at: Some("2000-01-01T00:00:00Z".to_string()),
        ..Default::default()
    });

    app.uploads.submit(png(), UploadStrategy::Presigned).await.unwrap();
    assert_eq!(api.count("put_to_presigned_url"), 1);
}

#[tokio::test]
async fn test_resubmission_after_failure() {
    let (api, app) = setup(MockGalleryApi {
        fail_put: true,
        ..Default::default()
    });

    assert!(app.uploads.submit(png(), UploadStrategy::Presigned).await.is_err());
    assert!(app.uploads.submit(png(), UploadStrategy::Multipart).await.is_ok());

    assert_eq!(api.count("list_files"), 1);
    assert_eq!(app.gallery.view().error, None);
    assert_idle(&app);
}

#[tokio::test]
async fn test_observer_can_register_another_observer() {
    let (_api, app) = setup(MockGalleryApi::default());

    let late_states = Arc::new(Mutex::new(Vec::new()));
    let registered = Arc::new(AtomicBool::new(false));
    let uploads = Arc::downgrade(&app.uploads);
    let sink = late_states.clone();
    app.uploads.observe(move |_| {
        if registered.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(uploads) = uploads.upgrade() {
            let sink = sink.clone();
            uploads.observe(move |state| sink.lock().unwrap().push(state.phase));
        }
    });

    app.uploads.submit(png(), UploadStrategy::Multipart).await.unwrap();

    let late_states = late_states.lock().unwrap().clone();
    assert!(!late_states.is_empty());
    assert_eq!(*late_states.last().unwrap(), UploadPhase::Idle);
    assert_idle(&app);
}
