use crate::config::ExpiryCheck;
use crate::error::{GalleryError, Result};
use crate::models::{FileUploadPreSignedUrlResponse, FileUploadUrlRequest, UploadFile, UploadStrategy};
use crate::services::api_client::{GalleryApi, ProgressCallback};
use crate::services::gallery::FileGallery;
use crate::utils::headers::encode_headers;
use chrono::Utc;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UploadPhase {
    #[default]
    Idle,
    Uploading,
}

/// How the most recent submission ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Succeeded { key: String },
    Failed { message: String },
    Cancelled,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadState {
    pub phase: UploadPhase,
    pub strategy: Option<UploadStrategy>,
    pub file_name: Option<String>,
    /// Only meaningful while uploading
    pub progress: u8,
    pub outcome: Option<UploadOutcome>,
}

impl UploadState {
    pub fn is_uploading(&self) -> bool {
        self.phase == UploadPhase::Uploading
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub key: String,
    pub strategy: UploadStrategy,
}

pub type StateObserver = Arc<dyn Fn(&UploadState) + Send + Sync>;

/// Upload state plus the observers notified synchronously on every change
struct StateCell {
    tx: watch::Sender<UploadState>,
    observers: RwLock<Vec<StateObserver>>,
}

impl StateCell {
    fn new() -> Self {
        let (tx, _) = watch::channel(UploadState::default());
        Self {
            tx,
            observers: RwLock::new(Vec::new()),
        }
    }

    fn update(&self, f: impl FnOnce(&mut UploadState)) {
        self.tx.send_modify(f);
        let snapshot = self.tx.borrow().clone();

        // Observers may register further observers, so run them outside the lock
        let observers: Vec<StateObserver> = match self.observers.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        for observer in &observers {
            observer(&snapshot);
        }
    }
}

pub struct UploadOrchestrator {
    api: Arc<dyn GalleryApi>,
    gallery: Arc<FileGallery>,
    expiry_check: ExpiryCheck,
    busy: AtomicBool,
    state: Arc<StateCell>,
}

impl UploadOrchestrator {
    pub fn new(api: Arc<dyn GalleryApi>, gallery: Arc<FileGallery>, expiry_check: ExpiryCheck) -> Self {
        Self {
            api,
            gallery,
            expiry_check,
            busy: AtomicBool::new(false),
            state: Arc::new(StateCell::new()),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<UploadState> {
        self.state.tx.subscribe()
    }

    /// Register a callback that sees every state change, including each progress tick
    pub fn observe(&self, observer: impl Fn(&UploadState) + Send + Sync + 'static) {
        let mut observers = match self.state.observers.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        observers.push(Arc::new(observer));
    }

    pub fn state(&self) -> UploadState {
        self.state.tx.borrow().clone()
    }

    pub fn is_uploading(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub async fn submit(&self, file: UploadFile, strategy: UploadStrategy) -> Result<UploadReceipt> {
        self.submit_with_cancel(file, strategy, CancellationToken::new())
            .await
    }

    /// Run one upload to completion, failure, or cancellation. Errors are returned
    /// unchanged after the state has been reset to idle.
    pub async fn submit_with_cancel(
        &self,
        file: UploadFile,
        strategy: UploadStrategy,
        cancel: CancellationToken,
    ) -> Result<UploadReceipt> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Rejected upload of {}: another upload is in flight", file.name);
            return Err(GalleryError::UploadInProgress);
        }

        let guard = InFlight::enter(self, &file, strategy);
        self.gallery.clear_error();
        info!("🚀 Starting {} upload for {} ({} bytes)", strategy, file.name, file.size());

        let result = match strategy {
            UploadStrategy::Multipart => self.run_multipart(&file, &cancel).await,
            UploadStrategy::Presigned => self.run_presigned(&file, &cancel).await,
        };
        drop(file);

        match result {
            Ok(key) => {
                if let Err(e) = self.gallery.load().await {
                    warn!("Upload of {} succeeded but refreshing the gallery failed: {}", key, e);
                }
                info!("✅ Upload complete: {}", key);
                guard.finish(UploadOutcome::Succeeded { key: key.clone() });
                Ok(UploadReceipt { key, strategy })
            }
            Err(GalleryError::Cancelled) => {
                info!("🛑 Upload cancelled");
                guard.finish(UploadOutcome::Cancelled);
                Err(GalleryError::Cancelled)
            }
            Err(e) => {
                error!("Upload error: {}", e);
                let message = e.user_message(strategy);
                self.gallery.set_error(message.clone());
                guard.finish(UploadOutcome::Failed { message });
                Err(e)
            }
        }
    }

    async fn run_multipart(&self, file: &UploadFile, cancel: &CancellationToken) -> Result<String> {
        let uploaded = cancellable(cancel, self.api.upload_multipart(file)).await?;
        Ok(uploaded.key)
    }

    async fn run_presigned(&self, file: &UploadFile, cancel: &CancellationToken) -> Result<String> {
        let request = FileUploadUrlRequest::for_file(file);
        let presigned = cancellable(cancel, self.api.request_presigned_url(&request)).await?;
        debug!("Got presigned URL for {}", presigned.key);

        self.check_expiry(&presigned)?;

        let encoded = FileUploadPreSignedUrlResponse {
            headers: encode_headers(&presigned.headers),
            ..presigned
        };

        let state = Arc::clone(&self.state);
        let on_progress: ProgressCallback = Arc::new(move |percent| {
            debug!("Upload progress: {}%", percent);
            state.update(|s| {
                if s.is_uploading() {
                    s.progress = s.progress.max(percent.min(100));
                }
            });
        });

        cancellable(
            cancel,
            self.api.put_to_presigned_url(file, &encoded, on_progress),
        )
        .await?;

        Ok(encoded.key)
    }

    fn check_expiry(&self, presigned: &FileUploadPreSignedUrlResponse) -> Result<()> {
        let ExpiryCheck::Enforce { skew } = self.expiry_check else {
            return Ok(());
        };

        let expires_at = presigned.expires_at()?;
        let skew = chrono::Duration::from_std(skew).unwrap_or_else(|_| chrono::Duration::zero());
        if expires_at <= Utc::now() + skew {
            warn!("Presigned URL for {} expired at {}", presigned.key, presigned.expires_at);
            return Err(GalleryError::PresignedUrlExpired {
                expires_at: presigned.expires_at.clone(),
            });
        }
        Ok(())
    }
}

async fn cancellable<T>(
    cancel: &CancellationToken,
    step: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(GalleryError::Cancelled),
        result = step => result,
    }
}

/// Held for the lifetime of one submission. Dropping it, on any path, returns the
/// orchestrator to idle with zero progress and releases the busy flag.
struct InFlight<'a> {
    orchestrator: &'a UploadOrchestrator,
    outcome: Option<UploadOutcome>,
}

impl<'a> InFlight<'a> {
    fn enter(orchestrator: &'a UploadOrchestrator, file: &UploadFile, strategy: UploadStrategy) -> Self {
        orchestrator.state.update(|s| {
            s.phase = UploadPhase::Uploading;
            s.strategy = Some(strategy);
            s.file_name = Some(file.name.clone());
            s.progress = 0;
            s.outcome = None;
        });
        Self {
            orchestrator,
            outcome: None,
        }
    }

    fn finish(mut self, outcome: UploadOutcome) {
        self.outcome = Some(outcome);
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        // A future dropped mid-await never reaches finish()
        let outcome = self.outcome.take().unwrap_or(UploadOutcome::Cancelled);
        self.orchestrator.state.update(|s| {
            s.phase = UploadPhase::Idle;
            s.strategy = None;
            s.file_name = None;
            s.progress = 0;
            s.outcome = Some(outcome);
        });
        self.orchestrator.busy.store(false, Ordering::Release);
    }
}
