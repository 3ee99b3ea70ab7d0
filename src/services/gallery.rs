use crate::error::Result;
use crate::models::FileItem;
use crate::services::api_client::GalleryApi;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};

/// What the presentation layer renders
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GalleryView {
    pub files: Vec<FileItem>,
    pub loading: bool,
    pub error: Option<String>,
}

impl GalleryView {
    pub fn is_empty(&self) -> bool {
        !self.loading && self.files.is_empty()
    }
}

/// The file collection shown to the user, always the latest completed listing
pub struct FileGallery {
    api: Arc<dyn GalleryApi>,
    view: watch::Sender<GalleryView>,
    backend_label: String,
}

impl FileGallery {
    pub fn new(api: Arc<dyn GalleryApi>, backend_label: impl Into<String>) -> Self {
        let (view, _) = watch::channel(GalleryView::default());
        Self {
            api,
            view,
            backend_label: backend_label.into(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<GalleryView> {
        self.view.subscribe()
    }

    pub fn view(&self) -> GalleryView {
        self.view.borrow().clone()
    }

    pub fn files(&self) -> Vec<FileItem> {
        self.view.borrow().files.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.view.borrow().is_empty()
    }

    /// Replace the collection with a fresh listing. On failure the collection is
    /// emptied and the error recorded for display, then returned.
    pub async fn load(&self) -> Result<Vec<FileItem>> {
        self.view.send_modify(|view| {
            view.loading = true;
            view.error = None;
        });

        match self.api.list_files().await {
            Ok(files) => {
                info!("🖼️  Gallery loaded with {} files", files.len());
                self.view.send_modify(|view| {
                    view.files = files.clone();
                    view.loading = false;
                });
                Ok(files)
            }
            Err(e) => {
                error!("Failed to fetch files: {}", e);
                let message = format!(
                    "Failed to load files. Make sure the backend is running on {}",
                    self.backend_label
                );
                self.view.send_modify(|view| {
                    view.files.clear();
                    view.loading = false;
                    view.error = Some(message);
                });
                Err(e)
            }
        }
    }

    pub fn set_error(&self, message: impl Into<String>) {
        let message = message.into();
        self.view.send_modify(|view| view.error = Some(message));
    }

    pub fn clear_error(&self) {
        self.view.send_if_modified(|view| view.error.take().is_some());
    }
}
