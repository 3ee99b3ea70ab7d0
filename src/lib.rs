pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

pub use error::{GalleryError, Result};

use crate::config::ClientConfig;
use crate::services::api_client::{GalleryApi, HttpGalleryApi};
use crate::services::gallery::FileGallery;
use crate::services::upload_service::UploadOrchestrator;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub api: Arc<dyn GalleryApi>,
    pub gallery: Arc<FileGallery>,
    pub uploads: Arc<UploadOrchestrator>,
    pub config: ClientConfig,
}

/// Wire the gallery and orchestrator to the HTTP backend named in `config`
pub fn create_app(config: ClientConfig) -> Result<AppState> {
    let api: Arc<dyn GalleryApi> = Arc::new(HttpGalleryApi::new(&config)?);
    Ok(create_app_with_api(config, api))
}

pub fn create_app_with_api(config: ClientConfig, api: Arc<dyn GalleryApi>) -> AppState {
    let gallery = Arc::new(FileGallery::new(api.clone(), config.api_base_url.clone()));
    let uploads = Arc::new(UploadOrchestrator::new(
        api.clone(),
        gallery.clone(),
        config.expiry_check,
    ));

    AppState {
        api,
        gallery,
        uploads,
        config,
    }
}
