use crate::config::ClientConfig;
use crate::error::{GalleryError, Result};
use std::time::Duration;
use tracing::info;
use url::Url;

pub fn setup_http_client(config: &ClientConfig) -> Result<reqwest::Client> {
    info!("🌐 Backend API: {}", config.api_base_url);

    let mut builder = reqwest::Client::builder()
        .use_rustls_tls()
        .user_agent(concat!("file-gallery-client/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs));

    if let Some(timeout) = config.request_timeout() {
        builder = builder.timeout(timeout);
    }

    Ok(builder.build()?)
}

/// Parse the base URL so that relative joins append to its path
pub fn parse_base_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw)
        .map_err(|e| GalleryError::InvalidRequest(format!("Invalid API base URL '{}': {}", raw, e)))?;

    if url.cannot_be_a_base() {
        return Err(GalleryError::InvalidRequest(format!(
            "API base URL cannot be a base: {}",
            raw
        )));
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}
