use crate::config::ClientConfig;
use crate::error::{GalleryError, Result};
use crate::infrastructure::http::{parse_base_url, setup_http_client};
use crate::models::{
    DEFAULT_CONTENT_TYPE, FileItem, FileUploadPreSignedUrlResponse, FileUploadUrlRequest,
    UploadFile, UploadResponse,
};
use crate::utils::headers::header_value_bytes;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use reqwest::header::{CONTENT_LENGTH, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Response, multipart};
use serde::de::DeserializeOwned;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use url::Url;

/// Receives upload percentages (0-100) as bytes are handed to the transport
pub type ProgressCallback = Arc<dyn Fn(u8) + Send + Sync>;

/// Backend operations the gallery depends on
#[async_trait]
pub trait GalleryApi: Send + Sync {
    async fn list_files(&self) -> Result<Vec<FileItem>>;

    async fn upload_multipart(&self, file: &UploadFile) -> Result<UploadResponse>;

    async fn request_presigned_url(
        &self,
        request: &FileUploadUrlRequest,
    ) -> Result<FileUploadPreSignedUrlResponse>;

    /// Transfer the file straight to object storage. `presigned.headers` must already be
    /// header-encoded; they are attached as-is.
    async fn put_to_presigned_url(
        &self,
        file: &UploadFile,
        presigned: &FileUploadPreSignedUrlResponse,
        on_progress: ProgressCallback,
    ) -> Result<()>;
}

pub struct HttpGalleryApi {
    client: reqwest::Client,
    base_url: Url,
    chunk_size: usize,
}

impl HttpGalleryApi {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = setup_http_client(config)?;
        Self::with_client(client, config)
    }

    pub fn with_client(client: reqwest::Client, config: &ClientConfig) -> Result<Self> {
        Ok(Self {
            client,
            base_url: parse_base_url(&config.api_base_url)?,
            chunk_size: config.progress_chunk_size.max(1),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| GalleryError::InvalidRequest(format!("Invalid endpoint {}: {}", path, e)))
    }
}

#[async_trait]
impl GalleryApi for HttpGalleryApi {
    async fn list_files(&self) -> Result<Vec<FileItem>> {
        let url = self.endpoint("files")?;
        debug!("GET {}", url);

        let response = self.client.get(url).send().await?;
        let files: Vec<FileItem> = decode_json(ensure_success(response).await?).await?;

        info!("📂 Listed {} files", files.len());
        Ok(files)
    }

    async fn upload_multipart(&self, file: &UploadFile) -> Result<UploadResponse> {
        let url = self.endpoint("files/upload")?;
        let content_type = if file.content_type.is_empty() {
            DEFAULT_CONTENT_TYPE
        } else {
            file.content_type.as_str()
        };

        let part = multipart::Part::stream_with_length(
            reqwest::Body::from(file.data.clone()),
            file.size(),
        )
        .file_name(file.name.clone())
        .mime_str(content_type)
        .map_err(|e| {
            GalleryError::InvalidRequest(format!("Invalid content type '{}': {}", content_type, e))
        })?;

        let form = multipart::Form::new().part("file", part);

        info!("📤 Multipart upload: {} ({} bytes)", file.name, file.size());
        let response = self.client.post(url).multipart(form).send().await?;
        let uploaded: UploadResponse = decode_json(ensure_success(response).await?).await?;

        info!("✅ Multipart upload stored as {}", uploaded.key);
        Ok(uploaded)
    }

    async fn request_presigned_url(
        &self,
        request: &FileUploadUrlRequest,
    ) -> Result<FileUploadPreSignedUrlResponse> {
        if request.filename.trim().is_empty() {
            return Err(GalleryError::InvalidRequest(
                "filename must not be empty".to_string(),
            ));
        }

        let url = self.endpoint("files/upload/urls")?;
        debug!(
            "POST {} for {} ({} bytes, {})",
            url, request.filename, request.size_bytes, request.content_type
        );

        let response = self.client.post(url).json(request).send().await?;
        let presigned: FileUploadPreSignedUrlResponse =
            decode_json(ensure_success(response).await?).await?;

        info!(
            "🔑 Presigned {} for {} (expires {})",
            presigned.method, presigned.key, presigned.expires_at
        );
        Ok(presigned)
    }

    async fn put_to_presigned_url(
        &self,
        file: &UploadFile,
        presigned: &FileUploadPreSignedUrlResponse,
        on_progress: ProgressCallback,
    ) -> Result<()> {
        let method = Method::from_bytes(presigned.method.trim().to_uppercase().as_bytes())
            .map_err(|_| {
                GalleryError::InvalidResponse(format!("Invalid method: {}", presigned.method))
            })?;
        let url = Url::parse(&presigned.url).map_err(|e| {
            GalleryError::InvalidResponse(format!("Invalid presigned URL: {}", e))
        })?;

        let mut headers = presigned_header_map(presigned)?;
        if !headers.contains_key(CONTENT_LENGTH) {
            headers.insert(CONTENT_LENGTH, HeaderValue::from(file.size()));
        }

        let progress = Arc::new(ProgressTracker::new(file.size(), on_progress));
        let body = progress_body(file.data.clone(), self.chunk_size, Arc::clone(&progress));

        info!("☁️  {} {} bytes to storage for {}", method, file.size(), presigned.key);
        let response = self
            .client
            .request(method, url)
            .headers(headers)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = error_message(response).await;
            warn!("Storage rejected {} with {}: {}", presigned.key, status, message);
            return Err(GalleryError::Storage { status, message });
        }

        progress.finish();
        info!("✅ Storage transfer complete for {}", presigned.key);
        Ok(())
    }
}

fn presigned_header_map(presigned: &FileUploadPreSignedUrlResponse) -> Result<HeaderMap> {
    let mut headers = HeaderMap::with_capacity(presigned.headers.len() + 1);

    for (name, value) in &presigned.headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| GalleryError::InvalidHeader(format!("Invalid header name: {}", name)))?;
        let bytes = header_value_bytes(value).ok_or_else(|| {
            GalleryError::InvalidHeader(format!("Header {} is not Latin-1 encoded", name))
        })?;
        let header_value = HeaderValue::from_bytes(&bytes)
            .map_err(|_| GalleryError::InvalidHeader(format!("Invalid value for header {}", name)))?;
        headers.insert(header_name, header_value);
    }

    Ok(headers)
}

/// Percent-complete bookkeeping for one transfer. Emitted values never decrease.
struct ProgressTracker {
    total: u64,
    // (bytes sent, last percent emitted)
    sent: Mutex<(u64, Option<u8>)>,
    callback: ProgressCallback,
}

impl ProgressTracker {
    fn new(total: u64, callback: ProgressCallback) -> Self {
        Self {
            total,
            sent: Mutex::new((0, None)),
            callback,
        }
    }

    fn advance(&self, bytes: usize) {
        let percent = {
            let mut sent = match self.sent.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            sent.0 = (sent.0 + bytes as u64).min(self.total);
            let current = percent_of(sent.0, self.total);
            let percent = sent.1.map_or(current, |last| last.max(current));
            sent.1 = Some(percent);
            percent
        };
        (self.callback)(percent);
    }

    fn finish(&self) {
        let emit = {
            let mut sent = match self.sent.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let emit = sent.1 != Some(100);
            sent.1 = Some(100);
            emit
        };
        if emit {
            (self.callback)(100);
        }
    }
}

fn percent_of(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let sent = sent.min(total) as u128;
    let total = total as u128;
    ((sent * 100 + total / 2) / total) as u8
}

fn progress_body(data: Bytes, chunk_size: usize, progress: Arc<ProgressTracker>) -> reqwest::Body {
    let chunks: Vec<Bytes> = (0..data.len())
        .step_by(chunk_size)
        .map(|start| data.slice(start..(start + chunk_size).min(data.len())))
        .collect();

    let stream = stream::iter(chunks).map(move |chunk| {
        progress.advance(chunk.len());
        Ok::<Bytes, std::io::Error>(chunk)
    });

    reqwest::Body::wrap_stream(stream)
}

async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = error_message(response).await;
    warn!("Backend returned {}: {}", status, message);
    Err(GalleryError::Server { status, message })
}

async fn decode_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let body = response.bytes().await?;
    serde_json::from_slice(&body)
        .map_err(|e| GalleryError::InvalidResponse(format!("Unexpected response body: {}", e)))
}

/// Prefer the backend's `{"error": "..."}` body, fall back to the raw text
async fn error_message(response: Response) -> String {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) {
        if let Some(message) = value
            .get("error")
            .or_else(|| value.get("message"))
            .and_then(|v| v.as_str())
        {
            return message.to_string();
        }
    }

    let trimmed = text.trim();
    if trimmed.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("Unknown error")
            .to_string()
    } else {
        trimmed.chars().take(512).collect()
    }
}
