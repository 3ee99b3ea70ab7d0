use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{GalleryError, Result};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "svg"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "ogg", "mov"];

/// Fallback when neither magic bytes nor the extension identify the file
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileItem {
    pub key: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
}

/// How a gallery entry is previewed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Image,
    Video,
    Other,
}

impl FileItem {
    /// Lower-cased text after the last dot of the key, empty when there is none
    pub fn extension(&self) -> String {
        match self.key.rsplit_once('.') {
            Some((_, ext)) => ext.to_lowercase(),
            None => String::new(),
        }
    }

    pub fn kind(&self) -> FileKind {
        let ext = self.extension();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            FileKind::Image
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            FileKind::Video
        } else {
            FileKind::Other
        }
    }

    /// Keys look like `<id>-<originalName>`; strip the id segment
    pub fn display_name(&self) -> &str {
        match self.key.split_once('-') {
            Some((_, rest)) if !rest.is_empty() => rest,
            _ => &self.key,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum UploadStrategy {
    #[default]
    Multipart,
    Presigned,
}

impl UploadStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStrategy::Multipart => "multipart",
            UploadStrategy::Presigned => "presigned",
        }
    }
}

impl fmt::Display for UploadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UploadStrategy {
    type Err = GalleryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "multipart" => Ok(UploadStrategy::Multipart),
            "presigned" => Ok(UploadStrategy::Presigned),
            other => Err(GalleryError::InvalidRequest(format!(
                "Unknown upload strategy: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileUploadUrlRequest {
    pub filename: String,
    pub content_type: String,
    pub size_bytes: u64,
}

impl FileUploadUrlRequest {
    pub fn for_file(file: &UploadFile) -> Self {
        Self {
            filename: file.name.clone(),
            content_type: file.content_type.clone(),
            size_bytes: file.size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileUploadPreSignedUrlResponse {
    pub key: String,
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    pub expires_at: String,
}

impl FileUploadPreSignedUrlResponse {
    pub fn expires_at(&self) -> Result<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.expires_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                GalleryError::InvalidResponse(format!(
                    "Invalid expiresAt '{}': {}",
                    self.expires_at, e
                ))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub key: String,
}

/// Bytes selected by the user, scoped to a single submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub name: String,
    pub content_type: String,
    pub data: Bytes,
}

impl UploadFile {
    pub fn new(
        name: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            data: data.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                GalleryError::InvalidRequest(format!("Invalid file name: {}", path.display()))
            })?
            .to_string();

        let data = tokio::fs::read(path).await?;
        let content_type = detect_content_type(&name, &data);

        Ok(Self::new(name, content_type, data))
    }
}

/// Magic bytes first, then the extension, then octet-stream
pub fn detect_content_type(name: &str, data: &[u8]) -> String {
    if let Some(kind) = infer::get(data) {
        return kind.mime_type().to_string();
    }

    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();

    let guessed = match ext.as_str() {
        "txt" => Some(mime::TEXT_PLAIN.essence_str().to_string()),
        "csv" => Some(mime::TEXT_CSV.essence_str().to_string()),
        "json" => Some(mime::APPLICATION_JSON.essence_str().to_string()),
        "svg" => Some(mime::IMAGE_SVG.essence_str().to_string()),
        "html" | "htm" => Some(mime::TEXT_HTML.essence_str().to_string()),
        "mov" => Some("video/quicktime".to_string()),
        _ => None,
    };

    guessed.unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string())
}
