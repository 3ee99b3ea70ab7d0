use crate::models::UploadStrategy;
use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Server error ({status}): {message}")]
    Server { status: StatusCode, message: String },

    #[error("Storage rejected transfer ({status}): {message}")]
    Storage { status: StatusCode, message: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Presigned URL expired at {expires_at}")]
    PresignedUrlExpired { expires_at: String },

    #[error("Another upload is already in progress")]
    UploadInProgress,

    #[error("Upload cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GalleryError {
    /// Generic text for the presentation layer; details stay in the logs
    pub fn user_message(&self, strategy: UploadStrategy) -> String {
        match self {
            GalleryError::UploadInProgress => {
                "An upload is already running. Please wait for it to finish.".to_string()
            }
            GalleryError::Cancelled => "Upload cancelled.".to_string(),
            GalleryError::PresignedUrlExpired { .. } => {
                "The upload link expired. Please try again.".to_string()
            }
            _ => match strategy {
                UploadStrategy::Multipart => "Failed to upload file. Please try again.".to_string(),
                UploadStrategy::Presigned => {
                    "Failed to upload file to storage. Please try again.".to_string()
                }
            },
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            GalleryError::Server { status, .. } | GalleryError::Storage { status, .. } => {
                Some(*status)
            }
            GalleryError::Network(e) => e.status(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, GalleryError>;
