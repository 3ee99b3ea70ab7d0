use crate::models::UploadStrategy;
use std::env;
use std::time::Duration;

/// Client-side validation of a presigned URL's `expiresAt` before the storage PUT
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExpiryCheck {
    /// Leave expiry entirely to the storage service
    #[default]
    Disabled,
    /// Reject URLs expiring within `skew` of now
    Enforce { skew: Duration },
}

/// Gallery client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend API root (default: "http://localhost:8080/api/v1")
    pub api_base_url: String,

    /// Whole-request timeout in seconds, 0 disables (default: 30)
    pub request_timeout_secs: u64,

    /// TCP connect timeout in seconds (default: 10)
    pub connect_timeout_secs: u64,

    /// Bytes handed to the transport per progress tick (default: 64 KB)
    pub progress_chunk_size: usize,

    /// Presigned URL expiry validation (default: disabled)
    pub expiry_check: ExpiryCheck,

    /// Strategy used when the caller does not pick one (default: multipart)
    pub default_strategy: UploadStrategy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8080/api/v1".to_string(),
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
            progress_chunk_size: 64 * 1024, // 64 KB
            expiry_check: ExpiryCheck::Disabled,
            default_strategy: UploadStrategy::Multipart,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        let validate_expiry = env::var("GALLERY_VALIDATE_EXPIRY")
            .map(|v| v.to_lowercase() == "true" || v == "1")
            .unwrap_or(false);

        let expiry_check = if validate_expiry {
            let skew = env::var("GALLERY_EXPIRY_SKEW_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5);
            ExpiryCheck::Enforce {
                skew: Duration::from_secs(skew),
            }
        } else {
            default.expiry_check
        };

        Self {
            api_base_url: env::var("GALLERY_API_BASE_URL").unwrap_or(default.api_base_url),

            request_timeout_secs: env::var("GALLERY_REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.request_timeout_secs),

            connect_timeout_secs: env::var("GALLERY_CONNECT_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.connect_timeout_secs),

            progress_chunk_size: env::var("GALLERY_PROGRESS_CHUNK_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|v: &usize| *v > 0)
                .unwrap_or(default.progress_chunk_size),

            expiry_check,

            default_strategy: env::var("GALLERY_UPLOAD_STRATEGY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.default_strategy),
        }
    }

    /// Local backend on port 8080 with expiry validation on
    pub fn development() -> Self {
        Self {
            api_base_url: "http://localhost:8080/api/v1".to_string(),
            request_timeout_secs: 0,
            connect_timeout_secs: 5,
            progress_chunk_size: 16 * 1024,
            expiry_check: ExpiryCheck::Enforce {
                skew: Duration::from_secs(5),
            },
            default_strategy: UploadStrategy::Multipart,
        }
    }

    /// Same settings pointed at another backend
    pub fn with_base_url(mut self, api_base_url: impl Into<String>) -> Self {
        self.api_base_url = api_base_url.into();
        self
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        match self.request_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}
