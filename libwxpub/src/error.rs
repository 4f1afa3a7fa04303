//! Error types for wxpub

use std::path::PathBuf;

use thiserror::Error;

use crate::platform::codes;

pub type Result<T> = std::result::Result<T, WxPubError>;

#[derive(Error, Debug)]
pub enum WxPubError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Publish failed: {0}")]
    PublishFailed(#[source] Box<WxPubError>),
}

impl WxPubError {
    /// Wrap a cover-resolution or draft-submission failure.
    ///
    /// Already-wrapped errors are passed through so the cause chain stays
    /// one level deep.
    pub fn publish_failed(cause: WxPubError) -> Self {
        match cause {
            WxPubError::PublishFailed(_) => cause,
            other => WxPubError::PublishFailed(Box::new(other)),
        }
    }

    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            WxPubError::InvalidInput(_) => 3,
            WxPubError::Media(MediaError::NotFound(_)) => 3,
            WxPubError::Config(ConfigError::CredentialsMissing) => 2,
            WxPubError::Platform(PlatformError::Authentication(_)) => 2,
            WxPubError::PublishFailed(cause) => cause.exit_code(),
            WxPubError::Platform(_) => 1,
            WxPubError::Media(_) => 1,
            WxPubError::Config(_) => 1,
        }
    }

    /// The platform error code carried by this error, if any.
    pub fn api_code(&self) -> Option<i64> {
        match self {
            WxPubError::Platform(PlatformError::Api(e))
            | WxPubError::Platform(PlatformError::Upload(e)) => Some(e.code),
            WxPubError::PublishFailed(cause) => cause.api_code(),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("WeChat credentials are missing: set wechat.app_id and wechat.app_secret (or WECHAT_APP_ID / WECHAT_APP_SECRET)")]
    CredentialsMissing,
}

/// A non-zero `errcode` reply from the platform.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub code: i64,
    pub message: String,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {}: {})", self.describe(), self.code, self.message)
    }
}

impl ApiError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Human-readable cause from the static code table.
    pub fn describe(&self) -> &'static str {
        codes::describe(self.code)
    }

    /// Whether the code means the access token itself was rejected.
    pub fn is_token_rejection(&self) -> bool {
        codes::is_token_rejection(self.code)
    }
}

#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Unparseable response during {context}: {snippet}")]
    Protocol { context: String, snippet: String },

    #[error("HTTP error {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Upload failed: {0}")]
    Upload(ApiError),

    #[error("API error: {0}")]
    Api(ApiError),
}

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Media file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to read media file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to download media from {url}: {reason}")]
    Download { url: String, reason: String },

    #[error("Image processing failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("Scratch file error: {0}")]
    Scratch(#[source] std::io::Error),

    #[error("Image worker failed: {0}")]
    Worker(String),
}
