//! wxpub - a publishing resilience layer for WeChat Official Accounts
//!
//! This library keeps article publishing working despite the platform's
//! moving parts: it caches and refreshes access tokens with a fallback
//! endpoint, routes media through the right upload endpoint with size
//! fitting, creates drafts with a guaranteed cover, and repairs text that
//! arrives with escape-sequence or entity corruption.

pub mod config;
pub mod encoding;
pub mod error;
pub mod logging;
pub mod platform;
pub mod service;
pub mod thumbnail;
pub mod types;

// Re-export commonly used types
pub use config::{Config, Credentials};
pub use error::{Result, WxPubError};
pub use service::WeChatService;
pub use types::{
    MaterialKind, MediaKind, MediaLocation, MediaReference, MediaRole, NewsMaterialArticle,
    PublishOutcome, PublishRequest, UploadedMedia, VideoDescription,
};
