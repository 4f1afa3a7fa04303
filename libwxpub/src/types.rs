//! Core types for wxpub

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, WxPubError};

// ============================================================================
// Media Types
// ============================================================================

/// Media MIME types the platform accepts for uploads
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MediaMimeType {
    Jpeg,
    Png,
    Gif,
    Bmp,
    WebP,
    Amr,
    Mp3,
    Wma,
    Wav,
    Mp4,
}

impl MediaMimeType {
    /// Parse MIME type from a MIME string (e.g., "image/jpeg"), ignoring parameters
    pub fn from_mime_str(s: &str) -> Option<Self> {
        let essence = s.split(';').next().unwrap_or(s).trim().to_lowercase();
        match essence.as_str() {
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/gif" => Some(Self::Gif),
            "image/bmp" => Some(Self::Bmp),
            "image/webp" => Some(Self::WebP),
            "audio/amr" => Some(Self::Amr),
            "audio/mpeg" | "audio/mp3" => Some(Self::Mp3),
            "audio/x-ms-wma" => Some(Self::Wma),
            "audio/wav" | "audio/x-wav" => Some(Self::Wav),
            "video/mp4" => Some(Self::Mp4),
            _ => None,
        }
    }

    /// Detect MIME type from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "gif" => Some(Self::Gif),
            "bmp" => Some(Self::Bmp),
            "webp" => Some(Self::WebP),
            "amr" => Some(Self::Amr),
            "mp3" => Some(Self::Mp3),
            "wma" => Some(Self::Wma),
            "wav" => Some(Self::Wav),
            "mp4" => Some(Self::Mp4),
            _ => None,
        }
    }

    /// Detect MIME type from a filename's extension
    pub fn from_filename(filename: &str) -> Option<Self> {
        Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Gif => "image/gif",
            Self::Bmp => "image/bmp",
            Self::WebP => "image/webp",
            Self::Amr => "audio/amr",
            Self::Mp3 => "audio/mpeg",
            Self::Wma => "audio/x-ms-wma",
            Self::Wav => "audio/wav",
            Self::Mp4 => "video/mp4",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Bmp => "bmp",
            Self::WebP => "webp",
            Self::Amr => "amr",
            Self::Mp3 => "mp3",
            Self::Wma => "wma",
            Self::Wav => "wav",
            Self::Mp4 => "mp4",
        }
    }
}

impl std::fmt::Display for MediaMimeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Content type for an upload filename, `application/octet-stream` when unknown
pub fn content_type_for(filename: &str) -> &'static str {
    MediaMimeType::from_filename(filename)
        .map(|m| m.as_str())
        .unwrap_or("application/octet-stream")
}

/// Kind of media being uploaded
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Voice,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Voice => "voice",
            Self::Video => "video",
        }
    }

    /// Upload ceiling in bytes for non-thumbnail uploads
    pub fn max_bytes(&self) -> usize {
        match self {
            Self::Image => 10 * 1024 * 1024,
            Self::Voice => 2 * 1024 * 1024,
            Self::Video => 10 * 1024 * 1024,
        }
    }
}

impl std::str::FromStr for MediaKind {
    type Err = WxPubError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "image" => Ok(Self::Image),
            "voice" => Ok(Self::Voice),
            "video" => Ok(Self::Video),
            other => Err(WxPubError::InvalidInput(format!(
                "Unknown media kind '{}'. Valid kinds: image, voice, video",
                other
            ))),
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an upload is for; decides the endpoint and the shape of the result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaRole {
    /// Image embedded in an article body; answered with a URL
    ContentImage,
    PermanentMaterial,
    TemporaryMaterial,
    /// Article cover; always permanent, always size-fitted
    Thumbnail,
}

/// Upload ceiling for content images
pub const CONTENT_IMAGE_MAX_BYTES: usize = 1024 * 1024;

/// Where media bytes come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaLocation {
    Local(PathBuf),
    Remote(String),
}

impl MediaLocation {
    /// Classify a caller-supplied path or URL
    pub fn parse(path_or_url: &str) -> Self {
        let trimmed = path_or_url.trim();
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            Self::Remote(trimmed.to_string())
        } else {
            Self::Local(PathBuf::from(shellexpand::tilde(trimmed).to_string()))
        }
    }

    /// Like [`parse`](Self::parse), resolving relative local paths against `base`
    pub fn parse_relative(path_or_url: &str, base: Option<&Path>) -> Self {
        match (Self::parse(path_or_url), base) {
            (Self::Local(path), Some(base)) if path.is_relative() => Self::Local(base.join(path)),
            (location, _) => location,
        }
    }
}

impl std::fmt::Display for MediaLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::Remote(url) => f.write_str(url),
        }
    }
}

/// Title and introduction required for permanent video material
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VideoDescription {
    pub title: String,
    pub introduction: String,
}

/// A request to upload one piece of media
#[derive(Debug, Clone)]
pub struct MediaReference {
    pub location: MediaLocation,
    pub role: MediaRole,
    pub kind: MediaKind,
    pub description: Option<VideoDescription>,
}

impl MediaReference {
    pub fn new(location: MediaLocation, role: MediaRole, kind: MediaKind) -> Self {
        Self {
            location,
            role,
            kind,
            description: None,
        }
    }

    pub fn thumbnail(location: MediaLocation) -> Self {
        Self::new(location, MediaRole::Thumbnail, MediaKind::Image)
    }

    pub fn content_image(location: MediaLocation) -> Self {
        Self::new(location, MediaRole::ContentImage, MediaKind::Image)
    }

    pub fn with_description(mut self, description: VideoDescription) -> Self {
        self.description = Some(description);
        self
    }

    /// `type` query value sent to the upload endpoint
    pub fn platform_type(&self) -> &'static str {
        match self.role {
            MediaRole::Thumbnail => "thumb",
            _ => self.kind.as_str(),
        }
    }

    /// Byte ceiling checked before upload; thumbnails are fitted instead
    pub fn max_bytes(&self) -> Option<usize> {
        match self.role {
            MediaRole::Thumbnail => None,
            MediaRole::ContentImage => Some(CONTENT_IMAGE_MAX_BYTES),
            MediaRole::PermanentMaterial | MediaRole::TemporaryMaterial => Some(self.kind.max_bytes()),
        }
    }
}

/// Result of a successful upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadedMedia {
    MediaId(String),
    Url(String),
}

impl UploadedMedia {
    pub fn as_str(&self) -> &str {
        match self {
            Self::MediaId(id) | Self::Url(id) => id,
        }
    }

    pub fn into_string(self) -> String {
        match self {
            Self::MediaId(id) | Self::Url(id) => id,
        }
    }
}

// ============================================================================
// Article Types
// ============================================================================

/// An article ready for `draft/add`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleDraft {
    pub title: String,
    pub body_html: String,
    pub author: String,
    pub cover_media_id: String,
    pub allow_comments: bool,
    pub fans_only_comments: bool,
}

/// Caller input to the draft orchestrator
#[derive(Debug, Clone, Default)]
pub struct PublishRequest {
    pub title: String,
    pub body_html: String,
    pub cover: Option<String>,
    pub author: Option<String>,
    pub allow_comments: bool,
    pub fans_only_comments: bool,
    /// Directory relative image paths in the body are resolved against
    pub base_dir: Option<PathBuf>,
}

impl PublishRequest {
    pub fn new(title: impl Into<String>, body_html: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body_html: body_html.into(),
            ..Self::default()
        }
    }

    pub fn cover(mut self, cover: impl Into<String>) -> Self {
        self.cover = Some(cover.into());
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn comments(mut self, allow: bool, fans_only: bool) -> Self {
        self.allow_comments = allow;
        self.fans_only_comments = fans_only;
        self
    }

    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }
}

/// Identifiers returned by a successful publish
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishOutcome {
    pub draft_id: String,
    pub cover_media_id: String,
}

/// One article inside a draft or a news material, as the platform returns it
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewsArticle {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub digest: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub content_source_url: String,
    #[serde(default)]
    pub thumb_media_id: String,
    #[serde(default)]
    pub url: String,
}

impl NewsArticle {
    /// Repair text fields read back from the platform; returns whether any changed
    pub fn repair_text(&mut self) -> bool {
        let title = crate::encoding::repair_in_place(&mut self.title);
        let digest = crate::encoding::repair_in_place(&mut self.digest);
        let content = crate::encoding::repair_in_place(&mut self.content);
        title || digest || content
    }
}

/// One article of a permanent news material being created.
///
/// Flags are `0`/`1` as the platform expects them; `only_fans_can_comment`
/// only takes effect together with `need_open_comment`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewsMaterialArticle {
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub digest: String,
    pub content: String,
    #[serde(default)]
    pub content_source_url: String,
    pub thumb_media_id: String,
    #[serde(default = "default_show_cover_pic")]
    pub show_cover_pic: u8,
    #[serde(default)]
    pub need_open_comment: u8,
    #[serde(default)]
    pub only_fans_can_comment: u8,
}

fn default_show_cover_pic() -> u8 {
    1
}

impl NewsMaterialArticle {
    pub fn new(
        title: impl Into<String>,
        content: impl Into<String>,
        thumb_media_id: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            thumb_media_id: thumb_media_id.into(),
            show_cover_pic: default_show_cover_pic(),
            ..Self::default()
        }
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn digest(mut self, digest: impl Into<String>) -> Self {
        self.digest = digest.into();
        self
    }

    pub fn comments(mut self, enabled: bool, fans_only: bool) -> Self {
        self.need_open_comment = u8::from(enabled);
        self.only_fans_can_comment = u8::from(enabled && fans_only);
        self
    }

    /// Repair corrupted text before submission
    pub fn repaired(mut self) -> Self {
        crate::encoding::repair_in_place(&mut self.title);
        crate::encoding::repair_in_place(&mut self.digest);
        crate::encoding::repair_in_place(&mut self.content);
        self
    }
}

/// `content` object wrapping the articles of a draft or news material
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewsContent {
    #[serde(default)]
    pub news_item: Vec<NewsArticle>,
}

/// Material classes accepted by the listing endpoint
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MaterialKind {
    Image,
    Voice,
    Video,
    News,
}

impl MaterialKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Voice => "voice",
            Self::Video => "video",
            Self::News => "news",
        }
    }
}

impl std::str::FromStr for MaterialKind {
    type Err = WxPubError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "image" => Ok(Self::Image),
            "voice" => Ok(Self::Voice),
            "video" => Ok(Self::Video),
            "news" => Ok(Self::News),
            other => Err(WxPubError::InvalidInput(format!(
                "Unknown material kind '{}'. Valid kinds: image, voice, video, news",
                other
            ))),
        }
    }
}

impl std::fmt::Display for MaterialKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_from_extension_and_mime_str() {
        assert_eq!(MediaMimeType::from_extension("JPG"), Some(MediaMimeType::Jpeg));
        assert_eq!(MediaMimeType::from_extension("mp4"), Some(MediaMimeType::Mp4));
        assert_eq!(MediaMimeType::from_extension("exe"), None);
        assert_eq!(
            MediaMimeType::from_mime_str("image/png; charset=binary"),
            Some(MediaMimeType::Png)
        );
        assert_eq!(MediaMimeType::from_mime_str("text/html"), None);
    }

    #[test]
    fn test_content_type_for_filename() {
        assert_eq!(content_type_for("cover.jpeg"), "image/jpeg");
        assert_eq!(content_type_for("talk.amr"), "audio/amr");
        assert_eq!(content_type_for("README"), "application/octet-stream");
    }

    #[test]
    fn test_media_location_parse() {
        assert_eq!(
            MediaLocation::parse("https://example.com/a.png"),
            MediaLocation::Remote("https://example.com/a.png".to_string())
        );
        assert_eq!(
            MediaLocation::parse("/tmp/a.png"),
            MediaLocation::Local(PathBuf::from("/tmp/a.png"))
        );
    }

    #[test]
    fn test_media_location_parse_relative() {
        let base = Path::new("/articles/2024");
        assert_eq!(
            MediaLocation::parse_relative("img/a.png", Some(base)),
            MediaLocation::Local(PathBuf::from("/articles/2024/img/a.png"))
        );
        assert_eq!(
            MediaLocation::parse_relative("/abs/a.png", Some(base)),
            MediaLocation::Local(PathBuf::from("/abs/a.png"))
        );
        assert!(matches!(
            MediaLocation::parse_relative("https://x/a.png", Some(base)),
            MediaLocation::Remote(_)
        ));
    }

    #[test]
    fn test_news_article_repair_text() {
        let mut article = NewsArticle {
            title: "&lt;标题&gt;".to_string(),
            content: r"\u4e2d\u6587".to_string(),
            ..NewsArticle::default()
        };
        assert!(article.repair_text());
        assert_eq!(article.title, "<标题>");
        assert_eq!(article.content, "中文");
        assert!(!article.repair_text());
    }

    #[test]
    fn test_platform_type_for_roles() {
        let local = MediaLocation::parse("/tmp/a.png");
        assert_eq!(MediaReference::thumbnail(local.clone()).platform_type(), "thumb");
        let voice = MediaReference::new(local, MediaRole::TemporaryMaterial, MediaKind::Voice);
        assert_eq!(voice.platform_type(), "voice");
    }

    #[test]
    fn test_size_ceilings() {
        let local = MediaLocation::parse("/tmp/a");
        assert_eq!(MediaReference::thumbnail(local.clone()).max_bytes(), None);
        assert_eq!(
            MediaReference::content_image(local.clone()).max_bytes(),
            Some(1024 * 1024)
        );
        let voice = MediaReference::new(local, MediaRole::PermanentMaterial, MediaKind::Voice);
        assert_eq!(voice.max_bytes(), Some(2 * 1024 * 1024));
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("Video".parse::<MediaKind>().unwrap(), MediaKind::Video);
        assert!("thumb".parse::<MediaKind>().is_err());
        assert_eq!("news".parse::<MaterialKind>().unwrap(), MaterialKind::News);
    }

    #[test]
    fn test_publish_request_builder() {
        let request = PublishRequest::new("标题", "<p>正文</p>")
            .cover("/tmp/c.jpg")
            .author("作者")
            .comments(true, true);
        assert_eq!(request.cover.as_deref(), Some("/tmp/c.jpg"));
        assert_eq!(request.author.as_deref(), Some("作者"));
        assert!(request.allow_comments && request.fans_only_comments);
    }
}
