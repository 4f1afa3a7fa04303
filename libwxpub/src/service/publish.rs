//! Draft orchestrator
//!
//! Publishing an article always needs a cover thumbnail, so cover resolution
//! runs first: the caller's cover, else the first image in the body, else a
//! generated placeholder. Inline images are then moved onto the platform's
//! image host (when enabled) and the article is submitted to `draft/add`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use futures::stream::{self, StreamExt, TryStreamExt};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use super::media::MediaPipeline;
use crate::config::{DraftShape, PublishConfig};
use crate::encoding;
use crate::error::{PlatformError, Result, WxPubError};
use crate::platform::session::ApiSession;
use crate::thumbnail::PlaceholderCover;
use crate::types::{
    ArticleDraft, MediaLocation, MediaReference, PublishOutcome, PublishRequest,
};

// `\s` before `src=` keeps lazy-loading attributes like `data-src` out.
static FIRST_IMAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<img\b[^>]*?\ssrc=["']([^"']+)["']"#).expect("valid regex")
});

static IMAGE_SRC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(<img\b[^>]*?\ssrc=)(["'])([^"']+)(["'])"#).expect("valid regex")
});

/// Hosts whose images the platform already serves in article bodies
const PLATFORM_IMAGE_HOSTS: &[&str] = &["mmbiz.qpic.cn", "mmbiz.qlogo.cn"];

/// Concurrent inline image uploads per article
const INLINE_UPLOAD_CONCURRENCY: usize = 4;

#[derive(Serialize)]
struct DraftArticle<'a> {
    title: &'a str,
    author: &'a str,
    digest: &'a str,
    content: &'a str,
    content_source_url: &'a str,
    thumb_media_id: &'a str,
    show_cover_pic: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    need_open_comment: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    only_fans_can_comment: Option<u8>,
}

impl<'a> DraftArticle<'a> {
    fn new(draft: &'a ArticleDraft, shape: DraftShape) -> Self {
        let (need_open_comment, only_fans_can_comment) = match shape {
            DraftShape::Extended => (
                Some(u8::from(draft.allow_comments)),
                Some(u8::from(draft.allow_comments && draft.fans_only_comments)),
            ),
            DraftShape::Legacy => (None, None),
        };
        Self {
            title: &draft.title,
            author: &draft.author,
            digest: "",
            content: &draft.body_html,
            content_source_url: "",
            thumb_media_id: &draft.cover_media_id,
            show_cover_pic: 1,
            need_open_comment,
            only_fans_can_comment,
        }
    }
}

#[derive(Serialize)]
struct DraftAddRequest<'a> {
    articles: [DraftArticle<'a>; 1],
}

#[derive(Debug, Deserialize)]
struct DraftAddReply {
    media_id: String,
}

/// Where the cover came from
#[derive(Debug, Clone, PartialEq, Eq)]
enum CoverSource {
    Supplied(String),
    FirstImage(String),
    Placeholder,
}

pub struct DraftOrchestrator {
    session: Arc<ApiSession>,
    media: MediaPipeline,
    settings: PublishConfig,
    placeholder: PlaceholderCover,
}

impl DraftOrchestrator {
    pub fn new(
        session: Arc<ApiSession>,
        media: MediaPipeline,
        settings: PublishConfig,
        placeholder: PlaceholderCover,
    ) -> Self {
        Self {
            session,
            media,
            settings,
            placeholder,
        }
    }

    /// Create a draft and return its id with the cover actually used.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for an empty title or body; every failure after input
    /// validation is wrapped in `PublishFailed`.
    pub async fn publish(&self, request: PublishRequest) -> Result<PublishOutcome> {
        if request.title.trim().is_empty() {
            return Err(WxPubError::InvalidInput("Article title must not be empty".to_string()));
        }
        if request.body_html.trim().is_empty() {
            return Err(WxPubError::InvalidInput("Article body must not be empty".to_string()));
        }

        let title = encoding::repair(&request.title);
        let body = encoding::repair(&request.body_html);

        self.submit(&request, title, body)
            .await
            .map_err(WxPubError::publish_failed)
    }

    async fn submit(&self, request: &PublishRequest, title: String, body: String) -> Result<PublishOutcome> {
        let base_dir = request.base_dir.as_deref();

        let source = cover_source(request.cover.as_deref(), &body);
        tracing::debug!(?source, "Resolving cover");
        let cover_media_id = self.upload_cover(&source, base_dir).await?;

        let body = if self.settings.upload_inline_images {
            self.rewrite_inline_images(&body, base_dir).await?
        } else {
            body
        };

        let author = request
            .author
            .clone()
            .or_else(|| self.settings.default_author.clone())
            .unwrap_or_default();

        let draft = ArticleDraft {
            title,
            body_html: body,
            author,
            cover_media_id,
            allow_comments: request.allow_comments,
            fans_only_comments: request.fans_only_comments,
        };

        let draft_id = self.add_draft(&draft).await?;

        tracing::info!(
            draft_id = %draft_id,
            cover_media_id = %draft.cover_media_id,
            "Draft created"
        );

        Ok(PublishOutcome {
            draft_id,
            cover_media_id: draft.cover_media_id,
        })
    }

    async fn upload_cover(&self, source: &CoverSource, base_dir: Option<&Path>) -> Result<String> {
        let uploaded = match source {
            CoverSource::Supplied(cover) | CoverSource::FirstImage(cover) => {
                let location = MediaLocation::parse_relative(cover, base_dir);
                self.media.upload(&MediaReference::thumbnail(location)).await?
            }
            CoverSource::Placeholder => {
                let bytes = self.placeholder.render_async().await?;
                let scratch = self.media.fitter().write_scratch(&bytes, ".jpg")?;
                let location = MediaLocation::Local(scratch.path().to_path_buf());
                let uploaded = self.media.upload(&MediaReference::thumbnail(location)).await;
                drop(scratch);
                uploaded?
            }
        };
        Ok(uploaded.into_string())
    }

    /// Upload every off-platform `<img>` through the news-image endpoint and
    /// point the body at the returned URLs.
    async fn rewrite_inline_images(&self, body: &str, base_dir: Option<&Path>) -> Result<String> {
        let mut sources: Vec<String> = Vec::new();
        for caps in IMAGE_SRC.captures_iter(body) {
            let src = &caps[3];
            if needs_rehosting(src) && !sources.iter().any(|s| s == src) {
                sources.push(src.to_string());
            }
        }
        if sources.is_empty() {
            return Ok(body.to_string());
        }

        tracing::debug!(count = sources.len(), "Uploading inline images");

        let uploaded: Vec<(String, String)> = stream::iter(sources)
            .map(|src| async move {
                let location = MediaLocation::parse_relative(&src, base_dir);
                let url = self.media.upload(&MediaReference::content_image(location)).await?;
                Ok::<_, WxPubError>((src, url.into_string()))
            })
            .buffered(INLINE_UPLOAD_CONCURRENCY)
            .try_collect()
            .await?;
        let replacements: HashMap<String, String> = uploaded.into_iter().collect();

        let rewritten = IMAGE_SRC.replace_all(body, |caps: &Captures| {
            let src = &caps[3];
            let target = replacements.get(src).map(String::as_str).unwrap_or(src);
            format!("{}{}{}{}", &caps[1], &caps[2], target, &caps[4])
        });
        Ok(rewritten.into_owned())
    }

    async fn add_draft(&self, draft: &ArticleDraft) -> Result<String> {
        let body = DraftAddRequest {
            articles: [DraftArticle::new(draft, self.settings.draft_shape)],
        };
        let url = self.session.endpoints().draft_add();
        let reply = self
            .session
            .post_json::<DraftAddReply, _>(&url, &body, "add draft")
            .await?
            .or_reject(PlatformError::Api)?;
        Ok(reply.media_id)
    }
}

fn cover_source(supplied: Option<&str>, body: &str) -> CoverSource {
    if let Some(cover) = supplied.map(str::trim).filter(|c| !c.is_empty()) {
        return CoverSource::Supplied(cover.to_string());
    }
    match first_image(body) {
        Some(src) => CoverSource::FirstImage(src),
        None => CoverSource::Placeholder,
    }
}

/// First usable `<img src>` in an HTML body; inline `data:` URIs are skipped.
fn first_image(body: &str) -> Option<String> {
    FIRST_IMAGE
        .captures_iter(body)
        .map(|caps| caps[1].to_string())
        .find(|src| !src.starts_with("data:"))
}

fn needs_rehosting(src: &str) -> bool {
    if src.starts_with("data:") {
        return false;
    }
    match url::Url::parse(src) {
        Ok(url) => url
            .host_str()
            .map(|host| !PLATFORM_IMAGE_HOSTS.iter().any(|h| host.ends_with(h)))
            .unwrap_or(false),
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_image_extraction() {
        let body = r#"<p>intro</p><img class="a" src="https://x.com/1.png"><img src='b.jpg'>"#;
        assert_eq!(first_image(body).as_deref(), Some("https://x.com/1.png"));
        assert_eq!(first_image("<p>no images</p>"), None);
        assert_eq!(
            first_image(r#"<img src="data:image/png;base64,AAAA"><img src="real.png">"#).as_deref(),
            Some("real.png")
        );
    }

    #[test]
    fn test_lazy_loading_attributes_are_not_sources() {
        let body = r#"<img src="a.png" data-src="lazy.png"><img data-src="only-lazy.png">"#;
        assert_eq!(first_image(body).as_deref(), Some("a.png"));

        let body = r#"<img data-src="lazy.png" src="real.png">"#;
        assert_eq!(first_image(body).as_deref(), Some("real.png"));

        let srcs: Vec<String> = IMAGE_SRC
            .captures_iter(r#"<p><img src="a.png" data-src="lazy.png"><img data-src="x.png"></p>"#)
            .map(|caps| caps[3].to_string())
            .collect();
        assert_eq!(srcs, vec!["a.png".to_string()]);
    }

    #[test]
    fn test_cover_source_order() {
        let body = r#"<img src="inline.png">"#;
        assert_eq!(
            cover_source(Some("cover.jpg"), body),
            CoverSource::Supplied("cover.jpg".to_string())
        );
        assert_eq!(
            cover_source(Some("  "), body),
            CoverSource::FirstImage("inline.png".to_string())
        );
        assert_eq!(cover_source(None, "<p>text</p>"), CoverSource::Placeholder);
    }

    #[test]
    fn test_needs_rehosting() {
        assert!(needs_rehosting("https://example.com/a.png"));
        assert!(needs_rehosting("images/a.png"));
        assert!(!needs_rehosting("http://mmbiz.qpic.cn/mmbiz_png/abc/0"));
        assert!(!needs_rehosting("data:image/png;base64,AAAA"));
    }

    #[test]
    fn test_extended_shape_serialization() {
        let draft = ArticleDraft {
            title: "标题".to_string(),
            body_html: "<p>正文</p>".to_string(),
            author: "作者".to_string(),
            cover_media_id: "THUMB".to_string(),
            allow_comments: true,
            fans_only_comments: true,
        };
        let body = crate::platform::encode_body(&DraftAddRequest {
            articles: [DraftArticle::new(&draft, DraftShape::Extended)],
        })
        .unwrap();
        assert!(body.contains("标题"));

        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        let article = &value["articles"][0];
        assert_eq!(article["thumb_media_id"], "THUMB");
        assert_eq!(article["digest"], "");
        assert_eq!(article["need_open_comment"], 1);
        assert_eq!(article["only_fans_can_comment"], 1);
        assert_eq!(article["show_cover_pic"], 1);
    }

    #[test]
    fn test_fans_only_requires_comments() {
        let draft = ArticleDraft {
            title: "t".to_string(),
            body_html: "b".to_string(),
            author: String::new(),
            cover_media_id: "c".to_string(),
            allow_comments: false,
            fans_only_comments: true,
        };
        let value = serde_json::to_value(DraftArticle::new(&draft, DraftShape::Extended)).unwrap();
        assert_eq!(value["need_open_comment"], 0);
        assert_eq!(value["only_fans_can_comment"], 0);
    }

    #[test]
    fn test_legacy_shape_omits_comment_flags() {
        let draft = ArticleDraft {
            title: "t".to_string(),
            body_html: "b".to_string(),
            author: "a".to_string(),
            cover_media_id: "c".to_string(),
            allow_comments: true,
            fans_only_comments: false,
        };
        let value = serde_json::to_value(DraftArticle::new(&draft, DraftShape::Legacy)).unwrap();
        assert!(value.get("need_open_comment").is_none());
        assert!(value.get("only_fans_can_comment").is_none());
        assert_eq!(value["thumb_media_id"], "c");
    }
}
