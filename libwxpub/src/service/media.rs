//! Media upload pipeline
//!
//! Turns a [`MediaReference`] into an [`UploadedMedia`]: validates the
//! request, resolves the bytes (local read or remote download), fits
//! thumbnails under the 64 KB ceiling through a scoped scratch file, and
//! submits a multipart upload to the endpoint the role calls for.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use percent_encoding::percent_decode_str;
use serde::Deserialize;
use tempfile::NamedTempFile;

use crate::error::{MediaError, PlatformError, Result, WxPubError};
use crate::platform::session::ApiSession;
use crate::platform::{snippet, MultipartForm, Reply, ERROR_SNIPPET_CHARS};
use crate::thumbnail::ThumbnailFitter;
use crate::types::{
    content_type_for, MediaKind, MediaLocation, MediaMimeType, MediaReference, MediaRole,
    UploadedMedia,
};

/// Filename used when nothing better can be derived
const FALLBACK_FILENAME: &str = "media";

#[derive(Debug, Deserialize)]
struct MediaIdReply {
    media_id: String,
}

#[derive(Debug, Deserialize)]
struct UrlReply {
    url: String,
}

/// Bytes ready for upload
#[derive(Debug, Clone)]
struct ResolvedMedia {
    data: Bytes,
    filename: String,
}

/// Payload after role-specific transforms; holds any scratch file until the
/// upload finishes.
struct Prepared {
    data: Bytes,
    filename: String,
    _scratch: Option<NamedTempFile>,
}

#[derive(Clone)]
pub struct MediaPipeline {
    session: Arc<ApiSession>,
    fitter: ThumbnailFitter,
}

impl MediaPipeline {
    pub fn new(session: Arc<ApiSession>, fitter: ThumbnailFitter) -> Self {
        Self { session, fitter }
    }

    pub(crate) fn fitter(&self) -> &ThumbnailFitter {
        &self.fitter
    }

    /// Upload one piece of media.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` for permanent video without a description, or when
    ///   the payload exceeds the role's size ceiling
    /// - `MediaError::NotFound` / `MediaError::Download` when the bytes
    ///   cannot be obtained
    /// - `PlatformError::Upload` when the platform rejects the upload
    pub async fn upload(&self, media: &MediaReference) -> Result<UploadedMedia> {
        validate(media)?;

        let resolved = self.resolve(&media.location).await?;
        let prepared = self.prepare(media, resolved).await?;

        let endpoints = self.session.endpoints();
        let (url, type_param) = match media.role {
            MediaRole::ContentImage => (endpoints.news_image(), None),
            MediaRole::TemporaryMaterial => (endpoints.temporary_media(), Some(media.platform_type())),
            MediaRole::PermanentMaterial | MediaRole::Thumbnail => {
                (endpoints.permanent_material(), Some(media.platform_type()))
            }
        };
        let query: Vec<(&str, &str)> = type_param.map(|t| ("type", t)).into_iter().collect();

        let mut form = MultipartForm::new().file(
            "media",
            prepared.data.clone(),
            &prepared.filename,
            content_type_for(&prepared.filename),
        );
        if let (MediaRole::PermanentMaterial, MediaKind::Video, Some(description)) =
            (media.role, media.kind, media.description.as_ref())
        {
            form = form.json("description", crate::platform::encode_body(description)?);
        }

        tracing::debug!(
            location = %media.location,
            filename = %prepared.filename,
            bytes = prepared.data.len(),
            kind = media.platform_type(),
            "Uploading media"
        );

        let uploaded = match media.role {
            MediaRole::ContentImage => self
                .session
                .post_multipart::<UrlReply>(&url, &query, form, "upload image for news")
                .await?
                .or_reject(PlatformError::Upload)
                .map(|reply| UploadedMedia::Url(reply.url))?,
            _ => self
                .session
                .post_multipart::<MediaIdReply>(&url, &query, form, "upload media")
                .await?
                .or_reject(PlatformError::Upload)
                .map(|reply| UploadedMedia::MediaId(reply.media_id))?,
        };

        drop(prepared);

        tracing::info!(
            location = %media.location,
            result = uploaded.as_str(),
            "Media uploaded"
        );
        Ok(uploaded)
    }

    /// Obtain the raw bytes and a filename for a location.
    async fn resolve(&self, location: &MediaLocation) -> Result<ResolvedMedia> {
        match location {
            MediaLocation::Local(path) => read_local(path).await,
            MediaLocation::Remote(url) => self.download(url).await,
        }
    }

    async fn download(&self, url: &str) -> Result<ResolvedMedia> {
        let response = self
            .session
            .transport()
            .get(url, &[])
            .await
            .map_err(|e| download_error(url, e.to_string()))?;

        if !response.is_ok() {
            return Err(download_error(
                url,
                format!(
                    "HTTP {}: {}",
                    response.status,
                    snippet(&response.text(), ERROR_SNIPPET_CHARS)
                ),
            ));
        }

        let filename = remote_filename(
            url,
            response.content_disposition.as_deref(),
            response.content_type.as_deref(),
        );
        tracing::debug!(url, filename = %filename, bytes = response.body.len(), "Downloaded media");

        Ok(ResolvedMedia {
            data: response.body,
            filename,
        })
    }

    async fn prepare(&self, media: &MediaReference, resolved: ResolvedMedia) -> Result<Prepared> {
        if media.role != MediaRole::Thumbnail {
            if let Some(limit) = media.max_bytes() {
                if resolved.data.len() > limit {
                    return Err(WxPubError::InvalidInput(format!(
                        "{} is {} bytes, over the {} byte limit for {} uploads",
                        resolved.filename,
                        resolved.data.len(),
                        limit,
                        media.platform_type()
                    )));
                }
            }
            return Ok(Prepared {
                data: resolved.data,
                filename: resolved.filename,
                _scratch: None,
            });
        }

        let fitted = self.fitter.fit_async(resolved.data).await?;
        let scratch = self.fitter.write_scratch(&fitted.bytes, ".jpg")?;
        let data = tokio::fs::read(scratch.path())
            .await
            .map_err(MediaError::Scratch)?;

        tracing::debug!(
            width = fitted.width,
            height = fitted.height,
            quality = fitted.quality,
            bytes = data.len(),
            "Thumbnail fitted"
        );

        Ok(Prepared {
            data: Bytes::from(data),
            filename: jpeg_filename(&resolved.filename),
            _scratch: Some(scratch),
        })
    }
}

fn validate(media: &MediaReference) -> Result<()> {
    if media.role == MediaRole::PermanentMaterial
        && media.kind == MediaKind::Video
        && media.description.is_none()
    {
        return Err(WxPubError::InvalidInput(
            "Permanent video material requires a title and introduction".to_string(),
        ));
    }
    if let Some(description) = &media.description {
        if description.title.trim().is_empty() {
            return Err(WxPubError::InvalidInput(
                "Video description title must not be empty".to_string(),
            ));
        }
    }
    if media.role == MediaRole::Thumbnail && media.kind != MediaKind::Image {
        return Err(WxPubError::InvalidInput(
            "Thumbnails must be images".to_string(),
        ));
    }
    Ok(())
}

async fn read_local(path: &Path) -> Result<ResolvedMedia> {
    let data = match tokio::fs::read(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(MediaError::NotFound(path.to_path_buf()).into())
        }
        Err(e) => {
            return Err(MediaError::Read {
                path: path.to_path_buf(),
                source: e,
            }
            .into())
        }
    };

    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or(FALLBACK_FILENAME)
        .to_string();

    Ok(ResolvedMedia {
        data: Bytes::from(data),
        filename,
    })
}

fn download_error(url: &str, reason: String) -> WxPubError {
    MediaError::Download {
        url: url.to_string(),
        reason,
    }
    .into()
}

/// Pick a filename for downloaded media: `Content-Disposition`, then the
/// last URL path segment, then a fallback; append an extension from the
/// content type when the name has no recognizable one.
fn remote_filename(
    url: &str,
    content_disposition: Option<&str>,
    content_type: Option<&str>,
) -> String {
    let mut filename = content_disposition
        .and_then(disposition_filename)
        .or_else(|| url_filename(url))
        .unwrap_or_else(|| FALLBACK_FILENAME.to_string());

    if MediaMimeType::from_filename(&filename).is_none() {
        if let Some(mime) = content_type.and_then(MediaMimeType::from_mime_str) {
            filename = format!("{}.{}", filename, mime.extension());
        }
    }
    filename
}

fn disposition_filename(header: &str) -> Option<String> {
    let mut plain = None;
    for param in header.split(';').map(str::trim) {
        if let Some(value) = param.strip_prefix("filename*=") {
            let encoded = value.rsplit("''").next().unwrap_or(value);
            let decoded = percent_decode_str(encoded.trim_matches('"')).decode_utf8_lossy();
            if !decoded.is_empty() {
                return Some(decoded.into_owned());
            }
        } else if let Some(value) = param.strip_prefix("filename=") {
            let value = value.trim_matches('"');
            if !value.is_empty() {
                plain = Some(value.to_string());
            }
        }
    }
    plain
}

fn url_filename(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let decoded = percent_decode_str(segment).decode_utf8_lossy().into_owned();
    (!decoded.is_empty()).then_some(decoded)
}

fn jpeg_filename(original: &str) -> String {
    let stem = Path::new(original)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("thumb");
    format!("{}.jpg", stem)
}
