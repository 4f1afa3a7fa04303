//! Platform protocol plumbing
//!
//! Everything that talks to the platform's HTTP API goes through the
//! [`Transport`] trait. The production implementation lives in [`http`];
//! [`mock`] provides a scriptable in-memory transport for tests.
//!
//! Replies are decoded with [`decode_reply`], which applies the platform's
//! quirks uniformly:
//!
//! - the body is parsed as JSON regardless of the declared content type
//!   (the platform labels JSON as `text/plain` on several endpoints)
//! - a non-zero `errcode` becomes [`Reply::Rejected`]
//! - an unparseable body becomes `PlatformError::Protocol` carrying a
//!   truncated snippet, never the full body

use std::borrow::Cow;

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, PlatformError, Result, WxPubError};

pub mod codes;
pub mod http;
pub mod session;
pub mod token;

// Mock transport is available for all builds (not just tests) to support integration tests
pub mod mock;

/// Default API root for the official account platform.
pub const DEFAULT_API_BASE: &str = "https://api.weixin.qq.com/cgi-bin";

/// Characters of a raw body kept in protocol errors.
pub const ERROR_SNIPPET_CHARS: usize = 500;

/// Characters of a raw body written to debug logs.
pub const LOG_SNIPPET_CHARS: usize = 200;

/// A fully-buffered HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
    pub body: Bytes,
}

impl HttpResponse {
    /// A 200 response with the given body and no notable headers.
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self {
            status: 200,
            content_type: None,
            content_disposition: None,
            body: body.into(),
        }
    }

    /// A response with an arbitrary status code.
    pub fn with_status(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            ..Self::ok(body)
        }
    }

    pub fn content_type(mut self, value: impl Into<String>) -> Self {
        self.content_type = Some(value.into());
        self
    }

    pub fn content_disposition(mut self, value: impl Into<String>) -> Self {
        self.content_disposition = Some(value.into());
        self
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// One part of a multipart upload body.
#[derive(Debug, Clone)]
pub struct FormPart {
    pub name: String,
    pub data: Bytes,
    pub filename: Option<String>,
    pub content_type: String,
}

/// Transport-neutral multipart body.
#[derive(Debug, Clone, Default)]
pub struct MultipartForm {
    pub parts: Vec<FormPart>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file part.
    pub fn file(
        mut self,
        name: &str,
        data: impl Into<Bytes>,
        filename: &str,
        content_type: &str,
    ) -> Self {
        self.parts.push(FormPart {
            name: name.to_string(),
            data: data.into(),
            filename: Some(filename.to_string()),
            content_type: content_type.to_string(),
        });
        self
    }

    /// Add a JSON-encoded text part.
    pub fn json(mut self, name: &str, body: String) -> Self {
        self.parts.push(FormPart {
            name: name.to_string(),
            data: Bytes::from(body),
            filename: None,
            content_type: "application/json".to_string(),
        });
        self
    }

    pub fn part(&self, name: &str) -> Option<&FormPart> {
        self.parts.iter().find(|p| p.name == name)
    }
}

/// Outbound HTTP seam for every platform call.
///
/// Query pairs are passed separately so implementations can log the path
/// without leaking the access token.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue a GET request.
    async fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<HttpResponse>;

    /// POST a pre-serialized JSON body.
    async fn post_json(&self, url: &str, query: &[(&str, &str)], body: String)
        -> Result<HttpResponse>;

    /// POST a multipart form.
    async fn post_multipart(
        &self,
        url: &str,
        query: &[(&str, &str)],
        form: MultipartForm,
    ) -> Result<HttpResponse>;
}

/// URL builder for the platform's endpoints.
#[derive(Debug, Clone)]
pub struct Endpoints {
    base: String,
}

impl Endpoints {
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    fn join(&self, path: &str) -> String {
        format!("{}/{}", self.base, path)
    }

    pub fn token(&self) -> String {
        self.join("token")
    }

    pub fn stable_token(&self) -> String {
        self.join("stable_token")
    }

    pub fn temporary_media(&self) -> String {
        self.join("media/upload")
    }

    pub fn permanent_material(&self) -> String {
        self.join("material/add_material")
    }

    pub fn news_image(&self) -> String {
        self.join("media/uploadimg")
    }

    pub fn draft_add(&self) -> String {
        self.join("draft/add")
    }

    pub fn draft_batchget(&self) -> String {
        self.join("draft/batchget")
    }

    pub fn material_batchget(&self) -> String {
        self.join("material/batchget_material")
    }

    pub fn material_count(&self) -> String {
        self.join("material/get_materialcount")
    }

    pub fn material_delete(&self) -> String {
        self.join("material/del_material")
    }

    pub fn material_add_news(&self) -> String {
        self.join("material/add_news")
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::new(DEFAULT_API_BASE)
    }
}

/// Outcome of a structurally valid platform reply.
#[derive(Debug)]
pub enum Reply<T> {
    Success(T),
    Rejected(ApiError),
}

impl<T> Reply<T> {
    /// Convert a rejection into the caller's error variant.
    pub fn or_reject(self, reject: impl FnOnce(ApiError) -> PlatformError) -> Result<T> {
        match self {
            Reply::Success(value) => Ok(value),
            Reply::Rejected(err) => Err(reject(err).into()),
        }
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: Option<String>,
}

/// Decode a platform reply.
///
/// # Errors
///
/// - `PlatformError::Http` with the raw body for any non-200 status
/// - `PlatformError::Protocol` if the body is not JSON or lacks the
///   fields `T` requires
pub fn decode_reply<T: DeserializeOwned>(response: &HttpResponse, context: &str) -> Result<Reply<T>> {
    let text = response.text();

    if !response.is_ok() {
        return Err(PlatformError::Http {
            status: response.status,
            body: text.into_owned(),
        }
        .into());
    }

    tracing::debug!(
        context,
        content_type = response.content_type.as_deref().unwrap_or(""),
        body = %snippet(&text, LOG_SNIPPET_CHARS),
        "Platform reply"
    );

    let value: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
        protocol_error(context, format!("{} ({})", snippet(&text, ERROR_SNIPPET_CHARS), e))
    })?;

    let envelope: ErrorEnvelope = serde_json::from_value(value.clone())
        .map_err(|e| protocol_error(context, format!("{}: {}", e, snippet(&text, ERROR_SNIPPET_CHARS))))?;

    if envelope.errcode != 0 {
        return Ok(Reply::Rejected(ApiError::new(
            envelope.errcode,
            envelope.errmsg.unwrap_or_else(|| "unknown error".to_string()),
        )));
    }

    serde_json::from_value(value)
        .map(Reply::Success)
        .map_err(|e| protocol_error(context, format!("{}: {}", e, snippet(&text, ERROR_SNIPPET_CHARS))))
}

fn protocol_error(context: &str, snippet: String) -> WxPubError {
    PlatformError::Protocol {
        context: context.to_string(),
        snippet,
    }
    .into()
}

/// Serialize an outbound JSON body.
///
/// `serde_json` writes non-ASCII characters literally; the platform stores
/// `\uXXXX` escapes verbatim, so they must never be introduced here.
pub fn encode_body<T: Serialize>(body: &T) -> Result<String> {
    serde_json::to_string(body)
        .map_err(|e| WxPubError::InvalidInput(format!("Failed to encode request body: {}", e)))
}

/// Truncate text to at most `max_chars` characters, marking the cut.
pub fn snippet(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
