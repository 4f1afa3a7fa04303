//! reqwest-backed transport

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderName, CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::Client;

use super::{HttpResponse, MultipartForm, Transport};
use crate::error::{PlatformError, Result};

/// Production transport over a shared `reqwest::Client`.
///
/// The client is cheap to clone and pools connections, so one instance is
/// shared by the token manager and every service.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Create a transport with a per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("wxpub/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PlatformError::Network(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    async fn finish(&self, request: reqwest::RequestBuilder, url: &str) -> Result<HttpResponse> {
        let response = request
            .send()
            .await
            .map_err(|e| map_reqwest_error(e, url))?;

        let status = response.status().as_u16();
        let content_type = header_value(&response, CONTENT_TYPE);
        let content_disposition = header_value(&response, CONTENT_DISPOSITION);

        let body = response
            .bytes()
            .await
            .map_err(|e| map_reqwest_error(e, url))?;

        tracing::debug!(url, status, bytes = body.len(), "HTTP response received");

        Ok(HttpResponse {
            status,
            content_type,
            content_disposition,
            body,
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<HttpResponse> {
        tracing::debug!(url, "GET");
        self.finish(self.client.get(url).query(query), url).await
    }

    async fn post_json(
        &self,
        url: &str,
        query: &[(&str, &str)],
        body: String,
    ) -> Result<HttpResponse> {
        tracing::debug!(url, bytes = body.len(), "POST json");
        let request = self
            .client
            .post(url)
            .query(query)
            .header(CONTENT_TYPE, "application/json; charset=utf-8")
            .body(body);
        self.finish(request, url).await
    }

    async fn post_multipart(
        &self,
        url: &str,
        query: &[(&str, &str)],
        form: MultipartForm,
    ) -> Result<HttpResponse> {
        let mut multipart = Form::new();
        for part in form.parts {
            tracing::debug!(url, part = %part.name, bytes = part.data.len(), "POST multipart part");
            let mut body = Part::bytes(part.data.to_vec())
                .mime_str(&part.content_type)
                .map_err(|e| {
                    PlatformError::Network(format!(
                        "Invalid content type '{}' for part '{}': {}",
                        part.content_type, part.name, e
                    ))
                })?;
            if let Some(filename) = part.filename {
                body = body.file_name(filename);
            }
            multipart = multipart.part(part.name, body);
        }

        let request = self.client.post(url).query(query).multipart(multipart);
        self.finish(request, url).await
    }
}

fn header_value(response: &reqwest::Response, name: HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Map reqwest errors to PlatformError with the failing URL as context.
///
/// `url` is the query-free endpoint. reqwest's own message carries the full
/// request URL, whose query holds the app secret or access token, so it is
/// stripped before formatting.
fn map_reqwest_error(error: reqwest::Error, url: &str) -> PlatformError {
    let error = error.without_url();
    if error.is_timeout() {
        PlatformError::Network(format!("Request to {} timed out: {}", url, error))
    } else if error.is_connect() {
        PlatformError::Network(format!(
            "Could not connect to {}: {}. Check your network connection.",
            url, error
        ))
    } else if error.is_body() || error.is_decode() {
        PlatformError::Network(format!("Failed to read response body from {}: {}", url, error))
    } else {
        PlatformError::Network(format!("Request to {} failed: {}", url, error))
    }
}
