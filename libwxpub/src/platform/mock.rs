//! Mock transport implementation for testing
//!
//! This module provides a scriptable in-memory [`Transport`] that answers
//! requests from per-route reply queues and records everything it was asked
//! to send. It's designed for integration tests that exercise the token
//! manager, the media pipeline, and the draft orchestrator without network
//! access.
//!
//! Routes are matched against the end of the request URL (query excluded),
//! so `"token"` matches `.../cgi-bin/token` but not `.../stable_token`, and
//! `"pics/cover.png"` matches a remote download URL.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use super::{FormPart, HttpResponse, MultipartForm, Transport};
use crate::error::Result;

/// HTTP method of a recorded request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    PostJson,
    PostMultipart,
}

/// A request the mock transport received
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub json: Option<String>,
    pub parts: Vec<FormPart>,
}

impl RecordedRequest {
    /// Value of a query parameter, if present
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// The JSON body parsed into a value (panics on invalid JSON; test helper)
    pub fn json_value(&self) -> serde_json::Value {
        serde_json::from_str(self.json.as_deref().unwrap_or("null"))
            .expect("recorded body should be valid JSON")
    }

    /// A multipart part by name
    pub fn part(&self, name: &str) -> Option<&FormPart> {
        self.parts.iter().find(|p| p.name == name)
    }
}

struct Route {
    suffix: String,
    queued: VecDeque<HttpResponse>,
    sticky: Option<HttpResponse>,
}

/// Mock transport for testing
#[derive(Clone, Default)]
pub struct MockTransport {
    routes: Arc<Mutex<Vec<Route>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    delay: Duration,
}

impl MockTransport {
    /// Create an empty mock transport; unscripted routes answer 404
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock transport that sleeps before every reply
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// Queue a one-shot reply for a route; queued replies are used before the sticky one
    pub fn enqueue(&self, route: &str, response: HttpResponse) {
        self.with_route(route, |r| r.queued.push_back(response));
    }

    /// Set the reply a route returns whenever its queue is empty
    pub fn respond(&self, route: &str, response: HttpResponse) {
        self.with_route(route, |r| r.sticky = Some(response));
    }

    /// Queue a one-shot JSON reply
    pub fn enqueue_json(&self, route: &str, body: serde_json::Value) {
        self.enqueue(route, HttpResponse::ok(body.to_string()));
    }

    /// Set a sticky JSON reply
    pub fn respond_json(&self, route: &str, body: serde_json::Value) {
        self.respond(route, HttpResponse::ok(body.to_string()));
    }

    /// Number of requests sent to a route
    pub fn calls(&self, route: &str) -> usize {
        self.requests_to(route).len()
    }

    /// All recorded requests, in order
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Recorded requests whose URL matches a route
    pub fn requests_to(&self, route: &str) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| route_matches(&r.url, route))
            .cloned()
            .collect()
    }

    fn with_route(&self, route: &str, f: impl FnOnce(&mut Route)) {
        let mut routes = self.routes.lock().unwrap();
        if let Some(existing) = routes.iter_mut().find(|r| r.suffix == route) {
            f(existing);
            return;
        }
        let mut created = Route {
            suffix: route.to_string(),
            queued: VecDeque::new(),
            sticky: None,
        };
        f(&mut created);
        routes.push(created);
    }

    async fn reply(&self, request: RecordedRequest) -> Result<HttpResponse> {
        let url = request.url.clone();
        self.requests.lock().unwrap().push(request);

        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        let mut routes = self.routes.lock().unwrap();
        let route = routes
            .iter_mut()
            .filter(|r| route_matches(&url, &r.suffix))
            .max_by_key(|r| r.suffix.len());

        let response = route.and_then(|r| r.queued.pop_front().or_else(|| r.sticky.clone()));

        Ok(response.unwrap_or_else(|| {
            HttpResponse::with_status(404, format!("no scripted reply for {}", url))
        }))
    }
}

fn route_matches(url: &str, suffix: &str) -> bool {
    let path = url.split('?').next().unwrap_or(url);
    path == suffix || path.ends_with(&format!("/{}", suffix.trim_start_matches('/')))
}

fn owned_query(query: &[(&str, &str)]) -> Vec<(String, String)> {
    query
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<HttpResponse> {
        self.reply(RecordedRequest {
            method: Method::Get,
            url: url.to_string(),
            query: owned_query(query),
            json: None,
            parts: Vec::new(),
        })
        .await
    }

    async fn post_json(
        &self,
        url: &str,
        query: &[(&str, &str)],
        body: String,
    ) -> Result<HttpResponse> {
        self.reply(RecordedRequest {
            method: Method::PostJson,
            url: url.to_string(),
            query: owned_query(query),
            json: Some(body),
            parts: Vec::new(),
        })
        .await
    }

    async fn post_multipart(
        &self,
        url: &str,
        query: &[(&str, &str)],
        form: MultipartForm,
    ) -> Result<HttpResponse> {
        self.reply(RecordedRequest {
            method: Method::PostMultipart,
            url: url.to_string(),
            query: owned_query(query),
            json: None,
            parts: form.parts,
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_queued_then_sticky() {
        let mock = MockTransport::new();
        mock.enqueue("token", HttpResponse::ok("first"));
        mock.respond("token", HttpResponse::ok("always"));

        let first = mock.get("http://api/cgi-bin/token", &[]).await.unwrap();
        let second = mock.get("http://api/cgi-bin/token", &[]).await.unwrap();
        let third = mock.get("http://api/cgi-bin/token", &[]).await.unwrap();

        assert_eq!(first.text(), "first");
        assert_eq!(second.text(), "always");
        assert_eq!(third.text(), "always");
        assert_eq!(mock.calls("token"), 3);
    }

    #[tokio::test]
    async fn test_mock_route_suffix_does_not_overlap() {
        let mock = MockTransport::new();
        mock.respond("token", HttpResponse::ok("primary"));
        mock.respond("stable_token", HttpResponse::ok("stable"));

        let stable = mock
            .post_json("http://api/cgi-bin/stable_token", &[], "{}".into())
            .await
            .unwrap();
        assert_eq!(stable.text(), "stable");
        assert_eq!(mock.calls("token"), 0);
        assert_eq!(mock.calls("stable_token"), 1);
    }

    #[tokio::test]
    async fn test_mock_unscripted_route_is_404() {
        let mock = MockTransport::new();
        let response = mock.get("http://api/cgi-bin/unknown", &[]).await.unwrap();
        assert_eq!(response.status, 404);
    }

    #[tokio::test]
    async fn test_mock_records_query_and_parts() {
        let mock = MockTransport::new();
        let form = MultipartForm::new().file("media", vec![1u8, 2], "a.jpg", "image/jpeg");
        mock.post_multipart(
            "http://api/cgi-bin/media/upload",
            &[("access_token", "tok"), ("type", "image")],
            form,
        )
        .await
        .unwrap();

        let recorded = mock.requests_to("media/upload");
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].method, Method::PostMultipart);
        assert_eq!(recorded[0].query_value("type"), Some("image"));
        assert_eq!(recorded[0].part("media").unwrap().data.len(), 2);
    }

    #[tokio::test]
    async fn test_mock_with_delay() {
        let mock = MockTransport::with_delay(Duration::from_millis(50));
        let start = std::time::Instant::now();
        mock.get("http://api/x", &[]).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
