//! Authenticated calls
//!
//! [`ApiSession`] pairs the transport with the token manager: it attaches a
//! fresh `access_token` to every request, decodes the reply, and drops the
//! cached token when the platform says it was rejected.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::token::TokenManager;
use super::{decode_reply, encode_body, Endpoints, MultipartForm, Reply, Transport};
use crate::config::Credentials;
use crate::error::Result;

pub struct ApiSession {
    transport: Arc<dyn Transport>,
    tokens: TokenManager,
    endpoints: Endpoints,
}

impl ApiSession {
    pub fn new(transport: Arc<dyn Transport>, credentials: Credentials, endpoints: Endpoints) -> Self {
        let tokens = TokenManager::new(credentials, Arc::clone(&transport), endpoints.clone());
        Self {
            transport,
            tokens,
            endpoints,
        }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Raw transport, for unauthenticated downloads.
    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
        context: &str,
    ) -> Result<Reply<T>> {
        let token = self.tokens.get_token().await?;
        let query = with_token(&token, query);
        let response = self.transport.get(url, &query).await?;
        self.observe(&token, decode_reply(&response, context)?).await
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        url: &str,
        body: &B,
        context: &str,
    ) -> Result<Reply<T>> {
        let body = encode_body(body)?;
        let token = self.tokens.get_token().await?;
        let query = with_token(&token, &[]);
        let response = self.transport.post_json(url, &query, body).await?;
        self.observe(&token, decode_reply(&response, context)?).await
    }

    pub async fn post_multipart<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
        form: MultipartForm,
        context: &str,
    ) -> Result<Reply<T>> {
        let token = self.tokens.get_token().await?;
        let query = with_token(&token, query);
        let response = self.transport.post_multipart(url, &query, form).await?;
        self.observe(&token, decode_reply(&response, context)?).await
    }

    /// `sent` is the token the request carried.
    async fn observe<T>(&self, sent: &str, reply: Reply<T>) -> Result<Reply<T>> {
        if let Reply::Rejected(err) = &reply {
            if err.is_token_rejection() {
                tracing::warn!(code = err.code, "Platform rejected the access token");
                self.tokens.invalidate(sent).await;
            }
        }
        Ok(reply)
    }
}

fn with_token<'a>(token: &'a str, query: &[(&'a str, &'a str)]) -> Vec<(&'a str, &'a str)> {
    let mut full = Vec::with_capacity(query.len() + 1);
    full.push(("access_token", token));
    full.extend_from_slice(query);
    full
}
