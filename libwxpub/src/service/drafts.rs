//! Draft box listing

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::material::MAX_PAGE_SIZE;
use crate::error::{PlatformError, Result, WxPubError};
use crate::platform::session::ApiSession;
use crate::types::{NewsArticle, NewsContent};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftItem {
    pub media_id: String,
    #[serde(default)]
    pub update_time: Option<i64>,
    #[serde(default)]
    pub content: NewsContent,
}

impl DraftItem {
    pub fn articles(&self) -> &[NewsArticle] {
        &self.content.news_item
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftPage {
    #[serde(default)]
    pub total_count: u32,
    #[serde(default)]
    pub item_count: u32,
    #[serde(default, rename = "item")]
    pub items: Vec<DraftItem>,
}

#[derive(Serialize)]
struct BatchGetRequest {
    offset: u32,
    count: u32,
    no_content: u8,
}

pub struct DraftBoxService {
    session: Arc<ApiSession>,
}

impl DraftBoxService {
    pub fn new(session: Arc<ApiSession>) -> Self {
        Self { session }
    }

    /// Fetch one page of drafts. Article text is repaired once when it
    /// carries corruption markers.
    pub async fn list_drafts(&self, offset: u32, count: u32, no_content: bool) -> Result<DraftPage> {
        if count == 0 || count > MAX_PAGE_SIZE {
            return Err(WxPubError::InvalidInput(format!(
                "count must be between 1 and {}, got {}",
                MAX_PAGE_SIZE, count
            )));
        }

        let url = self.session.endpoints().draft_batchget();
        let request = BatchGetRequest {
            offset,
            count,
            no_content: u8::from(no_content),
        };
        let mut page = self
            .session
            .post_json::<DraftPage, _>(&url, &request, "list drafts")
            .await?
            .or_reject(PlatformError::Api)?;

        tracing::info!(
            total = page.total_count,
            returned = page.items.len(),
            "Fetched drafts"
        );

        for item in &mut page.items {
            for article in &mut item.content.news_item {
                if article.repair_text() {
                    tracing::debug!(media_id = %item.media_id, "Repaired draft article text");
                }
            }
        }

        Ok(page)
    }
}
