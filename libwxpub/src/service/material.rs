//! Material library listing and deletion

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{PlatformError, Result, WxPubError};
use crate::platform::session::ApiSession;
use crate::platform::Reply;
use crate::types::{MaterialKind, NewsContent, NewsMaterialArticle};

/// Largest page the listing endpoint serves
pub const MAX_PAGE_SIZE: u32 = 20;

/// Platform code for an unknown media id
const INVALID_MEDIA_ID: i64 = 40007;

/// One permanent material
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialItem {
    pub media_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub update_time: Option<i64>,
    /// Present for news materials
    #[serde(default)]
    pub content: Option<NewsContent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterialPage {
    #[serde(default)]
    pub total_count: u32,
    #[serde(default)]
    pub item_count: u32,
    #[serde(default, rename = "item")]
    pub items: Vec<MaterialItem>,
}

/// Per-kind totals; the only view the platform offers of temporary media
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MaterialCounts {
    #[serde(default)]
    pub voice_count: u32,
    #[serde(default)]
    pub video_count: u32,
    #[serde(default)]
    pub image_count: u32,
    #[serde(default)]
    pub news_count: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "listing", rename_all = "snake_case")]
pub enum MaterialListing {
    Page(MaterialPage),
    Counts(MaterialCounts),
}

#[derive(Serialize)]
struct BatchGetRequest<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    offset: u32,
    count: u32,
}

#[derive(Serialize)]
struct DeleteRequest<'a> {
    media_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct Acknowledged {}

#[derive(Serialize)]
struct AddNewsRequest<'a> {
    articles: &'a [NewsMaterialArticle],
}

#[derive(Debug, Deserialize)]
struct AddNewsReply {
    media_id: String,
}

pub struct MaterialService {
    session: Arc<ApiSession>,
}

impl MaterialService {
    pub fn new(session: Arc<ApiSession>) -> Self {
        Self { session }
    }

    /// List permanent materials of one kind, or count temporary ones.
    ///
    /// News article bodies in a page are passed through encoding repair.
    pub async fn get_media_list(
        &self,
        kind: MaterialKind,
        permanent: bool,
        offset: u32,
        count: u32,
    ) -> Result<MaterialListing> {
        if !permanent {
            let url = self.session.endpoints().material_count();
            let counts = self
                .session
                .get::<MaterialCounts>(&url, &[], "material count")
                .await?
                .or_reject(PlatformError::Api)?;
            return Ok(MaterialListing::Counts(counts));
        }

        if count == 0 || count > MAX_PAGE_SIZE {
            return Err(WxPubError::InvalidInput(format!(
                "count must be between 1 and {}, got {}",
                MAX_PAGE_SIZE, count
            )));
        }

        let url = self.session.endpoints().material_batchget();
        let request = BatchGetRequest {
            kind: kind.as_str(),
            offset,
            count,
        };
        let mut page = self
            .session
            .post_json::<MaterialPage, _>(&url, &request, "list materials")
            .await?
            .or_reject(PlatformError::Api)?;

        let repaired = page
            .items
            .iter_mut()
            .filter_map(|item| item.content.as_mut())
            .flat_map(|content| content.news_item.iter_mut())
            .map(|article| article.repair_text())
            .filter(|changed| *changed)
            .count();
        if repaired > 0 {
            tracing::debug!(repaired, "Repaired news material text");
        }

        Ok(MaterialListing::Page(page))
    }

    /// Create a permanent news material from one or more articles and
    /// return its media id. Text fields are repaired before submission.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` for an empty article list, or an article missing its
    ///   title, content or `thumb_media_id`
    /// - `PlatformError::Api` when the platform rejects the material
    pub async fn upload_news_material(&self, articles: &[NewsMaterialArticle]) -> Result<String> {
        if articles.is_empty() {
            return Err(WxPubError::InvalidInput(
                "News material needs at least one article".to_string(),
            ));
        }
        for (index, article) in articles.iter().enumerate() {
            let missing = [
                ("title", &article.title),
                ("content", &article.content),
                ("thumb_media_id", &article.thumb_media_id),
            ]
            .into_iter()
            .find(|(_, value)| value.trim().is_empty());
            if let Some((field, _)) = missing {
                return Err(WxPubError::InvalidInput(format!(
                    "News article {} is missing {}",
                    index + 1,
                    field
                )));
            }
        }

        let articles: Vec<NewsMaterialArticle> =
            articles.iter().cloned().map(NewsMaterialArticle::repaired).collect();
        let url = self.session.endpoints().material_add_news();
        let reply = self
            .session
            .post_json::<AddNewsReply, _>(&url, &AddNewsRequest { articles: &articles }, "add news material")
            .await?
            .or_reject(PlatformError::Api)?;

        tracing::info!(
            media_id = %reply.media_id,
            articles = articles.len(),
            "News material created"
        );
        Ok(reply.media_id)
    }

    /// Delete a permanent material. Returns `false` when the platform does
    /// not know the id.
    pub async fn delete_permanent_material(&self, media_id: &str) -> Result<bool> {
        if media_id.trim().is_empty() {
            return Err(WxPubError::InvalidInput("media_id must not be empty".to_string()));
        }

        let url = self.session.endpoints().material_delete();
        let reply = self
            .session
            .post_json::<Acknowledged, _>(&url, &DeleteRequest { media_id }, "delete material")
            .await?;

        match reply {
            Reply::Success(_) => {
                tracing::info!(media_id, "Permanent material deleted");
                Ok(true)
            }
            Reply::Rejected(err) if err.code == INVALID_MEDIA_ID => {
                tracing::warn!(media_id, error = %err, "Material not found");
                Ok(false)
            }
            Reply::Rejected(err) => Err(PlatformError::Api(err).into()),
        }
    }
}
