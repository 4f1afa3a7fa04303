//! Service layer for wxpub
//!
//! `WeChatService` is the single entry point the command-line tools (or any
//! other shell) call into. It wires one shared [`ApiSession`] (transport plus
//! token cache) into the specialized sub-services:
//!
//! - [`MediaPipeline`]: uploads in every role
//! - [`DraftOrchestrator`]: cover resolution and draft creation
//! - [`MaterialService`]: material listing and deletion
//! - [`DraftBoxService`]: draft box listing
//!
//! # Example
//!
//! ```no_run
//! use libwxpub::service::WeChatService;
//! use libwxpub::types::PublishRequest;
//! use libwxpub::Config;
//!
//! # async fn example() -> libwxpub::Result<()> {
//! let config = Config::load_or_default()?;
//! let service = WeChatService::from_config(&config)?;
//!
//! let outcome = service
//!     .publish(PublishRequest::new("Hello", "<p>First post</p>"))
//!     .await?;
//! println!("draft {} with cover {}", outcome.draft_id, outcome.cover_media_id);
//! # Ok(())
//! # }
//! ```

pub mod drafts;
pub mod material;
pub mod media;
pub mod publish;

use std::sync::Arc;

use self::drafts::{DraftBoxService, DraftPage};
use self::material::{MaterialListing, MaterialService};
use self::media::MediaPipeline;
use self::publish::DraftOrchestrator;
use crate::config::{Config, Credentials};
use crate::error::Result;
use crate::platform::http::ReqwestTransport;
use crate::platform::session::ApiSession;
use crate::platform::{Endpoints, Transport};
use crate::thumbnail::{PlaceholderCover, ThumbnailFitter};
use crate::types::{
    MaterialKind, MediaKind, MediaLocation, MediaReference, MediaRole, NewsMaterialArticle,
    PublishOutcome, PublishRequest, VideoDescription,
};

pub struct WeChatService {
    session: Arc<ApiSession>,
    media: MediaPipeline,
    publisher: DraftOrchestrator,
    materials: MaterialService,
    drafts: DraftBoxService,
}

impl WeChatService {
    /// Build a service talking to the real platform.
    ///
    /// Credentials are resolved here but only checked when the first token
    /// is needed.
    pub fn from_config(config: &Config) -> Result<Self> {
        let transport = ReqwestTransport::new(config.wechat.timeout())?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Build a service over any transport.
    pub fn with_transport(config: &Config, transport: Arc<dyn Transport>) -> Self {
        Self::with_fitter(config, transport, ThumbnailFitter::new())
    }

    /// Build a service with a custom thumbnail fitter (scratch directory,
    /// size ceiling).
    pub fn with_fitter(config: &Config, transport: Arc<dyn Transport>, fitter: ThumbnailFitter) -> Self {
        let credentials = config.credentials();
        tracing::debug!(
            app_id = %credentials.app_id(),
            app_secret = %credentials.masked_secret(),
            api_base = %config.wechat.api_base,
            "Creating service"
        );

        let session = Arc::new(ApiSession::new(
            transport,
            credentials,
            Endpoints::new(&config.wechat.api_base),
        ));
        let media = MediaPipeline::new(Arc::clone(&session), fitter);
        let placeholder = PlaceholderCover::discover(
            config.publish.placeholder_label.as_str(),
            config.publish.placeholder_font_path().as_deref(),
        );
        let publisher = DraftOrchestrator::new(
            Arc::clone(&session),
            media.clone(),
            config.publish.clone(),
            placeholder,
        );
        let materials = MaterialService::new(Arc::clone(&session));
        let drafts = DraftBoxService::new(Arc::clone(&session));

        Self {
            session,
            media,
            publisher,
            materials,
            drafts,
        }
    }

    pub fn credentials(&self) -> &Credentials {
        self.session.tokens().credentials()
    }

    /// A valid access token, refreshed when needed.
    pub async fn get_token(&self) -> Result<String> {
        self.session.tokens().get_token().await
    }

    pub async fn publish(&self, request: PublishRequest) -> Result<PublishOutcome> {
        self.publisher.publish(request).await
    }

    pub async fn upload_temp_media(&self, path_or_url: &str, kind: MediaKind) -> Result<String> {
        let media = MediaReference::new(
            MediaLocation::parse(path_or_url),
            MediaRole::TemporaryMaterial,
            kind,
        );
        Ok(self.media.upload(&media).await?.into_string())
    }

    pub async fn upload_permanent_material(
        &self,
        path_or_url: &str,
        kind: MediaKind,
        description: Option<VideoDescription>,
    ) -> Result<String> {
        let mut media = MediaReference::new(
            MediaLocation::parse(path_or_url),
            MediaRole::PermanentMaterial,
            kind,
        );
        media.description = description;
        Ok(self.media.upload(&media).await?.into_string())
    }

    /// Upload an image for use inside article bodies; returns its URL.
    pub async fn upload_image_for_news(&self, path_or_url: &str) -> Result<String> {
        let media = MediaReference::content_image(MediaLocation::parse(path_or_url));
        Ok(self.media.upload(&media).await?.into_string())
    }

    /// Upload a cover as a permanent, size-fitted thumbnail.
    pub async fn upload_cover_image(&self, path_or_url: &str) -> Result<String> {
        let media = MediaReference::thumbnail(MediaLocation::parse(path_or_url));
        Ok(self.media.upload(&media).await?.into_string())
    }

    pub async fn get_media_list(
        &self,
        kind: MaterialKind,
        permanent: bool,
        offset: u32,
        count: u32,
    ) -> Result<MaterialListing> {
        self.materials
            .get_media_list(kind, permanent, offset, count)
            .await
    }

    /// Create a permanent news material; returns its media id.
    pub async fn upload_news_material(&self, articles: &[NewsMaterialArticle]) -> Result<String> {
        self.materials.upload_news_material(articles).await
    }

    pub async fn delete_permanent_material(&self, media_id: &str) -> Result<bool> {
        self.materials.delete_permanent_material(media_id).await
    }

    pub async fn list_drafts(&self, offset: u32, count: u32, no_content: bool) -> Result<DraftPage> {
        self.drafts.list_drafts(offset, count, no_content).await
    }
}
