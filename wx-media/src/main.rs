//! wx-media - Manage WeChat Official Account media and materials
//!
//! Unix-style tool for uploading media and maintaining the permanent
//! material library. Results go to stdout, one per line (or as JSON).

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use libwxpub::service::material::{MaterialCounts, MaterialListing, MaterialPage};
use libwxpub::error::MediaError;
use libwxpub::{
    Config, MaterialKind, MediaKind, NewsMaterialArticle, Result, VideoDescription, WeChatService,
    WxPubError,
};

#[derive(Parser, Debug)]
#[command(name = "wx-media")]
#[command(version)]
#[command(about = "Manage WeChat Official Account media and materials")]
#[command(long_about = "\
wx-media - Manage WeChat Official Account media and materials

DESCRIPTION:
    wx-media uploads media to the platform and maintains the permanent
    material library. Every PATH may be a local file or an http(s) URL.

COMMANDS:
    upload-temp        Upload temporary media (kept by the platform for 3 days)
    upload-permanent   Upload permanent material
    upload-news-image  Upload an image for use inside article bodies (prints a URL)
    upload-cover       Upload a cover thumbnail, resized to fit the 64 KB limit
    upload-news        Create a permanent news material from a JSON article list
    list               List permanent materials, or count temporary ones
    delete             Delete a permanent material

USAGE EXAMPLES:
    # Temporary voice message
    wx-media upload-temp greeting.mp3 --kind voice

    # Permanent video needs a title and introduction
    wx-media upload-permanent launch.mp4 --kind video --title \"Launch\" --introduction \"Recap\"

    # Image for an article body, straight from a URL
    wx-media upload-news-image https://example.com/diagram.png

    # News material from articles.json: [{\"title\": ..., \"content\": ..., \"thumb_media_id\": ...}]
    wx-media upload-news articles.json

    # Page through news materials as JSON
    wx-media list --kind news --permanent --offset 20 --count 20 --format json

    # Delete a material
    wx-media delete MEDIA_ID

CONFIGURATION:
    Configuration file: ~/.config/wxpub/config.toml

    Override with environment variables:
        WXPUB_CONFIG       - Path to config file
        WECHAT_APP_ID      - App id
        WECHAT_APP_SECRET  - App secret

EXIT CODES:
    0 - Success
    1 - Operation failed
    2 - Missing credentials or authentication failure
    3 - Invalid input (unknown kind, missing file, oversized media)
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format: text or json
    #[arg(short, long, global = true, default_value = "text", value_parser = ["text", "json"])]
    format: String,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Upload temporary media
    UploadTemp {
        /// Local path or URL
        path: String,

        /// Media kind: image, voice or video
        #[arg(short, long)]
        kind: MediaKind,
    },

    /// Upload permanent material
    UploadPermanent {
        /// Local path or URL
        path: String,

        /// Media kind: image, voice or video
        #[arg(short, long)]
        kind: MediaKind,

        /// Video title (required for video)
        #[arg(long)]
        title: Option<String>,

        /// Video introduction
        #[arg(long, requires = "title")]
        introduction: Option<String>,
    },

    /// Upload an image for article bodies
    UploadNewsImage {
        /// Local path or URL
        path: String,
    },

    /// Upload a cover thumbnail
    UploadCover {
        /// Local path or URL
        path: String,
    },

    /// Create a permanent news material
    UploadNews {
        /// JSON file holding an array of articles (title, content,
        /// thumb_media_id, and optionally author, digest,
        /// content_source_url, show_cover_pic, need_open_comment,
        /// only_fans_can_comment)
        file: PathBuf,
    },

    /// List materials
    List {
        /// Material kind: image, voice, video or news
        #[arg(short, long)]
        kind: MaterialKind,

        /// List permanent materials (temporary media can only be counted)
        #[arg(long)]
        permanent: bool,

        /// Offset into the library
        #[arg(long, default_value = "0")]
        offset: u32,

        /// Page size (1-20)
        #[arg(long, default_value = "20")]
        count: u32,
    },

    /// Delete a permanent material
    Delete {
        /// Media id to delete
        media_id: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    libwxpub::logging::init_from_env("error", cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load_or_default()?;
    let service = WeChatService::from_config(&config)?;
    let json = cli.format == "json";

    match cli.command {
        Commands::UploadTemp { path, kind } => {
            let media_id = service.upload_temp_media(&path, kind).await?;
            output_value("media_id", &media_id, json);
        }
        Commands::UploadPermanent {
            path,
            kind,
            title,
            introduction,
        } => {
            let description = video_description(kind, title, introduction)?;
            let media_id = service
                .upload_permanent_material(&path, kind, description)
                .await?;
            output_value("media_id", &media_id, json);
        }
        Commands::UploadNewsImage { path } => {
            let url = service.upload_image_for_news(&path).await?;
            output_value("url", &url, json);
        }
        Commands::UploadCover { path } => {
            let media_id = service.upload_cover_image(&path).await?;
            output_value("media_id", &media_id, json);
        }
        Commands::UploadNews { file } => {
            let articles = read_articles(&file)?;
            let media_id = service.upload_news_material(&articles).await?;
            output_value("media_id", &media_id, json);
        }
        Commands::List {
            kind,
            permanent,
            offset,
            count,
        } => {
            let listing = service.get_media_list(kind, permanent, offset, count).await?;
            if json {
                output_json(&listing)?;
            } else {
                output_listing_text(&listing);
            }
        }
        Commands::Delete { media_id } => {
            let deleted = service.delete_permanent_material(&media_id).await?;
            if json {
                output_json(&serde_json::json!({ "media_id": media_id, "deleted": deleted }))?;
            } else if deleted {
                println!("deleted {}", media_id);
            } else {
                println!("not found {}", media_id);
            }
        }
    }

    Ok(())
}

/// Title/introduction only make sense for video; the library enforces that
/// permanent video carries them.
fn video_description(
    kind: MediaKind,
    title: Option<String>,
    introduction: Option<String>,
) -> Result<Option<VideoDescription>> {
    match (kind, title) {
        (MediaKind::Video, Some(title)) => Ok(Some(VideoDescription {
            title,
            introduction: introduction.unwrap_or_default(),
        })),
        (MediaKind::Video, None) => Ok(None),
        (_, Some(_)) => Err(WxPubError::InvalidInput(
            "--title and --introduction only apply to video".to_string(),
        )),
        (_, None) => Ok(None),
    }
}

fn read_articles(path: &Path) -> Result<Vec<NewsMaterialArticle>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
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
    serde_json::from_str(&text).map_err(|e| {
        WxPubError::InvalidInput(format!("Invalid article list in {}: {}", path.display(), e))
    })
}

fn output_value(key: &str, value: &str, json: bool) {
    if json {
        let mut object = serde_json::Map::new();
        object.insert(key.to_string(), serde_json::Value::from(value));
        println!("{}", serde_json::Value::Object(object));
    } else {
        println!("{}", value);
    }
}

fn output_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| WxPubError::InvalidInput(format!("Failed to serialize output: {}", e)))?;
    println!("{}", text);
    Ok(())
}

fn output_listing_text(listing: &MaterialListing) {
    match listing {
        MaterialListing::Page(page) => output_page_text(page),
        MaterialListing::Counts(counts) => output_counts_text(counts),
    }
}

fn output_page_text(page: &MaterialPage) {
    for item in &page.items {
        let updated = item
            .update_time
            .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "-".to_string());
        let label = item
            .name
            .clone()
            .or_else(|| {
                item.content
                    .as_ref()
                    .and_then(|c| c.news_item.first())
                    .map(|a| a.title.clone())
            })
            .unwrap_or_default();
        println!("{} | {} | {}", item.media_id, updated, label);
    }
    println!("({} of {} materials)", page.items.len(), page.total_count);
}

fn output_counts_text(counts: &MaterialCounts) {
    println!("image: {}", counts.image_count);
    println!("voice: {}", counts.voice_count);
    println!("video: {}", counts.video_count);
    println!("news:  {}", counts.news_count);
}
