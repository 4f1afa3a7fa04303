//! wx-post - Publish an HTML article to a WeChat Official Account draft box

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use libwxpub::error::MediaError;
use libwxpub::service::drafts::DraftPage;
use libwxpub::{Config, PublishRequest, WeChatService, WxPubError};

#[derive(Parser, Debug)]
#[command(name = "wx-post")]
#[command(version, about = "Publish an HTML article as a WeChat Official Account draft")]
#[command(long_about = r#"Publish an HTML article as a WeChat Official Account draft.

The article body is read from FILE. A cover is always attached: the one
given with --cover, else the first image in the body, else a generated
placeholder. Relative image paths resolve against FILE's directory.

EXAMPLES:
    # Publish with an explicit cover
    wx-post article.html --title "Release notes" --cover cover.png

    # Let the first body image become the cover, open comments to followers
    wx-post article.html --title "Weekly" --comments --fans-only

    # Machine-readable result
    wx-post article.html --title "Weekly" --format json | jq -r .draft_id

    # Browse the draft box
    wx-post --list --count 10

CONFIGURATION:
    ~/.config/wxpub/config.toml (or $WXPUB_CONFIG); credentials may come
    from WECHAT_APP_ID / WECHAT_APP_SECRET instead.

EXIT CODES:
    0 - Draft created (or listing printed)
    1 - Platform or media failure
    2 - Missing credentials or authentication failure
    3 - Invalid input (empty title or body, missing file)
"#)]
struct Cli {
    /// HTML file holding the article body
    #[arg(value_name = "FILE", required_unless_present = "list")]
    file: Option<PathBuf>,

    /// Article title
    #[arg(short, long, required_unless_present = "list")]
    title: Option<String>,

    /// Cover image (local path or URL)
    #[arg(short, long, value_name = "PATH_OR_URL")]
    cover: Option<String>,

    /// Author shown on the article
    #[arg(short, long)]
    author: Option<String>,

    /// Open comments on the article
    #[arg(long)]
    comments: bool,

    /// Restrict comments to followers (requires --comments)
    #[arg(long, requires = "comments")]
    fans_only: bool,

    /// List drafts instead of publishing
    #[arg(long, conflicts_with_all = ["file", "cover", "author", "comments"])]
    list: bool,

    /// Offset into the draft box
    #[arg(long, default_value = "0")]
    offset: u32,

    /// Number of drafts to list (1-20)
    #[arg(long, default_value = "20")]
    count: u32,

    /// Output format
    #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
    format: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    libwxpub::logging::init_from_env("error", cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(exit_code(&e));
    }
}

fn exit_code(error: &anyhow::Error) -> i32 {
    error
        .downcast_ref::<WxPubError>()
        .map(WxPubError::exit_code)
        .unwrap_or(1)
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load_or_default()?;
    let service = WeChatService::from_config(&config)?;

    if cli.list {
        let page = service.list_drafts(cli.offset, cli.count, false).await?;
        print_drafts(&page, &cli.format)?;
        return Ok(());
    }

    let request = build_request(&cli)?;
    tracing::debug!(title = %request.title, bytes = request.body_html.len(), "Publishing article");

    let outcome = service.publish(request).await?;

    match cli.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&outcome)?),
        _ => println!("{}", outcome.draft_id),
    }
    Ok(())
}

fn build_request(cli: &Cli) -> Result<PublishRequest> {
    let (Some(path), Some(title)) = (cli.file.as_ref(), cli.title.as_ref()) else {
        return Err(WxPubError::InvalidInput("FILE and --title are required".to_string()).into());
    };

    let body = match std::fs::read_to_string(path) {
        Ok(body) => body,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(WxPubError::from(MediaError::NotFound(path.clone())).into())
        }
        Err(e) => {
            return Err(WxPubError::from(MediaError::Read {
                path: path.clone(),
                source: e,
            })
            .into())
        }
    };

    let mut request = PublishRequest::new(title.as_str(), body).comments(cli.comments, cli.fans_only);
    if let Some(cover) = &cli.cover {
        request = request.cover(cover.as_str());
    }
    if let Some(author) = &cli.author {
        request = request.author(author.as_str());
    }
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        request = request.base_dir(dir);
    }
    Ok(request)
}

fn print_drafts(page: &DraftPage, format: &str) -> Result<()> {
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(page)?);
        return Ok(());
    }

    if page.items.is_empty() {
        println!("No drafts ({} total)", page.total_count);
        return Ok(());
    }

    for item in &page.items {
        let updated = item
            .update_time
            .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "-".to_string());
        let title = item
            .articles()
            .first()
            .map(|a| a.title.as_str())
            .unwrap_or("");
        println!("{}\t{}\t{}", item.media_id, updated, title);
    }
    println!("({} of {} drafts)", page.items.len(), page.total_count);
    Ok(())
}
