//! Integration tests for draft publishing
//!
//! Drives `WeChatService::publish` end to end over the mock transport:
//! token acquisition, cover resolution, thumbnail fitting, inline image
//! rehosting and draft submission.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use image::{ImageFormat, Rgb, RgbImage};
use libwxpub::config::DraftShape;
use libwxpub::error::{ConfigError, MediaError, PlatformError};
use libwxpub::platform::mock::MockTransport;
use libwxpub::platform::HttpResponse;
use libwxpub::thumbnail::ThumbnailFitter;
use libwxpub::{Config, PublishRequest, WeChatService, WxPubError};
use serde_json::json;
use tempfile::TempDir;

const CONFIG: &str = r#"
[wechat]
app_id = "wx-integration"
app_secret = "integration-secret-value"
api_base = "http://mock/cgi-bin"
"#;

fn config() -> Config {
    Config::from_toml(CONFIG).unwrap()
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 90]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

/// Mock with a working token endpoint and successful upload/draft replies
fn happy_mock() -> MockTransport {
    let mock = MockTransport::new();
    mock.respond_json("token", json!({"access_token": "TOKEN", "expires_in": 7200}));
    mock.respond_json("material/add_material", json!({"media_id": "THUMB_1"}));
    mock.respond_json("media/uploadimg", json!({"url": "http://mmbiz.qpic.cn/mmbiz_png/rehosted/0"}));
    mock.respond_json("draft/add", json!({"media_id": "DRAFT_1"}));
    mock
}

fn service(config: &Config, mock: &MockTransport, scratch: &Path) -> WeChatService {
    WeChatService::with_fitter(
        config,
        Arc::new(mock.clone()),
        ThumbnailFitter::new().with_scratch_dir(scratch),
    )
}

fn drafted_article(mock: &MockTransport) -> serde_json::Value {
    let requests = mock.requests_to("draft/add");
    assert_eq!(requests.len(), 1, "exactly one draft submission expected");
    requests[0].json_value()["articles"][0].clone()
}

fn scratch_is_empty(dir: &Path) -> bool {
    std::fs::read_dir(dir).unwrap().next().is_none()
}

#[tokio::test]
async fn test_publish_without_images_uses_placeholder_cover() {
    let scratch = TempDir::new().unwrap();
    let mock = happy_mock();
    let service = service(&config(), &mock, scratch.path());

    let outcome = service
        .publish(PublishRequest::new("Hello", "<p>Plain text only</p>"))
        .await
        .unwrap();

    assert_eq!(outcome.draft_id, "DRAFT_1");
    assert_eq!(outcome.cover_media_id, "THUMB_1");

    let uploads = mock.requests_to("material/add_material");
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].query_value("type"), Some("thumb"));
    assert_eq!(uploads[0].query_value("access_token"), Some("TOKEN"));

    let part = uploads[0].part("media").unwrap();
    assert_eq!(part.content_type, "image/jpeg");
    assert!(part.filename.as_deref().unwrap().ends_with(".jpg"));
    assert!(part.data.len() <= 64 * 1024);
    let placeholder = image::load_from_memory(&part.data).unwrap();
    assert_eq!((placeholder.width(), placeholder.height()), (400, 400));

    let article = drafted_article(&mock);
    assert_eq!(article["thumb_media_id"], "THUMB_1");
    assert_eq!(article["title"], "Hello");

    assert!(scratch_is_empty(scratch.path()));
}

#[tokio::test]
async fn test_first_body_image_becomes_cover_and_is_rehosted() {
    let scratch = TempDir::new().unwrap();
    let article_dir = TempDir::new().unwrap();
    std::fs::create_dir(article_dir.path().join("images")).unwrap();
    std::fs::write(article_dir.path().join("images/first.png"), png(800, 600)).unwrap();

    let mock = happy_mock();
    let service = service(&config(), &mock, scratch.path());

    let body = r#"<p>intro</p><img src="images/first.png" alt="a"><p>more</p>"#;
    let outcome = service
        .publish(PublishRequest::new("With image", body).base_dir(article_dir.path()))
        .await
        .unwrap();

    assert_eq!(outcome.cover_media_id, "THUMB_1");

    let thumb = &mock.requests_to("material/add_material")[0];
    assert_eq!(thumb.part("media").unwrap().filename.as_deref(), Some("first.jpg"));

    let inline = mock.requests_to("media/uploadimg");
    assert_eq!(inline.len(), 1);
    assert!(inline[0].query_value("type").is_none());
    assert_eq!(inline[0].part("media").unwrap().filename.as_deref(), Some("first.png"));

    let article = drafted_article(&mock);
    let content = article["content"].as_str().unwrap();
    assert!(content.contains(r#"src="http://mmbiz.qpic.cn/mmbiz_png/rehosted/0""#));
    assert!(!content.contains("images/first.png"));
    assert!(scratch_is_empty(scratch.path()));
}

#[tokio::test]
async fn test_supplied_remote_cover_wins_over_body_image() {
    let scratch = TempDir::new().unwrap();
    let mock = happy_mock();
    mock.respond(
        "pics/cover",
        HttpResponse::ok(png(1200, 900)).content_type("image/png"),
    );
    let mut config = config();
    config.publish.upload_inline_images = false;
    let service = service(&config, &mock, scratch.path());

    let body = r#"<img src="https://cdn.example.com/inline.png">"#;
    let outcome = service
        .publish(PublishRequest::new("Remote cover", body).cover("https://cdn.example.com/pics/cover"))
        .await
        .unwrap();

    assert_eq!(outcome.cover_media_id, "THUMB_1");
    assert_eq!(mock.calls("pics/cover"), 1);
    assert_eq!(mock.calls("inline.png"), 0);
    assert_eq!(mock.calls("media/uploadimg"), 0);

    let thumb = &mock.requests_to("material/add_material")[0];
    let part = thumb.part("media").unwrap();
    assert_eq!(part.filename.as_deref(), Some("cover.jpg"));
    let fitted = image::load_from_memory(&part.data).unwrap();
    assert!(fitted.width() <= 400 && fitted.height() <= 400);

    let article = drafted_article(&mock);
    assert_eq!(article["content"], body);
}

#[tokio::test]
async fn test_platform_hosted_images_are_left_alone() {
    let scratch = TempDir::new().unwrap();
    let mock = happy_mock();
    mock.respond("mmbiz_jpg/abc/0", HttpResponse::ok(png(100, 100)).content_type("image/jpeg"));
    let service = service(&config(), &mock, scratch.path());

    let body = r#"<img src="http://mmbiz.qpic.cn/mmbiz_jpg/abc/0">"#;
    service
        .publish(PublishRequest::new("Hosted", body))
        .await
        .unwrap();

    assert_eq!(mock.calls("media/uploadimg"), 0);
    assert_eq!(drafted_article(&mock)["content"], body);
}

#[tokio::test]
async fn test_extended_shape_carries_comment_flags() {
    let scratch = TempDir::new().unwrap();
    let mock = happy_mock();
    let mut config = config();
    config.publish.default_author = Some("Desk".to_string());
    let service = service(&config, &mock, scratch.path());

    service
        .publish(PublishRequest::new("Flags", "<p>x</p>").comments(true, true))
        .await
        .unwrap();

    let article = drafted_article(&mock);
    assert_eq!(article["need_open_comment"], 1);
    assert_eq!(article["only_fans_can_comment"], 1);
    assert_eq!(article["author"], "Desk");
}

#[tokio::test]
async fn test_legacy_shape_omits_comment_flags() {
    let scratch = TempDir::new().unwrap();
    let mock = happy_mock();
    let mut config = config();
    config.publish.draft_shape = DraftShape::Legacy;
    let service = service(&config, &mock, scratch.path());

    service
        .publish(
            PublishRequest::new("Legacy", "<p>x</p>")
                .author("Someone")
                .comments(true, false),
        )
        .await
        .unwrap();

    let article = drafted_article(&mock);
    assert!(article.get("need_open_comment").is_none());
    assert!(article.get("only_fans_can_comment").is_none());
    assert_eq!(article["author"], "Someone");
}

#[tokio::test]
async fn test_non_ascii_text_is_sent_literally_and_repaired() {
    let scratch = TempDir::new().unwrap();
    let mock = happy_mock();
    let service = service(&config(), &mock, scratch.path());

    service
        .publish(PublishRequest::new(r"\u4e2d\u6587标题", "<p>正文内容 &amp; more</p>"))
        .await
        .unwrap();

    let raw = mock.requests_to("draft/add")[0].json.clone().unwrap();
    assert!(raw.contains("中文标题"));
    assert!(raw.contains("正文内容 & more"));
    assert!(!raw.contains(r"\u4e2d"));

    let article = drafted_article(&mock);
    assert_eq!(article["title"], "中文标题");
}

#[tokio::test]
async fn test_token_fallback_during_publish() {
    let scratch = TempDir::new().unwrap();
    let mock = MockTransport::new();
    mock.respond_json("token", json!({"errcode": 40164, "errmsg": "invalid ip, not in whitelist"}));
    mock.respond_json("stable_token", json!({"access_token": "STABLE", "expires_in": 7200}));
    mock.respond_json("material/add_material", json!({"media_id": "THUMB_1"}));
    mock.respond_json("draft/add", json!({"media_id": "DRAFT_1"}));
    let service = service(&config(), &mock, scratch.path());

    let outcome = service
        .publish(PublishRequest::new("Fallback", "<p>x</p>"))
        .await
        .unwrap();

    assert_eq!(outcome.draft_id, "DRAFT_1");
    assert_eq!(mock.calls("token"), 1);
    assert_eq!(mock.calls("stable_token"), 1);
    assert_eq!(
        mock.requests_to("draft/add")[0].query_value("access_token"),
        Some("STABLE")
    );

    let stable = mock.requests_to("stable_token")[0].json_value();
    assert_eq!(stable["grant_type"], "client_credential");
    assert_eq!(stable["appid"], "wx-integration");
    assert_eq!(stable["force_refresh"], false);
}

#[tokio::test]
async fn test_draft_rejection_is_wrapped_in_publish_failed() {
    let scratch = TempDir::new().unwrap();
    let mock = happy_mock();
    mock.respond_json("draft/add", json!({"errcode": 45009, "errmsg": "reach max api daily quota limit"}));
    let service = service(&config(), &mock, scratch.path());

    let err = service
        .publish(PublishRequest::new("Quota", "<p>x</p>"))
        .await
        .unwrap_err();

    match &err {
        WxPubError::PublishFailed(cause) => {
            assert!(matches!(**cause, WxPubError::Platform(PlatformError::Api(_))));
        }
        other => panic!("expected PublishFailed, got {:?}", other),
    }
    assert_eq!(err.api_code(), Some(45009));
    assert_eq!(err.exit_code(), 1);
    assert!(scratch_is_empty(scratch.path()));
}

#[tokio::test]
async fn test_cover_upload_failure_stops_before_draft() {
    let scratch = TempDir::new().unwrap();
    let mock = happy_mock();
    mock.respond_json("material/add_material", json!({"errcode": 40009, "errmsg": "invalid image size"}));
    let service = service(&config(), &mock, scratch.path());

    let err = service
        .publish(PublishRequest::new("Too big", "<p>x</p>"))
        .await
        .unwrap_err();

    match &err {
        WxPubError::PublishFailed(cause) => {
            assert!(matches!(**cause, WxPubError::Platform(PlatformError::Upload(_))));
        }
        other => panic!("expected PublishFailed, got {:?}", other),
    }
    assert_eq!(mock.calls("draft/add"), 0);
    assert!(scratch_is_empty(scratch.path()));
}

#[tokio::test]
async fn test_unreachable_cover_is_a_download_failure() {
    let scratch = TempDir::new().unwrap();
    let mock = happy_mock();
    let service = service(&config(), &mock, scratch.path());

    let err = service
        .publish(PublishRequest::new("Broken", "<p>x</p>").cover("https://cdn.example.com/missing.png"))
        .await
        .unwrap_err();

    match &err {
        WxPubError::PublishFailed(cause) => {
            assert!(matches!(**cause, WxPubError::Media(MediaError::Download { .. })));
        }
        other => panic!("expected PublishFailed, got {:?}", other),
    }
    assert_eq!(mock.calls("material/add_material"), 0);
    assert_eq!(mock.calls("draft/add"), 0);
}

#[tokio::test]
async fn test_missing_credentials_fail_before_any_request() {
    let scratch = TempDir::new().unwrap();
    let mock = happy_mock();
    let mut config = config();
    config.wechat.app_secret = None;
    let service = service(&config, &mock, scratch.path());

    let err = service
        .publish(PublishRequest::new("No creds", "<p>x</p>"))
        .await
        .unwrap_err();

    match &err {
        WxPubError::PublishFailed(cause) => {
            assert!(matches!(**cause, WxPubError::Config(ConfigError::CredentialsMissing)));
        }
        other => panic!("expected PublishFailed, got {:?}", other),
    }
    assert_eq!(err.exit_code(), 2);
    assert!(mock.requests().is_empty());
}

#[tokio::test]
async fn test_empty_title_is_rejected_without_requests() {
    let scratch = TempDir::new().unwrap();
    let mock = happy_mock();
    let service = service(&config(), &mock, scratch.path());

    let err = service
        .publish(PublishRequest::new("   ", "<p>x</p>"))
        .await
        .unwrap_err();

    assert!(matches!(err, WxPubError::InvalidInput(_)));
    assert_eq!(err.exit_code(), 3);
    assert!(mock.requests().is_empty());
}

#[tokio::test]
async fn test_token_is_reused_across_publishes() {
    let scratch = TempDir::new().unwrap();
    let mock = happy_mock();
    let service = service(&config(), &mock, scratch.path());

    for i in 0..3 {
        service
            .publish(PublishRequest::new(format!("Post {}", i), "<p>x</p>"))
            .await
            .unwrap();
    }

    assert_eq!(mock.calls("token"), 1);
    assert_eq!(mock.calls("draft/add"), 3);
}
