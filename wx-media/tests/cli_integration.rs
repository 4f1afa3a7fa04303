//! CLI integration tests for wx-media

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn wx_media(temp_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("wx-media").unwrap();
    cmd.env("WXPUB_CONFIG", temp_dir.path().join("missing.toml"))
        .env_remove("WECHAT_APP_ID")
        .env_remove("WECHAT_APP_SECRET")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    let temp_dir = TempDir::new().unwrap();
    wx_media(&temp_dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("upload-temp"))
        .stdout(predicate::str::contains("upload-news-image"))
        .stdout(predicate::str::contains("upload-news "))
        .stdout(predicate::str::contains("delete"));
}

#[test]
fn test_unknown_kind_is_usage_error() {
    let temp_dir = TempDir::new().unwrap();
    wx_media(&temp_dir)
        .args(["upload-temp", "a.bin", "--kind", "thumb"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown media kind"));
}

#[test]
fn test_missing_media_file_exits_3() {
    let temp_dir = TempDir::new().unwrap();
    wx_media(&temp_dir)
        .arg("upload-temp")
        .arg(temp_dir.path().join("nope.png"))
        .args(["--kind", "image"])
        .assert()
        .code(3)
        .stdout(predicate::str::is_empty());
}

#[test]
fn test_permanent_video_without_title_exits_3() {
    let temp_dir = TempDir::new().unwrap();
    let video = temp_dir.path().join("clip.mp4");
    fs::write(&video, b"fake").unwrap();

    wx_media(&temp_dir)
        .arg("upload-permanent")
        .arg(&video)
        .args(["--kind", "video"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("requires a title"));
}

#[test]
fn test_upload_without_credentials_exits_2() {
    let temp_dir = TempDir::new().unwrap();
    let image = temp_dir.path().join("a.png");
    fs::write(&image, b"not really a png").unwrap();

    wx_media(&temp_dir)
        .arg("upload-temp")
        .arg(&image)
        .args(["--kind", "image"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("credentials are missing"));
}

#[test]
fn test_list_page_size_is_validated() {
    let temp_dir = TempDir::new().unwrap();
    wx_media(&temp_dir)
        .args(["list", "--kind", "image", "--permanent", "--count", "50"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("count must be between 1 and 20"));
}

#[test]
fn test_delete_blank_id_exits_3() {
    let temp_dir = TempDir::new().unwrap();
    wx_media(&temp_dir)
        .args(["delete", " "])
        .assert()
        .code(3);
}

#[test]
fn test_upload_news_with_malformed_articles_exits_3() {
    let temp_dir = TempDir::new().unwrap();
    let articles = temp_dir.path().join("articles.json");
    fs::write(&articles, "{not json").unwrap();

    wx_media(&temp_dir)
        .arg("upload-news")
        .arg(&articles)
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Invalid article list"));
}
