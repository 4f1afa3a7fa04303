//! Configuration management for wxpub

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::platform::DEFAULT_API_BASE;

/// Environment variable overriding the app id from the config file
pub const APP_ID_ENV: &str = "WECHAT_APP_ID";

/// Environment variable overriding the app secret from the config file
pub const APP_SECRET_ENV: &str = "WECHAT_APP_SECRET";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub wechat: WeChatConfig,
    #[serde(default)]
    pub publish: PublishConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct WeChatConfig {
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub app_secret: Option<String>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for WeChatConfig {
    fn default() -> Self {
        Self {
            app_id: None,
            app_secret: None,
            api_base: default_api_base(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl std::fmt::Debug for WeChatConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeChatConfig")
            .field("app_id", &self.app_id)
            .field("app_secret", &self.app_secret.as_deref().map(mask))
            .field("api_base", &self.api_base)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl WeChatConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

/// Which `draft/add` article shape to emit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DraftShape {
    /// Older shape: no comment flags, cover always shown
    Legacy,
    /// Current shape with author and comment flags
    #[default]
    Extended,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    #[serde(default)]
    pub default_author: Option<String>,
    #[serde(default)]
    pub draft_shape: DraftShape,
    #[serde(default = "default_true")]
    pub upload_inline_images: bool,
    /// Text drawn on the generated placeholder cover
    #[serde(default = "default_placeholder_label")]
    pub placeholder_label: String,
    /// Font for the placeholder label; system fonts are searched when unset
    #[serde(default)]
    pub placeholder_font: Option<String>,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            default_author: None,
            draft_shape: DraftShape::default(),
            upload_inline_images: true,
            placeholder_label: default_placeholder_label(),
            placeholder_font: None,
        }
    }
}

impl PublishConfig {
    /// Placeholder font path with `~` expanded
    pub fn placeholder_font_path(&self) -> Option<PathBuf> {
        self.placeholder_font
            .as_deref()
            .map(|path| PathBuf::from(shellexpand::tilde(path).to_string()))
    }
}

fn default_true() -> bool {
    true
}

fn default_placeholder_label() -> String {
    crate::thumbnail::DEFAULT_PLACEHOLDER_LABEL.to_string()
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from the default location, falling back to
    /// defaults when no file exists (credentials may still come from the
    /// environment)
    pub fn load_or_default() -> Result<Self> {
        let config_path = resolve_config_path()?;
        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            tracing::debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Resolve credentials, letting the environment override the file.
    ///
    /// Missing values are kept empty here and reported as
    /// `CredentialsMissing` when a token is first needed.
    pub fn credentials(&self) -> Credentials {
        let app_id = std::env::var(APP_ID_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| self.wechat.app_id.clone())
            .unwrap_or_default();
        let app_secret = std::env::var(APP_SECRET_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| self.wechat.app_secret.clone())
            .unwrap_or_default();
        Credentials::new(app_id, app_secret)
    }
}

/// App id and secret used to obtain access tokens
pub struct Credentials {
    app_id: String,
    app_secret: SecretString,
}

impl Credentials {
    pub fn new(app_id: impl Into<String>, app_secret: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into().trim().to_string(),
            app_secret: SecretString::from(app_secret.into().trim().to_string()),
        }
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// Both halves present
    pub fn is_complete(&self) -> bool {
        !self.app_id.is_empty() && !self.app_secret.expose_secret().is_empty()
    }

    /// Secret with only the first and last three characters visible
    pub fn masked_secret(&self) -> String {
        mask(self.app_secret.expose_secret())
    }

    pub(crate) fn secret(&self) -> &str {
        self.app_secret.expose_secret()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("app_id", &self.app_id)
            .field("app_secret", &self.masked_secret())
            .finish()
    }
}

fn mask(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 6 {
        return "***".to_string();
    }
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 3..].iter().collect();
    format!("{}***{}", head, tail)
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("WXPUB_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("wxpub").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn clear_env() {
        std::env::remove_var(APP_ID_ENV);
        std::env::remove_var(APP_SECRET_ENV);
    }

    #[test]
    fn test_parse_full_config() {
        let config = Config::from_toml(
            r#"
            [wechat]
            app_id = "wx1234567890"
            app_secret = "0123456789abcdef"
            api_base = "http://localhost:9000/cgi-bin"
            timeout_secs = 5

            [publish]
            default_author = "编辑部"
            draft_shape = "legacy"
            upload_inline_images = false
            placeholder_label = "Weekly"
            placeholder_font = "/usr/share/fonts/custom.ttf"
            "#,
        )
        .unwrap();

        assert_eq!(config.wechat.app_id.as_deref(), Some("wx1234567890"));
        assert_eq!(config.wechat.api_base, "http://localhost:9000/cgi-bin");
        assert_eq!(config.wechat.timeout(), Duration::from_secs(5));
        assert_eq!(config.publish.default_author.as_deref(), Some("编辑部"));
        assert_eq!(config.publish.draft_shape, DraftShape::Legacy);
        assert!(!config.publish.upload_inline_images);
        assert_eq!(config.publish.placeholder_label, "Weekly");
        assert_eq!(
            config.publish.placeholder_font_path(),
            Some(PathBuf::from("/usr/share/fonts/custom.ttf"))
        );
    }

    #[test]
    fn test_parse_empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.wechat.api_base, DEFAULT_API_BASE);
        assert_eq!(config.wechat.timeout_secs, 30);
        assert_eq!(config.publish.draft_shape, DraftShape::Extended);
        assert!(config.publish.upload_inline_images);
        assert_eq!(config.publish.placeholder_label, "文颜书评");
        assert!(config.publish.placeholder_font_path().is_none());
    }

    #[test]
    fn test_parse_invalid_config() {
        let result = Config::from_toml("[wechat\napp_id = ");
        assert!(matches!(
            result,
            Err(crate::error::WxPubError::Config(ConfigError::ParseError(_)))
        ));
    }

    #[test]
    fn test_load_from_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "[wechat]\napp_id = \"wxfile\"\n").unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.wechat.app_id.as_deref(), Some("wxfile"));
    }

    #[test]
    fn test_load_from_missing_path() {
        let result = Config::load_from_path(Path::new("/definitely/not/here.toml"));
        assert!(matches!(
            result,
            Err(crate::error::WxPubError::Config(ConfigError::ReadError(_)))
        ));
    }

    #[test]
    #[serial]
    fn test_credentials_from_file() {
        clear_env();
        let config = Config::from_toml(
            "[wechat]\napp_id = \"wxfile\"\napp_secret = \"secret-from-file\"\n",
        )
        .unwrap();
        let credentials = config.credentials();
        assert_eq!(credentials.app_id(), "wxfile");
        assert!(credentials.is_complete());
    }

    #[test]
    #[serial]
    fn test_credentials_env_overrides_file() {
        clear_env();
        std::env::set_var(APP_ID_ENV, "wxenv");
        std::env::set_var(APP_SECRET_ENV, "secret-from-env");

        let config = Config::from_toml("[wechat]\napp_id = \"wxfile\"\n").unwrap();
        let credentials = config.credentials();
        assert_eq!(credentials.app_id(), "wxenv");
        assert_eq!(credentials.secret(), "secret-from-env");

        clear_env();
    }

    #[test]
    #[serial]
    fn test_credentials_missing_are_incomplete() {
        clear_env();
        let credentials = Config::default().credentials();
        assert!(!credentials.is_complete());

        let half = Credentials::new("wx123", "   ");
        assert!(!half.is_complete());
    }

    #[test]
    #[serial]
    fn test_resolve_config_path_env_override() {
        std::env::set_var("WXPUB_CONFIG", "/tmp/wxpub-test.toml");
        let path = resolve_config_path().unwrap();
        std::env::remove_var("WXPUB_CONFIG");
        assert_eq!(path, PathBuf::from("/tmp/wxpub-test.toml"));
    }

    #[test]
    fn test_masked_secret_never_shows_middle() {
        let credentials = Credentials::new("wx1", "abcdef1234567890xyz");
        assert_eq!(credentials.masked_secret(), "abc***xyz");

        let debug = format!("{:?}", credentials);
        assert!(!debug.contains("abcdef1234567890xyz"));
        assert!(debug.contains("abc***xyz"));

        let short = Credentials::new("wx1", "abc");
        assert_eq!(short.masked_secret(), "***");
    }

    #[test]
    fn test_wechat_config_debug_masks_secret() {
        let config = Config::from_toml(
            "[wechat]\napp_id = \"wx1\"\napp_secret = \"topsecretvalue123\"\n",
        )
        .unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("topsecretvalue123"));
    }
}
