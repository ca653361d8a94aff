//! Export configuration.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (BOOKSTACK_TOKEN_ID, BOOKSTACK_TOKEN_SECRET,
//!    MINIO_ACCESS_KEY, MINIO_SECRET_KEY)
//! 2. Command line (`--output-dir`)
//! 3. YAML config file
//!
//! The file is parsed once into [`ConfigFile`] and resolved into an
//! immutable [`ResolvedConfig`] that every component borrows.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::domain::{AssetKind, ExportFormat, NodeKind};

/// Name of the export directory / archive stem
pub const BASE_DIR_NAME: &str = "bookstack_export";

/// Path prefix for books that sit on no shelf
pub const UNASSIGNED_BOOKS_DIR: &str = "unassigned/";

pub const TOKEN_ID_ENV: &str = "BOOKSTACK_TOKEN_ID";
pub const TOKEN_SECRET_ENV: &str = "BOOKSTACK_TOKEN_SECRET";
pub const MINIO_ACCESS_KEY_ENV: &str = "MINIO_ACCESS_KEY";
pub const MINIO_SECRET_KEY_ENV: &str = "MINIO_SECRET_KEY";

const DEFAULT_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Configuration errors detected while resolving the file
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{env_key} is not set in the environment and is missing from the configuration file")]
    MissingCredential { env_key: &'static str },

    #[error("At least one export format must be configured")]
    NoFormats,

    #[error("Host must not be empty")]
    EmptyHost,
}

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub host: String,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    pub formats: Vec<ExportFormat>,
    #[serde(default)]
    pub output_path: Option<String>,
    #[serde(default)]
    pub assets: AssetsConfig,
    #[serde(default)]
    pub http_config: HttpSettings,
    #[serde(default)]
    pub minio: Option<MinioConfig>,
    /// Local archive retention
    #[serde(default)]
    pub keep_last: Option<i64>,
    /// Seconds between runs; 0 runs once
    #[serde(default)]
    pub run_interval: u64,
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialsConfig {
    pub token_id: Option<String>,
    pub token_secret: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    pub export_images: bool,
    pub export_attachments: bool,
    pub modify_markdown: bool,
    pub export_meta: bool,
}

/// HTTP behaviour for upstream requests
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub verify_ssl: bool,
    /// Request timeout in seconds
    pub timeout: u64,
    pub retry_count: u32,
    /// Seconds; retry n waits `backoff_factor * 2^(n-1)`
    pub backoff_factor: f64,
    pub retry_codes: Vec<u16>,
    pub additional_headers: BTreeMap<String, String>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            verify_ssl: true,
            timeout: 30,
            retry_count: 5,
            backoff_factor: 2.5,
            retry_codes: vec![413, 429, 500, 502, 503, 504],
            additional_headers: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MinioConfig {
    pub host: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub bucket: String,
    pub path: Option<String>,
    pub region: String,
    pub keep_last: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationsConfig {
    pub webhook: Option<WebhookConfig>,
    pub telegram: Option<TelegramNotifyConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default)]
    pub on_success: bool,
    #[serde(default = "default_true")]
    pub on_failure: bool,
    pub custom_title: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramNotifyConfig {
    pub bot_token: String,
    pub chat_id: String,
    #[serde(default)]
    pub on_success: bool,
    #[serde(default = "default_true")]
    pub on_failure: bool,
    pub custom_title: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Object storage target with credentials resolved
#[derive(Debug, Clone)]
pub struct ObjectStorageSettings {
    pub host: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub path: Option<String>,
    pub region: String,
    pub keep_last: Option<i64>,
}

/// API endpoints derived from the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiUrls {
    pub shelves: String,
    pub books: String,
    pub chapters: String,
    pub pages: String,
    pub images: String,
    pub attachments: String,
}

impl ApiUrls {
    /// Build endpoint URLs, assuming https when the host has no scheme
    pub fn from_host(host: &str) -> Self {
        let host = host.trim_end_matches('/');
        let base = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{}", host)
        };
        let url = |path: &str| format!("{}/api/{}", base, path);

        Self {
            shelves: url("shelves"),
            books: url("books"),
            chapters: url("chapters"),
            pages: url("pages"),
            images: url("image-gallery"),
            attachments: url("attachments"),
        }
    }

    /// Listing endpoint for a node kind
    pub fn for_node(&self, kind: NodeKind) -> &str {
        match kind {
            NodeKind::Shelf => &self.shelves,
            NodeKind::Book => &self.books,
            NodeKind::Chapter => &self.chapters,
            NodeKind::Page => &self.pages,
        }
    }

    /// Listing endpoint for an asset kind
    pub fn for_asset(&self, kind: AssetKind) -> &str {
        match kind {
            AssetKind::Image => &self.images,
            AssetKind::Attachment => &self.attachments,
        }
    }
}

/// What to put in the archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    pub formats: Vec<ExportFormat>,
    pub export_images: bool,
    pub export_attachments: bool,
    /// Effective: only set when markdown is exported and some asset type is
    pub modify_markdown: bool,
    pub export_meta: bool,
}

impl ExportOptions {
    pub fn new(formats: Vec<ExportFormat>, assets: &AssetsConfig) -> Self {
        let modify_markdown = assets.modify_markdown
            && formats.iter().any(|f| f.supports_link_rewrite())
            && (assets.export_images || assets.export_attachments);

        Self {
            formats,
            export_images: assets.export_images,
            export_attachments: assets.export_attachments,
            modify_markdown,
            export_meta: assets.export_meta,
        }
    }

    pub fn exports_asset(&self, kind: AssetKind) -> bool {
        match kind {
            AssetKind::Image => self.export_images,
            AssetKind::Attachment => self.export_attachments,
        }
    }
}

/// Resolved configuration for one process
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub urls: ApiUrls,
    /// Headers sent with every API request
    pub headers: BTreeMap<String, String>,
    /// `<output>/bookstack_export`; archives are `<base_dir>_<timestamp>.tgz`
    pub base_dir: PathBuf,
    pub unassigned_dir: String,
    pub options: ExportOptions,
    pub http: HttpSettings,
    pub object_storage: Option<ObjectStorageSettings>,
    pub keep_last: Option<i64>,
    pub run_interval: u64,
    pub notifications: NotificationsConfig,
}

impl ResolvedConfig {
    /// Load and resolve a config file against the process environment
    pub fn load(path: &Path, output_override: Option<&Path>) -> Result<Self> {
        let file = load_config_file(path)?;
        Self::resolve(file, output_override, |key| std::env::var(key).ok())
            .with_context(|| format!("Invalid configuration: {}", path.display()))
    }

    /// Resolve a parsed file; `env` looks up environment variables
    pub fn resolve<F>(file: ConfigFile, output_override: Option<&Path>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if file.host.trim().is_empty() {
            return Err(ConfigError::EmptyHost.into());
        }
        if file.formats.is_empty() {
            return Err(ConfigError::NoFormats.into());
        }

        let token_id = check_var(&env, TOKEN_ID_ENV, file.credentials.token_id.as_deref())?;
        let token_secret =
            check_var(&env, TOKEN_SECRET_ENV, file.credentials.token_secret.as_deref())?;

        let headers = build_headers(&file.http_config.additional_headers, &token_id, &token_secret);
        let urls = ApiUrls::from_host(&file.host);
        debug!(?urls, "api urls");

        let object_storage = match file.minio {
            Some(minio) => Some(ObjectStorageSettings {
                access_key: check_var(&env, MINIO_ACCESS_KEY_ENV, minio.access_key.as_deref())?,
                secret_key: check_var(&env, MINIO_SECRET_KEY_ENV, minio.secret_key.as_deref())?,
                host: minio.host,
                bucket: minio.bucket,
                path: minio.path,
                region: minio.region,
                keep_last: minio.keep_last,
            }),
            None => None,
        };

        let output_dir = match output_override {
            Some(dir) => {
                debug!("Output directory overwritten by command line option");
                Some(dir.to_path_buf())
            }
            None => file.output_path.as_deref().map(PathBuf::from),
        };
        let base_dir = match output_dir {
            Some(dir) => dir.join(BASE_DIR_NAME),
            None => PathBuf::from(BASE_DIR_NAME),
        };

        Ok(Self {
            urls,
            headers,
            base_dir,
            unassigned_dir: UNASSIGNED_BOOKS_DIR.to_string(),
            options: ExportOptions::new(file.formats, &file.assets),
            http: file.http_config,
            object_storage,
            keep_last: file.keep_last,
            run_interval: file.run_interval,
            notifications: file.notifications,
        })
    }

    /// Directory holding the archives
    pub fn output_dir(&self) -> &Path {
        self.base_dir.parent().unwrap_or(Path::new(""))
    }
}

/// Load and parse config file
pub fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Environment value if set, else the file value, else an error
fn check_var<F>(env: &F, env_key: &'static str, file_value: Option<&str>) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = env(env_key).filter(|v| !v.is_empty()) {
        debug!(env_key, "Environment variable overrides configuration file value");
        return Ok(value);
    }
    match file_value {
        Some(value) if !value.is_empty() => Ok(value.to_string()),
        _ => Err(ConfigError::MissingCredential { env_key }),
    }
}

/// User headers first; defaults never override them
fn build_headers(
    additional: &BTreeMap<String, String>,
    token_id: &str,
    token_secret: &str,
) -> BTreeMap<String, String> {
    let mut headers = additional.clone();
    let has = |headers: &BTreeMap<String, String>, name: &str| {
        headers.keys().any(|k| k.eq_ignore_ascii_case(name))
    };

    if !has(&headers, "Content-Type") {
        headers.insert("Content-Type".to_string(), DEFAULT_CONTENT_TYPE.to_string());
    }
    if !has(&headers, "Authorization") {
        headers.insert(
            "Authorization".to_string(),
            format!("Token {}:{}", token_id, token_secret),
        );
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const MINIMAL: &str = r#"
host: wiki.example.com/
credentials:
  token_id: file-id
  token_secret: file-secret
formats:
  - markdown
"#;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn parse(yaml: &str) -> ConfigFile {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("config.yml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(
            file,
            r#"
host: "https://wiki.example.com"
credentials:
  token_id: abc
  token_secret: def
formats: [markdown, pdf]
output_path: /backups
assets:
  export_images: true
  modify_markdown: true
  export_meta: true
http_config:
  verify_ssl: false
  retry_count: 2
minio:
  host: minio.example.com
  access_key: ak
  secret_key: sk
  bucket: wiki
  path: bookstack/
  region: us-east-1
  keep_last: 3
keep_last: 5
run_interval: 86400
notifications:
  webhook:
    url: https://hooks.example.com/x
"#
        )
        .unwrap();

        let config = load_config_file(&config_path).unwrap();
        assert_eq!(config.formats, vec![ExportFormat::Markdown, ExportFormat::Pdf]);
        assert!(config.assets.export_images);
        assert!(!config.assets.export_attachments);
        assert!(!config.http_config.verify_ssl);
        assert_eq!(config.http_config.retry_count, 2);
        // Unset http fields keep their defaults
        assert_eq!(config.http_config.timeout, 30);
        assert_eq!(config.minio.as_ref().unwrap().keep_last, Some(3));
        assert_eq!(config.keep_last, Some(5));
        assert_eq!(config.run_interval, 86400);

        let webhook = config.notifications.webhook.unwrap();
        assert!(!webhook.on_success);
        assert!(webhook.on_failure);
    }

    #[test]
    fn test_unknown_field_is_schema_error() {
        let yaml = format!("{}\nexport_everything: true\n", MINIMAL);
        assert!(serde_yaml::from_str::<ConfigFile>(&yaml).is_err());
    }

    #[test]
    fn test_unknown_format_is_schema_error() {
        let yaml = "host: h\nformats: [docx]\n";
        assert!(serde_yaml::from_str::<ConfigFile>(yaml).is_err());
    }

    #[test]
    fn test_urls_and_headers() {
        let config = ResolvedConfig::resolve(parse(MINIMAL), None, no_env).unwrap();

        assert_eq!(config.urls.shelves, "https://wiki.example.com/api/shelves");
        assert_eq!(config.urls.images, "https://wiki.example.com/api/image-gallery");
        assert_eq!(
            config.headers.get("Authorization").map(String::as_str),
            Some("Token file-id:file-secret")
        );
        assert_eq!(
            config.headers.get("Content-Type").map(String::as_str),
            Some(DEFAULT_CONTENT_TYPE)
        );
        assert_eq!(config.base_dir, PathBuf::from(BASE_DIR_NAME));
        assert_eq!(config.unassigned_dir, "unassigned/");
    }

    #[test]
    fn test_http_scheme_preserved() {
        let urls = ApiUrls::from_host("http://localhost:6875");
        assert_eq!(urls.pages, "http://localhost:6875/api/pages");
        assert_eq!(urls.for_node(NodeKind::Chapter), "http://localhost:6875/api/chapters");
        assert_eq!(urls.for_asset(AssetKind::Attachment), "http://localhost:6875/api/attachments");
    }

    #[test]
    fn test_env_overrides_file_credentials() {
        let env = |key: &str| match key {
            TOKEN_ID_ENV => Some("env-id".to_string()),
            _ => None,
        };
        let config = ResolvedConfig::resolve(parse(MINIMAL), None, env).unwrap();
        assert_eq!(
            config.headers.get("Authorization").map(String::as_str),
            Some("Token env-id:file-secret")
        );
    }

    #[test]
    fn test_missing_credential() {
        let yaml = "host: h\nformats: [html]\n";
        let err = ResolvedConfig::resolve(parse(yaml), None, no_env).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::MissingCredential {
                env_key: TOKEN_ID_ENV
            })
        );
    }

    #[test]
    fn test_minio_keys_required() {
        let yaml = format!(
            "{}\nminio:\n  host: m\n  bucket: b\n  region: r\n",
            MINIMAL
        );
        let err = ResolvedConfig::resolve(parse(&yaml), None, no_env).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::MissingCredential {
                env_key: MINIO_ACCESS_KEY_ENV
            })
        );
    }

    #[test]
    fn test_user_authorization_header_kept() {
        let yaml = r#"
host: h
formats: [markdown]
credentials: {token_id: a, token_secret: b}
http_config:
  additional_headers:
    authorization: "Bearer custom"
"#;
        let config = ResolvedConfig::resolve(parse(yaml), None, no_env).unwrap();
        assert_eq!(
            config.headers.get("authorization").map(String::as_str),
            Some("Bearer custom")
        );
        assert!(!config.headers.contains_key("Authorization"));
    }

    #[test]
    fn test_output_override() {
        let yaml = format!("{}\noutput_path: /from/file\n", MINIMAL);
        let config = ResolvedConfig::resolve(parse(&yaml), None, no_env).unwrap();
        assert_eq!(config.base_dir, PathBuf::from("/from/file/bookstack_export"));
        assert_eq!(config.output_dir(), Path::new("/from/file"));

        let config =
            ResolvedConfig::resolve(parse(&yaml), Some(Path::new("/from/cli")), no_env).unwrap();
        assert_eq!(config.base_dir, PathBuf::from("/from/cli/bookstack_export"));
    }

    #[test]
    fn test_modify_markdown_needs_markdown_and_assets() {
        let assets = AssetsConfig {
            export_images: true,
            modify_markdown: true,
            ..Default::default()
        };
        assert!(ExportOptions::new(vec![ExportFormat::Markdown], &assets).modify_markdown);
        assert!(!ExportOptions::new(vec![ExportFormat::Html], &assets).modify_markdown);

        let no_assets = AssetsConfig {
            modify_markdown: true,
            ..Default::default()
        };
        assert!(!ExportOptions::new(vec![ExportFormat::Markdown], &no_assets).modify_markdown);
    }
}
