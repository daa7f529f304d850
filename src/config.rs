//! Configuration management for bugvault.
//!
//! Loads configuration from environment variables (optionally via a `.env`
//! file). Defaults follow the tracker's stock attachment settings:
//! - Storage backend selection (`FILE_UPLOAD_METHOD`) and upload folder
//! - Extension allow/deny lists and size ceilings
//! - Access thresholds and "own attachment" exceptions
//! - Inline preview rules

use std::env;
use std::sync::OnceLock;

use crate::models::{AccessLevel, UploadMethod};
use crate::Result;

/// Global configuration instance
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration, if `init` has run.
pub fn config() -> Option<&'static Config> {
    CONFIG.get()
}

/// Load configuration from the environment (call once at startup).
///
/// An unknown upload method is fatal here rather than at first upload.
pub fn init() -> Result<&'static Config> {
    let loaded = Config::from_env()?;
    Ok(CONFIG.get_or_init(|| loaded))
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub files: FileConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub public_url: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtpConfig {
    pub server: String,
    pub user: String,
    pub pass: String,
}

/// Access thresholds and per-uploader exceptions for attachments.
#[derive(Debug, Clone)]
pub struct AttachmentAccessConfig {
    pub view_threshold: AccessLevel,
    pub download_threshold: AccessLevel,
    pub delete_threshold: AccessLevel,
    pub allow_view_own: bool,
    pub allow_download_own: bool,
    pub allow_delete_own: bool,
    pub upload_bug_file_threshold: AccessLevel,
    pub upload_project_file_threshold: AccessLevel,
    pub allow_reporter_upload: bool,
    /// Bugs at or past this status are read-only...
    pub bug_readonly_status_threshold: i64,
    /// ...unless the user has at least this level.
    pub update_readonly_bug_threshold: AccessLevel,
}

impl Default for AttachmentAccessConfig {
    fn default() -> Self {
        Self {
            view_threshold: AccessLevel::VIEWER,
            download_threshold: AccessLevel::VIEWER,
            delete_threshold: AccessLevel::DEVELOPER,
            allow_view_own: true,
            allow_download_own: true,
            allow_delete_own: false,
            upload_bug_file_threshold: AccessLevel::REPORTER,
            upload_project_file_threshold: AccessLevel::MANAGER,
            allow_reporter_upload: true,
            bug_readonly_status_threshold: 80,
            update_readonly_bug_threshold: AccessLevel::MANAGER,
        }
    }
}

/// Everything the attachment subsystem reads from configuration.
#[derive(Debug, Clone)]
pub struct FileConfig {
    pub upload_method: UploadMethod,
    /// Site switch for attachments.
    pub allow_file_upload: bool,
    /// Transport-level switch (the server accepts file bodies at all).
    pub transport_uploads_enabled: bool,
    /// Used when a project has no `file_path` of its own.
    pub default_upload_folder: String,
    pub max_file_size: u64,
    /// Transport limit for a single file.
    pub upload_max_filesize: u64,
    /// Transport limit for a whole request body.
    pub post_max_size: u64,
    /// Comma separated extensions; empty allows everything not denied.
    pub allowed_files: String,
    /// Comma separated extensions; always checked first.
    pub disallowed_files: String,
    pub attachments_file_permissions: u32,
    pub document_files_prefix: String,
    pub preview_text_extensions: Vec<String>,
    pub preview_image_extensions: Vec<String>,
    pub preview_attachments_inline_max_size: u64,
    /// Directory holding `{ext}.png` file icons.
    pub file_icons_path: String,
    /// URL prefix the icons are served under.
    pub file_icons_url: String,
    pub ftp: FtpConfig,
    pub access: AttachmentAccessConfig,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            upload_method: UploadMethod::Database,
            allow_file_upload: true,
            transport_uploads_enabled: true,
            default_upload_folder: String::new(),
            max_file_size: 5_000_000,
            upload_max_filesize: 8 * 1024 * 1024,
            post_max_size: 8 * 1024 * 1024,
            allowed_files: String::new(),
            disallowed_files: String::new(),
            attachments_file_permissions: 0o400,
            document_files_prefix: "doc".to_string(),
            preview_text_extensions: split_list(",txt,diff,patch"),
            preview_image_extensions: split_list("bmp,png,gif,jpg,jpeg"),
            preview_attachments_inline_max_size: 256 * 1024,
            file_icons_path: "images/fileicons".to_string(),
            file_icons_url: "images/fileicons".to_string(),
            ftp: FtpConfig {
                server: "ftp.example.com".to_string(),
                user: "anonymous".to_string(),
                pass: String::new(),
            },
            access: AttachmentAccessConfig::default(),
        }
    }
}

impl FileConfig {
    /// Effective per-file ceiling: the smallest of the transport limits and
    /// the configured maximum. A file of exactly this size is accepted.
    pub fn max_upload_size(&self) -> u64 {
        self.upload_max_filesize
            .min(self.post_max_size)
            .min(self.max_file_size)
    }

    /// Whether uploads are enabled both by the site and by the transport.
    pub fn is_uploading_enabled(&self) -> bool {
        self.transport_uploads_enabled && self.allow_file_upload
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = FileConfig::default();
        let access_defaults = AttachmentAccessConfig::default();

        let files = FileConfig {
            upload_method: env_or("FILE_UPLOAD_METHOD", defaults.upload_method.as_str()).parse()?,
            allow_file_upload: env_bool("ALLOW_FILE_UPLOAD", defaults.allow_file_upload),
            transport_uploads_enabled: env_bool("FILE_UPLOADS", defaults.transport_uploads_enabled),
            default_upload_folder: env_or("ABSOLUTE_PATH_DEFAULT_UPLOAD_FOLDER", "./data/uploads"),
            max_file_size: env_num("MAX_FILE_SIZE", defaults.max_file_size),
            upload_max_filesize: env_num("UPLOAD_MAX_FILESIZE", defaults.upload_max_filesize),
            post_max_size: env_num("POST_MAX_SIZE", defaults.post_max_size),
            allowed_files: env_or("ALLOWED_FILES", &defaults.allowed_files),
            disallowed_files: env_or("DISALLOWED_FILES", &defaults.disallowed_files),
            attachments_file_permissions: env::var("ATTACHMENTS_FILE_PERMISSIONS")
                .ok()
                .and_then(|v| u32::from_str_radix(v.trim_start_matches("0o"), 8).ok())
                .unwrap_or(defaults.attachments_file_permissions),
            document_files_prefix: env_or("DOCUMENT_FILES_PREFIX", &defaults.document_files_prefix),
            preview_text_extensions: env::var("PREVIEW_TEXT_EXTENSIONS")
                .map(|v| split_list(&v))
                .unwrap_or(defaults.preview_text_extensions),
            preview_image_extensions: env::var("PREVIEW_IMAGE_EXTENSIONS")
                .map(|v| split_list(&v))
                .unwrap_or(defaults.preview_image_extensions),
            preview_attachments_inline_max_size: env_num(
                "PREVIEW_ATTACHMENTS_INLINE_MAX_SIZE",
                defaults.preview_attachments_inline_max_size,
            ),
            file_icons_path: env_or("FILE_ICONS_PATH", &defaults.file_icons_path),
            file_icons_url: env_or("FILE_ICONS_URL", &defaults.file_icons_url),
            ftp: FtpConfig {
                server: env_or("FILE_UPLOAD_FTP_SERVER", &defaults.ftp.server),
                user: env_or("FILE_UPLOAD_FTP_USER", &defaults.ftp.user),
                pass: env_or("FILE_UPLOAD_FTP_PASS", &defaults.ftp.pass),
            },
            access: AttachmentAccessConfig {
                view_threshold: env_level("VIEW_ATTACHMENTS_THRESHOLD", access_defaults.view_threshold),
                download_threshold: env_level(
                    "DOWNLOAD_ATTACHMENTS_THRESHOLD",
                    access_defaults.download_threshold,
                ),
                delete_threshold: env_level("DELETE_ATTACHMENTS_THRESHOLD", access_defaults.delete_threshold),
                allow_view_own: env_bool("ALLOW_VIEW_OWN_ATTACHMENTS", access_defaults.allow_view_own),
                allow_download_own: env_bool(
                    "ALLOW_DOWNLOAD_OWN_ATTACHMENTS",
                    access_defaults.allow_download_own,
                ),
                allow_delete_own: env_bool("ALLOW_DELETE_OWN_ATTACHMENTS", access_defaults.allow_delete_own),
                upload_bug_file_threshold: env_level(
                    "UPLOAD_BUG_FILE_THRESHOLD",
                    access_defaults.upload_bug_file_threshold,
                ),
                upload_project_file_threshold: env_level(
                    "UPLOAD_PROJECT_FILE_THRESHOLD",
                    access_defaults.upload_project_file_threshold,
                ),
                allow_reporter_upload: env_bool("ALLOW_REPORTER_UPLOAD", access_defaults.allow_reporter_upload),
                bug_readonly_status_threshold: env_num(
                    "BUG_READONLY_STATUS_THRESHOLD",
                    access_defaults.bug_readonly_status_threshold,
                ),
                update_readonly_bug_threshold: env_level(
                    "UPDATE_READONLY_BUG_THRESHOLD",
                    access_defaults.update_readonly_bug_threshold,
                ),
            },
        };

        let port = env_or("PORT", "8780");

        Ok(Self {
            server: ServerConfig {
                host: env_or("HOST", "0.0.0.0"),
                port: port
                    .parse()
                    .map_err(|_| crate::Error::Config(format!("Invalid PORT: {}", port)))?,
                public_url: env_or("PUBLIC_URL", "http://localhost:8780"),
            },
            database: DatabaseConfig {
                path: env_or("DATABASE_PATH", "./data/bugvault.db"),
            },
            files,
        })
    }
}

/// Split a comma separated list, lowercasing and trimming entries.
///
/// Empty entries are kept: an empty extension is meaningful in preview
/// lists (files without an extension).
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .collect()
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "on" | "yes"),
        Err(_) => default,
    }
}

fn env_num<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_level(key: &str, default: AccessLevel) -> AccessLevel {
    env::var(key)
        .ok()
        .and_then(|v| AccessLevel::parse(&v))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_upload_size_is_smallest_limit() {
        let cfg = FileConfig {
            max_file_size: 1000,
            upload_max_filesize: 2000,
            post_max_size: 500,
            ..Default::default()
        };
        assert_eq!(cfg.max_upload_size(), 500);
    }

    #[test]
    fn test_split_list_keeps_empty_extension() {
        let list = split_list(",TXT, diff");
        assert_eq!(list, vec!["", "txt", "diff"]);
    }

    #[test]
    fn test_uploading_requires_both_switches() {
        let mut cfg = FileConfig::default();
        assert!(cfg.is_uploading_enabled());
        cfg.transport_uploads_enabled = false;
        assert!(!cfg.is_uploading_enabled());
    }
}
