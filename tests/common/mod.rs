//! Shared test fixtures: in-memory database, temporary upload folders,
//! seeded users/projects/bugs and an in-memory FTP server.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use bugvault::config::{Config, DatabaseConfig, FileConfig, ServerConfig};
use bugvault::db::{self, CreateBug, CreateProject, CreateUser, DbPool};
use bugvault::models::{AccessLevel, RequestContext, UploadMethod, UploadedFile};
use bugvault::services::storage::{
    DatabaseBackend, DiskBackend, FtpBackend, FtpSession, FtpTransport,
};
use bugvault::services::StorageBackend;
use bugvault::{api, AppState, Error, Result};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

pub const BOUNDARY: &str = "bugvault-test-boundary";

/// Create a test database with the schema applied.
pub async fn setup_test_db() -> DbPool {
    let pool = db::init_pool(":memory:")
        .await
        .expect("Failed to create test database");
    db::initialize_schema(&pool)
        .await
        .expect("Failed to initialize schema");
    pool
}

pub fn test_config(files: FileConfig) -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            public_url: "http://localhost".to_string(),
        },
        database: DatabaseConfig {
            path: ":memory:".to_string(),
        },
        files,
    }
}

// ============================================================================
// Raw HTTP helpers
// ============================================================================

/// The full API router around a state.
pub fn app(state: &AppState) -> Router {
    Router::new()
        .merge(api::routes(state.clone()))
        .with_state(state.clone())
}

/// Extract JSON body from response
pub async fn extract_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

/// Send one request through the router.
pub async fn send(app: Router, request: Request<Body>) -> Response<Body> {
    app.oneshot(request).await.expect("Router is infallible")
}

/// Multipart body with a single `file` part. Without `terminated` the
/// closing boundary is left off, as when a client drops mid-upload.
pub fn multipart_body(filename: &str, data: &[u8], terminated: bool) -> Vec<u8> {
    let mut body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
        b = BOUNDARY,
        f = filename
    )
    .into_bytes();
    body.extend_from_slice(data);
    if terminated {
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    }
    body
}

/// Create a multipart POST request
pub fn post_multipart(uri: &str, token: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .header("Authorization", format!("Bearer {}", token))
        .body(Body::from(body))
        .unwrap()
}

// ============================================================================
// In-memory FTP server
// ============================================================================

#[derive(Default)]
pub struct MemoryFtp {
    pub files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    pub connections: AtomicUsize,
}

impl MemoryFtp {
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn has(&self, remote: &str) -> bool {
        self.files.lock().unwrap().contains_key(remote)
    }
}

struct MemorySession {
    files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl FtpTransport for MemoryFtp {
    fn connect(&self) -> Result<Box<dyn FtpSession>> {
        self.connections.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySession {
            files: self.files.clone(),
        }))
    }
}

impl FtpSession for MemorySession {
    fn put(&mut self, remote: &str, data: &[u8]) -> Result<()> {
        self.files
            .lock()
            .unwrap()
            .insert(remote.to_string(), data.to_vec());
        Ok(())
    }

    fn get(&mut self, remote: &str) -> Result<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(remote)
            .cloned()
            .ok_or_else(|| Error::FileNotFound(remote.to_string()))
    }

    fn delete(&mut self, remote: &str) -> Result<()> {
        self.files.lock().unwrap().remove(remote);
        Ok(())
    }

    fn quit(self: Box<Self>) {}
}

// ============================================================================
// Test world
// ============================================================================

/// Users, projects and a bug wired to a storage backend.
pub struct TestWorld {
    pub state: AppState,
    pub pool: DbPool,
    pub ftp: Arc<MemoryFtp>,
    /// Upload folder of project A (also the default folder).
    pub folder_a: TempDir,
    /// Upload folder of project B.
    pub folder_b: TempDir,
    pub spool: TempDir,
    pub project_a: i64,
    pub project_b: i64,
    pub developer: i64,
    pub developer_token: String,
    pub viewer: i64,
    pub viewer_token: String,
    pub bug_id: i64,
}

impl TestWorld {
    pub async fn new(method: UploadMethod) -> Self {
        Self::with_config(method, |_| {}).await
    }

    pub async fn with_config(method: UploadMethod, tweak: impl FnOnce(&mut FileConfig)) -> Self {
        let pool = setup_test_db().await;
        let folder_a = TempDir::new().unwrap();
        let folder_b = TempDir::new().unwrap();

        let project_a = db::create_project(&pool, CreateProject {
            name: "Project A".into(),
            file_path: dir_string(folder_a.path()),
        })
        .await
        .unwrap()
        .id;
        let project_b = db::create_project(&pool, CreateProject {
            name: "Project B".into(),
            file_path: dir_string(folder_b.path()),
        })
        .await
        .unwrap()
        .id;

        let developer_token = "dev-token".to_string();
        let developer = db::create_user(&pool, CreateUser {
            username: "developer".into(),
            access_level: AccessLevel::DEVELOPER,
            api_token: Some(developer_token.clone()),
        })
        .await
        .unwrap()
        .id;

        let viewer_token = "viewer-token".to_string();
        let viewer = db::create_user(&pool, CreateUser {
            username: "viewer".into(),
            access_level: AccessLevel::VIEWER,
            api_token: Some(viewer_token.clone()),
        })
        .await
        .unwrap()
        .id;

        let bug_id = db::create_bug(&pool, CreateBug {
            project_id: project_a,
            reporter_id: developer,
            status: 10,
            summary: "Crash on save".into(),
        })
        .await
        .unwrap()
        .id;

        let mut files = FileConfig {
            upload_method: method,
            default_upload_folder: dir_string(folder_a.path()),
            attachments_file_permissions: 0o600,
            file_icons_path: "/nonexistent-icons".into(),
            ..Default::default()
        };
        tweak(&mut files);

        let ftp = Arc::new(MemoryFtp::default());
        let backend: Arc<dyn StorageBackend> = match method {
            UploadMethod::Disk => Arc::new(DiskBackend::new(files.attachments_file_permissions)),
            UploadMethod::Ftp => Arc::new(FtpBackend::new(
                ftp.clone(),
                files.attachments_file_permissions,
            )),
            UploadMethod::Database => Arc::new(DatabaseBackend::new()),
        };

        let state = AppState::from_parts(pool.clone(), test_config(files), backend);

        Self {
            state,
            pool,
            ftp,
            folder_a,
            folder_b,
            spool: TempDir::new().unwrap(),
            project_a,
            project_b,
            developer,
            developer_token,
            viewer,
            viewer_token,
            bug_id,
        }
    }

    pub fn developer_ctx(&self) -> RequestContext {
        RequestContext::new(self.developer, self.project_a)
    }

    /// Write `data` to a temporary upload file.
    pub fn upload(&self, name: &str, data: &[u8]) -> UploadedFile {
        let path: PathBuf = self.spool.path().join(format!("php{}", name.len() + data.len()));
        let path = unique_path(path);
        std::fs::write(&path, data).unwrap();
        UploadedFile::new(name, path, "application/octet-stream", data.len() as u64)
    }

    /// Number of regular files in a folder.
    pub fn file_count(dir: &TempDir) -> usize {
        std::fs::read_dir(dir.path())
            .unwrap()
            .filter(|e| e.as_ref().map(|e| e.path().is_file()).unwrap_or(false))
            .count()
    }
}

pub fn dir_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn unique_path(mut path: PathBuf) -> PathBuf {
    let mut n = 0;
    while path.exists() {
        n += 1;
        path.set_extension(format!("{}", n));
    }
    path
}
