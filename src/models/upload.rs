//! Upload and storage vocabulary: backends, attachment kinds, and the
//! transport-level description of one submitted file.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Where attachment payloads live. One value per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadMethod {
    Disk,
    Database,
    Ftp,
}

impl UploadMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disk => "disk",
            Self::Database => "database",
            Self::Ftp => "ftp",
        }
    }

    /// Whether payloads are kept as files in an upload folder.
    pub fn uses_filesystem(&self) -> bool {
        matches!(self, Self::Disk | Self::Ftp)
    }
}

impl FromStr for UploadMethod {
    type Err = Error;

    /// Accepts names and the tracker's legacy numeric codes
    /// (1 = disk, 2 = database, 3 = ftp).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "disk" | "1" => Ok(Self::Disk),
            "database" | "db" | "2" => Ok(Self::Database),
            "ftp" | "3" => Ok(Self::Ftp),
            other => Err(Error::UnknownUploadMethod(other.to_string())),
        }
    }
}

impl fmt::Display for UploadMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which attachment table a record lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Bug,
    Doc,
}

impl AttachmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bug => "bug",
            Self::Doc => "doc",
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            Self::Bug => "bug_file",
            Self::Doc => "project_file",
        }
    }

    pub fn owner_column(&self) -> &'static str {
        match self {
            Self::Bug => "bug_id",
            Self::Doc => "project_id",
        }
    }
}

impl Default for AttachmentKind {
    fn default() -> Self {
        AttachmentKind::Bug
    }
}

/// The entity a new upload is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentTarget {
    Bug(i64),
    ProjectDocument(i64),
}

impl AttachmentTarget {
    pub fn kind(&self) -> AttachmentKind {
        match self {
            Self::Bug(_) => AttachmentKind::Bug,
            Self::ProjectDocument(_) => AttachmentKind::Doc,
        }
    }

    pub fn owner_id(&self) -> i64 {
        match self {
            Self::Bug(id) | Self::ProjectDocument(id) => *id,
        }
    }
}

/// Transport outcome reported for one submitted file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UploadError {
    #[default]
    Ok,
    /// Exceeded the server-wide upload limit.
    IniSize,
    /// Exceeded the limit declared by the form.
    FormSize,
    /// Only part of the file arrived.
    Partial,
    /// No file was sent.
    NoFile,
    NoTmpDir,
    CantWrite,
}

/// One submitted file as handed over by the transport layer.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Client-supplied file name.
    pub name: String,
    /// Where the transport spooled the bytes.
    pub tmp_path: PathBuf,
    /// Client-supplied MIME type.
    pub content_type: String,
    pub error: UploadError,
    /// Size reported by the transport; the spooled file is authoritative.
    pub size: u64,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, tmp_path: impl Into<PathBuf>, content_type: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            tmp_path: tmp_path.into(),
            content_type: content_type.into(),
            error: UploadError::Ok,
            size,
        }
    }

    pub fn failed(error: UploadError) -> Self {
        Self {
            name: String::new(),
            tmp_path: PathBuf::new(),
            content_type: String::new(),
            error,
            size: 0,
        }
    }
}
