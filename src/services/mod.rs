//! Service layer for bugvault.
//!
//! Contains the attachment business logic:
//! - Naming (storage key generation and display names)
//! - Storage (disk, FTP and database payload backends)
//! - Paths (upload folders and legacy path resolution)
//! - Attachments (upload, download, delete, relocation)
//! - Visibility (view/download/delete decisions and inline previews)
//! - Access (user access levels per project and bug)

mod access;
mod attachments;
pub mod naming;
pub mod paths;
pub mod storage;
mod visibility;

pub use access::AccessService;
pub use attachments::{AddOptions, AttachmentService, FileContent};
pub use storage::{backend_for, StorageBackend, StoredFile};
pub use visibility::{
    AttachmentPermissions, FileIcon, PreviewType, VisibilityFilter, VisibleAttachment,
};
